fn main() -> std::process::ExitCode {
    hominum_lib::run()
}
