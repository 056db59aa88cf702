// ─── Command Layer ───
// Command-line front end over the sync engine.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::downloader::ProgressEvent;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::{Category, SingletonFile, SyncTarget};
use crate::core::state::{AppState, PASSPHRASE_ENV};
use crate::core::sync::{FileSyncOutcome, SyncEngine, SyncReport};

/// Hominum - keeps your Minecraft files in step with the server
#[derive(Parser, Debug)]
#[command(name = "hominum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Launcher data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Sync into this directory instead of the configured one
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Passphrase unlocking the stored API token
    #[arg(long, global = true, env = "HOMINUM_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Sync one directory (config, mods, resourcepacks, shaderpacks)
    Sync { category: String },

    /// Re-download a single file (options, servers)
    SyncFile { name: String },

    /// Sync every directory and file in launch order
    SyncAll,

    /// Preview what a directory sync would change
    Plan { category: String },

    /// Print the server manifest
    Manifest,

    /// Show or change launcher settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage the encrypted API token
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    Show,
    /// Set one value, e.g. `download_concurrency 4`
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CredentialAction {
    /// Encrypt a token read from stdin
    Store,
    /// Verify the stored token decrypts
    Check,
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    /// Finished, but some files failed or the run was cancelled.
    Partial,
}

pub async fn execute(cli: Cli) -> LauncherResult<Outcome> {
    let mut state = AppState::new(cli.data_dir.clone())?;
    state.work_dir_override = cli.work_dir.clone();
    let passphrase = cli.passphrase.as_deref();

    match cli.command {
        Commands::Sync { category } => {
            let category: Category = category.parse()?;
            let engine = state.connect_engine(passphrase).await?;
            sync_directory(&engine, category, cli.json).await
        }
        Commands::SyncFile { name } => {
            let file: SingletonFile = name.parse()?;
            let engine = state.connect_engine(passphrase).await?;
            sync_file(&engine, file, cli.json).await
        }
        Commands::SyncAll => {
            let engine = state.connect_engine(passphrase).await?;
            sync_all(&engine, cli.json).await
        }
        Commands::Plan { category } => {
            let category: Category = category.parse()?;
            let engine = state.connect_engine(passphrase).await?;
            plan(&engine, category, cli.json).await
        }
        Commands::Manifest => {
            let engine = state.connect_engine(passphrase).await?;
            let manifest = engine.manifest();
            for key in manifest.unknown_url_keys() {
                warn!("Manifest names unknown target '{}'", key);
            }
            print_json(manifest)?;
            Ok(Outcome::Clean)
        }
        Commands::Settings { action } => settings(&mut state, action, cli.json),
        Commands::Credential { action } => credential(&state, action, passphrase),
    }
}

// ── Sync ────────────────────────────────────────────────

/// Cancel `token` on the first Ctrl-C; exit on the second.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted; finishing downloads in flight (Ctrl-C again to quit)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted twice; exiting");
            std::process::exit(130);
        }
    });
}

fn print_progress(target: SyncTarget, event: &ProgressEvent) {
    let mark = if event.error { "failed" } else { "ok" };
    println!(
        "[{}] {}/{} {} {}",
        target, event.completed, event.total, event.file_name, mark
    );
}

async fn sync_directory(
    engine: &SyncEngine,
    category: Category,
    json: bool,
) -> LauncherResult<Outcome> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let mut handle = engine.sync_directory(category, cancel);
    while let Some(event) = handle.next_event().await {
        if !json {
            print_progress(SyncTarget::Directory(category), &event);
        }
    }
    let report = handle.finish().await?;
    report_all(&[report], json)
}

async fn sync_file(engine: &SyncEngine, file: SingletonFile, json: bool) -> LauncherResult<Outcome> {
    let outcome = engine.sync_file(file).await?;
    if json {
        print_json(&outcome)?;
    } else {
        println!("{}: {:?}", file, outcome);
    }

    Ok(match outcome {
        FileSyncOutcome::Failed => Outcome::Partial,
        FileSyncOutcome::Updated | FileSyncOutcome::Skipped => Outcome::Clean,
    })
}

async fn sync_all(engine: &SyncEngine, json: bool) -> LauncherResult<Outcome> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let reports = engine
        .sync_all(&cancel, |target, event| {
            if !json {
                print_progress(target, event);
            }
        })
        .await?;

    if reports.len() < SyncTarget::ALL.len() {
        info!("Sync stopped after {} of {} targets", reports.len(), SyncTarget::ALL.len());
        report_all(&reports, json)?;
        return Ok(Outcome::Partial);
    }
    report_all(&reports, json)
}

fn report_all(reports: &[SyncReport], json: bool) -> LauncherResult<Outcome> {
    if json {
        print_json(&reports)?;
    } else {
        for r in reports {
            let status = if let Some(error) = &r.error {
                format!("error: {}", error)
            } else if r.skipped {
                "skipped".to_string()
            } else {
                format!(
                    "{} deleted, {} downloaded, {} failed{}",
                    r.deleted,
                    r.downloaded,
                    r.failed + r.delete_failures,
                    if r.cancelled { " (cancelled)" } else { "" }
                )
            };
            println!("{:<14} {}", r.target.to_string(), status);
        }
    }

    Ok(if reports.iter().all(SyncReport::is_clean) {
        Outcome::Clean
    } else {
        Outcome::Partial
    })
}

async fn plan(engine: &SyncEngine, category: Category, json: bool) -> LauncherResult<Outcome> {
    let plan = engine.plan(category).await?;
    if json {
        print_json(&plan)?;
        return Ok(Outcome::Clean);
    }

    match plan {
        None => println!("{}: not synced (disabled or unavailable)", category),
        Some(plan) if plan.is_empty() => println!("{}: up to date", category),
        Some(plan) => {
            for name in &plan.to_delete {
                println!("- {}", name);
            }
            for name in &plan.to_fetch {
                println!("+ {}", name);
            }
        }
    }
    Ok(Outcome::Clean)
}

// ── Settings ────────────────────────────────────────────

fn settings(state: &mut AppState, action: SettingsAction, json: bool) -> LauncherResult<Outcome> {
    if let SettingsAction::Set { key, value } = action {
        state.launcher_settings.set(&key, &value)?;
        state.save_settings()?;
        info!("Saved '{}' to launcher settings", key);
    }

    if json {
        print_json(&state.launcher_settings)?;
    } else {
        let s = &state.launcher_settings;
        println!("data_dir               {}", state.data_dir.display());
        println!("work_dir               {}", state.work_dir().display());
        println!("manifest_url           {}", s.manifest_url);
        println!("download_concurrency   {}", s.download_concurrency);
        println!("download_timeout_secs  {}", s.download_timeout_secs);
        println!("game.autojoin          {}", s.game.autojoin);
        println!("game.ram_jvm_args      {}", s.game.ram_jvm_args.join(" "));
        println!("game.additional_jvm_args {}", s.game.additional_jvm_args.join(" "));
    }
    Ok(Outcome::Clean)
}

// ── Credentials ─────────────────────────────────────────

fn credential(
    state: &AppState,
    action: CredentialAction,
    passphrase: Option<&str>,
) -> LauncherResult<Outcome> {
    let passphrase = passphrase.ok_or_else(|| {
        LauncherError::InvalidSettings(format!("{} or --passphrase is required", PASSPHRASE_ENV))
    })?;
    let store = state.credential_store();

    match action {
        CredentialAction::Store => {
            let mut token = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut token)
                .map_err(|source| LauncherError::Io {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            let token = token.trim();
            if token.is_empty() {
                return Err(LauncherError::Other("no token given on stdin".into()));
            }
            store.store(passphrase, token)?;
            println!("Token stored at {}", store.path().display());
        }
        CredentialAction::Check => {
            store.load(passphrase)?;
            println!("Token at {} is readable", store.path().display());
        }
    }
    Ok(Outcome::Clean)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> LauncherResult<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out).map_err(LauncherError::from)
}
