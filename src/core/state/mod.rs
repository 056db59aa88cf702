pub mod app_state;
pub mod settings;

pub use app_state::{AppState, PASSPHRASE_ENV};
pub use settings::{GameSettings, LauncherSettings};
