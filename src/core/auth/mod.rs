// ─── Credentials ───
// Encrypted storage for the API token used against the manifest host.

pub mod credentials;

pub use credentials::{CredentialError, CredentialStore};
