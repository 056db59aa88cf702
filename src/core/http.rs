use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION};
use reqwest::Client;

pub const APP_USER_AGENT: &str = concat!("Hominum/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the shared HTTP client.
///
/// `token`, when present, is sent as a bearer credential on every request.
pub fn build_http_client(token: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", token.trim())) {
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        } else {
            tracing::warn!("API token contains invalid header characters; sending requests unauthenticated");
        }
    }

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}
