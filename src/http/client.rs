//! Shared HTTP transport for stream load requests.

use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, error};
use reqwest::Client;
use reqwest::redirect::Policy;

use crate::error::LoadError;

/// Total time allowed for one request, body upload included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Idle connections kept per endpoint.
pub const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 50;

static SHARED_CLIENT: OnceLock<Result<Client, String>> = OnceLock::new();

/// Builds a new HTTP client configured for stream load.
///
/// Redirects are not followed: a frontend redirects loads to a backend on
/// another host, and the request has to be rebuilt with credentials and a
/// fresh body for the new target.
pub fn build_client() -> Result<Client, LoadError> {
    Client::builder()
        .user_agent(concat!("doris-stream-load/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
        .redirect(Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(LoadError::Transport)
}

/// Returns the process-wide client, building it exactly once on first use.
///
/// A build failure is remembered and reported to every later caller. Clones
/// share the connection pool.
pub fn shared_client() -> Result<Client, LoadError> {
    SHARED_CLIENT
        .get_or_init(|| {
            debug!("Initializing shared HTTP client");
            build_client().map_err(|e| {
                error!("Failed to build shared HTTP client: {}", e);
                e.to_string()
            })
        })
        .clone()
        .map_err(|msg| LoadError::Request(format!("shared HTTP client unavailable: {}", msg)))
}
