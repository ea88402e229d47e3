//! Single stream load attempts: request construction and response handling.

mod request;
mod response;

use log::{debug, error, warn};
use reqwest::header::LOCATION;
use reqwest::{Client, Request, StatusCode, Url};

use crate::error::LoadError;

pub use request::{LABEL_HEADER, StreamLoadRequestBuilder};
pub use response::{
    LoadResponse, LoadStatus, MAX_RESPONSE_BYTES, RespContent, interpret_response, parse_response,
};

/// Redirects that keep the method and body, as a frontend uses to hand a load
/// to a backend.
const FOLLOWED_REDIRECTS: &[StatusCode] = &[
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// What the server did with one request.
#[derive(Debug)]
pub enum Reply {
    /// The server answered with a stream load response.
    Loaded(LoadResponse),
    /// The server sent the load elsewhere. The request must be sent again to
    /// `location`, which never carries credentials.
    Redirect { status: StatusCode, location: Url },
}

/// Sends one request and interprets the answer. Redirects are returned, not
/// followed, and there are no retries.
pub async fn execute(client: &Client, request: Request) -> Result<Reply, LoadError> {
    let response = client.execute(request).await.map_err(|e| {
        error!("Failed to execute stream load request: {}", e);
        LoadError::Transport(e)
    })?;

    let status = response.status();
    if FOLLOWED_REDIRECTS.contains(&status) {
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| response.url().join(value).ok());

        return match location {
            Some(mut location) => {
                // Credentials are re-applied from the settings on the next hop.
                let _ = location.set_username("");
                let _ = location.set_password(None);
                debug!("Stream load redirected ({}) to {}", status, location);
                Ok(Reply::Redirect { status, location })
            }
            None => {
                warn!("Redirect ({}) without a usable Location header", status);
                Err(LoadError::http_status(status))
            }
        };
    }

    interpret_response(response).await.map(Reply::Loaded)
}
