//! Retry classification for stream load failures.
//!
//! The server exposes no structured "retryable" flag, so the default
//! classifier is a heuristic over error kinds and message text. It sits behind
//! [`RetryClassifier`] so it can be replaced wholesale.

use std::error::Error as StdError;
use std::io;

use reqwest::StatusCode;

use crate::error::LoadError;
use crate::load::{LoadResponse, LoadStatus};

/// Lowercase fragments of transport error messages that indicate a transient
/// failure.
pub const RETRYABLE_ERROR_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timeout",
    "connection aborted",
    "connection closed",
    "timeout",
    "timed out",
    "network is unreachable",
    "no such host",
    "dns error",
    "temporary failure",
    "i/o timeout",
    "eof",
    "broken pipe",
    "307 temporary redirect",
    "302 found",
    "301 moved permanently",
];

/// Lowercase fragments of failed-load messages worth another attempt.
pub const RETRYABLE_RESPONSE_PATTERNS: &[&str] = &["connect", "unavailable", "timeout", "redirect"];

const RETRYABLE_IO_KINDS: &[io::ErrorKind] = &[
    io::ErrorKind::ConnectionRefused,
    io::ErrorKind::ConnectionReset,
    io::ErrorKind::ConnectionAborted,
    io::ErrorKind::NotConnected,
    io::ErrorKind::TimedOut,
    io::ErrorKind::UnexpectedEof,
    io::ErrorKind::BrokenPipe,
    io::ErrorKind::HostUnreachable,
    io::ErrorKind::NetworkUnreachable,
];

/// A redirect where a fixed endpoint was expected, usually an FE handing the
/// load to a BE.
const REDIRECT_STATUSES: &[StatusCode] = &[
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::TEMPORARY_REDIRECT,
];

/// Decides whether a failed attempt is worth repeating.
#[cfg_attr(test, mockall::automock)]
pub trait RetryClassifier: Send + Sync {
    /// Classifies an attempt that produced an error.
    fn is_retryable_error(&self, error: &LoadError) -> bool;

    /// Classifies an attempt the server answered with a failed load.
    fn is_retryable_response(&self, response: &LoadResponse) -> bool;
}

/// Applies a classifier to the result of one attempt.
///
/// An error is always judged as an error; the response is only consulted when
/// there was none. Successful loads are never retried.
pub fn should_retry(
    classifier: &dyn RetryClassifier,
    result: &Result<LoadResponse, LoadError>,
) -> bool {
    match result {
        Err(error) => classifier.is_retryable_error(error),
        Ok(response) if response.is_success() => false,
        Ok(response) => classifier.is_retryable_response(response),
    }
}

/// Default classifier backed by the pattern tables in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl RetryClassifier for PatternClassifier {
    fn is_retryable_error(&self, error: &LoadError) -> bool {
        match error {
            LoadError::Transport(err) => is_retryable_transport(err),
            LoadError::HttpStatus { status, .. } => {
                REDIRECT_STATUSES.contains(status) || is_retryable_message(&error.to_string())
            }
            // Config, source, request and parse errors repeat identically.
            _ => false,
        }
    }

    fn is_retryable_response(&self, response: &LoadResponse) -> bool {
        if response.status != LoadStatus::Failure {
            return false;
        }
        response
            .error_message
            .as_deref()
            .is_some_and(|message| contains_any(message, RETRYABLE_RESPONSE_PATTERNS))
    }
}

/// Checks a transport error message against [`RETRYABLE_ERROR_PATTERNS`].
pub fn is_retryable_message(message: &str) -> bool {
    contains_any(message, RETRYABLE_ERROR_PATTERNS)
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() || err.is_redirect() {
        return true;
    }

    // The top-level message only names the URL, so start at the cause.
    let mut text = String::new();
    let mut current = err.source();
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if RETRYABLE_IO_KINDS.contains(&io_err.kind()) {
                return true;
            }
        }
        text.push_str(&e.to_string());
        text.push_str(": ");
        current = e.source();
    }

    is_retryable_message(&text)
}

fn contains_any(message: &str, patterns: &[&str]) -> bool {
    let message = message.to_lowercase();
    patterns.iter().any(|pattern| message.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{RespContent, parse_response};

    fn failure(message: &str) -> LoadResponse {
        LoadResponse {
            status: LoadStatus::Failure,
            resp: RespContent::default(),
            error_message: Some(message.to_string()),
        }
    }

    fn http_status(status: StatusCode) -> LoadError {
        LoadError::http_status(status)
    }

    #[test]
    fn test_is_retryable_message() {
        assert!(is_retryable_message("dial tcp: Connection Refused"));
        assert!(is_retryable_message("connection reset by peer"));
        assert!(is_retryable_message("operation timed out"));
        assert!(is_retryable_message("unexpected EOF"));
        assert!(is_retryable_message("broken pipe"));
        assert!(!is_retryable_message("invalid column count"));
        assert!(!is_retryable_message("access denied for user"));
    }

    #[test]
    fn test_redirect_statuses_are_retryable() {
        let classifier = PatternClassifier;
        assert!(classifier.is_retryable_error(&http_status(StatusCode::TEMPORARY_REDIRECT)));
        assert!(classifier.is_retryable_error(&http_status(StatusCode::FOUND)));
        assert!(classifier.is_retryable_error(&http_status(StatusCode::MOVED_PERMANENTLY)));
    }

    #[test]
    fn test_timeout_statuses_are_retryable() {
        let classifier = PatternClassifier;
        assert!(classifier.is_retryable_error(&http_status(StatusCode::GATEWAY_TIMEOUT)));
        assert!(classifier.is_retryable_error(&http_status(StatusCode::REQUEST_TIMEOUT)));
    }

    #[test]
    fn test_other_statuses_are_not_retryable() {
        let classifier = PatternClassifier;
        assert!(!classifier.is_retryable_error(&http_status(StatusCode::UNAUTHORIZED)));
        assert!(!classifier.is_retryable_error(&http_status(StatusCode::BAD_REQUEST)));
        assert!(!classifier.is_retryable_error(&http_status(StatusCode::INTERNAL_SERVER_ERROR)));
    }

    #[test]
    fn test_local_errors_are_not_retryable() {
        let classifier = PatternClassifier;
        let parse = parse_response("connection refused").unwrap_err();
        assert!(!classifier.is_retryable_error(&parse));
        assert!(!classifier.is_retryable_error(&LoadError::Request(
            "connection timeout".to_string()
        )));
        assert!(!classifier.is_retryable_error(&LoadError::Source(io::Error::from(
            io::ErrorKind::ConnectionRefused
        ))));
    }

    #[test]
    fn test_response_classification() {
        let classifier = PatternClassifier;
        assert!(classifier.is_retryable_response(&failure("Backend Unavailable")));
        assert!(classifier.is_retryable_response(&failure("failed to connect to BE")));
        assert!(classifier.is_retryable_response(&failure("publish TIMEOUT")));
        assert!(classifier.is_retryable_response(&failure("redirect failed")));
        assert!(!classifier.is_retryable_response(&failure("too many filtered rows")));
        assert!(!classifier.is_retryable_response(&failure("invalid column count")));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .put(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();

        assert!(PatternClassifier.is_retryable_error(&LoadError::Transport(err)));
    }

    #[test]
    fn test_should_retry_prefers_error() {
        let mut classifier = MockRetryClassifier::new();
        classifier.expect_is_retryable_error().times(1).return_const(true);
        classifier.expect_is_retryable_response().never();

        let result = Err(LoadError::Request("boom".to_string()));
        assert!(should_retry(&classifier, &result));
    }

    #[test]
    fn test_should_retry_never_retries_success() {
        let mut classifier = MockRetryClassifier::new();
        classifier.expect_is_retryable_error().never();
        classifier.expect_is_retryable_response().never();

        let result = parse_response(r#"{"Status":"Success"}"#);
        assert!(!should_retry(&classifier, &result));
    }

    #[test]
    fn test_should_retry_consults_response() {
        let mut classifier = MockRetryClassifier::new();
        classifier.expect_is_retryable_error().never();
        classifier
            .expect_is_retryable_response()
            .times(1)
            .return_const(false);

        let result = Ok(failure("too many filtered rows"));
        assert!(!should_retry(&classifier, &result));
    }
}
