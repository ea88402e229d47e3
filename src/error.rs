//! Error types for stream load operations.

use reqwest::StatusCode;

use crate::load::LoadResponse;

/// Invalid load settings. Lists every violation found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    violations: Vec<String>,
}

impl ConfigError {
    pub(crate) fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    pub(crate) fn single(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }

    /// The individual problems, in the order they were detected.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid load settings: {}", self.violations.join("; "))
    }
}

impl std::error::Error for ConfigError {}

/// Errors produced while loading data.
///
/// `Transport` and `HttpStatus` are network-level failures and go through
/// retry classification. `Config`, `Source`, `Request` and `Parse` are never
/// retried.
#[derive(Debug)]
pub enum LoadError {
    /// Settings failed validation; nothing was sent.
    Config(ConfigError),
    /// The data source could not be opened.
    Source(std::io::Error),
    /// The outbound request could not be built.
    Request(String),
    /// The request failed below the HTTP layer (connect, timeout, reset...).
    Transport(reqwest::Error),
    /// The server answered with a non-success HTTP status.
    HttpStatus {
        status: StatusCode,
        status_line: String,
    },
    /// The response body is not a valid stream load response.
    Parse {
        source: serde_json::Error,
        body: String,
    },
    /// The server reported a failed load.
    LoadFailed(Box<LoadResponse>),
}

impl LoadError {
    /// Builds an [`LoadError::HttpStatus`] with a `"307 Temporary Redirect"`
    /// style status line.
    pub(crate) fn http_status(status: StatusCode) -> Self {
        let status_line = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        LoadError::HttpStatus {
            status,
            status_line,
        }
    }

    /// Returns true for failures that happened on the wire rather than in the
    /// application protocol.
    pub fn is_transport(&self) -> bool {
        matches!(self, LoadError::Transport(_) | LoadError::HttpStatus { .. })
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Config(err) => write!(f, "{}", err),
            LoadError::Source(err) => write!(f, "failed to open load source: {}", err),
            LoadError::Request(msg) => write!(f, "failed to build request: {}", msg),
            LoadError::Transport(err) => write!(f, "failed to execute request: {}", err),
            LoadError::HttpStatus { status_line, .. } => {
                write!(f, "stream load error: {}", status_line)
            }
            LoadError::Parse { source, .. } => {
                write!(f, "failed to parse stream load response: {}", source)
            }
            LoadError::LoadFailed(response) => match &response.error_message {
                Some(msg) => write!(f, "{}", msg),
                None => write!(f, "load failed with status: {}", response.resp.status),
            },
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Config(err) => Some(err),
            LoadError::Source(err) => Some(err),
            LoadError::Transport(err) => Some(err),
            LoadError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        LoadError::Config(err)
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        LoadError::Transport(err)
    }
}
