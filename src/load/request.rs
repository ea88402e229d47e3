//! Construction of stream load PUT requests.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use reqwest::header::{EXPECT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, Request};

use crate::config::GROUP_COMMIT_OPTION;
use crate::error::LoadError;

/// Header carrying the load label.
pub const LABEL_HEADER: &str = "label";

/// Builds one stream load request.
///
/// A builder is used for a single request; the body is moved into the request
/// as-is and never buffered.
#[derive(Default)]
pub struct StreamLoadRequestBuilder {
    url: Option<String>,
    credentials: Option<(String, String)>,
    headers: BTreeMap<String, String>,
    label: Option<String>,
    expect_continue: bool,
    body: Option<Body>,
}

impl fmt::Debug for StreamLoadRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLoadRequestBuilder")
            .field("url", &self.url)
            .field("user", &self.credentials.as_ref().map(|(user, _)| user))
            .field("headers", &self.headers)
            .field("label", &self.label)
            .field("expect_continue", &self.expect_continue)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl StreamLoadRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Asks the server to confirm the request before the body is sent.
    pub fn expect_continue(mut self) -> Self {
        self.expect_continue = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds every option as a request header.
    pub fn options(mut self, options: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builds the request. Fails if the URL or body is missing or an option is
    /// not a valid header.
    ///
    /// With group commit enabled the server assigns labels itself and rejects
    /// requests carrying one, so the label is dropped.
    pub fn build(self, client: &Client) -> Result<Request, LoadError> {
        let url = self
            .url
            .ok_or_else(|| LoadError::Request("url cannot be empty".to_string()))?;
        let body = self
            .body
            .ok_or_else(|| LoadError::Request("request body cannot be empty".to_string()))?;

        let mut headers = HeaderMap::new();
        if self.expect_continue {
            headers.insert(EXPECT, HeaderValue::from_static("100-continue"));
        }

        // Header names are case-insensitive. A label passed as an option takes
        // precedence over the generated one.
        let mut entries: BTreeMap<String, String> = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        if let Some(label) = self.label {
            entries.entry(LABEL_HEADER.to_string()).or_insert(label);
        }
        if entries.contains_key(GROUP_COMMIT_OPTION) && entries.remove(LABEL_HEADER).is_some() {
            warn!("label and group_commit can't be set at the same time, dropping label");
        }

        for (key, value) in &entries {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LoadError::Request(format!("invalid option name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                LoadError::Request(format!("invalid value for option '{}': {}", key, e))
            })?;
            headers.insert(name, value);
        }

        let mut request = client.put(&url).headers(headers);
        if let Some((user, password)) = self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        request
            .body(body)
            .build()
            .map_err(|e| LoadError::Request(e.to_string()))
    }
}
