//! Stream load client with retry and exponential backoff.

use std::io;
use std::sync::Arc;

use log::{debug, error, info, warn};
use reqwest::Client;

use crate::config::{LoadSettings, RetryPolicy};
use crate::error::LoadError;
use crate::http::{PatternClassifier, RetryClassifier, shared_client, should_retry};
use crate::load::{self, LoadResponse, Reply, StreamLoadRequestBuilder};
use crate::source::LoadSource;

/// Redirects followed within one attempt.
const MAX_REDIRECTS: u32 = 3;

/// Loads data into one table.
///
/// The client holds no per-call state, so a single instance can be shared by
/// any number of concurrent tasks.
#[derive(Clone)]
pub struct StreamLoadClient {
    settings: LoadSettings,
    http: Client,
    classifier: Arc<dyn RetryClassifier>,
}

impl StreamLoadClient {
    /// Creates a client on the shared HTTP connection pool.
    pub fn new(settings: LoadSettings) -> Result<Self, LoadError> {
        Self::with_http_client(settings, shared_client()?)
    }

    /// Creates a client on a caller-provided HTTP client.
    ///
    /// The client should not follow redirects itself (see
    /// [`build_client`](crate::http::build_client)); redirects are followed
    /// here, with credentials and body re-applied.
    pub fn with_http_client(settings: LoadSettings, http: Client) -> Result<Self, LoadError> {
        settings.validate()?;
        Ok(Self {
            settings,
            http,
            classifier: Arc::new(PatternClassifier),
        })
    }

    /// Replaces the default retry classifier.
    pub fn with_classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    /// Loads `source`, retrying transient failures with exponential backoff.
    ///
    /// Returns `Ok` whenever the server answered with a stream load response,
    /// successful or not; check [`LoadResponse::status`]. Returns `Err` when no
    /// such response was obtained. Either way the result is that of the last
    /// attempt.
    ///
    /// All attempts share one label, so a retry of a load that was in fact
    /// committed is rejected by the server instead of duplicating rows. With
    /// group commit enabled no label is sent.
    ///
    /// A single-pass source (see [`LoadSource::stream`]) is sent once; retries
    /// stop after the first attempt.
    #[tracing::instrument(skip(self, source))]
    pub async fn load(&self, source: impl Into<LoadSource>) -> Result<LoadResponse, LoadError> {
        let mut source = source.into();
        let policy = self.settings.retry();
        let max_retries = policy.max_retries().max(0) as u32;
        let label = self.settings.next_label();

        info!(
            "Starting stream load into {}.{}",
            self.settings.database(),
            self.settings.table()
        );
        info!("Label: {}", label);
        log_retry_strategy(&policy);

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = policy.backoff(attempt);
                info!(
                    "Retry attempt {}/{}, waiting {:?}",
                    attempt, max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }

            let result = self.send(&mut source, &label).await;

            if matches!(&result, Ok(response) if response.is_success()) {
                info!(
                    "Stream load completed successfully on attempt {}",
                    attempt + 1
                );
                return result;
            }

            let retryable = should_retry(self.classifier.as_ref(), &result);
            match &result {
                Err(e) => error!(
                    "Attempt {} failed with error: {} (retryable: {})",
                    attempt + 1,
                    e,
                    retryable
                ),
                Ok(response) => error!(
                    "Attempt {} failed with status: {} (retryable: {}): {}",
                    attempt + 1,
                    response.resp.status,
                    retryable,
                    response.error_message.as_deref().unwrap_or_default()
                ),
            }

            if !retryable {
                warn!("Error is not retryable, stopping after {} attempt(s)", attempt + 1);
                return result;
            }
            if attempt >= max_retries {
                warn!("Reached maximum retry attempts ({}), stopping", max_retries);
                return result;
            }
            if !source.is_replayable() {
                warn!("Load source is single-pass and was already sent, not retrying");
                return result;
            }

            attempt += 1;
        }
    }

    /// One attempt against a freshly selected endpoint.
    ///
    /// Redirects are followed with the same label, credentials and options and
    /// a fresh body. A single-pass source cannot be resent, so its redirect is
    /// returned as an error for the retry loop to judge.
    async fn send(&self, source: &mut LoadSource, label: &str) -> Result<LoadResponse, LoadError> {
        let endpoint = self.settings.select_endpoint()?;
        let mut url = self.settings.load_url(endpoint);
        let options = self.settings.options();
        let mut redirects = 0;

        loop {
            debug!("Sending stream load request to {}", url);
            let body = source
                .next_body()
                .await
                .map_err(LoadError::Source)?
                .ok_or_else(|| {
                    LoadError::Source(io::Error::other("load source already consumed"))
                })?;

            let request = StreamLoadRequestBuilder::new()
                .url(url.as_str())
                .basic_auth(self.settings.user(), self.settings.password())
                .expect_continue()
                .label(label)
                .options(&options)
                .body(body)
                .build(&self.http)?;

            match load::execute(&self.http, request).await? {
                Reply::Loaded(response) => return Ok(response),
                Reply::Redirect { status, location } => {
                    if !source.is_replayable() {
                        warn!("Cannot follow redirect to {}: load source is single-pass", location);
                        return Err(LoadError::http_status(status));
                    }
                    if redirects >= MAX_REDIRECTS {
                        warn!("Too many redirects, last to {}", location);
                        return Err(LoadError::http_status(status));
                    }
                    redirects += 1;
                    url = location.to_string();
                }
            }
        }
    }
}

fn log_retry_strategy(policy: &RetryPolicy) {
    if !policy.is_enabled() {
        debug!("Retry disabled (max retries = 0)");
        return;
    }

    let intervals: Vec<String> = policy
        .schedule()
        .iter()
        .map(|d| format!("{}ms", d.as_millis()))
        .collect();
    debug!(
        "Retry strategy: exponential backoff with {} retries, intervals: [{}], total max wait: {}ms",
        policy.max_retries(),
        intervals.join(", "),
        policy.total_backoff().as_millis()
    );
}
