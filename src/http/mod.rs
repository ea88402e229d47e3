//! HTTP transport and retry classification.

mod client;
mod retry;

pub use client::{MAX_IDLE_CONNECTIONS_PER_HOST, REQUEST_TIMEOUT, build_client, shared_client};
pub use retry::{
    PatternClassifier, RETRYABLE_ERROR_PATTERNS, RETRYABLE_RESPONSE_PATTERNS, RetryClassifier,
    is_retryable_message, should_retry,
};

#[cfg(test)]
pub use retry::MockRetryClassifier;
