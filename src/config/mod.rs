//! Load settings.
//!
//! Settings are assembled with [`LoadSettingsBuilder`] and frozen by
//! [`LoadSettingsBuilder::build`], which validates them. A built
//! [`LoadSettings`] is read-only; per-worker overrides go through
//! [`LoadSettings::to_builder`] on a copy.
//!
//! # Structure
//!
//! - `format` - payload format and group commit mode
//! - `retry` - retry policy and backoff schedule

mod format;
mod retry;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use rand::Rng;
use uuid::Uuid;

use crate::error::ConfigError;

pub use format::{BatchMode, Format, GROUP_COMMIT_OPTION, JsonFormat};
pub use retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_MS, MAX_BACKOFF_MS, RetryPolicy};

/// Validated, read-only settings for stream load requests.
///
/// Cloning deep-copies the endpoint list and the option map, so a clone can be
/// handed to another worker and modified through [`LoadSettings::to_builder`]
/// without affecting the original.
#[derive(Clone, PartialEq)]
pub struct LoadSettings {
    endpoints: Vec<String>,
    user: String,
    password: String,
    database: String,
    table: String,
    label_prefix: String,
    format: Option<Format>,
    options: BTreeMap<String, String>,
    batch_mode: BatchMode,
    retry: RetryPolicy,
}

impl fmt::Debug for LoadSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSettings")
            .field("endpoints", &self.endpoints)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("label_prefix", &self.label_prefix)
            .field("format", &self.format)
            .field("options", &self.options)
            .field("batch_mode", &self.batch_mode)
            .field("retry", &self.retry)
            .finish()
    }
}

impl LoadSettings {
    pub fn builder() -> LoadSettingsBuilder {
        LoadSettingsBuilder::new()
    }

    /// Reopens these settings for modification.
    pub fn to_builder(&self) -> LoadSettingsBuilder {
        LoadSettingsBuilder {
            settings: self.clone(),
            endpoint_errors: Vec::new(),
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn label_prefix(&self) -> &str {
        &self.label_prefix
    }

    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Effective stream load options, sent as request headers.
    ///
    /// Format options come first, explicit options override them, and the
    /// group commit entry always follows the configured batch mode.
    pub fn options(&self) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        if let Some(format) = &self.format {
            format.apply(&mut options);
        }
        options.extend(
            self.options
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        self.batch_mode.apply(&mut options);
        options
    }

    /// Checks that every required field is present and the retry policy is
    /// usable. All violations are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(violations))
        }
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let required = [
            ("user", &self.user),
            ("password", &self.password),
            ("database", &self.database),
            ("table", &self.table),
        ];
        for (name, value) in required {
            if value.is_empty() {
                violations.push(format!("{} cannot be empty", name));
            }
        }
        if self.endpoints.is_empty() {
            violations.push("endpoints cannot be empty".to_string());
        }
        violations.extend(self.retry.violations());
        violations
    }

    /// Picks one endpoint uniformly at random.
    pub fn select_endpoint(&self) -> Result<&str, ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::single("endpoints cannot be empty"));
        }
        let index = rand::rng().random_range(0..self.endpoints.len());
        Ok(&self.endpoints[index])
    }

    /// Stream load URL on the given endpoint.
    pub fn load_url(&self, endpoint: &str) -> String {
        format!(
            "http://{}/api/{}/{}/_stream_load",
            endpoint, self.database, self.table
        )
    }

    /// Generates a fresh label: `{prefix}_{database}_{table}_{millis}_{uuid}`.
    ///
    /// The random UUID keeps labels unique across concurrent callers that share
    /// one settings value, even within the same millisecond.
    pub fn next_label(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        format!(
            "{}_{}_{}_{}_{}",
            self.label_prefix,
            self.database,
            self.table,
            millis,
            Uuid::new_v4()
        )
    }
}

/// Fluent builder for [`LoadSettings`]. Its `Debug` output hides the
/// password like [`LoadSettings`] does.
#[derive(Debug, Clone)]
pub struct LoadSettingsBuilder {
    settings: LoadSettings,
    endpoint_errors: Vec<String>,
}

impl Default for LoadSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: LoadSettings {
                endpoints: Vec::new(),
                user: String::new(),
                password: String::new(),
                database: String::new(),
                table: String::new(),
                label_prefix: String::new(),
                format: None,
                options: BTreeMap::new(),
                batch_mode: BatchMode::default(),
                retry: RetryPolicy::default(),
            },
            endpoint_errors: Vec::new(),
        }
    }

    /// Sets the endpoint list from a comma-separated string such as
    /// `"http://fe1:8030,fe2:8030"`. Replaces any previous list; an empty
    /// string clears it.
    pub fn add_endpoints(self, endpoints: &str) -> Self {
        self.endpoints(endpoints.split(','))
    }

    /// Sets the endpoint list. Replaces any previous list.
    ///
    /// Each entry is either `host:port` or a URL whose scheme is dropped.
    /// Blank entries are skipped; unparsable ones are reported by `validate`.
    pub fn endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.settings.endpoints.clear();
        self.endpoint_errors.clear();

        for raw in endpoints {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match parse_endpoint(raw) {
                Ok(endpoint) => self.settings.endpoints.push(endpoint),
                Err(err) => self.endpoint_errors.push(err),
            }
        }

        debug!("Parsed endpoints: {:?}", self.settings.endpoints);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.settings.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.settings.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.settings.database = database.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.settings.table = table.into();
        self
    }

    pub fn label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.label_prefix = prefix.into();
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.settings.format = Some(format);
        self
    }

    pub fn csv_format(
        self,
        column_separator: impl Into<String>,
        line_delimiter: impl Into<String>,
    ) -> Self {
        self.format(Format::csv(column_separator, line_delimiter))
    }

    pub fn json_format(self, format: JsonFormat) -> Self {
        self.format(Format::Json(format))
    }

    /// Adds one stream load option. A later value for the same key wins.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.options.insert(key.into(), value.into());
        self
    }

    pub fn options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in options {
            self.settings.options.insert(key.into(), value.into());
        }
        self
    }

    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.settings.batch_mode = mode;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    /// Reports every problem with the current settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = self.endpoint_errors.clone();
        violations.extend(self.settings.violations());
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(violations))
        }
    }

    /// Validates and freezes the settings.
    pub fn build(self) -> Result<LoadSettings, ConfigError> {
        self.validate()?;
        Ok(self.settings)
    }
}

/// Reduces an endpoint to its `host[:port]` form.
fn parse_endpoint(raw: &str) -> Result<String, String> {
    if !raw.contains("://") {
        if raw.contains('/') || raw.chars().any(char::is_whitespace) {
            return Err(format!("invalid endpoint '{}'", raw));
        }
        return Ok(raw.to_string());
    }

    let url =
        reqwest::Url::parse(raw).map_err(|e| format!("invalid endpoint '{}': {}", raw, e))?;
    let host = url
        .host_str()
        .ok_or_else(|| format!("invalid endpoint '{}': missing host", raw))?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn valid_builder() -> LoadSettingsBuilder {
        LoadSettings::builder()
            .add_endpoints("http://127.0.0.1:8030")
            .user("root")
            .password("secret")
            .database("test")
            .table("orders")
    }

    #[test]
    fn test_build_valid_settings() {
        let settings = valid_builder().build().unwrap();
        assert_eq!(settings.endpoints(), ["127.0.0.1:8030"]);
        assert_eq!(settings.retry(), RetryPolicy::default());
        assert_eq!(settings.batch_mode(), BatchMode::Async);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let err = LoadSettings::builder()
            .retry(RetryPolicy::new(-1, -1))
            .build()
            .unwrap_err();

        assert_eq!(
            err.violations(),
            [
                "user cannot be empty",
                "password cannot be empty",
                "database cannot be empty",
                "table cannot be empty",
                "endpoints cannot be empty",
                "max retries cannot be negative",
                "retry interval cannot be negative",
            ]
        );
    }

    #[test]
    fn test_validate_each_required_field() {
        assert!(valid_builder().user("").validate().is_err());
        assert!(valid_builder().password("").validate().is_err());
        assert!(valid_builder().database("").validate().is_err());
        assert!(valid_builder().table("").validate().is_err());
        assert!(valid_builder().add_endpoints("").validate().is_err());
        assert!(valid_builder().retry(RetryPolicy::new(0, 0)).validate().is_ok());
    }

    #[test]
    fn test_endpoints_parsing() {
        let settings = valid_builder()
            .add_endpoints("http://fe1:8030, fe2:8040 ,,https://fe3")
            .build()
            .unwrap();
        assert_eq!(settings.endpoints(), ["fe1:8030", "fe2:8040", "fe3"]);
    }

    #[test]
    fn test_endpoints_replace_previous_list() {
        let settings = valid_builder()
            .add_endpoints("fe1:8030")
            .endpoints(["fe2:8030", "fe3:8030"])
            .build()
            .unwrap();
        assert_eq!(settings.endpoints(), ["fe2:8030", "fe3:8030"]);
    }

    #[test]
    fn test_invalid_endpoint_is_reported() {
        let err = valid_builder()
            .add_endpoints("fe1:8030,http://")
            .build()
            .unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(err.violations()[0].contains("invalid endpoint"));
    }

    #[test]
    fn test_select_endpoint_picks_from_list() {
        let settings = valid_builder()
            .endpoints(["fe1:8030", "fe2:8030"])
            .build()
            .unwrap();
        for _ in 0..50 {
            let endpoint = settings.select_endpoint().unwrap();
            assert!(settings.endpoints().iter().any(|e| e == endpoint));
        }
    }

    #[test]
    fn test_select_endpoint_empty_list_fails() {
        let settings = LoadSettings::builder().settings;
        assert!(settings.select_endpoint().is_err());
    }

    #[test]
    fn test_load_url() {
        let settings = valid_builder().build().unwrap();
        assert_eq!(
            settings.load_url("fe1:8030"),
            "http://fe1:8030/api/test/orders/_stream_load"
        );
    }

    #[test]
    fn test_options_merge_order() {
        let settings = valid_builder()
            .csv_format(",", "\\n")
            .option("column_separator", "|")
            .option("group_commit", "sync_mode")
            .option("max_filter_ratio", "0.1")
            .option("max_filter_ratio", "0.2")
            .batch_mode(BatchMode::Off)
            .build()
            .unwrap();

        let options = settings.options();
        assert_eq!(options["format"], "csv");
        assert_eq!(options["column_separator"], "|");
        assert_eq!(options["max_filter_ratio"], "0.2");
        assert!(!options.contains_key(GROUP_COMMIT_OPTION));
    }

    #[test]
    fn test_label_format() {
        let settings = valid_builder().label_prefix("demo").build().unwrap();
        let label = settings.next_label();
        let parts: Vec<&str> = label.splitn(5, '_').collect();
        assert_eq!(parts[0], "demo");
        assert_eq!(parts[1], "test");
        assert_eq!(parts[2], "orders");
        assert!(parts[3].parse::<u128>().is_ok());
        assert!(Uuid::parse_str(parts[4]).is_ok());
    }

    #[test]
    fn test_labels_are_unique_under_concurrency() {
        let settings = Arc::new(valid_builder().build().unwrap());
        let labels = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let settings = Arc::clone(&settings);
                let labels = Arc::clone(&labels);
                std::thread::spawn(move || {
                    let local: Vec<String> = (0..1000).map(|_| settings.next_label()).collect();
                    labels.lock().unwrap().extend(local);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(labels.lock().unwrap().len(), 10_000);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = valid_builder().option("timeout", "60").build().unwrap();
        let worker = original
            .to_builder()
            .option("timeout", "120")
            .add_endpoints("fe9:8030")
            .build()
            .unwrap();

        assert_eq!(original.options()["timeout"], "60");
        assert_eq!(original.endpoints(), ["127.0.0.1:8030"]);
        assert_eq!(worker.options()["timeout"], "120");
        assert_eq!(worker.endpoints(), ["fe9:8030"]);
    }

    #[test]
    fn test_debug_hides_password() {
        let builder = valid_builder();
        let settings = builder.clone().build().unwrap();

        for debug in [format!("{:?}", settings), format!("{:?}", builder)] {
            assert!(debug.contains("root"));
            assert!(debug.contains("***"));
            assert!(!debug.contains("secret"));
        }
    }
}
