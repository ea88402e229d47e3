//! Data format and group commit options.

use std::collections::BTreeMap;

/// Layout of a JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFormat {
    /// One JSON object per line.
    ObjectLine,
    /// A single JSON array of objects.
    Array,
}

/// Payload format sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Csv {
        column_separator: String,
        line_delimiter: String,
    },
    Json(JsonFormat),
}

impl Format {
    pub fn csv(column_separator: impl Into<String>, line_delimiter: impl Into<String>) -> Self {
        Format::Csv {
            column_separator: column_separator.into(),
            line_delimiter: line_delimiter.into(),
        }
    }

    /// Writes the stream load options describing this format.
    pub(crate) fn apply(&self, options: &mut BTreeMap<String, String>) {
        match self {
            Format::Csv {
                column_separator,
                line_delimiter,
            } => {
                options.insert("format".to_string(), "csv".to_string());
                options.insert("column_separator".to_string(), column_separator.clone());
                options.insert("line_delimiter".to_string(), line_delimiter.clone());
            }
            Format::Json(JsonFormat::ObjectLine) => {
                options.insert("format".to_string(), "json".to_string());
                options.insert("strip_outer_array".to_string(), "false".to_string());
                options.insert("read_json_by_line".to_string(), "true".to_string());
            }
            Format::Json(JsonFormat::Array) => {
                options.insert("format".to_string(), "json".to_string());
                options.insert("strip_outer_array".to_string(), "true".to_string());
            }
        }
    }
}

/// Server-side group commit mode.
///
/// Any mode other than `Off` makes the server assign labels itself, so the
/// client must not send one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    Sync,
    #[default]
    Async,
    Off,
}

/// Option key carrying the group commit mode.
pub const GROUP_COMMIT_OPTION: &str = "group_commit";

impl BatchMode {
    /// Value of the `group_commit` option, or `None` when group commit is off.
    pub fn option_value(&self) -> Option<&'static str> {
        match self {
            BatchMode::Sync => Some("sync_mode"),
            BatchMode::Async => Some("async_mode"),
            BatchMode::Off => None,
        }
    }

    pub(crate) fn apply(&self, options: &mut BTreeMap<String, String>) {
        match self.option_value() {
            Some(value) => {
                options.insert(GROUP_COMMIT_OPTION.to_string(), value.to_string());
            }
            None => {
                options.remove(GROUP_COMMIT_OPTION);
            }
        }
    }
}
