//! Client library for the Apache Doris stream load HTTP interface.
//!
//! ```no_run
//! use doris_stream_load::{LoadSettings, StreamLoadClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = LoadSettings::builder()
//!     .add_endpoints("fe1:8030,fe2:8030")
//!     .user("root")
//!     .password("secret")
//!     .database("demo")
//!     .table("orders")
//!     .csv_format(",", "\\n")
//!     .build()?;
//!
//! let client = StreamLoadClient::new(settings)?;
//! let response = client.load("1,Alice,25\n2,Bob,30\n").await?;
//! println!("loaded {} rows", response.resp.number_loaded_rows);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod load;
pub mod source;

pub use client::StreamLoadClient;
pub use config::{BatchMode, Format, JsonFormat, LoadSettings, LoadSettingsBuilder, RetryPolicy};
pub use error::{ConfigError, LoadError};
pub use load::{LoadResponse, LoadStatus, RespContent};
pub use source::LoadSource;
