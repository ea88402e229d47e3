use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use doris_stream_load::{
    BatchMode, Format, JsonFormat, LoadSettings, LoadSource, RetryPolicy, StreamLoadClient,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// doris-load - Apache Doris stream load runner
///
/// Loads one file, or standard input, into a Doris table and prints the
/// server response as JSON.
///
/// Examples:
///   doris-load --fe-nodes fe1:8030 --user root --password secret \
///       --database demo --table orders data.csv
///   cat rows.json | doris-load ... --format json-lines -
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Comma-separated frontend endpoints, host:port
    #[arg(long = "fe-nodes", env = "DORIS_FE_NODES", value_name = "LIST")]
    fe_nodes: String,

    #[arg(long, env = "DORIS_USER")]
    user: String,

    #[arg(long, env = "DORIS_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    database: String,

    #[arg(long)]
    table: String,

    /// Prefix of generated load labels
    #[arg(long = "label-prefix", default_value = "doris_load")]
    label_prefix: String,

    /// Payload format (server default is CSV when omitted)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    #[arg(long = "column-separator", default_value = ",")]
    column_separator: String,

    #[arg(long = "line-delimiter", default_value = "\\n")]
    line_delimiter: String,

    /// Group commit mode
    #[arg(long = "batch-mode", value_enum, default_value_t = BatchModeArg::Async)]
    batch_mode: BatchModeArg,

    #[arg(long = "max-retries", default_value_t = doris_stream_load::config::DEFAULT_MAX_RETRIES)]
    max_retries: i32,

    #[arg(
        long = "retry-interval-ms",
        default_value_t = doris_stream_load::config::DEFAULT_RETRY_INTERVAL_MS
    )]
    retry_interval_ms: i64,

    /// Extra stream load header, may be repeated
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Data file, or "-" for standard input
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Csv,
    JsonLines,
    JsonArray,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BatchModeArg {
    Sync,
    Async,
    Off,
}

impl From<BatchModeArg> for BatchMode {
    fn from(arg: BatchModeArg) -> Self {
        match arg {
            BatchModeArg::Sync => BatchMode::Sync,
            BatchModeArg::Async => BatchMode::Async,
            BatchModeArg::Off => BatchMode::Off,
        }
    }
}

impl Cli {
    fn format(&self) -> Option<Format> {
        self.format.map(|format| match format {
            FormatArg::Csv => Format::csv(&self.column_separator, &self.line_delimiter),
            FormatArg::JsonLines => Format::Json(JsonFormat::ObjectLine),
            FormatArg::JsonArray => Format::Json(JsonFormat::Array),
        })
    }

    fn settings(&self) -> Result<LoadSettings> {
        let mut builder = LoadSettings::builder()
            .add_endpoints(&self.fe_nodes)
            .user(&self.user)
            .password(&self.password)
            .database(&self.database)
            .table(&self.table)
            .label_prefix(&self.label_prefix)
            .options(self.options.iter().cloned())
            .batch_mode(self.batch_mode.into())
            .retry(RetryPolicy::new(self.max_retries, self.retry_interval_ms));
        if let Some(format) = self.format() {
            builder = builder.format(format);
        }
        builder.build().context("Invalid load settings")
    }
}

fn parse_option(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

async fn read_source(input: &Path) -> Result<LoadSource> {
    if input.as_os_str() == "-" {
        let mut data = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .context("Failed to read standard input")?;
        return Ok(LoadSource::bytes(data));
    }

    tokio::fs::metadata(input)
        .await
        .with_context(|| format!("Cannot read input file {:?}", input))?;
    Ok(LoadSource::file(input))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let settings = cli.settings()?;
    let source = read_source(&cli.input).await?;
    let client = StreamLoadClient::new(settings)?;

    let response = client.load(source).await.context("Stream load failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        bail!(
            "{}",
            response
                .error_message
                .as_deref()
                .unwrap_or("load failed")
        );
    }
    Ok(())
}
