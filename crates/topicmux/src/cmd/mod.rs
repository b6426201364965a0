use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use topicmux_conn::{BinarySerializer, JsonSerializer, Serializer};
use topicmux_transport::Endpoint;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod publish;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and print messages on the given topics.
    Listen(ListenArgs),
    /// Connect and publish a message on one topic.
    Publish(PublishArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(
    command: Command,
    format: OutputFormat,
    serializer: SerializerKind,
) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format, serializer).await,
        Command::Publish(args) => publish::run(args, serializer).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum SerializerKind {
    Json,
    Binary,
}

impl SerializerKind {
    pub fn build(self) -> Arc<dyn Serializer> {
        match self {
            SerializerKind::Json => Arc::new(JsonSerializer),
            SerializerKind::Binary => Arc::new(BinarySerializer),
        }
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Endpoint to bind (tcp://host:port, unix:/path, or a bare path).
    pub endpoint: Endpoint,
    /// Topics to subscribe to (comma-separated).
    #[arg(long = "topic", short = 't', value_delimiter = ',', required = true)]
    pub topics: Vec<String>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Close a connection after this long (e.g. 30s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub read_deadline: Option<String>,
    /// Restart the read deadline after every frame.
    #[arg(long, requires = "read_deadline")]
    pub idle: bool,
    /// Drop messages instead of stalling when output falls behind.
    #[arg(long)]
    pub drop_when_full: bool,
    /// Per-topic queue length.
    #[arg(long, default_value_t = 16)]
    pub capacity: usize,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// Topic to publish on.
    #[arg(long, short = 't')]
    pub topic: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Publish the payload this many times.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub repeat: u64,
    /// Pause between repeated publishes (e.g. 1s, 250ms).
    #[arg(long, value_name = "DURATION")]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
