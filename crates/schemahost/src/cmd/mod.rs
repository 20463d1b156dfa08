use clap::{Args, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod check;
pub mod serve;
pub mod validate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a JSON document against a named schema.
    Validate(ValidateArgs),
    /// Compile every schema in a directory and list their names.
    Check(CheckArgs),
    /// Host a schema directory over HTTP.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Validate(args) => validate::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Serve(args) => serve::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// A `NAME=VALUE` pair naming a schema source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedSource {
    pub name: String,
    pub value: String,
}

fn parse_named_source(input: &str) -> Result<NamedSource, String> {
    match input.split_once('=') {
        Some((name, value)) if !name.is_empty() && !value.is_empty() => Ok(NamedSource {
            name: name.to_string(),
            value: value.to_string(),
        }),
        _ => Err(format!("expected NAME=VALUE, got `{input}`")),
    }
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Name of the schema to validate against.
    pub name: String,
    /// Load every schema in a directory (names are relative paths without `.json`).
    #[arg(long, value_name = "DIR")]
    pub schema_dir: Option<PathBuf>,
    /// Register a schema file under a name.
    #[arg(long = "schema", value_name = "NAME=PATH", value_parser = parse_named_source)]
    pub schemas: Vec<NamedSource>,
    /// Fetch and register a schema from a URL.
    #[arg(long = "url", value_name = "NAME=URL", value_parser = parse_named_source)]
    pub urls: Vec<NamedSource>,
    /// JSON document to validate.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON document from a file. Reads stdin when neither --json nor --file is given.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Reject properties a schema does not declare.
    #[arg(long)]
    pub strict: bool,
    /// Disable scalar type coercion.
    #[arg(long)]
    pub no_coerce: bool,
    /// Disable default value insertion.
    #[arg(long)]
    pub no_defaults: bool,
    /// Timeout for each --url fetch (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub fetch_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema directory to compile.
    pub dir: PathBuf,
    /// Reject properties a schema does not declare.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Schema directory to publish under /schemas.
    #[arg(long, default_value = "schemas")]
    pub dir: PathBuf,
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,
    /// Base URL used for links in the index.
    #[arg(long, value_name = "URL")]
    pub public_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Single-threaded runtime: registry fetches and the host only suspend on I/O.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}
