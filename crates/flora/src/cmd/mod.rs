use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use flora_client::{Client, ClientCallback, ClientConfig};

use crate::exit::{client_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;
use crate::payload::PayloadValue;

pub mod get;
pub mod listen;
pub mod post;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish one message.
    Post(PostArgs),
    /// Send a request and print every reply.
    Get(GetArgs),
    /// Subscribe to topics and print deliveries.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Post(args) => post::run(args),
        Command::Get(args) => get::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PostArgs {
    /// Broker URI, e.g. unix:/run/flora.sock#my-tool.
    pub uri: String,
    /// Topic to publish on.
    pub topic: String,
    /// Publish with the request class instead of instant.
    #[arg(long)]
    pub request: bool,
    /// Payload entry as TYPE:VALUE (i32, f32, i64, f64, str, hex). Repeatable.
    #[arg(long = "value", short = 'v', value_name = "TYPE:VALUE")]
    pub values: Vec<PayloadValue>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Broker URI.
    pub uri: String,
    /// Topic to query.
    pub topic: String,
    /// How long to collect replies (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
    /// Payload entry as TYPE:VALUE. Repeatable.
    #[arg(long = "value", short = 'v', value_name = "TYPE:VALUE")]
    pub values: Vec<PayloadValue>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Broker URI.
    pub uri: String,
    /// Topics to subscribe to.
    #[arg(required = true)]
    pub topics: Vec<String>,
    /// Subscribe to requests (answered with an empty success) instead of posts.
    #[arg(long)]
    pub request: bool,
    /// Exit after printing N deliveries.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn connect(uri: &str, callback: Arc<dyn ClientCallback>) -> CliResult<Client> {
    let client = Client::new(ClientConfig::default());
    client
        .connect(uri, callback)
        .map_err(|err| client_error("connect failed", err))?;
    Ok(client)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
