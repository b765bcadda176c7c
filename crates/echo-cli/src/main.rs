//! echo-cli - Command-line client for the echo streaming service
//!
//! Opens a grpc-web channel to an `echo.EchoController` server and prints
//! each event of the call as it arrives.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use streamcall_client::echo::EchoClient;
use streamcall_client::{resolve, Channel, EndpointConfig, Status};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "echo-cli")]
#[command(author, version, about = "Echo streaming service client")]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL [default: http://localhost:8080]
    #[arg(short, long, env = "ECHO_SERVER")]
    server: Option<String>,

    /// Path prefix the service is mounted under (e.g., /api)
    #[arg(long, env = "ECHO_PATH_PREFIX")]
    path_prefix: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "ECHO_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream echoes of a message (server streaming)
    Stream {
        /// Message to echo
        message: String,

        /// Number of echoes
        #[arg(long)]
        repeat: Option<u32>,

        /// Cancel the call after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Send a message and print the single reply (unary)
    Say {
        /// Message to send
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.server.as_deref(),
        cli.path_prefix.as_deref(),
        cli.output.map(Into::into),
        cli.no_color,
    );

    let format = OutputFormat::parse(&merged.output)
        .with_context(|| format!("Unknown output format: {}", merged.output))?;
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let client = create_client(&merged)?;

    // Execute command
    let status = match &cli.command {
        Commands::Stream {
            message,
            repeat,
            timeout,
        } => commands::stream(&client, message, *repeat, *timeout, &ctx).await?,

        Commands::Say { message } => commands::say(&client, message, &ctx).await?,
    };

    client.channel().close();
    Ok(ExitCode::from(exit_status(&status)))
}

/// Create an echo client for the configured server
fn create_client(config: &MergedConfig) -> Result<EchoClient> {
    let mut endpoint = EndpointConfig::new(&config.server);
    if let Some(prefix) = &config.path_prefix {
        endpoint = endpoint.with_path_prefix(prefix);
    }

    let endpoint = resolve(&endpoint).context("Invalid server address")?;
    let channel = Channel::grpc_web(endpoint).context("Failed to create channel")?;
    EchoClient::new(&channel).context("Failed to create echo client")
}

/// Zero for OK, otherwise the status code value
fn exit_status(status: &Status) -> u8 {
    status.code.as_i32().clamp(0, 255) as u8
}

// Implement conversion for OutputFormat to string (for config merge)
impl From<OutputFormat> for &str {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use streamcall_client::Code;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stream() {
        let cli = Cli::try_parse_from([
            "echo-cli",
            "--server",
            "http://echo:8080",
            "stream",
            "Hello World!",
            "--repeat",
            "3",
            "--timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("http://echo:8080"));
        match cli.command {
            Commands::Stream {
                message,
                repeat,
                timeout,
            } => {
                assert_eq!(message, "Hello World!");
                assert_eq!(repeat, Some(3));
                assert_eq!(timeout, Some(5));
            }
            Commands::Say { .. } => panic!("expected stream"),
        }
    }

    #[test]
    fn test_create_client_applies_prefix() {
        let config = MergedConfig {
            server: "http://localhost:8080".into(),
            path_prefix: Some("api".into()),
            output: "text".into(),
            no_color: true,
        };
        let client = create_client(&config).unwrap();
        assert_eq!(client.channel().endpoint().path_prefix(), "/api");
    }

    #[test]
    fn test_create_client_rejects_bad_address() {
        let config = MergedConfig {
            server: "ftp://localhost".into(),
            path_prefix: None,
            output: "text".into(),
            no_color: true,
        };
        assert!(create_client(&config).is_err());
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&Status::ok()), 0);
        assert_eq!(exit_status(&Status::cancelled()), 1);
        assert_eq!(exit_status(&Status::new(Code::Unavailable, "down")), 14);
    }
}
