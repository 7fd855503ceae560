use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use callbook_client::ClientRuntime;
use callbook_core::config::{Config, LoggingConfig};
use callbook_gateway::{GatewayState, start_gateway};

#[derive(Parser)]
#[command(
    name = "callbook",
    about = "Voice booking assistant: conversation gateway and voice client",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the conversation gateway
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Talk to a running gateway from this terminal
    Call {
        /// Gateway WebSocket URL (overrides client.server_url)
        #[arg(long)]
        server: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Query a local gateway's health endpoint
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let default_level = config
        .level
        .clone()
        .unwrap_or_else(|| (if verbose { "debug" } else { "info" }).to_string());
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    for directive in &config.filters {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring invalid log filter {directive:?}: {e}"),
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (config.format.as_str(), config.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

/// Log warnings and fail on errors.
fn check_config(config: &Config) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    for error in &errors {
        tracing::error!("{error}");
    }
    if !errors.is_empty() {
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }
    Ok(())
}

async fn run_call(config: &Config) -> anyhow::Result<()> {
    let mut runtime = ClientRuntime::from_config(config)?;
    let mut statuses = runtime
        .take_statuses()
        .context("status stream already taken")?;
    let handle = runtime.handle();
    let shutdown = CancellationToken::new();
    let client = tokio::spawn(runtime.run(shutdown.clone()));

    println!("Enter: start talking | s + Enter: stop recording | q + Enter: hang up | Ctrl-C: quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(status) = statuses.recv() => println!("{status}"),
            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    "" => handle.start(),
                    "s" => handle.stop(),
                    "q" => handle.hangup(),
                    other => println!("Unknown command: {other}"),
                },
                None => break,
            },
        }
    }

    shutdown.cancel();
    client.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in a local .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(&config.logging(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            check_config(&config)?;
            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!("Starting Callbook gateway on port {port}");
            let state = GatewayState::from_config(Arc::new(config))?;
            start_gateway(Arc::new(state), port).await?;
        }
        Commands::Call { server } => {
            if let Some(server_url) = server {
                let mut client = config.client();
                client.server_url = server_url;
                config.client = Some(client);
            }
            run_call(&config).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                check_config(&config)?;
                println!("Configuration OK: {}", config_path.display());
            }
        },
        Commands::Status => {
            println!("Callbook v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            let url = format!("http://127.0.0.1:{}/health", config.gateway_port());
            match reqwest::get(&url).await {
                Ok(response) => {
                    let health: serde_json::Value = response.json().await?;
                    println!("Gateway: {} ({} live sessions)", health["status"], health["sessions"]);
                }
                Err(_) => println!("Gateway: not running on port {}", config.gateway_port()),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_port() {
        let cli = Cli::try_parse_from(["callbook", "serve", "--port", "8080", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { port: Some(8080) }));
    }

    #[test]
    fn test_parse_call_and_config() {
        let cli = Cli::try_parse_from(["callbook", "call", "--server", "ws://10.0.0.5:3000/ws"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Call { server: Some(ref s) } if s.ends_with("/ws")));

        let cli = Cli::try_parse_from(["callbook", "--config", "/tmp/c.json5", "config", "show"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/c.json5"));
        assert!(Cli::try_parse_from(["callbook", "gateway"]).is_err());
    }

    #[test]
    fn test_check_config_rejects_errors() {
        let config = Config::parse("{ gateway: { port: 0 } }").unwrap();
        assert!(check_config(&config).is_err());
        assert!(check_config(&Config::default()).is_ok());
    }
}
