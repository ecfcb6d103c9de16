use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use tabwire_core::config::{Config, LoggingConfig};
use tabwire_mcp::{serve_stdio, McpServer};
use tabwire_relay::{
    bind_relay, ensure_port_free, platform_port_guard, start_relay, BridgeSettings, SocketBridge,
};
use tabwire_tools::{ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(
    name = "tabwire",
    about = "MCP server that drives a real browser tab through the tabwire extension",
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
    /// Serve MCP on stdio and accept the extension's WebSocket
    Serve {
        /// Relay port (default: 9009)
        #[arg(long)]
        port: Option<u16>,

        /// Reply to action tools with an ARIA snapshot
        #[arg(long)]
        snapshot: bool,

        /// Fail instead of terminating whatever holds the port
        #[arg(long)]
        no_reclaim: bool,
    },

    /// Print the tool catalog as MCP discovery JSON
    Tools,

    /// Inspect or free the relay port
    Port {
        #[command(subcommand)]
        action: PortAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PortAction {
    /// Report whether the port is in use
    Check {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Terminate whatever holds the port
    Free {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
}

/// Logs go to stderr; stdout carries MCP traffic.
fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let default_directive = if verbose {
        "debug".to_string()
    } else {
        let mut directives = vec![
            logging
                .and_then(|l| l.level.clone())
                .unwrap_or_else(|| "info".to_string()),
        ];
        if let Some(l) = logging {
            directives.extend(l.filters.iter().cloned());
        }
        directives.join(",")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let json = logging.is_some_and(|l| l.format == "json");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tabwire_relay::metrics::install_prometheus_recorder()
        .context("cannot install metrics recorder")?;
    let bridge = Arc::new(SocketBridge::new(BridgeSettings::from(&config.bridge)));

    let guard = platform_port_guard(&config.relay.bind);
    let listener = bind_relay(&config.relay, guard.as_ref())
        .await
        .with_context(|| format!("cannot listen on port {}", config.relay.port))?;

    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(start_relay(bridge.clone(), listener, shutdown.clone()));

    let registry = Arc::new(ToolRegistry::with_browser_tools()?);
    let server = McpServer::new(registry, ToolContext::new(bridge, config.tools.snapshot));

    tracing::info!(
        port = config.relay.port,
        snapshot = config.tools.snapshot,
        "tabwire ready, waiting for the browser extension"
    );

    tokio::select! {
        result = serve_stdio(&server) => {
            result?;
            tracing::info!("stdin closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    shutdown.cancel();
    relay.await??;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let mut config = Config::load(&config_path)?;

    init_logging(cli.verbose, config.logging.as_ref());

    let (warnings, errors) = config.validate();
    for w in &warnings {
        tracing::warn!("{w}");
    }

    match cli.command {
        Commands::Serve {
            port,
            snapshot,
            no_reclaim,
        } => {
            if let Some(port) = port {
                config.relay.port = port;
            }
            config.tools.snapshot |= snapshot;
            if no_reclaim {
                config.relay.reclaim_port = false;
            }
            let (_, errors) = config.validate();
            if !errors.is_empty() {
                anyhow::bail!("invalid configuration: {}", errors.join("; "));
            }
            serve(config).await?;
        }
        Commands::Tools => {
            let registry = ToolRegistry::with_browser_tools()?;
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "tools": registry.list(),
            }))?;
            println!("{json}");
        }
        Commands::Port { action } => {
            let guard = platform_port_guard(&config.relay.bind);
            match action {
                PortAction::Check { port } => {
                    let port = port.unwrap_or_else(|| config.relay_port());
                    if guard.is_port_in_use(port).await? {
                        println!("Port {port} is in use");
                    } else {
                        println!("Port {port} is free");
                    }
                }
                PortAction::Free { port } => {
                    let port = port.unwrap_or_else(|| config.relay_port());
                    match ensure_port_free(guard.as_ref(), port, true).await? {
                        None => println!("Port {port} is already free"),
                        Some(report) => {
                            println!(
                                "Port {port} freed (found {:?}, terminated {:?})",
                                report.pids_found, report.killed
                            );
                            for failure in &report.failures {
                                match failure.pid {
                                    Some(pid) => println!("  pid {pid}: {}", failure.reason),
                                    None => println!("  {}", failure.reason),
                                }
                            }
                        }
                    }
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("Config: {}", config_path.display());
                for e in &errors {
                    println!("error: {e}");
                }
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
        },
    }

    Ok(())
}
