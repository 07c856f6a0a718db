//! session-bridge - terminal and agent session bridge
//!
//! Serves an interactive shell over a WebSocket and agent exchanges over a
//! push stream, and includes a small streaming client for the latter.

use anyhow::Result;
use clap::{Parser, Subcommand};
use session_bridge::{
    codec::AgentStreamEvent,
    config::{default_history_dir, BridgeConfig},
    gateway::GatewayBuilder,
    stream::AgentClient,
};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "session-bridge")]
#[command(version)]
#[command(about = "Bridge terminals and agent streams to browser clients")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SESSION_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge server
    Serve {
        /// Host to bind to (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,

        /// Persist agent history under ~/.session-bridge/history when no
        /// history directory is configured
        #[arg(long)]
        persist: bool,
    },

    /// Send one message to a running bridge and stream the reply
    Chat {
        /// Base URL of the bridge
        #[arg(long, default_value = "http://127.0.0.1:7681")]
        url: String,

        /// Resume an earlier session
        #[arg(short, long)]
        session: Option<String>,

        /// Message content
        message: String,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("session_bridge={},tower_http=debug", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            persist,
        } => {
            run_server(config, host, port, persist).await?;
        }
        Commands::Chat {
            url,
            session,
            message,
        } => {
            run_chat(&url, session, &message).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_server(
    mut config: BridgeConfig,
    host: Option<String>,
    port: Option<u16>,
    persist: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if persist && config.agent.history_dir.is_none() {
        config.agent.history_dir = Some(default_history_dir());
    }

    let gateway = GatewayBuilder::new().config(config).build()?;
    gateway.start().await?;

    let status = gateway.status().await;
    if let Some(addr) = &status.address {
        tracing::info!("Session bridge listening on http://{}. Press Ctrl+C to stop.", addr);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    let status = gateway.status().await;
    tracing::info!(
        sessions = status.session_count,
        "Shutting down..."
    );
    gateway.stop().await?;

    Ok(())
}

async fn run_chat(url: &str, session: Option<String>, message: &str) -> Result<()> {
    let mut client = AgentClient::new(url);
    if let Some(session) = session {
        client = client.with_session(session);
    }

    let mut stdout = std::io::stdout();
    let final_message = client
        .send(message, |event, _| {
            match event {
                AgentStreamEvent::Content { text } => {
                    let _ = write!(stdout, "{}", text);
                }
                AgentStreamEvent::Message { content } => {
                    let _ = write!(stdout, "\n{}", content);
                }
                AgentStreamEvent::ToolStart { tool_name, .. } => {
                    eprintln!("[tool] {} ...", tool_name);
                }
                AgentStreamEvent::Error { message } => {
                    eprintln!("[error] {}", message);
                }
                _ => {}
            }
            let _ = stdout.flush();
        })
        .await?;
    println!();

    if !final_message.tool_calls.is_empty() {
        eprintln!("{} tool call(s)", final_message.tool_calls.len());
    }
    if let Some(id) = client.session_id() {
        eprintln!("session: {}", id);
    }
    Ok(())
}

fn show_config(config: Option<&BridgeConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml_string()?);
    Ok(())
}
