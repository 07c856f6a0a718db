//! Gateway server implementation

use crate::agent::{producer, AgentEngine, AgentProducer, AgentState};
use crate::api::build_app;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::session::{AgentSessionRegistry, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
use crate::terminal::{NativePtySpawner, ProcessSpawner, TerminalBridgeState};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};

/// How long `stop` waits for open connections before aborting the server
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Gateway server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Not started
    Stopped,
    /// Binding and spawning tasks
    Starting,
    /// Serving requests
    Running,
    /// Shutting down
    ShuttingDown,
}

/// Tasks owned by a running gateway
struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

/// Session bridge gateway
pub struct Gateway {
    config: BridgeConfig,
    state: Arc<RwLock<GatewayState>>,
    spawner: Arc<dyn ProcessSpawner>,
    engine: Arc<AgentEngine>,
    running: Mutex<Option<RunningServer>>,
}

impl Gateway {
    /// Create a gateway with the native PTY spawner and configured producer
    pub fn new(config: BridgeConfig) -> Result<Self> {
        GatewayBuilder::new().config(config).build()
    }

    /// Get current state
    pub async fn state(&self) -> GatewayState {
        *self.state.read().await
    }

    /// Get the configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<AgentSessionRegistry> {
        self.engine.registry()
    }

    /// Address actually bound, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Start the gateway
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Stopped {
            return Err(Error::Internal("Gateway already running".to_string()));
        }
        *state = GatewayState::Starting;
        drop(state);

        tracing::info!("Starting session bridge gateway");

        let bind = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = match tokio::net::TcpListener::bind(&bind).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write().await = GatewayState::Stopped;
                return Err(Error::Transport(format!("Failed to bind {}: {}", bind, e)));
            }
        };
        let local_addr = listener.local_addr()?;

        let app = build_app(
            TerminalBridgeState {
                spawner: self.spawner.clone(),
                config: self.config.terminal.clone(),
            },
            AgentState {
                engine: self.engine.clone(),
            },
            &self.config.server.cors_origins,
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Gateway server error: {}", e);
            }
        });

        let sweeper = self.config.agent.idle_timeout().map(|max_idle| {
            tracing::info!(
                idle_timeout_secs = max_idle.as_secs(),
                "Starting idle session sweeper"
            );
            self.registry()
                .clone()
                .spawn_sweeper(max_idle, self.config.agent.sweep_interval())
        });

        *self.running.lock().await = Some(RunningServer {
            local_addr,
            shutdown_tx,
            server,
            sweeper,
        });
        *self.state.write().await = GatewayState::Running;

        tracing::info!(address = %local_addr, "Session bridge gateway started");

        Ok(())
    }

    /// Stop the gateway
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Running {
            return Ok(());
        }
        *state = GatewayState::ShuttingDown;
        drop(state);

        tracing::info!("Stopping session bridge gateway");

        if let Some(running) = self.running.lock().await.take() {
            if let Some(sweeper) = running.sweeper {
                sweeper.abort();
            }
            let _ = running.shutdown_tx.send(());

            let mut server = running.server;
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                tracing::warn!("Open connections outlived the shutdown grace period; aborting");
                server.abort();
            }
        }

        *self.state.write().await = GatewayState::Stopped;

        tracing::info!("Session bridge gateway stopped");

        Ok(())
    }

    /// Get gateway status
    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            state: format!("{:?}", self.state().await),
            address: self.local_addr().await.map(|a| a.to_string()),
            session_count: self.registry().session_count().await,
        }
    }
}

/// Gateway status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Current state
    pub state: String,
    /// Bound address, while running
    pub address: Option<String>,
    /// Live agent sessions
    pub session_count: usize,
}

/// Gateway builder
pub struct GatewayBuilder {
    config: BridgeConfig,
    spawner: Option<Arc<dyn ProcessSpawner>>,
    producer: Option<Arc<dyn AgentProducer>>,
    history_store: Option<Arc<dyn HistoryStore>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            spawner: None,
            producer: None,
            history_store: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listen host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the listen port (0 picks a free port)
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Use a custom process spawner for terminal sessions
    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Use a custom agent producer instead of the configured one
    pub fn producer(mut self, producer: Arc<dyn AgentProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Use a custom history store instead of the configured one
    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    /// Build the gateway
    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;

        let store: Arc<dyn HistoryStore> = match (self.history_store, &self.config.agent.history_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(JsonFileHistoryStore::new(dir.clone())?),
            (None, None) => Arc::new(MemoryHistoryStore::new()),
        };
        let producer = self
            .producer
            .unwrap_or_else(|| producer::from_config(&self.config.agent.producer));
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(NativePtySpawner::new()));

        let registry = Arc::new(AgentSessionRegistry::new(store));
        let engine = Arc::new(AgentEngine::new(registry, producer));

        Ok(Gateway {
            config: self.config,
            state: Arc::new(RwLock::new(GatewayState::Stopped)),
            spawner,
            engine,
            running: Mutex::new(None),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
