//! WebSocket Gateway
//!
//! Async WebSocket front end of the ledger. Binds a signer to each
//! connection, forwards its transactions and reads, and streams events of
//! watched games back to it. Also drives the ledger clock.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::identity::Pubkey;
use crate::game::instruction::{Instruction, RoutePolicy};
use crate::ledger::delegation::Route;
use crate::ledger::service::{Ledger, LedgerEvent};
use crate::network::auth::{AuthConfig, Authenticator};
use crate::network::protocol::{AuthResult, ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::session::{ConnectionId, SessionError, SessionRegistry};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close connections silent for this long.
    pub idle_timeout: Duration,
    /// Accept self-declared signers when no auth provider is configured.
    pub allow_dev_signers: bool,
    /// Serve airdrop requests.
    pub faucet_enabled: bool,
    /// Token validation.
    pub auth: AuthConfig,
    /// Gateway version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            allow_dev_signers: false,
            faucet_enabled: true,
            auth: AuthConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load from `FLEET_WARS_*` and `AUTH_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("FLEET_WARS_BIND", defaults.bind_addr),
            max_connections: env_or("FLEET_WARS_MAX_CONNECTIONS", defaults.max_connections),
            idle_timeout: Duration::from_secs(env_or("FLEET_WARS_IDLE_TIMEOUT_SECS", 300)),
            allow_dev_signers: env_or("FLEET_WARS_DEV_SIGNERS", defaults.allow_dev_signers),
            faucet_enabled: env_or("FLEET_WARS_FAUCET", defaults.faucet_enabled),
            auth: AuthConfig::from_env(),
            version: defaults.version,
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// REQUEST HANDLING
// =============================================================================

/// State shared by all connection tasks.
pub struct GatewayState {
    config: ServerConfig,
    ledger: Arc<Ledger>,
    sessions: SessionRegistry,
    auth: Authenticator,
}

impl GatewayState {
    /// Shared state over `ledger`.
    pub fn new(config: ServerConfig, ledger: Arc<Ledger>) -> Self {
        let auth = Authenticator::new(config.auth.clone(), config.allow_dev_signers);
        Self {
            config,
            ledger,
            sessions: SessionRegistry::new(),
            auth,
        }
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Live connections.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Answer one client message.
    pub async fn handle(&self, id: ConnectionId, msg: ClientMessage) -> ServerMessage {
        let signer = self.sessions.signer(&id).await;
        if msg.requires_signer() && signer.is_none() {
            return ServerMessage::Error(ServerError::new(
                ErrorCode::NotAuthenticated,
                "authenticate before submitting",
            ));
        }

        match msg {
            ClientMessage::Auth { token, signer: claimed } => self.handle_auth(id, token, claimed).await,

            ClientMessage::Submit { instruction } => {
                let Some(signer) = signer else {
                    return ServerMessage::Error(ServerError::new(ErrorCode::NotAuthenticated, "no signer"));
                };
                let route = self.route_for(&signer, &instruction).await;
                match self.ledger.submit(route, signer, instruction).await {
                    Ok(receipt) => {
                        // Participants see the rest of their game without asking.
                        if let Err(e) = self.sessions.subscribe(&id, receipt.game).await {
                            debug!("Auto-subscribe skipped for {}: {}", id, e);
                        }
                        ServerMessage::Receipt(receipt)
                    }
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }

            ClientMessage::GetGame { game } => match self.ledger.get_game(&game).await {
                Some(snapshot) => ServerMessage::Game(snapshot),
                None => ServerMessage::Error(ServerError::new(
                    ErrorCode::GameNotFound,
                    format!("game {} not found", game),
                )),
            },

            ClientMessage::Subscribe { game } => match self.sessions.subscribe(&id, game).await {
                Ok(_) => ServerMessage::Subscribed { game },
                Err(e) => session_error(e),
            },

            ClientMessage::Unsubscribe { game } => match self.sessions.unsubscribe(&id, &game).await {
                Ok(_) => ServerMessage::Unsubscribed { game },
                Err(e) => session_error(e),
            },

            ClientMessage::Balance => {
                let Some(signer) = signer else {
                    return ServerMessage::Error(ServerError::new(ErrorCode::NotAuthenticated, "no signer"));
                };
                ServerMessage::Balance { signer, balance: self.ledger.balance(&signer).await }
            }

            ClientMessage::Airdrop { amount } => {
                let Some(signer) = signer else {
                    return ServerMessage::Error(ServerError::new(ErrorCode::NotAuthenticated, "no signer"));
                };
                if !self.config.faucet_enabled {
                    return ServerMessage::Error(ServerError::new(ErrorCode::FaucetRefused, "faucet disabled"));
                }
                match self.ledger.airdrop(&signer, amount).await {
                    Ok(balance) => ServerMessage::Balance { signer, balance },
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }

            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: unix_millis(),
                slot: self.ledger.slot(),
            },
        }
    }

    /// Route a submission the way the record's current owner accepts it.
    ///
    /// The gateway fronts both the base ledger and the auxiliary executors it
    /// hosts, so clients never name an executor themselves. Base-only
    /// instructions always go to the base ledger and are refused there while
    /// the record is delegated.
    async fn route_for(&self, signer: &Pubkey, instruction: &Instruction) -> Route {
        if instruction.route_policy() == RoutePolicy::BaseOnly {
            return Route::Base;
        }
        match self.ledger.delegation(&instruction.address(signer)).await {
            Some(record) => record.route(),
            None => Route::Base,
        }
    }

    async fn handle_auth(
        &self,
        id: ConnectionId,
        token: Option<String>,
        claimed: Option<Pubkey>,
    ) -> ServerMessage {
        let failure = |error: ServerError| {
            ServerMessage::AuthResult(AuthResult {
                success: false,
                connection_id: None,
                signer: None,
                error: Some(error),
                server_version: self.config.version.clone(),
            })
        };

        let signer = match self.auth.authenticate(token.as_deref(), claimed) {
            Ok(signer) => signer,
            Err(e) => {
                debug!("Connection {} failed auth: {}", id, e);
                return failure(ServerError::from(&e));
            }
        };
        if let Err(e) = self.sessions.bind_signer(&id, signer).await {
            return failure(session_server_error(e));
        }

        debug!("Connection {} authenticated as {}", id, signer.short());
        ServerMessage::AuthResult(AuthResult {
            success: true,
            connection_id: Some(id.to_string()),
            signer: Some(signer),
            error: None,
            server_version: self.config.version.clone(),
        })
    }
}

fn session_server_error(err: SessionError) -> ServerError {
    let code = match err {
        SessionError::ConnectionNotFound => ErrorCode::InternalError,
        SessionError::AlreadyAuthenticated(_) => ErrorCode::AuthFailed,
        SessionError::TooManySubscriptions(_) => ErrorCode::InvalidMessage,
    };
    ServerError::new(code, err.to_string())
}

fn session_error(err: SessionError) -> ServerMessage {
    ServerMessage::Error(session_server_error(err))
}

// =============================================================================
// SERVER
// =============================================================================

/// The gateway server.
pub struct GatewayServer {
    state: Arc<GatewayState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    /// New gateway over `ledger`.
    pub fn new(config: ServerConfig, ledger: Arc<Ledger>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(GatewayState::new(config, ledger)),
            shutdown_tx,
        }
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GatewayError> {
        let config = &self.state.config;
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Gateway listening on {}", config.bind_addr);
        if self.state.auth.allows_dev_signers() {
            warn!("No auth provider configured: accepting self-declared signers");
        }

        let clock_handle = tokio::spawn(self.state.ledger.clone().run_clock(self.shutdown_tx.subscribe()));

        let forward_state = self.state.clone();
        let events = self.state.ledger.subscribe();
        let forward_shutdown = self.shutdown_tx.subscribe();
        let forward_handle = tokio::spawn(async move {
            Self::run_event_forwarder(forward_state, events, forward_shutdown).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let count = self.state.sessions.connection_count().await;
                            if count >= config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let _ = clock_handle.await;
        forward_handle.abort();
        Ok(())
    }

    /// Fan ledger events out to watching connections.
    async fn run_event_forwarder(
        state: Arc<GatewayState>,
        mut events: broadcast::Receiver<LedgerEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        state.sessions.dispatch(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event forwarder lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Serve one WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let id = state.sessions.register(addr, msg_tx.clone()).await;

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let idle_timeout = state.config.idle_timeout;
            loop {
                tokio::select! {
                    msg = tokio::time::timeout(idle_timeout, ws_receiver.next()) => {
                        match msg {
                            Err(_) => {
                                info!("Connection {} idle, closing", id);
                                break;
                            }
                            Ok(Some(Ok(Message::Text(text)))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => state.handle(id, client_msg).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidMessage,
                                            format!("invalid message: {}", e),
                                        ))
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Some(Ok(Message::Binary(_)))) => {
                                let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                    ErrorCode::InvalidMessage,
                                    "binary frames are not supported",
                                ))).await;
                            }
                            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Ok(Some(Err(e))) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Ok(Some(Ok(_))) => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let the writer flush what is queued.
            drop(msg_tx);
            state.sessions.remove(&id).await;
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Writer for {} did not drain in time", id);
            }

            info!("Connection {} from {} cleaned up", id, addr);
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
