//! Client Sessions
//!
//! One `ClientSession` per WebSocket connection: the bound signer, the games
//! it watches and the channel to its writer task. The `SessionRegistry` owns
//! all of them and fans ledger events out to the watchers of each game.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::identity::{GameAddress, Pubkey};
use crate::ledger::service::LedgerEvent;
use crate::network::protocol::ServerMessage;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Most games one connection may watch.
pub const MAX_SUBSCRIPTIONS: usize = 64;

/// State of one connection.
#[derive(Debug)]
pub struct ClientSession {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Peer address.
    pub addr: SocketAddr,
    signer: Option<Pubkey>,
    subscriptions: BTreeSet<GameAddress>,
    /// Set once the registry dropped the connection.
    closed: bool,
    sender: mpsc::Sender<ServerMessage>,
}

impl ClientSession {
    /// New unauthenticated session.
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            addr,
            signer: None,
            subscriptions: BTreeSet::new(),
            closed: false,
            sender,
        }
    }

    /// Bound signer, once authenticated.
    pub fn signer(&self) -> Option<Pubkey> {
        self.signer
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Unknown connection.
    #[error("connection not found")]
    ConnectionNotFound,

    /// Signer already bound to a different key.
    #[error("connection already authenticated as {0}")]
    AlreadyAuthenticated(Pubkey),

    /// Too many watched games.
    #[error("subscription limit of {0} reached")]
    TooManySubscriptions(usize),
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// All live connections.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<ConnectionId, Arc<RwLock<ClientSession>>>>,
    /// Game to watching connections.
    watchers: RwLock<BTreeMap<GameAddress, BTreeSet<ConnectionId>>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            watchers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a new connection.
    pub async fn register(&self, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = Uuid::new_v4();
        let session = ClientSession::new(id, addr, sender);
        self.sessions.write().await.insert(id, Arc::new(RwLock::new(session)));
        id
    }

    /// Get a session.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<RwLock<ClientSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Signer bound to a connection.
    pub async fn signer(&self, id: &ConnectionId) -> Option<Pubkey> {
        let session = self.get(id).await?;
        let signer = session.read().await.signer();
        signer
    }

    /// Bind a signer. Re-binding the same key is a no-op.
    pub async fn bind_signer(&self, id: &ConnectionId, signer: Pubkey) -> Result<(), SessionError> {
        let session = self.get(id).await.ok_or(SessionError::ConnectionNotFound)?;
        let mut session = session.write().await;
        match session.signer {
            Some(bound) if bound != signer => Err(SessionError::AlreadyAuthenticated(bound)),
            _ => {
                session.signer = Some(signer);
                Ok(())
            }
        }
    }

    /// Watch a game. Returns false if already watched.
    pub async fn subscribe(&self, id: &ConnectionId, game: GameAddress) -> Result<bool, SessionError> {
        let session = self.get(id).await.ok_or(SessionError::ConnectionNotFound)?;
        // Session lock held across both maps so `remove` sees every watcher entry.
        let mut session = session.write().await;
        if session.closed {
            return Err(SessionError::ConnectionNotFound);
        }
        if session.subscriptions.contains(&game) {
            return Ok(false);
        }
        if session.subscriptions.len() >= MAX_SUBSCRIPTIONS {
            return Err(SessionError::TooManySubscriptions(MAX_SUBSCRIPTIONS));
        }
        session.subscriptions.insert(game);
        self.watchers.write().await.entry(game).or_default().insert(*id);
        Ok(true)
    }

    /// Stop watching a game. Returns false if it was not watched.
    pub async fn unsubscribe(&self, id: &ConnectionId, game: &GameAddress) -> Result<bool, SessionError> {
        let session = self.get(id).await.ok_or(SessionError::ConnectionNotFound)?;
        if !session.write().await.subscriptions.remove(game) {
            return Ok(false);
        }
        self.forget_watcher(id, game).await;
        Ok(true)
    }

    async fn forget_watcher(&self, id: &ConnectionId, game: &GameAddress) {
        let mut watchers = self.watchers.write().await;
        if let Some(set) = watchers.get_mut(game) {
            set.remove(id);
            if set.is_empty() {
                watchers.remove(game);
            }
        }
    }

    /// Drop a connection and its subscriptions.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Arc<RwLock<ClientSession>>> {
        let session = self.sessions.write().await.remove(id)?;
        let games = {
            let mut state = session.write().await;
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };
        for game in &games {
            self.forget_watcher(id, game).await;
        }
        Some(session)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of connections watching `game`.
    pub async fn watcher_count(&self, game: &GameAddress) -> usize {
        self.watchers.read().await.get(game).map_or(0, BTreeSet::len)
    }

    /// Push a ledger event to every watcher of its game. Returns deliveries.
    ///
    /// Never waits on a slow client: a full queue drops the event for that
    /// client only.
    pub async fn dispatch(&self, event: &LedgerEvent) -> usize {
        let game = event.game();
        let ids: Vec<ConnectionId> = match self.watchers.read().await.get(&game) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for id in ids {
            let Some(session) = self.get(&id).await else {
                continue;
            };
            let sender = session.read().await.sender.clone();
            match sender.try_send(ServerMessage::Event { event: event.clone() }) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Dropping event for slow connection {}", id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} closed before event delivery", id);
                }
            }
        }
        delivered
    }

    /// Send a message to every connection.
    pub async fn broadcast(&self, message: ServerMessage) {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for session in sessions {
            let sender = session.read().await.sender.clone();
            let _ = sender.try_send(message.clone());
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::Cell;
    use crate::game::events::{GameEvent, GameEventData};
    use crate::game::state::Side;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9000))
    }

    fn game(n: u64) -> GameAddress {
        GameAddress::derive(&Pubkey::from_label("creator"), n)
    }

    fn shot(game: GameAddress) -> LedgerEvent {
        LedgerEvent::Game(GameEvent::new(
            game,
            5,
            Some(Side::Player2),
            GameEventData::ShotFired { cell: Cell::new(10).unwrap() },
        ))
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        let id = registry.register(addr(), tx).await;
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.signer(&id).await.is_none());

        registry.subscribe(&id, game(1)).await.unwrap();
        assert_eq!(registry.watcher_count(&game(1)).await, 1);

        assert!(registry.remove(&id).await.is_some());
        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.watcher_count(&game(1)).await, 0);
    }

    #[tokio::test]
    async fn test_bind_signer() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = registry.register(addr(), tx).await;

        let alice = Pubkey::from_label("alice");
        registry.bind_signer(&id, alice).await.unwrap();
        registry.bind_signer(&id, alice).await.unwrap();
        assert_eq!(registry.signer(&id).await, Some(alice));

        let err = registry.bind_signer(&id, Pubkey::from_label("mallory")).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyAuthenticated(alice));

        assert_eq!(
            registry.bind_signer(&Uuid::new_v4(), alice).await,
            Err(SessionError::ConnectionNotFound)
        );
    }

    #[tokio::test]
    async fn test_dispatch_reaches_watchers_only() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = registry.register(addr(), tx_a).await;
        let _b = registry.register(addr(), tx_b).await;

        assert!(registry.subscribe(&a, game(1)).await.unwrap());
        assert!(!registry.subscribe(&a, game(1)).await.unwrap());

        assert_eq!(registry.dispatch(&shot(game(1))).await, 1);
        assert_eq!(registry.dispatch(&shot(game(2))).await, 0);

        match rx_a.try_recv().unwrap() {
            ServerMessage::Event { event } => assert_eq!(event.game(), game(1)),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());

        assert!(registry.unsubscribe(&a, &game(1)).await.unwrap());
        assert!(!registry.unsubscribe(&a, &game(1)).await.unwrap());
        assert_eq!(registry.dispatch(&shot(game(1))).await, 0);
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(addr(), tx).await;
        registry.subscribe(&id, game(3)).await.unwrap();

        assert_eq!(registry.dispatch(&shot(game(3))).await, 1);
        // Queue full: dropped, not awaited.
        assert_eq!(registry.dispatch(&shot(game(3))).await, 0);
    }

    #[tokio::test]
    async fn test_subscription_limit() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(addr(), tx).await;

        for n in 0..MAX_SUBSCRIPTIONS as u64 {
            registry.subscribe(&id, game(n)).await.unwrap();
        }
        assert_eq!(
            registry.subscribe(&id, game(u64::MAX)).await,
            Err(SessionError::TooManySubscriptions(MAX_SUBSCRIPTIONS))
        );
    }

    #[tokio::test]
    async fn test_subscribe_racing_remove_leaves_no_watchers() {
        let registry = Arc::new(SessionRegistry::new());

        for n in 0..32u64 {
            let (tx, _rx) = mpsc::channel(1);
            let id = registry.register(addr(), tx).await;

            let subscriber = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.subscribe(&id, game(n)).await })
            };
            let remover = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.remove(&id).await })
            };
            let _ = subscriber.await.unwrap();
            assert!(remover.await.unwrap().is_some());

            assert_eq!(registry.watcher_count(&game(n)).await, 0);
            assert_eq!(
                registry.subscribe(&id, game(n)).await,
                Err(SessionError::ConnectionNotFound)
            );
        }
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.register(addr(), tx_a).await;
        registry.register(addr(), tx_b).await;

        registry.broadcast(ServerMessage::Shutdown { reason: "maintenance".into() }).await;
        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::Shutdown { .. })));
        assert!(matches!(rx_b.try_recv(), Ok(ServerMessage::Shutdown { .. })));
    }
}
