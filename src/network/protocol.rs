//! Protocol Messages
//!
//! Wire format between clients and the gateway over WebSocket. Every message
//! is a JSON object tagged by `type`; instructions nest their own `type` tag
//! under the `instruction` key.

use serde::{Serialize, Deserialize};

use crate::core::identity::{GameAddress, Pubkey};
use crate::game::error::ErrorClass;
use crate::game::instruction::Instruction;
use crate::ledger::error::LedgerError;
use crate::ledger::service::{GameSnapshot, LedgerEvent, TransactionReceipt};
use crate::network::auth::AuthError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a signer to this connection.
    Auth {
        /// JWT from the auth provider.
        #[serde(default)]
        token: Option<String>,
        /// Self-declared signer (development gateways only).
        #[serde(default)]
        signer: Option<Pubkey>,
    },

    /// Submit a transaction as the bound signer. The gateway picks the
    /// route from the record's current owner.
    Submit {
        /// The instruction.
        instruction: Instruction,
    },

    /// Read a game record.
    GetGame {
        /// Record address.
        game: GameAddress,
    },

    /// Receive events of a game.
    Subscribe {
        /// Record address.
        game: GameAddress,
    },

    /// Stop receiving events of a game.
    Unsubscribe {
        /// Record address.
        game: GameAddress,
    },

    /// Balance of the bound signer.
    Balance,

    /// Fund the bound signer from the faucet.
    Airdrop {
        /// Amount requested.
        amount: u64,
    },

    /// Latency check.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Does this message need a bound signer?
    pub fn requires_signer(&self) -> bool {
        matches!(
            self,
            ClientMessage::Submit { .. } | ClientMessage::Balance | ClientMessage::Airdrop { .. }
        )
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from gateway to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Accepted transaction.
    Receipt(TransactionReceipt),

    /// Game record read.
    Game(GameSnapshot),

    /// Subscription acknowledged.
    Subscribed {
        /// Watched record.
        game: GameAddress,
    },

    /// Subscription removed.
    Unsubscribed {
        /// Record no longer watched.
        game: GameAddress,
    },

    /// Event on a subscribed game.
    Event {
        /// The ledger event.
        event: LedgerEvent,
    },

    /// Signer balance.
    Balance {
        /// Account owner.
        signer: Pubkey,
        /// Spendable funds.
        balance: u64,
    },

    /// Pong response.
    Pong {
        /// Echo of the client timestamp.
        timestamp: u64,
        /// Gateway wall clock, unix millis.
        server_time: u64,
        /// Current ledger slot.
        slot: u64,
    },

    /// Rejection or failure.
    Error(ServerError),

    /// Gateway is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Connection id if successful.
    pub connection_id: Option<String>,
    /// Bound signer if successful.
    pub signer: Option<Pubkey>,
    /// Coded failure, if any.
    pub error: Option<ServerError>,
    /// Gateway version.
    pub server_version: String,
}

/// Error sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Protocol error class, for transaction rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Error without a protocol class.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, class: None, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// No signer bound to the connection.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Message did not parse.
    InvalidMessage,
    /// No record at the address.
    GameNotFound,
    /// Transaction rejected by the state machine.
    Rejected,
    /// Signer cannot cover a deposit.
    InsufficientFunds,
    /// Submitted through the wrong executor.
    WrongExecutor,
    /// Auxiliary executor offline or unknown.
    ExecutorUnavailable,
    /// Faucet request refused.
    FaucetRefused,
    /// Internal error.
    InternalError,
}

impl From<&LedgerError> for ServerError {
    fn from(err: &LedgerError) -> Self {
        let code = match err {
            LedgerError::GameNotFound(_) => ErrorCode::GameNotFound,
            LedgerError::Game(_) | LedgerError::DuplicateGame(_) => ErrorCode::Rejected,
            LedgerError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            LedgerError::AccountDelegated(_)
            | LedgerError::NotDelegated(_)
            | LedgerError::WrongExecutor { .. } => ErrorCode::WrongExecutor,
            LedgerError::ExecutorUnavailable(_) => ErrorCode::ExecutorUnavailable,
            LedgerError::FaucetLimit { .. } => ErrorCode::FaucetRefused,
            LedgerError::Overflow => ErrorCode::InternalError,
        };
        Self { code, class: Some(err.class()), message: err.to_string() }
    }
}

impl From<&AuthError> for ServerError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::InvalidFormat
            | AuthError::InvalidSignature
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::MissingClaim(_)
            | AuthError::DecodeError(_) => ErrorCode::InvalidToken,
            AuthError::NotConfigured | AuthError::NoCredentials => ErrorCode::AuthFailed,
        };
        Self::new(code, err.to_string())
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::error::GameError;
    use crate::game::events::{GameEvent, GameEventData};
    use crate::game::state::Side;
    use crate::core::cell::Cell;

    #[test]
    fn test_submit_parses_nested_instruction() {
        let game = GameAddress::derive(&Pubkey::from_label("alice"), 7);
        let raw = format!(
            r#"{{"type":"submit","instruction":{{"type":"fire_shot","game":"{}","cell":42}}}}"#,
            game.to_hex()
        );

        match ClientMessage::from_json(&raw).unwrap() {
            ClientMessage::Submit { instruction: Instruction::FireShot { game: g, cell } } => {
                assert_eq!(g, game);
                assert_eq!(cell, 42);
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_submit_ignores_client_route() {
        let game = GameAddress::derive(&Pubkey::from_label("alice"), 1);
        let raw = format!(
            r#"{{"type":"submit","route":{{"kind":"auxiliary","validator":"{}"}},"instruction":{{"type":"end_session","game":"{}"}}}}"#,
            Pubkey::from_label("fleet-wars-validator").to_hex(),
            game.to_hex()
        );

        let msg = ClientMessage::from_json(&raw).unwrap();
        assert!(matches!(msg, ClientMessage::Submit { instruction: Instruction::EndSession { .. } }));
        assert!(!msg.to_json().unwrap().contains("route"));
    }

    #[test]
    fn test_auth_fields_optional() {
        let msg = ClientMessage::from_json(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { token: Some(_), signer: None }));
        assert!(!msg.requires_signer());
        assert!(ClientMessage::Balance.requires_signer());
    }

    #[test]
    fn test_event_message_keeps_both_tags() {
        let game = GameAddress::derive(&Pubkey::from_label("alice"), 1);
        let event = GameEvent::new(
            game,
            12,
            Some(Side::Player1),
            GameEventData::ShotFired { cell: Cell::new(3).unwrap() },
        );
        let msg = ServerMessage::Event { event: LedgerEvent::Game(event) };

        let json = msg.to_json().unwrap();
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event { event } => assert_eq!(event.game(), game),
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err = ServerError::from(&LedgerError::Game(GameError::NotYourTurn));
        assert_eq!(err.code, ErrorCode::Rejected);
        assert_eq!(err.class, Some(ErrorClass::Sequencing));

        let err = ServerError::from(&LedgerError::InsufficientFunds { needed: 5, available: 1 });
        assert_eq!(err.code, ErrorCode::InsufficientFunds);
        assert_eq!(err.class, Some(ErrorClass::InputValidity));

        let game = GameAddress::derive(&Pubkey::from_label("bob"), 2);
        let err = ServerError::from(&LedgerError::AccountDelegated(game));
        assert_eq!(err.code, ErrorCode::WrongExecutor);
        assert_eq!(err.class, Some(ErrorClass::Authorization));
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(ServerError::from(&AuthError::Expired).code, ErrorCode::TokenExpired);
        assert_eq!(ServerError::from(&AuthError::InvalidSignature).code, ErrorCode::InvalidToken);
        assert_eq!(ServerError::from(&AuthError::NoCredentials).code, ErrorCode::AuthFailed);
    }

    #[test]
    fn test_failed_auth_result_carries_code() {
        let msg = ServerMessage::AuthResult(AuthResult {
            success: false,
            connection_id: None,
            signer: None,
            error: Some(ServerError::from(&AuthError::Expired)),
            server_version: "0.1.0".into(),
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains("token_expired"));
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::AuthResult(AuthResult { error: Some(err), .. }) => {
                assert_eq!(err.code, ErrorCode::TokenExpired)
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_error_serialization() {
        let msg = ServerMessage::Error(ServerError::new(ErrorCode::NotAuthenticated, "send auth first"));
        let json = msg.to_json().unwrap();
        assert!(json.contains("not_authenticated"));
        assert!(!json.contains("class"));
    }
}
