//! Network Layer
//!
//! WebSocket gateway in front of the ledger. This layer is
//! **non-deterministic**: it authenticates signers and moves messages, while
//! every state change goes through `ledger/` and `game/`.

pub mod auth;
pub mod protocol;
pub mod session;
pub mod server;

pub use auth::{AuthConfig, AuthError, Authenticator, TokenClaims, validate_token};
pub use protocol::{AuthResult, ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use session::{ClientSession, ConnectionId, SessionError, SessionRegistry};
pub use server::{GatewayError, GatewayServer, GatewayState, ServerConfig};
