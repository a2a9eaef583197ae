//! # Fleet Wars Server
//!
//! Two-player naval combat on 8x8 grids where each player commits to a hidden
//! fleet, stakes a wager, plays the shot/response cycle and opens the board at
//! the end. Every answer is audited against the revealed board before the pot
//! is paid out. The fast turn cycle can be delegated to an auxiliary executor
//! and committed back to the base ledger.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FLEET WARS SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── cell.rs      - Grid cells and 64-bit cell sets          │
//! │  ├── identity.rs  - Signer keys and game addresses           │
//! │  └── hash.rs      - Commitments and state hashing            │
//! │                                                              │
//! │  game/            - Protocol state machine (deterministic)   │
//! │  ├── state.rs     - Game record and lifecycle enums          │
//! │  ├── commit.rs    - Create/join with board commitments       │
//! │  ├── turn.rs      - Fire/respond cycle                       │
//! │  ├── delegation.rs- Authority transitions                    │
//! │  ├── reveal.rs    - Reveal, fairness audit, finalize         │
//! │  ├── forfeit.rs   - Timeout claims                           │
//! │  ├── instruction.rs - Transaction set and dispatcher         │
//! │  └── fleet.rs     - Client-side placement and secrets        │
//! │                                                              │
//! │  ledger/          - Accounts, escrow, routing (async)        │
//! │  ├── service.rs   - Transactional store and slot clock       │
//! │  ├── bank.rs      - Player balances                          │
//! │  ├── delegation.rs- Executors and route checks               │
//! │  └── journal.rs   - Per-game journal and replay              │
//! │                                                              │
//! │  network/         - WebSocket gateway (non-deterministic)    │
//! │  ├── server.rs    - Accept loop and request handling         │
//! │  ├── protocol.rs  - Message types                            │
//! │  ├── session.rs   - Connections and subscriptions            │
//! │  └── auth.rs      - JWT signer binding                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/` and `game/` read no clocks and hold no balances. Given the same
//! journal, the state machine reproduces every recorded state hash on any
//! platform, which is what `ledger::journal::replay` checks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod ledger;
pub mod network;

// Re-export commonly used types
pub use core::cell::{Cell, CellSet};
pub use core::identity::{GameAddress, Pubkey};
pub use game::error::{ErrorClass, GameError};
pub use game::instruction::Instruction;
pub use game::state::{Game, GameState, Party, Side};
pub use ledger::{Ledger, LedgerConfig, LedgerError, Route};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
