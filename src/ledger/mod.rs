//! Ledger Module
//!
//! Hosts game records and moves money. Everything that needs a clock, a lock
//! or a balance lives here; the protocol rules themselves live in `game`.
//!
//! ## Module Structure
//!
//! - `service`: Keyed transactional store, slot clock, checkpoints
//! - `delegation`: Routes, delegation records, auxiliary executors
//! - `bank`: Player balances
//! - `journal`: Append-only per-game log and replay
//! - `error`: Ledger errors

pub mod error;
pub mod bank;
pub mod delegation;
pub mod journal;
pub mod service;

pub use error::LedgerError;
pub use delegation::{AuxiliaryExecutor, DelegationRecord, Route};
pub use journal::{replay, Journal, JournalEntry, ReplayError, ReplayReport};
pub use service::{GameSnapshot, Ledger, LedgerConfig, LedgerEvent, Payout, TransactionReceipt};
