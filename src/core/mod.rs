//! Core deterministic primitives.
//!
//! Cell bitsets, signer identities, address derivation and hashing.
//! Nothing in here touches clocks, I/O or randomness.

pub mod cell;
pub mod identity;
pub mod hash;

// Re-export core types
pub use cell::{Cell, CellSet, BOARD_CELLS, GRID_SIZE, NO_CELL};
pub use identity::{GameAddress, Pubkey};
pub use hash::{board_commitment, CommitHash, Salt, StateHash, StateHasher};
