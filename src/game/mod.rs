//! Game Protocol Module
//!
//! The pure protocol state machine. 100% deterministic: no clocks, no I/O,
//! no balances. Every function takes the record and the caller and either
//! mutates the record or returns a `GameError`.
//!
//! ## Module Structure
//!
//! - `state`: Game record, seats, lifecycle and turn enums
//! - `commit`: Create/join with board commitments
//! - `turn`: Fire/respond cycle
//! - `delegation`: Authority tag transitions
//! - `reveal`: Board reveal, fairness audit, finalize
//! - `forfeit`: Timeout claims
//! - `instruction`: Transaction set and dispatcher
//! - `events`: Events for subscribers and the journal
//! - `fleet`: Client-side fleet placement and board secrets

pub mod error;
pub mod state;
pub mod commit;
pub mod turn;
pub mod delegation;
pub mod reveal;
pub mod forfeit;
pub mod instruction;
pub mod events;
pub mod fleet;

// Re-export key types
pub use error::{ErrorClass, GameError};
pub use state::{Authority, Game, GameState, Party, Side, TurnState, TOTAL_SHIP_CELLS};
pub use reveal::{FairnessReport, Settlement};
pub use instruction::{ExecContext, Instruction, RoutePolicy, StepResult};
pub use events::{GameEvent, GameEventData};
pub use fleet::{BoardSecret, FleetLayout, Orientation, PlacementError};
