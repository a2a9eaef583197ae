//! Protocol Errors
//!
//! Every rejection carries a specific reason and belongs to one of four
//! classes. A rejected transaction leaves the record untouched.

use serde::{Serialize, Deserialize};
use crate::game::state::GameState;

/// Broad category of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Wrong phase or wrong turn. Resubmit once the game reaches the right phase.
    Sequencing,
    /// Malformed input. Resubmit with corrected arguments.
    InputValidity,
    /// Provable dishonesty. Never retried; settled by the fairness rule.
    Integrity,
    /// Wrong signer or wrong executor for this record.
    Authorization,
}

impl ErrorClass {
    /// Can the same signer reasonably retry later or with fixed input?
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorClass::Sequencing | ErrorClass::InputValidity)
    }
}

/// State machine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Game is not in the phase this transaction needs.
    #[error("game is not in the expected state (currently {0:?})")]
    InvalidGameState(GameState),

    /// Caller is a participant but it is not their action.
    #[error("not your turn")]
    NotYourTurn,

    /// Caller already fired at this cell.
    #[error("cell {0} already shot")]
    CellAlreadyShot(u8),

    /// Cell index outside the 8x8 grid.
    #[error("invalid cell {0}: out of bounds (0-63)")]
    InvalidCell(u8),

    /// Fire/respond outside of active play.
    #[error("game is not active")]
    GameNotActive,

    /// Revealed board and salt do not hash to the stored commitment.
    #[error("board hash mismatch: cheater detected")]
    BoardHashMismatch,

    /// Revealed board does not have exactly the fleet's cell count.
    #[error("invalid board: must have exactly 9 ship cells, found {0}")]
    InvalidBoard(u32),

    /// Finalize before the reveal phase is complete.
    #[error("both players must reveal before finalize")]
    GameNotReady,

    /// Signer is not allowed to perform this action.
    #[error("unauthorized")]
    Unauthorized,

    /// Game is not waiting for a second player.
    #[error("game is not joinable")]
    GameNotJoinable,

    /// Joiner's deposit differs from the creator's stake.
    #[error("wager mismatch: game requires {expected}, got {got}")]
    WagerMismatch {
        /// Stake escrowed by player1.
        expected: u64,
        /// Amount offered by the joiner.
        got: u64,
    },

    /// Caller already revealed their board.
    #[error("board already revealed")]
    AlreadyRevealed,

    /// Timeout claimed too early.
    #[error("timeout not reached: {remaining} more slots")]
    TimeoutNotReached {
        /// Slots left until the claim is allowed.
        remaining: u64,
    },
}

impl GameError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidGameState(_)
            | Self::NotYourTurn
            | Self::CellAlreadyShot(_)
            | Self::GameNotActive
            | Self::GameNotReady
            | Self::GameNotJoinable
            | Self::AlreadyRevealed
            | Self::TimeoutNotReached { .. } => ErrorClass::Sequencing,
            Self::InvalidCell(_) | Self::InvalidBoard(_) | Self::WagerMismatch { .. } => {
                ErrorClass::InputValidity
            }
            Self::BoardHashMismatch => ErrorClass::Integrity,
            Self::Unauthorized => ErrorClass::Authorization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(GameError::NotYourTurn.class(), ErrorClass::Sequencing);
        assert_eq!(GameError::InvalidCell(64).class(), ErrorClass::InputValidity);
        assert_eq!(GameError::BoardHashMismatch.class(), ErrorClass::Integrity);
        assert_eq!(GameError::Unauthorized.class(), ErrorClass::Authorization);

        assert!(GameError::GameNotReady.class().is_recoverable());
        assert!(!GameError::BoardHashMismatch.class().is_recoverable());
        assert!(!GameError::Unauthorized.class().is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(GameError::InvalidCell(70).to_string(), "invalid cell 70: out of bounds (0-63)");
        assert_eq!(
            GameError::WagerMismatch { expected: 10, got: 5 }.to_string(),
            "wager mismatch: game requires 10, got 5"
        );
    }
}
