//! Game Events
//!
//! Events emitted by accepted transactions. They are pushed to subscribers
//! and stored in the journal next to the instruction that produced them.

use serde::{Serialize, Deserialize};

use crate::core::cell::Cell;
use crate::core::identity::{GameAddress, Pubkey};
use crate::game::state::{Party, Side};

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// Record allocated, creator's stake escrowed.
    GameCreated {
        /// Player 1.
        creator: Pubkey,
        /// Creator's address seed.
        nonce: u64,
        /// Stake per side.
        wager: u64,
    },

    /// Second player committed and matched the stake.
    PlayerJoined {
        /// Player 2.
        player: Pubkey,
    },

    /// Write authority moved to the auxiliary executor.
    AuthorityDelegated {
        /// Executor now holding the record.
        validator: Pubkey,
    },

    /// Write authority returned to the base ledger.
    AuthorityReclaimed {
        /// Triggered by a sinking response rather than an explicit end.
        automatic: bool,
    },

    /// A shot landed on the opponent's grid.
    ShotFired {
        /// Target cell.
        cell: Cell,
    },

    /// The target declared the outcome of the last shot.
    ShotAnswered {
        /// Cell the answer refers to.
        cell: Cell,
        /// Declared outcome.
        hit: bool,
        /// Running hit count of the firer.
        firer_hits: u8,
    },

    /// Play is over; boards must be revealed.
    RevealPhaseStarted,

    /// A board passed the commitment check.
    BoardRevealed,

    /// A stalled side was ruled forfeit.
    TimeoutClaimed {
        /// Side ruled forfeit.
        stalled: Side,
    },

    /// Outcome written and escrow paid.
    GameFinalized {
        /// Winning seat.
        winner: Party,
        /// Identity paid.
        payee: Pubkey,
        /// Pool paid out.
        amount: u64,
        /// Audit flag for player 1.
        p1_cheated: bool,
        /// Audit flag for player 2.
        p2_cheated: bool,
    },
}

/// A game event with the slot and seat it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Game the event belongs to.
    pub game: GameAddress,

    /// Ledger slot of the transaction.
    pub slot: u64,

    /// Seat that acted, if the action belongs to one.
    pub side: Option<Side>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(game: GameAddress, slot: u64, side: Option<Side>, data: GameEventData) -> Self {
        Self { game, slot, side, data }
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self.data {
            GameEventData::GameCreated { .. } => "game_created",
            GameEventData::PlayerJoined { .. } => "player_joined",
            GameEventData::AuthorityDelegated { .. } => "authority_delegated",
            GameEventData::AuthorityReclaimed { .. } => "authority_reclaimed",
            GameEventData::ShotFired { .. } => "shot_fired",
            GameEventData::ShotAnswered { .. } => "shot_answered",
            GameEventData::RevealPhaseStarted => "reveal_phase_started",
            GameEventData::BoardRevealed => "board_revealed",
            GameEventData::TimeoutClaimed { .. } => "timeout_claimed",
            GameEventData::GameFinalized { .. } => "game_finalized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let game = GameAddress::derive(&Pubkey::from_label("p1"), 1);
        let event = GameEvent::new(
            game,
            12,
            Some(Side::Player2),
            GameEventData::ShotAnswered { cell: Cell::new(10).unwrap(), hit: true, firer_hits: 3 },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["slot"], 12);
        assert_eq!(json["side"], "player2");
        assert_eq!(json["data"]["kind"], "shot_answered");
        assert_eq!(json["data"]["cell"], 10);
        assert_eq!(event.name(), "shot_answered");

        let back: GameEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
