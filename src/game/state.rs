//! Game Record Definitions
//!
//! The game record is the only mutable state of a match. It has a fixed
//! binary layout (`Game::SPACE` bytes under bincode's fixed-int encoding):
//! no `Option`, no `Vec`, all enums are unit variants. "Unset" values use
//! sentinels (`Pubkey::UNSET`, `NO_CELL`, `Party::None`).

use serde::{Serialize, Deserialize};

use crate::core::cell::{Cell, CellSet, NO_CELL};
use crate::core::hash::{CommitHash, StateHash, StateHasher};
use crate::core::identity::Pubkey;
use crate::game::error::GameError;

/// Cells occupied by a full fleet (three ships of three cells).
pub const TOTAL_SHIP_CELLS: u8 = 9;

// =============================================================================
// SIDES
// =============================================================================

/// One of the two seats at the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Creator of the game.
    Player1,
    /// Joiner of the game.
    Player2,
}

impl Side {
    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }

    /// 1 or 2, for log lines.
    pub fn number(self) -> u8 {
        match self {
            Side::Player1 => 1,
            Side::Player2 => 2,
        }
    }
}

/// A seat or nobody. Used for `winner` and `forfeited`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// Nobody.
    #[default]
    None,
    /// Player 1.
    Player1,
    /// Player 2.
    Player2,
}

impl Party {
    /// Convert to a side, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Party::None => None,
            Party::Player1 => Some(Side::Player1),
            Party::Player2 => Some(Side::Player2),
        }
    }
}

impl From<Side> for Party {
    fn from(side: Side) -> Party {
        match side {
            Side::Player1 => Party::Player1,
            Side::Player2 => Party::Player2,
        }
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Lifecycle phase. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GameState {
    /// Created, waiting for player 2.
    WaitingForPlayer = 0,
    /// Both committed. Part of the layout; `join_game` moves straight to `Active`.
    Ready = 1,
    /// Shots being fired.
    Active = 2,
    /// A fleet was sunk (or a side timed out); boards must be revealed.
    WaitingReveal = 3,
    /// Settled and paid out.
    Finished = 4,
}

/// Whose action is pending during `Active`.
///
/// The cycle is fixed: P1 fires, P2 answers that shot, P2 fires, P1 answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Player 1 selects a cell.
    P1Fires,
    /// Player 2 declares hit/miss for player 1's shot.
    P2Responds,
    /// Player 2 selects a cell.
    P2Fires,
    /// Player 1 declares hit/miss for player 2's shot.
    P1Responds,
}

impl TurnState {
    /// Player 1 always opens.
    pub const START: TurnState = TurnState::P1Fires;

    /// Adjacency table of the turn cycle.
    pub fn next(self) -> TurnState {
        match self {
            TurnState::P1Fires => TurnState::P2Responds,
            TurnState::P2Responds => TurnState::P2Fires,
            TurnState::P2Fires => TurnState::P1Responds,
            TurnState::P1Responds => TurnState::P1Fires,
        }
    }

    /// The side expected to act.
    pub fn actor(self) -> Side {
        match self {
            TurnState::P1Fires | TurnState::P1Responds => Side::Player1,
            TurnState::P2Fires | TurnState::P2Responds => Side::Player2,
        }
    }

    /// Is this a firing step (as opposed to a declaration)?
    pub fn is_firing(self) -> bool {
        matches!(self, TurnState::P1Fires | TurnState::P2Fires)
    }

    /// The firing step of `side`.
    pub fn firing(side: Side) -> TurnState {
        match side {
            Side::Player1 => TurnState::P1Fires,
            Side::Player2 => TurnState::P2Fires,
        }
    }

    /// The declaring step of `side`.
    pub fn responding(side: Side) -> TurnState {
        match side {
            Side::Player1 => TurnState::P1Responds,
            Side::Player2 => TurnState::P2Responds,
        }
    }
}

/// Which execution domain currently holds write authority over the record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// The base ledger.
    #[default]
    Base,
    /// The auxiliary low-latency executor named by the delegation record.
    Delegated,
}

// =============================================================================
// GAME RECORD
// =============================================================================

/// One match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Creator.
    pub player1: Pubkey,
    /// Joiner (`Pubkey::UNSET` until join).
    pub player2: Pubkey,
    /// Player 1's board commitment.
    #[serde(with = "crate::core::hash::hex32")]
    pub p1_commit_hash: CommitHash,
    /// Player 2's board commitment.
    #[serde(with = "crate::core::hash::hex32")]
    pub p2_commit_hash: CommitHash,

    /// Cells player 1 fired at.
    pub p1_shots: CellSet,
    /// Cells player 2 fired at.
    pub p2_shots: CellSet,
    /// Cells player 1 declared as hits on their own board.
    pub p1_declared_hits: CellSet,
    /// Cells player 2 declared as hits on their own board.
    pub p2_declared_hits: CellSet,
    /// Player 1's revealed board (empty until reveal).
    pub p1_board: CellSet,
    /// Player 2's revealed board (empty until reveal).
    pub p2_board: CellSet,

    /// Stake per player.
    pub wager: u64,
    /// Creator-chosen nonce used in the address.
    pub game_nonce: u64,

    /// Declared hits player 1 scored.
    pub p1_hit_count: u8,
    /// Declared hits player 2 scored.
    pub p2_hit_count: u8,
    /// Shot awaiting a declaration (`NO_CELL` if none yet).
    pub last_shot_cell: u8,

    /// Pending action.
    pub turn_state: TurnState,
    /// Lifecycle phase.
    pub game_state: GameState,
    /// Player 1 revealed.
    pub p1_revealed: bool,
    /// Player 2 revealed.
    pub p2_revealed: bool,
    /// Outcome. Written once, by finalize.
    pub winner: Party,

    /// Current write authority.
    pub owner: Authority,
    /// Side ruled to have stalled during active play.
    pub forfeited: Party,
    /// Ledger slot of the last player action.
    pub last_action_slot: u64,
}

impl Game {
    /// Encoded size in bytes.
    pub const SPACE: usize = 32 + 32 // player1, player2
        + 32 + 32                   // commit hashes
        + 8 * 6                     // shots, declared hits, boards
        + 8 + 8                     // wager, game_nonce
        + 1 + 1 + 1                 // hit counts, last_shot_cell
        + 4 + 4                     // turn_state, game_state
        + 1 + 1                     // revealed flags
        + 4 + 4 + 4                 // winner, owner, forfeited
        + 8;                        // last_action_slot

    /// Fresh record in `WaitingForPlayer`.
    pub fn new(player1: Pubkey, game_nonce: u64, p1_commit_hash: CommitHash, wager: u64, slot: u64) -> Self {
        Self {
            player1,
            player2: Pubkey::UNSET,
            p1_commit_hash,
            p2_commit_hash: [0; 32],
            p1_shots: CellSet::EMPTY,
            p2_shots: CellSet::EMPTY,
            p1_declared_hits: CellSet::EMPTY,
            p2_declared_hits: CellSet::EMPTY,
            p1_board: CellSet::EMPTY,
            p2_board: CellSet::EMPTY,
            wager,
            game_nonce,
            p1_hit_count: 0,
            p2_hit_count: 0,
            last_shot_cell: NO_CELL,
            turn_state: TurnState::START,
            game_state: GameState::WaitingForPlayer,
            p1_revealed: false,
            p2_revealed: false,
            winner: Party::None,
            owner: Authority::Base,
            forfeited: Party::None,
            last_action_slot: slot,
        }
    }

    /// Player 2, once joined.
    pub fn player2(&self) -> Option<Pubkey> {
        if self.player2.is_unset() {
            None
        } else {
            Some(self.player2)
        }
    }

    /// The shot waiting for a declaration.
    pub fn last_shot_cell(&self) -> Option<Cell> {
        Cell::new(self.last_shot_cell)
    }

    /// Which side a signer sits on, if any.
    pub fn side_of(&self, key: &Pubkey) -> Option<Side> {
        if key.is_unset() {
            None
        } else if *key == self.player1 {
            Some(Side::Player1)
        } else if *key == self.player2 {
            Some(Side::Player2)
        } else {
            None
        }
    }

    /// Identity seated at `side`.
    pub fn player(&self, side: Side) -> Pubkey {
        match side {
            Side::Player1 => self.player1,
            Side::Player2 => self.player2,
        }
    }

    /// Commitment of `side`.
    pub fn commit_hash(&self, side: Side) -> &CommitHash {
        match side {
            Side::Player1 => &self.p1_commit_hash,
            Side::Player2 => &self.p2_commit_hash,
        }
    }

    /// Shots fired by `side`.
    pub fn shots(&self, side: Side) -> CellSet {
        match side {
            Side::Player1 => self.p1_shots,
            Side::Player2 => self.p2_shots,
        }
    }

    pub(crate) fn shots_mut(&mut self, side: Side) -> &mut CellSet {
        match side {
            Side::Player1 => &mut self.p1_shots,
            Side::Player2 => &mut self.p2_shots,
        }
    }

    /// Hits `side` declared against their own board.
    pub fn declared_hits(&self, side: Side) -> CellSet {
        match side {
            Side::Player1 => self.p1_declared_hits,
            Side::Player2 => self.p2_declared_hits,
        }
    }

    pub(crate) fn declared_hits_mut(&mut self, side: Side) -> &mut CellSet {
        match side {
            Side::Player1 => &mut self.p1_declared_hits,
            Side::Player2 => &mut self.p2_declared_hits,
        }
    }

    /// Revealed board of `side` (empty before reveal).
    pub fn board(&self, side: Side) -> CellSet {
        match side {
            Side::Player1 => self.p1_board,
            Side::Player2 => self.p2_board,
        }
    }

    /// Hits scored by `side`.
    pub fn hit_count(&self, side: Side) -> u8 {
        match side {
            Side::Player1 => self.p1_hit_count,
            Side::Player2 => self.p2_hit_count,
        }
    }

    pub(crate) fn hit_count_mut(&mut self, side: Side) -> &mut u8 {
        match side {
            Side::Player1 => &mut self.p1_hit_count,
            Side::Player2 => &mut self.p2_hit_count,
        }
    }

    /// Has `side` revealed?
    pub fn is_revealed(&self, side: Side) -> bool {
        match side {
            Side::Player1 => self.p1_revealed,
            Side::Player2 => self.p2_revealed,
        }
    }

    /// Store a revealed board. Boards are write-once.
    pub(crate) fn store_reveal(&mut self, side: Side, board: CellSet) {
        match side {
            Side::Player1 => {
                self.p1_board = board;
                self.p1_revealed = true;
            }
            Side::Player2 => {
                self.p2_board = board;
                self.p2_revealed = true;
            }
        }
    }

    /// Move the lifecycle forward. Backward or idle transitions are rejected.
    pub(crate) fn advance(&mut self, next: GameState) -> Result<(), GameError> {
        if next <= self.game_state {
            return Err(GameError::InvalidGameState(self.game_state));
        }
        self.game_state = next;
        Ok(())
    }

    /// Encode the fixed-size layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode the fixed-size layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Deterministic hash over every field, in layout order.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_game_record();
        hasher.update_bytes(self.player1.as_bytes());
        hasher.update_bytes(self.player2.as_bytes());
        hasher.update_bytes(&self.p1_commit_hash);
        hasher.update_bytes(&self.p2_commit_hash);
        hasher.update_u64(self.p1_shots.bits());
        hasher.update_u64(self.p2_shots.bits());
        hasher.update_u64(self.p1_declared_hits.bits());
        hasher.update_u64(self.p2_declared_hits.bits());
        hasher.update_u64(self.p1_board.bits());
        hasher.update_u64(self.p2_board.bits());
        hasher.update_u64(self.wager);
        hasher.update_u64(self.game_nonce);
        hasher.update_u8(self.p1_hit_count);
        hasher.update_u8(self.p2_hit_count);
        hasher.update_u8(self.last_shot_cell);
        hasher.update_u8(self.turn_state as u8);
        hasher.update_u8(self.game_state as u8);
        hasher.update_bool(self.p1_revealed);
        hasher.update_bool(self.p2_revealed);
        hasher.update_u8(self.winner as u8);
        hasher.update_u8(self.owner as u8);
        hasher.update_u8(self.forfeited as u8);
        hasher.update_u64(self.last_action_slot);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_game() -> Game {
        Game::new(Pubkey::from_label("p1"), 42, [1; 32], 500_000, 0)
    }

    #[test]
    fn test_encoded_size_is_fixed() {
        let mut game = test_game();
        assert_eq!(game.to_bytes().unwrap().len(), Game::SPACE);

        game.player2 = Pubkey::from_label("p2");
        game.p1_shots = CellSet::from_bits(u64::MAX);
        game.winner = Party::Player2;
        game.game_state = GameState::Finished;
        assert_eq!(game.to_bytes().unwrap().len(), Game::SPACE);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut game = test_game();
        game.player2 = Pubkey::from_label("p2");
        game.turn_state = TurnState::P2Fires;

        let bytes = game.to_bytes().unwrap();
        assert_eq!(Game::from_bytes(&bytes).unwrap(), game);
    }

    #[test]
    fn test_turn_cycle() {
        let mut turn = TurnState::START;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(turn);
            turn = turn.next();
        }
        assert_eq!(turn, TurnState::START);
        assert_eq!(
            seen,
            vec![TurnState::P1Fires, TurnState::P2Responds, TurnState::P2Fires, TurnState::P1Responds]
        );

        assert_eq!(TurnState::P2Responds.actor(), Side::Player2);
        assert!(TurnState::P2Fires.is_firing());
        assert!(!TurnState::P1Responds.is_firing());
    }

    #[test]
    fn test_side_of() {
        let mut game = test_game();
        let p1 = game.player1;
        let p2 = Pubkey::from_label("p2");

        assert_eq!(game.side_of(&p1), Some(Side::Player1));
        assert_eq!(game.side_of(&p2), None);
        assert_eq!(game.side_of(&Pubkey::UNSET), None);

        game.player2 = p2;
        assert_eq!(game.side_of(&p2), Some(Side::Player2));
    }

    #[test]
    fn test_lifecycle_monotonic() {
        let mut game = test_game();
        assert!(game.advance(GameState::Active).is_ok());
        assert_eq!(
            game.advance(GameState::WaitingForPlayer),
            Err(GameError::InvalidGameState(GameState::Active))
        );
        assert!(game.advance(GameState::Active).is_err());
        assert!(game.advance(GameState::WaitingReveal).is_ok());
    }

    #[test]
    fn test_hash_changes_with_state() {
        let game = test_game();
        let mut other = game.clone();
        assert_eq!(game.compute_hash(), other.compute_hash());

        other.p1_shots.insert(Cell::new(3).unwrap());
        assert_ne!(game.compute_hash(), other.compute_hash());
    }
}
