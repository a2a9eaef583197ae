//! Reveal & Fairness Verification
//!
//! Closes the trust gap of self-reported hits. A revealed board must match
//! the commitment fixed before the first shot, and every declaration a player
//! made must agree with that board:
//!
//! ```text
//! declared_hits(X) == shots(opponent of X) & board(X)
//! ```
//!
//! Any disagreement (a claimed hit on water, a denied hit on a ship) marks X
//! as a cheater. Finalize is the only writer of `winner` and of the payout.

use serde::{Serialize, Deserialize};

use crate::core::cell::CellSet;
use crate::core::hash::{board_commitment, Salt};
use crate::core::identity::Pubkey;
use crate::game::error::GameError;
use crate::game::state::{Game, GameState, Party, Side, TOTAL_SHIP_CELLS};

/// Open the caller's commitment.
pub fn reveal_board(
    game: &mut Game,
    caller: &Pubkey,
    board: u64,
    salt: &Salt,
    slot: u64,
) -> Result<Side, GameError> {
    if game.game_state != GameState::WaitingReveal {
        return Err(GameError::InvalidGameState(game.game_state));
    }
    let side = game.side_of(caller).ok_or(GameError::Unauthorized)?;
    if game.is_revealed(side) {
        return Err(GameError::AlreadyRevealed);
    }

    let cells = CellSet::from_bits(board);
    if cells.len() != u32::from(TOTAL_SHIP_CELLS) {
        return Err(GameError::InvalidBoard(cells.len()));
    }
    if board_commitment(board, salt) != *game.commit_hash(side) {
        return Err(GameError::BoardHashMismatch);
    }

    game.store_reveal(side, cells);
    game.last_action_slot = slot;
    Ok(side)
}

/// Per-side result of the declaration audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessReport {
    /// Player 1 lied about a shot, or never revealed.
    pub p1_cheated: bool,
    /// Player 2 lied about a shot, or never revealed.
    pub p2_cheated: bool,
}

impl FairnessReport {
    /// Cheat flag of `side`.
    pub fn cheated(&self, side: Side) -> bool {
        match side {
            Side::Player1 => self.p1_cheated,
            Side::Player2 => self.p2_cheated,
        }
    }

    /// The only cheater, if exactly one side cheated.
    pub fn sole_cheater(&self) -> Option<Side> {
        match (self.p1_cheated, self.p2_cheated) {
            (true, false) => Some(Side::Player1),
            (false, true) => Some(Side::Player2),
            _ => None,
        }
    }
}

/// Hits `side` should have declared, given their revealed board.
pub fn expected_hits(game: &Game, side: Side) -> CellSet {
    game.shots(side.opponent()) & game.board(side)
}

/// Audit both sides. An unrevealed side counts as cheating.
pub fn audit(game: &Game) -> FairnessReport {
    let cheated = |side: Side| {
        !game.is_revealed(side) || game.declared_hits(side) != expected_hits(game, side)
    };
    FairnessReport {
        p1_cheated: cheated(Side::Player1),
        p2_cheated: cheated(Side::Player2),
    }
}

/// Outcome of a successful finalize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Winning seat.
    pub winner: Side,
    /// Identity receiving the pool.
    pub payee: Pubkey,
    /// Pool size (twice the wager).
    pub amount: u64,
    /// Audit outcome.
    pub report: FairnessReport,
}

/// Winner from the play itself, ignoring the audit.
fn declared_outcome(game: &Game) -> Option<Side> {
    if game.p1_hit_count >= TOTAL_SHIP_CELLS {
        Some(Side::Player1)
    } else if game.p2_hit_count >= TOTAL_SHIP_CELLS {
        Some(Side::Player2)
    } else {
        game.forfeited.side().map(Side::opponent)
    }
}

/// Audit, decide the winner, and close the game.
///
/// Needs both reveals, or one reveal once `reveal_timeout_slots` have passed
/// since the last action. The ledger moves the funds in the same step.
pub fn finalize(game: &mut Game, slot: u64, reveal_timeout_slots: u64) -> Result<Settlement, GameError> {
    if game.game_state != GameState::WaitingReveal {
        return Err(GameError::InvalidGameState(game.game_state));
    }

    let revealed = [game.p1_revealed, game.p2_revealed];
    match revealed {
        [true, true] => {}
        [false, false] => return Err(GameError::GameNotReady),
        _ => {
            if slot.saturating_sub(game.last_action_slot) < reveal_timeout_slots {
                return Err(GameError::GameNotReady);
            }
        }
    }

    let report = audit(game);
    let winner = match report.sole_cheater() {
        Some(cheater) => cheater.opponent(),
        None => declared_outcome(game).ok_or(GameError::InvalidGameState(game.game_state))?,
    };

    game.winner = Party::from(winner);
    game.advance(GameState::Finished)?;

    Ok(Settlement {
        winner,
        payee: game.player(winner),
        amount: game.wager.saturating_mul(2),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::Cell;
    use crate::game::commit::{create_game, join_game};
    use crate::game::turn::{fire_shot, respond_shot};

    const P1_BOARD: u64 = 0b111 | (0b111 << 8) | (0b111 << 16);
    const P2_BOARD: u64 = (0b111 << 45) | (0b111 << 53) | (0b111 << 61);
    const P1_SALT: Salt = [11; 32];
    const P2_SALT: Salt = [22; 32];

    fn cells(bits: u64) -> Vec<u8> {
        CellSet::from_bits(bits).iter().map(Cell::index).collect()
    }

    /// Player 1 sinks player 2 while player 2 only hits water.
    /// `p1_lies_at` makes player 1 deny a hit on one of their ship cells.
    fn played_game(p1_lies_at: Option<u8>) -> (Game, Pubkey, Pubkey) {
        let p1 = Pubkey::from_label("p1");
        let p2 = Pubkey::from_label("p2");
        let mut game = create_game(p1, 1, board_commitment(P1_BOARD, &P1_SALT), 500_000, 0);
        join_game(&mut game, p2, board_commitment(P2_BOARD, &P2_SALT), 500_000, 0).unwrap();

        let targets = cells(P2_BOARD);
        for (round, target) in targets.iter().enumerate() {
            fire_shot(&mut game, &p1, *target, 0).unwrap();
            respond_shot(&mut game, &p2, true, 0).unwrap();
            if round + 1 == targets.len() {
                break;
            }
            let (shot, truth) = match (round, p1_lies_at) {
                (0, Some(cell)) => (cell, false),
                _ => (24 + round as u8, false),
            };
            fire_shot(&mut game, &p2, shot, 0).unwrap();
            respond_shot(&mut game, &p1, truth, 0).unwrap();
        }
        assert_eq!(game.game_state, GameState::WaitingReveal);
        (game, p1, p2)
    }

    #[test]
    fn test_reveal_accepts_matching_board() {
        let (mut game, p1, p2) = played_game(None);
        assert_eq!(reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 1), Ok(Side::Player1));
        assert_eq!(reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 2), Ok(Side::Player2));
        assert_eq!(game.p1_board.bits(), P1_BOARD);
        assert!(game.p1_revealed && game.p2_revealed);
    }

    #[test]
    fn test_reveal_rejections() {
        let (mut game, p1, _) = played_game(None);

        assert_eq!(
            reveal_board(&mut game, &Pubkey::from_label("x"), P1_BOARD, &P1_SALT, 0),
            Err(GameError::Unauthorized)
        );
        assert_eq!(
            reveal_board(&mut game, &p1, P1_BOARD | (1 << 40), &P1_SALT, 0),
            Err(GameError::InvalidBoard(10))
        );
        let moved = (P1_BOARD & !1) | (1 << 40);
        assert_eq!(
            reveal_board(&mut game, &p1, moved, &P1_SALT, 0),
            Err(GameError::BoardHashMismatch)
        );
        assert!(!game.p1_revealed);

        reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0).unwrap();
        assert_eq!(
            reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0),
            Err(GameError::AlreadyRevealed)
        );
    }

    #[test]
    fn test_reveal_rejects_any_salt_bit_flip() {
        let (game, p1, _) = played_game(None);
        for byte in 0..32 {
            let mut salt = P1_SALT;
            salt[byte] ^= 0x01;
            let mut copy = game.clone();
            assert_eq!(
                reveal_board(&mut copy, &p1, P1_BOARD, &salt, 0),
                Err(GameError::BoardHashMismatch)
            );
        }
    }

    #[test]
    fn test_reveal_before_play_ends() {
        let p1 = Pubkey::from_label("p1");
        let mut game = create_game(p1, 1, board_commitment(P1_BOARD, &P1_SALT), 0, 0);
        assert_eq!(
            reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0),
            Err(GameError::InvalidGameState(GameState::WaitingForPlayer))
        );
    }

    #[test]
    fn test_finalize_honest_game() {
        let (mut game, p1, p2) = played_game(None);
        assert_eq!(finalize(&mut game, 0, 100), Err(GameError::GameNotReady));

        reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0).unwrap();
        reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 0).unwrap();

        let settlement = finalize(&mut game, 0, 100).unwrap();
        assert_eq!(settlement.winner, Side::Player1);
        assert_eq!(settlement.payee, p1);
        assert_eq!(settlement.amount, 1_000_000);
        assert_eq!(settlement.report.sole_cheater(), None);
        assert_eq!(game.winner, Party::Player1);
        assert_eq!(game.game_state, GameState::Finished);
    }

    #[test]
    fn test_finalize_twice_fails() {
        let (mut game, p1, p2) = played_game(None);
        reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0).unwrap();
        reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 0).unwrap();
        finalize(&mut game, 0, 100).unwrap();

        assert_eq!(
            finalize(&mut game, 0, 100),
            Err(GameError::InvalidGameState(GameState::Finished))
        );
        assert_eq!(game.winner, Party::Player1);
    }

    #[test]
    fn test_liar_loses_despite_sinking() {
        // Player 2 shoots player 1's ship at cell 0; player 1 declares a miss.
        let (mut game, p1, p2) = played_game(Some(0));
        assert_eq!(game.p1_hit_count, 9);

        reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0).unwrap();
        reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 0).unwrap();

        let report = audit(&game);
        assert!(report.p1_cheated);
        assert!(!report.p2_cheated);

        let settlement = finalize(&mut game, 0, 100).unwrap();
        assert_eq!(settlement.winner, Side::Player2);
        assert_eq!(settlement.payee, p2);
    }

    #[test]
    fn test_both_cheated_keeps_declared_outcome() {
        let p1 = Pubkey::from_label("p1");
        let p2 = Pubkey::from_label("p2");
        let mut game = create_game(p1, 1, board_commitment(P1_BOARD, &P1_SALT), 500_000, 0);
        join_game(&mut game, p2, board_commitment(P2_BOARD, &P2_SALT), 500_000, 0).unwrap();

        // Player 2 claims a hit on water at cell 0; player 1 denies a hit on cell 0.
        fire_shot(&mut game, &p1, 0, 0).unwrap();
        respond_shot(&mut game, &p2, true, 0).unwrap();
        fire_shot(&mut game, &p2, 0, 0).unwrap();
        respond_shot(&mut game, &p1, false, 0).unwrap();

        let targets = cells(P2_BOARD);
        for (round, target) in targets.iter().take(8).enumerate() {
            fire_shot(&mut game, &p1, *target, 0).unwrap();
            respond_shot(&mut game, &p2, true, 0).unwrap();
            if round == 7 {
                break;
            }
            fire_shot(&mut game, &p2, 24 + round as u8, 0).unwrap();
            respond_shot(&mut game, &p1, false, 0).unwrap();
        }
        assert_eq!(game.game_state, GameState::WaitingReveal);
        assert_eq!(game.p1_hit_count, 9);

        reveal_board(&mut game, &p1, P1_BOARD, &P1_SALT, 0).unwrap();
        reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 0).unwrap();

        let settlement = finalize(&mut game, 0, 100).unwrap();
        assert!(settlement.report.p1_cheated);
        assert!(settlement.report.p2_cheated);
        assert_eq!(settlement.report.sole_cheater(), None);
        assert_eq!(settlement.winner, Side::Player1);
        assert_eq!(game.winner, Party::Player1);
    }

    #[test]
    fn test_no_reveals_never_finalize() {
        let (mut game, _, _) = played_game(None);
        assert_eq!(finalize(&mut game, 1_000_000, 10), Err(GameError::GameNotReady));
        assert_eq!(game.game_state, GameState::WaitingReveal);
        assert_eq!(game.winner, Party::None);
    }

    #[test]
    fn test_reveal_timeout_finalize() {
        let (mut game, _, p2) = played_game(None);
        reveal_board(&mut game, &p2, P2_BOARD, &P2_SALT, 10).unwrap();

        assert_eq!(finalize(&mut game, 50, 100), Err(GameError::GameNotReady));

        let settlement = finalize(&mut game, 110, 100).unwrap();
        assert!(settlement.report.p1_cheated);
        assert_eq!(settlement.winner, Side::Player2);
    }
}
