//! Commit Engine
//!
//! Setup phase: each player publishes only the digest of their board and
//! escrows the same stake. The escrow movement itself is done by the ledger;
//! this module validates and records.

use crate::core::hash::CommitHash;
use crate::core::identity::Pubkey;
use crate::game::error::GameError;
use crate::game::state::{Game, GameState, TurnState};

/// Allocate a fresh record for `creator`.
///
/// Uniqueness of (creator, nonce) is enforced by the store, which owns the
/// address space.
pub fn create_game(creator: Pubkey, nonce: u64, commit_hash: CommitHash, wager: u64, slot: u64) -> Game {
    Game::new(creator, nonce, commit_hash, wager, slot)
}

/// Seat the second player.
///
/// `deposit` is the amount the joiner offers to escrow; it must equal the
/// creator's stake.
pub fn join_game(
    game: &mut Game,
    joiner: Pubkey,
    commit_hash: CommitHash,
    deposit: u64,
    slot: u64,
) -> Result<(), GameError> {
    if game.game_state != GameState::WaitingForPlayer || game.player2().is_some() {
        return Err(GameError::GameNotJoinable);
    }
    if joiner == game.player1 || joiner.is_unset() {
        return Err(GameError::Unauthorized);
    }
    if deposit != game.wager {
        return Err(GameError::WagerMismatch {
            expected: game.wager,
            got: deposit,
        });
    }

    game.player2 = joiner;
    game.p2_commit_hash = commit_hash;
    game.turn_state = TurnState::START;
    game.advance(GameState::Active)?;
    game.last_action_slot = slot;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::NO_CELL;
    use crate::game::state::{Authority, Party};

    #[test]
    fn test_create_initial_state() {
        let creator = Pubkey::from_label("p1");
        let game = create_game(creator, 9, [7; 32], 500_000, 3);

        assert_eq!(game.player1, creator);
        assert!(game.player2().is_none());
        assert_eq!(game.game_state, GameState::WaitingForPlayer);
        assert_eq!(game.turn_state, TurnState::P1Fires);
        assert_eq!(game.last_shot_cell, NO_CELL);
        assert_eq!(game.winner, Party::None);
        assert_eq!(game.owner, Authority::Base);
        assert_eq!(game.last_action_slot, 3);
    }

    #[test]
    fn test_join_activates_game() {
        let mut game = create_game(Pubkey::from_label("p1"), 1, [1; 32], 500_000, 0);
        let joiner = Pubkey::from_label("p2");

        join_game(&mut game, joiner, [2; 32], 500_000, 5).unwrap();

        assert_eq!(game.player2(), Some(joiner));
        assert_eq!(game.p2_commit_hash, [2; 32]);
        assert_eq!(game.game_state, GameState::Active);
        assert_eq!(game.turn_state, TurnState::P1Fires);
        assert_eq!(game.last_action_slot, 5);
    }

    #[test]
    fn test_join_rejections() {
        let p1 = Pubkey::from_label("p1");
        let mut game = create_game(p1, 1, [1; 32], 100, 0);

        assert_eq!(join_game(&mut game, p1, [2; 32], 100, 0), Err(GameError::Unauthorized));
        assert_eq!(
            join_game(&mut game, Pubkey::from_label("p2"), [2; 32], 99, 0),
            Err(GameError::WagerMismatch { expected: 100, got: 99 })
        );
        assert_eq!(game.game_state, GameState::WaitingForPlayer);

        join_game(&mut game, Pubkey::from_label("p2"), [2; 32], 100, 0).unwrap();
        assert_eq!(
            join_game(&mut game, Pubkey::from_label("p3"), [3; 32], 100, 0),
            Err(GameError::GameNotJoinable)
        );
    }
}
