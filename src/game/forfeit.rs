//! Timeout forfeiture.
//!
//! A player who stops acting during play can be ruled forfeit by the opponent
//! once `turn_timeout_slots` have passed since the last game action. The game
//! then enters the reveal phase as usual; the audit still applies, so a
//! claimant who lied during play loses anyway.

use crate::core::identity::Pubkey;
use crate::game::error::GameError;
use crate::game::state::{Game, GameState, Party, Side};

/// Rule the side whose action is pending as stalled.
///
/// Only the waiting participant may claim. Returns the stalled side.
pub fn claim_timeout(
    game: &mut Game,
    caller: &Pubkey,
    slot: u64,
    turn_timeout_slots: u64,
) -> Result<Side, GameError> {
    if game.game_state != GameState::Active {
        return Err(GameError::InvalidGameState(game.game_state));
    }
    let claimant = game.side_of(caller).ok_or(GameError::Unauthorized)?;
    let stalled = game.turn_state.actor();
    if claimant == stalled {
        return Err(GameError::Unauthorized);
    }

    let elapsed = slot.saturating_sub(game.last_action_slot);
    if elapsed < turn_timeout_slots {
        return Err(GameError::TimeoutNotReached {
            remaining: turn_timeout_slots - elapsed,
        });
    }

    game.forfeited = Party::from(stalled);
    game.advance(GameState::WaitingReveal)?;
    game.last_action_slot = slot;
    Ok(stalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::commit::{create_game, join_game};
    use crate::game::turn::fire_shot;

    fn active_game() -> (Game, Pubkey, Pubkey) {
        let p1 = Pubkey::from_label("p1");
        let p2 = Pubkey::from_label("p2");
        let mut game = create_game(p1, 1, [1; 32], 10, 0);
        join_game(&mut game, p2, [2; 32], 10, 100).unwrap();
        (game, p1, p2)
    }

    #[test]
    fn test_claim_after_timeout() {
        let (mut game, p1, p2) = active_game();
        fire_shot(&mut game, &p1, 3, 110).unwrap();

        assert_eq!(
            claim_timeout(&mut game, &p1, 150, 150),
            Err(GameError::TimeoutNotReached { remaining: 110 })
        );
        assert_eq!(claim_timeout(&mut game, &p2, 300, 150), Err(GameError::Unauthorized));

        assert_eq!(claim_timeout(&mut game, &p1, 260, 150), Ok(Side::Player2));
        assert_eq!(game.forfeited, Party::Player2);
        assert_eq!(game.game_state, GameState::WaitingReveal);
        assert_eq!(game.last_action_slot, 260);
    }

    #[test]
    fn test_claim_requires_active_participant() {
        let (mut game, _, p2) = active_game();
        assert_eq!(
            claim_timeout(&mut game, &Pubkey::from_label("x"), 1_000, 10),
            Err(GameError::Unauthorized)
        );

        claim_timeout(&mut game, &p2, 1_000, 10).unwrap();
        assert_eq!(
            claim_timeout(&mut game, &p2, 2_000, 10),
            Err(GameError::InvalidGameState(GameState::WaitingReveal))
        );
    }
}
