//! Authority transitions on the game record.
//!
//! There is one logical record; delegation only moves the `owner` tag.
//! Which executor may submit against which owner is decided by the ledger's
//! router.

use crate::core::identity::Pubkey;
use crate::game::error::GameError;
use crate::game::state::{Authority, Game, GameState};

/// Hand write authority to the auxiliary executor. Player 1 only, during play.
pub fn delegate(game: &mut Game, caller: &Pubkey) -> Result<(), GameError> {
    if game.game_state != GameState::Active || game.owner != Authority::Base {
        return Err(GameError::InvalidGameState(game.game_state));
    }
    if *caller != game.player1 {
        return Err(GameError::Unauthorized);
    }
    game.owner = Authority::Delegated;
    Ok(())
}

/// Explicit end of the delegated session by either participant.
pub fn end_session(game: &mut Game, caller: &Pubkey) -> Result<(), GameError> {
    if !matches!(game.game_state, GameState::Active | GameState::WaitingReveal) {
        return Err(GameError::GameNotActive);
    }
    if game.side_of(caller).is_none() {
        return Err(GameError::Unauthorized);
    }
    if game.owner != Authority::Delegated {
        return Err(GameError::InvalidGameState(game.game_state));
    }
    game.owner = Authority::Base;
    Ok(())
}

/// Return authority to the base ledger once play is over.
///
/// Returns whether anything changed.
pub fn reclaim(game: &mut Game) -> bool {
    if game.owner == Authority::Delegated && game.game_state != GameState::Active {
        game.owner = Authority::Base;
        true
    } else {
        false
    }
}
