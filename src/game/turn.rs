//! Turn Engine
//!
//! The fire/respond cycle of active play. Only bookkeeping and turn legality
//! are checked here; declarations are trusted until the reveal phase.

use crate::core::cell::{Cell, NO_CELL};
use crate::core::identity::Pubkey;
use crate::game::error::GameError;
use crate::game::state::{Game, GameState, Side, TurnState, TOTAL_SHIP_CELLS};

/// Result of a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    /// Cell the declaration is about.
    pub cell: Cell,
    /// Declared outcome.
    pub hit: bool,
    /// Firer's running hit count after the declaration.
    pub firer_hits: u8,
    /// The firer has sunk the whole fleet; the game moved to `WaitingReveal`.
    pub game_over: bool,
}

/// Resolve the caller's seat for a turn action.
fn seat(game: &Game, caller: &Pubkey) -> Result<Side, GameError> {
    game.side_of(caller).ok_or(GameError::Unauthorized)
}

/// Fire at `cell` on the opponent's grid.
pub fn fire_shot(game: &mut Game, caller: &Pubkey, cell: u8, slot: u64) -> Result<Cell, GameError> {
    if game.game_state != GameState::Active {
        return Err(GameError::GameNotActive);
    }
    let target = Cell::new(cell).ok_or(GameError::InvalidCell(cell))?;
    let side = seat(game, caller)?;
    if game.turn_state != TurnState::firing(side) {
        return Err(GameError::NotYourTurn);
    }
    if !game.shots_mut(side).insert(target) {
        return Err(GameError::CellAlreadyShot(cell));
    }

    game.last_shot_cell = target.index();
    game.turn_state = game.turn_state.next();
    game.last_action_slot = slot;
    Ok(target)
}

/// Declare whether the last incoming shot hit the caller's fleet.
pub fn respond_shot(game: &mut Game, caller: &Pubkey, hit: bool, slot: u64) -> Result<Response, GameError> {
    if game.game_state != GameState::Active {
        return Err(GameError::GameNotActive);
    }
    let side = seat(game, caller)?;
    if game.turn_state != TurnState::responding(side) {
        return Err(GameError::NotYourTurn);
    }
    let cell = game.last_shot_cell().ok_or(GameError::InvalidCell(NO_CELL))?;
    let firer = side.opponent();

    if hit {
        game.declared_hits_mut(side).insert(cell);
        let count = game.hit_count_mut(firer);
        *count = count.saturating_add(1);
    }
    let firer_hits = game.hit_count(firer);
    let game_over = firer_hits >= TOTAL_SHIP_CELLS;

    if game_over {
        game.advance(GameState::WaitingReveal)?;
    } else {
        game.turn_state = game.turn_state.next();
    }
    game.last_action_slot = slot;

    Ok(Response { cell, hit, firer_hits, game_over })
}
