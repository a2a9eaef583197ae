//! Transactions
//!
//! The closed set of instructions a signer can submit against a game record,
//! and the pure dispatcher that applies one to a record. The dispatcher never
//! touches balances or authority routing; it reports what the ledger must do
//! (escrow deposit, payout, delegation bookkeeping) in a `StepResult`.

use serde::{Serialize, Deserialize};

use crate::core::hash::{CommitHash, Salt};
use crate::core::identity::{GameAddress, Pubkey};
use crate::game::commit;
use crate::game::delegation;
use crate::game::error::GameError;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::forfeit;
use crate::game::reveal::{self, Settlement};
use crate::game::state::{Game, Party};
use crate::game::turn;

/// A signed request against one game record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    /// Allocate a record at `(signer, nonce)` and escrow the stake.
    CreateGame {
        /// Address seed, unique per creator.
        nonce: u64,
        /// Commitment to the creator's board.
        #[serde(with = "crate::core::hash::hex32")]
        commit_hash: CommitHash,
        /// Stake per side.
        wager: u64,
    },

    /// Take the second seat with a matching stake.
    JoinGame {
        /// Record to join.
        game: GameAddress,
        /// Commitment to the joiner's board.
        #[serde(with = "crate::core::hash::hex32")]
        commit_hash: CommitHash,
        /// Must equal the creator's stake.
        wager: u64,
    },

    /// Move write authority of `(signer, nonce)` to the auxiliary executor.
    Delegate {
        /// Seed the record was created with.
        nonce: u64,
        /// Executor override; the configured default when absent.
        #[serde(default)]
        validator: Option<Pubkey>,
    },

    /// Fire at a cell of the opponent's grid.
    FireShot {
        /// Target record.
        game: GameAddress,
        /// Cell index, 0..64.
        cell: u8,
    },

    /// Declare the outcome of the last incoming shot.
    RespondShot {
        /// Target record.
        game: GameAddress,
        /// Whether the shot hit a ship.
        hit: bool,
    },

    /// Commit the auxiliary session back to the base ledger.
    EndSession {
        /// Delegated record.
        game: GameAddress,
    },

    /// Open the signer's board commitment.
    RevealBoard {
        /// Target record.
        game: GameAddress,
        /// Ship cells as a bitboard.
        board: u64,
        /// Salt used in the commitment.
        #[serde(with = "crate::core::hash::hex32")]
        salt: Salt,
    },

    /// Audit, decide and pay out. Anyone may submit.
    Finalize {
        /// Record to settle.
        game: GameAddress,
    },

    /// Rule a stalled opponent forfeit.
    ClaimTimeout {
        /// Stalled record.
        game: GameAddress,
    },
}

/// Which execution domain may carry an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Always the base ledger; refused while the record is delegated.
    BaseOnly,
    /// Whichever domain currently owns the record.
    Owner,
    /// Only the auxiliary executor holding the record.
    AuxiliaryOnly,
}

impl Instruction {
    /// Name for logs and receipts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateGame { .. } => "create_game",
            Self::JoinGame { .. } => "join_game",
            Self::Delegate { .. } => "delegate",
            Self::FireShot { .. } => "fire_shot",
            Self::RespondShot { .. } => "respond_shot",
            Self::EndSession { .. } => "end_session",
            Self::RevealBoard { .. } => "reveal_board",
            Self::Finalize { .. } => "finalize",
            Self::ClaimTimeout { .. } => "claim_timeout",
        }
    }

    /// Address of the record this instruction targets.
    pub fn address(&self, signer: &Pubkey) -> GameAddress {
        match self {
            Self::CreateGame { nonce, .. } | Self::Delegate { nonce, .. } => {
                GameAddress::derive(signer, *nonce)
            }
            Self::JoinGame { game, .. }
            | Self::FireShot { game, .. }
            | Self::RespondShot { game, .. }
            | Self::EndSession { game }
            | Self::RevealBoard { game, .. }
            | Self::Finalize { game }
            | Self::ClaimTimeout { game } => *game,
        }
    }

    /// Routing rule for this instruction.
    pub fn route_policy(&self) -> RoutePolicy {
        match self {
            Self::FireShot { .. } | Self::RespondShot { .. } => RoutePolicy::Owner,
            Self::EndSession { .. } => RoutePolicy::AuxiliaryOnly,
            _ => RoutePolicy::BaseOnly,
        }
    }
}

/// Ledger-provided inputs to a step.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    /// Signer of the transaction.
    pub signer: Pubkey,
    /// Current ledger slot.
    pub slot: u64,
    /// Inactivity window after which the waiting player may claim.
    pub turn_timeout_slots: u64,
    /// Window after which finalize accepts a single reveal.
    pub reveal_timeout_slots: u64,
}

/// What a successful step asks of the ledger.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Emitted events, in order.
    pub events: Vec<GameEvent>,
    /// Amount the signer must move into escrow.
    pub deposit: u64,
    /// Payout to perform.
    pub settlement: Option<Settlement>,
    /// A delegation record must be created.
    pub delegated: bool,
    /// The delegation record must be closed.
    pub reclaimed: bool,
}

impl StepResult {
    fn push(&mut self, game: GameAddress, slot: u64, party: Party, data: GameEventData) {
        self.events.push(GameEvent::new(game, slot, party.side(), data));
    }
}

/// Build a new record from `CreateGame`.
pub fn genesis(instruction: &Instruction, ctx: &ExecContext) -> Result<(GameAddress, Game, StepResult), GameError> {
    let Instruction::CreateGame { nonce, commit_hash, wager } = instruction else {
        return Err(GameError::GameNotActive);
    };

    let address = GameAddress::derive(&ctx.signer, *nonce);
    let game = commit::create_game(ctx.signer, *nonce, *commit_hash, *wager, ctx.slot);

    let mut step = StepResult { deposit: *wager, ..Default::default() };
    step.push(
        address,
        ctx.slot,
        Party::Player1,
        GameEventData::GameCreated { creator: ctx.signer, nonce: *nonce, wager: *wager },
    );
    Ok((address, game, step))
}

/// Apply `instruction` to an existing record.
///
/// On error the record may be partially written; callers run this on a copy
/// and discard it.
pub fn execute(game: &mut Game, instruction: &Instruction, ctx: &ExecContext) -> Result<StepResult, GameError> {
    let address = instruction.address(&ctx.signer);
    let signer = &ctx.signer;
    let slot = ctx.slot;
    let mut step = StepResult::default();

    match instruction {
        Instruction::CreateGame { .. } => {
            return Err(GameError::InvalidGameState(game.game_state));
        }

        Instruction::JoinGame { commit_hash, wager, .. } => {
            commit::join_game(game, *signer, *commit_hash, *wager, slot)?;
            step.deposit = *wager;
            step.push(address, slot, Party::Player2, GameEventData::PlayerJoined { player: *signer });
        }

        Instruction::Delegate { .. } => {
            delegation::delegate(game, signer)?;
            step.delegated = true;
            // The validator is filled in by the ledger, which owns executor selection.
        }

        Instruction::FireShot { cell, .. } => {
            let side = game.side_of(signer);
            let target = turn::fire_shot(game, signer, *cell, slot)?;
            step.events.push(GameEvent::new(address, slot, side, GameEventData::ShotFired { cell: target }));
        }

        Instruction::RespondShot { hit, .. } => {
            let side = game.side_of(signer);
            let response = turn::respond_shot(game, signer, *hit, slot)?;
            step.events.push(GameEvent::new(
                address,
                slot,
                side,
                GameEventData::ShotAnswered {
                    cell: response.cell,
                    hit: response.hit,
                    firer_hits: response.firer_hits,
                },
            ));
            if response.game_over {
                step.push(address, slot, Party::None, GameEventData::RevealPhaseStarted);
                if delegation::reclaim(game) {
                    step.reclaimed = true;
                    step.push(address, slot, Party::None, GameEventData::AuthorityReclaimed { automatic: true });
                }
            }
        }

        Instruction::EndSession { .. } => {
            let side = game.side_of(signer);
            delegation::end_session(game, signer)?;
            step.reclaimed = true;
            step.events.push(GameEvent::new(
                address,
                slot,
                side,
                GameEventData::AuthorityReclaimed { automatic: false },
            ));
        }

        Instruction::RevealBoard { board, salt, .. } => {
            let side = reveal::reveal_board(game, signer, *board, salt, slot)?;
            step.push(address, slot, side.into(), GameEventData::BoardRevealed);
        }

        Instruction::Finalize { .. } => {
            let settlement = reveal::finalize(game, slot, ctx.reveal_timeout_slots)?;
            step.push(
                address,
                slot,
                Party::None,
                GameEventData::GameFinalized {
                    winner: settlement.winner.into(),
                    payee: settlement.payee,
                    amount: settlement.amount,
                    p1_cheated: settlement.report.p1_cheated,
                    p2_cheated: settlement.report.p2_cheated,
                },
            );
            step.settlement = Some(settlement);
        }

        Instruction::ClaimTimeout { .. } => {
            let claimant = game.side_of(signer);
            let stalled = forfeit::claim_timeout(game, signer, slot, ctx.turn_timeout_slots)?;
            step.events.push(GameEvent::new(
                address,
                slot,
                claimant,
                GameEventData::TimeoutClaimed { stalled },
            ));
        }
    }

    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Authority, GameState};

    fn ctx(signer: Pubkey, slot: u64) -> ExecContext {
        ExecContext { signer, slot, turn_timeout_slots: 150, reveal_timeout_slots: 750 }
    }

    #[test]
    fn test_instruction_json() {
        let game = GameAddress::derive(&Pubkey::from_label("p1"), 3);
        let fire = Instruction::FireShot { game, cell: 17 };
        let json = serde_json::to_value(&fire).unwrap();
        assert_eq!(json["type"], "fire_shot");
        assert_eq!(json["game"], game.to_hex());

        let create: Instruction = serde_json::from_str(&format!(
            r#"{{"type":"create_game","nonce":3,"commit_hash":"{}","wager":5}}"#,
            "00".repeat(32)
        ))
        .unwrap();
        assert_eq!(create, Instruction::CreateGame { nonce: 3, commit_hash: [0; 32], wager: 5 });

        let delegate: Instruction = serde_json::from_str(r#"{"type":"delegate","nonce":3}"#).unwrap();
        assert_eq!(delegate, Instruction::Delegate { nonce: 3, validator: None });
    }

    #[test]
    fn test_address_resolution() {
        let p1 = Pubkey::from_label("p1");
        let expected = GameAddress::derive(&p1, 8);
        let create = Instruction::CreateGame { nonce: 8, commit_hash: [0; 32], wager: 0 };
        let delegate = Instruction::Delegate { nonce: 8, validator: None };
        let finalize = Instruction::Finalize { game: expected };

        assert_eq!(create.address(&p1), expected);
        assert_eq!(delegate.address(&p1), expected);
        assert_eq!(finalize.address(&Pubkey::from_label("anyone")), expected);
    }

    #[test]
    fn test_route_policies() {
        let game = GameAddress::derive(&Pubkey::from_label("p1"), 0);
        assert_eq!(Instruction::FireShot { game, cell: 0 }.route_policy(), RoutePolicy::Owner);
        assert_eq!(Instruction::EndSession { game }.route_policy(), RoutePolicy::AuxiliaryOnly);
        assert_eq!(Instruction::Finalize { game }.route_policy(), RoutePolicy::BaseOnly);
        assert_eq!(Instruction::ClaimTimeout { game }.route_policy(), RoutePolicy::BaseOnly);
    }

    #[test]
    fn test_execute_setup_and_delegation() {
        let p1 = Pubkey::from_label("p1");
        let p2 = Pubkey::from_label("p2");
        let create = Instruction::CreateGame { nonce: 1, commit_hash: [1; 32], wager: 40 };

        let (address, mut game, step) = genesis(&create, &ctx(p1, 0)).unwrap();
        assert_eq!(step.deposit, 40);
        assert_eq!(step.events[0].name(), "game_created");

        let join = Instruction::JoinGame { game: address, commit_hash: [2; 32], wager: 40 };
        let step = execute(&mut game, &join, &ctx(p2, 1)).unwrap();
        assert_eq!(step.deposit, 40);
        assert_eq!(game.game_state, GameState::Active);

        let delegate = Instruction::Delegate { nonce: 1, validator: None };
        let step = execute(&mut game, &delegate, &ctx(p1, 2)).unwrap();
        assert!(step.delegated);
        assert_eq!(game.owner, Authority::Delegated);

        let end = Instruction::EndSession { game: address };
        let step = execute(&mut game, &end, &ctx(p2, 3)).unwrap();
        assert!(step.reclaimed);
        assert_eq!(game.owner, Authority::Base);
    }

    #[test]
    fn test_genesis_rejects_other_instructions() {
        let p1 = Pubkey::from_label("p1");
        let fire = Instruction::FireShot { game: GameAddress::derive(&p1, 0), cell: 0 };
        assert!(genesis(&fire, &ctx(p1, 0)).is_err());
    }
}
