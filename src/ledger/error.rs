//! Ledger Errors

use crate::core::identity::{GameAddress, Pubkey};
use crate::game::error::{ErrorClass, GameError};
use crate::ledger::delegation::Route;

/// Errors from submitting a transaction to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The state machine rejected the instruction.
    #[error(transparent)]
    Game(#[from] GameError),

    /// No record at the target address.
    #[error("game {0} not found")]
    GameNotFound(GameAddress),

    /// A record already exists at the derived address.
    #[error("game {0} already exists")]
    DuplicateGame(GameAddress),

    /// Signer cannot cover the deposit.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount required.
        needed: u64,
        /// Amount held.
        available: u64,
    },

    /// Record is held by the auxiliary executor; base-ledger writes are frozen.
    #[error("game {0} is delegated to the auxiliary executor")]
    AccountDelegated(GameAddress),

    /// Auxiliary-only instruction on a record the base ledger owns.
    #[error("game {0} is not delegated")]
    NotDelegated(GameAddress),

    /// Submitted through an executor that does not hold the record.
    #[error("wrong executor: submit through the {expected}")]
    WrongExecutor {
        /// Route that may carry this instruction.
        expected: Route,
    },

    /// The auxiliary executor is unknown or offline.
    #[error("auxiliary executor {0} unavailable")]
    ExecutorUnavailable(Pubkey),

    /// Faucet request above the configured limit.
    #[error("airdrop of {requested} exceeds the faucet limit of {limit}")]
    FaucetLimit {
        /// Amount asked for.
        requested: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// Balance arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,
}

impl LedgerError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Game(err) => err.class(),
            Self::GameNotFound(_)
            | Self::DuplicateGame(_)
            | Self::InsufficientFunds { .. }
            | Self::FaucetLimit { .. }
            | Self::Overflow => ErrorClass::InputValidity,
            Self::ExecutorUnavailable(_) => ErrorClass::Sequencing,
            Self::AccountDelegated(_) | Self::NotDelegated(_) | Self::WrongExecutor { .. } => {
                ErrorClass::Authorization
            }
        }
    }
}
