//! Authority routing between the base ledger and the auxiliary executor.
//!
//! A transaction arrives on a `Route`. Whether that route may write the record
//! depends on the instruction's `RoutePolicy` and on the record's current
//! owner. The record itself is never copied: delegation only changes which
//! route is accepted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;
use crate::core::identity::{GameAddress, Pubkey};
use crate::game::instruction::RoutePolicy;
use crate::game::state::Authority;
use crate::ledger::error::LedgerError;

/// Default interval between checkpoints of a delegated record.
pub const DEFAULT_COMMIT_FREQUENCY_MS: u64 = 5_000;

/// Execution domain a transaction was submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    /// The authoritative base ledger.
    Base,
    /// An auxiliary low-latency executor.
    Auxiliary {
        /// Executor identity.
        validator: Pubkey,
    },
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Base => f.write_str("base ledger"),
            Route::Auxiliary { validator } => write!(f, "auxiliary executor {}", validator.short()),
        }
    }
}

/// Bookkeeping kept next to a delegated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    /// Executor holding write authority.
    pub validator: Pubkey,
    /// Signer who delegated (player 1).
    pub delegated_by: Pubkey,
    /// Slot of the hand-off.
    pub delegated_at_slot: u64,
    /// Checkpoint interval.
    pub commit_frequency_ms: u64,
    /// Checkpoints taken so far.
    pub commits: u64,
    /// Record hash at the last checkpoint.
    #[serde(with = "crate::core::hash::hex32")]
    pub last_commit_hash: StateHash,
    /// Slot of the last checkpoint.
    pub last_commit_slot: u64,
}

impl DelegationRecord {
    /// Open a record at hand-off time.
    pub fn new(validator: Pubkey, delegated_by: Pubkey, slot: u64, commit_frequency_ms: u64, state_hash: StateHash) -> Self {
        Self {
            validator,
            delegated_by,
            delegated_at_slot: slot,
            commit_frequency_ms,
            commits: 0,
            last_commit_hash: state_hash,
            last_commit_slot: slot,
        }
    }

    /// Record a checkpoint. Returns false if nothing changed since the last one.
    pub fn checkpoint(&mut self, state_hash: StateHash, slot: u64) -> bool {
        if state_hash == self.last_commit_hash {
            return false;
        }
        self.commits += 1;
        self.last_commit_hash = state_hash;
        self.last_commit_slot = slot;
        true
    }

    /// Route that currently holds the record.
    pub fn route(&self) -> Route {
        Route::Auxiliary { validator: self.validator }
    }
}

/// Handle on one auxiliary executor.
#[derive(Debug)]
pub struct AuxiliaryExecutor {
    /// Executor identity.
    pub id: Pubkey,
    online: AtomicBool,
    sessions: AtomicU64,
}

impl AuxiliaryExecutor {
    /// New executor, online.
    pub fn new(id: Pubkey) -> Self {
        Self {
            id,
            online: AtomicBool::new(true),
            sessions: AtomicU64::new(0),
        }
    }

    /// Is it accepting transactions?
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Take the executor up or down.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Records currently delegated to this executor.
    pub fn active_sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn session_opened(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        // Never below zero.
        let _ = self.sessions.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

/// Known auxiliary executors.
#[derive(Debug, Default)]
pub struct ExecutorDirectory {
    executors: BTreeMap<Pubkey, Arc<AuxiliaryExecutor>>,
}

impl ExecutorDirectory {
    /// Directory with the given executors.
    pub fn new(ids: impl IntoIterator<Item = Pubkey>) -> Self {
        let executors = ids
            .into_iter()
            .map(|id| (id, Arc::new(AuxiliaryExecutor::new(id))))
            .collect();
        Self { executors }
    }

    /// Look up an executor.
    pub fn get(&self, id: &Pubkey) -> Option<Arc<AuxiliaryExecutor>> {
        self.executors.get(id).cloned()
    }

    /// An online executor, or `ExecutorUnavailable`.
    pub fn available(&self, id: &Pubkey) -> Result<Arc<AuxiliaryExecutor>, LedgerError> {
        match self.executors.get(id) {
            Some(executor) if executor.is_online() => Ok(executor.clone()),
            _ => Err(LedgerError::ExecutorUnavailable(*id)),
        }
    }
}

/// Decide whether `route` may carry an instruction with `policy` against a
/// record currently owned by `owner`.
pub fn authorize_route(
    address: GameAddress,
    policy: RoutePolicy,
    route: Route,
    owner: Authority,
    delegation: Option<&DelegationRecord>,
) -> Result<(), LedgerError> {
    let holder = match (owner, delegation) {
        (Authority::Delegated, Some(record)) => record.route(),
        _ => Route::Base,
    };

    match (policy, route, holder) {
        (RoutePolicy::BaseOnly, Route::Base, Route::Base) => Ok(()),
        (RoutePolicy::BaseOnly, Route::Base, Route::Auxiliary { .. }) => Err(LedgerError::AccountDelegated(address)),
        (RoutePolicy::BaseOnly, Route::Auxiliary { .. }, _) => Err(LedgerError::WrongExecutor { expected: Route::Base }),

        (RoutePolicy::Owner, Route::Base, Route::Auxiliary { .. }) => Err(LedgerError::AccountDelegated(address)),
        (RoutePolicy::Owner, _, _) if route == holder => Ok(()),
        (RoutePolicy::Owner, _, _) => Err(LedgerError::WrongExecutor { expected: holder }),

        (RoutePolicy::AuxiliaryOnly, _, Route::Base) => Err(LedgerError::NotDelegated(address)),
        (RoutePolicy::AuxiliaryOnly, _, _) if route == holder => Ok(()),
        (RoutePolicy::AuxiliaryOnly, _, _) => Err(LedgerError::WrongExecutor { expected: holder }),
    }
}
