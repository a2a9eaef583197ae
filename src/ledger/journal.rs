//! Per-game Journal
//!
//! Append-only log of every accepted transaction against a record, with the
//! record hash after each one. Replaying a journal through the pure state
//! machine re-derives the record and must reproduce every recorded hash.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::identity::{GameAddress, Pubkey};
use crate::game::error::GameError;
use crate::game::events::GameEvent;
use crate::game::instruction::{self, ExecContext, Instruction};
use crate::game::state::Game;
use crate::ledger::delegation::Route;

/// Current journal format version.
pub const JOURNAL_VERSION: u8 = 1;

/// One accepted transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, from 0.
    pub seq: u64,
    /// Ledger slot the transaction executed in.
    pub slot: u64,
    /// Wall-clock time of acceptance.
    pub timestamp: DateTime<Utc>,
    /// Domain that executed it.
    pub route: Route,
    /// Signer.
    pub signer: Pubkey,
    /// The instruction as submitted.
    pub instruction: Instruction,
    /// Transaction signature.
    #[serde(with = "crate::core::hash::hex32")]
    pub signature: StateHash,
    /// Record hash after execution.
    #[serde(with = "crate::core::hash::hex32")]
    pub state_hash: StateHash,
    /// Events emitted.
    pub events: Vec<GameEvent>,
}

/// Journal of one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Journal {
    /// Format version.
    pub version: u8,
    /// Game address.
    pub game: GameAddress,
    /// Turn timeout the ledger ran with.
    pub turn_timeout_slots: u64,
    /// Reveal timeout the ledger ran with.
    pub reveal_timeout_slots: u64,
    /// Entries in execution order.
    pub entries: Vec<JournalEntry>,
}

impl Journal {
    /// Empty journal.
    pub fn new(game: GameAddress, turn_timeout_slots: u64, reveal_timeout_slots: u64) -> Self {
        Self {
            version: JOURNAL_VERSION,
            game,
            turn_timeout_slots,
            reveal_timeout_slots,
            entries: Vec::new(),
        }
    }

    /// Next sequence number.
    pub fn next_seq(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Append an entry.
    pub fn append(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Hash after the latest entry.
    pub fn last_hash(&self) -> Option<StateHash> {
        self.entries.last().map(|e| e.state_hash)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Signature of a transaction: binds signer, slot, position and target.
pub fn transaction_signature(signer: &Pubkey, slot: u64, seq: u64, instruction: &Instruction) -> StateHash {
    let mut hasher = StateHasher::for_transaction();
    hasher.update_bytes(signer.as_bytes());
    hasher.update_u64(slot);
    hasher.update_u64(seq);
    hasher.update_bytes(instruction.name().as_bytes());
    hasher.update_bytes(instruction.address(signer).as_bytes());
    hasher.finalize()
}

/// Replay failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Unknown format version.
    #[error("journal version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Supported version.
        expected: u8,
        /// Found version.
        got: u8,
    },

    /// No entries.
    #[error("journal is empty")]
    Empty,

    /// First entry does not create the game at the journal's address.
    #[error("journal does not start with the game's creation")]
    BadGenesis,

    /// An entry was rejected on replay.
    #[error("entry {seq} rejected on replay: {source}")]
    Rejected {
        /// Entry position.
        seq: u64,
        /// Rejection reason.
        source: GameError,
    },

    /// An entry produced a different record.
    #[error("state hash mismatch at entry {seq}")]
    HashMismatch {
        /// Entry position.
        seq: u64,
        /// Recorded hash.
        expected: StateHash,
        /// Replayed hash.
        computed: StateHash,
    },
}

/// Successful replay.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Entries replayed.
    pub entries: usize,
    /// Record after the last entry.
    pub game: Game,
    /// Its hash.
    pub final_hash: StateHash,
}

/// Re-run a journal against the state machine.
pub fn replay(journal: &Journal) -> Result<ReplayReport, ReplayError> {
    if journal.version != JOURNAL_VERSION {
        return Err(ReplayError::VersionMismatch {
            expected: JOURNAL_VERSION,
            got: journal.version,
        });
    }
    let (first, rest) = journal.entries.split_first().ok_or(ReplayError::Empty)?;

    let ctx_for = |entry: &JournalEntry| ExecContext {
        signer: entry.signer,
        slot: entry.slot,
        turn_timeout_slots: journal.turn_timeout_slots,
        reveal_timeout_slots: journal.reveal_timeout_slots,
    };

    let (address, mut game, _) = instruction::genesis(&first.instruction, &ctx_for(first))
        .map_err(|_| ReplayError::BadGenesis)?;
    if address != journal.game {
        return Err(ReplayError::BadGenesis);
    }
    check_hash(first, &game)?;

    for entry in rest {
        instruction::execute(&mut game, &entry.instruction, &ctx_for(entry))
            .map_err(|source| ReplayError::Rejected { seq: entry.seq, source })?;
        check_hash(entry, &game)?;
    }

    let final_hash = game.compute_hash();
    Ok(ReplayReport {
        entries: journal.entries.len(),
        game,
        final_hash,
    })
}

fn check_hash(entry: &JournalEntry, game: &Game) -> Result<(), ReplayError> {
    let computed = game.compute_hash();
    if computed != entry.state_hash {
        return Err(ReplayError::HashMismatch {
            seq: entry.seq,
            expected: entry.state_hash,
            computed,
        });
    }
    Ok(())
}
