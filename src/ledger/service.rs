//! Ledger Service
//!
//! Keyed transactional store hosting game records, their escrow, delegation
//! records and journals, plus the player bank and the slot clock.
//!
//! Each transaction locks only its own record. The instruction runs against a
//! copy; balances move under the same lock once validation passed; the copy is
//! committed last. A rejected transaction leaves no trace.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Serialize, Deserialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::core::hash::StateHash;
use crate::core::identity::{GameAddress, Pubkey};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::instruction::{self, ExecContext, Instruction, RoutePolicy};
use crate::game::state::{Authority, Game, Side};
use crate::ledger::bank::Bank;
use crate::ledger::delegation::{
    authorize_route, DelegationRecord, ExecutorDirectory, Route, DEFAULT_COMMIT_FREQUENCY_MS,
};
use crate::ledger::error::LedgerError;
use crate::ledger::journal::{transaction_signature, Journal, JournalEntry};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Inactivity window before `claim_timeout` is accepted.
    pub turn_timeout_slots: u64,
    /// Window before finalize accepts a single reveal.
    pub reveal_timeout_slots: u64,
    /// Duration of one slot.
    pub slot_duration: Duration,
    /// Interval between checkpoints of delegated records.
    pub commit_frequency_ms: u64,
    /// Executor used when `delegate` names none.
    pub default_validator: Pubkey,
    /// Additional executors.
    pub extra_validators: Vec<Pubkey>,
    /// Largest single airdrop.
    pub faucet_limit: u64,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            turn_timeout_slots: 150,    // 60 seconds @ 400ms
            reveal_timeout_slots: 750,  // 5 minutes @ 400ms
            slot_duration: Duration::from_millis(400),
            commit_frequency_ms: DEFAULT_COMMIT_FREQUENCY_MS,
            default_validator: Pubkey::from_label("fleet-wars-validator"),
            extra_validators: Vec::new(),
            faucet_limit: 10_000_000,
            event_capacity: 1024,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_key(key: &str) -> Option<Pubkey> {
    let raw = std::env::var(key).ok()?;
    Pubkey::from_hex(&raw).or_else(|| Some(Pubkey::from_label(&raw)))
}

impl LedgerConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Validator keys are hex, or labels hashed into a key.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            turn_timeout_slots: env_or("FLEET_WARS_TURN_TIMEOUT_SLOTS", defaults.turn_timeout_slots),
            reveal_timeout_slots: env_or("FLEET_WARS_REVEAL_TIMEOUT_SLOTS", defaults.reveal_timeout_slots),
            slot_duration: Duration::from_millis(env_or("FLEET_WARS_SLOT_MS", 400)),
            commit_frequency_ms: env_or("FLEET_WARS_COMMIT_FREQUENCY_MS", defaults.commit_frequency_ms),
            default_validator: env_key("FLEET_WARS_VALIDATOR").unwrap_or(defaults.default_validator),
            extra_validators: std::env::var("FLEET_WARS_EXTRA_VALIDATORS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| Pubkey::from_hex(s).unwrap_or_else(|| Pubkey::from_label(s)))
                        .collect()
                })
                .unwrap_or_default(),
            faucet_limit: env_or("FLEET_WARS_FAUCET_LIMIT", defaults.faucet_limit),
            event_capacity: defaults.event_capacity,
        }
    }
}

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Funds released by finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Recipient.
    pub payee: Pubkey,
    /// Amount.
    pub amount: u64,
}

/// Result of an accepted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Slot it executed in.
    pub slot: u64,
    /// Target record.
    pub game: GameAddress,
    /// Instruction name.
    pub instruction: String,
    /// Transaction signature.
    #[serde(with = "crate::core::hash::hex32")]
    pub signature: StateHash,
    /// Record hash after execution.
    #[serde(with = "crate::core::hash::hex32")]
    pub state_hash: StateHash,
    /// Emitted events.
    pub events: Vec<GameEvent>,
    /// Payout, for finalize.
    pub payout: Option<Payout>,
}

/// Read-only view of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Record address.
    pub address: GameAddress,
    /// The record.
    pub game: Game,
    /// Funds held in escrow.
    pub escrow: u64,
    /// Delegation bookkeeping, while delegated.
    pub delegation: Option<DelegationRecord>,
    /// Record hash.
    #[serde(with = "crate::core::hash::hex32")]
    pub state_hash: StateHash,
    /// Slot of the read.
    pub slot: u64,
}

/// Pushed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Event from an accepted transaction.
    Game(GameEvent),
    /// A delegated record was checkpointed by its executor.
    Checkpoint {
        /// Checkpointed record.
        game: GameAddress,
        /// Executor holding it.
        validator: Pubkey,
        /// Checkpoints taken so far.
        commits: u64,
        /// Record hash committed.
        #[serde(with = "crate::core::hash::hex32")]
        state_hash: StateHash,
        /// Slot of the checkpoint.
        slot: u64,
    },
}

impl LedgerEvent {
    /// Record the event is about.
    pub fn game(&self) -> GameAddress {
        match self {
            LedgerEvent::Game(event) => event.game,
            LedgerEvent::Checkpoint { game, .. } => *game,
        }
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Everything stored under one game address.
#[derive(Debug)]
struct AccountEntry {
    game: Game,
    escrow: u64,
    delegation: Option<DelegationRecord>,
    journal: Journal,
}

/// The ledger.
pub struct Ledger {
    config: LedgerConfig,
    accounts: RwLock<BTreeMap<GameAddress, Arc<Mutex<AccountEntry>>>>,
    bank: Bank,
    executors: ExecutorDirectory,
    slot: AtomicU64,
    events: broadcast::Sender<LedgerEvent>,
}

impl Ledger {
    /// Create a ledger at slot 0.
    pub fn new(config: LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let mut validators = vec![config.default_validator];
        validators.extend(config.extra_validators.iter().copied());

        Self {
            executors: ExecutorDirectory::new(validators),
            config,
            accounts: RwLock::new(BTreeMap::new()),
            bank: Bank::new(),
            slot: AtomicU64::new(0),
            events,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Auxiliary executors.
    pub fn executors(&self) -> &ExecutorDirectory {
        &self.executors
    }

    /// Current slot.
    pub fn slot(&self) -> u64 {
        self.slot.load(Ordering::Acquire)
    }

    /// Advance the clock by one slot. Returns the new slot.
    pub fn tick(&self) -> u64 {
        self.advance_slots(1)
    }

    /// Advance the clock by `n` slots. Returns the new slot.
    pub fn advance_slots(&self, n: u64) -> u64 {
        self.slot.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Subscribe to ledger events.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Balance of `key`.
    pub async fn balance(&self, key: &Pubkey) -> u64 {
        self.bank.balance(key).await
    }

    /// Fund `key` from the faucet. Returns the new balance.
    pub async fn airdrop(&self, key: &Pubkey, amount: u64) -> Result<u64, LedgerError> {
        if amount > self.config.faucet_limit {
            return Err(LedgerError::FaucetLimit {
                requested: amount,
                limit: self.config.faucet_limit,
            });
        }
        let balance = self.bank.credit(key, amount).await?;
        debug!("Airdropped {} to {}", amount, key.short());
        Ok(balance)
    }

    /// Pure state read.
    pub async fn get_game(&self, address: &GameAddress) -> Option<GameSnapshot> {
        let entry = self.entry(address).await?;
        let entry = entry.lock().await;
        Some(GameSnapshot {
            address: *address,
            game: entry.game.clone(),
            escrow: entry.escrow,
            delegation: entry.delegation.clone(),
            state_hash: entry.game.compute_hash(),
            slot: self.slot(),
        })
    }

    /// Journal of a record.
    pub async fn journal(&self, address: &GameAddress) -> Option<Journal> {
        let entry = self.entry(address).await?;
        let journal = entry.lock().await.journal.clone();
        Some(journal)
    }

    /// Delegation record, while delegated.
    pub async fn delegation(&self, address: &GameAddress) -> Option<DelegationRecord> {
        let entry = self.entry(address).await?;
        let record = entry.lock().await.delegation.clone();
        record
    }

    /// Funds held by all escrows.
    pub async fn total_escrow(&self) -> u128 {
        let entries: Vec<_> = self.accounts.read().await.values().cloned().collect();
        let mut total = 0u128;
        for entry in entries {
            total += u128::from(entry.lock().await.escrow);
        }
        total
    }

    /// Number of records.
    pub async fn game_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    async fn entry(&self, address: &GameAddress) -> Option<Arc<Mutex<AccountEntry>>> {
        self.accounts.read().await.get(address).cloned()
    }

    fn context(&self, signer: Pubkey) -> ExecContext {
        ExecContext {
            signer,
            slot: self.slot(),
            turn_timeout_slots: self.config.turn_timeout_slots,
            reveal_timeout_slots: self.config.reveal_timeout_slots,
        }
    }

    fn publish(&self, events: &[GameEvent]) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(LedgerEvent::Game(event.clone()));
        }
    }

    /// Submit a signed transaction through `route`.
    #[instrument(skip(self, signer, instruction), fields(ix = instruction.name(), signer = %signer.short()))]
    pub async fn submit(
        &self,
        route: Route,
        signer: Pubkey,
        instruction: Instruction,
    ) -> Result<TransactionReceipt, LedgerError> {
        if let Route::Auxiliary { validator } = route {
            self.executors.available(&validator)?;
        }

        let result = match instruction {
            Instruction::CreateGame { .. } => self.create(route, signer, instruction).await,
            _ => self.apply(route, signer, instruction).await,
        };

        match &result {
            Ok(receipt) => debug!("Accepted at slot {}", receipt.slot),
            Err(e) => debug!("Rejected: {}", e),
        }
        result
    }

    async fn create(
        &self,
        route: Route,
        signer: Pubkey,
        instruction: Instruction,
    ) -> Result<TransactionReceipt, LedgerError> {
        let ctx = self.context(signer);
        let address = instruction.address(&signer);
        authorize_route(address, RoutePolicy::BaseOnly, route, Authority::Base, None)?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&address) {
            return Err(LedgerError::DuplicateGame(address));
        }

        let (address, game, step) = instruction::genesis(&instruction, &ctx)?;
        if step.deposit > 0 {
            self.bank.debit(&signer, step.deposit).await?;
        }

        let state_hash = game.compute_hash();
        let mut journal = Journal::new(address, ctx.turn_timeout_slots, ctx.reveal_timeout_slots);
        let signature = transaction_signature(&signer, ctx.slot, 0, &instruction);
        journal.append(JournalEntry {
            seq: 0,
            slot: ctx.slot,
            timestamp: Utc::now(),
            route,
            signer,
            instruction: instruction.clone(),
            signature,
            state_hash,
            events: step.events.clone(),
        });

        accounts.insert(
            address,
            Arc::new(Mutex::new(AccountEntry {
                game,
                escrow: step.deposit,
                delegation: None,
                journal,
            })),
        );
        drop(accounts);

        info!("Game {} created by {} (wager {})", address.short(), signer.short(), step.deposit);
        self.publish(&step.events);

        Ok(TransactionReceipt {
            slot: ctx.slot,
            game: address,
            instruction: instruction.name().to_string(),
            signature,
            state_hash,
            events: step.events,
            payout: None,
        })
    }

    async fn apply(
        &self,
        route: Route,
        signer: Pubkey,
        instruction: Instruction,
    ) -> Result<TransactionReceipt, LedgerError> {
        let address = instruction.address(&signer);
        let entry = self.entry(&address).await.ok_or(LedgerError::GameNotFound(address))?;
        let mut entry = entry.lock().await;
        let ctx = self.context(signer);

        authorize_route(
            address,
            instruction.route_policy(),
            route,
            entry.game.owner,
            entry.delegation.as_ref(),
        )?;

        // Executor picked by delegate must be reachable before anything moves.
        let target = match &instruction {
            Instruction::Delegate { validator, .. } => {
                let id = validator.unwrap_or(self.config.default_validator);
                Some(self.executors.available(&id)?)
            }
            _ => None,
        };

        let mut next = entry.game.clone();
        let mut step = instruction::execute(&mut next, &instruction, &ctx)?;

        // Escrow movements. Only one of deposit/payout happens per step.
        let mut escrow = entry.escrow;
        if step.deposit > 0 {
            escrow = escrow.checked_add(step.deposit).ok_or(LedgerError::Overflow)?;
            self.bank.debit(&signer, step.deposit).await?;
        }
        let mut payout = None;
        if let Some(settlement) = &step.settlement {
            escrow = escrow.checked_sub(settlement.amount).ok_or(LedgerError::Overflow)?;
            if settlement.amount > 0 {
                self.bank.credit(&settlement.payee, settlement.amount).await?;
            }
            payout = Some(Payout { payee: settlement.payee, amount: settlement.amount });
        }

        let state_hash = next.compute_hash();

        if step.delegated {
            if let Some(executor) = &target {
                entry.delegation = Some(DelegationRecord::new(
                    executor.id,
                    signer,
                    ctx.slot,
                    self.config.commit_frequency_ms,
                    state_hash,
                ));
                executor.session_opened();
                step.events.push(GameEvent::new(
                    address,
                    ctx.slot,
                    Some(Side::Player1),
                    GameEventData::AuthorityDelegated { validator: executor.id },
                ));
                info!("Game {} delegated to {}", address.short(), executor.id.short());
            }
        }

        if step.reclaimed {
            if let Some(mut record) = entry.delegation.take() {
                record.checkpoint(state_hash, ctx.slot);
                if let Some(executor) = self.executors.get(&record.validator) {
                    executor.session_closed();
                }
                info!(
                    "Game {} committed back from {} after {} checkpoints",
                    address.short(),
                    record.validator.short(),
                    record.commits
                );
            }
        }

        let seq = entry.journal.next_seq();
        let signature = transaction_signature(&signer, ctx.slot, seq, &instruction);
        entry.journal.append(JournalEntry {
            seq,
            slot: ctx.slot,
            timestamp: Utc::now(),
            route,
            signer,
            instruction: instruction.clone(),
            signature,
            state_hash,
            events: step.events.clone(),
        });
        entry.game = next;
        entry.escrow = escrow;
        drop(entry);

        if let Some(payout) = &payout {
            info!("Game {} finalized, {} paid to {}", address.short(), payout.amount, payout.payee.short());
        }
        self.publish(&step.events);

        Ok(TransactionReceipt {
            slot: ctx.slot,
            game: address,
            instruction: instruction.name().to_string(),
            signature,
            state_hash,
            events: step.events,
            payout,
        })
    }

    /// Checkpoint every delegated record. Returns how many changed.
    pub async fn checkpoint_delegated(&self) -> usize {
        let entries: Vec<_> = self.accounts.read().await.iter().map(|(a, e)| (*a, e.clone())).collect();
        let slot = self.slot();
        let mut changed = 0;

        for (address, entry) in entries {
            let mut entry = entry.lock().await;
            let hash = entry.game.compute_hash();
            let Some(record) = entry.delegation.as_mut() else {
                continue;
            };
            if record.checkpoint(hash, slot) {
                changed += 1;
                let _ = self.events.send(LedgerEvent::Checkpoint {
                    game: address,
                    validator: record.validator,
                    commits: record.commits,
                    state_hash: hash,
                    slot,
                });
            }
        }

        if changed > 0 {
            debug!("Checkpointed {} delegated games", changed);
        }
        changed
    }

    /// Delegated records whose executor is offline. They resume once it
    /// comes back; nothing else may write them meanwhile.
    pub async fn report_stranded(&self) -> usize {
        let entries: Vec<_> = self.accounts.read().await.iter().map(|(a, e)| (*a, e.clone())).collect();
        let mut stranded = 0;
        for (address, entry) in entries {
            let entry = entry.lock().await;
            if let Some(record) = &entry.delegation {
                if self.executors.available(&record.validator).is_err() {
                    warn!(
                        "Game {} waiting on offline executor {}",
                        address.short(),
                        record.validator.short()
                    );
                    stranded += 1;
                }
            }
        }
        stranded
    }

    /// Drive the slot clock and delegated checkpoints until shutdown.
    pub async fn run_clock(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut slots = tokio::time::interval(self.config.slot_duration);
        let mut commits = tokio::time::interval(Duration::from_millis(self.config.commit_frequency_ms.max(1)));
        info!(
            "Ledger clock running ({:?} per slot, checkpoints every {}ms)",
            self.config.slot_duration, self.config.commit_frequency_ms
        );

        loop {
            tokio::select! {
                _ = slots.tick() => {
                    self.tick();
                }
                _ = commits.tick() => {
                    self.checkpoint_delegated().await;
                    self.report_stranded().await;
                }
                _ = shutdown.recv() => {
                    info!("Ledger clock stopped at slot {}", self.slot());
                    break;
                }
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("slot", &self.slot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
