//! Player balances.
//!
//! Wager deposits leave the bank into a game's escrow, and the payout comes
//! back from escrow. Every movement is checked; nothing saturates.

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::core::identity::Pubkey;
use crate::ledger::error::LedgerError;

/// Balance table keyed by identity.
#[derive(Debug, Default)]
pub struct Bank {
    balances: RwLock<BTreeMap<Pubkey, u64>>,
}

impl Bank {
    /// Empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance (zero for unknown keys).
    pub async fn balance(&self, key: &Pubkey) -> u64 {
        self.balances.read().await.get(key).copied().unwrap_or(0)
    }

    /// Add funds. Returns the new balance.
    pub async fn credit(&self, key: &Pubkey, amount: u64) -> Result<u64, LedgerError> {
        let mut balances = self.balances.write().await;
        let entry = balances.entry(*key).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(*entry)
    }

    /// Remove funds. Returns the new balance.
    pub async fn debit(&self, key: &Pubkey, amount: u64) -> Result<u64, LedgerError> {
        let mut balances = self.balances.write().await;
        let available = balances.get(key).copied().unwrap_or(0);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds { needed: amount, available })?;
        balances.insert(*key, remaining);
        Ok(remaining)
    }

    /// Sum of all balances.
    pub async fn total(&self) -> u128 {
        self.balances.read().await.values().map(|v| u128::from(*v)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_and_debit() {
        let bank = Bank::new();
        let alice = Pubkey::from_label("alice");

        assert_eq!(bank.balance(&alice).await, 0);
        assert_eq!(bank.credit(&alice, 100).await, Ok(100));
        assert_eq!(bank.debit(&alice, 30).await, Ok(70));
        assert_eq!(
            bank.debit(&alice, 71).await,
            Err(LedgerError::InsufficientFunds { needed: 71, available: 70 })
        );
        assert_eq!(bank.balance(&alice).await, 70);
    }

    #[tokio::test]
    async fn test_credit_overflow() {
        let bank = Bank::new();
        let alice = Pubkey::from_label("alice");
        bank.credit(&alice, u64::MAX).await.unwrap();
        assert_eq!(bank.credit(&alice, 1).await, Err(LedgerError::Overflow));
        assert_eq!(bank.total().await, u128::from(u64::MAX));
    }
}
