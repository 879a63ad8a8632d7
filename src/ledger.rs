//! Wallet balances
//!
//! The round engine only sees the [`Ledger`] capability. Two implementations
//! ship with the crate: [`RocksLedger`] persists balances and a journal of
//! every movement, [`InMemoryLedger`] keeps everything in process.

use crate::errors::{LedgerError, StoreError};
use crate::storage::OptimizedStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

const BALANCE_PREFIX: &str = "ledger:balance:";
const JOURNAL_PREFIX: &str = "ledger:journal:";

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Add `amount`, returning the new balance
    async fn credit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError>;

    /// Remove `amount`, returning the new balance. Never goes negative.
    async fn debit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError>;

    async fn balance(&self, wallet: &str, currency: &str) -> Result<Decimal, LedgerError>;

    async fn balances(&self, wallet: &str) -> Result<BTreeMap<String, Decimal>, LedgerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// One balance movement, kept for out-of-band reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    pub wallet: String,
    pub currency: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub round_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl JournalEntry {
    fn new(
        kind: EntryKind,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        balance_after: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            wallet: wallet.to_string(),
            currency: currency.to_string(),
            amount,
            balance_after,
            reason: reason.to_string(),
            round_id,
            recorded_at: Utc::now(),
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount.is_sign_negative() {
        return Err(LedgerError::Backend(format!("negative amount {}", amount)));
    }
    Ok(())
}

/// Process-local ledger
#[derive(Default)]
pub struct InMemoryLedger {
    balances: DashMap<(String, String), Decimal>,
    journal: Mutex<Vec<JournalEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a balance directly, without a journal entry
    pub fn deposit(&self, wallet: &str, currency: &str, amount: Decimal) {
        *self
            .balances
            .entry((wallet.to_string(), currency.to_string()))
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Make every following operation fail with a backend error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.clone()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn credit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError> {
        self.check_available()?;
        ensure_positive(amount)?;

        let new_balance = {
            let mut entry = self
                .balances
                .entry((wallet.to_string(), currency.to_string()))
                .or_insert(Decimal::ZERO);
            *entry += amount;
            *entry
        };

        self.journal.lock().await.push(JournalEntry::new(
            EntryKind::Credit,
            wallet,
            currency,
            amount,
            new_balance,
            reason,
            round_id,
        ));
        Ok(new_balance)
    }

    async fn debit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError> {
        self.check_available()?;
        ensure_positive(amount)?;

        let new_balance = {
            let key = (wallet.to_string(), currency.to_string());
            let mut entry = self
                .balances
                .get_mut(&key)
                .ok_or_else(|| LedgerError::UnknownWallet {
                    wallet: wallet.to_string(),
                    currency: currency.to_string(),
                })?;
            if *entry < amount {
                return Err(LedgerError::InsufficientFunds {
                    wallet: wallet.to_string(),
                    currency: currency.to_string(),
                    balance: *entry,
                    requested: amount,
                });
            }
            *entry -= amount;
            *entry
        };

        self.journal.lock().await.push(JournalEntry::new(
            EntryKind::Debit,
            wallet,
            currency,
            amount,
            new_balance,
            reason,
            round_id,
        ));
        Ok(new_balance)
    }

    async fn balance(&self, wallet: &str, currency: &str) -> Result<Decimal, LedgerError> {
        self.check_available()?;
        self.balances
            .get(&(wallet.to_string(), currency.to_string()))
            .map(|b| *b)
            .ok_or_else(|| LedgerError::UnknownWallet {
                wallet: wallet.to_string(),
                currency: currency.to_string(),
            })
    }

    async fn balances(&self, wallet: &str) -> Result<BTreeMap<String, Decimal>, LedgerError> {
        self.check_available()?;
        Ok(self
            .balances
            .iter()
            .filter(|entry| entry.key().0 == wallet)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect())
    }
}

/// Ledger persisted in RocksDB next to round history
pub struct RocksLedger {
    storage: OptimizedStorage,
    // Serializes read-modify-write cycles on balances
    write_lock: Mutex<()>,
}

impl RocksLedger {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    // Wallet ids are free-form, so the wallet is length-prefixed:
    // ledger:balance:{wallet_len}:{wallet}:{currency}
    fn wallet_prefix(wallet: &str) -> String {
        format!("{}{}:{}:", BALANCE_PREFIX, wallet.len(), wallet)
    }

    fn balance_key(wallet: &str, currency: &str) -> Vec<u8> {
        format!("{}{}", Self::wallet_prefix(wallet), currency).into_bytes()
    }

    fn journal_key(id: &Uuid) -> Vec<u8> {
        format!("{}{}", JOURNAL_PREFIX, id.simple()).into_bytes()
    }

    fn read_balance(&self, wallet: &str, currency: &str) -> Result<Option<Decimal>, LedgerError> {
        match self.storage.get(&Self::balance_key(wallet, currency))? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| StoreError::CorruptedData(e.to_string()))?;
                let value = text
                    .parse::<Decimal>()
                    .map_err(|e| StoreError::CorruptedData(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn write_entry(&self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let encoded =
            serde_json::to_vec(entry).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.storage.batch_write(&[
            (
                Self::balance_key(&entry.wallet, &entry.currency),
                entry.balance_after.to_string().into_bytes(),
            ),
            (Self::journal_key(&entry.id), encoded),
        ])?;
        Ok(())
    }

    /// Oldest-first journal entries
    pub fn journal_entries(&self, limit: usize) -> Result<Vec<JournalEntry>, LedgerError> {
        self.storage
            .scan_prefix(JOURNAL_PREFIX.as_bytes(), limit)?
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_slice(&value)
                    .map_err(|e| LedgerError::from(StoreError::CorruptedData(e.to_string())))
            })
            .collect()
    }
}

#[async_trait]
impl Ledger for RocksLedger {
    async fn credit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read_balance(wallet, currency)?.unwrap_or(Decimal::ZERO);
        let entry = JournalEntry::new(
            EntryKind::Credit,
            wallet,
            currency,
            amount,
            current + amount,
            reason,
            round_id,
        );
        self.write_entry(&entry)?;
        Ok(entry.balance_after)
    }

    async fn debit(
        &self,
        wallet: &str,
        currency: &str,
        amount: Decimal,
        reason: &str,
        round_id: Uuid,
    ) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;
        let _guard = self.write_lock.lock().await;

        let current =
            self.read_balance(wallet, currency)?
                .ok_or_else(|| LedgerError::UnknownWallet {
                    wallet: wallet.to_string(),
                    currency: currency.to_string(),
                })?;
        if current < amount {
            return Err(LedgerError::InsufficientFunds {
                wallet: wallet.to_string(),
                currency: currency.to_string(),
                balance: current,
                requested: amount,
            });
        }

        let entry = JournalEntry::new(
            EntryKind::Debit,
            wallet,
            currency,
            amount,
            current - amount,
            reason,
            round_id,
        );
        self.write_entry(&entry)?;
        Ok(entry.balance_after)
    }

    async fn balance(&self, wallet: &str, currency: &str) -> Result<Decimal, LedgerError> {
        self.read_balance(wallet, currency)?
            .ok_or_else(|| LedgerError::UnknownWallet {
                wallet: wallet.to_string(),
                currency: currency.to_string(),
            })
    }

    async fn balances(&self, wallet: &str) -> Result<BTreeMap<String, Decimal>, LedgerError> {
        let prefix = Self::wallet_prefix(wallet);
        let mut out = BTreeMap::new();
        for (key, value) in self.storage.scan_prefix(prefix.as_bytes(), usize::MAX)? {
            let currency = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
            let amount = String::from_utf8_lossy(&value)
                .parse::<Decimal>()
                .map_err(|e| StoreError::CorruptedData(e.to_string()))?;
            out.insert(currency, amount);
        }
        Ok(out)
    }
}

/// Credit each seed balance whose wallet/currency has no balance yet
pub async fn seed_balances(
    ledger: &dyn Ledger,
    seeds: &[crate::config::SeedBalance],
) -> Result<usize, LedgerError> {
    let mut seeded = 0;
    for seed in seeds {
        match ledger.balance(&seed.wallet, &seed.currency).await {
            Ok(_) => continue,
            Err(LedgerError::UnknownWallet { .. }) => {
                ledger
                    .credit(&seed.wallet, &seed.currency, seed.amount, "Seed balance", Uuid::nil())
                    .await?;
                seeded += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(seeded)
}
