// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistence context for transactions and their settlement ledgers.
//!
//! [`TransactionStore`] is the seam the settlement service is injected with.
//! A unit of work is scoped: the store acquires the per-transaction lock,
//! hands the closure a [`UnitOfWork`], and releases the lock on every exit
//! path. Writes made through the unit are staged and only become visible if
//! the closure returns `Ok`.
//!
//! [`MemoryStore`] is the in-process implementation:
//!
//! ```text
//!  DashMap<TransactionId, Arc<Mutex<StoreEntry>>>
//!        │
//!        └─ StoreEntry { transaction, ledger }
//!               ▲
//!               └── locked for the whole unit of work, so two settlements
//!                   against the same transaction are serialized while
//!                   different transactions proceed in parallel
//! ```

use crate::base::{CashierId, SettlementId, TransactionId};
use crate::ledger::{self, Ledger};
use crate::settlement::{NewSettlement, Settlement};
use crate::transaction::{Transaction, TransactionSummary};
use crate::SettlementError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Operations available inside one atomic unit of work.
pub trait UnitOfWork {
    /// The transaction, including any status update staged in this unit.
    fn transaction(&self) -> &Transaction;

    /// Committed and staged settlements, in insertion order.
    fn settlements(&self) -> Vec<Settlement>;

    /// Stages a new ledger row and returns it with its assigned ID.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::InvalidArgument`] for a non-positive amount or a
    ///   row that belongs to another transaction.
    /// - [`SettlementError::OverpaymentRejected`] if the row would push the
    ///   paid total past the transaction total.
    fn insert_settlement(&mut self, settlement: NewSettlement) -> Result<Settlement, SettlementError>;

    /// Recomputes the payment status from the ledger and stages it.
    fn update_payment_status(&mut self, at: DateTime<Utc>) -> Result<Transaction, SettlementError>;
}

/// Storage for transactions, their ledgers, and the cashier directory.
pub trait TransactionStore: Send + Sync {
    /// Runs `work` atomically against one transaction.
    ///
    /// Staged writes are committed only when `work` returns `Ok`; any error
    /// discards them.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::NotFound`] if the transaction does not exist.
    /// - [`SettlementError::PersistenceFailure`] if the unit could not start
    ///   or commit.
    /// - Whatever `work` returns.
    fn with_unit_of_work<T, F>(&self, transaction_id: TransactionId, work: F) -> Result<T, SettlementError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, SettlementError>;

    fn find_by_id(&self, transaction_id: TransactionId) -> Result<Transaction, SettlementError>;

    /// Settlement history, most recent first. Unknown transactions yield an
    /// empty list.
    fn settlements(&self, transaction_id: TransactionId) -> Result<Vec<Settlement>, SettlementError>;

    fn cashier_name(&self, cashier_id: CashierId) -> Option<String>;
}

#[derive(Debug)]
struct StoreEntry {
    transaction: Transaction,
    ledger: Ledger,
}

impl StoreEntry {
    fn commit(&mut self, staged: Staged) {
        for settlement in staged.settlements {
            self.ledger.append(settlement);
        }
        if let Some(transaction) = staged.transaction {
            self.transaction = transaction;
        }
        debug_assert_eq!(
            self.transaction.payment_status(),
            crate::PaymentStatus::derive(self.transaction.total_amount(), self.ledger.paid_total()),
            "Invariant violated: payment status drifted from ledger"
        );
    }
}

#[derive(Debug, Default)]
struct Staged {
    settlements: Vec<Settlement>,
    transaction: Option<Transaction>,
}

struct MemoryUnit<'a> {
    committed: &'a StoreEntry,
    next_settlement_id: &'a AtomicU64,
    staged: Staged,
}

impl<'a> MemoryUnit<'a> {
    fn new(committed: &'a StoreEntry, next_settlement_id: &'a AtomicU64) -> Self {
        Self {
            committed,
            next_settlement_id,
            staged: Staged::default(),
        }
    }

    fn paid_total(&self) -> Decimal {
        self.committed.ledger.paid_total() + ledger::paid_total(&self.staged.settlements)
    }

    fn into_staged(self) -> Staged {
        self.staged
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn transaction(&self) -> &Transaction {
        self.staged
            .transaction
            .as_ref()
            .unwrap_or(&self.committed.transaction)
    }

    fn settlements(&self) -> Vec<Settlement> {
        self.committed
            .ledger
            .entries()
            .iter()
            .chain(self.staged.settlements.iter())
            .cloned()
            .collect()
    }

    fn insert_settlement(&mut self, settlement: NewSettlement) -> Result<Settlement, SettlementError> {
        let transaction_id = self.transaction().id();
        if settlement.transaction_id != transaction_id {
            return Err(SettlementError::InvalidArgument(format!(
                "settlement for transaction {} cannot be recorded against transaction {}",
                settlement.transaction_id, transaction_id
            )));
        }
        if settlement.amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidArgument(
                "settlement amount must be greater than 0".to_string(),
            ));
        }

        // Storage-level cap, equivalent to a CHECK constraint on the ledger.
        let remaining = self.transaction().total_amount() - self.paid_total();
        if settlement.amount > remaining {
            return Err(SettlementError::OverpaymentRejected {
                amount: settlement.amount,
                remaining,
            });
        }

        let id = SettlementId(self.next_settlement_id.fetch_add(1, Ordering::SeqCst));
        let settlement = settlement.into_settlement(id);
        self.staged.settlements.push(settlement.clone());
        Ok(settlement)
    }

    fn update_payment_status(&mut self, at: DateTime<Utc>) -> Result<Transaction, SettlementError> {
        let updated = self.transaction().with_paid_total(self.paid_total(), at);
        self.staged.transaction = Some(updated.clone());
        Ok(updated)
    }
}

/// Concurrent in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<TransactionId, Arc<Mutex<StoreEntry>>>,
    cashiers: DashMap<CashierId, String>,
    next_settlement_id: AtomicU64,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose units of work give up after waiting
    /// `lock_timeout` for a busy transaction.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cashiers: DashMap::new(),
            next_settlement_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Adds a transaction created by the upstream sales flow.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::DuplicateTransaction`] if the ID is taken.
    pub fn insert_transaction(&self, transaction: Transaction) -> Result<(), SettlementError> {
        let transaction_id = transaction.id();
        match self.entries.entry(transaction_id) {
            Entry::Occupied(_) => Err(SettlementError::DuplicateTransaction(transaction_id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(StoreEntry {
                    transaction,
                    ledger: Ledger::new(),
                })));
                debug!(%transaction_id, "transaction stored");
                Ok(())
            }
        }
    }

    pub fn register_cashier(&self, cashier_id: CashierId, name: impl Into<String>) {
        self.cashiers.insert(cashier_id, name.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every transaction with its folded totals, ordered by transaction ID.
    pub fn summaries(&self) -> Result<Vec<TransactionSummary>, SettlementError> {
        let mut handles: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by_key(|(transaction_id, _)| *transaction_id);

        handles
            .into_iter()
            .map(|(transaction_id, handle)| {
                let data = self.lock(transaction_id, &handle)?;
                Ok(TransactionSummary::new(&data.transaction, data.ledger.paid_total()))
            })
            .collect()
    }

    // Clones the entry handle so the DashMap shard lock is not held while
    // waiting on the per-transaction mutex.
    fn handle(&self, transaction_id: TransactionId) -> Option<Arc<Mutex<StoreEntry>>> {
        self.entries
            .get(&transaction_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn lock<'a>(
        &self,
        transaction_id: TransactionId,
        handle: &'a Mutex<StoreEntry>,
    ) -> Result<parking_lot::MutexGuard<'a, StoreEntry>, SettlementError> {
        handle.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!(
                %transaction_id,
                timeout = ?self.lock_timeout,
                "timed out waiting for transaction lock"
            );
            SettlementError::PersistenceFailure(format!(
                "timed out waiting for lock on transaction {transaction_id}"
            ))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionStore for MemoryStore {
    fn with_unit_of_work<T, F>(&self, transaction_id: TransactionId, work: F) -> Result<T, SettlementError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, SettlementError>,
    {
        let handle = self
            .handle(transaction_id)
            .ok_or(SettlementError::NotFound(transaction_id))?;
        let mut data = self.lock(transaction_id, &handle)?;

        let mut unit = MemoryUnit::new(&data, &self.next_settlement_id);
        let unit_ref: &mut dyn UnitOfWork = &mut unit;
        let value = match work(unit_ref) {
            Ok(value) => value,
            Err(error) => {
                debug!(%transaction_id, %error, "unit of work rolled back");
                return Err(error);
            }
        };

        let staged = unit.into_staged();
        data.commit(staged);
        Ok(value)
    }

    fn find_by_id(&self, transaction_id: TransactionId) -> Result<Transaction, SettlementError> {
        let handle = self
            .handle(transaction_id)
            .ok_or(SettlementError::NotFound(transaction_id))?;
        let data = self.lock(transaction_id, &handle)?;
        Ok(data.transaction.clone())
    }

    fn settlements(&self, transaction_id: TransactionId) -> Result<Vec<Settlement>, SettlementError> {
        let Some(handle) = self.handle(transaction_id) else {
            return Ok(Vec::new());
        };
        let data = self.lock(transaction_id, &handle)?;
        Ok(data.ledger.history())
    }

    fn cashier_name(&self, cashier_id: CashierId) -> Option<String> {
        self.cashiers.get(&cashier_id).map(|name| name.value().clone())
    }
}
