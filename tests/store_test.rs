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

//! MemoryStore public API integration tests.

use chrono::Utc;
use escashop_settlement::{
    CashierId, CustomerId, MemoryStore, NewSettlement, PaymentMode, PaymentStatus,
    SettlementError, Transaction, TransactionId, TransactionStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// === Helper Functions ===

fn make_transaction(tx_id: u64, total: Decimal) -> Transaction {
    Transaction::new(TransactionId(tx_id), CustomerId(1), total).unwrap()
}

fn make_settlement(tx_id: u64, amount: Decimal) -> NewSettlement {
    NewSettlement {
        transaction_id: TransactionId(tx_id),
        amount,
        payment_mode: PaymentMode::Card,
        cashier_id: CashierId(1),
        paid_at: Utc::now(),
    }
}

fn store_with(transactions: &[(u64, Decimal)]) -> MemoryStore {
    let store = MemoryStore::new();
    for &(id, total) in transactions {
        store.insert_transaction(make_transaction(id, total)).unwrap();
    }
    store
}

// === Transactions ===

#[test]
fn new_store_is_empty() {
    let store = MemoryStore::new();
    assert!(store.is_empty());
    assert_eq!(store.lock_timeout(), MemoryStore::DEFAULT_LOCK_TIMEOUT);
    assert!(store.summaries().unwrap().is_empty());
}

#[test]
fn inserted_transaction_can_be_found() {
    let store = store_with(&[(1, dec!(100))]);

    let transaction = store.find_by_id(TransactionId(1)).unwrap();

    assert_eq!(transaction.id(), TransactionId(1));
    assert_eq!(transaction.total_amount(), dec!(100));
    assert_eq!(transaction.payment_status(), PaymentStatus::Unpaid);
}

#[test]
fn duplicate_transaction_is_rejected() {
    let store = store_with(&[(1, dec!(100))]);

    let result = store.insert_transaction(make_transaction(1, dec!(5)));

    assert_eq!(result, Err(SettlementError::DuplicateTransaction(TransactionId(1))));
    assert_eq!(store.find_by_id(TransactionId(1)).unwrap().total_amount(), dec!(100));
}

#[test]
fn missing_transaction_is_not_found() {
    let store = MemoryStore::new();
    assert_eq!(
        store.find_by_id(TransactionId(3)),
        Err(SettlementError::NotFound(TransactionId(3)))
    );
    let result = store.with_unit_of_work(TransactionId(3), |_| Ok(()));
    assert_eq!(result, Err(SettlementError::NotFound(TransactionId(3))));
}

// === Unit of Work ===

#[test]
fn committed_unit_updates_ledger_and_status() {
    let store = store_with(&[(1, dec!(100))]);

    store
        .with_unit_of_work(TransactionId(1), |unit| {
            unit.insert_settlement(make_settlement(1, dec!(100)))?;
            unit.update_payment_status(Utc::now())
        })
        .unwrap();

    assert_eq!(store.settlements(TransactionId(1)).unwrap().len(), 1);
    assert_eq!(
        store.find_by_id(TransactionId(1)).unwrap().payment_status(),
        PaymentStatus::Paid
    );
}

#[test]
fn failed_unit_is_rolled_back() {
    let store = store_with(&[(1, dec!(100))]);

    let result: Result<(), _> = store.with_unit_of_work(TransactionId(1), |unit| {
        unit.insert_settlement(make_settlement(1, dec!(30)))?;
        unit.update_payment_status(Utc::now())?;
        Err(SettlementError::PersistenceFailure("connection reset".to_string()))
    });

    assert!(result.is_err());
    assert!(store.settlements(TransactionId(1)).unwrap().is_empty());
    assert_eq!(
        store.find_by_id(TransactionId(1)).unwrap().payment_status(),
        PaymentStatus::Unpaid
    );
}

#[test]
fn storage_cap_rejects_overpayment() {
    let store = store_with(&[(1, dec!(10))]);

    let result = store.with_unit_of_work(TransactionId(1), |unit| {
        unit.insert_settlement(make_settlement(1, dec!(10.01)))
    });

    assert_eq!(
        result,
        Err(SettlementError::OverpaymentRejected {
            amount: dec!(10.01),
            remaining: dec!(10)
        })
    );
}

#[test]
fn storage_rejects_non_positive_amount() {
    let store = store_with(&[(1, dec!(10))]);
    let result = store.with_unit_of_work(TransactionId(1), |unit| {
        unit.insert_settlement(make_settlement(1, Decimal::ZERO))
    });
    assert!(matches!(result, Err(SettlementError::InvalidArgument(_))));
}

#[test]
fn status_without_settlements_stays_unpaid() {
    let store = store_with(&[(1, dec!(10))]);
    let transaction = store
        .with_unit_of_work(TransactionId(1), |unit| unit.update_payment_status(Utc::now()))
        .unwrap();
    assert_eq!(transaction.payment_status(), PaymentStatus::Unpaid);
}

#[test]
fn units_on_one_transaction_see_previous_commits() {
    let store = store_with(&[(1, dec!(100))]);

    for _ in 0..4 {
        store
            .with_unit_of_work(TransactionId(1), |unit| {
                unit.insert_settlement(make_settlement(1, dec!(25)))?;
                unit.update_payment_status(Utc::now())
            })
            .unwrap();
    }

    let paid = store
        .with_unit_of_work(TransactionId(1), |unit| {
            Ok(unit.settlements().iter().map(|s| s.amount).sum::<Decimal>())
        })
        .unwrap();
    assert_eq!(paid, dec!(100));
}

#[test]
fn busy_transaction_times_out_with_persistence_failure() {
    let store = Arc::new(MemoryStore::with_lock_timeout(Duration::from_millis(50)));
    store.insert_transaction(make_transaction(1, dec!(100))).unwrap();

    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store
                .with_unit_of_work(TransactionId(1), |_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        })
    };

    locked_rx.recv().unwrap();
    let result = store.with_unit_of_work(TransactionId(1), |_| Ok(()));
    release_tx.send(()).unwrap();
    holder.join().unwrap();

    let error = result.unwrap_err();
    assert!(matches!(error, SettlementError::PersistenceFailure(_)));
    assert!(error.is_retryable());
}

#[test]
fn other_transactions_are_not_blocked() {
    let store = Arc::new(MemoryStore::with_lock_timeout(Duration::from_millis(50)));
    store.insert_transaction(make_transaction(1, dec!(100))).unwrap();
    store.insert_transaction(make_transaction(2, dec!(100))).unwrap();

    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store
                .with_unit_of_work(TransactionId(1), |_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        })
    };

    locked_rx.recv().unwrap();
    let result = store.with_unit_of_work(TransactionId(2), |unit| {
        unit.insert_settlement(make_settlement(2, dec!(10)))?;
        unit.update_payment_status(Utc::now())
    });
    release_tx.send(()).unwrap();
    holder.join().unwrap();

    assert_eq!(result.unwrap().payment_status(), PaymentStatus::Partial);
}

// === Reads ===

#[test]
fn settlements_of_unknown_transaction_are_empty() {
    let store = MemoryStore::new();
    assert!(store.settlements(TransactionId(8)).unwrap().is_empty());
}

#[test]
fn cashier_directory_lookup() {
    let store = MemoryStore::new();
    store.register_cashier(CashierId(1), "Ana Reyes");
    store.register_cashier(CashierId(1), "Ana R. Cruz");

    assert_eq!(store.cashier_name(CashierId(1)).as_deref(), Some("Ana R. Cruz"));
    assert_eq!(store.cashier_name(CashierId(2)), None);
}

#[test]
fn summaries_are_ordered_by_transaction_id() {
    let store = store_with(&[(3, dec!(30)), (1, dec!(10)), (2, dec!(20))]);
    store
        .with_unit_of_work(TransactionId(2), |unit| {
            unit.insert_settlement(make_settlement(2, dec!(5)))?;
            unit.update_payment_status(Utc::now())
        })
        .unwrap();

    let summaries = store.summaries().unwrap();

    let ids: Vec<_> = summaries.iter().map(|s| s.transaction_id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(summaries[1].paid_amount, dec!(5));
    assert_eq!(summaries[1].balance, dec!(15));
    assert_eq!(summaries[1].payment_status, PaymentStatus::Partial);
}
