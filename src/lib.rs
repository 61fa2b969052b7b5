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

//! # EscaShop Settlement
//!
//! This library records partial and full payments ("settlements") against
//! point-of-sale transactions, keeps each transaction's payment status in
//! step with its settlement ledger, and notifies real-time subscribers of
//! every change.
//!
//! ## Core Components
//!
//! - [`SettlementService`]: Validates and records settlements in one atomic unit of work
//! - [`TransactionStore`]: Persistence context the service is injected with ([`MemoryStore`] in-process)
//! - [`Ledger`]: Append-only settlement history; the paid total is always a fold over it
//! - [`PaymentStatus`]: `unpaid` / `partial` / `paid`, derived from total and paid sum
//! - [`NotificationPublisher`]: Sink for post-commit change events ([`ChannelPublisher`] fan-out)
//! - [`SettlementError`]: Error types for settlement processing failures
//!
//! ## Example
//!
//! ```
//! use escashop_settlement::{
//!     CashierId, ChannelPublisher, CustomerId, MemoryStore, PaymentMode, PaymentStatus,
//!     SettlementRequest, SettlementService, Transaction, TransactionId,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store
//!     .insert_transaction(Transaction::new(TransactionId(1), CustomerId(7), dec!(100.00)).unwrap())
//!     .unwrap();
//!
//! let publisher = Arc::new(ChannelPublisher::new());
//! let events = publisher.subscribe();
//! let service = SettlementService::new(store, publisher);
//!
//! // Pay 40 now, 60 later
//! let request = SettlementRequest::new(TransactionId(1), dec!(40.00), PaymentMode::Cash, CashierId(3));
//! let outcome = service.create_settlement(request).unwrap();
//! assert_eq!(outcome.transaction.payment_status(), PaymentStatus::Partial);
//! assert_eq!(outcome.balance(), dec!(60.00));
//!
//! // Both post-commit notifications were delivered
//! assert_eq!(events.try_iter().count(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! Settlements against the same transaction are serialized by a
//! per-transaction lock held for the whole unit of work; settlements against
//! different transactions proceed in parallel.

mod base;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notification;
mod service;
pub mod settlement;
pub mod store;
mod transaction;

pub use base::{CashierId, CustomerId, SettlementId, TransactionId};
pub use config::SettlementConfig;
pub use error::{NotificationError, SettlementError};
pub use ledger::Ledger;
pub use notification::{ChannelPublisher, NotificationPublisher, PendingNotifications, SettlementEvent};
pub use service::{SettlementOutcome, SettlementRequest, SettlementService};
pub use settlement::{NewSettlement, PaymentMode, Settlement, SettlementRecord};
pub use store::{MemoryStore, TransactionStore, UnitOfWork};
pub use transaction::{PaymentStatus, Transaction, TransactionSummary};
