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

//! Real-time change notifications for dashboards and displays.
//!
//! Notifications are produced inside a unit of work as a
//! [`PendingNotifications`] list and dispatched only after the unit has
//! committed. Delivery is at-most-once: a failed publish is logged and
//! dropped, never retried and never reported to the settlement caller.

use crate::NotificationError;
use crate::base::TransactionId;
use crate::settlement::Settlement;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

/// Update type carried by the generic transaction update.
pub const PAYMENT_SETTLEMENT_CREATED: &str = "payment_settlement_created";

/// Generic "transaction changed" payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub transaction: Transaction,
    pub settlement: Settlement,
    pub timestamp: DateTime<Utc>,
}

/// Canonical payload for a newly recorded settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementCreated {
    pub transaction_id: TransactionId,
    pub settlement: Settlement,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SettlementEvent {
    TransactionUpdated(TransactionUpdate),
    SettlementCreated(SettlementCreated),
}

impl SettlementEvent {
    pub fn transaction_updated(
        transaction: &Transaction,
        settlement: &Settlement,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::TransactionUpdated(TransactionUpdate {
            kind: PAYMENT_SETTLEMENT_CREATED,
            transaction: transaction.clone(),
            settlement: settlement.clone(),
            timestamp,
        })
    }

    pub fn settlement_created(transaction: &Transaction, settlement: &Settlement) -> Self {
        Self::SettlementCreated(SettlementCreated {
            transaction_id: transaction.id(),
            settlement: settlement.clone(),
            transaction: transaction.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TransactionUpdated(_) => "transaction_updated",
            Self::SettlementCreated(_) => "settlement_created",
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::TransactionUpdated(update) => update.transaction.id(),
            Self::SettlementCreated(created) => created.transaction_id,
        }
    }
}

/// Write-only sink for settlement events.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: SettlementEvent) -> Result<(), NotificationError>;
}

/// Fans events out to every live subscriber over unbounded channels.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// publish.
#[derive(Debug, Default)]
pub struct ChannelPublisher {
    subscribers: Mutex<Vec<Sender<SettlementEvent>>>,
}

impl ChannelPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SettlementEvent> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl NotificationPublisher for ChannelPublisher {
    fn publish(&self, event: SettlementEvent) -> Result<(), NotificationError> {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());

        if before > 0 && subscribers.is_empty() {
            return Err(NotificationError::Closed);
        }
        Ok(())
    }
}

/// Events produced by a unit of work, held until it commits.
#[derive(Debug, Default)]
#[must_use = "pending notifications are lost unless dispatched"]
pub struct PendingNotifications {
    events: Vec<SettlementEvent>,
}

impl PendingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SettlementEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Publishes every event in order and returns how many the publisher
    /// accepted.
    ///
    /// Accepted is not delivered: a [`ChannelPublisher`] with no
    /// subscribers accepts and drops. Failures are logged and skipped.
    pub fn dispatch<P>(self, publisher: &P) -> usize
    where
        P: NotificationPublisher + ?Sized,
    {
        let mut accepted = 0;
        for event in self.events {
            let name = event.name();
            let transaction_id = event.transaction_id();
            match publisher.publish(event) {
                Ok(()) => {
                    accepted += 1;
                    debug!(event = name, %transaction_id, "notification accepted");
                }
                Err(error) => {
                    warn!(event = name, %transaction_id, %error, "failed to publish notification");
                }
            }
        }
        accepted
    }
}
