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

//! Point-of-sale transactions and payment status derivation.
//!
//! A transaction's payment status is never stored independently of its
//! ledger. It is always recomputed from the paid total:
//!
//! ```text
//!  paid == 0            ──► Unpaid
//!  0 < paid < total     ──► Partial
//!  paid == total        ──► Paid
//! ```

use crate::SettlementError;
use crate::base::{CustomerId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Derives the status of a transaction from its total and the sum of its
    /// settlements.
    ///
    /// This is the only place a payment status is computed. A zero-total
    /// transaction with nothing paid is `Unpaid`.
    pub fn derive(total_amount: Decimal, paid_total: Decimal) -> Self {
        debug_assert!(
            paid_total >= Decimal::ZERO,
            "Invariant violated: paid total went negative: {paid_total}"
        );
        debug_assert!(
            paid_total <= total_amount,
            "Invariant violated: paid total {paid_total} exceeds total {total_amount}"
        );

        if paid_total <= Decimal::ZERO {
            PaymentStatus::Unpaid
        } else if paid_total < total_amount {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sale as seen by the settlement engine.
///
/// The total owed is fixed at creation. The only mutation is the status
/// refresh produced by [`Transaction::with_paid_total`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    customer_id: CustomerId,
    total_amount: Decimal,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates an unpaid transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::InvalidArgument`] for a negative total.
    pub fn new(
        id: TransactionId,
        customer_id: CustomerId,
        total_amount: Decimal,
    ) -> Result<Self, SettlementError> {
        if total_amount < Decimal::ZERO {
            return Err(SettlementError::InvalidArgument(format!(
                "transaction total must not be negative (got {total_amount})"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            customer_id,
            total_amount,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns a copy whose status is derived from `paid_total`.
    pub fn with_paid_total(&self, paid_total: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            payment_status: PaymentStatus::derive(self.total_amount, paid_total),
            updated_at: at,
            ..self.clone()
        }
    }
}

/// Reporting view of a transaction with its folded ledger totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub payment_status: PaymentStatus,
}

impl TransactionSummary {
    pub const DECIMAL_PRECISION: u32 = 2;

    pub fn new(transaction: &Transaction, paid_amount: Decimal) -> Self {
        Self {
            transaction_id: transaction.id(),
            customer_id: transaction.customer_id(),
            total_amount: transaction.total_amount(),
            paid_amount,
            balance: transaction.total_amount() - paid_amount,
            payment_status: transaction.payment_status(),
        }
    }
}

impl Serialize for TransactionSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TransactionSummary", 6)?;
        state.serialize_field("transaction", &self.transaction_id)?;
        state.serialize_field("customer", &self.customer_id)?;
        state.serialize_field(
            "total",
            &self.total_amount.round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.serialize_field("paid", &self.paid_amount.round_dp(Self::DECIMAL_PRECISION))?;
        state.serialize_field("balance", &self.balance.round_dp(Self::DECIMAL_PRECISION))?;
        state.serialize_field("status", &self.payment_status)?;
        state.end()
    }
}
