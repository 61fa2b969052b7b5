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

//! Error types for settlement processing and notification dispatch.

use crate::base::TransactionId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Settlement processing errors.
///
/// Every variant except [`SettlementError::PersistenceFailure`] is detected
/// before anything is written, so the caller can rely on "error means no
/// state change".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Malformed input: non-positive or non-numeric amount, unknown payment mode
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced transaction does not exist
    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    /// Settlement would push the paid total past the transaction total
    #[error("settlement amount ({amount}) exceeds remaining balance ({remaining})")]
    OverpaymentRejected { amount: Decimal, remaining: Decimal },

    /// Transaction ID already present in the store
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),

    /// The unit of work could not complete; nothing was written
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl SettlementError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::OverpaymentRejected { .. } => "OVERPAYMENT_REJECTED",
            Self::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Whether the caller can fix the request (4xx class).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::PersistenceFailure(_))
    }

    /// Whether the whole call is safe to repeat unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}

/// Notification dispatch errors.
///
/// These are logged by the dispatcher and never surfaced as the result of a
/// settlement call: the financial write has already been committed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}
