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

//! Settlement service.
//!
//! The [`SettlementService`] records partial and full payments against
//! transactions. Each call runs as one unit of work:
//!
//! 1. Load the transaction (fails with `NotFound`).
//! 2. Fold the ledger into the current paid total.
//! 3. Reject amounts above the remaining balance (no clamping, no split).
//! 4. Append the settlement.
//! 5. Recompute and persist the payment status.
//! 6. Commit.
//!
//! Only after the commit are the `transaction_updated` and
//! `settlement_created` notifications handed to the publisher.
//!
//! # Concurrency
//!
//! Steps 1–6 hold the per-transaction lock of the store, so two settlements
//! against the same transaction cannot both pass the balance check. Calls
//! for different transactions run in parallel. The service is synchronous:
//! once a call has started it runs to completion, so an async caller that
//! times out must re-read the transaction rather than assume a rollback.

use crate::base::{CashierId, TransactionId};
use crate::config::SettlementConfig;
use crate::ledger;
use crate::notification::{NotificationPublisher, PendingNotifications, SettlementEvent};
use crate::settlement::{NewSettlement, PaymentMode, Settlement, SettlementRecord};
use crate::store::TransactionStore;
use crate::transaction::{Transaction, TransactionSummary};
use crate::SettlementError;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

/// A validated request to record a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementRequest {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub cashier_id: CashierId,
}

impl SettlementRequest {
    pub fn new(
        transaction_id: TransactionId,
        amount: Decimal,
        payment_mode: PaymentMode,
        cashier_id: CashierId,
    ) -> Self {
        Self {
            transaction_id,
            amount,
            payment_mode,
            cashier_id,
        }
    }

    /// Builds a request from untyped input such as CSV fields or form data.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::InvalidArgument`] for a non-numeric or
    /// non-positive amount, or an unknown payment mode.
    pub fn parse(
        transaction_id: TransactionId,
        amount: &str,
        payment_mode: &str,
        cashier_id: CashierId,
    ) -> Result<Self, SettlementError> {
        let amount = Decimal::from_str(amount.trim()).map_err(|_| {
            SettlementError::InvalidArgument(format!("amount '{}' is not a number", amount.trim()))
        })?;
        let payment_mode = PaymentMode::from_str(payment_mode)?;
        let request = Self::new(transaction_id, amount, payment_mode, cashier_id);
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<(), SettlementError> {
        if self.amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidArgument(format!(
                "settlement amount must be greater than 0 (got {})",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Result of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    /// The transaction with its refreshed payment status.
    pub transaction: Transaction,
    /// The settlement that was just recorded.
    pub settlement: Settlement,
    /// Full settlement history, most recent first.
    pub settlements: Vec<Settlement>,
}

impl SettlementOutcome {
    pub fn paid_total(&self) -> Decimal {
        ledger::paid_total(&self.settlements)
    }

    pub fn balance(&self) -> Decimal {
        self.transaction.total_amount() - self.paid_total()
    }
}

/// Records settlements and publishes the resulting change notifications.
#[derive(Debug)]
pub struct SettlementService<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: SettlementConfig,
}

impl<S, P> SettlementService<S, P>
where
    S: TransactionStore,
    P: NotificationPublisher,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self::with_config(store, publisher, SettlementConfig::default())
    }

    pub fn with_config(store: Arc<S>, publisher: Arc<P>, config: SettlementConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Records a settlement and returns the updated transaction and history.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::InvalidArgument`] - Amount is not positive.
    /// - [`SettlementError::NotFound`] - Transaction does not exist.
    /// - [`SettlementError::OverpaymentRejected`] - Amount exceeds the
    ///   remaining balance.
    /// - [`SettlementError::PersistenceFailure`] - The unit of work did not
    ///   commit; nothing was written and the call can be retried.
    ///
    /// Notification failures are logged and never returned.
    pub fn create_settlement(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementOutcome, SettlementError> {
        let span = if self.config.trace_settlements {
            info_span!(
                "settlement",
                request_id = %Uuid::new_v4(),
                transaction_id = %request.transaction_id,
            )
        } else {
            Span::none()
        };
        let _entered = span.enter();

        debug!(
            transaction_id = %request.transaction_id,
            amount = %request.amount,
            payment_mode = %request.payment_mode,
            cashier_id = %request.cashier_id,
            "creating settlement"
        );
        request.validate()?;

        let result = self
            .store
            .with_unit_of_work(request.transaction_id, |unit| {
                let now = Utc::now();
                let total_amount = unit.transaction().total_amount();
                let current_paid = ledger::paid_total(&unit.settlements());
                let remaining = total_amount - current_paid;

                if request.amount > remaining {
                    return Err(SettlementError::OverpaymentRejected {
                        amount: request.amount,
                        remaining,
                    });
                }
                debug!(%current_paid, %remaining, "balance check passed");

                let settlement = unit.insert_settlement(NewSettlement {
                    transaction_id: request.transaction_id,
                    amount: request.amount,
                    payment_mode: request.payment_mode,
                    cashier_id: request.cashier_id,
                    paid_at: now,
                })?;
                let transaction = unit.update_payment_status(now)?;

                let mut settlements = unit.settlements();
                ledger::sort_most_recent_first(&mut settlements);

                let mut pending = PendingNotifications::new();
                pending.push(SettlementEvent::transaction_updated(&transaction, &settlement, now));
                pending.push(SettlementEvent::settlement_created(&transaction, &settlement));

                Ok((
                    SettlementOutcome {
                        transaction,
                        settlement,
                        settlements,
                    },
                    pending,
                ))
            });

        let (outcome, pending) = match result {
            Ok(committed) => committed,
            Err(error) => {
                if error.is_retryable() {
                    warn!(transaction_id = %request.transaction_id, %error, "settlement not committed");
                } else {
                    debug!(transaction_id = %request.transaction_id, %error, "settlement rejected");
                }
                return Err(error);
            }
        };

        let accepted = pending.dispatch(self.publisher.as_ref());
        info!(
            transaction_id = %request.transaction_id,
            settlement_id = %outcome.settlement.id,
            amount = %outcome.settlement.amount,
            status = %outcome.transaction.payment_status(),
            accepted,
            "settlement recorded"
        );

        Ok(outcome)
    }

    /// Settlement history of a transaction, most recent first, with cashier
    /// names resolved where known.
    ///
    /// Does not check that the transaction exists: an unknown transaction
    /// and one without payments both yield an empty list.
    pub fn get_settlements(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<SettlementRecord>, SettlementError> {
        let settlements = self.store.settlements(transaction_id)?;
        Ok(settlements
            .into_iter()
            .map(|settlement| {
                let cashier_name = self.store.cashier_name(settlement.cashier_id);
                SettlementRecord {
                    settlement,
                    cashier_name,
                }
            })
            .collect())
    }

    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction, SettlementError> {
        self.store.find_by_id(transaction_id)
    }

    /// Transaction with its paid total and outstanding balance.
    pub fn summary(&self, transaction_id: TransactionId) -> Result<TransactionSummary, SettlementError> {
        self.store.with_unit_of_work(transaction_id, |unit| {
            Ok(TransactionSummary::new(
                unit.transaction(),
                ledger::paid_total(&unit.settlements()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_accepts_decimal_strings() {
        let request =
            SettlementRequest::parse(TransactionId(1), " 40.50 ", "cash", CashierId(2)).unwrap();
        assert_eq!(request.amount, dec!(40.50));
        assert_eq!(request.payment_mode, PaymentMode::Cash);
    }

    #[test]
    fn parse_rejects_non_numeric_amount() {
        let result = SettlementRequest::parse(TransactionId(1), "forty", "cash", CashierId(2));
        assert_eq!(
            result,
            Err(SettlementError::InvalidArgument(
                "amount 'forty' is not a number".to_string()
            ))
        );
    }

    #[test]
    fn parse_rejects_zero_and_negative_amounts() {
        for amount in ["0", "0.00", "-5"] {
            let result = SettlementRequest::parse(TransactionId(1), amount, "card", CashierId(2));
            assert!(
                matches!(result, Err(SettlementError::InvalidArgument(_))),
                "{amount} should be rejected"
            );
        }
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let result = SettlementRequest::parse(TransactionId(1), "10", "barter", CashierId(2));
        assert!(matches!(result, Err(SettlementError::InvalidArgument(_))));
    }
}
