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

//! Append-only settlement ledger.
//!
//! The amount paid on a transaction is always a fold over its ledger; there
//! is no separately stored running balance that could drift.

use crate::settlement::Settlement;
use rust_decimal::Decimal;

/// Sums the amounts of a slice of settlements.
pub fn paid_total(settlements: &[Settlement]) -> Decimal {
    settlements.iter().map(|settlement| settlement.amount).sum()
}

/// Orders settlements most recent first.
///
/// Ties on `paid_at` are broken by settlement ID, which the store issues in
/// insertion order.
pub fn sort_most_recent_first(settlements: &mut [Settlement]) {
    settlements.sort_by(|a, b| b.paid_at.cmp(&a.paid_at).then_with(|| b.id.cmp(&a.id)));
}

/// Settlement history of a single transaction, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<Settlement>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paid_total(&self) -> Decimal {
        paid_total(&self.entries)
    }

    /// Entries in the order they were appended.
    pub fn entries(&self) -> &[Settlement] {
        &self.entries
    }

    /// Entries ordered most recent first.
    pub fn history(&self) -> Vec<Settlement> {
        let mut history = self.entries.clone();
        sort_most_recent_first(&mut history);
        history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a settlement that the caller has already validated.
    pub(crate) fn append(&mut self, settlement: Settlement) {
        debug_assert!(
            settlement.amount > Decimal::ZERO,
            "Invariant violated: non-positive settlement {}",
            settlement.amount
        );
        debug_assert!(
            self.entries
                .last()
                .is_none_or(|last| last.transaction_id == settlement.transaction_id),
            "Invariant violated: ledger mixes transactions"
        );
        self.entries.push(settlement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{CashierId, SettlementId, TransactionId};
    use crate::settlement::PaymentMode;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn settlement(id: u64, amount: Decimal, seconds: i64) -> Settlement {
        Settlement {
            id: SettlementId(id),
            transaction_id: TransactionId(1),
            amount,
            payment_mode: PaymentMode::Cash,
            cashier_id: CashierId(1),
            paid_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds),
        }
    }

    #[test]
    fn empty_ledger_has_zero_paid() {
        let ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.paid_total(), Decimal::ZERO);
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn paid_total_folds_all_entries() {
        let mut ledger = Ledger::new();
        ledger.append(settlement(1, dec!(40.25), 0));
        ledger.append(settlement(2, dec!(9.75), 10));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.paid_total(), dec!(50.00));
    }

    #[test]
    fn history_is_most_recent_first() {
        let mut ledger = Ledger::new();
        ledger.append(settlement(1, dec!(10), 0));
        ledger.append(settlement(2, dec!(10), 30));
        ledger.append(settlement(3, dec!(10), 60));

        let ids: Vec<_> = ledger.history().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SettlementId(3), SettlementId(2), SettlementId(1)]);

        // Insertion order is preserved underneath.
        assert_eq!(ledger.entries()[0].id, SettlementId(1));
    }

    #[test]
    fn timestamp_ties_break_on_id() {
        let mut settlements = vec![
            settlement(5, dec!(1), 0),
            settlement(7, dec!(1), 0),
            settlement(6, dec!(1), 0),
        ];
        sort_most_recent_first(&mut settlements);
        let ids: Vec<_> = settlements.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![7, 6, 5]);
    }
}
