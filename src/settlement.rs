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

//! Settlement ledger entries and payment modes.

use crate::SettlementError;
use crate::base::{CashierId, SettlementId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a settlement was paid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentMode {
    #[serde(rename = "cash")]
    Cash,
    #[serde(rename = "card", alias = "credit_card", alias = "debit_card")]
    Card,
    #[serde(rename = "e-wallet", alias = "gcash", alias = "maya")]
    EWallet,
    #[serde(rename = "bank-transfer", alias = "bank_transfer")]
    BankTransfer,
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 4] = [
        PaymentMode::Cash,
        PaymentMode::Card,
        PaymentMode::EWallet,
        PaymentMode::BankTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Card => "card",
            PaymentMode::EWallet => "e-wallet",
            PaymentMode::BankTransfer => "bank-transfer",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "card" | "credit_card" | "debit_card" => Ok(PaymentMode::Card),
            "e-wallet" | "ewallet" | "gcash" | "maya" => Ok(PaymentMode::EWallet),
            "bank-transfer" | "bank_transfer" => Ok(PaymentMode::BankTransfer),
            other => Err(SettlementError::InvalidArgument(format!(
                "invalid payment mode '{other}'"
            ))),
        }
    }
}

/// A recorded payment against a transaction. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub cashier_id: CashierId,
    pub paid_at: DateTime<Utc>,
}

/// A settlement that has not been assigned an ID yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlement {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub cashier_id: CashierId,
    pub paid_at: DateTime<Utc>,
}

impl NewSettlement {
    pub fn into_settlement(self, id: SettlementId) -> Settlement {
        Settlement {
            id,
            transaction_id: self.transaction_id,
            amount: self.amount,
            payment_mode: self.payment_mode,
            cashier_id: self.cashier_id,
            paid_at: self.paid_at,
        }
    }
}

/// Settlement annotated with the acting cashier's display name.
///
/// `cashier_name` is `None` when the cashier is not in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementRecord {
    #[serde(flatten)]
    pub settlement: Settlement,
    pub cashier_name: Option<String>,
}
