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

use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use escashop_settlement::{
    CashierId, ChannelPublisher, CustomerId, MemoryStore, SettlementConfig, SettlementRequest,
    SettlementService, Transaction, TransactionId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Settlement Engine - Apply settlement CSV files to transactions
///
/// Loads transactions, applies settlements in file order, and writes the
/// resulting transaction summaries (or settlement history) to stdout.
#[derive(Parser, Debug)]
#[command(name = "escashop-settlement")]
#[command(about = "Applies payment settlements to point-of-sale transactions", long_about = None)]
struct Args {
    /// Path to CSV file with transactions
    ///
    /// Expected format: transaction,customer,total
    #[arg(value_name = "TRANSACTIONS")]
    transactions: PathBuf,

    /// Path to CSV file with settlements to apply
    ///
    /// Expected format: transaction,amount,mode,cashier
    #[arg(value_name = "SETTLEMENTS")]
    settlements: PathBuf,

    /// Optional cashier directory (format: cashier,name)
    #[arg(long, value_name = "FILE")]
    cashiers: Option<PathBuf>,

    /// Write the settlement history instead of transaction summaries
    #[arg(long)]
    history: bool,

    /// Tag every settlement with a request ID span
    #[arg(long, env = "ENABLE_SETTLEMENT_TRACING")]
    trace_settlements: bool,

    /// Longest wait for a busy transaction, in milliseconds
    #[arg(
        long,
        env = "SETTLEMENT_LOCK_TIMEOUT_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    lock_timeout_ms: u64,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

type Service = SettlementService<MemoryStore, ChannelPublisher>;

fn main() {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = SettlementConfig::default()
        .with_tracing(args.trace_settlements)
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms));
    let store = Arc::new(MemoryStore::with_lock_timeout(config.lock_timeout));
    let service = SettlementService::with_config(store, Arc::new(ChannelPublisher::new()), config);

    if let Err(e) = run(&args, &service) {
        error!(error = %e, "settlement run failed");
        process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: &Args, service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_transactions(service.store(), open(&args.transactions)?)?;
    info!(transactions = loaded, "transactions loaded");

    if let Some(path) = &args.cashiers {
        let cashiers = load_cashiers(service.store(), open(path)?)?;
        info!(cashiers, "cashier directory loaded");
    }

    let summary = process_settlements(service, open(&args.settlements)?)?;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "settlements processed"
    );

    let stdout = std::io::stdout();
    if args.history {
        write_history(service, stdout.lock())?;
    } else {
        write_transactions(service.store(), stdout.lock())?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>, std::io::Error> {
    File::open(path).map(BufReader::new).map_err(|e| {
        std::io::Error::new(e.kind(), format!("cannot open '{}': {}", path.display(), e))
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Raw transaction row. Fields: `transaction, customer, total`
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    transaction: u64,
    customer: u32,
    total: Decimal,
}

/// Raw settlement row. Fields: `transaction, amount, mode, cashier`
///
/// Amount and mode stay strings so malformed values surface as
/// `InvalidArgument` instead of a CSV error.
#[derive(Debug, Deserialize)]
struct SettlementCsvRecord {
    transaction: u64,
    amount: String,
    mode: String,
    cashier: u32,
}

#[derive(Debug, Deserialize)]
struct CashierRecord {
    cashier: u32,
    name: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Load transactions into the store, skipping malformed or duplicate rows.
pub fn load_transactions<R: Read>(store: &MemoryStore, reader: R) -> Result<usize, csv::Error> {
    let mut loaded = 0;
    for result in csv_reader(reader).deserialize::<TransactionRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed transaction row");
                continue;
            }
        };
        let inserted = Transaction::new(
            TransactionId(record.transaction),
            CustomerId(record.customer),
            record.total,
        )
        .and_then(|transaction| store.insert_transaction(transaction));
        match inserted {
            Ok(()) => loaded += 1,
            Err(e) => warn!(transaction_id = record.transaction, error = %e, "skipping transaction"),
        }
    }
    Ok(loaded)
}

pub fn load_cashiers<R: Read>(store: &MemoryStore, reader: R) -> Result<usize, csv::Error> {
    let mut loaded = 0;
    for result in csv_reader(reader).deserialize::<CashierRecord>() {
        match result {
            Ok(record) => {
                store.register_cashier(CashierId(record.cashier), record.name);
                loaded += 1;
            }
            Err(e) => warn!(error = %e, "skipping malformed cashier row"),
        }
    }
    Ok(loaded)
}

/// Apply settlements in file order.
///
/// Rejected settlements (overpayment, unknown transaction, bad amount or
/// mode) are logged and counted; they never stop processing.
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn process_settlements<R: Read>(service: &Service, reader: R) -> Result<ProcessSummary, csv::Error> {
    let mut summary = ProcessSummary::default();

    for result in csv_reader(reader).deserialize::<SettlementCsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "skipping malformed settlement row");
                summary.rejected += 1;
                continue;
            }
        };

        let outcome = SettlementRequest::parse(
            TransactionId(record.transaction),
            &record.amount,
            &record.mode,
            CashierId(record.cashier),
        )
        .and_then(|request| service.create_settlement(request));

        match outcome {
            Ok(_) => summary.applied += 1,
            Err(e) => {
                warn!(transaction_id = record.transaction, error = %e, "settlement rejected");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

/// Write transaction summaries as CSV.
///
/// Columns: `transaction, customer, total, paid, balance, status`
pub fn write_transactions<W: Write>(store: &MemoryStore, writer: W) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    for summary in store.summaries()? {
        wtr.serialize(&summary)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    transaction: u64,
    settlement: u64,
    amount: Decimal,
    mode: &'static str,
    cashier: u32,
    cashier_name: String,
    paid_at: String,
}

/// Write the settlement history of every transaction as CSV, most recent
/// first within each transaction.
pub fn write_history<W: Write>(service: &Service, writer: W) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    for summary in service.store().summaries()? {
        for record in service.get_settlements(summary.transaction_id)? {
            wtr.serialize(HistoryRow {
                transaction: record.settlement.transaction_id.0,
                settlement: record.settlement.id.0,
                amount: record.settlement.amount,
                mode: record.settlement.payment_mode.as_str(),
                cashier: record.settlement.cashier_id.0,
                cashier_name: record.cashier_name.unwrap_or_default(),
                paid_at: record.settlement.paid_at.to_rfc3339(),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}
