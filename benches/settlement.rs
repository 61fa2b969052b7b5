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

//! Benchmarks for the settlement service.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded settlement recording
//! - Parallel settlements across many transactions
//! - Contention on a shared transaction
//! - History reads on long ledgers

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use escashop_settlement::{
    CashierId, ChannelPublisher, CustomerId, MemoryStore, PaymentMode, SettlementRequest,
    SettlementService, Transaction, TransactionId,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

type Service = SettlementService<MemoryStore, ChannelPublisher>;

// =============================================================================
// Helper Functions
// =============================================================================

/// Service with `count` transactions, each owing `total` cents.
fn make_service(count: u64, total: i64) -> Service {
    let store = Arc::new(MemoryStore::new());
    for id in 1..=count {
        store
            .insert_transaction(
                Transaction::new(TransactionId(id), CustomerId(1), Decimal::new(total, 2)).unwrap(),
            )
            .unwrap();
    }
    SettlementService::new(store, Arc::new(ChannelPublisher::new()))
}

fn make_request(tx_id: u64, cents: i64) -> SettlementRequest {
    SettlementRequest::new(
        TransactionId(tx_id),
        Decimal::new(cents, 2),
        PaymentMode::Cash,
        CashierId(1),
    )
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_settlement(c: &mut Criterion) {
    c.bench_function("single_settlement", |b| {
        b.iter(|| {
            let service = make_service(1, 10_000);
            service
                .create_settlement(black_box(make_request(1, 10_000)))
                .unwrap();
        })
    });
}

fn bench_rejected_overpayment(c: &mut Criterion) {
    let service = make_service(1, 100);
    c.bench_function("rejected_overpayment", |b| {
        b.iter(|| {
            let _ = black_box(service.create_settlement(make_request(1, 101)));
        })
    });
}

fn bench_installments(c: &mut Criterion) {
    let mut group = c.benchmark_group("installments");

    for count in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let service = make_service(1, count as i64 * 100);
                for _ in 0..count {
                    service.create_settlement(make_request(1, 100)).unwrap();
                }
                black_box(&service);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_different_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_different_transactions");

    for count in [1_000u64, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let service = make_service(count, 10_000);
                (1..=count).into_par_iter().for_each(|tx_id| {
                    service.create_settlement(make_request(tx_id, 5_000)).unwrap();
                });
                black_box(&service);
            })
        });
    }
    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_ops = 10_000u64;

    // Fewer transactions = more threads competing for the same lock
    for num_transactions in [1u64, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(total_ops));
        group.bench_with_input(
            BenchmarkId::new("transactions", num_transactions),
            num_transactions,
            |b, &num_transactions| {
                b.iter(|| {
                    let service = make_service(num_transactions, 1_000_000_000);
                    (0..total_ops).into_par_iter().for_each(|i| {
                        let tx_id = i % num_transactions + 1;
                        service.create_settlement(make_request(tx_id, 1)).unwrap();
                    });
                    black_box(&service);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Read Benchmarks
// =============================================================================

fn bench_settlement_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement_history");

    for len in [10, 100, 1_000].iter() {
        let service = make_service(1, *len as i64);
        for _ in 0..*len {
            service.create_settlement(make_request(1, 1)).unwrap();
        }
        service.store().register_cashier(CashierId(1), "Bench Cashier");

        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            b.iter(|| black_box(service.get_settlements(TransactionId(1)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_single_settlement,
    bench_rejected_overpayment,
    bench_installments,
);

criterion_group!(
    multi_threaded,
    bench_parallel_different_transactions,
    bench_contention,
);

criterion_group!(reads, bench_settlement_history,);

criterion_main!(single_threaded, multi_threaded, reads);
