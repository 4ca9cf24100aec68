//! Criterion benchmarks for [`DeviceAccumulator`] under noisy provider bursts.
//!
//! A BLE scan can deliver the same advertiser hundreds of times.  These
//! benchmarks measure insert cost when most offers are duplicates.
//!
//! Run with:
//! ```bash
//! cargo bench --package printlink-core --bench dedup_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use printlink_core::{normalize, AddressMatch, DeviceAccumulator, DiscoveredDevice, RawDevice, Transport};

// ── Fixture builders ──────────────────────────────────────────────────────────

/// Builds `total` records cycling over `unique` distinct MAC addresses.
fn burst(total: usize, unique: usize) -> Vec<DiscoveredDevice> {
    (0..total)
        .map(|i| {
            let n = i % unique;
            let mac = format!("AC:3F:A4:{:02X}:{:02X}:{:02X}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff);
            normalize(RawDevice::new(Transport::BluetoothLe, mac).with_rssi(-60))
        })
        .collect()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_insert_mostly_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulator_insert");
    for unique in [8usize, 64, 512] {
        let records = burst(2_000, unique);
        for mode in [AddressMatch::Exact, AddressMatch::CaseInsensitive] {
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), unique),
                &records,
                |b, records| {
                    b.iter(|| {
                        let mut acc = DeviceAccumulator::new(mode);
                        for r in records.iter().cloned() {
                            black_box(acc.insert(r));
                        }
                        black_box(acc.len())
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_insert_mostly_duplicates);
criterion_main!(benches);
