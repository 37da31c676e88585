use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sysprobe::config::HarnessConfig;
use sysprobe::isrmq::isrmq_test;
use sysprobe::platform::mqueue::{self, MqAttr, OpenFlags};

fn bench_queue_round_trip(c: &mut Criterion) {
    let q = mqueue::open(
        "bench-rt",
        OpenFlags::RDWR | OpenFlags::CREATE,
        Some(MqAttr::new(8, 4)),
    )
    .unwrap();
    let mut buf = [0u8; 4];
    c.bench_function("mqueue_round_trip", |b| {
        b.iter(|| {
            q.try_send(&7u32.to_le_bytes(), 0).unwrap();
            q.try_receive(&mut buf).unwrap();
        });
    });
    q.close();
    mqueue::unlink("bench-rt").unwrap();
}

fn bench_relay_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_pipeline");
    group.sample_size(10);
    for queue_len in [1usize, 7, 32] {
        let cfg = HarnessConfig {
            queue_len,
            poll_interval: Duration::from_millis(5),
            ..HarnessConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(queue_len), &cfg, |b, cfg| {
            b.iter(|| {
                let report = isrmq_test(cfg.clone(), 1_000);
                assert!(report.passed());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue_round_trip, bench_relay_pipeline);
criterion_main!(benches);
