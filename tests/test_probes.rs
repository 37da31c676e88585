// CLASSIFICATION: COMMUNITY
// Filename: test_probes.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use sysprobe::probe::{heap, stack};
use sysprobe::ProbeError;

#[test]
fn heap_probe_holds_zeroed_buffers() {
    let _ = env_logger::builder().is_test(true).try_init();
    let report = heap::exhaust(1024, 32).unwrap();
    assert_eq!(report.count(), 32);
    assert_eq!(report.total_bytes(), 32 * 1024);
    assert!(report.buffers().iter().all(|b| b.len() == 1024 && b.iter().all(|&x| x == 0)));
}

#[test]
fn heap_probe_reports_failing_index() {
    match heap::exhaust(usize::MAX / 2, 3) {
        Err(ProbeError::Alloc { index, size }) => {
            assert_eq!(index, 0);
            assert_eq!(size, usize::MAX / 2);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn stack_probe_reaches_requested_depth() {
    let report = stack::probe(1_000, Some(8 << 20)).unwrap();
    assert_eq!(report.frames, 1_000);
    assert!(report.stack_bytes > 0);
}
