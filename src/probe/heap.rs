// CLASSIFICATION: COMMUNITY
// Filename: heap.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Memory-exhaustion probe.
//!
//! Allocates zero-filled buffers until the requested count is reached or
//! the allocator refuses. Allocation is fallible so exhaustion is reported
//! instead of aborting the process.

use log::{debug, info};

use crate::error::ProbeError;

/// Buffers held by a successful probe. They stay allocated for as long as
/// the report lives.
#[derive(Debug)]
pub struct AllocReport {
    pub buffer_size: usize,
    buffers: Vec<Vec<u8>>,
}

impl AllocReport {
    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }
}

fn zeroed(size: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).ok()?;
    buf.resize(size, 0);
    Some(buf)
}

/// Allocate `count` zero-filled buffers of `size` bytes each.
///
/// Fails with [`ProbeError::Alloc`] naming the first buffer that could not
/// be allocated; buffers obtained before it are released with the error.
pub fn exhaust(size: usize, count: usize) -> Result<AllocReport, ProbeError> {
    let mut buffers = Vec::new();
    buffers
        .try_reserve_exact(count)
        .map_err(|_| ProbeError::Alloc { index: 0, size })?;

    for index in 0..count {
        let buf = zeroed(size).ok_or(ProbeError::Alloc { index, size })?;
        buffers.push(buf);
        if index % 1024 == 1023 {
            debug!("{} buffers of {size} bytes allocated", index + 1);
        }
    }
    info!("{count} buffers of {size} bytes held");
    Ok(AllocReport {
        buffer_size: size,
        buffers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_zeroed_buffers() {
        let report = exhaust(128, 16).unwrap();
        assert_eq!(report.count(), 16);
        assert_eq!(report.total_bytes(), 128 * 16);
        assert!(report.buffers().iter().all(|b| b.iter().all(|&x| x == 0)));
    }

    #[test]
    fn zero_buffers_is_trivially_satisfied() {
        let report = exhaust(4096, 0).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(report.total_bytes(), 0);
    }

    #[test]
    fn impossible_size_reports_first_failing_index() {
        let err = exhaust(usize::MAX / 2, 3).unwrap_err();
        assert!(matches!(err, ProbeError::Alloc { index: 0, .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_ALLOC);
    }
}
