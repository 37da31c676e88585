// CLASSIFICATION: COMMUNITY
// Filename: stack.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Stack-depth probe.
//!
//! Recurses to a requested depth on a thread with a chosen stack size and
//! reports how much stack the recursion used. A depth the stack cannot hold
//! faults the way any stack overflow does on the target; on a hosted build
//! the runtime aborts the process.

use std::hint::black_box;
use std::thread;

use log::debug;

use crate::error::ProbeError;

/// Bytes kept live in every frame so the recursion has a real footprint.
const FRAME_PAD: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackReport {
    pub depth: u64,
    pub frames: u64,
    /// Distance between the outermost and the innermost frame.
    pub stack_bytes: usize,
    /// Stack size requested for the probe thread, if any.
    pub stack_size: Option<usize>,
}

impl StackReport {
    pub fn bytes_per_frame(&self) -> usize {
        if self.frames == 0 {
            0
        } else {
            self.stack_bytes / self.frames as usize
        }
    }
}

fn stack_addr<T>(local: &T) -> usize {
    local as *const T as usize
}

#[inline(never)]
fn descend(depth: u64, deepest: &mut usize) -> u64 {
    let pad = black_box([depth as u8; FRAME_PAD]);
    *deepest = (*deepest).min(stack_addr(&pad));
    if depth == 0 {
        return 0;
    }
    let below = descend(depth - 1, deepest);
    black_box(&pad);
    below + 1
}

/// Recurse `depth` frames on the current thread. Returns the number of
/// frames visited below the entry frame and the stack bytes they spanned.
pub fn recurse(depth: u64) -> (u64, usize) {
    let top = 0u8;
    let top = stack_addr(&black_box(top));
    let mut deepest = top;
    let frames = descend(depth, &mut deepest);
    (frames, top.saturating_sub(deepest))
}

/// Run [`recurse`] on a fresh thread with `stack_size` bytes of stack, or
/// the platform default when `None`.
pub fn probe(depth: u64, stack_size: Option<usize>) -> Result<StackReport, ProbeError> {
    let mut builder = thread::Builder::new().name("stack_probe".into());
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    let handle = builder
        .spawn(move || recurse(depth))
        .map_err(|_| ProbeError::StackProbe { depth })?;
    let (frames, stack_bytes) = handle
        .join()
        .map_err(|_| ProbeError::StackProbe { depth })?;
    debug!("depth {depth}: {frames} frames over {stack_bytes} bytes");
    Ok(StackReport {
        depth,
        frames,
        stack_bytes,
        stack_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_depth_visits_no_frames() {
        let (frames, _) = recurse(0);
        assert_eq!(frames, 0);
    }

    #[test]
    fn deeper_recursion_uses_more_stack() {
        let shallow = probe(16, Some(1 << 20)).unwrap();
        let deep = probe(512, Some(1 << 20)).unwrap();
        assert_eq!(shallow.frames, 16);
        assert_eq!(deep.frames, 512);
        assert!(deep.stack_bytes > shallow.stack_bytes);
        assert!(deep.bytes_per_frame() >= FRAME_PAD);
    }

    #[test]
    fn report_keeps_requested_stack_size() {
        let report = probe(8, Some(256 * 1024)).unwrap();
        assert_eq!(report.stack_size, Some(256 * 1024));
        assert_eq!(report.depth, 8);
    }
}
