// CLASSIFICATION: COMMUNITY
// Filename: irq.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Interrupt vector table and software dispatcher.
//!
//! Each line carries a pending bit, an enable bit and a handler slot. A line
//! raised while enabled is dispatched synchronously on the raising thread
//! with the line masked, the way a self-targeted IPI behaves on a single
//! hart: the handler runs to completion before `raise` returns. A line
//! raised while disabled stays pending until it is enabled again.
//!
//! Handlers carry their own context (queue handles, counters) instead of an
//! untyped argument pointer.

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Number of interrupt lines in the vector table.
pub const NR_IRQS: usize = 16;

/// Software interrupt line driven by the ISR message queue test.
pub const IRQ_SOFT: Irq = Irq(1);

/// Upper bound on back-to-back services of one line inside a single
/// dispatch. A handler that never clears its source trips this bound and
/// the line is disabled.
const MAX_REENTRY: u32 = 64;

/// Interrupt line number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Irq(pub u32);

impl fmt::Display for Irq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "irq{}", self.0)
    }
}

/// Status returned by a handler to the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqStatus {
    /// The handler serviced the interrupt.
    Handled,
    /// The interrupt was not meant for this handler.
    Unhandled,
}

/// Errors surfaced by the vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IrqError {
    #[error("interrupt line {0} out of range")]
    InvalidLine(Irq),
}

/// Interrupt service routine.
///
/// Implementations run in interrupt context: they must not block, sleep or
/// wait on another thread.
pub trait IrqHandler: Send + Sync {
    fn handle(&self, irq: Irq) -> IrqStatus;
}

/// Shared reference to an installed handler.
pub type HandlerRef = Arc<dyn IrqHandler>;

/// Handler installed on every line at boot. Counts the interrupt as
/// spurious and acknowledges it so the line does not storm.
struct SpuriousHandler;

impl IrqHandler for SpuriousHandler {
    fn handle(&self, irq: Irq) -> IrqStatus {
        if let Ok(line) = line(irq) {
            line.pending.store(false, Ordering::Release);
            line.spurious.fetch_add(1, Ordering::Relaxed);
        }
        warn!("unexpected interrupt on {irq}");
        IrqStatus::Unhandled
    }
}

static SPURIOUS: Lazy<HandlerRef> = Lazy::new(|| Arc::new(SpuriousHandler));

/// Return the boot-time handler that reports spurious interrupts.
pub fn default_handler() -> HandlerRef {
    SPURIOUS.clone()
}

/// Per-line dispatch statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrqStats {
    pub raised: u64,
    pub dispatched: u64,
    pub spurious: u64,
}

struct IrqLine {
    handler: spin::Mutex<HandlerRef>,
    enabled: AtomicBool,
    pending: AtomicBool,
    in_service: AtomicBool,
    raised: AtomicU64,
    dispatched: AtomicU64,
    spurious: AtomicU64,
}

impl IrqLine {
    fn new() -> Self {
        Self {
            handler: spin::Mutex::new(default_handler()),
            enabled: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            in_service: AtomicBool::new(false),
            raised: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            spurious: AtomicU64::new(0),
        }
    }
}

static VECTORS: Lazy<[IrqLine; NR_IRQS]> = Lazy::new(|| std::array::from_fn(|_| IrqLine::new()));

fn line(irq: Irq) -> Result<&'static IrqLine, IrqError> {
    VECTORS
        .get(irq.0 as usize)
        .ok_or(IrqError::InvalidLine(irq))
}

/// Install `handler` on `irq`, returning the handler it replaces.
///
/// The line keeps its enable state. An invocation of the previous handler
/// that is already in flight may still complete; use [`synchronize`] to
/// wait for it.
pub fn attach(irq: Irq, handler: HandlerRef) -> Result<HandlerRef, IrqError> {
    let line = line(irq)?;
    let previous = core::mem::replace(&mut *line.handler.lock(), handler);
    debug!("handler attached to {irq}");
    Ok(previous)
}

/// Unmask `irq`. A pending interrupt is delivered immediately.
pub fn enable(irq: Irq) -> Result<(), IrqError> {
    let line = line(irq)?;
    line.enabled.store(true, Ordering::Release);
    trace!("{irq} enabled");
    dispatch(irq, line);
    Ok(())
}

/// Mask `irq`. Raises while masked stay pending.
pub fn disable(irq: Irq) -> Result<(), IrqError> {
    line(irq)?.enabled.store(false, Ordering::Release);
    trace!("{irq} disabled");
    Ok(())
}

/// Assert the interrupt source.
pub fn raise(irq: Irq) -> Result<(), IrqError> {
    let line = line(irq)?;
    line.raised.fetch_add(1, Ordering::Relaxed);
    line.pending.store(true, Ordering::Release);
    dispatch(irq, line);
    Ok(())
}

/// Acknowledge the interrupt source. Handlers call this first.
pub fn clear(irq: Irq) -> Result<(), IrqError> {
    line(irq)?.pending.store(false, Ordering::Release);
    Ok(())
}

/// Whether `irq` is asserted and not yet acknowledged.
pub fn is_pending(irq: Irq) -> Result<bool, IrqError> {
    Ok(line(irq)?.pending.load(Ordering::Acquire))
}

/// Whether `irq` is unmasked.
pub fn is_enabled(irq: Irq) -> Result<bool, IrqError> {
    Ok(line(irq)?.enabled.load(Ordering::Acquire))
}

/// Wait until no handler invocation is running on `irq`.
pub fn synchronize(irq: Irq) -> Result<(), IrqError> {
    let line = line(irq)?;
    while line.in_service.load(Ordering::Acquire) {
        thread::yield_now();
    }
    Ok(())
}

/// Snapshot the dispatch statistics for `irq`.
pub fn stats(irq: Irq) -> Result<IrqStats, IrqError> {
    let line = line(irq)?;
    Ok(IrqStats {
        raised: line.raised.load(Ordering::Relaxed),
        dispatched: line.dispatched.load(Ordering::Relaxed),
        spurious: line.spurious.load(Ordering::Relaxed),
    })
}

fn dispatch(irq: Irq, line: &IrqLine) {
    let mut serviced = 0;
    loop {
        if !line.enabled.load(Ordering::Acquire) || !line.pending.load(Ordering::Acquire) {
            return;
        }
        // Masked while in service: a concurrent raise only leaves the
        // pending bit set and the current servicer picks it up below.
        if line
            .in_service
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if line.pending.load(Ordering::Acquire) {
            let handler = line.handler.lock().clone();
            handler.handle(irq);
            line.dispatched.fetch_add(1, Ordering::Relaxed);
            serviced += 1;
        }
        line.in_service.store(false, Ordering::Release);

        if serviced >= MAX_REENTRY && line.pending.load(Ordering::Acquire) {
            warn!("{irq} still pending after {serviced} services; masking line");
            line.enabled.store(false, Ordering::Release);
            return;
        }
    }
}

/// RAII registration of a handler on one line.
///
/// Dropping (or [`release`](Self::release)-ing) the registration masks the
/// line, re-installs the handler that was active before and waits for any
/// in-flight invocation to finish, so no late interrupt can reach state the
/// caller is about to free.
pub struct IrqRegistration {
    irq: Irq,
    previous: Option<HandlerRef>,
}

impl IrqRegistration {
    /// Install `handler` on `irq`. The line is left masked; call
    /// [`enable`] once the consumer side is ready.
    pub fn install(irq: Irq, handler: HandlerRef) -> Result<Self, IrqError> {
        disable(irq)?;
        let previous = attach(irq, handler)?;
        Ok(Self {
            irq,
            previous: Some(previous),
        })
    }

    pub fn irq(&self) -> Irq {
        self.irq
    }

    /// Detach now instead of at end of scope.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let restored = disable(self.irq)
            .and_then(|()| attach(self.irq, previous))
            .and_then(|_| synchronize(self.irq));
        match restored {
            Ok(()) => debug!("previous handler restored on {}", self.irq),
            Err(e) => warn!("restoring handler on {}: {e}", self.irq),
        }
    }
}

impl Drop for IrqRegistration {
    fn drop(&mut self) {
        self.restore();
    }
}
