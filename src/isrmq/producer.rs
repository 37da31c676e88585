// CLASSIFICATION: COMMUNITY
// Filename: producer.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Interrupt-context producer feeding the ISR queue.

use std::sync::Arc;

use log::trace;

use super::state::SharedState;
use super::MSG_SIZE;
use crate::platform::irq::{self, Irq, IrqHandler, IrqStatus};
use crate::platform::MqHandle;

/// ISR that enqueues the running "sent" count on every interrupt.
pub struct IsrProducer {
    queue: MqHandle,
    state: Arc<SharedState>,
    truncate: bool,
    discard: bool,
}

impl IsrProducer {
    pub fn new(queue: MqHandle, state: Arc<SharedState>) -> Self {
        Self {
            queue,
            state,
            truncate: false,
            discard: false,
        }
    }

    /// Enqueue half-size messages. Used to provoke a protocol violation in
    /// the relay.
    pub fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Acknowledge interrupts without enqueueing anything.
    pub fn discarding(mut self) -> Self {
        self.discard = true;
        self
    }
}

impl IrqHandler for IsrProducer {
    fn handle(&self, irq: Irq) -> IrqStatus {
        if let Err(e) = irq::clear(irq) {
            trace!("isr ack failed: {e}");
        }

        if self.discard {
            self.state.record_ipi_rcvd();
            return IrqStatus::Handled;
        }

        let seq = self.state.next_sequence().to_le_bytes();
        let payload = if self.truncate {
            &seq[..MSG_SIZE / 2]
        } else {
            &seq[..]
        };
        match self.queue.try_send(payload, 0) {
            Ok(()) => self.state.record_sent(),
            Err(e) => trace!("isr drop on {irq}: {e}"),
        }

        self.state.record_ipi_rcvd();
        IrqStatus::Handled
    }
}
