// CLASSIFICATION: COMMUNITY
// Filename: mqueue.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Named bounded message queues.
//!
//! Queues live in a process-wide registry keyed by name and are reached
//! through [`MqHandle`]s returned by [`open`]. Messages are fixed-size
//! records tagged with a priority; higher priorities are delivered first
//! and equal priorities stay FIFO. [`MqHandle::try_send`] never waits and is
//! the only send allowed from interrupt context.
//!
//! Blocking sends and receives are cancellation points for kernel threads:
//! a deleted [`KThread`](super::kthread::KThread) parked in one of them
//! returns [`MqError::Canceled`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use log::{debug, info, trace};
use once_cell::sync::Lazy;
use thiserror::Error;

use super::kthread;

/// Largest message size a queue can be created with.
pub const MQ_MSG_MAX: usize = 64;

/// Exclusive upper bound on message priorities.
pub const MQ_PRIO_MAX: u32 = 32;

/// How often a parked sender or receiver re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(10);

bitflags! {
    /// Flags accepted by [`open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
        const RDWR = Self::READ.bits() | Self::WRITE.bits();
        const CREATE = 0x04;
        const EXCL = 0x08;
        const NONBLOCK = 0x10;
    }
}

/// Queue geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqAttr {
    /// Maximum number of queued messages.
    pub max_msgs: usize,
    /// Size of one message in bytes.
    pub msg_size: usize,
}

impl MqAttr {
    pub fn new(max_msgs: usize, msg_size: usize) -> Self {
        Self { max_msgs, msg_size }
    }

    fn validate(&self) -> Result<(), MqError> {
        if self.max_msgs == 0 || self.msg_size == 0 || self.msg_size > MQ_MSG_MAX {
            return Err(MqError::InvalidAttr(*self));
        }
        Ok(())
    }
}

/// Errors returned by queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MqError {
    #[error("invalid queue name")]
    InvalidName,
    #[error("invalid queue attributes {0:?}")]
    InvalidAttr(MqAttr),
    #[error("queue already exists")]
    Exists,
    #[error("queue does not exist")]
    NotFound,
    #[error("operation not permitted by open flags")]
    PermissionDenied,
    #[error("message of {len} bytes exceeds queue message size {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("receive buffer of {len} bytes is smaller than message size {need}")]
    BufferTooSmall { len: usize, need: usize },
    #[error("priority {0} out of range")]
    InvalidPriority(u32),
    #[error("queue full")]
    WouldBlock,
    #[error("timed out")]
    TimedOut,
    #[error("canceled")]
    Canceled,
    #[error("queue lock poisoned")]
    LockPoisoned,
}

impl MqError {
    /// Negated errno the equivalent POSIX call would report.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidName | Self::InvalidAttr(_) | Self::InvalidPriority(_) => -22,
            Self::Exists => -17,
            Self::NotFound => -2,
            Self::PermissionDenied => -9,
            Self::MessageTooLong { .. } | Self::BufferTooSmall { .. } => -90,
            Self::WouldBlock => -11,
            Self::TimedOut => -110,
            Self::Canceled => -125,
            Self::LockPoisoned => -5,
        }
    }
}

#[derive(Debug)]
struct Message {
    prio: u32,
    payload: heapless::Vec<u8, MQ_MSG_MAX>,
}

struct Queue {
    name: String,
    attr: MqAttr,
    messages: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl Queue {
    fn new(name: &str, attr: MqAttr) -> Self {
        Self {
            name: name.into(),
            attr,
            messages: Mutex::new(VecDeque::with_capacity(attr.max_msgs)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Message>>, MqError> {
        self.messages.lock().map_err(|_| MqError::LockPoisoned)
    }

    /// Park on `cv` for at most one cancellation tick or until `deadline`.
    fn park<'a>(
        &self,
        cv: &Condvar,
        guard: MutexGuard<'a, VecDeque<Message>>,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'a, VecDeque<Message>>, MqError> {
        if kthread::cancel_requested() {
            return Err(MqError::Canceled);
        }
        let tick = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(MqError::TimedOut);
                }
                (deadline - now).min(CANCEL_POLL)
            }
            None => CANCEL_POLL,
        };
        let (guard, _) = cv
            .wait_timeout(guard, tick)
            .map_err(|_| MqError::LockPoisoned)?;
        Ok(guard)
    }

    fn enqueue(&self, messages: &mut VecDeque<Message>, data: &[u8], prio: u32) {
        let mut payload = heapless::Vec::new();
        // Length was checked against msg_size, which is at most MQ_MSG_MAX.
        let _ = payload.extend_from_slice(data);
        let at = messages
            .iter()
            .position(|m| m.prio < prio)
            .unwrap_or(messages.len());
        messages.insert(at, Message { prio, payload });
        self.not_empty.notify_one();
    }

    fn dequeue(&self, messages: &mut VecDeque<Message>, buf: &mut [u8]) -> Option<(usize, u32)> {
        let msg = messages.pop_front()?;
        let len = msg.payload.len();
        buf[..len].copy_from_slice(&msg.payload);
        self.not_full.notify_one();
        Some((len, msg.prio))
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, Arc<Queue>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Open (and with [`OpenFlags::CREATE`], create) the queue called `name`.
///
/// `attr` is only consulted when a new queue is created; creating without
/// attributes is rejected.
pub fn open(name: &str, flags: OpenFlags, attr: Option<MqAttr>) -> Result<MqHandle, MqError> {
    if name.is_empty() || name.contains('/') {
        return Err(MqError::InvalidName);
    }
    let mut registry = REGISTRY.lock().map_err(|_| MqError::LockPoisoned)?;
    let queue = match registry.get(name) {
        Some(_) if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) => {
            return Err(MqError::Exists)
        }
        Some(queue) => queue.clone(),
        None if flags.contains(OpenFlags::CREATE) => {
            let attr = attr.ok_or(MqError::InvalidAttr(MqAttr::new(0, 0)))?;
            attr.validate()?;
            let queue = Arc::new(Queue::new(name, attr));
            registry.insert(name.into(), queue.clone());
            info!(
                "mqueue {name:?} created: {} x {} bytes",
                attr.max_msgs, attr.msg_size
            );
            queue
        }
        None => return Err(MqError::NotFound),
    };
    Ok(MqHandle { queue, flags })
}

/// Remove `name` from the registry. Open handles stay usable; storage is
/// released once the last one is closed.
pub fn unlink(name: &str) -> Result<(), MqError> {
    REGISTRY
        .lock()
        .map_err(|_| MqError::LockPoisoned)?
        .remove(name)
        .map(|_| debug!("mqueue {name:?} unlinked"))
        .ok_or(MqError::NotFound)
}

/// Whether a queue called `name` is currently linked.
pub fn exists(name: &str) -> Result<bool, MqError> {
    Ok(REGISTRY
        .lock()
        .map_err(|_| MqError::LockPoisoned)?
        .contains_key(name))
}

/// Open descriptor on a queue.
pub struct MqHandle {
    queue: Arc<Queue>,
    flags: OpenFlags,
}

impl MqHandle {
    pub fn name(&self) -> &str {
        &self.queue.name
    }

    pub fn attr(&self) -> MqAttr {
        self.queue.attr
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> Result<usize, MqError> {
        Ok(self.queue.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MqError> {
        Ok(self.len()? == 0)
    }

    /// Duplicate the descriptor, e.g. to move it into another thread.
    pub fn dup(&self) -> MqHandle {
        MqHandle {
            queue: self.queue.clone(),
            flags: self.flags,
        }
    }

    /// Close the descriptor.
    pub fn close(self) {
        trace!("mqueue {:?} descriptor closed", self.queue.name);
    }

    fn check_send(&self, data: &[u8], prio: u32) -> Result<(), MqError> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(MqError::PermissionDenied);
        }
        if data.len() > self.queue.attr.msg_size {
            return Err(MqError::MessageTooLong {
                len: data.len(),
                max: self.queue.attr.msg_size,
            });
        }
        if prio >= MQ_PRIO_MAX {
            return Err(MqError::InvalidPriority(prio));
        }
        Ok(())
    }

    fn check_receive(&self, buf: &[u8]) -> Result<(), MqError> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(MqError::PermissionDenied);
        }
        if buf.len() < self.queue.attr.msg_size {
            return Err(MqError::BufferTooSmall {
                len: buf.len(),
                need: self.queue.attr.msg_size,
            });
        }
        Ok(())
    }

    /// Enqueue without waiting. Safe to call from an interrupt handler.
    pub fn try_send(&self, data: &[u8], prio: u32) -> Result<(), MqError> {
        self.check_send(data, prio)?;
        let mut messages = self.queue.lock()?;
        if messages.len() >= self.queue.attr.max_msgs {
            return Err(MqError::WouldBlock);
        }
        self.queue.enqueue(&mut messages, data, prio);
        Ok(())
    }

    /// Enqueue, waiting for space unless the handle was opened
    /// [`OpenFlags::NONBLOCK`].
    pub fn send(&self, data: &[u8], prio: u32) -> Result<(), MqError> {
        self.send_until(data, prio, None)
    }

    pub fn send_timeout(&self, data: &[u8], prio: u32, timeout: Duration) -> Result<(), MqError> {
        self.send_until(data, prio, Some(Instant::now() + timeout))
    }

    fn send_until(&self, data: &[u8], prio: u32, deadline: Option<Instant>) -> Result<(), MqError> {
        if self.flags.contains(OpenFlags::NONBLOCK) {
            return self.try_send(data, prio);
        }
        self.check_send(data, prio)?;
        let mut messages = self.queue.lock()?;
        while messages.len() >= self.queue.attr.max_msgs {
            messages = self.queue.park(&self.queue.not_full, messages, deadline)?;
        }
        self.queue.enqueue(&mut messages, data, prio);
        Ok(())
    }

    /// Dequeue without waiting.
    pub fn try_receive(&self, buf: &mut [u8]) -> Result<(usize, u32), MqError> {
        self.check_receive(buf)?;
        let mut messages = self.queue.lock()?;
        self.queue
            .dequeue(&mut messages, buf)
            .ok_or(MqError::WouldBlock)
    }

    /// Dequeue the highest-priority message into `buf`, returning the
    /// number of bytes written and the message priority. Waits for a
    /// message unless the handle was opened [`OpenFlags::NONBLOCK`].
    pub fn receive(&self, buf: &mut [u8]) -> Result<(usize, u32), MqError> {
        self.receive_until(buf, None)
    }

    pub fn receive_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, u32), MqError> {
        self.receive_until(buf, Some(Instant::now() + timeout))
    }

    fn receive_until(&self, buf: &mut [u8], deadline: Option<Instant>) -> Result<(usize, u32), MqError> {
        if self.flags.contains(OpenFlags::NONBLOCK) {
            return self.try_receive(buf);
        }
        self.check_receive(buf)?;
        let mut messages = self.queue.lock()?;
        loop {
            if let Some(received) = self.queue.dequeue(&mut messages, buf) {
                return Ok(received);
            }
            messages = self.queue.park(&self.queue.not_empty, messages, deadline)?;
        }
    }
}
