// CLASSIFICATION: COMMUNITY
// Filename: kthread.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Kernel worker threads with a task table.
//!
//! Tasks are named, carry a scheduling priority and an explicit stack size
//! and can be joined or deleted. Deletion is abrupt from the caller's point
//! of view: the handle is released at once and the task is torn out of the
//! next blocking queue call it makes (see [`cancel_requested`]). The host
//! scheduler does not honour priorities; they are recorded in the task
//! table and logged.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Priority of system workers such as the ISR relay.
pub const PRIO_SYSTEM: u8 = 253;

#[derive(Debug, Error)]
pub enum KThreadError {
    #[error("failed to spawn kthread {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("kthread {0:?} panicked")]
    Panicked(String),
    #[error("task table lock poisoned")]
    LockPoisoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Exited,
    Deleted,
}

/// Task table entry.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub pid: u32,
    pub name: String,
    pub priority: u8,
    pub stack_size: usize,
    pub state: TaskState,
    pub exit_code: Option<i32>,
}

static TASKS: Lazy<Mutex<Vec<TaskInfo>>> = Lazy::new(|| Mutex::new(Vec::new()));
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CANCEL: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Whether the calling kthread has been deleted. Always false on threads
/// not started through [`KThread::spawn`].
pub fn cancel_requested() -> bool {
    CANCEL.with(|c| {
        c.borrow()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    })
}

/// Snapshot of the task table.
pub fn tasks() -> Result<Vec<TaskInfo>, KThreadError> {
    Ok(TASKS
        .lock()
        .map_err(|_| KThreadError::LockPoisoned)?
        .clone())
}

/// Look up one task by pid.
pub fn task(pid: u32) -> Result<Option<TaskInfo>, KThreadError> {
    Ok(TASKS
        .lock()
        .map_err(|_| KThreadError::LockPoisoned)?
        .iter()
        .find(|t| t.pid == pid)
        .cloned())
}

/// Remove the entry of task `pid` once it is no longer running and return
/// it. A running or unknown task is left alone.
pub fn reap(pid: u32) -> Result<Option<TaskInfo>, KThreadError> {
    let mut table = TASKS.lock().map_err(|_| KThreadError::LockPoisoned)?;
    let Some(at) = table
        .iter()
        .position(|t| t.pid == pid && t.state != TaskState::Running)
    else {
        return Ok(None);
    };
    Ok(Some(table.remove(at)))
}

fn update(pid: u32, f: impl FnOnce(&mut TaskInfo)) {
    if let Ok(mut table) = TASKS.lock() {
        if let Some(t) = table.iter_mut().find(|t| t.pid == pid) {
            f(t);
        }
    }
}

#[derive(Default)]
struct ExitSlot {
    code: Mutex<Option<i32>>,
    cv: Condvar,
}

impl ExitSlot {
    fn post(&self, code: i32) {
        if let Ok(mut slot) = self.code.lock() {
            *slot = Some(code);
            self.cv.notify_all();
        }
    }

    fn wait(&self, timeout: Duration) -> Option<i32> {
        let slot = self.code.lock().ok()?;
        let (slot, _) = self
            .cv
            .wait_timeout_while(slot, timeout, |code| code.is_none())
            .ok()?;
        *slot
    }
}

/// Handle on a running kernel thread.
pub struct KThread {
    pid: u32,
    name: String,
    cancel: Arc<AtomicBool>,
    exit: Arc<ExitSlot>,
    handle: JoinHandle<i32>,
}

impl KThread {
    /// Start `entry` as a kernel thread. The value returned by `entry` is
    /// the task's exit code.
    pub fn spawn<F>(name: &str, priority: u8, stack_size: usize, entry: F) -> Result<Self, KThreadError>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        let exit = Arc::new(ExitSlot::default());

        TASKS
            .lock()
            .map_err(|_| KThreadError::LockPoisoned)?
            .push(TaskInfo {
                pid,
                name: name.into(),
                priority,
                stack_size,
                state: TaskState::Running,
                exit_code: None,
            });

        let task_cancel = cancel.clone();
        let task_exit = exit.clone();
        let spawned = thread::Builder::new()
            .name(name.into())
            .stack_size(stack_size)
            .spawn(move || {
                CANCEL.with(|c| *c.borrow_mut() = Some(task_cancel));
                let code = entry();
                update(pid, |t| {
                    if t.state == TaskState::Running {
                        t.state = TaskState::Exited;
                    }
                    t.exit_code = Some(code);
                });
                task_exit.post(code);
                code
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                if let Ok(mut table) = TASKS.lock() {
                    table.retain(|t| t.pid != pid);
                }
                return Err(KThreadError::Spawn {
                    name: name.into(),
                    source,
                });
            }
        };
        info!("kthread {name:?} pid={pid} prio={priority} stack={stack_size}");
        Ok(Self {
            pid,
            name: name.into(),
            cancel,
            exit,
            handle,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the entry function has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the task to return, yielding its exit code.
    pub fn wait_exit(&self, timeout: Duration) -> Option<i32> {
        self.exit.wait(timeout)
    }

    /// Wait for the task and collect its exit code.
    pub fn join(self) -> Result<i32, KThreadError> {
        let code = self
            .handle
            .join()
            .map_err(|_| KThreadError::Panicked(self.name.clone()))?;
        debug!("kthread {:?} joined with {code}", self.name);
        Ok(code)
    }

    /// Forcibly delete the task.
    ///
    /// The handle is released without waiting; the task leaves at its next
    /// cancellation point.
    pub fn delete(self) {
        self.cancel.store(true, Ordering::Release);
        update(self.pid, |t| t.state = TaskState::Deleted);
        warn!("kthread {:?} pid={} deleted", self.name, self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mqueue::{self, MqAttr, MqError, OpenFlags};

    #[test]
    fn join_returns_exit_code_and_updates_table() {
        let t = KThread::spawn("kt-join", 10, 64 * 1024, || 7).unwrap();
        let pid = t.pid();
        assert_eq!(t.join().unwrap(), 7);
        let info = task(pid).unwrap().unwrap();
        assert_eq!(info.state, TaskState::Exited);
        assert_eq!(info.exit_code, Some(7));
        assert_eq!(info.priority, 10);
    }

    #[test]
    fn task_listing_shows_running_task() {
        let (go, wait) = std::sync::mpsc::channel::<()>();
        let t = KThread::spawn("kt-list", 42, 128 * 1024, move || {
            let _ = wait.recv();
            0
        })
        .unwrap();
        let pid = t.pid();
        let listed = tasks().unwrap().into_iter().find(|t| t.pid == pid).unwrap();
        assert_eq!(listed.name, "kt-list");
        assert_eq!(listed.priority, 42);
        assert_eq!(listed.stack_size, 128 * 1024);
        assert_eq!(listed.state, TaskState::Running);
        assert!(!t.is_finished());
        assert_eq!(reap(pid).unwrap().map(|t| t.pid), None);

        go.send(()).unwrap();
        assert_eq!(t.wait_exit(Duration::from_secs(5)), Some(0));
        t.join().unwrap();
        let reaped = reap(pid).unwrap().unwrap();
        assert_eq!(reaped.state, TaskState::Exited);
        assert_eq!(reaped.exit_code, Some(0));
        assert!(task(pid).unwrap().is_none());
    }

    #[test]
    fn panicking_entry_is_reported() {
        let t = KThread::spawn("kt-panic", 10, 64 * 1024, || panic!("boom")).unwrap();
        assert!(matches!(t.join(), Err(KThreadError::Panicked(_))));
    }

    #[test]
    fn wait_exit_times_out_on_blocked_task() {
        let q = mqueue::open(
            "kt-wait",
            OpenFlags::RDWR | OpenFlags::CREATE,
            Some(MqAttr::new(1, 4)),
        )
        .unwrap();
        let rx = q.dup();
        let t = KThread::spawn("kt-wait", PRIO_SYSTEM, 64 * 1024, move || {
            let mut buf = [0u8; 4];
            match rx.receive(&mut buf) {
                Ok(_) => 0,
                Err(e) => e.errno(),
            }
        })
        .unwrap();
        assert_eq!(t.wait_exit(Duration::from_millis(30)), None);
        q.send(&[0; 4], 0).unwrap();
        assert_eq!(t.wait_exit(Duration::from_secs(5)), Some(0));
        t.join().unwrap();
        mqueue::unlink("kt-wait").unwrap();
    }

    #[test]
    fn delete_cancels_blocking_receive() {
        let q = mqueue::open(
            "kt-delete",
            OpenFlags::RDWR | OpenFlags::CREATE,
            Some(MqAttr::new(1, 4)),
        )
        .unwrap();
        let rx = q.dup();
        let (tx_result, rx_result) = std::sync::mpsc::channel();
        let t = KThread::spawn("kt-delete", PRIO_SYSTEM, 64 * 1024, move || {
            let mut buf = [0u8; 4];
            let r = rx.receive(&mut buf);
            let _ = tx_result.send(r);
            -1
        })
        .unwrap();
        let pid = t.pid();
        t.delete();
        let r = rx_result.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(r, Err(MqError::Canceled));
        assert_eq!(task(pid).unwrap().unwrap().state, TaskState::Deleted);
        assert!(!cancel_requested());
        mqueue::unlink("kt-delete").unwrap();
    }
}
