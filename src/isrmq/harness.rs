// CLASSIFICATION: COMMUNITY
// Filename: harness.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Orchestration of the ISR message-queue test.
//!
//! Setup runs as a linear sequence of stages. Every resource acquired along
//! the way is parked in [`Resources`]; teardown releases whatever is there
//! in reverse order of acquisition, so a failure at any stage unwinds
//! exactly what was set up and nothing else.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::producer::IsrProducer;
use super::relay;
use super::report::{TestReport, Verdict};
use super::state::SharedState;
use super::trigger::TriggerDriver;
use super::MSG_SIZE;
use crate::config::{FaultInjection, HarnessConfig, NAME_RELAY};
use crate::error::ProbeError;
use crate::platform::irq;
use crate::platform::kthread::{self, TaskState};
use crate::platform::mqueue::{self, MqAttr, MqError, MqHandle, OpenFlags};
use crate::platform::{IrqRegistration, KThread};

/// Harness progress, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    CreateQueues,
    StartRelay,
    AttachInterrupt,
    StartTrigger,
    Consume,
    DetachInterrupt,
    JoinTrigger,
    Teardown,
    Report,
}

/// Resources held by a run, in order of acquisition.
struct Resources {
    state: Arc<SharedState>,
    isr_queue: Option<MqHandle>,
    app_queue: Option<MqHandle>,
    relay: Option<KThread>,
    registration: Option<IrqRegistration>,
    trigger: Option<JoinHandle<u32>>,
}

/// What teardown found when it collected the relay.
#[derive(Debug, Default, Clone, Copy)]
struct RelayExit {
    code: Option<i32>,
    deleted: bool,
}

impl Resources {
    fn new(state: Arc<SharedState>) -> Self {
        Self {
            state,
            isr_queue: None,
            app_queue: None,
            relay: None,
            registration: None,
            trigger: None,
        }
    }

    fn detach_interrupt(&mut self) {
        if let Some(reg) = self.registration.take() {
            debug!("detaching ISR from {}", reg.irq());
            reg.release();
        }
    }

    fn join_trigger(&mut self) -> Option<u32> {
        let trigger = self.trigger.take()?;
        // The trigger may still be throttled on messages that will never
        // arrive; release it before joining.
        if !self.state.trigger_done() {
            self.state.abort();
        }
        println!("isrmq_test: joining trigger thread");
        match trigger.join() {
            Ok(issued) => Some(issued),
            Err(_) => {
                error!("trigger thread panicked");
                None
            }
        }
    }

    fn collect_relay(&mut self, grace: Duration) -> RelayExit {
        let Some(relay) = self.relay.take() else {
            return RelayExit::default();
        };
        if self.state.relay_done() || relay.is_finished() || relay.wait_exit(grace).is_some() {
            let pid = relay.pid();
            let code = relay.join().ok();
            if let Ok(Some(task)) = kthread::reap(pid) {
                debug!("reaped {} pid={pid} exit={:?}", task.name, task.exit_code);
            }
            return RelayExit {
                code,
                deleted: false,
            };
        }
        if let Ok(table) = kthread::tasks() {
            for t in table.iter().filter(|t| t.state == TaskState::Running) {
                info!("task {} {:?} prio={} stack={}", t.pid, t.name, t.priority, t.stack_size);
            }
        }
        println!("deleting {} {}", relay.name(), relay.pid());
        relay.delete();
        RelayExit {
            code: None,
            deleted: true,
        }
    }

    fn close_queue(queue: Option<MqHandle>) {
        let Some(queue) = queue else {
            return;
        };
        let name = queue.name().to_string();
        queue.close();
        if let Err(e) = mqueue::unlink(&name) {
            warn!("unlink {name:?}: {e}");
        }
    }

    /// Release everything still held, newest first. Safe to call repeatedly.
    fn teardown(&mut self, grace: Duration) -> RelayExit {
        self.detach_interrupt();
        self.join_trigger();
        let relay = self.collect_relay(grace);
        Self::close_queue(self.app_queue.take());
        Self::close_queue(self.isr_queue.take());
        relay
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.state.abort();
        self.teardown(Duration::ZERO);
    }
}

/// The ISR message-queue test.
pub struct IsrmqTest {
    config: HarnessConfig,
    state: Arc<SharedState>,
    stage: Stage,
    out_of_order: u32,
}

impl IsrmqTest {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: Arc::new(SharedState::new()),
            stage: Stage::Init,
            out_of_order: 0,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    fn enter(&mut self, stage: Stage) {
        debug!("isrmq_test: {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Run `attempts` interrupt/message round trips and report.
    pub fn run(&mut self, attempts: u32) -> TestReport {
        self.state = Arc::new(SharedState::new());
        self.stage = Stage::Init;
        self.out_of_order = 0;

        let mut res = Resources::new(self.state.clone());
        let outcome = self.drive(attempts, &mut res);
        let reached = self.stage;

        self.enter(Stage::Teardown);
        let relay = res.teardown(self.config.poll_interval);

        self.enter(Stage::Report);
        let counters = self.state.snapshot();
        println!(
            "isrmq_test: ipi sets={}, rcvd={}",
            counters.ipi_sets, counters.ipi_rcvd
        );
        println!(
            "isrmq_test: msg sent={}, rcvd={}",
            counters.msg_sent, counters.msg_rcvd
        );

        let error = match outcome {
            Err(e) => Some(e),
            Ok(()) => match relay.code {
                Some(code) if code != 0 => Some(ProbeError::Relay {
                    code,
                    remaining: self.state.relay_remaining(),
                }),
                _ if !counters.consistent() => Some(ProbeError::Mismatch(counters)),
                _ => None,
            },
        };
        let verdict = if error.is_none() {
            Verdict::Passed
        } else {
            Verdict::Failed
        };
        println!("isrmq_test: {verdict}");
        if let Some(e) = &error {
            info!("isrmq_test failed at {reached:?}: {e}");
        }

        TestReport {
            attempts,
            counters,
            verdict,
            error,
            stage_reached: reached,
            relay_exit: relay.code,
            relay_deleted: relay.deleted,
            max_in_flight: self.state.max_in_flight(),
            out_of_order: self.out_of_order,
        }
    }

    fn drive(&mut self, attempts: u32, res: &mut Resources) -> Result<(), ProbeError> {
        let cfg = self.config.clone();
        cfg.validate()?;

        self.enter(Stage::CreateQueues);
        let attr = MqAttr::new(cfg.queue_len, MSG_SIZE);
        let isrq = create_queue(&cfg.isr_queue, attr)?;
        let relay_in = isrq.dup();
        let producer_out = isrq.dup();
        res.isr_queue = Some(isrq);

        let appq = create_queue(&cfg.app_queue, attr)?;
        let relay_out = appq.dup();
        let consumer = appq.dup();
        res.app_queue = Some(appq);

        self.enter(Stage::StartRelay);
        let relay_count = match cfg.fault {
            FaultInjection::RelayLimit(limit) => limit.min(attempts),
            _ => attempts,
        };
        let kthread = relay::spawn(
            NAME_RELAY,
            relay_in,
            relay_out,
            relay_count,
            self.state.clone(),
            cfg.relay_priority,
            cfg.stack_size,
        )
        .map_err(|e| {
            println!("Failed to create kthread: {e}");
            ProbeError::RelaySpawn(e)
        })?;
        res.relay = Some(kthread);

        self.enter(Stage::AttachInterrupt);
        let mut producer = IsrProducer::new(producer_out, self.state.clone());
        match cfg.fault {
            FaultInjection::ShortMessages => producer = producer.truncating(),
            FaultInjection::LostMessages => producer = producer.discarding(),
            _ => {}
        }
        let attach = |e| {
            println!("Failed to attach ISR");
            ProbeError::IrqAttach { irq: cfg.irq, source: e }
        };
        let registration = IrqRegistration::install(cfg.irq, Arc::new(producer)).map_err(attach)?;
        res.registration = Some(registration);
        irq::enable(cfg.irq).map_err(attach)?;

        self.enter(Stage::StartTrigger);
        let mut driver = TriggerDriver::new(self.state.clone(), cfg.irq, attempts, cfg.queue_len);
        if !cfg.throttled() {
            driver = driver.unthrottled();
        }
        let trigger = driver
            .spawn(cfg.trigger_priority(), cfg.stack_size)
            .map_err(|e| {
                println!("isrmq_test: ERROR trigger spawn failed; {e}");
                ProbeError::TriggerSpawn(e)
            })?;
        res.trigger = Some(trigger);

        self.enter(Stage::Consume);
        self.state.signal_ready();
        let consumed = self.consume(&consumer, attempts);
        consumer.close();
        consumed?;

        self.enter(Stage::DetachInterrupt);
        res.detach_interrupt();

        self.enter(Stage::JoinTrigger);
        res.join_trigger();
        Ok(())
    }

    /// Receive up to `attempts` messages from the application queue.
    ///
    /// Each receive waits at most one poll interval. On a timeout the loop
    /// ends early once nothing further can arrive, and fails once no
    /// progress has been made for the configured stall limit.
    fn consume(&mut self, app: &MqHandle, attempts: u32) -> Result<(), ProbeError> {
        let mut buf = [0u8; MSG_SIZE];
        let mut last: Option<u32> = None;
        let mut idle = Duration::ZERO;
        let mut taken = 0;

        while taken < attempts {
            match app.receive_timeout(&mut buf, self.config.poll_interval) {
                Ok((len, _prio)) => {
                    taken += 1;
                    idle = Duration::ZERO;
                    self.accept(len, &buf, &mut last);
                }
                Err(MqError::TimedOut) => {
                    if self.state.pipeline_drained() {
                        // The last message may have landed after the
                        // timed-out receive gave up.
                        self.drain(app, attempts, &mut taken, &mut last)?;
                        info!(
                            "isrmq_test: pipeline drained after {taken} of {attempts} messages"
                        );
                        return Ok(());
                    }
                    idle += self.config.poll_interval;
                    if idle >= self.config.stall_limit {
                        return Err(ProbeError::Stalled {
                            received: self.state.msg_rcvd(),
                        });
                    }
                }
                Err(e) => return Err(ProbeError::Consume(e)),
            }
        }
        Ok(())
    }

    /// Take whatever is queued right now without waiting.
    fn drain(
        &mut self,
        app: &MqHandle,
        attempts: u32,
        taken: &mut u32,
        last: &mut Option<u32>,
    ) -> Result<(), ProbeError> {
        let mut buf = [0u8; MSG_SIZE];
        while *taken < attempts {
            match app.try_receive(&mut buf) {
                Ok((len, _prio)) => {
                    *taken += 1;
                    self.accept(len, &buf, last);
                }
                Err(MqError::WouldBlock) => break,
                Err(e) => return Err(ProbeError::Consume(e)),
            }
        }
        Ok(())
    }

    fn accept(&mut self, len: usize, buf: &[u8; MSG_SIZE], last: &mut Option<u32>) {
        if len != MSG_SIZE {
            return;
        }
        self.state.record_rcvd();
        let seq = u32::from_le_bytes(*buf);
        if last.is_some_and(|prev| seq < prev) {
            self.out_of_order += 1;
            warn!("out-of-order message {seq} after {last:?}");
        }
        *last = Some(seq);
    }
}

fn create_queue(name: &str, attr: MqAttr) -> Result<MqHandle, ProbeError> {
    mqueue::open(name, OpenFlags::RDWR | OpenFlags::CREATE, Some(attr)).map_err(|source| {
        println!("Failed to create {name} mqueue: {}", source.errno());
        ProbeError::QueueCreate {
            name: name.into(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_RELAY_SPAWN, EXIT_STALLED};
    use crate::platform::Irq;

    fn config(tag: &str, irq: u32) -> HarnessConfig {
        HarnessConfig {
            isr_queue: format!("{tag}-isr"),
            app_queue: format!("{tag}-app"),
            irq: Irq(irq),
            poll_interval: Duration::from_millis(20),
            stall_limit: Duration::from_secs(5),
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn teardown_of_empty_resources_is_a_no_op() {
        let mut res = Resources::new(Arc::new(SharedState::new()));
        let exit = res.teardown(Duration::ZERO);
        assert_eq!(exit.code, None);
        assert!(!exit.deleted);
        res.teardown(Duration::ZERO);
    }

    #[test]
    fn teardown_after_partial_setup_leaves_foreign_queues_alone() {
        // A queue with the app name exists but was not opened by this run.
        let foreign = mqueue::open(
            "partial-app",
            OpenFlags::RDWR | OpenFlags::CREATE,
            Some(MqAttr::new(1, MSG_SIZE)),
        )
        .unwrap();
        let mut res = Resources::new(Arc::new(SharedState::new()));
        res.isr_queue = Some(create_queue("partial-isr", MqAttr::new(1, MSG_SIZE)).unwrap());
        res.teardown(Duration::ZERO);
        assert!(!mqueue::exists("partial-isr").unwrap());
        assert!(mqueue::exists("partial-app").unwrap());
        foreign.close();
        mqueue::unlink("partial-app").unwrap();
    }

    #[test]
    fn zero_attempts_pass_trivially() {
        let mut test = IsrmqTest::new(config("h-zero", 6));
        let report = test.run(0);
        assert_eq!(report.verdict, Verdict::Passed);
        assert_eq!(report.counters, Default::default());
        assert_eq!(report.stage_reached, Stage::JoinTrigger);
        assert_eq!(report.exit_code(), 0);
        assert!(!mqueue::exists("h-zero-isr").unwrap());
        assert!(!mqueue::exists("h-zero-app").unwrap());
    }

    #[test]
    fn invalid_config_fails_before_any_queue_exists() {
        let cfg = HarnessConfig {
            queue_len: 0,
            ..config("h-invalid", 7)
        };
        let report = IsrmqTest::new(cfg).run(10);
        assert_eq!(report.verdict, Verdict::Failed);
        assert_eq!(report.stage_reached, Stage::Init);
        assert!(matches!(report.error, Some(ProbeError::Config(_))));
        assert!(!mqueue::exists("h-invalid-isr").unwrap());
    }

    #[test]
    fn silent_pipeline_hits_the_stall_limit() {
        let cfg = HarnessConfig {
            fault: FaultInjection::LostMessages,
            stall_limit: Duration::from_millis(200),
            ..config("h-stall", 5)
        };
        let mut test = IsrmqTest::new(cfg);
        let report = test.run(100);
        assert!(matches!(report.error, Some(ProbeError::Stalled { received: 0 })));
        assert_eq!(report.exit_code(), EXIT_STALLED);
        assert_eq!(report.stage_reached, Stage::Consume);
        assert!(report.relay_deleted);
        assert!(test.state().aborted());
        assert_eq!(test.state().msg_sent(), 0);
        assert!(!mqueue::exists("h-stall-isr").unwrap());
        assert!(!mqueue::exists("h-stall-app").unwrap());
        assert!(!irq::is_enabled(Irq(5)).unwrap());
    }

    #[test]
    fn relay_spawn_failure_unwinds_queues() {
        let cfg = HarnessConfig {
            stack_size: 1 << 50,
            ..config("h-spawn", 4)
        };
        let report = IsrmqTest::new(cfg).run(10);
        assert!(matches!(report.error, Some(ProbeError::RelaySpawn(_))));
        assert_eq!(report.exit_code(), EXIT_RELAY_SPAWN);
        assert_eq!(report.stage_reached, Stage::StartRelay);
        assert_eq!(report.relay_exit, None);
        assert!(!mqueue::exists("h-spawn-isr").unwrap());
        assert!(!mqueue::exists("h-spawn-app").unwrap());
    }

    #[test]
    fn drain_takes_messages_that_arrive_after_a_timeout() {
        let app = create_queue("h-drain", MqAttr::new(4, MSG_SIZE)).unwrap();
        app.try_send(&1u32.to_le_bytes(), 0).unwrap();
        app.try_send(&2u32.to_le_bytes(), 0).unwrap();
        app.try_send(&3u32.to_le_bytes(), 0).unwrap();
        let mut test = IsrmqTest::new(config("h-drain", 6));
        test.state().mark_relay_done(0);

        let mut taken = 0;
        let mut last = None;
        test.drain(&app, 2, &mut taken, &mut last).unwrap();
        assert_eq!(taken, 2);
        assert_eq!(last, Some(2));
        assert_eq!(test.state().msg_rcvd(), 2);
        assert_eq!(app.len().unwrap(), 1);

        assert!(test.consume(&app, 10).is_ok());
        assert_eq!(test.state().msg_rcvd(), 3);
        assert_eq!(test.config().isr_queue, "h-drain-isr");
        app.close();
        mqueue::unlink("h-drain").unwrap();
    }

    #[test]
    fn small_run_is_consistent() {
        let mut test = IsrmqTest::new(config("h-small", 8));
        let report = test.run(200);
        assert_eq!(report.verdict, Verdict::Passed, "{report:?}");
        assert_eq!(report.counters.msg_rcvd, 200);
        assert_eq!(report.relay_exit, Some(0));
        assert!(!report.relay_deleted);
        assert_eq!(report.out_of_order, 0);
        assert!(!irq::is_enabled(Irq(8)).unwrap());
    }
}
