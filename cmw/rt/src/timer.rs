//! Timer service: owns a timed-message queue and delivers due messages.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cmw_core::{RtError, RtResult, TaskId, Timestamp};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::RuntimeConfig;
use crate::fatal;
use crate::envelope::Envelope;
use crate::time::Clock;
use crate::timed::{TimedMessageId, TimedQueue};
use crate::transport::{Transport, TransportError};

const RETRY_DELAY: Duration = Duration::from_millis(1);

/// Operation id and timeout preceding the payload of a `TIMED_MESSAGE`
const TIMED_ENVELOPE_OVERHEAD: usize = 4 + 8;

struct TimerState {
    queue: TimedQueue,
    stopped: bool,
}

/// Delivers `TIMED_MESSAGE` envelopes to one task when their deadline
/// elapses.
///
/// [`run`](TimerService::run) blocks until the next deadline and is woken
/// early by [`schedule_at`](TimerService::schedule_at),
/// [`cancel`](TimerService::cancel) and [`stop`](TimerService::stop).
/// A message is removed from the queue only once the transport accepted it.
pub struct TimerService {
    target: TaskId,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    min_timeout: Duration,
    max_message_size: usize,
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerService {
    pub fn new(
        target: TaskId,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            target,
            transport,
            clock,
            min_timeout: config.min_timeout,
            max_message_size: config.max_message_size,
            state: Mutex::new(TimerState {
                queue: TimedQueue::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn target(&self) -> TaskId {
        self.target
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Schedules `payload` for delivery at `deadline`.
    ///
    /// Fails with `InvalidInParameter` when the resulting envelope would
    /// exceed the transport's message size limit.
    pub fn schedule_at(&self, payload: &[u8], deadline: Timestamp) -> RtResult<TimedMessageId> {
        let size = TIMED_ENVELOPE_OVERHEAD + payload.len();
        if size > self.max_message_size {
            log::error!(
                "timer {}: timed message of {size} bytes exceeds the {} byte limit",
                self.target,
                self.max_message_size
            );
            return Err(RtError::InvalidInParameter);
        }
        let id = self.state.lock().queue.add(payload, deadline);
        log::trace!("timer {}: scheduled {id:?} at {deadline}", self.target);
        self.wake.notify_all();
        Ok(id)
    }

    /// Schedules `payload` for delivery `delay` from now.
    pub fn schedule_after(&self, payload: &[u8], delay: Duration) -> RtResult<TimedMessageId> {
        self.schedule_at(payload, self.clock.now() + delay)
    }

    /// Cancels a pending message. Returns `false` if it was already
    /// delivered or cancelled.
    pub fn cancel(&self, id: TimedMessageId) -> bool {
        let removed = self.state.lock().queue.delete(id).is_some();
        if removed {
            self.wake.notify_all();
        }
        removed
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.state.lock().queue.next_deadline()
    }

    /// Makes [`run`](TimerService::run) return.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Delivers every message due now. Returns how many were delivered.
    ///
    /// A message the transport can never accept is dropped; on a full
    /// intake the message stays queued and the error is returned.
    pub fn fire_due(&self) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        self.deliver_due(&mut state)
    }

    fn deliver_due(&self, state: &mut MutexGuard<'_, TimerState>) -> Result<usize, TransportError> {
        let now = self.clock.now();
        let mut delivered = 0;
        loop {
            let Some(head) = state.queue.peek() else {
                break;
            };
            if head.deadline.saturating_duration_since(now) > self.min_timeout {
                break;
            }
            let id = head.id;
            let envelope = Envelope::TimedMessage {
                timeout: head.deadline,
                payload: head.payload.clone(),
            };
            let bytes = match envelope.to_bytes() {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::error!("timer {}: dropping unencodable message {id:?}: {err}", self.target);
                    state.queue.delete(id);
                    continue;
                }
            };

            match MutexGuard::unlocked(state, || self.transport.deliver(self.target, &bytes)) {
                Ok(()) => delivered += 1,
                Err(err) if is_transient(&err) => return Err(err),
                Err(TransportError::Closed) => return Err(TransportError::Closed),
                Err(err) => log::error!("timer {}: dropping {id:?}: {err}", self.target),
            }
            // may have been cancelled while unlocked
            state.queue.delete(id);
        }
        Ok(delivered)
    }

    /// Runs [`run`](TimerService::run) on a thread named `<task_name>-timer`.
    ///
    /// Failing to create the thread is fatal.
    pub fn spawn(self: &Arc<Self>, task_name: &str) -> JoinHandle<()> {
        let timer = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{task_name}-timer"))
            .spawn(move || {
                if let Err(err) = timer.run() {
                    log::error!("timer of {} failed: {err}", timer.target());
                }
            });
        match spawned {
            Ok(handle) => handle,
            Err(err) => fatal(format_args!(
                "cannot create timer thread for {}: {err}",
                self.target
            )),
        }
    }

    /// Dispatch loop. Returns after [`stop`](TimerService::stop) or when
    /// the target intake is closed.
    pub fn run(&self) -> RtResult<()> {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return Ok(());
            }
            match self.deliver_due(&mut state) {
                Ok(_) => {}
                Err(TransportError::Closed) => {
                    log::debug!("timer {}: target closed, stopping", self.target);
                    state.stopped = true;
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("timer {}: delivery failed, retrying: {err}", self.target);
                    self.wake.wait_for(&mut state, self.min_timeout.max(RETRY_DELAY));
                    continue;
                }
            }
            if state.stopped {
                return Ok(());
            }
            match state.queue.next_deadline() {
                None => self.wake.wait(&mut state),
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(self.clock.now());
                    self.wake.wait_for(&mut state, wait);
                }
            }
        }
    }
}

fn is_transient(err: &TransportError) -> bool {
    match err {
        TransportError::Full { .. } => true,
        TransportError::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
        ),
        _ => false,
    }
}
