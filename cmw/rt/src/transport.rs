//! Delivery of envelopes to task intakes.
//!
//! A [`Transport`] pushes serialized envelopes to the intake of a task; the
//! task drains its [`Intake`]. [`LocalTransport`] connects tasks of one
//! process through bounded in-memory queues.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cmw_core::{glue, RtError, TaskId};
use parking_lot::{Condvar, Mutex};

use crate::config::RuntimeConfig;

/// Delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no intake for {0}")]
    UnknownTask(TaskId),
    #[error("intake of {task} is full ({capacity} messages)")]
    Full { task: TaskId, capacity: usize },
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("intake closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for RtError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::TooLarge { .. } => RtError::InvalidInParameter,
            TransportError::UnknownTask(_) => RtError::InvalidInParameter,
            TransportError::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => RtError::Timeout,
            TransportError::Full { .. } | TransportError::Closed | TransportError::Io(_) => {
                RtError::Failure
            }
        }
    }
}

/// Sends serialized envelopes to task intakes.
pub trait Transport: Send + Sync {
    fn deliver(&self, task: TaskId, message: &[u8]) -> Result<(), TransportError>;
}

/// Receiving end of a task.
pub trait Intake: Send {
    /// Waits up to `timeout` (forever when `None`) for the next message.
    ///
    /// `Ok(None)` means the wait elapsed; [`TransportError::Closed`] means
    /// the task should stop.
    fn receive(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn deliver(&self, task: TaskId, message: &[u8]) -> Result<(), TransportError> {
        (**self).deliver(task, message)
    }
}

impl<T: Intake + Sync + ?Sized> Intake for Arc<T> {
    fn receive(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).receive(timeout)
    }
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Vec<u8>>,
    closed: bool,
}

struct LocalQueue {
    task: TaskId,
    capacity: usize,
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl LocalQueue {
    fn push(&self, message: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.messages.len() >= self.capacity {
            log::error!(
                "possible fifo size overflow on {} (code {})",
                self.task,
                glue::FIFOSIZE_OVERFLOW
            );
            return Err(TransportError::Full {
                task: self.task,
                capacity: self.capacity,
            });
        }
        state.messages.push_back(message.to_vec());
        self.ready.notify_one();
        Ok(())
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }
}

/// In-process transport with one bounded queue per task.
pub struct LocalTransport {
    queues: Vec<Arc<LocalQueue>>,
    max_message_size: usize,
}

impl LocalTransport {
    /// Creates intakes for tasks `0..tasks`.
    pub fn new(tasks: u32, config: &RuntimeConfig) -> Self {
        let queues = (0..tasks)
            .map(|id| {
                Arc::new(LocalQueue {
                    task: TaskId::new(id),
                    capacity: config.intake_capacity,
                    state: Mutex::new(QueueState::default()),
                    ready: Condvar::new(),
                })
            })
            .collect();
        Self {
            queues,
            max_message_size: config.max_message_size,
        }
    }

    /// Receiving end for `task`.
    pub fn intake(&self, task: TaskId) -> Option<LocalIntake> {
        self.queues.get(task.index()).map(|queue| LocalIntake {
            queue: Arc::clone(queue),
        })
    }

    /// Closes every intake; blocked receivers return [`TransportError::Closed`].
    pub fn close(&self) {
        for queue in &self.queues {
            queue.close();
        }
    }
}

impl Transport for LocalTransport {
    fn deliver(&self, task: TaskId, message: &[u8]) -> Result<(), TransportError> {
        if message.len() > self.max_message_size {
            return Err(TransportError::TooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }
        let queue = self
            .queues
            .get(task.index())
            .ok_or(TransportError::UnknownTask(task))?;
        queue.push(message)
    }
}

/// Receiving end of a [`LocalTransport`] queue.
pub struct LocalIntake {
    queue: Arc<LocalQueue>,
}

impl LocalIntake {
    pub fn task(&self) -> TaskId {
        self.queue.task
    }

    /// Takes the next message without blocking.
    pub fn try_receive(&self) -> nb::Result<Vec<u8>, TransportError> {
        let mut state = self.queue.state.lock();
        match state.messages.pop_front() {
            Some(message) => Ok(message),
            None if state.closed => Err(nb::Error::Other(TransportError::Closed)),
            None => Err(nb::Error::WouldBlock),
        }
    }

    /// Messages waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.state.lock().messages.len()
    }
}

impl Intake for LocalIntake {
    fn receive(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.queue.state.lock();
        loop {
            // queued messages are drained even after close
            if let Some(message) = state.messages.pop_front() {
                return Ok(Some(message));
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
            match deadline {
                None => self.queue.ready.wait(&mut state),
                Some(deadline) => {
                    if self.queue.ready.wait_until(&mut state, deadline).timed_out() {
                        return Ok(state.messages.pop_front());
                    }
                }
            }
        }
    }
}
