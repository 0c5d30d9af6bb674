//! Task registry: binds logical task ids to OS threads.

use std::thread::{self, JoinHandle, ThreadId};

use cmw_core::{RtError, RtResult, TaskId};
use parking_lot::Mutex;

use crate::fatal;

#[derive(Default)]
struct TaskEntry {
    started: bool,
    thread: Option<ThreadId>,
    handle: Option<JoinHandle<()>>,
}

/// Fixed-size table of task slots.
///
/// A slot is started at most once for the registry's lifetime. Failing to
/// create the thread of a slot aborts the process through [`fatal`].
pub struct TaskRegistry {
    entries: Mutex<Vec<TaskEntry>>,
}

impl TaskRegistry {
    /// Creates `max_tasks` slots, none started.
    pub fn new(max_tasks: u32) -> Self {
        let entries = (0..max_tasks).map(|_| TaskEntry::default()).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.entries.lock().len() as u32
    }

    /// Spawns the thread of task `id` running `entry`.
    ///
    /// Fails with `Failure` if `id` is out of range or the task was already
    /// started; the existing thread is left untouched.
    pub fn start_task<F>(&self, id: TaskId, name: &str, entry: F) -> RtResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Held across the spawn so the new thread cannot observe its own
        // slot before it is recorded.
        let mut entries = self.entries.lock();
        let capacity = entries.len();
        let Some(slot) = entries.get_mut(id.index()) else {
            log::error!("start_task: {id} out of range (max {capacity})");
            return Err(RtError::Failure);
        };
        if slot.started {
            log::warn!("start_task: {id} already started");
            return Err(RtError::Failure);
        }

        let handle = match thread::Builder::new().name(name.to_owned()).spawn(entry) {
            Ok(handle) => handle,
            Err(err) => fatal(format_args!("cannot create thread for {id} ({name}): {err}")),
        };
        slot.thread = Some(handle.thread().id());
        slot.handle = Some(handle);
        slot.started = true;
        log::debug!("{id} started as thread '{name}'");
        Ok(())
    }

    pub fn is_started(&self, id: TaskId) -> bool {
        self.entries
            .lock()
            .get(id.index())
            .is_some_and(|entry| entry.started)
    }

    /// OS thread bound to task `id`, once started.
    pub fn thread_id(&self, id: TaskId) -> Option<ThreadId> {
        self.entries.lock().get(id.index()).and_then(|entry| entry.thread)
    }

    /// Id of the task running the calling thread, or [`TaskId::NONE`].
    pub fn current_task_id(&self) -> TaskId {
        let me = thread::current().id();
        self.entries
            .lock()
            .iter()
            .position(|entry| entry.thread == Some(me))
            .map_or(TaskId::NONE, |index| TaskId::new(index as u32))
    }

    /// Waits for every started task to return.
    ///
    /// Slots stay marked as started: a task is never restarted.
    pub fn join_all(&self) {
        let handles: Vec<_> = self
            .entries
            .lock()
            .iter_mut()
            .filter_map(|entry| entry.handle.take())
            .collect();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
            if handle.join().is_err() {
                log::error!("task thread '{name}' panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn out_of_range_task_fails() {
        let registry = TaskRegistry::new(2);
        assert_eq!(registry.start_task(TaskId::new(2), "t2", || {}), Err(RtError::Failure));
        assert!(!registry.is_started(TaskId::new(2)));
    }

    #[test]
    fn spawned_task_sees_its_own_id() {
        let registry = Arc::new(TaskRegistry::new(3));
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&registry);
        registry
            .start_task(TaskId::new(1), "t1", move || {
                tx.send(inner.current_task_id()).unwrap();
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap(), TaskId::new(1));
        registry.join_all();
    }
}
