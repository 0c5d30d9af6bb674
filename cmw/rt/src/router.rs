//! Routing of life-cycle commands to the task owning each instance.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cmw_core::{InstanceId, RtError, RtResult, Shift, TaskId};

use crate::config::Deployment;
use crate::envelope::Envelope;
use crate::transport::Transport;

/// Sends life-cycle commands as envelopes to the owning task's intake.
#[derive(Clone)]
pub struct CommandRouter {
    owners: BTreeMap<InstanceId, TaskId>,
    transport: Arc<dyn Transport>,
    pause: Duration,
}

impl CommandRouter {
    pub fn new(deployment: &Deployment, transport: Arc<dyn Transport>, pause: Duration) -> Self {
        let owners = deployment
            .instances
            .iter()
            .map(|i| (InstanceId::new(i.id), TaskId::new(i.task)))
            .collect();
        Self {
            owners,
            transport,
            pause,
        }
    }

    pub fn owner(&self, instance: InstanceId) -> Option<TaskId> {
        self.owners.get(&instance).copied()
    }

    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.owners.keys().copied()
    }

    /// Serializes `{LIFECYCLE_COMMAND, instance, shift}` and delivers it to
    /// the task running `instance`.
    pub fn dispatch_command(&self, instance: InstanceId, shift: Shift) -> RtResult<()> {
        let task = self.owner(instance).ok_or_else(|| {
            log::error!("dispatch_command: {instance} is not deployed");
            RtError::InvalidInParameter
        })?;
        let bytes = Envelope::LifeCycleCommand { instance, shift }.to_bytes()?;
        self.transport.deliver(task, &bytes).map_err(|err| {
            log::error!("dispatch_command: {shift} to {instance} on {task} failed: {err}");
            RtError::from(err)
        })?;
        log::debug!("dispatch_command: {shift} -> {instance} ({task})");
        Ok(())
    }

    /// Sends `shift` to every instance in id order, pausing between each.
    ///
    /// Keeps going after a failure and reports the first one.
    pub fn broadcast(&self, shift: Shift) -> RtResult<()> {
        let mut first_error = None;
        for (n, instance) in self.instances().enumerate() {
            if n > 0 && !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
            if let Err(err) = self.dispatch_command(instance, shift) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
