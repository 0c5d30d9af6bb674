//! Runtime sizing and deployment description.

use std::collections::BTreeSet;
use std::time::Duration;

use cmw_core::{InstanceId, RtError, TaskId, MAX_OPERATION_SIZE, MIN_TIMEOUT};

/// Runtime sizing and timing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on the number of tasks the registry accepts.
    pub max_tasks: u32,
    /// Messages each task intake can hold before senders fail.
    pub intake_capacity: usize,
    /// Largest envelope a transport accepts.
    pub max_message_size: usize,
    /// Deadlines closer than this are delivered immediately.
    pub min_timeout: Duration,
    /// Pause between commands when one is broadcast to every instance.
    pub broadcast_pause: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tasks: 32,
            intake_capacity: 64,
            max_message_size: MAX_OPERATION_SIZE,
            min_timeout: MIN_TIMEOUT,
            broadcast_pause: Duration::from_millis(10),
        }
    }
}

impl RuntimeConfig {
    /// Creates a new runtime configuration builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    pub fn max_tasks(mut self, max: u32) -> Self {
        self.config.max_tasks = max;
        self
    }

    pub fn intake_capacity(mut self, capacity: usize) -> Self {
        self.config.intake_capacity = capacity;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn min_timeout(mut self, timeout: Duration) -> Self {
        self.config.min_timeout = timeout;
        self
    }

    pub fn broadcast_pause(mut self, pause: Duration) -> Self {
        self.config.broadcast_pause = pause;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

/// A task slot of the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskSpec {
    pub id: u32,
    pub name: String,
}

/// A component instance and the task executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstanceSpec {
    pub id: u32,
    pub name: String,
    pub task: u32,
}

/// Static description of which instances run on which tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Deployment {
    pub tasks: Vec<TaskSpec>,
    pub instances: Vec<InstanceSpec>,
}

/// Reasons a deployment is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("task ids must be 0..{expected}, found {found}")]
    TaskIdNotDense { expected: usize, found: u32 },
    #[error("deployment declares {count} tasks, the registry holds at most {max}")]
    TooManyTasks { count: usize, max: u32 },
    #[error("instance id {0} declared twice")]
    DuplicateInstance(u32),
    #[error("instance {instance} runs on unknown task {task}")]
    UnknownTask { instance: u32, task: u32 },
}

impl From<ConfigError> for RtError {
    fn from(_: ConfigError) -> Self {
        RtError::InvalidData
    }
}

impl Deployment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task; ids are assigned in declaration order.
    pub fn task(mut self, name: impl Into<String>) -> Self {
        let id = self.tasks.len() as u32;
        self.tasks.push(TaskSpec {
            id,
            name: name.into(),
        });
        self
    }

    /// Adds an instance executed by `task`.
    pub fn instance(mut self, id: u32, name: impl Into<String>, task: u32) -> Self {
        self.instances.push(InstanceSpec {
            id,
            name: name.into(),
            task,
        });
        self
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().map(|t| TaskId::new(t.id))
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.iter().map(|i| InstanceId::new(i.id))
    }

    /// Instances executed by `task`.
    pub fn instances_of(&self, task: TaskId) -> impl Iterator<Item = &InstanceSpec> + '_ {
        self.instances.iter().filter(move |i| i.task == task.raw())
    }

    /// Task executing `instance`.
    pub fn owner(&self, instance: InstanceId) -> Option<TaskId> {
        self.instances
            .iter()
            .find(|i| i.id == instance.raw())
            .map(|i| TaskId::new(i.task))
    }

    pub fn task_name(&self, task: TaskId) -> Option<&str> {
        self.tasks
            .iter()
            .find(|t| t.id == task.raw())
            .map(|t| t.name.as_str())
    }

    /// Checks task ids are `0..n`, fit in `config.max_tasks`, and every
    /// instance is unique and bound to a declared task.
    pub fn validate(&self, config: &RuntimeConfig) -> Result<(), ConfigError> {
        if self.tasks.len() > config.max_tasks as usize {
            return Err(ConfigError::TooManyTasks {
                count: self.tasks.len(),
                max: config.max_tasks,
            });
        }
        for (index, task) in self.tasks.iter().enumerate() {
            if task.id as usize != index {
                return Err(ConfigError::TaskIdNotDense {
                    expected: self.tasks.len(),
                    found: task.id,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for instance in &self.instances {
            if !seen.insert(instance.id) {
                return Err(ConfigError::DuplicateInstance(instance.id));
            }
            if instance.task as usize >= self.tasks.len() {
                return Err(ConfigError::UnknownTask {
                    instance: instance.id,
                    task: instance.task,
                });
            }
        }
        Ok(())
    }
}
