//! # cmw-rt
//!
//! Hosted runtime of the component middleware: tasks are OS threads, each
//! draining one intake of serialized envelopes into a life-cycle engine.
//!
//! ## Module Overview
//! - [`config`]    – Runtime sizing and deployment description.
//! - [`envelope`]  – IPC envelopes (`LIFECYCLE_COMMAND`, `TIMED_MESSAGE`, ...).
//! - [`transport`] – Delivery to task intakes; in-process [`LocalTransport`].
//! - [`task`]      – Task registry binding task ids to threads.
//! - [`lifecycle`] – Components, entrypoints and the per-task engine.
//! - [`executor`]  – Task loop feeding an engine from its intake.
//! - [`router`]    – Command dispatch to the task owning an instance.
//! - [`timed`]     – Deadline-ordered timed-message queue.
//! - [`timer`]     – Timer service delivering due timed messages.
//! - [`time`]      – Clock abstraction.
//! - [`runtime`]   – Assembly of a deployment into running tasks.
//! - [`launcher`]  – Script interpreter issuing life-cycle commands.

use std::fmt;

pub mod config;
pub mod envelope;
pub mod executor;
pub mod launcher;
pub mod lifecycle;
pub mod router;
pub mod runtime;
pub mod task;
pub mod time;
pub mod timed;
pub mod timer;
pub mod transport;

pub use config::{ConfigError, Deployment, InstanceSpec, RuntimeConfig, RuntimeConfigBuilder, TaskSpec};
pub use envelope::{Envelope, TimedTrigger};
pub use executor::TaskLoop;
pub use launcher::{CommandSink, LaunchCommand, LaunchOutcome, Launcher, ScriptError, Target};
pub use lifecycle::{
    Component, EntrypointFn, Entrypoints, LifeCycleContext, LifeCycleEngine, LifeCycleInfo, Observer,
};
pub use router::CommandRouter;
pub use runtime::{Runtime, RuntimeBuilder};
pub use task::TaskRegistry;
pub use time::{Clock, ManualClock, StdClock};
pub use timed::{TimedMessage, TimedMessageId, TimedQueue};
pub use timer::TimerService;
pub use transport::{Intake, LocalIntake, LocalTransport, Transport, TransportError};

/// Logs `what` and aborts the process.
///
/// Reserved for failures the runtime cannot run without, such as being
/// unable to create the thread of a task.
#[cold]
pub fn fatal(what: fmt::Arguments<'_>) -> ! {
    log::error!("fatal: {what}");
    std::process::abort()
}
