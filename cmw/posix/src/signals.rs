//! Termination signal hook.

use cmw_core::Shift;
use cmw_rt::CommandSink;

/// Installs a SIGINT/SIGTERM handler that sends `KILL` to every instance
/// of `sink`, then runs `then` (typically closing the intakes).
///
/// Only one handler can be installed per process.
pub fn on_terminate<S, F>(sink: S, mut then: F) -> Result<(), ctrlc::Error>
where
    S: CommandSink + Send + 'static,
    F: FnMut() + Send + 'static,
{
    ctrlc::set_handler(move || {
        log::info!("termination requested, killing all instances");
        for instance in sink.instances() {
            if let Err(err) = sink.dispatch_command(instance, Shift::Kill) {
                log::warn!("KILL not sent to {instance}: {err}");
            }
        }
        then();
    })
}
