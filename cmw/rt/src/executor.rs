//! Task loop: drains one intake into one life-cycle engine.

use cmw_core::{RtResult, TaskId};

use crate::envelope::Envelope;
use crate::lifecycle::LifeCycleEngine;
use crate::transport::{Intake, TransportError};

/// Body of a task thread.
pub struct TaskLoop<I> {
    engine: LifeCycleEngine,
    intake: I,
}

impl<I: Intake> TaskLoop<I> {
    pub fn new(engine: LifeCycleEngine, intake: I) -> Self {
        Self {
            engine,
            intake,
        }
    }

    pub fn task(&self) -> TaskId {
        self.engine.task()
    }

    pub fn engine(&self) -> &LifeCycleEngine {
        &self.engine
    }

    /// Decodes and applies one message.
    pub fn handle(&mut self, message: &[u8]) -> RtResult<()> {
        let envelope = Envelope::decode(message)?;
        log::trace!("{}: received {envelope:?}", self.engine.task());
        self.engine.handle_envelope(&envelope)
    }

    /// Runs until the intake is closed, then hands the engine back.
    pub fn run(mut self) -> LifeCycleEngine {
        let task = self.engine.task();
        log::debug!("{task}: loop started");
        loop {
            match self.intake.receive(None) {
                Ok(Some(message)) => {
                    if let Err(err) = self.handle(&message) {
                        log::warn!("{task}: message rejected: {err}");
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => break,
                Err(err) => {
                    log::error!("{task}: intake error: {err}");
                    break;
                }
            }
        }
        log::debug!("{task}: loop finished");
        self.engine
    }
}
