//! Life-cycle engine: per-task component registry and command handling.
//!
//! Each task owns one [`LifeCycleEngine`] holding the state of the
//! instances it executes. Commands reach it as envelopes through the task
//! intake; the engine applies [`next_state`] and calls the component
//! entrypoint selected by the shift, once per changed transition.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cmw_core::{
    next_state, EntrypointSlot, InstanceId, LifeCycleState, RtError, RtResult, Shift, StateStatus,
    TaskId,
};
use cmw_mem::{map_size, Map};

use crate::envelope::{Envelope, TimedTrigger};
use crate::timed::TimedMessageId;
use crate::timer::TimerService;

/// Context handed to component entrypoints and handlers.
pub struct LifeCycleContext<'a> {
    pub instance: InstanceId,
    pub task: TaskId,
    /// State after the transition being handled
    pub state: LifeCycleState,
    timer: Option<&'a TimerService>,
}

impl<'a> LifeCycleContext<'a> {
    /// Schedules a timed message back to this instance after `delay`.
    ///
    /// Fails with `Failure` when the task has no timer service.
    pub fn schedule_after(
        &self,
        delay: Duration,
        operation_id: u32,
        data: &[u8],
    ) -> RtResult<TimedMessageId> {
        let timer = self.timer.ok_or_else(|| {
            log::error!("{}: no timer service on {}", self.instance, self.task);
            RtError::Failure
        })?;
        let trigger = TimedTrigger::new(self.instance, operation_id).with_data(data);
        timer.schedule_after(&trigger.to_payload(), delay)
    }

    /// Cancels a message scheduled with [`schedule_after`](Self::schedule_after).
    pub fn cancel(&self, id: TimedMessageId) -> bool {
        self.timer.is_some_and(|timer| timer.cancel(id))
    }
}

/// Application component driven by the engine.
///
/// Every entrypoint defaults to doing nothing. Entrypoints should return
/// promptly: a `SHUTDOWN` or `KILL` does not interrupt a running one.
pub trait Component: Send {
    fn initialize(&mut self, _ctx: &mut LifeCycleContext<'_>) {}
    fn start(&mut self, _ctx: &mut LifeCycleContext<'_>) {}
    fn stop(&mut self, _ctx: &mut LifeCycleContext<'_>) {}
    fn shutdown(&mut self, _ctx: &mut LifeCycleContext<'_>) {}
    fn reset(&mut self, _ctx: &mut LifeCycleContext<'_>) {}

    /// A message scheduled for this instance became due.
    fn on_timed_message(&mut self, _ctx: &mut LifeCycleContext<'_>, _operation_id: u32, _data: &[u8]) {}

    /// A request/response exchange timed out on this task.
    fn on_request_timeout(&mut self, _ctx: &mut LifeCycleContext<'_>, _operation_id: u32, _request_id: u32) {}

    /// Another instance reported a state change.
    fn on_lifecycle_info(&mut self, _ctx: &mut LifeCycleContext<'_>, _instance: InstanceId, _state: LifeCycleState) {}
}

fn invoke(component: &mut dyn Component, slot: EntrypointSlot, ctx: &mut LifeCycleContext<'_>) {
    match slot {
        EntrypointSlot::Initialize => component.initialize(ctx),
        EntrypointSlot::Start => component.start(ctx),
        EntrypointSlot::Stop => component.stop(ctx),
        EntrypointSlot::Shutdown => component.shutdown(ctx),
        EntrypointSlot::Reset => component.reset(ctx),
    }
}

/// Entrypoint callback.
pub type EntrypointFn = Box<dyn FnMut(&mut LifeCycleContext<'_>) + Send>;

/// Component made of a fixed table of entrypoint callbacks.
#[derive(Default)]
pub struct Entrypoints {
    slots: [Option<EntrypointFn>; EntrypointSlot::COUNT],
}

impl Entrypoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `f` in `slot`, replacing any previous callback.
    pub fn on<F>(mut self, slot: EntrypointSlot, f: F) -> Self
    where
        F: FnMut(&mut LifeCycleContext<'_>) + Send + 'static,
    {
        self.slots[slot.index()] = Some(Box::new(f));
        self
    }

    /// Calls the callback in `slot`; `false` if the slot is empty.
    pub fn invoke(&mut self, slot: EntrypointSlot, ctx: &mut LifeCycleContext<'_>) -> bool {
        match &mut self.slots[slot.index()] {
            Some(f) => {
                f(ctx);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Entrypoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed: Vec<_> = [
            EntrypointSlot::Initialize,
            EntrypointSlot::Start,
            EntrypointSlot::Stop,
            EntrypointSlot::Shutdown,
            EntrypointSlot::Reset,
        ]
        .into_iter()
        .filter(|slot| self.slots[slot.index()].is_some())
        .map(EntrypointSlot::name)
        .collect();
        f.debug_struct("Entrypoints").field("installed", &installed).finish()
    }
}

impl Component for Entrypoints {
    fn initialize(&mut self, ctx: &mut LifeCycleContext<'_>) {
        self.invoke(EntrypointSlot::Initialize, ctx);
    }

    fn start(&mut self, ctx: &mut LifeCycleContext<'_>) {
        self.invoke(EntrypointSlot::Start, ctx);
    }

    fn stop(&mut self, ctx: &mut LifeCycleContext<'_>) {
        self.invoke(EntrypointSlot::Stop, ctx);
    }

    fn shutdown(&mut self, ctx: &mut LifeCycleContext<'_>) {
        self.invoke(EntrypointSlot::Shutdown, ctx);
    }

    fn reset(&mut self, ctx: &mut LifeCycleContext<'_>) {
        self.invoke(EntrypointSlot::Reset, ctx);
    }
}

/// State change notification (`LIFECYCLE_INFO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeCycleInfo {
    pub instance: InstanceId,
    pub state: LifeCycleState,
}

impl From<LifeCycleInfo> for Envelope {
    fn from(info: LifeCycleInfo) -> Self {
        Envelope::LifeCycleInfo {
            instance: info.instance,
            state: info.state,
        }
    }
}

/// Receiver of state change notifications.
pub type Observer = Arc<dyn Fn(LifeCycleInfo) + Send + Sync>;

const STATE_SIZE: u32 = 4;

/// Life-cycle state and components of the instances run by one task.
pub struct LifeCycleEngine {
    task: TaskId,
    states: Map<Vec<u8>>,
    components: BTreeMap<InstanceId, Box<dyn Component>>,
    observer: Option<Observer>,
    timer: Option<Arc<TimerService>>,
}

impl LifeCycleEngine {
    /// Engine for `task` able to hold `capacity` instances.
    pub fn new(task: TaskId, capacity: u32) -> RtResult<Self> {
        let block = vec![0u8; map_size(capacity, STATE_SIZE)];
        Ok(Self {
            task,
            states: Map::init(block, capacity, STATE_SIZE)?,
            components: BTreeMap::new(),
            observer: None,
            timer: None,
        })
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Adds `instance` in state `UNAVAILABLE`.
    pub fn register(&mut self, instance: InstanceId, component: Box<dyn Component>) -> RtResult<()> {
        if self.components.contains_key(&instance) {
            log::error!("{}: {instance} registered twice", self.task);
            return Err(RtError::InvalidInParameter);
        }
        self.states
            .add(instance.raw().into(), &LifeCycleState::Unavailable.raw().to_ne_bytes())?;
        self.components.insert(instance, component);
        Ok(())
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    pub fn set_timer(&mut self, timer: Arc<TimerService>) {
        self.timer = Some(timer);
    }

    pub fn timer(&self) -> Option<&Arc<TimerService>> {
        self.timer.as_ref()
    }

    /// Instances run by this task.
    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.components.keys().copied()
    }

    pub fn state(&self, instance: InstanceId) -> Option<LifeCycleState> {
        let raw = self.states.get(instance.raw().into())?;
        let raw = u32::from_ne_bytes(raw.try_into().ok()?);
        LifeCycleState::try_from(raw).ok()
    }

    fn set_state(&mut self, instance: InstanceId, state: LifeCycleState) -> RtResult<()> {
        self.states.add(instance.raw().into(), &state.raw().to_ne_bytes())
    }

    /// Applies `shift` to `instance`.
    ///
    /// Transitions missing from the table return `changed == false` and call
    /// nothing. Unknown instances fail with `InvalidInParameter`.
    pub fn handle_command(&mut self, instance: InstanceId, shift: Shift) -> RtResult<StateStatus> {
        let Some(current) = self.state(instance) else {
            log::error!("{}: lifecycle command {shift} for unknown {instance}", self.task);
            return Err(RtError::InvalidInParameter);
        };

        let status = next_state(current, shift);
        if !status.changed {
            log::debug!("{instance}: {shift} ignored in state {current}");
            return Ok(status);
        }

        self.set_state(instance, status.state)?;
        log::info!("{instance}: {current} --{shift}--> {}", status.state);

        if let Some(slot) = EntrypointSlot::for_shift(shift) {
            let mut ctx = LifeCycleContext {
                instance,
                task: self.task,
                state: status.state,
                timer: self.timer.as_deref(),
            };
            if let Some(component) = self.components.get_mut(&instance) {
                invoke(component.as_mut(), slot, &mut ctx);
            }
        }

        if let Some(observer) = &self.observer {
            observer(LifeCycleInfo {
                instance,
                state: status.state,
            });
        }
        Ok(status)
    }

    /// Dispatches a decoded envelope received by this task.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> RtResult<()> {
        match envelope {
            Envelope::LifeCycleCommand { instance, shift } => {
                self.handle_command(*instance, *shift).map(|_| ())
            }
            Envelope::TimedMessage { payload, .. } => {
                let trigger = TimedTrigger::from_payload(payload)?;
                let Some(instance) = trigger.instance else {
                    self.for_each_component(|component, ctx| {
                        component.on_timed_message(ctx, trigger.operation_id, &trigger.data)
                    });
                    return Ok(());
                };
                let Some(state) = self.state(instance) else {
                    log::error!("{}: timed message for unknown {instance}", self.task);
                    return Err(RtError::InvalidInParameter);
                };
                let mut ctx = LifeCycleContext {
                    instance,
                    task: self.task,
                    state,
                    timer: self.timer.as_deref(),
                };
                if let Some(component) = self.components.get_mut(&instance) {
                    component.on_timed_message(&mut ctx, trigger.operation_id, &trigger.data);
                }
                Ok(())
            }
            Envelope::RequestResponseTimeout {
                operation_id,
                request_id,
            } => {
                self.for_each_component(|component, ctx| {
                    component.on_request_timeout(ctx, *operation_id, *request_id)
                });
                Ok(())
            }
            Envelope::LifeCycleInfo { instance, state } => {
                self.for_each_component(|component, ctx| {
                    component.on_lifecycle_info(ctx, *instance, *state)
                });
                Ok(())
            }
        }
    }

    fn for_each_component(&mut self, mut f: impl FnMut(&mut dyn Component, &mut LifeCycleContext<'_>)) {
        let timer = self.timer.as_deref();
        for (&instance, component) in self.components.iter_mut() {
            let state = self
                .states
                .get(instance.raw().into())
                .and_then(|raw| raw.try_into().ok())
                .map(u32::from_ne_bytes)
                .and_then(|raw| LifeCycleState::try_from(raw).ok())
                .unwrap_or_default();
            let mut ctx = LifeCycleContext {
                instance,
                task: self.task,
                state,
                timer,
            };
            f(component.as_mut(), &mut ctx);
        }
    }
}
