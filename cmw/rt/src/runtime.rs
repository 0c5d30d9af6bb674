//! Assembly of a deployment into running tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use cmw_core::{InstanceId, LifeCycleState, RtError, RtResult, TaskId};
use cmw_mem::{map_size, Map, Shared};
use parking_lot::Mutex;

use crate::config::{Deployment, RuntimeConfig};
use crate::executor::TaskLoop;
use crate::lifecycle::{Component, Entrypoints, LifeCycleEngine, LifeCycleInfo, Observer};
use crate::router::CommandRouter;
use crate::task::TaskRegistry;
use crate::time::{Clock, StdClock};
use crate::timer::TimerService;
use crate::transport::{LocalIntake, LocalTransport, Transport};

const STATE_SIZE: u32 = 4;

/// States of every deployed instance, updated from all task threads.
struct StateBoard {
    states: Shared<Map<Vec<u8>>>,
}

impl StateBoard {
    fn new(deployment: &Deployment) -> RtResult<Self> {
        let capacity = deployment.instances.len().max(1) as u32;
        let block = vec![0u8; map_size(capacity, STATE_SIZE)];
        let mut states = Map::init(block, capacity, STATE_SIZE)?;
        for id in deployment.instance_ids() {
            states.add(id.raw().into(), &LifeCycleState::Unavailable.raw().to_ne_bytes())?;
        }
        Ok(Self {
            states: Shared::new(states),
        })
    }

    fn get(&self, instance: InstanceId) -> Option<LifeCycleState> {
        let raw = self.states.with(|states| {
            let raw = states.get(instance.raw().into())?;
            raw.try_into().ok().map(u32::from_ne_bytes)
        })?;
        LifeCycleState::try_from(raw).ok()
    }

    fn record(&self, info: LifeCycleInfo) {
        let stored = self.states.with(|states| {
            states.add(info.instance.raw().into(), &info.state.raw().to_ne_bytes())
        });
        if let Err(err) = stored {
            log::error!("cannot record state of {}: {err}", info.instance);
        }
    }

    /// Observer recording into the board, then forwarding to `next`.
    fn observer(self: &Arc<Self>, next: Option<Observer>) -> Observer {
        let board = Arc::clone(self);
        Arc::new(move |info: LifeCycleInfo| {
            board.record(info);
            if let Some(next) = &next {
                next(info);
            }
        })
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    deployment: Deployment,
    components: BTreeMap<InstanceId, Box<dyn Component>>,
    observer: Option<Observer>,
    clock: Option<Arc<dyn Clock>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }

    /// Binds the component executed as instance `id`.
    pub fn component<C>(mut self, id: u32, component: C) -> Self
    where
        C: Component + 'static,
    {
        self.components.insert(InstanceId::new(id), Box::new(component));
        self
    }

    /// Receives every state change of every instance.
    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(LifeCycleInfo) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the deployment and prepares one engine, intake and timer
    /// per task. Nothing runs until [`Runtime::start`].
    pub fn build(self) -> RtResult<Runtime> {
        let RuntimeBuilder {
            config,
            deployment,
            mut components,
            observer,
            clock,
        } = self;

        deployment.validate(&config).map_err(|err| {
            log::error!("invalid deployment: {err}");
            RtError::from(err)
        })?;
        if let Some(stray) = components.keys().find(|id| deployment.owner(**id).is_none()) {
            log::error!("component bound to {stray}, which is not deployed");
            return Err(RtError::InvalidInParameter);
        }

        let states = Arc::new(StateBoard::new(&deployment)?);
        let observer = states.observer(observer);
        let clock = clock.unwrap_or_else(|| Arc::new(StdClock::new()));
        let transport = Arc::new(LocalTransport::new(deployment.tasks.len() as u32, &config));
        let shared: Arc<dyn Transport> = transport.clone();

        let mut loops = Vec::with_capacity(deployment.tasks.len());
        let mut timers = Vec::with_capacity(deployment.tasks.len());
        for task in deployment.task_ids() {
            let instances: Vec<_> = deployment.instances_of(task).collect();
            let mut engine = LifeCycleEngine::new(task, instances.len().max(1) as u32)?;
            let timer = Arc::new(TimerService::new(task, shared.clone(), clock.clone(), &config));
            engine.set_timer(timer.clone());
            engine.set_observer(observer.clone());
            for spec in instances {
                let id = InstanceId::new(spec.id);
                let component: Box<dyn Component> = match components.remove(&id) {
                    Some(component) => component,
                    None => {
                        log::warn!("{id} ({}) has no component, entrypoints are no-ops", spec.name);
                        Box::new(Entrypoints::new())
                    }
                };
                engine.register(id, component)?;
            }
            let intake = transport.intake(task).ok_or(RtError::Failure)?;
            loops.push(TaskLoop::new(engine, intake));
            timers.push(timer);
        }

        let router = CommandRouter::new(&deployment, shared, config.broadcast_pause);
        Ok(Runtime {
            registry: Arc::new(TaskRegistry::new(config.max_tasks)),
            config,
            deployment,
            transport,
            router,
            states,
            pending: Mutex::new(loops),
            timers,
            timer_threads: Mutex::new(Vec::new()),
        })
    }
}

/// A deployment running on local threads, one per task.
pub struct Runtime {
    config: RuntimeConfig,
    deployment: Deployment,
    registry: Arc<TaskRegistry>,
    transport: Arc<LocalTransport>,
    router: CommandRouter,
    states: Arc<StateBoard>,
    pending: Mutex<Vec<TaskLoop<LocalIntake>>>,
    timers: Vec<Arc<TimerService>>,
    timer_threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.transport
    }

    /// Last state reported by `instance`, `None` if it is not deployed.
    pub fn state(&self, instance: InstanceId) -> Option<LifeCycleState> {
        self.states.get(instance)
    }

    /// Timer service feeding `task`.
    pub fn timer(&self, task: TaskId) -> Option<&Arc<TimerService>> {
        self.timers.get(task.index())
    }

    /// Starts every task thread and its timer. Fails with `Failure` when
    /// called twice.
    pub fn start(&self) -> RtResult<()> {
        let loops = std::mem::take(&mut *self.pending.lock());
        if loops.is_empty() && !self.deployment.tasks.is_empty() {
            log::error!("runtime already started");
            return Err(RtError::Failure);
        }

        let mut timer_threads = self.timer_threads.lock();
        for task_loop in loops {
            let task = task_loop.task();
            let name = self.deployment.task_name(task).unwrap_or("task").to_owned();
            self.registry.start_task(task, &name, move || {
                task_loop.run();
            })?;

            if let Some(timer) = self.timer(task) {
                timer_threads.push(timer.spawn(&name));
            }
        }
        log::info!(
            "runtime started: {} tasks, {} instances",
            self.deployment.tasks.len(),
            self.deployment.instances.len()
        );
        Ok(())
    }

    /// Stops timers, closes every intake and joins all threads.
    ///
    /// Messages already queued are still handled before a task returns.
    pub fn shutdown(&self) {
        for timer in &self.timers {
            timer.stop();
        }
        self.transport.close();
        self.registry.join_all();
        let handles = std::mem::take(&mut *self.timer_threads.lock());
        for handle in handles {
            if handle.join().is_err() {
                log::error!("timer thread panicked");
            }
        }
        log::debug!("runtime shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
