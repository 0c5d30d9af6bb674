//! End-to-end tests of a deployment running on local threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cmw_core::{EntrypointSlot, InstanceId, LifeCycleState, RtError, Shift, TaskId, Timestamp};
use cmw_rt::{
    Component, Deployment, Entrypoints, Envelope, Launcher, LifeCycleContext, LifeCycleEngine,
    LifeCycleInfo, LocalTransport, ManualClock, Runtime, RuntimeConfig, TaskRegistry,
    TimedTrigger, TimerService,
};
use parking_lot::Mutex;

fn deployment() -> Deployment {
    Deployment::new()
        .task("control")
        .task("io")
        .instance(0, "sensor", 1)
        .instance(1, "filter", 0)
        .instance(2, "logger", 1)
}

fn config() -> RuntimeConfig {
    RuntimeConfig::builder()
        .broadcast_pause(Duration::ZERO)
        .build()
}

#[test]
fn commands_reach_owning_tasks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let record = calls.clone();

    let runtime = Runtime::builder()
        .config(config())
        .deployment(deployment())
        .component(
            1,
            Entrypoints::new().on(EntrypointSlot::Start, move |ctx: &mut LifeCycleContext<'_>| {
                record.lock().push((ctx.instance, ctx.task, ctx.state));
            }),
        )
        .observer(move |info: LifeCycleInfo| sink.lock().push(info))
        .build()
        .unwrap();
    assert_eq!(runtime.state(InstanceId::new(1)), Some(LifeCycleState::Unavailable));
    runtime.start().unwrap();

    let router = runtime.router();
    router.broadcast(Shift::Rise).unwrap();
    router.broadcast(Shift::Initialize).unwrap();
    router.dispatch_command(InstanceId::new(1), Shift::Start).unwrap();
    // ignored: instance 0 is READY
    router.dispatch_command(InstanceId::new(0), Shift::Stop).unwrap();
    runtime.shutdown();

    assert_eq!(
        *calls.lock(),
        [(InstanceId::new(1), TaskId::new(0), LifeCycleState::Running)]
    );
    assert_eq!(runtime.state(InstanceId::new(0)), Some(LifeCycleState::Ready));
    assert_eq!(runtime.state(InstanceId::new(1)), Some(LifeCycleState::Running));
    assert_eq!(runtime.state(InstanceId::new(2)), Some(LifeCycleState::Ready));
    assert_eq!(runtime.state(InstanceId::new(42)), None);

    let seen = seen.lock();
    assert_eq!(seen.len(), 7);
    for id in 0..3 {
        let states: Vec<_> = seen
            .iter()
            .filter(|info| info.instance == InstanceId::new(id))
            .map(|info| info.state)
            .collect();
        let mut expected = vec![LifeCycleState::Idle, LifeCycleState::Ready];
        if id == 1 {
            expected.push(LifeCycleState::Running);
        }
        assert_eq!(states, expected, "instance {id}");
    }
}

#[test]
fn unknown_instance_is_rejected_by_router() {
    let runtime = Runtime::builder()
        .config(config())
        .deployment(deployment())
        .build()
        .unwrap();
    assert_eq!(
        runtime.router().dispatch_command(InstanceId::new(42), Shift::Rise),
        Err(RtError::InvalidInParameter)
    );
    assert_eq!(runtime.router().owner(InstanceId::new(2)), Some(TaskId::new(1)));
}

#[test]
fn start_twice_fails() {
    let runtime = Runtime::builder()
        .config(config())
        .deployment(deployment())
        .build()
        .unwrap();
    runtime.start().unwrap();
    assert_eq!(runtime.start(), Err(RtError::Failure));
    assert!(runtime.registry().is_started(TaskId::new(0)));
    assert_eq!(
        runtime.registry().start_task(TaskId::new(1), "again", || {}),
        Err(RtError::Failure)
    );
    assert_eq!(runtime.registry().current_task_id(), TaskId::NONE);
    runtime.shutdown();
}

#[test]
fn rejects_invalid_deployments() {
    let orphan = Runtime::builder()
        .deployment(Deployment::new().task("only").instance(0, "lost", 3))
        .build();
    assert!(matches!(orphan, Err(RtError::InvalidData)));

    let stray = Runtime::builder()
        .deployment(deployment())
        .component(7, Entrypoints::new())
        .build();
    assert!(matches!(stray, Err(RtError::InvalidInParameter)));
}

struct Blinker {
    fired: mpsc::Sender<(InstanceId, u32, Vec<u8>)>,
}

impl Component for Blinker {
    fn start(&mut self, ctx: &mut LifeCycleContext<'_>) {
        ctx.schedule_after(Duration::from_millis(5), 0x42, b"tick").unwrap();
    }

    fn on_timed_message(&mut self, ctx: &mut LifeCycleContext<'_>, operation_id: u32, data: &[u8]) {
        self.fired.send((ctx.instance, operation_id, data.to_vec())).unwrap();
    }
}

#[test]
fn timed_message_reaches_scheduling_instance() {
    let (tx, rx) = mpsc::channel();
    let runtime = Runtime::builder()
        .config(config())
        .deployment(deployment())
        .component(2, Blinker { fired: tx })
        .build()
        .unwrap();
    runtime.start().unwrap();

    for shift in [Shift::Rise, Shift::Initialize, Shift::Start] {
        runtime.router().dispatch_command(InstanceId::new(2), shift).unwrap();
    }
    let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(fired, (InstanceId::new(2), 0x42, b"tick".to_vec()));
    runtime.shutdown();
}

#[test]
fn script_drives_runtime() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let runtime = Runtime::builder()
        .config(config())
        .deployment(deployment())
        .observer(move |info: LifeCycleInfo| sink.lock().push(info))
        .build()
        .unwrap();
    runtime.start().unwrap();

    let launcher = Launcher::new(runtime.router().clone()).broadcast_pause(Duration::ZERO);
    let script = "# bring up the sensor only\nInit 0\nStart 0\nQuit\nStart 1\n";
    let mut out = Vec::new();
    // RISE is not a script command: INIT from UNAVAILABLE is ignored
    launcher.run(script.as_bytes(), &mut out, false).unwrap();
    runtime.router().dispatch_command(InstanceId::new(0), Shift::Rise).unwrap();
    launcher.run("init 0\nstart 0\n".as_bytes(), &mut out, false).unwrap();
    runtime.shutdown();

    let states: Vec<_> = seen.lock().iter().map(|info| info.state).collect();
    assert_eq!(
        states,
        [LifeCycleState::Idle, LifeCycleState::Ready, LifeCycleState::Running]
    );
}

#[derive(Debug, PartialEq, Eq)]
enum Heard {
    Timed(InstanceId, u32),
    Timeout(InstanceId, u32, u32),
    Info(InstanceId, InstanceId, LifeCycleState),
}

struct Listener {
    heard: Arc<Mutex<Vec<Heard>>>,
}

impl Component for Listener {
    fn on_timed_message(&mut self, ctx: &mut LifeCycleContext<'_>, operation_id: u32, _data: &[u8]) {
        self.heard.lock().push(Heard::Timed(ctx.instance, operation_id));
    }

    fn on_request_timeout(&mut self, ctx: &mut LifeCycleContext<'_>, operation_id: u32, request_id: u32) {
        self.heard
            .lock()
            .push(Heard::Timeout(ctx.instance, operation_id, request_id));
    }

    fn on_lifecycle_info(&mut self, ctx: &mut LifeCycleContext<'_>, instance: InstanceId, state: LifeCycleState) {
        self.heard.lock().push(Heard::Info(ctx.instance, instance, state));
    }
}

#[test]
fn notifications_reach_every_component_of_the_task() {
    let heard = Arc::new(Mutex::new(Vec::new()));
    let mut engine = LifeCycleEngine::new(TaskId::new(0), 2).unwrap();
    for id in [3, 4] {
        let listener = Listener {
            heard: heard.clone(),
        };
        engine.register(InstanceId::new(id), Box::new(listener)).unwrap();
    }

    engine
        .handle_envelope(&Envelope::RequestResponseTimeout {
            operation_id: 17,
            request_id: 9,
        })
        .unwrap();
    engine
        .handle_envelope(&Envelope::LifeCycleInfo {
            instance: InstanceId::new(8),
            state: LifeCycleState::Ready,
        })
        .unwrap();
    engine
        .handle_envelope(&Envelope::TimedMessage {
            timeout: Timestamp::from_millis(5),
            payload: TimedTrigger::bare(21).to_payload(),
        })
        .unwrap();

    let (a, b) = (InstanceId::new(3), InstanceId::new(4));
    assert_eq!(
        *heard.lock(),
        [
            Heard::Timeout(a, 17, 9),
            Heard::Timeout(b, 17, 9),
            Heard::Info(a, InstanceId::new(8), LifeCycleState::Ready),
            Heard::Info(b, InstanceId::new(8), LifeCycleState::Ready),
            Heard::Timed(a, 21),
            Heard::Timed(b, 21),
        ]
    );
}

#[test]
fn entrypoint_cancels_its_timed_message() {
    let config = config();
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
    let transport = Arc::new(LocalTransport::new(1, &config));
    let intake = transport.intake(TaskId::new(0)).unwrap();
    let timer = Arc::new(TimerService::new(TaskId::new(0), transport, clock.clone(), &config));

    let outcome = Arc::new(Mutex::new(Vec::new()));
    let record = outcome.clone();
    let component = Entrypoints::new().on(EntrypointSlot::Start, move |ctx: &mut LifeCycleContext<'_>| {
        let id = ctx.schedule_after(Duration::from_secs(1), 5, b"late").unwrap();
        record.lock().push(ctx.cancel(id));
        record.lock().push(ctx.cancel(id));
    });

    let mut engine = LifeCycleEngine::new(TaskId::new(0), 1).unwrap();
    engine.set_timer(timer.clone());
    engine.register(InstanceId::new(0), Box::new(component)).unwrap();
    for shift in [Shift::Rise, Shift::Initialize, Shift::Start] {
        engine.handle_command(InstanceId::new(0), shift).unwrap();
    }

    assert_eq!(*outcome.lock(), [true, false]);
    assert_eq!(timer.pending(), 0);
    clock.advance(Duration::from_secs(2));
    assert_eq!(timer.fire_due().unwrap(), 0);
    assert_eq!(intake.pending(), 0);
}

#[test]
fn restarting_a_task_keeps_its_thread() {
    let registry = Arc::new(TaskRegistry::new(2));
    let task = TaskId::new(1);
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (id_tx, id_rx) = mpsc::channel();
    let inner = registry.clone();
    registry
        .start_task(task, "first", move || {
            go_rx.recv().ok();
            id_tx.send(inner.current_task_id()).ok();
        })
        .unwrap();
    let first = registry.thread_id(task).unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    assert_eq!(
        registry.start_task(task, "second", move || flag.store(true, Ordering::SeqCst)),
        Err(RtError::Failure)
    );
    assert_eq!(registry.thread_id(task), Some(first));

    go_tx.send(()).unwrap();
    assert_eq!(id_rx.recv_timeout(Duration::from_secs(5)).unwrap(), task);
    registry.join_all();
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(registry.thread_id(task), Some(first));
    assert_eq!(registry.thread_id(TaskId::new(0)), None);
}
