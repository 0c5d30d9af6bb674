use std::fs::{self, File};
use std::io::{self, BufReader, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use cmw_core::InstanceId;
use cmw_posix::{on_terminate, DatagramIntake, DatagramTransport, MonotonicClock};
use cmw_rt::{
    CommandRouter, Deployment, Entrypoints, LaunchOutcome, Launcher, LifeCycleEngine, LifeCycleInfo,
    RuntimeConfig, TaskLoop, TaskRegistry, TimerService, Transport,
};

/// Lets in-flight commands reach their tasks before intakes are closed.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Drives component life-cycles of a deployment")]
struct Opts {
    /// Deployment description (JSON)
    #[arg(long, value_name = "FILE")]
    deployment: PathBuf,

    /// Directory holding the task sockets
    #[arg(long = "socket-dir", value_name = "DIR")]
    socket_dir: Option<PathBuf>,

    /// Read commands from FILE instead of stdin
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Also run the deployment's tasks in this process
    #[arg(long = "host-tasks")]
    host_tasks: bool,

    /// Intake capacity in messages
    #[arg(long = "intake-capacity", default_value_t = 64)]
    intake_capacity: usize,

    #[arg(long = "log-level", default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

impl Opts {
    fn socket_dir(&self) -> PathBuf {
        self.socket_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cmw"))
    }
}

/// Tasks of the deployment hosted by this process.
struct HostedTasks {
    registry: TaskRegistry,
    intakes: Vec<Arc<DatagramIntake>>,
    timers: Vec<Arc<TimerService>>,
    timer_threads: Vec<JoinHandle<()>>,
}

impl HostedTasks {
    fn start(
        deployment: &Deployment,
        dir: &Path,
        transport: Arc<dyn Transport>,
        config: &RuntimeConfig,
    ) -> anyhow::Result<Self> {
        let mut hosted = HostedTasks {
            registry: TaskRegistry::new(config.max_tasks),
            intakes: Vec::new(),
            timers: Vec::new(),
            timer_threads: Vec::new(),
        };
        let clock = Arc::new(MonotonicClock);
        let observer = Arc::new(|info: LifeCycleInfo| {
            log::info!("{} is now {}", info.instance, info.state);
        });

        for task in deployment.task_ids() {
            let name = deployment.task_name(task).unwrap_or("task").to_owned();
            let instances: Vec<_> = deployment.instances_of(task).collect();
            let mut engine = LifeCycleEngine::new(task, instances.len().max(1) as u32)
                .map_err(|err| anyhow!("engine for {task}: {err}"))?;
            for spec in instances {
                engine
                    .register(InstanceId::new(spec.id), Box::new(Entrypoints::new()))
                    .map_err(|err| anyhow!("registering {}: {err}", spec.name))?;
            }
            engine.set_observer(observer.clone());

            let timer = Arc::new(TimerService::new(task, transport.clone(), clock.clone(), config));
            engine.set_timer(timer.clone());

            let intake = Arc::new(
                DatagramIntake::bind(dir, task, config)
                    .with_context(|| format!("binding the socket of {name}"))?,
            );
            let task_loop = TaskLoop::new(engine, intake.clone());
            hosted
                .registry
                .start_task(task, &name, move || {
                    task_loop.run();
                })
                .map_err(|err| anyhow!("starting {name}: {err}"))?;

            hosted.timer_threads.push(timer.spawn(&name));
            hosted.intakes.push(intake);
            hosted.timers.push(timer);
        }
        Ok(hosted)
    }

    fn stop(self) {
        for timer in &self.timers {
            timer.stop();
        }
        for intake in &self.intakes {
            intake.close();
        }
        self.registry.join_all();
        for handle in self.timer_threads {
            if handle.join().is_err() {
                log::error!("timer thread panicked");
            }
        }
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(&opts.log_level);

    let text = fs::read_to_string(&opts.deployment)
        .with_context(|| format!("reading {}", opts.deployment.display()))?;
    let deployment: Deployment = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", opts.deployment.display()))?;
    let config = RuntimeConfig::builder()
        .intake_capacity(opts.intake_capacity)
        .build();
    deployment.validate(&config)?;

    let dir = opts.socket_dir();
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let transport: Arc<dyn Transport> = Arc::new(DatagramTransport::new(&dir, &config)?);

    let hosted = if opts.host_tasks {
        Some(HostedTasks::start(&deployment, &dir, transport.clone(), &config)?)
    } else {
        None
    };

    let router = CommandRouter::new(&deployment, transport, config.broadcast_pause);
    let (terminated, on_signal) = mpsc::channel();
    on_terminate(router.clone(), move || {
        let _ = terminated.send(());
    })?;

    let launcher = Launcher::new(router)
        .broadcast_pause(config.broadcast_pause)
        .line_delay(SETTLE_DELAY);
    let mut stdout = io::stdout().lock();
    let (outcome, interactive) = match &opts.script {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            (launcher.run(BufReader::new(file), &mut stdout, false)?, false)
        }
        None => {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            (launcher.run(stdin.lock(), &mut stdout, interactive)?, interactive)
        }
    };
    drop(stdout);

    if outcome == LaunchOutcome::EndOfInput && !interactive {
        log::info!("end of script, waiting for termination signal");
        // the sender lives in the signal handler for the whole process
        let _ = on_signal.recv();
    }

    if let Some(hosted) = hosted {
        thread::sleep(SETTLE_DELAY);
        hosted.stop();
    }
    Ok(())
}
