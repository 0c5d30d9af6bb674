//! Tests for the launcher script interpreter.

use std::time::{Duration, Instant};

use cmw_core::{InstanceId, RtError, RtResult, Shift};
use cmw_rt::launcher::{CommandSink, LaunchOutcome, Launcher, HELP, PROMPT};
use parking_lot::Mutex;

struct Recording {
    deployed: u32,
    sent: Mutex<Vec<(u32, Shift)>>,
}

impl Recording {
    fn new(deployed: u32) -> Self {
        Self {
            deployed,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl CommandSink for Recording {
    fn dispatch_command(&self, instance: InstanceId, shift: Shift) -> RtResult<()> {
        if instance.raw() == 2 {
            return Err(RtError::Failure);
        }
        self.sent.lock().push((instance.raw(), shift));
        Ok(())
    }

    fn instances(&self) -> Vec<InstanceId> {
        (0..self.deployed).map(InstanceId::new).collect()
    }
}

fn launcher() -> Launcher<Recording> {
    Launcher::new(Recording::new(3)).broadcast_pause(Duration::ZERO)
}

#[test]
fn script_commands_and_messages() {
    let launcher = launcher();
    let script = "\
# comment
Init
start 1

Stop 9
Jump 3
Wait 1
Wait 1 min
Shutdown *
Quit
Reset 0
";
    let mut out = Vec::new();
    let outcome = launcher.run(script.as_bytes(), &mut out, false).unwrap();
    assert_eq!(outcome, LaunchOutcome::Quit);

    assert_eq!(
        *launcher.sink().sent.lock(),
        [
            (0, Shift::Initialize),
            (1, Shift::Initialize),
            (1, Shift::Start),
            (0, Shift::Shutdown),
            (1, Shift::Shutdown),
        ]
    );

    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("# comment\n"));
    assert!(out.contains("Invalid instance id: 9\n"));
    assert!(out.contains("Unknown command: Jump 3\n"));
    assert!(out.contains("Waiting for 1 ms ...\nEnd of wait\n"));
    assert!(out.contains("Unknown time unit: min\nWaiting for 1 ms ..."));
    assert!(!out.contains("Reset 0"));
    assert!(!out.contains(PROMPT));
}

#[test]
fn interactive_session_prints_help_and_prompt() {
    let launcher = launcher();
    let mut out = Vec::new();
    let outcome = launcher.run("stop 0\n".as_bytes(), &mut out, true).unwrap();
    assert_eq!(outcome, LaunchOutcome::EndOfInput);

    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with(HELP));
    assert_eq!(out.matches(PROMPT).count(), 2);
    assert!(!out.contains("stop 0"));
    assert_eq!(*launcher.sink().sent.lock(), [(0, Shift::Stop)]);
}

#[test]
fn broadcast_pauses_only_between_instances() {
    let launcher = Launcher::new(Recording::new(1)).broadcast_pause(Duration::from_secs(2));
    let mut out = Vec::new();
    let started = Instant::now();
    launcher.run("Start *\n".as_bytes(), &mut out, false).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(*launcher.sink().sent.lock(), [(0, Shift::Start)]);
}
