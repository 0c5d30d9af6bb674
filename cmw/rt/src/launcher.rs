//! Command interpreter driving instance life-cycles from a script or a
//! terminal.
//!
//! One command per line:
//!
//! ```text
//! # comment
//! Init 0
//! Start *
//! Wait 2 s
//! Stop
//! Quit
//! ```

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use cmw_core::{InstanceId, RtResult, Shift};

use crate::router::CommandRouter;

/// Text shown before the first prompt on an interactive terminal.
pub const HELP: &str = "\
List of available commands:
  Wait <duration> [ms|s]  : wait for <duration> (milliseconds by default)
  Init     <component>
  Start    <component>
  Reset    <component>
  Stop     <component>
  Shutdown <component>
  Quit

<component> is the instance id, or '*' for all instances.
<component> may be omitted, meaning all instances.
Lines starting with '#' are ignored.
";

pub const PROMPT: &str = ">> ";

/// Instances addressed by a life-cycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Instance(InstanceId),
}

/// One parsed script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCommand {
    Quit,
    Wait {
        duration: Duration,
        /// Unit token that was neither `ms` nor `s`
        unknown_unit: Option<String>,
    },
    LifeCycle {
        shift: Shift,
        target: Target,
    },
}

/// Lines the interpreter reports and skips.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Invalid instance id: {0}")]
    InvalidInstance(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Receiver of the life-cycle commands issued by a script.
pub trait CommandSink {
    fn dispatch_command(&self, instance: InstanceId, shift: Shift) -> RtResult<()>;

    /// Every deployed instance, in the order a broadcast visits them.
    fn instances(&self) -> Vec<InstanceId>;
}

impl CommandSink for CommandRouter {
    fn dispatch_command(&self, instance: InstanceId, shift: Shift) -> RtResult<()> {
        CommandRouter::dispatch_command(self, instance, shift)
    }

    fn instances(&self) -> Vec<InstanceId> {
        CommandRouter::instances(self).collect()
    }
}

fn shift_keyword(word: &str) -> Option<Shift> {
    const KEYWORDS: [(&str, Shift); 5] = [
        ("init", Shift::Initialize),
        ("start", Shift::Start),
        ("reset", Shift::Reset),
        ("stop", Shift::Stop),
        ("shutdown", Shift::Shutdown),
    ];
    KEYWORDS
        .iter()
        .find(|(keyword, _)| word.eq_ignore_ascii_case(keyword))
        .map(|&(_, shift)| shift)
}

fn parse_count(word: &str) -> Option<i64> {
    let (digits, negative) = match word.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (word.strip_prefix('+').unwrap_or(word), false),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Parses one line. Blank lines, comments and a `Wait` without a count
/// yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<LaunchCommand>, ScriptError> {
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(None);
    };
    if keyword.starts_with('#') {
        return Ok(None);
    }

    if keyword.eq_ignore_ascii_case("quit") {
        return Ok(Some(LaunchCommand::Quit));
    }

    if keyword.eq_ignore_ascii_case("wait") {
        let Some(count) = words.next().and_then(parse_count) else {
            return Ok(None);
        };
        let millis = count.max(0) as u64;
        let (millis, unknown_unit) = match words.next() {
            None | Some("ms") => (millis, None),
            Some("s") => (millis.saturating_mul(1000), None),
            Some(other) => (millis, Some(other.to_owned())),
        };
        return Ok(Some(LaunchCommand::Wait {
            duration: Duration::from_millis(millis),
            unknown_unit,
        }));
    }

    let Some(shift) = shift_keyword(keyword) else {
        return Err(ScriptError::UnknownCommand(line.trim_end().to_owned()));
    };
    let target = match words.next() {
        None | Some("*") => Target::All,
        Some(word) => match word.parse::<u32>() {
            Ok(id) if id != cmw_core::NONE_ID => Target::Instance(InstanceId::new(id)),
            _ => return Err(ScriptError::InvalidInstance(word.to_owned())),
        },
    };
    Ok(Some(LaunchCommand::LifeCycle { shift, target }))
}

/// How [`Launcher::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Quit,
    EndOfInput,
}

/// Line interpreter forwarding life-cycle commands to a [`CommandSink`].
pub struct Launcher<S> {
    sink: S,
    broadcast_pause: Duration,
    line_delay: Duration,
}

impl<S: CommandSink> Launcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            broadcast_pause: Duration::from_millis(10),
            line_delay: Duration::ZERO,
        }
    }

    /// Pause between the commands of a broadcast.
    pub fn broadcast_pause(mut self, pause: Duration) -> Self {
        self.broadcast_pause = pause;
        self
    }

    /// Pause before reading each line.
    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Reads commands until `Quit` or end of input.
    ///
    /// Interactive sessions get the help text and a prompt; otherwise each
    /// line read is echoed to `out`.
    pub fn run<R, W>(&self, mut input: R, out: &mut W, interactive: bool) -> io::Result<LaunchOutcome>
    where
        R: BufRead,
        W: Write,
    {
        if interactive {
            writeln!(out, "{HELP}")?;
        }
        let mut line = String::new();
        loop {
            if !self.line_delay.is_zero() {
                thread::sleep(self.line_delay);
            }
            if interactive {
                write!(out, "{PROMPT}")?;
                out.flush()?;
            }
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(LaunchOutcome::EndOfInput);
            }
            if !interactive {
                writeln!(out, "{}", line.trim_end_matches(['\r', '\n']))?;
            }

            match parse_line(&line) {
                Ok(None) => {}
                Ok(Some(LaunchCommand::Quit)) => return Ok(LaunchOutcome::Quit),
                Ok(Some(command)) => self.execute(&command, out)?,
                Err(err) => writeln!(out, "{err}")?,
            }
        }
    }

    /// Runs one parsed command.
    pub fn execute<W: Write>(&self, command: &LaunchCommand, out: &mut W) -> io::Result<()> {
        match command {
            LaunchCommand::Quit => {}
            LaunchCommand::Wait {
                duration,
                unknown_unit,
            } => {
                if let Some(unit) = unknown_unit {
                    writeln!(out, "Unknown time unit: {unit}")?;
                }
                writeln!(out, "Waiting for {} ms ...", duration.as_millis())?;
                out.flush()?;
                thread::sleep(*duration);
                writeln!(out, "End of wait")?;
            }
            LaunchCommand::LifeCycle { shift, target } => match target {
                Target::Instance(instance) => {
                    if self.sink.instances().contains(instance) {
                        self.send(*instance, *shift);
                    } else {
                        writeln!(out, "{}", ScriptError::InvalidInstance(instance.raw().to_string()))?;
                    }
                }
                Target::All => {
                    for (n, instance) in self.sink.instances().into_iter().enumerate() {
                        if n > 0 {
                            thread::sleep(self.broadcast_pause);
                        }
                        self.send(instance, *shift);
                    }
                }
            },
        }
        Ok(())
    }

    fn send(&self, instance: InstanceId, shift: Shift) {
        if let Err(err) = self.sink.dispatch_command(instance, shift) {
            log::warn!("{shift} for {instance} not sent: {err}");
        }
    }
}
