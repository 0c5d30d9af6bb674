//! POSIX port of the component middleware.
//!
//! Supplies the pieces of a hosted deployment that depend on the operating
//! system: a `CLOCK_MONOTONIC` [`Clock`](cmw_rt::Clock), task intakes over
//! Unix datagram sockets, read-only parameter files and the termination
//! signal hook.

#![cfg(unix)]

pub mod clock;
pub mod ipc;
pub mod pinfo;
pub mod signals;

pub use clock::{local_time, MonotonicClock};
pub use ipc::{send_timed_trigger, socket_path, DatagramIntake, DatagramTransport};
pub use pinfo::{PInfo, SeekOrigin};
pub use signals::on_terminate;
