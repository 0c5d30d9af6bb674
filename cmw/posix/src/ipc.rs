//! Task intakes over Unix datagram sockets.
//!
//! Task `n` of a deployment listens on `<dir>/task-<n>.sock`; one datagram
//! carries one envelope.

use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cmw_core::{RtError, RtResult, TaskId, Timestamp};
use cmw_rt::{Envelope, Intake, RuntimeConfig, TimedTrigger, Transport, TransportError};

/// Socket path of `task` under `dir`.
pub fn socket_path(dir: &Path, task: TaskId) -> PathBuf {
    dir.join(format!("task-{}.sock", task.raw()))
}

/// Sends envelopes to the sockets under one directory.
pub struct DatagramTransport {
    dir: PathBuf,
    socket: UnixDatagram,
    max_message_size: usize,
}

impl DatagramTransport {
    pub fn new(dir: impl Into<PathBuf>, config: &RuntimeConfig) -> io::Result<Self> {
        Ok(Self {
            dir: dir.into(),
            socket: UnixDatagram::unbound()?,
            max_message_size: config.max_message_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Transport for DatagramTransport {
    fn deliver(&self, task: TaskId, message: &[u8]) -> Result<(), TransportError> {
        if message.len() > self.max_message_size {
            return Err(TransportError::TooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }
        let path = socket_path(&self.dir, task);
        match self.socket.send_to(message, &path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(TransportError::UnknownTask(task)),
            Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => Err(TransportError::Closed),
            Err(err) => {
                log::error!("send to {} failed: {err}", path.display());
                Err(TransportError::Io(err))
            }
        }
    }
}

/// Bound socket receiving the envelopes of one task.
///
/// The socket file is removed on drop.
pub struct DatagramIntake {
    task: TaskId,
    path: PathBuf,
    socket: UnixDatagram,
    buffer_size: usize,
    closed: AtomicBool,
}

impl DatagramIntake {
    /// Binds the socket of `task` under `dir`, replacing a stale file.
    pub fn bind(dir: &Path, task: TaskId, config: &RuntimeConfig) -> io::Result<Self> {
        let path = socket_path(dir, task);
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("removed stale socket {}", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        let socket = UnixDatagram::bind(&path)?;
        log::debug!("{task} listening on {}", path.display());
        Ok(Self {
            task,
            path,
            socket,
            buffer_size: config.max_message_size,
            closed: AtomicBool::new(false),
        })
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes pending and later [`receive`](Intake::receive) calls return
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Err(err) = self.socket.shutdown(Shutdown::Read) {
            log::debug!("{}: shutdown of {} failed: {err}", self.task, self.path.display());
        }
    }
}

impl Intake for DatagramIntake {
    fn receive(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        // a zero read timeout is rejected by the socket
        let timeout = timeout.map(|t| t.max(Duration::from_micros(1)));
        self.socket.set_read_timeout(timeout)?;

        let mut buffer = vec![0u8; self.buffer_size];
        let received = self.socket.recv(&mut buffer);
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        match received {
            Ok(len) => {
                buffer.truncate(len);
                Ok(Some(buffer))
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl Drop for DatagramIntake {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::debug!("cannot remove {}: {err}", self.path.display());
        }
    }
}

/// Sends a `TIMED_MESSAGE` carrying `trigger` to the socket at `path`.
pub fn send_timed_trigger(trigger: &TimedTrigger, timeout: Timestamp, path: &Path) -> RtResult<()> {
    let envelope = Envelope::TimedMessage {
        timeout,
        payload: trigger.to_payload(),
    };
    let bytes = envelope.to_bytes()?;
    let socket = UnixDatagram::unbound().map_err(|err| {
        log::error!("send_timed_trigger: cannot create socket: {err}");
        RtError::Failure
    })?;
    socket.send_to(&bytes, path).map_err(|err| {
        log::error!("send_timed_trigger to {}: {err}", path.display());
        RtError::Failure
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmw_core::InstanceId;

    fn config() -> RuntimeConfig {
        RuntimeConfig::builder().max_message_size(64).build()
    }

    #[test]
    fn delivers_to_bound_task() {
        let dir = tempfile::tempdir().unwrap();
        let intake = DatagramIntake::bind(dir.path(), TaskId::new(3), &config()).unwrap();
        let transport = DatagramTransport::new(dir.path(), &config()).unwrap();

        transport.deliver(TaskId::new(3), b"hello").unwrap();
        let message = intake.receive(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(message.as_deref(), Some(&b"hello"[..]));
        assert!(intake.receive(Some(Duration::from_millis(5))).unwrap().is_none());
    }

    #[test]
    fn unknown_task_and_oversized_message() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DatagramTransport::new(dir.path(), &config()).unwrap();
        assert!(matches!(
            transport.deliver(TaskId::new(0), b"x"),
            Err(TransportError::UnknownTask(_))
        ));
        assert!(matches!(
            transport.deliver(TaskId::new(0), &[0u8; 65]),
            Err(TransportError::TooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn closed_intake_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let intake = DatagramIntake::bind(dir.path(), TaskId::new(0), &config()).unwrap();
        let path = intake.path().to_owned();
        intake.close();
        assert!(matches!(intake.receive(None), Err(TransportError::Closed)));
        drop(intake);
        assert!(!path.exists());
    }

    #[test]
    fn timed_trigger_reaches_socket() {
        let dir = tempfile::tempdir().unwrap();
        let intake = DatagramIntake::bind(dir.path(), TaskId::new(1), &config()).unwrap();
        let trigger = TimedTrigger::new(InstanceId::new(5), 9).with_data(&[7]);

        send_timed_trigger(&trigger, Timestamp::from_millis(3), intake.path()).unwrap();
        let bytes = intake.receive(Some(Duration::from_secs(1))).unwrap().unwrap();
        let Ok(Envelope::TimedMessage { timeout, payload }) = Envelope::decode(&bytes) else {
            panic!("not a timed message");
        };
        assert_eq!(timeout, Timestamp::from_millis(3));
        assert_eq!(TimedTrigger::from_payload(&payload), Ok(trigger));
    }

    #[test]
    fn bare_trigger_is_sixteen_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let intake = DatagramIntake::bind(dir.path(), TaskId::new(0), &config()).unwrap();

        send_timed_trigger(&TimedTrigger::bare(17), Timestamp::from_nanos(5), intake.path()).unwrap();
        let bytes = intake.receive(Some(Duration::from_secs(1))).unwrap().unwrap();
        let mut expected = 36u32.to_ne_bytes().to_vec();
        expected.extend_from_slice(&5i64.to_ne_bytes());
        expected.extend_from_slice(&17u32.to_ne_bytes());
        assert_eq!(bytes, expected);
    }
}
