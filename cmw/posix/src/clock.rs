//! Monotonic time source.

use std::io;

use cmw_core::Timestamp;
use cmw_rt::Clock;

const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Reads `CLOCK_MONOTONIC` in nanoseconds.
pub fn local_time() -> io::Result<Timestamp> {
    // SAFETY: timespec is plain data, all-zero is a valid value
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: &mut ts points to a properly sized timespec
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Timestamp::from_nanos(
        ts.tv_sec as i64 * NSEC_PER_SEC + ts.tv_nsec as i64,
    ))
}

/// [`Clock`] backed by [`local_time`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        match local_time() {
            Ok(now) => now,
            Err(err) => {
                // CLOCK_MONOTONIC is mandatory on every supported target
                log::error!("clock_gettime(CLOCK_MONOTONIC) failed: {err}");
                Timestamp::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_back() {
        let clock = MonotonicClock;
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.now();
        assert!(a > Timestamp::ZERO);
        assert!(b.as_nanos() - a.as_nanos() >= 2_000_000);
    }
}
