#![no_std]
#![forbid(unsafe_code)]

//! # CMW Core
//!
//! Core types shared by every layer of the component middleware: the status
//! and error taxonomy, the component life-cycle state machine, task and
//! instance identifiers, reserved IPC operation ids and timestamps.
//!
//! The crate is `no_std` so that generated component glue can depend on it
//! from constrained targets.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod ids;
pub mod lifecycle;
pub mod operations;
pub mod time;

pub use ids::*;
pub use lifecycle::*;
pub use operations::*;
pub use time::*;

/// Middleware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the middleware
pub type RtResult<T> = Result<T, RtError>;

/// Error taxonomy for middleware operations.
///
/// `SUCCESS` is represented by `Ok(..)`; every other status code has a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtError {
    /// Generic failure (full/empty container, out-of-range index, ...)
    Failure,
    /// An input argument is outside its domain
    InvalidInParameter,
    /// An output argument cannot receive the result
    InvalidOutParameter,
    /// Received or stored data is malformed
    InvalidData,
    /// A bounded wait elapsed
    Timeout,
}

impl RtError {
    /// Numeric status code of this error.
    pub const fn code(self) -> u32 {
        Status::from_error(self).code()
    }
}

impl fmt::Display for RtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtError::Failure => write!(f, "Operation failed"),
            RtError::InvalidInParameter => write!(f, "Invalid input parameter"),
            RtError::InvalidOutParameter => write!(f, "Invalid output parameter"),
            RtError::InvalidData => write!(f, "Invalid data"),
            RtError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RtError {}

#[cfg(feature = "defmt")]
impl defmt::Format for RtError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            RtError::Failure => defmt::write!(fmt, "Failure"),
            RtError::InvalidInParameter => defmt::write!(fmt, "InvalidInParameter"),
            RtError::InvalidOutParameter => defmt::write!(fmt, "InvalidOutParameter"),
            RtError::InvalidData => defmt::write!(fmt, "InvalidData"),
            RtError::Timeout => defmt::write!(fmt, "Timeout"),
        }
    }
}

/// Wire-level status code as exchanged with generated component glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Success = 0,
    Failure = 1,
    InvalidInParameter = 2,
    InvalidOutParameter = 3,
    InvalidData = 4,
    Timeout = 7,
}

impl Status {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_error(err: RtError) -> Self {
        match err {
            RtError::Failure => Status::Failure,
            RtError::InvalidInParameter => Status::InvalidInParameter,
            RtError::InvalidOutParameter => Status::InvalidOutParameter,
            RtError::InvalidData => Status::InvalidData,
            RtError::Timeout => Status::Timeout,
        }
    }

    /// Converts the status back into a `Result`.
    pub const fn into_result(self) -> RtResult<()> {
        match self {
            Status::Success => Ok(()),
            Status::Failure => Err(RtError::Failure),
            Status::InvalidInParameter => Err(RtError::InvalidInParameter),
            Status::InvalidOutParameter => Err(RtError::InvalidOutParameter),
            Status::InvalidData => Err(RtError::InvalidData),
            Status::Timeout => Err(RtError::Timeout),
        }
    }
}

impl<T> From<RtResult<T>> for Status {
    fn from(result: RtResult<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(err) => Status::from_error(err),
        }
    }
}

impl TryFrom<u32> for Status {
    type Error = RtError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Success),
            1 => Ok(Status::Failure),
            2 => Ok(Status::InvalidInParameter),
            3 => Ok(Status::InvalidOutParameter),
            4 => Ok(Status::InvalidData),
            7 => Ok(Status::Timeout),
            _ => Err(RtError::InvalidData),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::InvalidInParameter => "INVALID_IN_PARAMETER",
            Status::InvalidOutParameter => "INVALID_OUT_PARAMETER",
            Status::InvalidData => "INVALID_DATA",
            Status::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_wire_values() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(RtError::Failure.code(), 1);
        assert_eq!(RtError::InvalidInParameter.code(), 2);
        assert_eq!(RtError::InvalidOutParameter.code(), 3);
        assert_eq!(RtError::InvalidData.code(), 4);
        assert_eq!(RtError::Timeout.code(), 7);
    }

    #[test]
    fn status_round_trips_through_result() {
        let failed: RtResult<()> = Err(RtError::Timeout);
        let status = Status::from(failed);
        assert_eq!(status, Status::Timeout);
        assert_eq!(status.into_result(), Err(RtError::Timeout));
        assert_eq!(Status::from(Ok::<u8, RtError>(3)), Status::Success);
    }

    #[test]
    fn unknown_status_code_is_invalid_data() {
        assert_eq!(Status::try_from(5), Err(RtError::InvalidData));
        assert_eq!(Status::try_from(7), Ok(Status::Timeout));
    }
}
