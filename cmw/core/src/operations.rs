//! Reserved IPC operation ids and middleware error codes

/// Largest serialized operation accepted by the transports
pub const MAX_OPERATION_SIZE: usize = 256 * 1024;

/// Reserved operation ids carried in the first word of every envelope
pub mod op {
    /// `{instance_id: u32, shift: u32}`
    pub const LIFECYCLE_COMMAND: u32 = 33;
    /// `{instance_id: u32, state: u32}`
    pub const LIFECYCLE_INFO: u32 = 34;
    /// `{operation_id: u32, request_id: u32}`
    pub const REQUEST_RESPONSE_TIMEOUT: u32 = 35;
    /// `{timeout: i64, payload}`
    pub const TIMED_MESSAGE: u32 = 36;
}

/// Error codes raised inside the middleware itself
pub mod ldp {
    pub const LOCAL_EXEC_KILLED: u32 = 0x1001;
    pub const DESERIAL_OVERFLOW: u32 = 0x1002;
    pub const DESERIAL_UNDERFLOW: u32 = 0x1003;
    pub const SERIAL_CHECK: u32 = 0x1004;
    pub const SERIAL_OVERFLOW: u32 = 0x1005;
}

/// Error codes raised by generated component glue
pub mod glue {
    pub const UNKNOWN: u32 = 0;
    pub const FIFOSIZE_OVERFLOW: u32 = 1;
    pub const MAXVERSION_OVERFLOW: u32 = 2;
    pub const MAXDEFERRED_OVERFLOW: u32 = 3;
    pub const MAXREQUESTS_OVERFLOW: u32 = 4;
    pub const UNKNOWN_OPERATION_ID: u32 = 0x10;
}

/// Human-readable name of a middleware or glue error code
pub const fn error_name(code: u32) -> &'static str {
    match code {
        ldp::LOCAL_EXEC_KILLED => "LOCAL_EXEC_KILLED",
        ldp::DESERIAL_OVERFLOW => "DESERIAL_OVERFLOW",
        ldp::DESERIAL_UNDERFLOW => "DESERIAL_UNDERFLOW",
        ldp::SERIAL_CHECK => "SERIAL_CHECK",
        ldp::SERIAL_OVERFLOW => "SERIAL_OVERFLOW",
        glue::FIFOSIZE_OVERFLOW => "FIFOSIZE_OVERFLOW",
        glue::MAXVERSION_OVERFLOW => "MAXVERSION_OVERFLOW",
        glue::MAXDEFERRED_OVERFLOW => "MAXDEFERRED_OVERFLOW",
        glue::MAXREQUESTS_OVERFLOW => "MAXREQUESTS_OVERFLOW",
        glue::UNKNOWN_OPERATION_ID => "UNKNOWN_OPERATION_ID",
        _ => "UNKNOWN",
    }
}
