//! Component life-cycle state machine
//!
//! Every component instance owns one [`LifeCycleState`]. Commands arrive as
//! [`Shift`] values and are applied with [`next_state`], a pure function over
//! a fixed transition table. Shifts that do not match the current state are
//! no-ops, not errors.

use core::fmt;

use crate::RtError;

/// Life-cycle state of a component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum LifeCycleState {
    /// Initial state, instance not yet risen
    #[default]
    Unavailable = 0,
    /// Risen but not initialized
    Idle = 1,
    /// Initialized, not running
    Ready = 2,
    /// Running
    Running = 3,
}

impl LifeCycleState {
    /// All states in numeric order
    pub const ALL: [LifeCycleState; 4] = [
        LifeCycleState::Unavailable,
        LifeCycleState::Idle,
        LifeCycleState::Ready,
        LifeCycleState::Running,
    ];

    /// Display name of the state
    pub const fn name(self) -> &'static str {
        match self {
            LifeCycleState::Unavailable => "UNAVAILABLE",
            LifeCycleState::Idle => "IDLE",
            LifeCycleState::Ready => "READY",
            LifeCycleState::Running => "RUNNING",
        }
    }

    /// Numeric wire value
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for LifeCycleState {
    type Error = RtError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LifeCycleState::Unavailable),
            1 => Ok(LifeCycleState::Idle),
            2 => Ok(LifeCycleState::Ready),
            3 => Ok(LifeCycleState::Running),
            _ => Err(RtError::InvalidData),
        }
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LifeCycleState {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.name());
    }
}

/// Requested life-cycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Shift {
    #[default]
    None = 0,
    Rise = 1,
    Initialize = 2,
    Start = 3,
    Reset = 4,
    Stop = 5,
    Shutdown = 6,
    Kill = 7,
}

impl Shift {
    /// All shifts in numeric order
    pub const ALL: [Shift; 8] = [
        Shift::None,
        Shift::Rise,
        Shift::Initialize,
        Shift::Start,
        Shift::Reset,
        Shift::Stop,
        Shift::Shutdown,
        Shift::Kill,
    ];

    /// Display name of the shift
    pub const fn name(self) -> &'static str {
        match self {
            Shift::None => "shift0-undefined",
            Shift::Rise => "RISE",
            Shift::Initialize => "INITIALIZE",
            Shift::Start => "START",
            Shift::Reset => "RESET",
            Shift::Stop => "STOP",
            Shift::Shutdown => "SHUTDOWN",
            Shift::Kill => "KILL",
        }
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Shift {
    type Error = RtError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Shift::ALL
            .get(value as usize)
            .copied()
            .ok_or(RtError::InvalidData)
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Shift {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.name());
    }
}

/// Outcome of applying a shift to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateStatus {
    pub state: LifeCycleState,
    pub changed: bool,
}

impl StateStatus {
    const fn to(state: LifeCycleState) -> Self {
        Self { state, changed: true }
    }

    const fn stay(state: LifeCycleState) -> Self {
        Self {
            state,
            changed: false,
        }
    }
}

/// Applies `shift` to `state`.
///
/// Pairs missing from the transition table return the original state with
/// `changed == false`.
pub const fn next_state(state: LifeCycleState, shift: Shift) -> StateStatus {
    use LifeCycleState::*;

    match (state, shift) {
        (Unavailable, Shift::Rise) => StateStatus::to(Idle),
        (Idle, Shift::Initialize) => StateStatus::to(Ready),
        (Ready, Shift::Start) => StateStatus::to(Running),
        (Running, Shift::Reset) => StateStatus::to(Running),
        (Running, Shift::Stop) => StateStatus::to(Ready),
        (Idle | Ready | Running, Shift::Shutdown) => StateStatus::to(Idle),
        (_, Shift::Kill) => StateStatus::to(Unavailable),
        _ => StateStatus::stay(state),
    }
}

/// Entrypoint slot of a component, in table order.
///
/// The fifth slot carries the `reset` entrypoint run on the `RESET`
/// self-transition of a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrypointSlot {
    Initialize = 0,
    Start = 1,
    Stop = 2,
    Shutdown = 3,
    Reset = 4,
}

impl EntrypointSlot {
    /// Number of slots in an entrypoint table
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Slot to invoke after `shift` produced a changed transition.
    ///
    /// `RISE` and `KILL` have no entrypoint.
    pub const fn for_shift(shift: Shift) -> Option<Self> {
        match shift {
            Shift::Initialize => Some(EntrypointSlot::Initialize),
            Shift::Start => Some(EntrypointSlot::Start),
            Shift::Stop => Some(EntrypointSlot::Stop),
            Shift::Shutdown => Some(EntrypointSlot::Shutdown),
            Shift::Reset => Some(EntrypointSlot::Reset),
            Shift::None | Shift::Rise | Shift::Kill => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            EntrypointSlot::Initialize => "initialize",
            EntrypointSlot::Start => "start",
            EntrypointSlot::Stop => "stop",
            EntrypointSlot::Shutdown => "shutdown",
            EntrypointSlot::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_rejected_from_unavailable() {
        let status = next_state(LifeCycleState::Unavailable, Shift::Shutdown);
        assert_eq!(status.state, LifeCycleState::Unavailable);
        assert!(!status.changed);
    }

    #[test]
    fn none_shift_never_changes() {
        for state in LifeCycleState::ALL {
            assert_eq!(next_state(state, Shift::None), StateStatus::stay(state));
        }
    }

    #[test]
    fn entrypoint_slots_follow_shifts() {
        assert_eq!(EntrypointSlot::for_shift(Shift::Reset), Some(EntrypointSlot::Reset));
        assert_eq!(EntrypointSlot::for_shift(Shift::Rise), None);
        assert_eq!(EntrypointSlot::for_shift(Shift::Kill), None);
        assert_eq!(EntrypointSlot::Reset.index(), EntrypointSlot::COUNT - 1);
    }
}
