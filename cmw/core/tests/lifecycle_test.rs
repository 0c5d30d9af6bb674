//! Transition table tests for cmw-core

use cmw_core::{next_state, LifeCycleState, Shift};

const TABLE: &[(LifeCycleState, Shift, LifeCycleState)] = &[
    (LifeCycleState::Unavailable, Shift::Rise, LifeCycleState::Idle),
    (LifeCycleState::Idle, Shift::Initialize, LifeCycleState::Ready),
    (LifeCycleState::Ready, Shift::Start, LifeCycleState::Running),
    (LifeCycleState::Running, Shift::Reset, LifeCycleState::Running),
    (LifeCycleState::Running, Shift::Stop, LifeCycleState::Ready),
    (LifeCycleState::Idle, Shift::Shutdown, LifeCycleState::Idle),
    (LifeCycleState::Ready, Shift::Shutdown, LifeCycleState::Idle),
    (LifeCycleState::Running, Shift::Shutdown, LifeCycleState::Idle),
    (LifeCycleState::Unavailable, Shift::Kill, LifeCycleState::Unavailable),
    (LifeCycleState::Idle, Shift::Kill, LifeCycleState::Unavailable),
    (LifeCycleState::Ready, Shift::Kill, LifeCycleState::Unavailable),
    (LifeCycleState::Running, Shift::Kill, LifeCycleState::Unavailable),
];

fn documented(state: LifeCycleState, shift: Shift) -> Option<LifeCycleState> {
    TABLE
        .iter()
        .find(|(from, s, _)| *from == state && *s == shift)
        .map(|(_, _, to)| *to)
}

#[test]
fn test_documented_transitions_change() {
    for &(from, shift, to) in TABLE {
        let status = next_state(from, shift);
        assert_eq!(status.state, to, "{from} --{shift}-->");
        assert!(status.changed, "{from} --{shift}--> should be flagged");
    }
}

#[test]
fn test_every_other_pair_is_a_no_op() {
    for state in LifeCycleState::ALL {
        for shift in Shift::ALL {
            if documented(state, shift).is_some() {
                continue;
            }
            let status = next_state(state, shift);
            assert_eq!(status.state, state);
            assert!(!status.changed, "{state} --{shift}--> must be a no-op");
        }
    }
}

#[test]
fn test_full_cycle() {
    let mut state = LifeCycleState::default();
    for shift in [Shift::Rise, Shift::Initialize, Shift::Start, Shift::Stop, Shift::Shutdown] {
        state = next_state(state, shift).state;
    }
    assert_eq!(state, LifeCycleState::Idle);
}

#[test]
fn test_names() {
    assert_eq!(LifeCycleState::Ready.name(), "READY");
    assert_eq!(Shift::None.name(), "shift0-undefined");
    assert_eq!(Shift::Kill.to_string(), "KILL");
}

#[test]
fn test_decode_from_wire() {
    assert_eq!(Shift::try_from(4), Ok(Shift::Reset));
    assert!(Shift::try_from(8).is_err());
    assert_eq!(LifeCycleState::try_from(3), Ok(LifeCycleState::Running));
    assert!(LifeCycleState::try_from(4).is_err());
}
