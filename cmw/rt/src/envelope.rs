//! IPC envelopes exchanged between tasks.
//!
//! Every envelope starts with a `u32` operation id followed by the
//! operation's fields, host-endian, as produced by `cmw-codec`.

use cmw_codec::{Decode, DeserializationContext, Encode, SerializationContext};
use cmw_core::{
    glue, op, InstanceId, LifeCycleState, RtError, RtResult, Shift, Timestamp, NONE_ID,
};

/// One middleware message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    LifeCycleCommand {
        instance: InstanceId,
        shift: Shift,
    },
    LifeCycleInfo {
        instance: InstanceId,
        state: LifeCycleState,
    },
    RequestResponseTimeout {
        operation_id: u32,
        request_id: u32,
    },
    TimedMessage {
        timeout: Timestamp,
        payload: Vec<u8>,
    },
}

impl Envelope {
    pub fn operation_id(&self) -> u32 {
        match self {
            Envelope::LifeCycleCommand { .. } => op::LIFECYCLE_COMMAND,
            Envelope::LifeCycleInfo { .. } => op::LIFECYCLE_INFO,
            Envelope::RequestResponseTimeout { .. } => op::REQUEST_RESPONSE_TIMEOUT,
            Envelope::TimedMessage { .. } => op::TIMED_MESSAGE,
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + match self {
            Envelope::LifeCycleCommand { .. }
            | Envelope::LifeCycleInfo { .. }
            | Envelope::RequestResponseTimeout { .. } => 8,
            Envelope::TimedMessage { payload, .. } => 8 + payload.len(),
        }
    }

    /// Serializes into `buffer`, returning the number of bytes written.
    pub fn encode_into(&self, buffer: &mut [u8]) -> RtResult<usize> {
        let mut ctx = SerializationContext::start(buffer);
        self.encode(&mut ctx);
        ctx.check_serialize(self.name());
        ctx.finish().map(<[u8]>::len)
    }

    pub fn to_bytes(&self) -> RtResult<Vec<u8>> {
        let mut buffer = vec![0u8; self.encoded_len()];
        let len = self.encode_into(&mut buffer)?;
        buffer.truncate(len);
        Ok(buffer)
    }

    /// Parses a complete envelope.
    pub fn decode(bytes: &[u8]) -> RtResult<Envelope> {
        let mut ctx = DeserializationContext::start(bytes);
        let operation_id = u32::decode(&mut ctx);
        let envelope = match operation_id {
            op::LIFECYCLE_COMMAND => {
                let instance = InstanceId::new(u32::decode(&mut ctx));
                let shift = Shift::try_from(u32::decode(&mut ctx)).map_err(|err| {
                    log::error!("lifecycle_command for {instance}: unknown shift");
                    err
                })?;
                Envelope::LifeCycleCommand { instance, shift }
            }
            op::LIFECYCLE_INFO => {
                let instance = InstanceId::new(u32::decode(&mut ctx));
                let state = LifeCycleState::try_from(u32::decode(&mut ctx)).map_err(|err| {
                    log::error!("lifecycle_info for {instance}: unknown state");
                    err
                })?;
                Envelope::LifeCycleInfo { instance, state }
            }
            op::REQUEST_RESPONSE_TIMEOUT => Envelope::RequestResponseTimeout {
                operation_id: u32::decode(&mut ctx),
                request_id: u32::decode(&mut ctx),
            },
            op::TIMED_MESSAGE => Envelope::TimedMessage {
                timeout: Timestamp::from_nanos(i64::decode(&mut ctx)),
                payload: ctx.deserialize_rest().to_vec(),
            },
            other => {
                log::error!(
                    "unknown operation id {other} in a {} byte message (code {:#x})",
                    bytes.len(),
                    glue::UNKNOWN_OPERATION_ID
                );
                return Err(RtError::InvalidData);
            }
        };
        ctx.finish(envelope.name())?;
        Ok(envelope)
    }

    fn name(&self) -> &'static str {
        match self {
            Envelope::LifeCycleCommand { .. } => "lifecycle_command",
            Envelope::LifeCycleInfo { .. } => "lifecycle_info",
            Envelope::RequestResponseTimeout { .. } => "request_response_timeout",
            Envelope::TimedMessage { .. } => "timed_message",
        }
    }
}

impl Encode for Envelope {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        self.operation_id().encode(ctx);
        match self {
            Envelope::LifeCycleCommand { instance, shift } => {
                instance.raw().encode(ctx);
                shift.raw().encode(ctx);
            }
            Envelope::LifeCycleInfo { instance, state } => {
                instance.raw().encode(ctx);
                state.raw().encode(ctx);
            }
            Envelope::RequestResponseTimeout {
                operation_id,
                request_id,
            } => {
                operation_id.encode(ctx);
                request_id.encode(ctx);
            }
            Envelope::TimedMessage { timeout, payload } => {
                timeout.as_nanos().encode(ctx);
                payload.as_slice().encode(ctx);
            }
        }
    }
}

/// Payload of a timed message: the operation it triggers, then optionally
/// the instance it targets and opaque data.
///
/// A bare trigger is only the operation id, making the whole envelope
/// `{TIMED_MESSAGE, timeout, operation_id}`. It carries no instance and is
/// offered to every component of the receiving task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedTrigger {
    pub operation_id: u32,
    pub instance: Option<InstanceId>,
    pub data: Vec<u8>,
}

impl TimedTrigger {
    pub fn new(instance: InstanceId, operation_id: u32) -> Self {
        Self {
            operation_id,
            instance: Some(instance),
            data: Vec::new(),
        }
    }

    /// Trigger carrying only `operation_id`.
    pub fn bare(operation_id: u32) -> Self {
        Self {
            operation_id,
            instance: None,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8 + self.data.len());
        payload.extend_from_slice(&self.operation_id.to_ne_bytes());
        if self.instance.is_some() || !self.data.is_empty() {
            let instance = self.instance.map_or(NONE_ID, InstanceId::raw);
            payload.extend_from_slice(&instance.to_ne_bytes());
            payload.extend_from_slice(&self.data);
        }
        payload
    }

    pub fn from_payload(payload: &[u8]) -> RtResult<Self> {
        let mut ctx = DeserializationContext::start(payload);
        let operation_id = u32::decode(&mut ctx);
        let instance = if ctx.remaining().is_empty() {
            None
        } else {
            Some(u32::decode(&mut ctx))
                .filter(|&raw| raw != NONE_ID)
                .map(InstanceId::new)
        };
        let data = ctx.deserialize_rest().to_vec();
        ctx.finish("timed_trigger")?;
        Ok(Self {
            operation_id,
            instance,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_command_layout() {
        let envelope = Envelope::LifeCycleCommand {
            instance: InstanceId::new(2),
            shift: Shift::Start,
        };
        let bytes = envelope.to_bytes().unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&33u32.to_ne_bytes());
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.extend_from_slice(&3u32.to_ne_bytes());
        assert_eq!(bytes, expected);
        assert_eq!(Envelope::decode(&bytes), Ok(envelope));
    }

    #[test]
    fn timed_message_carries_payload() {
        let trigger = TimedTrigger::new(InstanceId::new(4), 17).with_data(&[1, 2, 3]);
        let envelope = Envelope::TimedMessage {
            timeout: Timestamp::from_millis(5),
            payload: trigger.to_payload(),
        };
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4 + 8 + 8 + 3);

        let Ok(Envelope::TimedMessage { timeout, payload }) = Envelope::decode(&bytes) else {
            panic!("not a timed message");
        };
        assert_eq!(timeout, Timestamp::from_millis(5));
        assert_eq!(TimedTrigger::from_payload(&payload), Ok(trigger));
    }

    #[test]
    fn operation_id_leads_the_trigger_payload() {
        let payload = TimedTrigger::new(InstanceId::new(4), 17).to_payload();
        assert_eq!(payload[..4], 17u32.to_ne_bytes());
        assert_eq!(payload[4..], 4u32.to_ne_bytes());
    }

    #[test]
    fn decodes_bare_trigger_envelope() {
        let mut bytes = 36u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&5i64.to_ne_bytes());
        bytes.extend_from_slice(&17u32.to_ne_bytes());
        assert_eq!(bytes.len(), 16);

        let Ok(Envelope::TimedMessage { timeout, payload }) = Envelope::decode(&bytes) else {
            panic!("not a timed message");
        };
        assert_eq!(timeout, Timestamp::from_nanos(5));
        assert_eq!(TimedTrigger::from_payload(&payload), Ok(TimedTrigger::bare(17)));

        let bare = Envelope::TimedMessage {
            timeout,
            payload: TimedTrigger::bare(17).to_payload(),
        };
        assert_eq!(bare.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn truncated_instance_is_rejected() {
        let mut payload = 17u32.to_ne_bytes().to_vec();
        payload.extend_from_slice(&[1, 2]);
        assert_eq!(TimedTrigger::from_payload(&payload), Err(RtError::InvalidData));
    }

    #[test]
    fn rejects_unknown_operation_and_shift() {
        let mut bytes = 99u32.to_ne_bytes().to_vec();
        assert_eq!(Envelope::decode(&bytes), Err(RtError::InvalidData));

        bytes = 33u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&12u32.to_ne_bytes());
        assert_eq!(Envelope::decode(&bytes), Err(RtError::InvalidData));
    }

    #[test]
    fn trailing_bytes_tolerated_short_message_rejected() {
        let mut bytes = Envelope::RequestResponseTimeout {
            operation_id: 1,
            request_id: 2,
        }
        .to_bytes()
        .unwrap();
        bytes.push(0);
        // underflow is only logged
        assert!(Envelope::decode(&bytes).is_ok());
        bytes.truncate(8);
        assert_eq!(Envelope::decode(&bytes), Err(RtError::InvalidData));
    }
}
