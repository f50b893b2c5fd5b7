//! Wire format of the coordination bus. Frames are a `u32` big-endian
//! length prefix followed by one protobuf-encoded [`BusEnvelope`].

/// Upper bound on a single frame; anything larger is a protocol violation
/// and drops the connection.
pub(crate) const MAX_FRAME_BYTES: u32 = 1 << 20;

/// One bus frame. `target` routes the envelope: a runner name delivers to
/// that runner only, an empty target broadcasts to everyone but the sender.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BusEnvelope {
    #[prost(enumeration = "EnvelopeKind", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub sender: String,
    #[prost(string, tag = "3")]
    pub target: String,
    /// Transition: the forced state name. FieldRequest: the field name.
    /// FieldCallback: the field value as JSON.
    #[prost(string, tag = "4")]
    pub payload: String,
    /// Pairs a FieldCallback with its FieldRequest. Zero for transitions.
    #[prost(uint64, tag = "5")]
    pub correlation_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum EnvelopeKind {
    Transition = 0,
    FieldRequest = 1,
    FieldCallback = 2,
}

impl BusEnvelope {
    pub fn transition(sender: &str, target: &str, state: &str) -> Self {
        Self {
            kind: EnvelopeKind::Transition as i32,
            sender: sender.to_string(),
            target: target.to_string(),
            payload: state.to_string(),
            correlation_id: 0,
        }
    }

    pub fn field_request(sender: &str, target: &str, field: &str, correlation_id: u64) -> Self {
        Self {
            kind: EnvelopeKind::FieldRequest as i32,
            sender: sender.to_string(),
            target: target.to_string(),
            payload: field.to_string(),
            correlation_id,
        }
    }

    pub fn field_callback(sender: &str, target: &str, value: String, correlation_id: u64) -> Self {
        Self {
            kind: EnvelopeKind::FieldCallback as i32,
            sender: sender.to_string(),
            target: target.to_string(),
            payload: value,
            correlation_id,
        }
    }

    /// Decoded kind, `None` for a discriminant this version doesn't know.
    pub fn envelope_kind(&self) -> Option<EnvelopeKind> {
        EnvelopeKind::try_from(self.kind).ok()
    }
}
