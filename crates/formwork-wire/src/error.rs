use thiserror::Error;

/// Contract violations raised while encoding a payload. None of these are
/// recoverable at the call site; they mean the component tree handed the
/// encoder something the external decoder cannot represent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("unsupported value type `{type_name}` for property `{key}`")]
    UnsupportedType { key: String, type_name: &'static str },

    #[error("invalid reserved byte count {requested}: must be a positive whole number")]
    InvalidReserve { requested: f64 },

    #[error("payload has {count} fields but the marker alphabet only covers {max}")]
    TooManyFields { count: usize, max: usize },

    #[error("payload does not start with header `{expected}`")]
    MissingHeader { expected: &'static str },

    #[error("payload is {actual} bytes but the field plan needs {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("field {index} is malformed: {reason}")]
    MalformedField { index: usize, reason: &'static str },
}
