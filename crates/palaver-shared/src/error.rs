use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed event batch: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Timestamp error: {0}")]
    Timestamp(#[from] TimestampError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Missing '{0}' separator")]
    MissingSeparator(char),

    #[error("Expected {expected} {segment} fields, got {actual}")]
    FieldCount {
        segment: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Timestamp is not a UTC ('Z') instant")]
    NotUtc,

    #[error("Date or time out of range")]
    OutOfRange,
}
