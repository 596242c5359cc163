// Wire protocol shared by the palaver chat client and its tooling.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod timestamp;

pub use error::{ProtocolError, TimestampError};
pub use protocol::{decode_batch, ChatEvent, EventBatch, EventKind, RejectedEntry};
pub use timestamp::parse_timestamp;
