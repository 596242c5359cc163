//! Long-polling chat synchronization client.
//!
//! Joins a chat server, tails its event log with a sequence cursor and keeps
//! observable message and user stores in step with it.

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod retry;
pub mod store;
pub mod transport;

pub use client::{MessageSender, SyncClient, SyncHandle, SyncState, UNPARSEABLE_TIMESTAMP};
pub use config::{ClientConfig, Identity};
pub use error::{ClientError, Result};
pub use store::{
    DuplicateJoinPolicy, MessageKind, MessageRecord, MessageStore, Subscription, UserChange,
    UserRecord, UserStore,
};
pub use transport::{ChatTransport, HttpTransport};
