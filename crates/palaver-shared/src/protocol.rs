use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolError;

/// A single entry of the server's event log, as delivered by `eventpoll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    /// Server-assigned position in the event log. Increasing, not contiguous.
    pub sequence: u64,
    /// What happened (`message`, `join`, `part`, or something we don't know).
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Nickname the event is about.
    #[serde(default, deserialize_with = "null_as_default")]
    pub nick_name: String,
    /// Message text. Only meaningful for `message` events.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// UTC timestamp text, `YYYY-MM-DDTHH:MM:SS[.fff]Z`. Empty when absent.
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_time: String,
    /// Avatar key for the nickname.
    #[serde(rename = "gravatar", default, deserialize_with = "null_as_default")]
    pub avatar_key: String,
}

/// Missing and `null` text fields both read as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Event type tag. Unrecognised tags are kept verbatim so they can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Message,
    Join,
    Part,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Join => "join",
            Self::Part => "part",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "message" => Self::Message,
            "join" => Self::Join,
            "part" => Self::Part,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch entry that could not be read as a [`ChatEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Position in the response array.
    pub index: usize,
    /// The entry's `sequence`, if that much was still readable.
    pub sequence: Option<u64>,
    pub reason: String,
}

/// A decoded `eventpoll` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<ChatEvent>,
    pub rejected: Vec<RejectedEntry>,
}

impl EventBatch {
    /// Number of entries the server sent, readable or not.
    pub fn len(&self) -> usize {
        self.events.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.rejected.is_empty()
    }
}

impl From<Vec<ChatEvent>> for EventBatch {
    fn from(events: Vec<ChatEvent>) -> Self {
        Self {
            events,
            rejected: Vec::new(),
        }
    }
}

/// Decode the body of an `eventpoll` response.
///
/// Only a body that is not a JSON array fails as a whole. Entries are
/// decoded one by one; those that don't fit [`ChatEvent`] land in
/// [`EventBatch::rejected`] so the caller can still move past them.
pub fn decode_batch(body: &str) -> Result<EventBatch, ProtocolError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let mut batch = EventBatch::default();

    for (index, entry) in entries.into_iter().enumerate() {
        let sequence = entry.get("sequence").and_then(serde_json::Value::as_u64);
        match serde_json::from_value::<ChatEvent>(entry) {
            Ok(event) => batch.events.push(event),
            Err(e) => batch.rejected.push(RejectedEntry {
                index,
                sequence,
                reason: e.to_string(),
            }),
        }
    }

    Ok(batch)
}
