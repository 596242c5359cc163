//! Terminal rendering of store changes.

use palaver_client::{MessageKind, MessageRecord, UserRecord, UNPARSEABLE_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// `PALAVER_OUTPUT=json` selects JSON lines; anything else is plain text.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("PALAVER_OUTPUT").ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

pub fn render_message(record: &MessageRecord, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(record);
    }

    Ok(match record.kind {
        MessageKind::Chat => format!("{} {}: {}", clock(record), record.nick_name, record.body),
        MessageKind::Joined => format!("* {} joined", record.nick_name),
        MessageKind::Parted => format!("* {} left", record.nick_name),
    })
}

pub fn render_roster(users: &[UserRecord]) -> String {
    let names: Vec<&str> = users.iter().map(|u| u.nick_name.as_str()).collect();
    match names.len() {
        0 => "-- nobody online".to_string(),
        n => format!("-- {n} online: {}", names.join(", ")),
    }
}

fn clock(record: &MessageRecord) -> String {
    if record.occurred_at == UNPARSEABLE_TIMESTAMP {
        "??:??:??".to_string()
    } else {
        record.occurred_at.format("%H:%M:%S").to_string()
    }
}
