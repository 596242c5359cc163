/// Application name
pub const APP_NAME: &str = "palaver";

/// Default chat server base address
pub const DEFAULT_SERVER_URI: &str = "http://localhost:8080/";

/// Presence endpoint, relative to the server base address
pub const JOIN_ENDPOINT: &str = "join";

/// Long-poll event log endpoint
pub const EVENT_POLL_ENDPOINT: &str = "eventpoll";

/// Message posting endpoint
pub const MESSAGE_ENDPOINT: &str = "message";

/// Query parameter names shared by all endpoints
pub const PARAM_NICK_NAME: &str = "nickName";
pub const PARAM_EMAIL: &str = "email";
pub const PARAM_SINCE: &str = "since";
pub const PARAM_MESSAGE: &str = "message";

/// Body of the synthetic record appended when a user joins
pub const JOINED_MARKER: &str = "Joined";

/// Body of the synthetic record appended when a user parts
pub const PARTED_MARKER: &str = "Parted";

/// Initial event log cursor; the server answers `since=0` with its full backlog
pub const INITIAL_CURSOR: u64 = 0;
