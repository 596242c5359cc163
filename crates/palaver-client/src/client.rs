//! The synchronization client.
//!
//! A [`SyncClient`] announces presence, then long-polls the server's event
//! log forever, replaying each batch into the message and user stores. Only
//! one poll is ever in flight and batches are applied in receipt order, so
//! the cursor and the stores need no further coordination.
//!
//! Lifecycle: `Idle → Joining → Polling → Stopped`. The only ways out of
//! `Polling` are cancellation of the token passed to [`SyncClient::run`]
//! (or [`SyncHandle::stop`]), and join exhaustion when a join attempt limit
//! is configured.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use palaver_shared::constants::{JOINED_MARKER, PARTED_MARKER};
use palaver_shared::protocol::{ChatEvent, EventBatch, EventKind, RejectedEntry};
use palaver_shared::timestamp::parse_timestamp;

use crate::config::{ClientConfig, Identity};
use crate::cursor::SyncCursor;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::store::{MessageKind, MessageRecord, MessageStore, UserRecord, UserStore};
use crate::transport::{ChatTransport, HttpTransport};

/// Instant recorded for events whose `dateTime` could not be parsed.
pub const UNPARSEABLE_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Joining,
    Polling,
    Stopped,
}

pub struct SyncClient<T: ChatTransport> {
    transport: Arc<T>,
    identity: Identity,
    cursor: SyncCursor,
    messages: MessageStore,
    users: UserStore,
    retry: RetryPolicy,
    poll_timeout: Duration,
    request_timeout: Duration,
    join_max_attempts: Option<u32>,
    state: watch::Sender<SyncState>,
}

impl SyncClient<HttpTransport> {
    /// Build a client talking HTTP to `config.server_uri`.
    pub fn connect(
        config: &ClientConfig,
        messages: MessageStore,
        users: UserStore,
    ) -> Result<Self> {
        let transport = HttpTransport::new(&config.server_uri, config.request_timeout)?;
        info!(
            server = %transport.base(),
            nick = %config.identity.nick_name,
            "Chat transport ready"
        );
        Ok(Self::new(Arc::new(transport), config, messages, users))
    }
}

impl<T: ChatTransport> SyncClient<T> {
    pub fn new(
        transport: Arc<T>,
        config: &ClientConfig,
        messages: MessageStore,
        users: UserStore,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            transport,
            identity: config.identity.clone(),
            cursor: SyncCursor::new(),
            messages,
            users,
            retry: config.retry,
            poll_timeout: config.poll_timeout,
            request_timeout: config.request_timeout,
            join_max_attempts: config.join_max_attempts,
            state,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.position()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Handle for posting messages from other tasks.
    pub fn sender(&self) -> MessageSender<T> {
        MessageSender {
            transport: self.transport.clone(),
            identity: self.identity.clone(),
            timeout: self.request_timeout,
        }
    }

    /// Post a chat message without waiting for the outcome.
    pub fn send(&self, text: impl Into<String>) {
        self.sender().send(text);
    }

    fn set_state(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Sync state changed");
        }
    }

    /// Announce presence, retrying with backoff until the server accepts it,
    /// the attempt limit is reached, or `cancel` fires.
    pub async fn join(&self, cancel: &CancellationToken) -> Result<()> {
        self.set_state(SyncState::Joining);
        let mut attempt: u32 = 0;

        loop {
            let request = with_timeout(self.request_timeout, self.transport.join(&self.identity));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(SyncState::Stopped);
                    return Err(ClientError::Cancelled);
                }
                outcome = request => outcome,
            };
            attempt = attempt.saturating_add(1);

            let err = match outcome {
                Ok(()) => {
                    info!(nick = %self.identity.nick_name, attempts = attempt, "Joined chat");
                    self.set_state(SyncState::Polling);
                    return Ok(());
                }
                Err(err) => err,
            };

            if self.join_max_attempts.is_some_and(|max| attempt >= max) {
                error!(attempts = attempt, error = %err, "Giving up on join");
                self.set_state(SyncState::Stopped);
                return Err(ClientError::JoinFailed {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            warn!(
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Join failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(SyncState::Stopped);
                    return Err(ClientError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One long-poll for events newer than the cursor, bounded by the poll timeout.
    pub async fn poll_once(&self) -> Result<EventBatch> {
        with_timeout(
            self.poll_timeout,
            self.transport.poll(self.cursor.position(), &self.identity),
        )
        .await
    }

    /// Replay a batch into the stores, in order.
    pub fn apply_batch(&mut self, events: &[ChatEvent]) {
        for event in events {
            self.apply_event(event);
        }
        if !events.is_empty() {
            debug!(count = events.len(), cursor = self.cursor.position(), "Applied event batch");
        }
    }

    /// Move the cursor past entries that could not be decoded, so the
    /// server stops redelivering them.
    pub fn skip_rejected(&mut self, rejected: &[RejectedEntry]) {
        for entry in rejected {
            warn!(
                index = entry.index,
                seq = ?entry.sequence,
                reason = %entry.reason,
                "Skipping malformed event"
            );
            if let Some(sequence) = entry.sequence {
                self.cursor.observe(sequence);
            }
        }
    }

    /// Apply a polled batch. A non-empty batch that leaves the cursor where
    /// it was is reported as [`ClientError::Stalled`].
    pub fn apply_poll(&mut self, batch: &EventBatch) -> Result<()> {
        let before = self.cursor.position();
        self.apply_batch(&batch.events);
        self.skip_rejected(&batch.rejected);

        if batch.is_empty() || self.cursor.position() > before {
            Ok(())
        } else {
            Err(ClientError::Stalled(before))
        }
    }

    fn apply_event(&mut self, event: &ChatEvent) {
        self.cursor.observe(event.sequence);

        match &event.kind {
            EventKind::Message => {
                debug!(seq = event.sequence, nick = %event.nick_name, "Message event");
                self.messages
                    .append_message(self.record(event, &event.message, MessageKind::Chat));
            }

            EventKind::Join => {
                debug!(seq = event.sequence, nick = %event.nick_name, "Join event");
                let added = self.users.add_user(UserRecord {
                    nick_name: event.nick_name.clone(),
                    avatar_key: event.avatar_key.clone(),
                });
                if !added {
                    debug!(nick = %event.nick_name, "User already listed, duplicate join dropped");
                }
                self.messages
                    .append_message(self.record(event, JOINED_MARKER, MessageKind::Joined));
            }

            EventKind::Part => {
                debug!(seq = event.sequence, nick = %event.nick_name, "Part event");
                let removed = self
                    .users
                    .remove_first_matching(|user| user.nick_name == event.nick_name);
                if removed.is_none() {
                    debug!(nick = %event.nick_name, "Part for a user who was not listed");
                }
                self.messages
                    .append_message(self.record(event, PARTED_MARKER, MessageKind::Parted));
            }

            EventKind::Unknown(kind) => {
                debug!(seq = event.sequence, kind = %kind, "Ignoring unknown event type");
            }
        }
    }

    fn record(&self, event: &ChatEvent, body: &str, kind: MessageKind) -> MessageRecord {
        let occurred_at = match parse_timestamp(&event.date_time) {
            Ok(instant) => instant,
            Err(e) => {
                warn!(
                    seq = event.sequence,
                    date_time = %event.date_time,
                    error = %e,
                    "Unparseable event timestamp, using sentinel"
                );
                UNPARSEABLE_TIMESTAMP
            }
        };

        MessageRecord {
            nick_name: event.nick_name.clone(),
            body: body.to_string(),
            occurred_at,
            avatar_key: event.avatar_key.clone(),
            kind,
        }
    }

    /// Join, then poll until `cancel` fires.
    ///
    /// Every poll outcome leads to another poll. Failures (transport,
    /// timeout, undecodable body, a batch that makes no progress) are logged
    /// and followed by a backoff delay; a successful poll resets the backoff
    /// and the next poll goes out immediately.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        match self.join(&cancel).await {
            Ok(()) => {}
            Err(ClientError::Cancelled) => {
                info!("Sync cancelled before join completed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut failures: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            let err = match outcome.and_then(|batch| self.apply_poll(&batch)) {
                Ok(()) => {
                    failures = 0;
                    continue;
                }
                Err(err) => err,
            };

            let delay = self.retry.delay_for_attempt(failures);
            failures = failures.saturating_add(1);
            warn!(
                error = %err,
                transport = err.is_transport(),
                cursor = self.cursor.position(),
                consecutive_failures = failures,
                delay_ms = delay.as_millis() as u64,
                "Event poll failed"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SyncState::Stopped);
        info!(cursor = self.cursor.position(), "Sync loop stopped");
        Ok(())
    }

    /// Run the client on a background task.
    pub fn spawn(self) -> SyncHandle<T> {
        let stop = CancellationToken::new();
        let state = self.state.subscribe();
        let sender = self.sender();
        let task = tokio::spawn(self.run(stop.child_token()));

        SyncHandle {
            stop,
            task,
            state,
            sender,
        }
    }
}

/// Fire-and-forget message posting, detached from the poll loop.
pub struct MessageSender<T: ChatTransport> {
    transport: Arc<T>,
    identity: Identity,
    timeout: Duration,
}

impl<T: ChatTransport> MessageSender<T> {
    /// Post `text` on a background task. Failures are logged, never returned.
    ///
    /// Outside a tokio runtime the message is dropped with a warning.
    pub fn send(&self, text: impl Into<String>) {
        let text = text.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(len = text.len(), "No async runtime, message dropped");
            return;
        };
        let transport = self.transport.clone();
        let identity = self.identity.clone();
        let timeout = self.timeout;

        runtime.spawn(async move {
            match with_timeout(timeout, transport.send_message(&identity, &text)).await {
                Ok(()) => debug!(len = text.len(), "Message posted"),
                Err(e) => warn!(error = %e, "Failed to post message"),
            }
        });
    }
}

impl<T: ChatTransport> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            identity: self.identity.clone(),
            timeout: self.timeout,
        }
    }
}

/// Owner's handle on a spawned [`SyncClient`].
pub struct SyncHandle<T: ChatTransport> {
    stop: CancellationToken,
    task: JoinHandle<Result<()>>,
    state: watch::Receiver<SyncState>,
    sender: MessageSender<T>,
}

impl<T: ChatTransport> SyncHandle<T> {
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn state_updates(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    pub fn sender(&self) -> MessageSender<T> {
        self.sender.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to wind down.
    pub async fn stop(self) -> Result<()> {
        self.stop.cancel();
        self.task.await?
    }
}

async fn with_timeout<F, R>(limit: Duration, fut: F) -> Result<R>
where
    F: std::future::Future<Output = Result<R>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ClientError::Timeout(limit))?
}
