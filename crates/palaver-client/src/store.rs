//! Observable message and user stores.
//!
//! Both stores are cheap-to-clone handles over shared state. The sync client
//! writes through one handle while presentation code reads and subscribes
//! through others. Every mutation notifies subscribers synchronously, after
//! the internal lock is released and before the mutating call returns, so a
//! listener may read the store it is observing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a message record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    /// User-authored text.
    Chat,
    /// Synthetic announcement for a `join` event.
    Joined,
    /// Synthetic announcement for a `part` event.
    Parted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub nick_name: String,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
    pub avatar_key: String,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub nick_name: String,
    pub avatar_key: String,
}

/// A change to the online user list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChange {
    Added(UserRecord),
    Removed(UserRecord),
}

/// How [`UserStore::add_user`] treats a nickname that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateJoinPolicy {
    /// Keep every entry. The same nickname can be online from two sessions,
    /// and each `part` removes one of them.
    #[default]
    Allow,
    /// Drop the second join for a nickname that is already listed.
    Ignore,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Observers<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<E>)>>,
}

impl<E: 'static> Observers<E> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn subscribe(self: &Arc<Self>, listener: Listener<E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, listener));

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(observers) = weak.upgrade() {
                    lock(&observers.listeners).retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    fn notify(&self, event: &E) {
        // Snapshot so listeners can (un)subscribe without deadlocking.
        let listeners: Vec<Listener<E>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// Keeps a store listener attached. Dropping it detaches the listener.
#[must_use = "dropping a Subscription detaches the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the listener attached for the lifetime of the store.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A poisoned lock only means a listener panicked; the data is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Message store
// ---------------------------------------------------------------------------

/// Append-only list of chat messages in arrival order.
#[derive(Clone)]
pub struct MessageStore {
    records: Arc<Mutex<Vec<MessageRecord>>>,
    observers: Arc<Observers<MessageRecord>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            observers: Observers::new(),
        }
    }

    pub fn append_message(&self, record: MessageRecord) {
        lock(&self.records).push(record.clone());
        self.observers.notify(&record);
    }

    /// Call `listener` with every record appended from now on.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&MessageRecord) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(listener))
    }

    pub fn snapshot(&self) -> Vec<MessageRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.count()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("len", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// User store
// ---------------------------------------------------------------------------

/// List of online users, keyed by nickname with first-match-wins lookups.
#[derive(Clone)]
pub struct UserStore {
    users: Arc<Mutex<Vec<UserRecord>>>,
    observers: Arc<Observers<UserChange>>,
    policy: DuplicateJoinPolicy,
}

impl UserStore {
    pub fn new() -> Self {
        Self::with_policy(DuplicateJoinPolicy::default())
    }

    pub fn with_policy(policy: DuplicateJoinPolicy) -> Self {
        Self {
            users: Arc::new(Mutex::new(Vec::new())),
            observers: Observers::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicateJoinPolicy {
        self.policy
    }

    /// Add a user. Returns `false` if the duplicate-join policy dropped it.
    pub fn add_user(&self, record: UserRecord) -> bool {
        {
            let mut users = lock(&self.users);
            if self.policy == DuplicateJoinPolicy::Ignore
                && users.iter().any(|u| u.nick_name == record.nick_name)
            {
                return false;
            }
            users.push(record.clone());
        }
        self.observers.notify(&UserChange::Added(record));
        true
    }

    /// Remove the first user matching `predicate`, if any.
    pub fn remove_first_matching<P>(&self, predicate: P) -> Option<UserRecord>
    where
        P: Fn(&UserRecord) -> bool,
    {
        let removed = {
            let mut users = lock(&self.users);
            let index = users.iter().position(|u| predicate(u))?;
            users.remove(index)
        };
        self.observers.notify(&UserChange::Removed(removed.clone()));
        Some(removed)
    }

    /// Call `listener` with every addition and removal from now on.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&UserChange) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(listener))
    }

    pub fn contains(&self, nick_name: &str) -> bool {
        lock(&self.users).iter().any(|u| u.nick_name == nick_name)
    }

    pub fn snapshot(&self) -> Vec<UserRecord> {
        lock(&self.users).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.users).is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.count()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("len", &self.len())
            .field("policy", &self.policy)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
