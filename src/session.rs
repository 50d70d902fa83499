//! Confirmation sessions.
//!
//! Each session key holds at most one [`PendingSuggestion`]. The next message
//! from that key resolves it: an affirmative reply applies it, anything else
//! cancels it, and a suggestion whose timer ran out is expired and never
//! applied.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SuggestConfig;
use crate::dispatch::Continuation;

// ============================================================================
// Session Keys
// ============================================================================

/// Scope of a conversation: a user, optionally inside a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub user_id: String,
    /// `None` for private conversations
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl SessionKey {
    pub fn private(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: None,
        }
    }

    pub fn channel(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: Some(channel_id.into()),
        }
    }

    pub fn is_private(&self) -> bool {
        self.channel_id.is_none()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel_id {
            Some(channel) => write!(f, "{}@{}", self.user_id, channel),
            None => write!(f, "{}@private", self.user_id),
        }
    }
}

// ============================================================================
// Clock & Timer
// ============================================================================

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Used to drive expiry in tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

/// Deadline of one pending suggestion. Dropping it cancels it.
#[derive(Debug)]
pub struct ExpiryTimer {
    deadline: Instant,
}

impl ExpiryTimer {
    pub fn start(now: Instant, timeout: Duration) -> Self {
        Self {
            deadline: now + timeout,
        }
    }

    pub fn is_elapsed(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

// ============================================================================
// Pending Suggestions
// ============================================================================

pub struct PendingSuggestion {
    pub key: SessionKey,

    /// Canonical name offered to the user
    pub candidate: String,

    /// The unmatched input that produced the suggestion
    pub original_input: String,

    pub created_at: DateTime<Local>,

    /// Set once the suggestion has been applied
    pub consumed: bool,

    timer: ExpiryTimer,
    apply: Continuation,
}

impl fmt::Debug for PendingSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSuggestion")
            .field("key", &self.key)
            .field("candidate", &self.candidate)
            .field("original_input", &self.original_input)
            .field("created_at", &self.created_at)
            .field("consumed", &self.consumed)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl PendingSuggestion {
    pub(crate) fn new(
        key: SessionKey,
        candidate: String,
        original_input: String,
        timer: ExpiryTimer,
        apply: Continuation,
    ) -> Self {
        Self {
            key,
            candidate,
            original_input,
            created_at: Local::now(),
            consumed: false,
            timer,
            apply,
        }
    }

    /// Hand out the continuation, dropping the timer.
    pub(crate) fn into_continuation(self) -> Continuation {
        self.apply
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingConfirmation,
}

/// What an incoming message did to the key's pending suggestion
#[derive(Debug)]
pub enum Resolution {
    /// Nothing was pending
    Idle,
    Applied(PendingSuggestion),
    Cancelled(PendingSuggestion),
    Expired(PendingSuggestion),
}

// ============================================================================
// Store
// ============================================================================

/// Per-key pending suggestions; last write wins
pub struct ConfirmationStore {
    slots: HashMap<SessionKey, PendingSuggestion>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl fmt::Debug for ConfirmationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationStore")
            .field("slots", &self.slots)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ConfirmationStore {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            clock,
            timeout,
        }
    }

    pub(crate) fn start_timer(&self) -> ExpiryTimer {
        ExpiryTimer::start(self.clock.now(), self.timeout)
    }

    /// Arm a suggestion, returning the one it replaced.
    pub fn arm(&mut self, pending: PendingSuggestion) -> Option<PendingSuggestion> {
        info!(
            "Awaiting confirmation of \"{}\" from {}",
            pending.candidate, pending.key
        );
        self.slots.insert(pending.key.clone(), pending)
    }

    pub fn state(&self, key: &SessionKey) -> SessionState {
        match self.slots.get(key) {
            Some(p) if !p.timer.is_elapsed(self.clock.now()) => SessionState::AwaitingConfirmation,
            _ => SessionState::Idle,
        }
    }

    /// Resolve the key's pending suggestion against an incoming message.
    /// The slot is always empty afterwards.
    pub fn resolve(&mut self, key: &SessionKey, message: &str, config: &SuggestConfig) -> Resolution {
        let Some(mut pending) = self.slots.remove(key) else {
            return Resolution::Idle;
        };

        if pending.timer.is_elapsed(self.clock.now()) {
            debug!("Suggestion \"{}\" for {} expired", pending.candidate, key);
            return Resolution::Expired(pending);
        }

        if config.is_affirmative(message) {
            pending.consumed = true;
            info!("{} confirmed \"{}\"", key, pending.candidate);
            Resolution::Applied(pending)
        } else {
            debug!("Suggestion \"{}\" for {} cancelled", pending.candidate, key);
            Resolution::Cancelled(pending)
        }
    }

    pub fn clear(&mut self, key: &SessionKey) -> Option<PendingSuggestion> {
        self.slots.remove(key)
    }

    /// Remove every suggestion whose timer has run out.
    pub fn sweep_expired(&mut self) -> Vec<PendingSuggestion> {
        let now = self.clock.now();
        let expired: Vec<SessionKey> = self
            .slots
            .iter()
            .filter(|(_, p)| p.timer.is_elapsed(now))
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .iter()
            .filter_map(|k| self.slots.remove(k))
            .collect()
    }

    /// Time left before the key's suggestion expires.
    pub fn remaining(&self, key: &SessionKey) -> Option<Duration> {
        let now = self.clock.now();
        self.slots.get(key).map(|p| p.timer.remaining(now))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::continuation;

    fn pending(store: &ConfirmationStore, key: &SessionKey, candidate: &str) -> PendingSuggestion {
        PendingSuggestion::new(
            key.clone(),
            candidate.to_string(),
            format!("{} bar", candidate),
            store.start_timer(),
            continuation(|_, _| Ok(None)),
        )
    }

    fn store() -> (Arc<ManualClock>, ConfirmationStore) {
        let clock = Arc::new(ManualClock::new());
        let store = ConfirmationStore::new(clock.clone(), Duration::from_secs(60));
        (clock, store)
    }

    #[test]
    fn test_session_key_display() {
        assert_eq!(SessionKey::private("456").to_string(), "456@private");
        assert_eq!(SessionKey::channel("789", "987").to_string(), "789@987");
        assert!(SessionKey::private("1").is_private());
    }

    #[test]
    fn test_apply_clears_slot() {
        let (_, mut store) = store();
        let config = SuggestConfig::default();
        let key = SessionKey::private("456");

        assert!(store.arm(pending(&store, &key, "foo")).is_none());
        assert_eq!(store.state(&key), SessionState::AwaitingConfirmation);

        match store.resolve(&key, ".", &config) {
            Resolution::Applied(p) => {
                assert_eq!(p.candidate, "foo");
                assert!(p.consumed);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
        assert_eq!(store.state(&key), SessionState::Idle);
        assert!(matches!(store.resolve(&key, ".", &config), Resolution::Idle));
    }

    #[test]
    fn test_other_message_cancels() {
        let (_, mut store) = store();
        let config = SuggestConfig::default();
        let key = SessionKey::private("456");

        store.arm(pending(&store, &key, "foo"));
        assert!(matches!(
            store.resolve(&key, "bar foo", &config),
            Resolution::Cancelled(p) if !p.consumed
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_suggestion_wins() {
        let (_, mut store) = store();
        let config = SuggestConfig::default();
        let key = SessionKey::private("456");

        store.arm(pending(&store, &key, "foo"));
        let replaced = store.arm(pending(&store, &key, "fooo"));
        assert_eq!(replaced.map(|p| p.candidate), Some("foo".to_string()));
        assert_eq!(store.len(), 1);

        assert!(matches!(
            store.resolve(&key, ".", &config),
            Resolution::Applied(p) if p.candidate == "fooo"
        ));
    }

    #[test]
    fn test_keys_are_isolated() {
        let (_, mut store) = store();
        let config = SuggestConfig::default();
        let a = SessionKey::private("456");
        let b = SessionKey::channel("789", "987");

        store.arm(pending(&store, &a, "foo"));
        assert!(matches!(store.resolve(&b, ".", &config), Resolution::Idle));
        assert_eq!(store.state(&a), SessionState::AwaitingConfirmation);
    }

    #[test]
    fn test_expiry() {
        let (clock, mut store) = store();
        let config = SuggestConfig::default();
        let key = SessionKey::private("456");

        store.arm(pending(&store, &key, "foo"));
        clock.advance(Duration::from_secs(30));
        assert_eq!(store.remaining(&key), Some(Duration::from_secs(30)));

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.state(&key), SessionState::Idle);
        assert!(matches!(
            store.resolve(&key, ".", &config),
            Resolution::Expired(p) if p.candidate == "foo"
        ));
    }

    #[test]
    fn test_sweep_expired() {
        let (clock, mut store) = store();
        let old = SessionKey::private("1");
        let fresh = SessionKey::private("2");

        store.arm(pending(&store, &old, "foo"));
        clock.advance(Duration::from_secs(45));
        store.arm(pending(&store, &fresh, "bar"));
        clock.advance(Duration::from_secs(20));

        let swept = store.sweep_expired();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].key, old);
        assert_eq!(store.state(&fresh), SessionState::AwaitingConfirmation);
    }
}
