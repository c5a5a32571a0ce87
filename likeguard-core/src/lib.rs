// Likeguard - Like Deduplication and Abuse Control
// File: likeguard-core/src/lib.rs

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum LikeError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Too many like actions, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },
    #[error("Suspicious like activity detected")]
    Suspicious,
    #[error("Storage backend error: {0}")]
    Store(String),
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// Kind of entity that can be liked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Policy,
    Campaign,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Policy => "policy",
            SubjectKind::Campaign => "campaign",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = LikeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "policy" => Ok(SubjectKind::Policy),
            "campaign" => Ok(SubjectKind::Campaign),
            other => Err(LikeError::Validation(format!(
                "unknown subject type: {other}"
            ))),
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A likeable subject: a policy or campaign plus its integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: u64,
}

impl SubjectRef {
    /// Key prefix shared by every ledger record, regardless of subject.
    pub const LEDGER_PREFIX: &'static str = "liked:";

    pub fn new(kind: SubjectKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Normalizes the id representations seen on the wire: a bare decimal
    /// ("42") or a kind-prefixed form ("policy_42", "policy:42"). JSON
    /// numbers are converted to decimal strings before reaching here.
    pub fn from_raw(kind: SubjectKind, raw: &str) -> Result<Self, LikeError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix(kind.as_str())
            .and_then(|rest| rest.strip_prefix(['_', ':']))
            .unwrap_or(trimmed);
        let id = digits
            .parse::<u64>()
            .map_err(|_| LikeError::Validation(format!("invalid subject id: {raw}")))?;
        Ok(Self::new(kind, id))
    }

    /// Ledger key for this subject and one identity, e.g. `liked:policy:42:<fp>`.
    pub fn ledger_key(&self, identity: &Identity) -> String {
        format!(
            "{}{}:{}:{}",
            Self::LEDGER_PREFIX,
            self.kind,
            self.id,
            identity
        )
    }

    /// Counter key for this subject, e.g. `likes:policy:42`.
    pub fn counter_key(&self) -> String {
        format!("likes:{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Opaque per-client token used to deduplicate likes.
///
/// Derived from browser/device signals on the client; spoofable by design.
/// This is a rate-limiting signal, never an access-control credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub const MAX_LEN: usize = 128;

    pub fn new(token: impl Into<String>) -> Result<Self, LikeError> {
        let token = token.into();
        if token.is_empty() || token.len() > Self::MAX_LEN {
            return Err(LikeError::Validation(format!(
                "identity must be 1..={} characters",
                Self::MAX_LEN
            )));
        }
        if !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_'))
        {
            return Err(LikeError::Validation(
                "identity contains invalid characters".to_string(),
            ));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-side view of one (subject, identity) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

/// Result of a successful toggle: the new liked state and the new count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub liked: bool,
    pub count: u64,
}

// ============================================================================
// ABUSE GUARD
// ============================================================================

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Trailing window over which allowed attempts are counted.
    pub window: Duration,
    /// Attempts allowed per identity inside the window.
    pub max_attempts: u32,
    /// Minimum gap between actions on the same (identity, subject) pair.
    pub cooldown: Duration,
    /// How long a counted like feeds the same-network heuristic.
    pub network_ttl: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            max_attempts: 3,
            cooldown: Duration::from_secs(2),
            network_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allowed,
    Throttled { retry_after: Duration },
    Suspicious,
}

/// Soft defense in front of the ledger: a per-identity trailing window, a
/// per-pair cooldown, and a same-network correlation heuristic. Reduces
/// abuse; does not prove identity or stop an attacker rotating identities.
pub struct AbuseGuard {
    config: GuardConfig,
    attempts: DashMap<Identity, Vec<SystemTime>>,
    cooldowns: DashMap<(Identity, SubjectRef), SystemTime>,
    network_likes: DashMap<(IpAddr, SubjectRef), HashMap<Identity, SystemTime>>,
}

impl AbuseGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
            cooldowns: DashMap::new(),
            network_likes: DashMap::new(),
        }
    }

    /// Checks one attempt and, when allowed, records it before returning so a
    /// near-concurrent duplicate observes the fresh timestamp. Best-effort,
    /// not linearizable.
    pub fn check_and_record(
        &self,
        identity: &Identity,
        subject: SubjectRef,
        network: Option<IpAddr>,
        now: SystemTime,
    ) -> GuardVerdict {
        let cooldown_violation = match self.cooldowns.get(&(identity.clone(), subject)) {
            Some(last) => match now.duration_since(*last) {
                Ok(elapsed) if elapsed < self.config.cooldown => {
                    Some(self.config.cooldown - elapsed)
                }
                Ok(_) => None,
                // `now` behind the recorded action: clock went backwards,
                // treat as inside the cooldown.
                Err(_) => Some(self.config.cooldown),
            },
            None => None,
        };

        let mut recent = self.attempts.entry(identity.clone()).or_default();
        recent.retain(|t| {
            now.duration_since(*t)
                .map(|elapsed| elapsed < self.config.window)
                .unwrap_or(true)
        });

        // Throttled attempts count toward the window too, so hammering inside
        // the cooldown cannot slip through the moment the cooldown lapses.
        if let Some(retry_after) = cooldown_violation {
            recent.push(now);
            return GuardVerdict::Throttled { retry_after };
        }
        if recent.len() as u32 >= self.config.max_attempts {
            let retry_after = recent
                .first()
                .and_then(|oldest| now.duration_since(*oldest).ok())
                .map(|elapsed| self.config.window.saturating_sub(elapsed))
                .unwrap_or(self.config.window);
            recent.push(now);
            return GuardVerdict::Throttled { retry_after };
        }

        if let Some(ip) = network {
            if let Some(liked) = self.network_likes.get(&(ip, subject)) {
                let duplicate = liked.iter().any(|(other, at)| {
                    other != identity
                        && now
                            .duration_since(*at)
                            .map(|elapsed| elapsed <= self.config.network_ttl)
                            .unwrap_or(false)
                });
                if duplicate {
                    return GuardVerdict::Suspicious;
                }
            }
        }

        recent.push(now);
        drop(recent);
        self.cooldowns.insert((identity.clone(), subject), now);
        GuardVerdict::Allowed
    }

    /// Feeds the same-network heuristic after a toggle lands on `liked`.
    pub fn note_counted_like(
        &self,
        identity: &Identity,
        subject: SubjectRef,
        network: Option<IpAddr>,
        now: SystemTime,
    ) {
        let Some(ip) = network else { return };
        let mut liked = self.network_likes.entry((ip, subject)).or_default();
        liked.retain(|_, at| {
            now.duration_since(*at)
                .map(|elapsed| elapsed <= self.config.network_ttl)
                .unwrap_or(true)
        });
        liked.insert(identity.clone(), now);
    }

    /// Sweeps out entries no throttle decision can observe anymore: window
    /// timestamps past the trailing window, cooldown markers past the
    /// cooldown, network entries past the TTL. Loss of this state only resets
    /// throttling, so the sweep is safe to run at any time.
    pub fn prune_expired(&self, now: SystemTime) {
        self.attempts.retain(|_, stamps| {
            stamps.retain(|t| {
                now.duration_since(*t)
                    .map(|elapsed| elapsed < self.config.window)
                    .unwrap_or(true)
            });
            !stamps.is_empty()
        });
        self.cooldowns.retain(|_, last| {
            now.duration_since(*last)
                .map(|elapsed| elapsed < self.config.cooldown)
                .unwrap_or(true)
        });
        self.network_likes.retain(|_, liked| {
            liked.retain(|_, at| {
                now.duration_since(*at)
                    .map(|elapsed| elapsed <= self.config.network_ttl)
                    .unwrap_or(true)
            });
            !liked.is_empty()
        });
    }

    /// Drops the heuristic entry once the like is no longer counted.
    pub fn forget_counted_like(
        &self,
        identity: &Identity,
        subject: SubjectRef,
        network: Option<IpAddr>,
    ) {
        let Some(ip) = network else { return };
        if let Some(mut liked) = self.network_likes.get_mut(&(ip, subject)) {
            liked.remove(identity);
        }
        self.network_likes
            .remove_if(&(ip, subject), |_, liked| liked.is_empty());
    }
}

// ============================================================================
// STORE ABSTRACTION
// ============================================================================

/// Combined ledger + counter backend.
///
/// `toggle` flips the per-pair record and moves the counter by exactly 1 as
/// one atomic operation: a `liked` record implies the counter was incremented
/// exactly once for it. The counter is only ever written from inside
/// `toggle`; readers go through `like_state` / `count`.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn like_state(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<LikeState, LikeError>;

    async fn toggle(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<ToggleOutcome, LikeError>;

    async fn count(&self, subject: SubjectRef) -> Result<u64, LikeError>;

    /// Administrative bulk clear of every ledger record. Counters are left
    /// untouched. Returns the number of records deleted.
    async fn clear_ledger(&self) -> Result<u64, LikeError>;
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Per-subject like counters. Decrement clamps at zero so a lost update can
/// never surface a negative count.
#[derive(Default)]
pub struct Counters {
    counts: DashMap<String, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, key: &str) -> u64 {
        let mut entry = self.counts.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn decrement(&self, key: &str) -> u64 {
        let mut entry = self.counts.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_sub(1);
        *entry
    }

    pub fn read(&self, key: &str) -> u64 {
        self.counts.get(key).map(|c| *c).unwrap_or(0)
    }
}

pub struct MemoryStore {
    records: DashMap<String, bool>,
    counters: Counters,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            counters: Counters::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LikeStore for MemoryStore {
    async fn like_state(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<LikeState, LikeError> {
        let liked = self
            .records
            .get(&subject.ledger_key(identity))
            .map(|r| *r)
            .unwrap_or(false);
        let count = self.counters.read(&subject.counter_key());
        Ok(LikeState { liked, count })
    }

    async fn toggle(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<ToggleOutcome, LikeError> {
        // The entry guard serializes toggles for this pair; the counter move
        // happens while it is held, keeping record and count in step.
        let mut record = self
            .records
            .entry(subject.ledger_key(identity))
            .or_insert(false);
        let liked = !*record;
        *record = liked;
        let counter_key = subject.counter_key();
        let count = if liked {
            self.counters.increment(&counter_key)
        } else {
            self.counters.decrement(&counter_key)
        };
        Ok(ToggleOutcome { liked, count })
    }

    async fn count(&self, subject: SubjectRef) -> Result<u64, LikeError> {
        Ok(self.counters.read(&subject.counter_key()))
    }

    async fn clear_ledger(&self) -> Result<u64, LikeError> {
        let deleted = self.records.len() as u64;
        self.records.clear();
        Ok(deleted)
    }
}

// ============================================================================
// LIKE SERVICE FACADE
// ============================================================================

/// Toggles handled between housekeeping sweeps of guard state and idle
/// pair locks.
const PRUNE_INTERVAL: u64 = 1024;

/// Front door for like actions: abuse checks, per-pair mutual exclusion, then
/// the store toggle. Only this facade drives counter mutations.
pub struct LikeService<S: LikeStore> {
    guard: AbuseGuard,
    store: Arc<S>,
    pair_locks: DashMap<String, Arc<Mutex<()>>>,
    ops: AtomicU64,
}

impl<S: LikeStore> LikeService<S> {
    pub fn new(store: S, guard_config: GuardConfig) -> Self {
        Self {
            guard: AbuseGuard::new(guard_config),
            store: Arc::new(store),
            pair_locks: DashMap::new(),
            ops: AtomicU64::new(0),
        }
    }

    pub async fn toggle(
        &self,
        subject: SubjectRef,
        identity: &Identity,
        network: Option<IpAddr>,
        now: SystemTime,
    ) -> Result<ToggleOutcome, LikeError> {
        let ops = self.ops.fetch_add(1, Ordering::Relaxed);
        if (ops + 1) % PRUNE_INTERVAL == 0 {
            self.guard.prune_expired(now);
            // A lock is only dropped while nobody holds a clone of it; the
            // next toggle on that pair just re-creates one.
            self.pair_locks
                .retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        match self.guard.check_and_record(identity, subject, network, now) {
            GuardVerdict::Allowed => {}
            GuardVerdict::Throttled { retry_after } => {
                tracing::warn!(%subject, identity = %identity, "like attempt throttled");
                return Err(LikeError::Throttled { retry_after });
            }
            GuardVerdict::Suspicious => {
                tracing::warn!(%subject, identity = %identity, "suspicious like activity");
                return Err(LikeError::Suspicious);
            }
        }

        let lock = self
            .pair_locks
            .entry(subject.ledger_key(identity))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _locked = lock.lock().await;

        let outcome = self.store.toggle(subject, identity).await?;
        if outcome.liked {
            self.guard.note_counted_like(identity, subject, network, now);
        } else {
            self.guard.forget_counted_like(identity, subject, network);
        }
        tracing::debug!(
            %subject,
            identity = %identity,
            liked = outcome.liked,
            count = outcome.count,
            "toggle applied"
        );
        Ok(outcome)
    }

    pub async fn like_state(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<LikeState, LikeError> {
        self.store.like_state(subject, identity).await
    }

    pub async fn clear_ledger(&self) -> Result<u64, LikeError> {
        let deleted = self.store.clear_ledger().await?;
        tracing::info!(deleted, "like ledger cleared");
        Ok(deleted)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: u64) -> SubjectRef {
        SubjectRef::new(SubjectKind::Policy, id)
    }

    fn identity(token: &str) -> Identity {
        Identity::new(token).unwrap()
    }

    fn at(base: SystemTime, millis: u64) -> SystemTime {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_identity_validation() {
        assert!(Identity::new("a1B2-_=/").is_ok());
        assert!(Identity::new("").is_err());
        assert!(Identity::new("white space").is_err());
        assert!(Identity::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_subject_id_normalization() {
        let expected = SubjectRef::new(SubjectKind::Policy, 42);
        assert_eq!(
            SubjectRef::from_raw(SubjectKind::Policy, "42").unwrap(),
            expected
        );
        assert_eq!(
            SubjectRef::from_raw(SubjectKind::Policy, "policy_42").unwrap(),
            expected
        );
        assert_eq!(
            SubjectRef::from_raw(SubjectKind::Policy, "policy:42").unwrap(),
            expected
        );
        assert!(SubjectRef::from_raw(SubjectKind::Policy, "abc").is_err());
        assert!(SubjectRef::from_raw(SubjectKind::Policy, "campaign_1").is_err());
    }

    #[test]
    fn test_ledger_key_carries_shared_prefix() {
        let campaign = SubjectRef::new(SubjectKind::Campaign, 7);
        let key = campaign.ledger_key(&identity("fp"));
        assert_eq!(key, "liked:campaign:7:fp");
        assert!(key.starts_with(SubjectRef::LEDGER_PREFIX));
    }

    #[test]
    fn test_guard_cooldown() {
        let guard = AbuseGuard::new(GuardConfig::default());
        let id = identity("fp-a");
        let base = SystemTime::UNIX_EPOCH;

        assert_eq!(
            guard.check_and_record(&id, subject(1), None, at(base, 0)),
            GuardVerdict::Allowed
        );
        assert!(matches!(
            guard.check_and_record(&id, subject(1), None, at(base, 1_000)),
            GuardVerdict::Throttled { .. }
        ));
        assert_eq!(
            guard.check_and_record(&id, subject(1), None, at(base, 2_500)),
            GuardVerdict::Allowed
        );
    }

    #[test]
    fn test_guard_window() {
        let config = GuardConfig {
            cooldown: Duration::ZERO,
            ..GuardConfig::default()
        };
        let guard = AbuseGuard::new(config);
        let id = identity("fp-a");
        let base = SystemTime::UNIX_EPOCH;

        for step in 0..3u64 {
            assert_eq!(
                guard.check_and_record(&id, subject(1), None, at(base, step * 1_000)),
                GuardVerdict::Allowed
            );
        }
        assert!(matches!(
            guard.check_and_record(&id, subject(1), None, at(base, 3_000)),
            GuardVerdict::Throttled { .. }
        ));
        // Oldest attempts fall out of the trailing window.
        assert_eq!(
            guard.check_and_record(&id, subject(1), None, at(base, 11_500)),
            GuardVerdict::Allowed
        );
    }

    #[test]
    fn test_guard_network_heuristic() {
        let guard = AbuseGuard::new(GuardConfig::default());
        let a = identity("fp-a");
        let b = identity("fp-b");
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let other_ip: IpAddr = "198.51.100.1".parse().unwrap();
        let base = SystemTime::UNIX_EPOCH;

        assert_eq!(
            guard.check_and_record(&a, subject(1), Some(ip), at(base, 0)),
            GuardVerdict::Allowed
        );
        guard.note_counted_like(&a, subject(1), Some(ip), at(base, 0));

        assert_eq!(
            guard.check_and_record(&b, subject(1), Some(ip), at(base, 3_000)),
            GuardVerdict::Suspicious
        );
        // Different network or different subject is fine.
        assert_eq!(
            guard.check_and_record(&b, subject(1), Some(other_ip), at(base, 3_000)),
            GuardVerdict::Allowed
        );
        assert_eq!(
            guard.check_and_record(&b, subject(2), Some(ip), at(base, 6_000)),
            GuardVerdict::Allowed
        );

        // Unliking withdraws the counted like from the heuristic.
        guard.forget_counted_like(&a, subject(1), Some(ip));
        assert_eq!(
            guard.check_and_record(&b, subject(1), Some(ip), at(base, 9_000)),
            GuardVerdict::Allowed
        );
    }

    #[test]
    fn test_guard_rejected_attempts_extend_throttle() {
        let guard = AbuseGuard::new(GuardConfig::default());
        let id = identity("fp-a");
        let base = SystemTime::UNIX_EPOCH;

        assert_eq!(
            guard.check_and_record(&id, subject(1), None, at(base, 0)),
            GuardVerdict::Allowed
        );
        // Hammering through the cooldown: the rejected attempts fill the
        // window, so the attempt right after the cooldown lapses is still
        // throttled instead of sneaking through.
        for step in 1..4u64 {
            assert!(matches!(
                guard.check_and_record(&id, subject(1), None, at(base, step * 600)),
                GuardVerdict::Throttled { .. }
            ));
        }
        assert!(matches!(
            guard.check_and_record(&id, subject(1), None, at(base, 2_400)),
            GuardVerdict::Throttled { .. }
        ));
        // After a quiet spell the window drains and the identity recovers.
        assert_eq!(
            guard.check_and_record(&id, subject(1), None, at(base, 12_000)),
            GuardVerdict::Allowed
        );
    }

    #[test]
    fn test_guard_prunes_expired_state() {
        let guard = AbuseGuard::new(GuardConfig::default());
        let id = identity("fp-a");
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let base = SystemTime::UNIX_EPOCH;

        assert_eq!(
            guard.check_and_record(&id, subject(1), Some(ip), at(base, 0)),
            GuardVerdict::Allowed
        );
        guard.note_counted_like(&id, subject(1), Some(ip), at(base, 0));
        assert_eq!(guard.attempts.len(), 1);
        assert_eq!(guard.cooldowns.len(), 1);
        assert_eq!(guard.network_likes.len(), 1);

        // Everything has lapsed after the network TTL (the longest horizon).
        guard.prune_expired(at(base, 601_000));
        assert_eq!(guard.attempts.len(), 0);
        assert_eq!(guard.cooldowns.len(), 0);
        assert_eq!(guard.network_likes.len(), 0);
    }

    #[test]
    fn test_counter_clamped_at_zero() {
        let counters = Counters::new();
        assert_eq!(counters.decrement("likes:policy:1"), 0);
        assert_eq!(counters.increment("likes:policy:1"), 1);
        assert_eq!(counters.decrement("likes:policy:1"), 0);
        assert_eq!(counters.decrement("likes:policy:1"), 0);
        assert_eq!(counters.read("likes:policy:1"), 0);
    }

    #[tokio::test]
    async fn test_memory_store_toggle_roundtrip() {
        let store = MemoryStore::new();
        let id = identity("fp-a");

        let liked = store.toggle(subject(1), &id).await.unwrap();
        assert_eq!(liked, ToggleOutcome { liked: true, count: 1 });

        let state = store.like_state(subject(1), &id).await.unwrap();
        assert_eq!(state, LikeState { liked: true, count: 1 });

        let unliked = store.toggle(subject(1), &id).await.unwrap();
        assert_eq!(unliked, ToggleOutcome { liked: false, count: 0 });

        // The record survives an unlike; only its flag flips.
        let state = store.like_state(subject(1), &id).await.unwrap();
        assert_eq!(state, LikeState { liked: false, count: 0 });
    }

    #[tokio::test]
    async fn test_no_drift_over_many_toggles() {
        let store = MemoryStore::new();
        let id = identity("fp-a");

        for _ in 0..10 {
            store.toggle(subject(1), &id).await.unwrap();
            store.toggle(subject(1), &id).await.unwrap();
        }
        let state = store.like_state(subject(1), &id).await.unwrap();
        assert_eq!(state, LikeState { liked: false, count: 0 });
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let store = MemoryStore::new();
        let id = identity("fp-a");
        store.toggle(subject(1), &id).await.unwrap();

        let first = store.like_state(subject(1), &id).await.unwrap();
        let second = store.like_state(subject(1), &id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_multi_identity_scenario() {
        let service = LikeService::new(MemoryStore::new(), GuardConfig::default());
        let a = identity("fp-a");
        let b = identity("fp-b");
        let base = SystemTime::UNIX_EPOCH;

        let out = service
            .toggle(subject(9), &a, None, at(base, 0))
            .await
            .unwrap();
        assert_eq!(out, ToggleOutcome { liked: true, count: 1 });

        let out = service
            .toggle(subject(9), &b, None, at(base, 1_000))
            .await
            .unwrap();
        assert_eq!(out, ToggleOutcome { liked: true, count: 2 });

        let out = service
            .toggle(subject(9), &a, None, at(base, 4_000))
            .await
            .unwrap();
        assert_eq!(out, ToggleOutcome { liked: false, count: 1 });

        let state = service.like_state(subject(9), &a).await.unwrap();
        assert_eq!(state, LikeState { liked: false, count: 1 });
        let state = service.like_state(subject(9), &b).await.unwrap();
        assert_eq!(state, LikeState { liked: true, count: 1 });
    }

    #[tokio::test]
    async fn test_rapid_toggles_throttled() {
        let service = LikeService::new(MemoryStore::new(), GuardConfig::default());
        let id = identity("fp-a");
        let base = SystemTime::UNIX_EPOCH;

        // Five attempts inside three seconds: only the first lands.
        let first = service.toggle(subject(5), &id, None, at(base, 0)).await;
        assert!(first.is_ok());
        for step in 1..5u64 {
            let result = service
                .toggle(subject(5), &id, None, at(base, step * 600))
                .await;
            assert!(matches!(result, Err(LikeError::Throttled { .. })));
        }
        assert_eq!(service.like_state(subject(5), &id).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_service_state_pruned_under_churn() {
        let service = LikeService::new(MemoryStore::new(), GuardConfig::default());
        let base = SystemTime::UNIX_EPOCH;

        // Enough distinct one-shot pairs to cross the housekeeping interval.
        let churn = PRUNE_INTERVAL + 76;
        for i in 0..churn {
            let id = identity(&format!("fp-{i}"));
            service
                .toggle(subject(i), &id, None, at(base, i * 1_000))
                .await
                .unwrap();
        }

        // The sweep dropped every pair whose window/cooldown had lapsed; only
        // entries younger than the sweep survive plus the tail added after it.
        assert!(service.pair_locks.len() < 200);
        assert!(service.guard.attempts.len() < 200);
        assert!(service.guard.cooldowns.len() < 200);
    }

    #[tokio::test]
    async fn test_clear_ledger_counts_records() {
        let service = LikeService::new(MemoryStore::new(), GuardConfig::default());
        let a = identity("fp-a");
        let b = identity("fp-b");
        let base = SystemTime::UNIX_EPOCH;

        service
            .toggle(subject(1), &a, None, at(base, 0))
            .await
            .unwrap();
        service
            .toggle(subject(2), &b, None, at(base, 0))
            .await
            .unwrap();

        assert_eq!(service.clear_ledger().await.unwrap(), 2);
        // Counters deliberately survive a ledger clear.
        assert_eq!(
            service.like_state(subject(1), &a).await.unwrap(),
            LikeState { liked: false, count: 1 }
        );
    }
}
