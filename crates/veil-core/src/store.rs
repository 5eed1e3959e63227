//! Per-client session storage
//!
//! The store is the only shared mutable state in the exchange. It maps a
//! peer-supplied client id to exactly one [`ClientSession`]:
//!
//! ```text
//!            insert_pending              complete_pending
//!   NONE ───────────────────▶ PENDING ───────────────────▶ ESTABLISHED
//!     ▲                          │  ▲                           │
//!     │   expired / rejected     │  │      insert_pending       │
//!     └──────────────────────────┘  └───────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Backed by a sharded `DashMap`. Every operation on one key runs under that
//! key's shard lock, so insert, take-and-establish and lookup are
//! linearizable per client id. Two racing completions for the same id see
//! exactly one `Established` outcome.
//!
//! Key material never leaves the store: established keys are lent to a
//! closure for the duration of one seal or open.
//!
//! # Expiry
//!
//! Expired pending entries are evicted when their id is touched, and by a
//! full sweep that `insert_pending` runs at most once per TTL. The map
//! therefore holds at most the handshakes initiated within the last two TTLs
//! plus established sessions, with no background task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use veil_crypto::{AeadKey, KemKeyPair};

/// Handshake in flight: the key pair generated at initiate time
pub struct PendingHandshake {
    keypair: KemKeyPair,
    created_at: SystemTime,
}

impl PendingHandshake {
    /// Wrap a freshly generated key pair
    #[must_use]
    pub fn new(keypair: KemKeyPair, created_at: SystemTime) -> Self {
        Self {
            keypair,
            created_at,
        }
    }

    /// Key pair awaiting the client's ciphertext
    #[must_use]
    pub fn keypair(&self) -> &KemKeyPair {
        &self.keypair
    }

    /// When the handshake was initiated
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    fn is_expired(&self, now: SystemTime, ttl: Duration) -> bool {
        now.duration_since(self.created_at)
            .is_ok_and(|age| age > ttl)
    }
}

/// Completed handshake: the symmetric key for envelopes
pub struct EstablishedSession {
    key: AeadKey,
    established_at: SystemTime,
}

impl EstablishedSession {
    /// Wrap a derived session key
    #[must_use]
    pub fn new(key: AeadKey, established_at: SystemTime) -> Self {
        Self {
            key,
            established_at,
        }
    }

    /// When the handshake completed
    #[must_use]
    pub fn established_at(&self) -> SystemTime {
        self.established_at
    }
}

/// The single live session object for a client id
pub enum ClientSession {
    /// Between initiate and complete
    Pending(PendingHandshake),
    /// After a successful complete
    Established(EstablishedSession),
}

impl ClientSession {
    fn is_expired_pending(&self, now: SystemTime, ttl: Duration) -> bool {
        matches!(self, ClientSession::Pending(p) if p.is_expired(now, ttl))
    }
}

/// Public view of a session's state, free of key material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in flight since the given time
    Pending {
        /// Initiation time
        created_at: SystemTime,
    },
    /// Established at the given time
    Established {
        /// Completion time
        established_at: SystemTime,
    },
}

/// What a new pending entry replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    /// The client id had no session
    Nothing,
    /// An earlier handshake that was never completed
    Pending,
    /// A working session, now invalidated
    Established,
}

/// Result of trying to complete a pending handshake
#[derive(Debug, PartialEq, Eq)]
pub enum CompleteOutcome<E> {
    /// The pending entry was consumed and replaced by an established session
    Established,
    /// No pending entry exists (never initiated, already completed, or established)
    NotPending,
    /// The pending entry had outlived the TTL and was evicted
    Expired,
    /// Key derivation failed; the pending entry was dropped
    Rejected(E),
}

/// Concurrent client id → session map
pub struct SessionStore {
    sessions: DashMap<String, ClientSession>,
    pending_ttl: Duration,
    /// Unix seconds at or after which the next insert sweeps the map
    next_sweep: AtomicU64,
}

impl SessionStore {
    /// Create an empty store evicting pending handshakes older than `pending_ttl`
    #[must_use]
    pub fn new(pending_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            pending_ttl,
            next_sweep: AtomicU64::new(0),
        }
    }

    /// Configured pending-handshake lifetime
    #[must_use]
    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }

    /// Insert a pending handshake, replacing whatever the id held before
    ///
    /// The handshake's creation time is taken as the current time. If a sweep
    /// is due, expired pending entries for every id are evicted first.
    pub fn insert_pending(&self, client_id: &str, pending: PendingHandshake) -> Replaced {
        self.sweep_if_due(pending.created_at);

        match self
            .sessions
            .insert(client_id.to_owned(), ClientSession::Pending(pending))
        {
            None => Replaced::Nothing,
            Some(ClientSession::Pending(_)) => Replaced::Pending,
            Some(ClientSession::Established(_)) => Replaced::Established,
        }
    }

    /// Atomically consume the pending entry for `client_id`
    ///
    /// `derive` runs under the entry lock with the pending key pair. On
    /// success the entry becomes [`ClientSession::Established`] and the key pair
    /// is dropped; on failure the entry is removed. An established entry is
    /// never touched.
    pub fn complete_pending<E, F>(
        &self,
        client_id: &str,
        now: SystemTime,
        derive: F,
    ) -> CompleteOutcome<E>
    where
        F: FnOnce(&KemKeyPair) -> Result<AeadKey, E>,
    {
        let Entry::Occupied(mut entry) = self.sessions.entry(client_id.to_owned()) else {
            return CompleteOutcome::NotPending;
        };

        let derived = match entry.get() {
            ClientSession::Established(_) => return CompleteOutcome::NotPending,
            ClientSession::Pending(pending) if pending.is_expired(now, self.pending_ttl) => {
                entry.remove();
                return CompleteOutcome::Expired;
            }
            ClientSession::Pending(pending) => derive(&pending.keypair),
        };

        match derived {
            Ok(key) => {
                entry.insert(ClientSession::Established(EstablishedSession::new(key, now)));
                CompleteOutcome::Established
            }
            Err(e) => {
                entry.remove();
                CompleteOutcome::Rejected(e)
            }
        }
    }

    /// Remove a pending entry without completing it
    ///
    /// Returns true if a pending entry existed.
    pub fn discard_pending(&self, client_id: &str) -> bool {
        self.sessions
            .remove_if(client_id, |_, session| {
                matches!(session, ClientSession::Pending(_))
            })
            .is_some()
    }

    /// Lend the established key for `client_id` to `f`
    ///
    /// Returns `None` if the id has no established session. An expired
    /// pending entry found on the way is evicted.
    pub fn with_established<R>(
        &self,
        client_id: &str,
        now: SystemTime,
        f: impl FnOnce(&AeadKey) -> R,
    ) -> Option<R> {
        let expired = match self.sessions.get(client_id) {
            None => return None,
            Some(session) => match session.value() {
                ClientSession::Established(established) => return Some(f(&established.key)),
                ClientSession::Pending(pending) => pending.is_expired(now, self.pending_ttl),
            },
        };

        if expired {
            self.evict_if_expired(client_id, now);
        }
        None
    }

    /// Current state for `client_id`, evicting it first if it is an expired
    /// pending handshake
    #[must_use]
    pub fn state(&self, client_id: &str, now: SystemTime) -> Option<SessionState> {
        self.evict_if_expired(client_id, now);
        self.sessions
            .get(client_id)
            .map(|session| match session.value() {
                ClientSession::Pending(p) => SessionState::Pending {
                    created_at: p.created_at,
                },
                ClientSession::Established(e) => SessionState::Established {
                    established_at: e.established_at,
                },
            })
    }

    /// Drop any session for `client_id`
    ///
    /// Returns true if something was removed.
    pub fn invalidate(&self, client_id: &str) -> bool {
        self.sessions.remove(client_id).is_some()
    }

    /// Evict every pending handshake older than the TTL
    ///
    /// Returns the number of entries evicted.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let ttl = self.pending_ttl;
        let mut evicted = 0;
        self.sessions.retain(|_, session| {
            let expired = session.is_expired_pending(now, ttl);
            if expired {
                evicted += 1;
            }
            !expired
        });
        evicted
    }

    /// Number of handshakes in flight
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| matches!(entry.value(), ClientSession::Pending(_)))
            .count()
    }

    /// Number of established sessions
    #[must_use]
    pub fn established_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| matches!(entry.value(), ClientSession::Established(_)))
            .count()
    }

    /// Total number of sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if the store holds no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn sweep_if_due(&self, now: SystemTime) {
        let now_secs = unix_secs(now);
        let due = self.next_sweep.load(Ordering::Acquire);
        if now_secs < due {
            return;
        }

        let next = now_secs.saturating_add(self.pending_ttl.as_secs().max(1));
        // One caller per period runs the sweep
        if self
            .next_sweep
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let evicted = self.purge_expired(now);
        if evicted > 0 {
            tracing::debug!(evicted, "swept expired pending handshakes");
        }
    }

    fn evict_if_expired(&self, client_id: &str, now: SystemTime) -> bool {
        let ttl = self.pending_ttl;
        let evicted = self
            .sessions
            .remove_if(client_id, |_, session| session.is_expired_pending(now, ttl))
            .is_some();
        if evicted {
            tracing::debug!(client_id, "evicted expired pending handshake");
        }
        evicted
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
