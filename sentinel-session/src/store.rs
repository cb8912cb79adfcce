//! Bounded per-session ring buffer with idle-TTL eviction.
//!
//! Each session has its own entry so that an `observe` on one session never
//! contends with a `sweep` or `snapshot` on another. `sweep` re-checks a
//! session's `last_activity` a second time, right before removing it, so a
//! session that got a fresh `observe` while the sweep was scanning survives.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use sentinel_protocol::RequestEnvelope;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

struct SessionEntry {
    ring: Mutex<VecDeque<RequestEnvelope>>,
    last_activity: Mutex<Instant>,
}

/// A read-only view of a session's recent envelopes, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub envelopes: Vec<RequestEnvelope>,
}

pub struct SessionStore {
    ring_capacity: usize,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionStore {
    pub fn new(ring_capacity: usize, ttl: Duration) -> Self {
        Self {
            ring_capacity: ring_capacity.max(1),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn entry_for(&self, session_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            return Arc::clone(entry);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    Arc::new(SessionEntry {
                        ring: Mutex::new(VecDeque::new()),
                        last_activity: Mutex::new(Instant::now()),
                    })
                }),
        )
    }

    /// Appends `envelope` to the session's ring, evicting the oldest entry
    /// once the ring is at capacity, and refreshes `last_activity`.
    pub async fn observe(&self, session_id: &str, envelope: RequestEnvelope) -> Session {
        let entry = self.entry_for(session_id).await;

        let mut ring = entry.ring.lock().await;
        ring.push_back(envelope);
        while ring.len() > self.ring_capacity {
            ring.pop_front();
        }
        let snapshot: Vec<RequestEnvelope> = ring.iter().cloned().collect();
        drop(ring);

        *entry.last_activity.lock().await = Instant::now();

        Session { envelopes: snapshot }
    }

    /// Returns a copy of a session's current ring, or `None` if the session
    /// does not exist (never existed, or was already swept).
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let entry = self.sessions.read().await.get(session_id).cloned()?;
        let ring = entry.ring.lock().await;
        Some(Session {
            envelopes: ring.iter().cloned().collect(),
        })
    }

    /// Drops sessions idle for longer than the configured TTL as of `now`.
    /// Returns the number of sessions evicted.
    pub async fn sweep(&self, now: Instant) -> usize {
        let candidates: Vec<String> = {
            let sessions = self.sessions.read().await;
            let mut ids = Vec::new();
            for (id, entry) in sessions.iter() {
                let last = *entry.last_activity.lock().await;
                if now.saturating_duration_since(last) > self.ttl {
                    ids.push(id.clone());
                }
            }
            ids
        };

        if candidates.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for id in candidates {
            let still_idle = match sessions.get(&id) {
                Some(entry) => {
                    let last = *entry.last_activity.lock().await;
                    now.saturating_duration_since(last) > self.ttl
                }
                None => false,
            };
            if still_idle {
                sessions.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
