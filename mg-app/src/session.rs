//! Participant → NLU session registry with a lazily filled profile cache.
//!
//! Sessions are created once and live for the process lifetime; nothing here
//! deletes or rotates them.

use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use mg_messenger::{ParticipantId, ProfileFetcher, UserProfile};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub participant_id: ParticipantId,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub participant_id: ParticipantId,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub display_name: Option<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ParticipantId, Session>,
    profiles: DashMap<ParticipantId, UserProfile>,
    profile_fetches: DashSet<ParticipantId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create under the participant's entry lock.
    pub fn ensure(&self, participant: &ParticipantId) -> Session {
        self.sessions
            .entry(participant.clone())
            .or_insert_with(|| {
                tracing::debug!(participant = %participant, "session created");
                Session::new(participant.clone())
            })
            .clone()
    }

    /// Start a background profile lookup unless one is cached or in flight.
    ///
    /// Failures leave the cache empty, so the next event for the same
    /// participant tries again. The in-flight marker is cleared even when the
    /// fetch task panics or is aborted.
    pub fn ensure_profile(
        self: &Arc<Self>,
        participant: &ParticipantId,
        fetcher: Arc<dyn ProfileFetcher>,
    ) -> Option<JoinHandle<()>> {
        if self.profiles.contains_key(participant) {
            return None;
        }
        if !self.profile_fetches.insert(participant.clone()) {
            return None;
        }

        let registry = Arc::clone(self);
        let participant = participant.clone();
        let marker = FetchMarker {
            registry: Arc::clone(&registry),
            participant: participant.clone(),
        };
        Some(tokio::spawn(async move {
            let _marker = marker;
            match fetcher.fetch_profile(&participant).await {
                Ok(profile) => {
                    tracing::debug!(
                        participant = %participant,
                        display_name = ?profile.display_name,
                        "profile cached"
                    );
                    registry.profiles.insert(participant.clone(), profile);
                }
                Err(e) => {
                    let error = GatewayError::ProfileFetch {
                        participant: participant.clone(),
                        message: format!("{e:#}"),
                    };
                    tracing::warn!(error = %error, error_kind = error.kind(), "profile fetch failed");
                }
            }
        }))
    }

    pub fn session_id(&self, participant: &ParticipantId) -> Option<Uuid> {
        self.sessions.get(participant).map(|s| s.session_id)
    }

    pub fn profile(&self, participant: &ParticipantId) -> Option<UserProfile> {
        self.profiles.get(participant).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| {
                let session = entry.value();
                SessionSummary {
                    participant_id: session.participant_id.clone(),
                    session_id: session.session_id,
                    created_at: session.created_at,
                    display_name: self
                        .profiles
                        .get(entry.key())
                        .and_then(|p| p.display_name.clone()),
                }
            })
            .collect();
        out.sort_by_key(|s| s.created_at);
        out.reverse();
        out
    }
}

/// Clears the participant's in-flight profile fetch on drop.
struct FetchMarker {
    registry: Arc<SessionRegistry>,
    participant: ParticipantId,
}

impl Drop for FetchMarker {
    fn drop(&mut self) {
        self.registry.profile_fetches.remove(&self.participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProfiles;

    #[test]
    fn ensure_is_idempotent_per_participant() {
        let registry = SessionRegistry::new();
        let alice = ParticipantId::new("alice");
        let first = registry.ensure(&alice);
        for _ in 0..5 {
            assert_eq!(registry.ensure(&alice).session_id, first.session_id);
        }
        let bob = registry.ensure(&ParticipantId::new("bob"));
        assert_ne!(bob.session_id, first.session_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.session_id(&alice), Some(first.session_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_creates_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let participant = ParticipantId::new("racer");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            let participant = participant.clone();
            handles.push(tokio::spawn(async move {
                registry.ensure(&participant).session_id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join"));
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn profile_is_fetched_once_and_cached() {
        let registry = Arc::new(SessionRegistry::new());
        let fetcher = Arc::new(FakeProfiles::succeeding());
        let alice = ParticipantId::new("alice");
        registry.ensure(&alice);

        let handle = registry
            .ensure_profile(&alice, fetcher.clone())
            .expect("first call fetches");
        handle.await.expect("join");
        assert!(registry.ensure_profile(&alice, fetcher.clone()).is_none());

        assert_eq!(fetcher.calls(), 1);
        let profile = registry.profile(&alice).expect("cached profile");
        assert_eq!(profile.display_name.as_deref(), Some("Test alice"));
        let summaries = registry.list();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].display_name.as_deref(), Some("Test alice"));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_empty_and_retries_later() {
        let registry = Arc::new(SessionRegistry::new());
        let fetcher = Arc::new(FakeProfiles::failing());
        let alice = ParticipantId::new("alice");

        registry
            .ensure_profile(&alice, fetcher.clone())
            .expect("fetch started")
            .await
            .expect("join");
        assert!(registry.profile(&alice).is_none());

        registry
            .ensure_profile(&alice, fetcher.clone())
            .expect("retry started")
            .await
            .expect("join");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn panicking_fetch_does_not_block_later_fetches() {
        let registry = Arc::new(SessionRegistry::new());
        let alice = ParticipantId::new("alice");

        let joined = registry
            .ensure_profile(&alice, Arc::new(FakeProfiles::panicking()))
            .expect("fetch started")
            .await;
        assert!(joined.expect_err("fetch task panics").is_panic());
        assert!(registry.profile(&alice).is_none());

        let fetcher = Arc::new(FakeProfiles::succeeding());
        registry
            .ensure_profile(&alice, fetcher.clone())
            .expect("retry started")
            .await
            .expect("join");
        assert_eq!(fetcher.calls(), 1);
        assert!(registry.profile(&alice).is_some());
    }

    #[tokio::test]
    async fn in_flight_fetch_is_not_duplicated() {
        let registry = Arc::new(SessionRegistry::new());
        let fetcher = Arc::new(FakeProfiles::succeeding().with_delay_ms(50));
        let alice = ParticipantId::new("alice");

        let first = registry
            .ensure_profile(&alice, fetcher.clone())
            .expect("fetch started");
        assert!(registry.ensure_profile(&alice, fetcher.clone()).is_none());
        first.await.expect("join");
        assert_eq!(fetcher.calls(), 1);
    }
}
