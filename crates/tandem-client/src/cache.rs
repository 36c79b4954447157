use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use tandem_types::models::{MessageKind, Session};

use crate::error::ClientError;
use crate::source::SessionSource;

/// What happened to a reconcile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The server list replaced the cache
    Applied { seq: u64, sessions: usize },
    /// Another reconcile was in flight, nothing was fetched
    Suppressed,
    /// A newer request was issued while this one was in flight
    Stale { seq: u64 },
}

struct CacheState {
    sessions: Vec<Session>,
    applied_seq: u64,
}

/// The client's copy of its owner's session list.
///
/// Local mutations are applied optimistically and then overwritten by the
/// next reconcile. Every fetch is numbered; only the response to the most
/// recently issued fetch is allowed to replace the list.
pub struct ClientSessionCache<S> {
    owner: String,
    source: Arc<S>,
    state: Mutex<CacheState>,
    busy: AtomicBool,
    issued: AtomicU64,
}

/// Clears the busy flag however the reconcile ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: SessionSource> ClientSessionCache<S> {
    pub fn new(owner: impl Into<String>, source: Arc<S>) -> Self {
        Self {
            owner: owner.into(),
            source,
            state: Mutex::new(CacheState {
                sessions: Vec::new(),
                applied_seq: 0,
            }),
            busy: AtomicBool::new(false),
            issued: AtomicU64::new(0),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the list in display order.
    pub fn sessions(&self) -> Vec<Session> {
        self.state().sessions.clone()
    }

    pub fn session(&self, conversation_id: &str) -> Option<Session> {
        self.state()
            .sessions
            .iter()
            .find(|s| s.conversation_id == conversation_id)
            .cloned()
    }

    pub fn is_reconciling(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Show a just-sent or just-received message before the server confirms
    /// it. Returns false if the conversation is not in the list yet.
    pub fn optimistic_append(&self, conversation_id: &str, text: &str, sender: &str) -> bool {
        let mut state = self.state();
        let Some(pos) = state
            .sessions
            .iter()
            .position(|s| s.conversation_id == conversation_id)
        else {
            debug!("No cached session for {}, waiting for reconcile", conversation_id);
            return false;
        };

        let mut session = state.sessions.remove(pos);
        let now = Utc::now();
        // Keep previews strictly ordered even when the clock has not moved.
        session.last_message_time = if now > session.last_message_time {
            now
        } else {
            session.last_message_time + Duration::milliseconds(1)
        };
        session.last_message = text.to_string();
        session.last_message_kind = MessageKind::Text;
        session.last_message_recalled = false;
        if sender == self.owner {
            session.unread_count = 0;
        } else {
            session.unread_count = session.unread_count.saturating_add(1);
        }
        state.sessions.insert(0, session);
        true
    }

    /// Zero the local unread count, e.g. when the conversation is opened.
    pub fn clear_unread(&self, conversation_id: &str) -> bool {
        let mut state = self.state();
        match state
            .sessions
            .iter_mut()
            .find(|s| s.conversation_id == conversation_id)
        {
            Some(session) => {
                session.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Replace the list with the server's. Dropped if a reconcile is
    /// already running.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ClientError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!("Reconcile already in flight, dropping trigger");
            return Ok(ReconcileOutcome::Suppressed);
        }
        let _guard = BusyGuard(&self.busy);
        self.fetch_and_apply().await
    }

    /// Reconcile regardless of the busy flag. Overlapping responses are
    /// resolved by sequence number.
    pub async fn force_reconcile(&self) -> Result<ReconcileOutcome, ClientError> {
        self.fetch_and_apply().await
    }

    async fn fetch_and_apply(&self) -> Result<ReconcileOutcome, ClientError> {
        let seq = self.issued.fetch_add(1, Ordering::AcqRel) + 1;

        let sessions = match self.source.fetch_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Reconcile #{} failed, keeping cached sessions: {}", seq, e);
                return Err(e);
            }
        };

        let mut state = self.state();
        if seq != self.issued.load(Ordering::Acquire) || seq <= state.applied_seq {
            debug!("Discarding stale reconcile #{}", seq);
            return Ok(ReconcileOutcome::Stale { seq });
        }
        let count = sessions.len();
        state.sessions = sessions;
        state.applied_seq = seq;
        debug!("Reconcile #{} applied {} sessions", seq, count);
        Ok(ReconcileOutcome::Applied {
            seq,
            sessions: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeSource, session};

    async fn warm(owner: &str, source: &Arc<FakeSource>) -> Arc<ClientSessionCache<FakeSource>> {
        let cache = Arc::new(ClientSessionCache::new(owner, source.clone()));
        cache.reconcile().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn reconcile_replaces_the_list() {
        let source = Arc::new(FakeSource::with_sessions(vec![
            session("c1", "u2", "hi", 10, 1),
            session("c2", "u3", "yo", 5, 0),
        ]));
        let cache = ClientSessionCache::new("u1", source.clone());
        assert!(cache.sessions().is_empty());

        let outcome = cache.reconcile().await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { seq: 1, sessions: 2 });
        assert_eq!(cache.sessions().len(), 2);
        assert_eq!(cache.session("c1").unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn trigger_during_reconcile_is_suppressed() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "hi", 10, 0)]));
        let release = source.gate_next_fetch();
        let cache = Arc::new(ClientSessionCache::new("u1", source.clone()));

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.reconcile().await }
        });
        source.wait_for_fetches(1).await;
        assert!(cache.is_reconciling());

        assert_eq!(cache.reconcile().await.unwrap(), ReconcileOutcome::Suppressed);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        release.send(()).unwrap();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { seq: 1, .. }));
        assert!(!cache.is_reconciling());
    }

    #[tokio::test]
    async fn older_response_is_discarded() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "old", 10, 4)]));
        let release = source.gate_next_fetch();
        let cache = Arc::new(ClientSessionCache::new("u1", source.clone()));

        let slow = tokio::spawn({
            let cache = cache.clone();
            async move { cache.reconcile().await }
        });
        source.wait_for_fetches(1).await;

        source.set_sessions(vec![session("c1", "u2", "new", 20, 0)]);
        let fresh = cache.force_reconcile().await.unwrap();
        assert_eq!(fresh, ReconcileOutcome::Applied { seq: 2, sessions: 1 });

        release.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), ReconcileOutcome::Stale { seq: 1 });

        let kept = cache.session("c1").unwrap();
        assert_eq!(kept.last_message, "new");
        assert_eq!(kept.unread_count, 0);
    }

    #[tokio::test]
    async fn failed_reconcile_keeps_cache() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "hi", 10, 2)]));
        let cache = warm("u1", &source).await;

        source.fail_fetch.store(true, Ordering::SeqCst);
        source.set_sessions(Vec::new());
        let err = cache.reconcile().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cache.sessions().len(), 1);
        assert!(!cache.is_reconciling());

        source.fail_fetch.store(false, Ordering::SeqCst);
        assert!(matches!(
            cache.reconcile().await.unwrap(),
            ReconcileOutcome::Applied { sessions: 0, .. }
        ));
        assert!(cache.sessions().is_empty());
    }

    #[tokio::test]
    async fn own_message_clears_unread_and_moves_to_front() {
        let source = Arc::new(FakeSource::with_sessions(vec![
            session("c2", "u3", "latest", 20, 0),
            session("c1", "u2", "older", 10, 3),
        ]));
        let cache = warm("u1", &source).await;

        assert!(cache.optimistic_append("c1", "hello", "u1"));
        let sessions = cache.sessions();
        assert_eq!(sessions[0].conversation_id, "c1");
        assert_eq!(sessions[0].last_message, "hello");
        assert_eq!(sessions[0].unread_count, 0);
        assert!(sessions[0].last_message_time > sessions[1].last_message_time);
    }

    #[tokio::test]
    async fn partner_message_bumps_unread() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "older", 10, 3)]));
        let cache = warm("u1", &source).await;

        assert!(cache.optimistic_append("c1", "ping", "u2"));
        assert_eq!(cache.session("c1").unwrap().unread_count, 4);
    }

    #[tokio::test]
    async fn unknown_conversation_is_left_alone() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "hi", 10, 0)]));
        let cache = warm("u1", &source).await;

        assert!(!cache.optimistic_append("c9", "hello", "u1"));
        assert_eq!(cache.sessions().len(), 1);
        assert_eq!(cache.session("c1").unwrap().last_message, "hi");
    }

    #[tokio::test]
    async fn rapid_sends_apply_in_call_order() {
        let source = Arc::new(FakeSource::with_sessions(vec![
            session("c1", "u2", "a", 10, 0),
            session("c2", "u3", "b", 10, 0),
        ]));
        let cache = warm("u1", &source).await;

        assert!(cache.optimistic_append("c1", "first", "u1"));
        let t1 = cache.session("c1").unwrap().last_message_time;
        assert!(cache.optimistic_append("c1", "second", "u1"));
        let t2 = cache.session("c1").unwrap().last_message_time;
        assert!(t2 > t1);
        assert_eq!(cache.session("c1").unwrap().last_message, "second");

        assert!(cache.optimistic_append("c2", "third", "u1"));
        let order: Vec<_> = cache
            .sessions()
            .into_iter()
            .map(|s| s.conversation_id)
            .collect();
        assert_eq!(order, ["c2", "c1"]);
    }

    #[tokio::test]
    async fn clear_unread_only_touches_known_sessions() {
        let source = Arc::new(FakeSource::with_sessions(vec![session("c1", "u2", "hi", 10, 5)]));
        let cache = warm("u1", &source).await;

        assert!(cache.clear_unread("c1"));
        assert!(!cache.clear_unread("c2"));
        assert_eq!(cache.session("c1").unwrap().unread_count, 0);
    }
}
