use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_types::events::SessionEvent;
use tandem_types::models::{Message, MessageKind};

use crate::cache::{ClientSessionCache, ReconcileOutcome};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::source::SessionSource;

/// Why a reconcile was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Selected,
    Back,
    Sent,
    TabSwitch,
    /// Pull-to-refresh. Bypasses the busy flag.
    ManualPull,
    DelayedAfterSend,
    /// A [`SessionChanges`] source reported a change
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Closed,
    Open(String),
}

/// Something that can tell the client its session list may be stale.
pub trait SessionChanges: Send {
    /// Resolves true on a relevant change, false once the source is gone.
    fn changed(&mut self) -> impl Future<Output = bool> + Send;
}

/// [`SessionChanges`] over a `SessionEvent` broadcast, keeping only the
/// events that concern `owner`.
pub struct FeedChanges {
    owner: String,
    rx: broadcast::Receiver<SessionEvent>,
}

impl FeedChanges {
    pub fn new(owner: impl Into<String>, rx: broadcast::Receiver<SessionEvent>) -> Self {
        Self {
            owner: owner.into(),
            rx,
        }
    }
}

impl SessionChanges for FeedChanges {
    async fn changed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.concerns(&self.owner) => {
                    debug!("Session change in {}", event.conversation_id());
                    return true;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    debug!("Missed {} session events, refreshing", n);
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

/// Decides when the session cache talks to the server, and tracks which
/// conversation is open.
pub struct RefreshScheduler<S> {
    cache: Arc<ClientSessionCache<S>>,
    post_send_refresh: Duration,
    selection: Mutex<Selection>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SessionSource> RefreshScheduler<S> {
    pub fn new(cache: Arc<ClientSessionCache<S>>, config: &ClientConfig) -> Self {
        Self {
            cache,
            post_send_refresh: config.post_send_refresh,
            selection: Mutex::new(Selection::Closed),
            pending: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<ClientSessionCache<S>> {
        &self.cache
    }

    fn selection_mut(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn selection(&self) -> Selection {
        self.selection_mut().clone()
    }

    pub async fn trigger(&self, trigger: RefreshTrigger) -> Result<ReconcileOutcome, ClientError> {
        debug!("Refresh triggered: {:?}", trigger);
        match trigger {
            RefreshTrigger::ManualPull => self.cache.force_reconcile().await,
            _ => self.cache.reconcile().await,
        }
    }

    async fn trigger_logged(&self, trigger: RefreshTrigger) {
        if let Err(e) = self.trigger(trigger).await {
            warn!("{:?} refresh failed: {}", trigger, e);
        }
    }

    /// Open a conversation: mark it read, zero its badge and load its
    /// messages. Reopening reloads.
    pub async fn select(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        *self.selection_mut() = Selection::Open(conversation_id.to_string());
        self.cache.clear_unread(conversation_id);

        let source = self.cache.source();
        source.mark_read(conversation_id).await?;
        let messages = source.load_messages(conversation_id).await?;

        self.trigger_logged(RefreshTrigger::Selected).await;
        Ok(messages)
    }

    /// Close the open conversation and refresh the list.
    pub async fn back(&self) {
        *self.selection_mut() = Selection::Closed;
        self.trigger_logged(RefreshTrigger::Back).await;
    }

    /// Send a text message. The local preview is updated first and stays
    /// in place if the server rejects the send.
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        recipient_id: Option<&str>,
    ) -> Result<Message, ClientError> {
        self.cache
            .optimistic_append(conversation_id, text, self.cache.owner());

        let message = self
            .cache
            .source()
            .send_message(conversation_id, text, MessageKind::Text, recipient_id)
            .await?;

        self.trigger_logged(RefreshTrigger::Sent).await;
        self.arm_delayed_refresh();
        Ok(message)
    }

    fn arm_delayed_refresh(&self) {
        let cache = self.cache.clone();
        let delay = self.post_send_refresh;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Refresh triggered: {:?}", RefreshTrigger::DelayedAfterSend);
            if let Err(e) = cache.reconcile().await {
                warn!("Delayed refresh failed: {}", e);
            }
        });
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// The delayed refresh armed by the latest send, if not yet taken.
    pub fn take_pending_refresh(&self) -> Option<JoinHandle<()>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Reconcile on every change until the source closes.
    pub async fn follow<C: SessionChanges>(&self, mut changes: C) {
        while changes.changed().await {
            self.trigger_logged(RefreshTrigger::Changed).await;
        }
        info!("Session change source closed");
    }
}
