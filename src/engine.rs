//! Conversation sync engine
//!
//! This module ties the message store, conversation index, poll scheduler
//! and read-state reconciler together over a [`ChatTransport`]:
//! - background polling of the conversation list and the open conversation
//! - refresh suppression while the user is composing
//! - immediate load when a conversation is opened
//! - optimistic sends with failed-message retry
//! - discarding responses that belong to a conversation no longer open
//!
//! State lives behind a single async mutex that is never held across a
//! transport call. Every open or close bumps a generation counter; a fetch
//! started under an older generation is dropped when it completes.

use crate::{
    reconciler::{ReadAck, ReadStateReconciler},
    scheduler::PollScheduler,
    storage::{
        ConversationIndex, ConversationSummary, DeliveryStatus, IndexOrdering, Message, MessageStore, StoredMessage,
        UserId,
    },
    transport::{AuthToken, ChatTransport, Session, TransportError},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Interval between background refreshes
    pub poll_interval: Duration,
    /// Narrow-viewport mode: never auto-open a conversation
    pub narrow_viewport: bool,
    /// Conversation list ordering
    pub ordering: IndexOrdering,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(4_000),
            narrow_viewport: false,
            ordering: IndexOrdering::UnreadFirst,
        }
    }
}

/// Observable engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for the next tick
    Idle,
    /// A poll fetch is outstanding
    Polling,
    /// The user is composing; ticks are skipped
    Suppressed,
}

/// How a batch of messages reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// First load after opening a conversation; snap to the bottom
    Initial,
    /// Background refresh; animate if anything changed
    Incremental,
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The conversation index was replaced from a snapshot
    ConversationsUpdated {
        /// Sum of unread counts after the update
        total_unread: u32,
    },
    /// A conversation was opened
    PeerOpened {
        /// The peer
        peer: UserId,
    },
    /// The open conversation was closed
    PeerClosed,
    /// The message store was refreshed
    MessagesLoaded {
        /// The peer
        peer: UserId,
        /// Initial load or incremental refresh
        kind: LoadKind,
        /// Messages now in the store
        count: usize,
    },
    /// A local message was accepted by the server
    MessageSent {
        /// The peer
        peer: UserId,
        /// Local id of the optimistic entry
        local_id: String,
        /// Server id of the stored message
        message_id: String,
    },
    /// A local message could not be sent; it stays in the store as failed
    SendFailed {
        /// The peer
        peer: UserId,
        /// Local id of the failed entry
        local_id: String,
        /// Human-readable reason
        reason: String,
    },
    /// The credential is missing or was rejected; polling has stopped
    AuthRequired,
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The snapshot was applied
    Applied {
        /// The message part belonged to a conversation no longer open
        discarded_stale: bool,
    },
    /// Skipped or discarded because the user is composing
    Suppressed,
    /// A fetch failed; nothing changed
    Failed,
}

/// Snapshot of the engine's session state
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    /// Currently open peer
    pub open_peer: Option<UserId>,
    /// Whether refreshes are suppressed
    pub suppressed: bool,
    /// Completion time of the last applied poll
    pub last_poll_at: Option<DateTime<Utc>>,
}

struct EngineState {
    store: MessageStore,
    index: ConversationIndex,
    generation: u64,
    token: Option<AuthToken>,
    auth_required: bool,
    narrow_viewport: bool,
    last_poll_at: Option<DateTime<Utc>>,
}

struct EngineInner {
    transport: Arc<dyn ChatTransport>,
    reconciler: ReadStateReconciler,
    local_user: UserId,
    poll_interval: Duration,
    state: Mutex<EngineState>,
    suppressed: Arc<AtomicBool>,
    in_flight: AtomicUsize,
    scheduler: PollScheduler,
    events: broadcast::Sender<SyncEvent>,
}

/// Marks a poll as outstanding for as long as it is alive
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps conversations and the open conversation in step with the backend
///
/// Cloning yields another handle to the same engine. The poll timer stops
/// on [`SyncEngine::stop`] or when the last handle is dropped.
///
/// # Example
/// ```rust,no_run
/// use staysync::{AuthToken, EngineOptions, HttpTransport, Session, SyncEngine, UserId};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> staysync::Result<()> {
/// let transport = HttpTransport::new("https://api.example.com/api", Duration::from_secs(10))?;
/// let session = Session::new("guest-42", AuthToken::new("jwt..."));
/// let engine = SyncEngine::new(Arc::new(transport), session, EngineOptions::default());
///
/// let mut events = engine.subscribe();
/// engine.start().await?;
///
/// engine.open_peer(UserId::new("host-7")).await?;
/// engine.set_compose_text("Is early check-in possible?");
/// engine.send("Is early check-in possible?", None).await?;
///
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine for `session` over `transport`
    pub fn new(transport: Arc<dyn ChatTransport>, session: Session, options: EngineOptions) -> Self {
        let suppressed = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&suppressed);
        let scheduler = PollScheduler::new(Arc::new(move || gate.load(Ordering::SeqCst)));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(EngineInner {
                reconciler: ReadStateReconciler::new(Arc::clone(&transport)),
                transport,
                local_user: session.user_id,
                poll_interval: options.poll_interval,
                state: Mutex::new(EngineState {
                    store: MessageStore::new(),
                    index: ConversationIndex::new(options.ordering),
                    generation: 0,
                    auth_required: false,
                    token: session.token,
                    narrow_viewport: options.narrow_viewport,
                    last_poll_at: None,
                }),
                suppressed,
                in_flight: AtomicUsize::new(0),
                scheduler,
                events,
            }),
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Start background polling and run one refresh right away
    ///
    /// Fails with [`Error::AuthRequired`] without touching the transport
    /// when there is no credential.
    pub async fn start(&self) -> Result<PollOutcome> {
        if self.current_token().await.is_none() {
            self.require_auth().await;
            return Err(Error::AuthRequired);
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(self.inner.poll_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    let engine = SyncEngine { inner };
                    if let Err(e) = engine.poll_now().await {
                        debug!("Scheduled poll ended with {}", e);
                    }
                }
            }
        });
        info!("Sync engine started for {}", self.inner.local_user);

        self.poll_now().await
    }

    /// Stop background polling. Idempotent.
    pub fn stop(&self) {
        self.inner.scheduler.stop();
    }

    /// Whether background polling is active
    pub fn is_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Run one poll cycle: what every unsuppressed tick does
    ///
    /// Fetches the conversation list and, when a conversation is open, its
    /// messages. Nothing is applied if the user started composing while
    /// the fetch was outstanding. Transient failures change nothing and
    /// yield [`PollOutcome::Failed`].
    pub async fn poll_now(&self) -> Result<PollOutcome> {
        if self.is_suppressed() {
            return Ok(PollOutcome::Suppressed);
        }

        let (token, peer, generation) = {
            let state = self.inner.state.lock().await;
            let Some(token) = state.token.clone() else {
                drop(state);
                self.require_auth().await;
                return Err(Error::AuthRequired);
            };
            (token, state.store.peer().cloned(), state.generation)
        };

        let (conversations, messages) = {
            let _polling = InFlight::enter(&self.inner.in_flight);
            debug!("Polling conversations (open peer: {:?})", peer.as_ref().map(UserId::as_str));

            let transport = &self.inner.transport;
            let messages = async {
                match &peer {
                    Some(p) => Some(transport.get_messages(p, &token).await),
                    None => None,
                }
            };
            tokio::join!(transport.list_conversations(&token), messages)
        };

        let conversations = match conversations {
            Ok(list) => list,
            Err(e) => return self.poll_failed(e).await,
        };
        let messages = match messages.transpose() {
            Ok(messages) => messages,
            Err(e) => return self.poll_failed(e).await,
        };

        let mut state = self.inner.state.lock().await;
        if self.is_suppressed() {
            debug!("Discarding poll result: user is composing");
            return Ok(PollOutcome::Suppressed);
        }

        state.index.upsert_all(conversations);
        state.last_poll_at = Some(Utc::now());

        let mut discarded_stale = false;
        let mut loaded = None;
        if let (Some(peer), Some(messages)) = (peer, messages) {
            if state.generation == generation && state.store.peer() == Some(&peer) && self.belongs_to(&peer, &messages) {
                state.store.replace(messages);
                loaded = Some((peer, state.store.len()));
            } else {
                debug!("Discarding stale messages for {}", peer);
                discarded_stale = true;
            }
        }

        let to_acknowledge = state
            .store
            .peer()
            .filter(|p| state.index.find(p).is_some_and(|s| s.unread > 0))
            .cloned();
        if let Some(peer) = &to_acknowledge {
            ReadStateReconciler::apply_local(&mut state.index, peer);
        }

        let auto_open = if state.store.peer().is_none() && !state.narrow_viewport {
            state.index.first().map(|s| s.peer.clone())
        } else {
            None
        };

        let total_unread = state.index.total_unread();
        drop(state);

        self.emit(SyncEvent::ConversationsUpdated { total_unread });
        if let Some((peer, count)) = loaded {
            self.emit(SyncEvent::MessagesLoaded {
                peer,
                kind: LoadKind::Incremental,
                count,
            });
        }

        if let Some(peer) = to_acknowledge {
            self.acknowledge(&peer, &token).await;
        }

        if let Some(peer) = auto_open {
            info!("Auto-opening conversation with {}", peer);
            if let Err(e) = self.open_peer(peer).await {
                warn!("Auto-open failed: {}", e);
            }
        }

        Ok(PollOutcome::Applied { discarded_stale })
    }

    async fn poll_failed(&self, e: TransportError) -> Result<PollOutcome> {
        if e.is_unauthorized() {
            self.require_auth().await;
            return Err(Error::AuthRequired);
        }
        warn!("Poll failed, retrying next tick: {}", e);
        Ok(PollOutcome::Failed)
    }

    /// Whether every message was exchanged between `peer` and the local user
    fn belongs_to(&self, peer: &UserId, messages: &[Message]) -> bool {
        let local = &self.inner.local_user;
        let ok = messages
            .iter()
            .all(|m| (&m.sender == peer && &m.receiver == local) || (&m.sender == local && &m.receiver == peer));
        if !ok {
            warn!("Message response does not match conversation with {}", peer);
        }
        ok
    }

    /// Open the conversation with `peer`
    ///
    /// Clears the store, zeroes the peer's unread count, loads its messages
    /// immediately and acknowledges them. Opening the peer that is already
    /// open does nothing.
    pub async fn open_peer(&self, peer: UserId) -> Result<()> {
        let (token, generation) = {
            let mut state = self.inner.state.lock().await;
            let Some(token) = state.token.clone() else {
                drop(state);
                self.require_auth().await;
                return Err(Error::AuthRequired);
            };
            if state.store.peer() == Some(&peer) {
                return Ok(());
            }

            state.generation += 1;
            state.store.reset_for(peer.clone());
            ReadStateReconciler::apply_local(&mut state.index, &peer);
            (token, state.generation)
        };

        info!("Opened conversation with {}", peer);
        self.emit(SyncEvent::PeerOpened { peer: peer.clone() });

        let fetched = self.inner.transport.get_messages(&peer, &token).await;

        let outcome = match fetched {
            Ok(messages) => {
                let mut state = self.inner.state.lock().await;
                if state.generation != generation || !self.belongs_to(&peer, &messages) {
                    debug!("Discarding initial load for {}: conversation changed", peer);
                } else {
                    state.store.replace(messages);
                    let count = state.store.len();
                    drop(state);
                    self.emit(SyncEvent::MessagesLoaded {
                        peer: peer.clone(),
                        kind: LoadKind::Initial,
                        count,
                    });
                }
                Ok(())
            }
            Err(e) if e.is_unauthorized() => {
                self.require_auth().await;
                return Err(Error::AuthRequired);
            }
            Err(e) => {
                warn!("Initial load for {} failed: {}", peer, e);
                Err(Error::Transport(e))
            }
        };

        self.acknowledge(&peer, &token).await;
        outcome
    }

    /// Close the open conversation, if any
    pub async fn close_peer(&self) {
        let mut state = self.inner.state.lock().await;
        if state.store.peer().is_none() {
            return;
        }
        state.generation += 1;
        state.store.clear();
        drop(state);
        self.emit(SyncEvent::PeerClosed);
    }

    /// Acknowledge `peer`'s messages: zero locally, then tell the server
    pub async fn mark_read(&self, peer: &UserId) -> Result<()> {
        let token = {
            let mut state = self.inner.state.lock().await;
            let Some(token) = state.token.clone() else {
                drop(state);
                self.require_auth().await;
                return Err(Error::AuthRequired);
            };
            ReadStateReconciler::apply_local(&mut state.index, peer);
            token
        };
        self.acknowledge(peer, &token).await;
        Ok(())
    }

    async fn acknowledge(&self, peer: &UserId, token: &AuthToken) {
        if let ReadAck::Tolerated(e) = self.inner.reconciler.acknowledge(peer, token).await {
            if e.is_unauthorized() {
                self.require_auth().await;
            }
        }
    }

    /// Record the compose box contents
    ///
    /// Non-empty text suppresses refreshes until the box is empty again.
    /// Returns the new suppression flag.
    pub fn set_compose_text(&self, text: &str) -> bool {
        let composing = !text.is_empty();
        if self.inner.suppressed.swap(composing, Ordering::SeqCst) != composing {
            debug!("Refresh suppression {}", if composing { "on" } else { "off" });
        }
        composing
    }

    /// Whether refreshes are currently suppressed
    pub fn is_suppressed(&self) -> bool {
        self.inner.suppressed.load(Ordering::SeqCst)
    }

    /// Current phase of the sync state machine
    pub fn phase(&self) -> SyncPhase {
        if self.is_suppressed() {
            SyncPhase::Suppressed
        } else if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            SyncPhase::Polling
        } else {
            SyncPhase::Idle
        }
    }

    /// Send `body` to the open conversation
    ///
    /// The message shows up in the store immediately as pending, the
    /// compose state is cleared and the peer is marked read. On failure the
    /// entry stays in the store as failed, [`SyncEvent::SendFailed`] is
    /// emitted and the error is returned; see [`SyncEngine::retry_send`].
    pub async fn send(&self, body: &str, listing: Option<&str>) -> Result<Message> {
        if body.trim().is_empty() {
            return Err(Error::InvalidInput("message body is empty".to_string()));
        }

        let (token, peer, local_id) = {
            let mut state = self.inner.state.lock().await;
            let Some(token) = state.token.clone() else {
                drop(state);
                self.require_auth().await;
                return Err(Error::AuthRequired);
            };
            let peer = state.store.peer().cloned().ok_or(Error::NoOpenConversation)?;

            let local_id = format!("local-{}", uuid::Uuid::new_v4());
            let provisional = Message {
                id: local_id.clone(),
                sender: self.inner.local_user.clone(),
                receiver: peer.clone(),
                body: body.to_string(),
                listing: listing.map(str::to_string),
                created_at: Utc::now(),
            };
            state.store.append(StoredMessage::pending(local_id.clone(), provisional));
            (token, peer, local_id)
        };

        self.set_compose_text("");
        self.deliver(peer, local_id, body, listing, token).await
    }

    /// Retry a message that previously failed to send
    pub async fn retry_send(&self, local_id: &str) -> Result<Message> {
        let (token, peer, body, listing) = {
            let mut state = self.inner.state.lock().await;
            let Some(token) = state.token.clone() else {
                drop(state);
                self.require_auth().await;
                return Err(Error::AuthRequired);
            };
            let peer = state.store.peer().cloned().ok_or(Error::NoOpenConversation)?;
            let entry = state
                .store
                .get_local(local_id)
                .filter(|m| m.status == DeliveryStatus::Failed)
                .ok_or_else(|| Error::UnknownLocalMessage(local_id.to_string()))?;
            let body = entry.message.body.clone();
            let listing = entry.message.listing.clone();
            state.store.mark_pending(local_id);
            (token, peer, body, listing)
        };

        info!("Retrying message {} to {}", local_id, peer);
        self.deliver(peer, local_id.to_string(), &body, listing.as_deref(), token)
            .await
    }

    /// Drop a failed message from the store
    pub async fn discard_failed(&self, local_id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        match state.store.get_local(local_id) {
            Some(entry) if entry.status == DeliveryStatus::Failed => {
                state.store.remove(local_id);
                Ok(())
            }
            _ => Err(Error::UnknownLocalMessage(local_id.to_string())),
        }
    }

    async fn deliver(
        &self,
        peer: UserId,
        local_id: String,
        body: &str,
        listing: Option<&str>,
        token: AuthToken,
    ) -> Result<Message> {
        let result = self.inner.transport.send_message(&peer, body, &token, listing).await;

        let outcome = match result {
            Ok(message) => {
                {
                    let mut state = self.inner.state.lock().await;
                    if state.store.peer() == Some(&peer) {
                        state.store.confirm(&local_id, message.clone());
                    }
                }
                info!("Message {} delivered to {}", message.id, peer);
                self.emit(SyncEvent::MessageSent {
                    peer: peer.clone(),
                    local_id,
                    message_id: message.id.clone(),
                });
                Ok(message)
            }
            Err(e) => {
                {
                    let mut state = self.inner.state.lock().await;
                    if state.store.peer() == Some(&peer) {
                        state.store.mark_failed(&local_id);
                    }
                }
                warn!("Failed to send message {} to {}: {}", local_id, peer, e);
                self.emit(SyncEvent::SendFailed {
                    peer: peer.clone(),
                    local_id,
                    reason: e.to_string(),
                });
                if e.is_unauthorized() {
                    self.require_auth().await;
                    return Err(Error::AuthRequired);
                }
                Err(Error::Transport(e))
            }
        };

        if let Err(e) = self.mark_read(&peer).await {
            debug!("Skipping read acknowledgement after send: {}", e);
        }
        outcome
    }

    /// Flag the session as signed out and stop polling
    async fn require_auth(&self) {
        let first = {
            let mut state = self.inner.state.lock().await;
            state.token = None;
            !std::mem::replace(&mut state.auth_required, true)
        };
        self.inner.scheduler.stop();
        if first {
            warn!("Credential missing or rejected; polling stopped");
            self.emit(SyncEvent::AuthRequired);
        }
    }

    /// Install a fresh credential after [`SyncEvent::AuthRequired`]
    ///
    /// Polling does not resume until [`SyncEngine::start`] is called.
    pub async fn reauthenticate(&self, token: AuthToken) {
        let mut state = self.inner.state.lock().await;
        state.token = Some(token);
        state.auth_required = false;
        info!("Credential replaced for {}", self.inner.local_user);
    }

    /// Whether the engine is waiting for a new credential
    pub async fn is_auth_required(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.auth_required || state.token.is_none()
    }

    async fn current_token(&self) -> Option<AuthToken> {
        self.inner.state.lock().await.token.clone()
    }

    /// Switch narrow-viewport mode
    pub async fn set_narrow_viewport(&self, narrow: bool) {
        self.inner.state.lock().await.narrow_viewport = narrow;
    }

    /// Snapshot of the open conversation's messages
    pub async fn messages(&self) -> Arc<Vec<StoredMessage>> {
        self.inner.state.lock().await.store.snapshot()
    }

    /// Conversations in display order
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.inner.state.lock().await.index.to_vec()
    }

    /// Summary for one peer
    pub async fn conversation(&self, peer: &UserId) -> Option<ConversationSummary> {
        self.inner.state.lock().await.index.find(peer).cloned()
    }

    /// Currently open peer
    pub async fn open_peer_id(&self) -> Option<UserId> {
        self.inner.state.lock().await.store.peer().cloned()
    }

    /// Unread messages across all conversations
    pub async fn unread_total(&self) -> u32 {
        self.inner.state.lock().await.index.total_unread()
    }

    /// Open peer, suppression flag and last poll time
    pub async fn sync_state(&self) -> SyncState {
        let state = self.inner.state.lock().await;
        SyncState {
            open_peer: state.store.peer().cloned(),
            suppressed: self.is_suppressed(),
            last_poll_at: state.last_poll_at,
        }
    }

    /// The local user this engine acts for
    pub fn local_user(&self) -> &UserId {
        &self.inner.local_user
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("local_user", &self.inner.local_user)
            .field("phase", &self.phase())
            .field("running", &self.is_running())
            .finish()
    }
}
