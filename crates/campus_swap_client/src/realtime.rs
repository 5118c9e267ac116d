//! Realtime channel: one duplex connection per session, shared by every chat
//! screen.
//!
//! `connect()` spawns a driver task that owns the link and multiplexes inbound
//! frames, outbound commands and cancellation. Listener callbacks run on that
//! task in registration order. Sending while not connected fails immediately
//! and writes nothing; a queued message reports `Sent` or `Failed` through its
//! [`Delivery`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{Config, ReconnectPolicy};
use crate::error::ClientError;
use crate::messages::{events, Envelope, HistoryRequest};
use crate::models::{ChatMessage, OutgoingMessage};
use crate::session::SessionStore;
use crate::transport::{Link, Transport, WsTransport};

/// Extra write attempts for a frame whose first write failed.
pub const SEND_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Queued,
    Sent,
    Failed(String),
}

/// Outcome handle for one outbound message.
#[derive(Debug)]
pub struct Delivery {
    initial: DeliveryState,
    reply: Option<oneshot::Receiver<DeliveryState>>,
}

impl Delivery {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            initial: DeliveryState::Failed(reason.into()),
            reply: None,
        }
    }

    fn queued(reply: oneshot::Receiver<DeliveryState>) -> Self {
        Self {
            initial: DeliveryState::Queued,
            reply: Some(reply),
        }
    }

    /// State at the moment of sending: `Queued` or `Failed`.
    pub fn state(&self) -> &DeliveryState {
        &self.initial
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.initial, DeliveryState::Failed(_))
    }

    /// Wait until the frame is written or given up on.
    pub async fn outcome(self) -> DeliveryState {
        match self.reply {
            None => self.initial,
            Some(rx) => rx.await.unwrap_or_else(|_| {
                DeliveryState::Failed("connection closed before delivery".into())
            }),
        }
    }
}

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Listener {
    id: u64,
    event: String,
    callback: Callback,
}

struct Shared {
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
    /// Bumped on every connect/disconnect so a stale driver cannot overwrite
    /// the state of its successor.
    generation: AtomicU64,
    state: watch::Sender<ChannelState>,
}

impl Shared {
    fn set_state(&self, generation: u64, state: ChannelState) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(state);
        }
    }

    fn dispatch(&self, frame: &str) {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound frame");
                return;
            }
        };
        let callbacks: Vec<Callback> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.event == envelope.event)
            .map(|l| l.callback.clone())
            .collect();
        if callbacks.is_empty() {
            tracing::debug!(event = %envelope.event, "no listener for event");
        }
        for callback in callbacks {
            callback(&envelope.data);
        }
    }

    fn remove_listener(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| l.id != id);
    }
}

/// Returned by `on`/`on_message`; call [`Subscription::unsubscribe`] to stop
/// receiving events. Dropping it leaves the listener registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_listener(self.id);
        }
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

struct Outbound {
    frame: String,
    retries_left: u32,
    reply: Option<oneshot::Sender<DeliveryState>>,
}

impl Outbound {
    fn resolve(self, state: DeliveryState) {
        if let Some(reply) = self.reply {
            let _ = reply.send(state);
        }
    }
}

struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RealtimeChannel {
    endpoint: String,
    session: Arc<SessionStore>,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl RealtimeChannel {
    pub fn new(endpoint: impl Into<String>, session: Arc<SessionStore>, policy: ReconnectPolicy) -> Self {
        Self::with_transport(endpoint, session, policy, Arc::new(WsTransport))
    }

    pub fn from_config(config: &Config, session: Arc<SessionStore>) -> Self {
        Self::new(config.realtime_url(), session, config.reconnect_policy())
    }

    pub fn with_transport(
        endpoint: impl Into<String>,
        session: Arc<SessionStore>,
        policy: ReconnectPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            endpoint: endpoint.into(),
            session,
            policy,
            transport,
            shared: Arc::new(Shared {
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                state,
            }),
            connection: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Start connecting. No-op while a connection is open or being opened;
    /// logs and stays disconnected when the session has no token. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if connection.as_ref().is_some_and(|c| !c.task.is_finished()) {
            tracing::debug!("socket already connected");
            return;
        }
        let Some(token) = self.session.token() else {
            tracing::error!("authentication token required for socket connection");
            return;
        };
        let url = match self.handshake_url(&token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "invalid realtime endpoint");
                return;
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(generation, ChannelState::Connecting);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(
            self.shared.clone(),
            generation,
            self.transport.clone(),
            url,
            self.policy,
            rx,
            cancel.clone(),
        ));
        *connection = Some(Connection {
            outbound: tx,
            cancel,
            task,
        });
    }

    /// Tear down the connection and drop every listener. Safe to call when
    /// already disconnected.
    pub fn disconnect(&self) {
        let taken = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = taken {
            connection.cancel.cancel();
            tracing::info!("socket disconnected");
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.shared.state.send_replace(ChannelState::Disconnected);
    }

    /// Wait until the channel leaves `Connecting`, or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> ChannelState {
        let mut rx = self.shared.state.subscribe();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|s| *s != ChannelState::Connecting)).await;
        self.state()
    }

    pub fn send_message(&self, message: &OutgoingMessage) -> Delivery {
        match serde_json::to_value(message) {
            Ok(data) => self.emit(events::CHAT_MESSAGE, data),
            Err(e) => Delivery::failed(e.to_string()),
        }
    }

    /// Ask the server for the conversation list (`all conversations` reply).
    pub fn request_conversations(&self) -> Delivery {
        self.emit(events::GET_ALL_CONVERSATIONS, Value::Null)
    }

    /// Ask the server for the history with `user_id` (`conversation history` reply).
    pub fn request_history(&self, user_id: &str) -> Delivery {
        let request = HistoryRequest {
            user_id: user_id.to_string(),
        };
        match serde_json::to_value(request) {
            Ok(data) => self.emit(events::GET_CONVERSATION_HISTORY, data),
            Err(e) => Delivery::failed(e.to_string()),
        }
    }

    /// Send an arbitrary event. Never queues while not connected.
    pub fn emit(&self, event: &str, data: Value) -> Delivery {
        if !self.is_connected() {
            tracing::error!(event, "socket not connected, message dropped");
            return Delivery::failed("socket not connected");
        }
        let frame = match Envelope::new(event, data).to_frame() {
            Ok(frame) => frame,
            Err(e) => return Delivery::failed(e.to_string()),
        };
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(connection) = connection.as_ref() else {
            return Delivery::failed("socket not connected");
        };
        let (reply, rx) = oneshot::channel();
        let command = Outbound {
            frame,
            retries_left: SEND_RETRIES,
            reply: Some(reply),
        };
        if connection.outbound.send(command).is_err() {
            return Delivery::failed("socket connection closed");
        }
        Delivery::queued(rx)
    }

    /// Register a raw listener for `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                id,
                event: event.to_string(),
                callback: Arc::new(callback),
            });
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Register a listener for inbound chat messages. Payloads that do not
    /// decode are logged and skipped.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.on(events::CHAT_MESSAGE, move |data| {
            match serde_json::from_value::<ChatMessage>(data.clone()) {
                Ok(message) => callback(message),
                Err(e) => tracing::warn!(error = %e, "undecodable chat message"),
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn handshake_url(&self, token: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::Socket(format!("{}: {}", self.endpoint, e)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(connection) = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            connection.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

// ── driver ──────────────────────────────────────────────────────────────

enum LinkEnd {
    Cancelled,
    Dropped,
}

async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    transport: Arc<dyn Transport>,
    url: Url,
    policy: ReconnectPolicy,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    let mut pending: Option<Outbound> = None;

    loop {
        shared.set_state(generation, ChannelState::Connecting);
        let opened = tokio::select! {
            _ = cancel.cancelled() => break,
            opened = transport.open(&url) => opened,
        };
        let mut link = match opened {
            Ok(link) => link,
            Err(e) => {
                failures += 1;
                tracing::error!(attempt = failures, error = %e, "socket connection error");
                if failures > policy.attempts {
                    tracing::warn!(attempts = failures, "giving up on socket connection");
                    break;
                }
                if sleep_or_cancel(policy.delay, &cancel).await {
                    break;
                }
                continue;
            }
        };

        failures = 0;
        shared.set_state(generation, ChannelState::Connected);
        tracing::info!("socket connected");

        let end = run_link(&shared, link.as_mut(), &mut outbound, &mut pending, &cancel).await;
        link.close().await;
        match end {
            LinkEnd::Cancelled => break,
            LinkEnd::Dropped => {
                tracing::info!("socket dropped, reconnecting");
                shared.set_state(generation, ChannelState::Connecting);
                if sleep_or_cancel(policy.delay, &cancel).await {
                    break;
                }
            }
        }
    }

    outbound.close();
    if let Some(command) = pending.take() {
        command.resolve(DeliveryState::Failed("socket connection closed".into()));
    }
    while let Ok(command) = outbound.try_recv() {
        command.resolve(DeliveryState::Failed("socket connection closed".into()));
    }
    shared.set_state(generation, ChannelState::Disconnected);
}

/// True when cancelled before `delay` elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

async fn run_link(
    shared: &Shared,
    link: &mut dyn Link,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    pending: &mut Option<Outbound>,
    cancel: &CancellationToken,
) -> LinkEnd {
    if let Some(command) = pending.take() {
        if let Err(retry) = deliver(link, command).await {
            *pending = retry;
            return LinkEnd::Dropped;
        }
    }
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return LinkEnd::Cancelled,
            frame = link.recv() => match frame {
                Some(Ok(text)) => shared.dispatch(&text),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "socket read failed");
                    return LinkEnd::Dropped;
                }
                None => return LinkEnd::Dropped,
            },
            command = outbound.recv() => match command {
                Some(command) => {
                    if let Err(retry) = deliver(link, command).await {
                        *pending = retry;
                        return LinkEnd::Dropped;
                    }
                }
                None => return LinkEnd::Cancelled,
            },
        }
    }
}

/// Write one frame. `Err(Some(_))` hands the command back for another try on
/// the next link; `Err(None)` means it was failed for good.
async fn deliver(link: &mut dyn Link, mut command: Outbound) -> Result<(), Option<Outbound>> {
    match link.send(command.frame.clone()).await {
        Ok(()) => {
            command.resolve(DeliveryState::Sent);
            Ok(())
        }
        Err(e) if command.retries_left == 0 => {
            tracing::warn!(error = %e, "socket send failed, giving up");
            command.resolve(DeliveryState::Failed(e.to_string()));
            Err(None)
        }
        Err(e) => {
            command.retries_left -= 1;
            tracing::warn!(error = %e, retries_left = command.retries_left, "socket send failed");
            Err(Some(command))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn channel(session: Arc<SessionStore>) -> RealtimeChannel {
        RealtimeChannel::new("ws://127.0.0.1:9/socket", session, ReconnectPolicy::default())
    }

    #[test]
    fn handshake_url_carries_token() {
        let session = Arc::new(SessionStore::in_memory());
        let ch = channel(session);
        let url = ch.handshake_url("a b").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9/socket?token=a+b");
    }

    #[tokio::test]
    async fn connect_without_token_stays_disconnected() {
        let ch = channel(Arc::new(SessionStore::in_memory()));
        ch.connect();
        assert_eq!(ch.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn send_while_disconnected_fails_fast() {
        let session = Arc::new(SessionStore::in_memory());
        session.set_session("T", &User::new("1")).unwrap();
        let ch = channel(session);
        let delivery = ch.send_message(&OutgoingMessage {
            recipient_id: "2".into(),
            text: "hi".into(),
        });
        assert!(delivery.is_failed());
        assert!(matches!(delivery.outcome().await, DeliveryState::Failed(_)));
    }

    #[test]
    fn listeners_unsubscribe_and_clear_on_disconnect() {
        let ch = channel(Arc::new(SessionStore::in_memory()));
        let a = ch.on_message(|_| {});
        let _b = ch.on(events::ALL_CONVERSATIONS, |_| {});
        assert_eq!(ch.listener_count(), 2);
        a.unsubscribe();
        assert_eq!(ch.listener_count(), 1);
        ch.disconnect();
        ch.disconnect();
        assert_eq!(ch.listener_count(), 0);
        assert_eq!(ch.state(), ChannelState::Disconnected);
    }
}
