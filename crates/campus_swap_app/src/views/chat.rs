//! Chat and conversation-list screens over the shared realtime channel.
//!
//! Channel callbacks run on the channel's driver task, so screen state lives
//! behind an `Arc<Mutex<_>>` that both sides can reach. Unmounting drops this
//! screen's listeners only; the channel itself stays open.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use campus_swap_client::messages::{events, HistoryResponse};
use campus_swap_client::{
    ChannelState, ChatMessage, Conversation, Delivery, DeliveryState, OutgoingMessage,
    RealtimeChannel, Subscription,
};

use super::LoadState;

const CONNECT_FAILED: &str = "Unable to connect to chat server";

fn unsubscribe_all(subscriptions: &mut Vec<Subscription>) {
    for subscription in subscriptions.drain(..) {
        subscription.unsubscribe();
    }
}

/// Connect the channel and wait for it; `Err` carries the inline message.
async fn ensure_connected(channel: &RealtimeChannel, timeout: Duration) -> Result<(), String> {
    channel.connect();
    match channel.wait_ready(timeout).await {
        ChannelState::Connected => Ok(()),
        state => {
            tracing::warn!(?state, "chat channel not ready");
            Err(CONNECT_FAILED.to_string())
        }
    }
}

#[derive(Debug, Default)]
struct ChatState {
    load: LoadState<Conversation>,
    /// Live messages that arrived before the history reply.
    early: Vec<ChatMessage>,
}

impl ChatState {
    fn apply_history(&mut self, counterpart: &str, history: HistoryResponse) {
        let mut conversation = Conversation::new(counterpart);
        if let Some(recipient) = history.recipient {
            conversation.name = recipient.name;
            conversation.is_online = recipient.is_online;
        }
        let mut merged: Vec<ChatMessage> = Vec::with_capacity(history.messages.len());
        for message in history.messages.into_iter().chain(self.early.drain(..)) {
            if !merged.contains(&message) {
                merged.push(message);
            }
        }
        // Servers may reply newest-first; ties keep arrival order.
        merged.sort_by_key(|m| m.timestamp);
        for message in merged {
            if let Err(e) = conversation.append(message) {
                tracing::warn!(error = %e, "skipping out-of-order message");
            }
        }
        self.load = LoadState::Ready(conversation);
    }

    fn push_live(&mut self, message: ChatMessage) {
        match &mut self.load {
            LoadState::Ready(conversation) => {
                if let Err(e) = conversation.append(message) {
                    tracing::warn!(error = %e, "skipping out-of-order message");
                }
            }
            _ => self.early.push(message),
        }
    }
}

/// One-to-one chat with `counterpart`.
#[derive(Debug)]
pub struct ChatView {
    channel: Arc<RealtimeChannel>,
    counterpart: String,
    state: Arc<Mutex<ChatState>>,
    subscriptions: Vec<Subscription>,
}

impl ChatView {
    pub fn new(channel: Arc<RealtimeChannel>, counterpart: impl Into<String>) -> Self {
        Self {
            channel,
            counterpart: counterpart.into(),
            state: Arc::new(Mutex::new(ChatState::default())),
            subscriptions: Vec::new(),
        }
    }

    pub fn counterpart(&self) -> &str {
        &self.counterpart
    }

    /// Subscribe, connect and ask for the history. The history itself arrives
    /// asynchronously; poll [`ChatView::state`].
    pub async fn mount(&mut self, timeout: Duration) {
        unsubscribe_all(&mut self.subscriptions);
        *self.lock() = ChatState::default();

        let state = self.state.clone();
        let counterpart = self.counterpart.clone();
        self.subscriptions.push(self.channel.on(
            events::CONVERSATION_HISTORY,
            move |data| match serde_json::from_value::<HistoryResponse>(data.clone()) {
                Ok(history) => state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply_history(&counterpart, history),
                Err(e) => tracing::warn!(error = %e, "undecodable conversation history"),
            },
        ));

        let state = self.state.clone();
        let counterpart = self.counterpart.clone();
        self.subscriptions.push(self.channel.on_message(move |message| {
            if message.sender_id == counterpart || message.recipient_id == counterpart {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_live(message);
            }
        }));

        let requested = match ensure_connected(&self.channel, timeout).await {
            Ok(()) => {
                let delivery = self.channel.request_history(&self.counterpart);
                match delivery.state() {
                    DeliveryState::Failed(reason) => Err(reason.clone()),
                    _ => Ok(()),
                }
            }
            Err(message) => Err(message),
        };
        if let Err(message) = requested {
            self.lock().load = LoadState::Error(message);
        }
    }

    pub fn state(&self) -> LoadState<Conversation> {
        self.lock().load.clone()
    }

    /// Send trimmed `text`; blank input sends nothing.
    pub fn send(&self, text: &str) -> Option<Delivery> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(self.channel.send_message(&OutgoingMessage {
            recipient_id: self.counterpart.clone(),
            text: text.to_string(),
        }))
    }

    pub fn unmount(&mut self) {
        unsubscribe_all(&mut self.subscriptions);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Conversation list; re-requested whenever a chat message arrives.
#[derive(Debug)]
pub struct ConversationsView {
    channel: Arc<RealtimeChannel>,
    state: Arc<Mutex<LoadState<Vec<Conversation>>>>,
    subscriptions: Vec<Subscription>,
}

impl ConversationsView {
    pub fn new(channel: Arc<RealtimeChannel>) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(LoadState::Loading)),
            subscriptions: Vec::new(),
        }
    }

    pub async fn mount(&mut self, timeout: Duration) {
        unsubscribe_all(&mut self.subscriptions);
        *self.lock() = LoadState::Loading;

        let state = self.state.clone();
        self.subscriptions.push(self.channel.on(events::ALL_CONVERSATIONS, move |data| {
            let conversations = if data.is_null() {
                Ok(Vec::new())
            } else {
                serde_json::from_value::<Vec<Conversation>>(data.clone())
            };
            match conversations {
                Ok(list) => {
                    *state.lock().unwrap_or_else(PoisonError::into_inner) = LoadState::Ready(list)
                }
                Err(e) => tracing::warn!(error = %e, "undecodable conversation list"),
            }
        }));

        let channel: Weak<RealtimeChannel> = Arc::downgrade(&self.channel);
        self.subscriptions.push(self.channel.on_message(move |_| {
            if let Some(channel) = channel.upgrade() {
                channel.request_conversations();
            }
        }));

        let requested = match ensure_connected(&self.channel, timeout).await {
            Ok(()) => match self.channel.request_conversations().state() {
                DeliveryState::Failed(reason) => Err(reason.clone()),
                _ => Ok(()),
            },
            Err(message) => Err(message),
        };
        if let Err(message) = requested {
            *self.lock() = LoadState::Error(message);
        }
    }

    pub fn state(&self) -> LoadState<Vec<Conversation>> {
        self.lock().clone()
    }

    pub fn unmount(&mut self) {
        unsubscribe_all(&mut self.subscriptions);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoadState<Vec<Conversation>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConversationsView {
    fn drop(&mut self) {
        self.unmount();
    }
}
