//! Integration tests for the realtime channel: a real in-process WebSocket
//! server for the happy path, and a transport double for the states a server
//! cannot easily produce (refused connects, dropped links, failing writes).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use campus_swap_client::messages::events;
use campus_swap_client::{
    ChannelState, ChatMessage, ClientError, DeliveryState, Link, OutgoingMessage,
    RealtimeChannel, ReconnectPolicy, SessionStore, Transport, User,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

fn signed_in() -> Arc<SessionStore> {
    let session = Arc::new(SessionStore::in_memory());
    session.set_session("T", &User::new("1")).unwrap();
    session
}

fn fast_policy(attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        attempts,
        delay: Duration::from_millis(10),
    }
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

fn outgoing(to: &str, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        recipient_id: to.into(),
        text: text.into(),
    }
}

// ── transport double ────────────────────────────────────────────────────

#[derive(Default)]
struct FakeTransport {
    refuse: bool,
    fail_sends: bool,
    opens: AtomicUsize,
    send_attempts: Arc<AtomicUsize>,
    urls: Mutex<Vec<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    /// Inbound feeders, one per opened link. Dropping one ends that link.
    feeders: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl FakeTransport {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn push_inbound(&self, frame: &str) {
        let feeders = self.feeders.lock().unwrap();
        feeders.last().unwrap().send(frame.to_string()).unwrap();
    }
}

struct FakeLink {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
    send_attempts: Arc<AtomicUsize>,
    fail_sends: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if self.refuse {
            return Err(ClientError::Socket("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeders.lock().unwrap().push(tx);
        Ok(Box::new(FakeLink {
            inbound: rx,
            sent: self.sent.clone(),
            send_attempts: self.send_attempts.clone(),
            fail_sends: self.fail_sends,
        }))
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn send(&mut self, frame: String) -> Result<(), ClientError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends {
            return Err(ClientError::Socket("write failed".into()));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

fn fake_channel(
    transport: Arc<FakeTransport>,
    session: Arc<SessionStore>,
    policy: ReconnectPolicy,
) -> RealtimeChannel {
    RealtimeChannel::with_transport("ws://chat.test/socket", session, policy, transport)
}

// ── tests with the double ───────────────────────────────────────────────

#[tokio::test]
async fn send_while_disconnected_never_emits_a_frame() {
    let transport = Arc::new(FakeTransport::default());
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(1));

    let delivery = channel.send_message(&outgoing("2", "offline hello"));
    assert!(delivery.is_failed());
    assert_eq!(transport.opens(), 0);
    assert!(transport.sent().is_empty());

    channel.connect();
    assert_eq!(
        channel.wait_ready(Duration::from_secs(2)).await,
        ChannelState::Connected
    );
    channel.disconnect();
    let after = channel.send_message(&outgoing("2", "after logout"));
    assert!(matches!(after.outcome().await, DeliveryState::Failed(_)));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn connect_is_idempotent_and_sends_token() {
    let transport = Arc::new(FakeTransport::default());
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(1));

    channel.connect();
    channel.connect();
    assert_eq!(
        channel.wait_ready(Duration::from_secs(2)).await,
        ChannelState::Connected
    );
    channel.connect();
    assert_eq!(transport.opens(), 1);
    assert_eq!(
        transport.urls.lock().unwrap()[0],
        "ws://chat.test/socket?token=T"
    );

    let delivery = channel.send_message(&outgoing("2", "hi"));
    assert_eq!(delivery.state(), &DeliveryState::Queued);
    assert_eq!(delivery.outcome().await, DeliveryState::Sent);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(frame["event"], events::CHAT_MESSAGE);
    assert_eq!(frame["data"]["recipientId"], "2");
    assert_eq!(frame["data"]["text"], "hi");
}

#[tokio::test]
async fn connect_without_token_opens_nothing() {
    let transport = Arc::new(FakeTransport::default());
    let channel = fake_channel(
        transport.clone(),
        Arc::new(SessionStore::in_memory()),
        fast_policy(1),
    );
    channel.connect();
    assert_eq!(channel.state(), ChannelState::Disconnected);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.opens(), 0);
}

#[tokio::test]
async fn reconnect_attempts_are_capped() {
    let transport = Arc::new(FakeTransport {
        refuse: true,
        ..Default::default()
    });
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(2));

    channel.connect();
    assert_eq!(channel.state(), ChannelState::Connecting);
    assert_eq!(
        channel.wait_ready(Duration::from_secs(2)).await,
        ChannelState::Disconnected
    );
    // First attempt plus two retries.
    assert_eq!(transport.opens(), 3);

    // A fresh connect() is allowed once the previous driver gave up.
    eventually("second round of attempts", || {
        channel.connect();
        transport.opens() >= 6
    })
    .await;
}

#[tokio::test]
async fn dropped_link_is_reopened() {
    let transport = Arc::new(FakeTransport::default());
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(3));
    channel.connect();
    channel.wait_ready(Duration::from_secs(2)).await;

    transport.feeders.lock().unwrap().clear();
    eventually("link reopened", || transport.opens() == 2).await;
    assert_eq!(
        channel.wait_ready(Duration::from_secs(2)).await,
        ChannelState::Connected
    );
}

#[tokio::test]
async fn failing_writes_are_retried_then_reported() {
    let transport = Arc::new(FakeTransport {
        fail_sends: true,
        ..Default::default()
    });
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(10));
    channel.connect();
    channel.wait_ready(Duration::from_secs(2)).await;

    let delivery = channel.send_message(&outgoing("2", "hi"));
    let outcome = tokio::time::timeout(Duration::from_secs(5), delivery.outcome())
        .await
        .expect("delivery should resolve");
    assert!(matches!(outcome, DeliveryState::Failed(_)));
    assert_eq!(
        transport.send_attempts.load(Ordering::SeqCst),
        1 + campus_swap_client::realtime::SEND_RETRIES as usize
    );
}

#[tokio::test]
async fn listeners_fire_in_registration_order() {
    let transport = Arc::new(FakeTransport::default());
    let channel = fake_channel(transport.clone(), signed_in(), fast_policy(1));
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let first_log = log.clone();
    let first = channel.on_message(move |m: ChatMessage| {
        first_log.lock().unwrap().push(format!("first:{}", m.text));
    });
    let second_log = log.clone();
    let _second = channel.on_message(move |m: ChatMessage| {
        second_log.lock().unwrap().push(format!("second:{}", m.text));
    });
    let conv_log = log.clone();
    let _conversations = channel.on(events::ALL_CONVERSATIONS, move |data| {
        conv_log
            .lock()
            .unwrap()
            .push(format!("conversations:{}", data.as_array().map_or(0, Vec::len)));
    });

    channel.connect();
    channel.wait_ready(Duration::from_secs(2)).await;
    transport.push_inbound(
        r#"{"event":"chat message","data":{"senderId":"2","recipientId":"1","text":"a","timestamp":"2024-01-01T10:00:00Z"}}"#,
    );
    transport.push_inbound("garbage frame");
    transport.push_inbound(r#"{"event":"all conversations","data":[{"userId":"2"}]}"#);
    eventually("three callbacks", || log.lock().unwrap().len() == 3).await;
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:a", "second:a", "conversations:1"]
    );

    first.unsubscribe();
    transport.push_inbound(
        r#"{"event":"chat message","data":{"senderId":"2","recipientId":"1","text":"b","timestamp":"2024-01-01T10:01:00Z"}}"#,
    );
    eventually("fourth callback", || log.lock().unwrap().len() == 4).await;
    assert_eq!(log.lock().unwrap()[3], "second:b");
}

// ── real WebSocket server ───────────────────────────────────────────────

#[tokio::test]
async fn websocket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (got_tx, mut got_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let (tcp_stream, _) = listener.accept().await.unwrap();
        let ws_stream = accept_async(tcp_stream).await.unwrap();
        let (mut write, mut read) = ws_stream.split();
        let inbound = r#"{"event":"chat message","data":{"senderId":"2","recipientId":"1","message":"Still selling the lamp?","timestamp":"2024-01-01T10:00:00Z"}}"#;
        write.send(Message::Text(inbound.into())).await.unwrap();
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                let _ = got_tx.send(text);
            }
        }
    });

    let channel = RealtimeChannel::new(
        format!("ws://127.0.0.1:{}/socket", port),
        signed_in(),
        fast_policy(1),
    );
    let received = Arc::new(Mutex::new(Vec::<ChatMessage>::new()));
    let sink = received.clone();
    let _sub = channel.on_message(move |m| sink.lock().unwrap().push(m));

    channel.connect();
    assert_eq!(
        channel.wait_ready(Duration::from_secs(5)).await,
        ChannelState::Connected
    );
    eventually("inbound chat message", || !received.lock().unwrap().is_empty()).await;
    assert_eq!(received.lock().unwrap()[0].text, "Still selling the lamp?");

    let delivery = channel.send_message(&outgoing("2", "Yes, $25"));
    assert_eq!(delivery.outcome().await, DeliveryState::Sent);
    let frame = tokio::time::timeout(Duration::from_secs(5), got_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["event"], "chat message");
    assert_eq!(frame["data"]["text"], "Yes, $25");

    channel.disconnect();
    assert_eq!(channel.state(), ChannelState::Disconnected);
}
