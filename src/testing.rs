//! Shared test doubles: a scriptable transport, recording collaborator
//! hooks and stack assembly helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::connection::transport::{Transport, TransportError, TransportEvent, TransportFactory};
use crate::connection::{
    ChatClient, Command, ConnectionManager, ConnectionPolicy, ConnectionState,
};
use crate::hooks::{EventHandler, Notifier, Renderer};
use crate::lifecycle::{MessageLifecycle, PendingLocalMessage};
use crate::protocol::{IncomingMessage, SendAck};
use crate::upload::MediaUploader;

/// Transport half handed to the connection; frames it sends surface on the
/// paired [`MockRemote`], and inbound events are whatever the test scripts.
pub(crate) struct MockTransport {
    sent: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Test-side handle for one scripted connection.
pub(crate) struct MockRemote {
    pub sent_rx: mpsc::UnboundedReceiver<String>,
    pub event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    pub fn pair() -> (Self, MockRemote) {
        let (sent, sent_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        (Self { sent, events }, MockRemote { sent_rx, event_tx })
    }
}

impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|_| TransportError::Send("remote dropped".to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(event) => event,
            // Script exhausted: stay quiet instead of fabricating a close.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// Factory with a scripted queue of connect outcomes. Unscripted connects
/// fail. Clones share the script and the recorded connect instants.
#[derive(Clone)]
pub(crate) struct MockFactory {
    plan: Arc<Mutex<VecDeque<Result<MockTransport, TransportError>>>>,
    connects: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            plan: Arc::new(Mutex::new(VecDeque::new())),
            connects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_failure(&self) {
        self.plan
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Connect("scripted failure".to_string())));
    }

    pub fn push_success(&self) -> MockRemote {
        let (transport, remote) = MockTransport::pair();
        self.plan.lock().unwrap().push_back(Ok(transport));
        remote
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn connect_instants(&self) -> Vec<tokio::time::Instant> {
        self.connects.lock().unwrap().clone()
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    async fn connect(&mut self, _url: &str) -> Result<MockTransport, TransportError> {
        self.connects.lock().unwrap().push(tokio::time::Instant::now());
        self.plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted connection".to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RenderEvent {
    Pending(String),
    Sent {
        local_id: String,
        server_id: Option<String>,
    },
    Failed(String),
    Released(String),
}

#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub events: Mutex<Vec<RenderEvent>>,
}

impl Renderer for RecordingRenderer {
    fn show_pending(&self, message: &PendingLocalMessage) {
        self.events
            .lock()
            .unwrap()
            .push(RenderEvent::Pending(message.local_id.clone()));
    }

    fn mark_sent(&self, local_id: &str, server_id: Option<&str>, _timestamp: Option<u64>) {
        self.events.lock().unwrap().push(RenderEvent::Sent {
            local_id: local_id.to_string(),
            server_id: server_id.map(String::from),
        });
    }

    fn mark_failed(&self, local_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(RenderEvent::Failed(local_id.to_string()));
    }

    fn release_preview(&self, local_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(RenderEvent::Released(local_id.to_string()));
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub incoming: AtomicU32,
    pub pending_conversations: AtomicU32,
    pub exhausted: AtomicU32,
    pub failures: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn incoming_message(&self, _message: &IncomingMessage) {
        self.incoming.fetch_add(1, Ordering::SeqCst);
    }

    fn pending_conversation(&self) {
        self.pending_conversations.fetch_add(1, Ordering::SeqCst);
    }

    fn reconnect_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }

    fn send_failed(&self, local_id: &str, _reason: &str) {
        self.failures.lock().unwrap().push(local_id.to_string());
    }
}

#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub chat_lists: Mutex<Vec<Option<String>>>,
    pub new_messages: Mutex<Vec<IncomingMessage>>,
    pub acks: Mutex<Vec<SendAck>>,
    pub unknown: Mutex<Vec<String>>,
}

impl EventHandler for RecordingHandler {
    fn on_chat_list(&self, tab_type: Option<&str>, _payload: &Value) {
        self.chat_lists
            .lock()
            .unwrap()
            .push(tab_type.map(String::from));
    }

    fn on_new_message(&self, message: &IncomingMessage) {
        self.new_messages.lock().unwrap().push(message.clone());
    }

    fn on_send_ack(&self, ack: &SendAck) {
        self.acks.lock().unwrap().push(ack.clone());
    }

    fn on_unknown(&self, kind: &str, _payload: &Value) {
        self.unknown.lock().unwrap().push(kind.to_string());
    }
}

/// Policy with timers pushed far out so only the behavior under test moves
/// the clock. Backoff stays at the production base.
pub(crate) fn test_policy() -> ConnectionPolicy {
    ConnectionPolicy {
        base_delay: Duration::from_secs(3),
        max_attempts: 5,
        initial_load_delay: Duration::from_secs(3600),
        heartbeat_interval: Duration::from_secs(7200),
        initial_tab: "open".to_string(),
    }
}

pub(crate) struct TestStack {
    pub manager: ConnectionManager<MockFactory>,
    pub client: ChatClient,
    pub lifecycle: Arc<MessageLifecycle>,
    pub renderer: Arc<RecordingRenderer>,
    pub notifier: Arc<RecordingNotifier>,
    pub handler: Arc<RecordingHandler>,
}

pub(crate) fn test_stack(factory: MockFactory, policy: ConnectionPolicy) -> TestStack {
    let renderer = Arc::new(RecordingRenderer::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = Arc::new(RecordingHandler::default());
    let (manager, client, lifecycle) = ConnectionManager::new(
        factory,
        "ws://scripted".to_string(),
        policy,
        handler.clone(),
        renderer.clone(),
        notifier.clone(),
        MediaUploader::new("http://127.0.0.1:9".to_string()),
    );
    TestStack {
        manager,
        client,
        lifecycle,
        renderer,
        notifier,
        handler,
    }
}

/// A client wired to a bare channel, for units that need to observe frames
/// without a running connection task.
pub(crate) fn loose_client() -> (ChatClient, mpsc::UnboundedReceiver<Command>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Open);
    // Keep the watch alive for the client's lifetime.
    std::mem::forget(state_tx);
    (ChatClient::new(cmd_tx, state_rx), cmd_rx)
}

/// Waits for the connection task to publish `target`.
pub(crate) async fn wait_state(client: &ChatClient, target: ConnectionState) {
    let mut rx = client.state_changes();
    // Mark the current value seen so a stale match from a previous session
    // does not satisfy the wait; only a fresh publish counts.
    rx.borrow_and_update();
    loop {
        rx.changed().await.expect("connection task dropped");
        if *rx.borrow_and_update() == target {
            return;
        }
    }
}

/// Polls `check` across task switches until it yields a value.
pub(crate) async fn until<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..1000 {
        if let Some(value) = check() {
            return value;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
