//! Connection lifecycle: one persistent socket to the chat server, with
//! exponential-backoff reconnect and an outbound buffer for frames issued
//! while offline.
//!
//! The state machine is a single task owning the transport; handles talk to
//! it over a command channel and observe it through a watch channel. Because
//! there is only one loop, at most one reconnect can ever be pending and a
//! new connect supersedes the previous transport by construction.

pub mod transport;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dispatch::EventDispatcher;
use crate::hooks::{EventHandler, Notifier, Renderer};
use crate::lifecycle::MessageLifecycle;
use crate::protocol::ClientFrame;
use crate::upload::MediaUploader;

use transport::{Transport, TransportEvent, TransportFactory};

/// Who this connection is for. Fixed for the connection's lifetime; the
/// fields travel as query parameters in the socket URL.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    ReconnectScheduled,
    /// Terminal: the retry cap was hit. Frames still buffer, but no further
    /// automatic attempt is made.
    Exhausted,
}

/// Reconnect and session timing knobs.
#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    /// How long after open to wait before requesting the initial chat list.
    pub initial_load_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Tab requested by the deferred initial load.
    pub initial_tab: String,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_attempts: 5,
            initial_load_delay: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(30),
            initial_tab: "open".to_string(),
        }
    }
}

impl ConnectionPolicy {
    /// Delay before reconnect attempt `n` (1-based): `base × 1.5^(n−1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(1.5_f64.powi(attempt.saturating_sub(1) as i32))
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Send(ClientFrame),
    Disconnect,
}

#[derive(Debug, Error)]
#[error("connection task has shut down")]
pub struct ConnectionClosed;

/// Cheap cloneable handle to the connection task.
#[derive(Clone)]
pub struct ChatClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ChatClient {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<Command>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { cmd_tx, state_rx }
    }

    /// Hands a frame to the connection task. Transmitted immediately when
    /// open, buffered otherwise; buffering while idle kicks off a fresh
    /// connect cycle so the frame is not starved.
    pub fn send(&self, frame: ClientFrame) -> Result<(), ConnectionClosed> {
        self.cmd_tx
            .send(Command::Send(frame))
            .map_err(|_| ConnectionClosed)
    }

    /// Requests an orderly close. No reconnect follows.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch endpoint for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

enum Step {
    Connect,
    WaitRetry(Duration),
    Idle,
    Done,
}

enum SessionAction {
    InitialLoad,
    Ping,
    Command(Option<Command>),
    Inbound(TransportEvent),
}

pub struct ConnectionManager<F: TransportFactory> {
    factory: F,
    url: String,
    policy: ConnectionPolicy,
    dispatcher: EventDispatcher,
    notifier: Arc<dyn Notifier>,
    buffer: VecDeque<ClientFrame>,
    /// Reconnect attempts made in the current backoff cycle.
    attempt: u32,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<F: TransportFactory> ConnectionManager<F> {
    /// Wires the full client: connection task, handle, and the optimistic
    /// message lifecycle sharing the same command channel.
    pub fn new(
        factory: F,
        url: String,
        policy: ConnectionPolicy,
        handler: Arc<dyn EventHandler>,
        renderer: Arc<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
        uploader: MediaUploader,
    ) -> (Self, ChatClient, Arc<MessageLifecycle>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let client = ChatClient::new(cmd_tx, state_rx);
        let lifecycle = Arc::new(MessageLifecycle::new(
            client.clone(),
            renderer,
            notifier.clone(),
            uploader,
        ));
        let dispatcher = EventDispatcher::new(handler, notifier.clone(), lifecycle.clone());
        let manager = Self {
            factory,
            url,
            policy,
            dispatcher,
            notifier,
            buffer: VecDeque::new(),
            attempt: 0,
            cmd_rx,
            state_tx,
        };
        (manager, client, lifecycle)
    }

    /// Runs the connection until every handle is dropped. Connects
    /// immediately on entry.
    pub async fn run(mut self) {
        let mut step = Step::Connect;
        loop {
            step = match step {
                Step::Connect => self.connect_once().await,
                Step::WaitRetry(delay) => self.wait_retry(delay).await,
                Step::Idle => self.idle().await,
                Step::Done => break,
            };
        }
        debug!("connection task finished");
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "connection state");
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    async fn connect_once(&mut self) -> Step {
        self.set_state(ConnectionState::Connecting);
        match self.factory.connect(&self.url).await {
            Ok(conn) => self.session(conn).await,
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.set_state(ConnectionState::Disconnected);
                self.schedule_or_give_up()
            }
        }
    }

    fn schedule_or_give_up(&mut self) -> Step {
        if self.attempt >= self.policy.max_attempts {
            warn!(
                attempts = self.attempt,
                "reconnect attempts exhausted, giving up"
            );
            self.set_state(ConnectionState::Exhausted);
            self.notifier.reconnect_exhausted();
            Step::Idle
        } else {
            self.attempt += 1;
            let delay = self.policy.delay_for(self.attempt);
            info!(
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );
            self.set_state(ConnectionState::ReconnectScheduled);
            Step::WaitRetry(delay)
        }
    }

    async fn wait_retry(&mut self, delay: Duration) -> Step {
        let retry = tokio::time::sleep(delay);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                () = &mut retry => return Step::Connect,
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return Step::Done,
                    // A reconnect is already pending, so just buffer.
                    Some(Command::Send(frame)) => self.buffer.push_back(frame),
                    Some(Command::Disconnect) => {
                        info!("disconnect requested, cancelling reconnect");
                        self.set_state(ConnectionState::Disconnected);
                        return Step::Idle;
                    }
                },
            }
        }
    }

    /// Disconnected with nothing scheduled. Reached after a clean close,
    /// an explicit disconnect, or exhaustion.
    async fn idle(&mut self) -> Step {
        loop {
            let Some(cmd) = self.cmd_rx.recv().await else {
                return Step::Done;
            };
            match cmd {
                Command::Disconnect => {}
                Command::Send(frame) => {
                    self.buffer.push_back(frame);
                    if self.state() == ConnectionState::Exhausted {
                        warn!("reconnect attempts exhausted; frame buffered but not sent");
                    } else {
                        // Buffered traffic must not starve behind a closed
                        // transport; start a fresh connect cycle.
                        self.attempt = 0;
                        return Step::Connect;
                    }
                }
            }
        }
    }

    async fn session(&mut self, mut conn: F::Transport) -> Step {
        info!("connection open");
        self.set_state(ConnectionState::Open);
        self.attempt = 0;

        // Frames queued while offline go out first, oldest first.
        while let Some(frame) = self.buffer.pop_front() {
            self.transmit(&mut conn, &frame).await;
        }

        let initial_load = tokio::time::sleep(self.policy.initial_load_delay);
        tokio::pin!(initial_load);
        let mut initial_load_pending = true;
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.policy.heartbeat_interval,
            self.policy.heartbeat_interval,
        );

        loop {
            let action = tokio::select! {
                () = &mut initial_load, if initial_load_pending => SessionAction::InitialLoad,
                _ = heartbeat.tick() => SessionAction::Ping,
                cmd = self.cmd_rx.recv() => SessionAction::Command(cmd),
                ev = conn.recv() => SessionAction::Inbound(ev),
            };
            match action {
                SessionAction::InitialLoad => {
                    initial_load_pending = false;
                    let frame = ClientFrame::RequestChatList {
                        tab_type: self.policy.initial_tab.clone(),
                    };
                    self.transmit(&mut conn, &frame).await;
                }
                SessionAction::Ping => {
                    if let Err(e) = conn.send_ping().await {
                        warn!(error = %e, "keepalive ping failed");
                    }
                }
                SessionAction::Command(None) => {
                    conn.close().await;
                    self.set_state(ConnectionState::Disconnected);
                    return Step::Done;
                }
                SessionAction::Command(Some(Command::Send(frame))) => {
                    self.transmit(&mut conn, &frame).await;
                }
                SessionAction::Command(Some(Command::Disconnect)) => {
                    info!("disconnecting");
                    conn.close().await;
                    self.set_state(ConnectionState::Disconnected);
                    return Step::Idle;
                }
                SessionAction::Inbound(TransportEvent::Text(text)) => {
                    // Hooks run synchronously here and can only reach the
                    // connection again through the command channel, so a
                    // handler cannot re-enter the state machine mid-step.
                    self.dispatcher.on_frame(&text);
                }
                SessionAction::Inbound(TransportEvent::Error(e)) => {
                    // The close that follows drives recovery; acting on the
                    // error here would schedule a second reconnect.
                    warn!(error = %e, "transport error");
                }
                SessionAction::Inbound(TransportEvent::Closed { clean: true }) => {
                    info!("connection closed");
                    self.set_state(ConnectionState::Disconnected);
                    return Step::Idle;
                }
                SessionAction::Inbound(TransportEvent::Closed { clean: false }) => {
                    warn!("connection lost");
                    self.set_state(ConnectionState::Disconnected);
                    return self.schedule_or_give_up();
                }
            }
        }
    }

    async fn transmit(&self, conn: &mut F::Transport, frame: &ClientFrame) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to serialize frame");
                return;
            }
        };
        if let Err(e) = conn.send_text(text).await {
            warn!(error = %e, "send failed");
        }
    }
}
