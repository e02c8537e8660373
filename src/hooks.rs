//! Collaborator interfaces injected into the synchronization core.
//!
//! The rendering surface, the notification sink and the per-event handler are
//! all external subsystems; the core talks to them through these traits so a
//! headless binary and the test suite can substitute their own.
//!
//! All hooks are synchronous and are invoked from the connection task. A hook
//! that wants to talk back to the connection must go through a
//! [`ChatClient`](crate::connection::ChatClient) handle; it cannot re-enter
//! the state machine directly.

use serde_json::Value;
use tracing::info;

use crate::lifecycle::PendingLocalMessage;
use crate::protocol::{ChatUpdate, IncomingMessage, SendAck, TypingUpdate};

/// Message-list rendering surface. Required by the optimistic send path:
/// every locally originated message is shown pending before transmission and
/// resolved exactly once afterwards.
pub trait Renderer: Send + Sync {
    fn show_pending(&self, message: &PendingLocalMessage);
    /// Resolve a pending message as delivered, adopting the server-assigned
    /// id and timestamp when present.
    fn mark_sent(&self, local_id: &str, server_id: Option<&str>, timestamp: Option<u64>);
    fn mark_failed(&self, local_id: &str);
    /// Release any preview resource created for a media message. Called on
    /// every terminal outcome of a media send.
    fn release_preview(&self, local_id: &str);
}

/// User-facing notification sink (sounds, toasts). Methods default to no-ops.
pub trait Notifier: Send + Sync {
    fn incoming_message(&self, _message: &IncomingMessage) {}
    fn pending_conversation(&self) {}
    fn reconnect_exhausted(&self) {}
    fn send_failed(&self, _local_id: &str, _reason: &str) {}
}

/// Per-event-kind application hooks. One method per known server event kind
/// plus a passthrough for kinds this client does not recognize. Every method
/// defaults to a no-op, so implementors override only what they consume.
pub trait EventHandler: Send + Sync {
    fn on_chat_list(&self, _tab_type: Option<&str>, _payload: &Value) {}
    fn on_chat_history(&self, _conversation_id: Option<&str>, _payload: &Value) {}
    fn on_new_message(&self, _message: &IncomingMessage) {}
    fn on_send_ack(&self, _ack: &SendAck) {}
    fn on_take_response(&self, _conversation_id: Option<&str>, _payload: &Value) {}
    fn on_end_response(&self, _conversation_id: Option<&str>, _payload: &Value) {}
    fn on_chat_taken(&self, _update: &ChatUpdate) {}
    fn on_chat_closed(&self, _update: &ChatUpdate) {}
    fn on_pending_conversation(&self, _payload: &Value) {}
    fn on_typing(&self, _update: &TypingUpdate) {}
    fn on_unknown(&self, _kind: &str, _payload: &Value) {}
}

/// Log-only renderer for the headless binary.
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn show_pending(&self, message: &PendingLocalMessage) {
        info!(id = %message.local_id, conversation = %message.conversation_id, "message pending");
    }

    fn mark_sent(&self, local_id: &str, server_id: Option<&str>, _timestamp: Option<u64>) {
        info!(id = %local_id, server_id = server_id.unwrap_or("-"), "message sent");
    }

    fn mark_failed(&self, local_id: &str) {
        info!(id = %local_id, "message failed");
    }

    fn release_preview(&self, local_id: &str) {
        info!(id = %local_id, "preview released");
    }
}

/// Log-only notification sink for the headless binary.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn incoming_message(&self, message: &IncomingMessage) {
        info!(from = %message.from, "incoming message");
    }

    fn pending_conversation(&self) {
        info!("pending conversation waiting");
    }

    fn reconnect_exhausted(&self) {
        info!("cannot reconnect to server");
    }

    fn send_failed(&self, local_id: &str, reason: &str) {
        info!(id = %local_id, reason, "send failed");
    }
}

/// Log-only event handler for the headless binary.
pub struct LogEventHandler;

impl EventHandler for LogEventHandler {
    fn on_chat_list(&self, tab_type: Option<&str>, payload: &Value) {
        let count = payload.as_array().map_or(0, Vec::len);
        info!(tab = tab_type.unwrap_or("-"), count, "chat list");
    }

    fn on_chat_history(&self, conversation_id: Option<&str>, payload: &Value) {
        let count = payload.as_array().map_or(0, Vec::len);
        info!(conversation = conversation_id.unwrap_or("-"), count, "chat history");
    }

    fn on_new_message(&self, message: &IncomingMessage) {
        info!(
            conversation = message.conversation_id.as_deref().unwrap_or("-"),
            from = %message.from,
            "new message"
        );
    }

    fn on_chat_taken(&self, update: &ChatUpdate) {
        info!(
            conversation = update.conversation_id.as_deref().unwrap_or("-"),
            agent = update.agent.as_deref().unwrap_or("-"),
            "chat taken by another agent"
        );
    }

    fn on_chat_closed(&self, update: &ChatUpdate) {
        info!(
            conversation = update.conversation_id.as_deref().unwrap_or("-"),
            "chat closed"
        );
    }
}
