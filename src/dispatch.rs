//! Inbound frame dispatch.
//!
//! Text frames are parsed into [`ServerEvent`] and routed through one
//! exhaustive match: delivery acks go to the message lifecycle, everything
//! reaches the injected [`EventHandler`], and the kinds that warrant a user
//! notification additionally fire the [`Notifier`] regardless of whether
//! the handler method is overridden. Malformed frames are dropped with a
//! diagnostic and never surface as errors.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::hooks::{EventHandler, Notifier};
use crate::lifecycle::MessageLifecycle;
use crate::protocol::ServerEvent;

pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<MessageLifecycle>,
}

impl EventDispatcher {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<MessageLifecycle>,
    ) -> Self {
        Self {
            handler,
            notifier,
            lifecycle,
        }
    }

    /// Parses and dispatches one raw text frame.
    pub fn on_frame(&self, text: &str) {
        match ServerEvent::parse(text) {
            Ok(event) => self.dispatch(event),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    pub fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::ChatList { tab_type, payload } => {
                self.handler.on_chat_list(tab_type.as_deref(), &payload);
            }
            ServerEvent::ChatHistory {
                conversation_id,
                payload,
            } => {
                self.handler
                    .on_chat_history(conversation_id.as_deref(), &payload);
            }
            ServerEvent::NewMessage(message) => {
                // The sound fires for counterparty messages even when the
                // handler is a no-op; echoes of our own sends stay silent.
                if !message.from_me {
                    self.notifier.incoming_message(&message);
                }
                self.handler.on_new_message(&message);
            }
            ServerEvent::SendAck(ack) => {
                self.lifecycle.resolve_ack(&ack);
                self.handler.on_send_ack(&ack);
            }
            ServerEvent::TakeResponse {
                conversation_id,
                payload,
            } => {
                self.handler
                    .on_take_response(conversation_id.as_deref(), &payload);
            }
            ServerEvent::EndResponse {
                conversation_id,
                payload,
            } => {
                self.handler
                    .on_end_response(conversation_id.as_deref(), &payload);
            }
            ServerEvent::TakenByOther(update) => self.handler.on_chat_taken(&update),
            ServerEvent::ClosedByOther(update) => self.handler.on_chat_closed(&update),
            ServerEvent::PendingConversation { payload } => {
                self.notifier.pending_conversation();
                self.handler.on_pending_conversation(&payload);
            }
            ServerEvent::Typing(update) => self.handler.on_typing(&update),
            ServerEvent::Unknown { kind, payload } => {
                debug!(kind = %kind, "event kind without a built-in route");
                self.handler.on_unknown(&kind, &payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MessageLifecycle;
    use crate::testing::{
        loose_client, RecordingHandler, RecordingNotifier, RecordingRenderer,
    };
    use crate::upload::MediaUploader;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Fixture {
        dispatcher: EventDispatcher,
        handler: Arc<RecordingHandler>,
        notifier: Arc<RecordingNotifier>,
        renderer: Arc<RecordingRenderer>,
    }

    fn fixture() -> Fixture {
        let (client, _cmd_rx) = loose_client();
        let handler = Arc::new(RecordingHandler::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let lifecycle = Arc::new(MessageLifecycle::new(
            client,
            renderer.clone(),
            notifier.clone(),
            MediaUploader::new("http://127.0.0.1:9".to_string()),
        ));
        let dispatcher = EventDispatcher::new(handler.clone(), notifier.clone(), lifecycle);
        Fixture {
            dispatcher,
            handler,
            notifier,
            renderer,
        }
    }

    #[test]
    fn malformed_frames_are_swallowed() {
        let fx = fixture();
        fx.dispatcher.on_frame("{definitely not json");
        fx.dispatcher.on_frame("42");
        assert!(fx.handler.unknown.lock().unwrap().is_empty());
        assert!(fx.renderer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_kind_reaches_the_passthrough_hook() {
        let fx = fixture();
        fx.dispatcher.on_frame(
            &json!({ "type": "agent_presence_update", "payload": { "online": true } }).to_string(),
        );
        assert_eq!(
            fx.handler.unknown.lock().unwrap().as_slice(),
            &["agent_presence_update".to_string()]
        );
    }

    #[test]
    fn counterparty_message_fires_the_notifier() {
        let fx = fixture();
        fx.dispatcher.on_frame(
            &json!({
                "type": "new_message",
                "conversationId": "42",
                "payload": { "from": "5511999999999", "text": "oi" }
            })
            .to_string(),
        );
        assert_eq!(fx.notifier.incoming.load(Ordering::SeqCst), 1);
        assert_eq!(fx.handler.new_messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn own_echo_stays_silent() {
        let fx = fixture();
        fx.dispatcher.on_frame(
            &json!({
                "type": "new_message",
                "conversationId": "42",
                "payload": { "from": "agent-7", "text": "oi", "fromMe": true }
            })
            .to_string(),
        );
        assert_eq!(fx.notifier.incoming.load(Ordering::SeqCst), 0);
        assert_eq!(fx.handler.new_messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn pending_conversation_fires_the_notifier() {
        let fx = fixture();
        fx.dispatcher
            .on_frame(&json!({ "type": "pending_conversation", "payload": {} }).to_string());
        assert_eq!(fx.notifier.pending_conversations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_ack_reaches_both_lifecycle_and_handler() {
        let fx = fixture();
        fx.dispatcher.on_frame(
            &json!({
                "type": "message_sent_ack",
                "payload": { "id": "m1-0-ab", "success": true }
            })
            .to_string(),
        );
        // Nothing pending under that id, so the lifecycle ignores it, but
        // the handler still sees the ack.
        assert_eq!(fx.handler.acks.lock().unwrap().len(), 1);
        assert!(fx.renderer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn list_response_carries_the_tab() {
        let fx = fixture();
        fx.dispatcher.on_frame(
            &json!({ "type": "chat_list_response", "tabType": "open", "payload": [] }).to_string(),
        );
        assert_eq!(
            fx.handler.chat_lists.lock().unwrap().as_slice(),
            &[Some("open".to_string())]
        );
    }
}
