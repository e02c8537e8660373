//! Optimistic message lifecycle.
//!
//! A locally originated message is rendered `sending` before anything
//! reaches the wire, transmitted with an embedded local id, and resolved
//! exactly once when the server acknowledges that id. Media goes through
//! the HTTP uploader first; only a successful upload produces a frame.
//!
//! There is no client-side send timeout: a `sending` entry persists until
//! an ack or an upload failure resolves it. Embedders can inspect
//! [`MessageLifecycle::pending_count`] to build retry affordances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::connection::{ChatClient, ConnectionClosed};
use crate::hooks::{Notifier, Renderer};
use crate::protocol::{MediaRef, MessagePayload, SendAck};
use crate::requests::{self, RequestError};
use crate::upload::{MediaUpload, MediaUploader, UploadError};

#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error(transparent)]
    Invalid(#[from] RequestError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Closed(#[from] ConnectionClosed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Media {
        mimetype: String,
        filename: String,
        caption: Option<String>,
    },
}

/// A locally originated message as handed to the renderer. Tracked entries
/// are always `Sending`; resolution goes straight to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLocalMessage {
    pub local_id: String,
    pub conversation_id: String,
    pub to: String,
    pub content: MessageContent,
    pub created_at_ms: u64,
    pub status: DeliveryStatus,
}

impl PendingLocalMessage {
    fn is_media(&self) -> bool {
        matches!(self.content, MessageContent::Media { .. })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Process-wide unique local ids: millisecond prefix, monotonic counter,
/// random suffix. The counter alone guarantees uniqueness even if the
/// clock jumps.
pub struct LocalIdGenerator {
    counter: AtomicU64,
}

impl LocalIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let noise: u32 = rand::random();
        format!("m{}-{seq}-{noise:08x}", now_ms())
    }
}

impl Default for LocalIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MessageLifecycle {
    client: ChatClient,
    renderer: Arc<dyn Renderer>,
    notifier: Arc<dyn Notifier>,
    uploader: MediaUploader,
    pending: Mutex<HashMap<String, PendingLocalMessage>>,
    ids: LocalIdGenerator,
}

impl MessageLifecycle {
    pub fn new(
        client: ChatClient,
        renderer: Arc<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
        uploader: MediaUploader,
    ) -> Self {
        Self {
            client,
            renderer,
            notifier,
            uploader,
            pending: Mutex::new(HashMap::new()),
            ids: LocalIdGenerator::new(),
        }
    }

    /// Sends a text message optimistically. Returns the local id the entry
    /// is tracked under. A buffered frame counts as in-flight, not failed.
    pub fn send_text(
        &self,
        conversation_id: &str,
        to: &str,
        text: &str,
    ) -> Result<String, SendMessageError> {
        requests::validate_target(conversation_id, to)?;
        if text.trim().is_empty() {
            return Err(RequestError::EmptyMessage.into());
        }

        let local_id = self.track(
            conversation_id,
            to,
            MessageContent::Text(text.to_string()),
        );
        let frame = requests::send_chat_message(MessagePayload {
            conversation_id: conversation_id.to_string(),
            to: to.to_string(),
            text: Some(text.to_string()),
            media: None,
            id: local_id.clone(),
        })?;
        if self.client.send(frame).is_err() {
            self.resolve_failed(&local_id, "connection task unavailable");
            return Err(ConnectionClosed.into());
        }
        Ok(local_id)
    }

    /// Sends a media message: render pending, upload, then transmit the
    /// frame carrying the durable URL. An upload failure resolves the entry
    /// failed and transmits nothing.
    pub async fn send_media(
        &self,
        conversation_id: &str,
        to: &str,
        media: MediaUpload,
    ) -> Result<String, SendMessageError> {
        requests::validate_target(conversation_id, to)?;

        let local_id = self.track(
            conversation_id,
            to,
            MessageContent::Media {
                mimetype: media.mimetype.clone(),
                filename: media.filename.clone(),
                caption: media.caption.clone(),
            },
        );

        let stored = match self.uploader.upload(&media, to).await {
            Ok(stored) => stored,
            Err(e) => {
                self.resolve_failed(&local_id, &e.to_string());
                return Err(e.into());
            }
        };

        let frame = requests::send_chat_message(MessagePayload {
            conversation_id: conversation_id.to_string(),
            to: to.to_string(),
            text: None,
            media: Some(MediaRef {
                url: stored.url,
                mimetype: media.mimetype,
                filename: media.filename,
                caption: media.caption,
            }),
            id: local_id.clone(),
        })?;
        if self.client.send(frame).is_err() {
            self.resolve_failed(&local_id, "connection task unavailable");
            return Err(ConnectionClosed.into());
        }
        Ok(local_id)
    }

    fn track(&self, conversation_id: &str, to: &str, content: MessageContent) -> String {
        let local_id = self.ids.next_id();
        let message = PendingLocalMessage {
            local_id: local_id.clone(),
            conversation_id: conversation_id.to_string(),
            to: to.to_string(),
            content,
            created_at_ms: now_ms(),
            status: DeliveryStatus::Sending,
        };
        self.renderer.show_pending(&message);
        self.pending
            .lock()
            .unwrap()
            .insert(local_id.clone(), message);
        local_id
    }

    /// Reconciles one delivery acknowledgement. Removing the entry first
    /// makes resolution exactly-once; a second ack for the same id lands in
    /// the unknown-id branch.
    pub fn resolve_ack(&self, ack: &SendAck) {
        let entry = self.pending.lock().unwrap().remove(&ack.id);
        let Some(entry) = entry else {
            warn!(id = %ack.id, "ack for unknown local message id");
            return;
        };
        if entry.is_media() {
            self.renderer.release_preview(&entry.local_id);
        }
        if ack.success {
            debug!(id = %ack.id, server_id = ack.message_id.as_deref().unwrap_or("-"), "message delivered");
            self.renderer
                .mark_sent(&entry.local_id, ack.message_id.as_deref(), ack.timestamp);
        } else {
            let reason = ack.error.as_deref().unwrap_or("delivery refused");
            warn!(id = %ack.id, reason, "message delivery failed");
            self.renderer.mark_failed(&entry.local_id);
            self.notifier.send_failed(&entry.local_id, reason);
        }
    }

    fn resolve_failed(&self, local_id: &str, reason: &str) {
        let entry = self.pending.lock().unwrap().remove(local_id);
        let Some(entry) = entry else {
            return;
        };
        if entry.is_media() {
            self.renderer.release_preview(&entry.local_id);
        }
        warn!(id = %local_id, reason, "message failed before delivery");
        self.renderer.mark_failed(&entry.local_id);
        self.notifier.send_failed(&entry.local_id, reason);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }
}
