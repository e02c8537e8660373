//! Wire protocol for the operator chat socket.
//!
//! Every frame is a JSON text message with a snake_case `type` tag. Client
//! frames put request parameters in camelCase fields next to the tag; server
//! frames carry a `payload` object plus, for some kinds, a correlating
//! top-level field (`conversationId`, `tabType`).
//!
//! ## Client → server
//!
//! | Kind | Fields |
//! |------|--------|
//! | `request_chat_list` | `tabType` |
//! | `request_chat_history` | `conversationId`, `limit`, `offset` |
//! | `send_chat_message` | `payload` (see [`MessagePayload`]) |
//! | `take_chat` | `conversationId` |
//! | `end_chat` | `conversationId` |
//! | `transfer_chat` | `conversationId`, `targetAgent` |
//! | `mark_read` | `conversationId` |
//! | `typing` | `conversationId`, `to` |
//!
//! ## Server → client
//!
//! | Kind | Payload |
//! |------|---------|
//! | `chat_list_response` | conversation summaries for one tab |
//! | `chat_history_response` | message page for one conversation |
//! | `new_message` | [`IncomingMessage`] |
//! | `message_sent_ack` | [`SendAck`] |
//! | `take_chat_response` / `end_chat_response` | operation result |
//! | `chat_taken_update` / `chat_closed_update` | [`ChatUpdate`] |
//! | `pending_conversation` | unassigned-conversation announcement |
//! | `client_typing` | [`TypingUpdate`] |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("bad `{kind}` payload: {source}")]
    BadPayload {
        kind: String,
        source: serde_json::Error,
    },
}

/// Media already persisted server-side, referenced by durable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    pub mimetype: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Body of `send_chat_message`. `id` is the locally generated message id;
/// the server echoes it back in the matching `message_sent_ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub conversation_id: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    pub id: String,
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    RequestChatList {
        tab_type: String,
    },
    RequestChatHistory {
        conversation_id: String,
        limit: u32,
        offset: u32,
    },
    SendChatMessage {
        payload: MessagePayload,
    },
    TakeChat {
        conversation_id: String,
    },
    EndChat {
        conversation_id: String,
    },
    TransferChat {
        conversation_id: String,
        target_agent: String,
    },
    MarkRead {
        conversation_id: String,
    },
    Typing {
        conversation_id: String,
        to: String,
    },
}

/// Raw envelope of a server frame, before the kind-specific payload is typed.
#[derive(Debug, Deserialize)]
struct RawServerFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    #[serde(rename = "tabType")]
    tab_type: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// A message authored by the remote counterparty (or echoed for the agent's
/// own sends from another device, flagged by `from_me`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Delivery acknowledgement for one locally originated message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    /// The local id the client embedded in the outbound frame.
    pub id: String,
    pub success: bool,
    /// Server-assigned durable message id, present on success.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Another agent took or closed a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdate {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default = "default_true")]
    pub typing: bool,
}

fn default_true() -> bool {
    true
}

/// Server → client events, one variant per known frame kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ChatList {
        tab_type: Option<String>,
        payload: Value,
    },
    ChatHistory {
        conversation_id: Option<String>,
        payload: Value,
    },
    NewMessage(IncomingMessage),
    SendAck(SendAck),
    TakeResponse {
        conversation_id: Option<String>,
        payload: Value,
    },
    EndResponse {
        conversation_id: Option<String>,
        payload: Value,
    },
    TakenByOther(ChatUpdate),
    ClosedByOther(ChatUpdate),
    PendingConversation {
        payload: Value,
    },
    Typing(TypingUpdate),
    /// A kind this client does not know. The raw tag is preserved unchanged.
    Unknown {
        kind: String,
        payload: Value,
    },
}

fn typed<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::BadPayload {
        kind: kind.to_string(),
        source,
    })
}

impl ServerEvent {
    /// Parses one inbound text frame into a typed event.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let RawServerFrame {
            kind,
            conversation_id,
            tab_type,
            payload,
        } = serde_json::from_str(text)?;

        Ok(match kind.as_str() {
            "chat_list_response" => Self::ChatList { tab_type, payload },
            "chat_history_response" => Self::ChatHistory {
                conversation_id,
                payload,
            },
            "new_message" => {
                let mut msg: IncomingMessage = typed(&kind, payload)?;
                if msg.conversation_id.is_none() {
                    msg.conversation_id = conversation_id;
                }
                Self::NewMessage(msg)
            }
            "message_sent_ack" => Self::SendAck(typed(&kind, payload)?),
            "take_chat_response" => Self::TakeResponse {
                conversation_id,
                payload,
            },
            "end_chat_response" => Self::EndResponse {
                conversation_id,
                payload,
            },
            "chat_taken_update" => {
                let mut upd: ChatUpdate = typed(&kind, payload)?;
                if upd.conversation_id.is_none() {
                    upd.conversation_id = conversation_id;
                }
                Self::TakenByOther(upd)
            }
            "chat_closed_update" => {
                let mut upd: ChatUpdate = typed(&kind, payload)?;
                if upd.conversation_id.is_none() {
                    upd.conversation_id = conversation_id;
                }
                Self::ClosedByOther(upd)
            }
            "pending_conversation" => Self::PendingConversation { payload },
            "client_typing" => {
                let mut upd: TypingUpdate = typed(&kind, payload)?;
                if upd.conversation_id.is_none() {
                    upd.conversation_id = conversation_id;
                }
                Self::Typing(upd)
            }
            _ => Self::Unknown { kind, payload },
        })
    }
}
