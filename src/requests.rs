//! Typed constructors for outbound frames.
//!
//! Every constructor validates its required identifiers before a frame
//! exists, so a caller mistake fails synchronously and nothing reaches the
//! wire.

use thiserror::Error;

use crate::protocol::{ClientFrame, MessagePayload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("conversation id must not be empty")]
    MissingConversationId,
    #[error("recipient address must not be empty")]
    MissingRecipient,
    #[error("tab type must not be empty")]
    MissingTabType,
    #[error("transfer target must not be empty")]
    MissingTarget,
    #[error("message has no text and no media")]
    EmptyMessage,
}

fn require(value: &str, missing: RequestError) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        Err(missing)
    } else {
        Ok(())
    }
}

pub(crate) fn validate_target(conversation_id: &str, to: &str) -> Result<(), RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    require(to, RequestError::MissingRecipient)
}

pub fn request_chat_list(tab_type: &str) -> Result<ClientFrame, RequestError> {
    require(tab_type, RequestError::MissingTabType)?;
    Ok(ClientFrame::RequestChatList {
        tab_type: tab_type.to_string(),
    })
}

pub fn request_chat_history(
    conversation_id: &str,
    limit: u32,
    offset: u32,
) -> Result<ClientFrame, RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    Ok(ClientFrame::RequestChatHistory {
        conversation_id: conversation_id.to_string(),
        limit,
        offset,
    })
}

/// Builds the send frame for an already-validated payload. The payload must
/// name a conversation, a recipient and at least one of text or media.
pub fn send_chat_message(payload: MessagePayload) -> Result<ClientFrame, RequestError> {
    validate_target(&payload.conversation_id, &payload.to)?;
    let has_text = payload.text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_text && payload.media.is_none() {
        return Err(RequestError::EmptyMessage);
    }
    Ok(ClientFrame::SendChatMessage { payload })
}

pub fn take_chat(conversation_id: &str) -> Result<ClientFrame, RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    Ok(ClientFrame::TakeChat {
        conversation_id: conversation_id.to_string(),
    })
}

pub fn end_chat(conversation_id: &str) -> Result<ClientFrame, RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    Ok(ClientFrame::EndChat {
        conversation_id: conversation_id.to_string(),
    })
}

pub fn transfer_chat(conversation_id: &str, target_agent: &str) -> Result<ClientFrame, RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    require(target_agent, RequestError::MissingTarget)?;
    Ok(ClientFrame::TransferChat {
        conversation_id: conversation_id.to_string(),
        target_agent: target_agent.to_string(),
    })
}

pub fn mark_read(conversation_id: &str) -> Result<ClientFrame, RequestError> {
    require(conversation_id, RequestError::MissingConversationId)?;
    Ok(ClientFrame::MarkRead {
        conversation_id: conversation_id.to_string(),
    })
}

pub fn typing(conversation_id: &str, to: &str) -> Result<ClientFrame, RequestError> {
    validate_target(conversation_id, to)?;
    Ok(ClientFrame::Typing {
        conversation_id: conversation_id.to_string(),
        to: to.to_string(),
    })
}
