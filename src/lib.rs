#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]

//! opchat library — the synchronization core of an operator live-chat client.
//!
//! One persistent WebSocket session carries all traffic between an agent and
//! the chat server. The library keeps that session alive, keeps outbound
//! traffic ordered across drops, and renders locally originated messages
//! optimistically until the server settles them:
//!
//! - `connection` — state machine, backoff reconnect, outbound buffer,
//!   transport seam
//! - `dispatch` — typed inbound event routing to injected hooks
//! - `requests` — validated constructors for outbound frames
//! - `lifecycle` — optimistic sends, local ids, ack reconciliation
//! - `protocol` — serde wire types
//! - `upload` — multipart media upload preceding media sends
//! - `config` — TOML + env-var configuration
//! - `hooks` — renderer / notifier / event-handler collaborator traits

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod hooks;
pub mod lifecycle;
pub mod protocol;
pub mod requests;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use connection::transport::{build_ws_url, WsTransportFactory};
pub use connection::{
    AgentIdentity, ChatClient, ConnectionManager, ConnectionPolicy, ConnectionState,
};
pub use dispatch::EventDispatcher;
pub use hooks::{EventHandler, Notifier, Renderer};
pub use lifecycle::{MessageLifecycle, PendingLocalMessage, SendMessageError};
pub use protocol::{ClientFrame, ServerEvent};
pub use upload::{MediaUpload, MediaUploader};
