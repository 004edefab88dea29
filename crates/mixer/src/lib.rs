//! # mixer
//!
//! Client SDK for the mixer live-streaming platform.
//!
//! - [`ChatClient`] speaks the chat protocol over a [`Connection`]
//!   (WebSocket by default): typed [`Packet`]s in, [`Command`]s out.
//! - [`SessionStateMachine`] signs a user in and out over a
//!   [`Requester`] (HTTP by default) and reports failures as
//!   [`AuthError`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mixer::prelude::*;
//!
//! # async fn run() -> Result<(), MixerError> {
//! let requester = HttpRequester::new(HttpConfig::default())?;
//! let session = Arc::new(SessionStateMachine::new(requester));
//! let user = session.authenticate("jack", "hunter22").await?;
//!
//! let chat = ChatClient::connect(&["ws://chat.example/ws".to_string()]).await?;
//! chat.join(42, None).await?;
//! while let Some(packet) = chat.next_packet().await? {
//!     println!("{} got {:?}", user.username, packet);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::ChatClient;
pub use error::MixerError;

pub use mixer_chat::{ChatCodec, ChatMessage, Command, Packet, Sendable};
pub use mixer_session::{AuthError, SessionConfig, SessionState, SessionStateMachine, User};
pub use mixer_transport::{Connection, HttpConfig, HttpRequester, Requester};

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{ChatClient, MixerError};
    pub use mixer_chat::{ChatMessage, Command, Packet, Sendable};
    pub use mixer_session::{
        AuthError, CredentialStore, MemoryCredentialStore, SessionConfig, SessionState,
        SessionStateMachine, User,
    };
    pub use mixer_transport::{Connection, HttpConfig, HttpRequester, Requester};
}
