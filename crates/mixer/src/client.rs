//! `ChatClient`: one chat connection plus its codec.
//!
//! Ties the layers together for the chat direction:
//! connection (text frames) → codec (packets) → application.

use mixer_chat::{ChatCodec, Command, Packet, Sendable};
use mixer_transport::{Connection, ConnectionId, WebSocketConnection};
use rand::seq::IndexedRandom;

use crate::MixerError;

/// A chat connection with its own outbound sequence.
///
/// Every `ChatClient` starts a fresh sequence at 0, so ids from one
/// connection never need to be compared with ids from another.
pub struct ChatClient<C: Connection> {
    conn: C,
    codec: ChatCodec,
}

impl ChatClient<WebSocketConnection> {
    /// Connects to one of `endpoints`, picked at random.
    ///
    /// The platform hands out several equivalent chat servers per
    /// channel; spreading clients across them is the caller's job.
    pub async fn connect(endpoints: &[String]) -> Result<Self, MixerError> {
        let endpoint = endpoints
            .choose(&mut rand::rng())
            .ok_or(MixerError::NoEndpoint)?;
        tracing::info!(endpoint = %endpoint, "connecting to chat");
        let conn = WebSocketConnection::connect(endpoint).await?;
        Ok(Self::new(conn))
    }
}

impl<C> ChatClient<C>
where
    C: Connection,
    MixerError: From<C::Error>,
{
    /// Wraps an already open connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            codec: ChatCodec::new(),
        }
    }

    /// Encodes and sends `command`, returning the id it was sent with.
    ///
    /// The server's reply to this command carries the same id.
    pub async fn send<S: Sendable + ?Sized>(&self, command: &S) -> Result<u64, MixerError> {
        let (id, wire) = self.codec.encode_next(command);
        tracing::trace!(conn_id = %self.conn.id(), id, method = command.identifier(), "sending");
        self.conn.send(&wire).await?;
        Ok(id)
    }

    /// Joins a channel's chat, anonymously or with the user id and
    /// `authkey` issued by the REST API.
    pub async fn join(
        &self,
        channel_id: u64,
        credentials: Option<(u64, &str)>,
    ) -> Result<u64, MixerError> {
        self.send(&Command::auth(channel_id, credentials)).await
    }

    /// Waits for the next packet.
    ///
    /// Frames that aren't JSON and known events with missing fields are
    /// logged and skipped. Unknown events are returned as
    /// [`Packet::Unrecognized`]. `Ok(None)` means the server closed the
    /// connection.
    pub async fn next_packet(&self) -> Result<Option<Packet>, MixerError> {
        loop {
            let Some(frame) = self.conn.recv().await? else {
                tracing::info!(conn_id = %self.conn.id(), "chat connection closed");
                return Ok(None);
            };

            match self.codec.decode_str(&frame) {
                Ok(Some(packet)) => {
                    if let Packet::Unrecognized { raw } = &packet {
                        tracing::debug!(conn_id = %self.conn.id(), %raw, "unrecognized chat packet");
                    }
                    return Ok(Some(packet));
                }
                Ok(None) => {
                    tracing::debug!(conn_id = %self.conn.id(), "skipping malformed chat packet");
                }
                Err(e) => {
                    tracing::debug!(conn_id = %self.conn.id(), error = %e, "skipping non-JSON frame");
                }
            }
        }
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), MixerError> {
        self.conn.close().await?;
        Ok(())
    }

    /// The underlying connection's id.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The id the next sent command will carry.
    pub fn next_sequence(&self) -> u64 {
        self.codec.sequence().peek()
    }
}
