//! Outbound chat commands.
//!
//! The chat server exposes a small RPC surface: each call is a method name
//! plus positional arguments. A [`Sendable`] is anything that can describe
//! such a call; [`Command`] is the ready-made implementation, with
//! constructors for the methods the platform understands.

use serde_json::{Value, json};

/// Something that can be encoded as a chat method call.
pub trait Sendable {
    /// The method name, e.g. `"msg"`.
    fn identifier(&self) -> &str;

    /// Positional arguments, in call order.
    fn arguments(&self) -> Vec<Value>;
}

/// A chat method call.
///
/// Built once per outbound action and handed to the encoder; nothing holds
/// on to it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub identifier: String,
    pub arguments: Vec<Value>,
}

impl Command {
    /// A call to an arbitrary method.
    pub fn new(identifier: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            identifier: identifier.into(),
            arguments,
        }
    }

    /// Joins a channel's chat.
    ///
    /// With `credentials = None` the connection is anonymous (read only).
    /// Otherwise it carries the user id and the `authkey` the REST API
    /// issued for this chat.
    pub fn auth(channel_id: u64, credentials: Option<(u64, &str)>) -> Self {
        let arguments = match credentials {
            Some((user_id, authkey)) => {
                vec![json!(channel_id), json!(user_id), json!(authkey)]
            }
            None => vec![json!(channel_id)],
        };
        Self::new("auth", arguments)
    }

    /// Sends a message to the channel.
    pub fn msg(text: &str) -> Self {
        Self::new("msg", vec![json!(text)])
    }

    /// Sends a message only `username` can see.
    pub fn whisper(username: &str, text: &str) -> Self {
        Self::new("whisper", vec![json!(username), json!(text)])
    }

    /// Asks for the last `count` messages. Answered by a `reply`.
    pub fn history(count: u32) -> Self {
        Self::new("history", vec![json!(count)])
    }

    /// Starts a poll lasting `duration_secs`.
    pub fn vote_start(question: &str, answers: &[&str], duration_secs: u64) -> Self {
        Self::new(
            "vote:start",
            vec![json!(question), json!(answers), json!(duration_secs)],
        )
    }

    /// Votes for the answer at `index` in the running poll.
    pub fn vote_choose(index: usize) -> Self {
        Self::new("vote:choose", vec![json!(index)])
    }

    /// Times `username` out. `duration` uses the server's notation,
    /// e.g. `"30s"` or `"5m"`.
    pub fn timeout(username: &str, duration: &str) -> Self {
        Self::new("timeout", vec![json!(username), json!(duration)])
    }

    /// Deletes every message `username` has sent.
    pub fn purge(username: &str) -> Self {
        Self::new("purge", vec![json!(username)])
    }

    /// Deletes a single message.
    pub fn delete_message(id: &str) -> Self {
        Self::new("deleteMessage", vec![json!(id)])
    }

    /// Keep-alive.
    pub fn ping() -> Self {
        Self::new("ping", Vec::new())
    }
}

impl Sendable for Command {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn arguments(&self) -> Vec<Value> {
        self.arguments.clone()
    }
}
