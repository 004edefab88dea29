//! Tails a channel's chat.
//!
//! ```text
//! MIXER_CHAT_URL=ws://chat.example/ws MIXER_CHANNEL=42 cargo run -p chat-tail
//! ```
//!
//! Set `MIXER_USERNAME` / `MIXER_PASSWORD` (and `MIXER_CODE` for accounts
//! with two-factor) to sign in first; `MIXER_API` overrides the REST base
//! URL. Logging follows `RUST_LOG`.

use std::env;

use mixer::prelude::*;
use tracing_subscriber::EnvFilter;

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::Message { message } => format!("<{}> {}", message.user_name, message.text()),
        Packet::Messages { messages } => format!("[history: {} messages]", messages.len()),
        Packet::DeleteMessage { id } => format!("[deleted {id}]"),
        Packet::PollStart { question, answers, duration_secs, .. } => {
            format!("[poll {duration_secs}s] {question} ({})", answers.join(" / "))
        }
        Packet::PollEnd { voters, responses } => format!("[poll over, {voters} voters] {responses:?}"),
        Packet::UserJoin { username, .. } => format!("[+] {username}"),
        Packet::UserLeave { username, .. } => format!("[-] {username}"),
        Packet::UserUpdate { username, roles, .. } => format!("[~] {username} {roles:?}"),
        Packet::Unrecognized { raw } => format!("[?] {raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let chat_url = env::var("MIXER_CHAT_URL")?;
    let channel: u64 = env::var("MIXER_CHANNEL")?.parse()?;

    let mut config = HttpConfig::default();
    if let Ok(api) = env::var("MIXER_API") {
        config.base_url = api;
    }
    let session = SessionStateMachine::new(HttpRequester::new(config)?);

    if let (Ok(username), Ok(password)) = (env::var("MIXER_USERNAME"), env::var("MIXER_PASSWORD")) {
        let user = match env::var("MIXER_CODE") {
            Ok(code) => session.authenticate_with_code(&username, &password, &code).await?,
            Err(_) => session.authenticate(&username, &password).await?,
        };
        tracing::info!(user_id = user.id, "signed in as {}", user.username);
    }

    let chat = ChatClient::connect(&[chat_url]).await?;
    chat.join(channel, None).await?;
    chat.send(&Command::history(20)).await?;

    while let Some(packet) = chat.next_packet().await? {
        println!("{}", describe(&packet));
    }

    if session.state().is_authenticated() {
        session.logout().await?;
    }
    Ok(())
}
