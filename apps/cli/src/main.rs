use anyhow::Result;
use clap::Parser;
use client_core::{ClientConfig, ClientEvent, MessagingClient, Session};
use shared::domain::UserId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Messaging gateway base url; overrides client.toml and the environment.
    #[arg(long)]
    gateway_url: Option<String>,
    /// Persistence service base url; overrides client.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    token: String,
    /// Open a chat with this user right after connecting.
    #[arg(long)]
    peer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = config::load_settings();

    let config = ClientConfig {
        gateway_url: args.gateway_url.unwrap_or(settings.gateway_url),
        api_url: args.api_url.unwrap_or(settings.api_url),
    };
    let session = Session {
        user_id: UserId::from(args.user_id.as_str()),
        auth_token: args.token,
    };
    let client = MessagingClient::new(&config, session);

    let mut events = client.subscribe_events();
    client.connect().await?;
    println!("Connected as {}", args.user_id);

    if let Some(peer) = args.peer {
        let room = client.open_chat(UserId::from(peer.as_str())).await?;
        println!("Opened chat {room}");
    }

    println!("Type a message, /open <user>, /read-all, or /quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => render_event(&client, event).await,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&client, line.trim()).await {
                    break;
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

async fn render_event(client: &MessagingClient, event: ClientEvent) {
    match event {
        ClientEvent::ConnectionChanged(state) => println!("* connection: {state:?}"),
        ClientEvent::RoomLogChanged { room_id } => {
            if let Some(message) = client.room_log(&room_id).await.last() {
                println!("[{}] {}: {}", room_id, message.sender_id, message.content);
            }
        }
        ClientEvent::NotificationsChanged => {
            let unread = client
                .notifications()
                .await
                .iter()
                .filter(|n| !n.read)
                .count();
            println!("* notifications: {unread} unread");
        }
        ClientEvent::Typing {
            user_id, is_typing, ..
        } => {
            if is_typing {
                println!("* {user_id} is typing...");
            }
        }
    }
}

/// Returns false when the session should end.
async fn handle_line(client: &MessagingClient, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/read-all" => client.mark_all_as_read().await,
        _ => {
            let result = if let Some(peer) = line.strip_prefix("/open ") {
                client
                    .open_chat(UserId::from(peer.trim()))
                    .await
                    .map(|room| println!("Opened chat {room}"))
            } else {
                client.send_message(line).await
            };
            if let Err(err) = result {
                warn!(%err, "command failed");
            }
        }
    }
    true
}
