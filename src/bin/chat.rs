//! StaySync line chat
//!
//! A minimal terminal client over the marketplace API. Reads settings from
//! the path given as the first argument (default `staysync.json`), the user
//! id from `STAYSYNC_USER` and the bearer token from `STAYSYNC_TOKEN`.
//!
//! Commands: `/list`, `/open <peer>`, `/close`, `/retry <local-id>`,
//! `/quit`. Any other line is sent to the open conversation.

use anyhow::Context;
use staysync::{
    AuthToken, HttpTransport, LoadKind, Session, Settings, SyncEngine, SyncEvent, UserId,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    staysync::init();

    let settings_path = std::env::args().nth(1).unwrap_or_else(|| "staysync.json".to_string());
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path))?;

    let user = std::env::var("STAYSYNC_USER").context("STAYSYNC_USER is not set")?;
    let session = match std::env::var("STAYSYNC_TOKEN") {
        Ok(token) => Session::new(user, AuthToken::new(token)),
        Err(_) => Session::signed_out(user),
    };

    let transport = HttpTransport::from_settings(&settings)?;
    let engine = SyncEngine::new(Arc::new(transport), session, settings.engine_options());

    let mut events = engine.subscribe();
    let printer = engine.clone();
    tokio::spawn(async move {
        let mut shown = 0;
        while let Ok(event) = events.recv().await {
            print_event(&printer, event, &mut shown).await;
        }
    });

    engine.start().await.context("starting sync")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        let mut parts = line.splitn(2, ' ');
        let result = match (parts.next(), parts.next()) {
            (Some("/quit"), _) => break,
            (Some("/list"), _) => {
                for c in engine.conversations().await {
                    println!("{:>3}  {} ({}) {}", c.unread, c.peer_name, c.peer, c.last_message.unwrap_or_default());
                }
                Ok(())
            }
            (Some("/open"), Some(peer)) => engine.open_peer(UserId::new(peer.trim())).await,
            (Some("/close"), _) => {
                engine.close_peer().await;
                Ok(())
            }
            (Some("/retry"), Some(local_id)) => engine.retry_send(local_id.trim()).await.map(|_| ()),
            _ if line.is_empty() => Ok(()),
            _ => {
                engine.set_compose_text(line);
                engine.send(line, None).await.map(|_| ())
            }
        };

        if let Err(e) = result {
            eprintln!("! {}", e);
        }
    }

    engine.stop();
    Ok(())
}

/// Print an engine event; `shown` counts messages already on screen
async fn print_event(engine: &SyncEngine, event: SyncEvent, shown: &mut usize) {
    match event {
        SyncEvent::MessagesLoaded { peer, kind, .. } => {
            if kind == LoadKind::Initial {
                println!("--- conversation with {} ---", peer);
                *shown = 0;
            }
            let messages = engine.messages().await;
            for entry in messages.iter().skip(*shown) {
                let who = if &entry.message.sender == engine.local_user() { "me" } else { peer.as_str() };
                println!("{} {}: {}", entry.status_indicator(), who, entry.message.body);
            }
            *shown = messages.len();
        }
        SyncEvent::ConversationsUpdated { total_unread } if total_unread > 0 => {
            println!("({} unread)", total_unread);
        }
        SyncEvent::SendFailed { local_id, reason, .. } => {
            eprintln!("! send failed ({}), retry with /retry {}", reason, local_id);
        }
        SyncEvent::AuthRequired => {
            eprintln!("! signed out: set STAYSYNC_TOKEN and restart");
        }
        _ => {}
    }
}
