//! walkie: terminal chat client.
//!
//! Lines typed on stdin are sent as messages. Commands:
//! `/talk` and `/over` hold and release the voice channel, `/memo <secs>`
//! sends a recorded clip, `/name <name>` renames, `/who` lists who is
//! online, `/quit` exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use walkie_client::devices::{LevelMeter, ToneCapture};
use walkie_client::{
    BackgroundSync, Capabilities, ChatClient, ConnectionConfig, ConnectionHandle, FileStore,
    MemoryStore, Outbox, OutboxStore, Probe, PttStart, Update,
};
use walkie_common::{pcm_from_f32, MessageBody};
use walkie_config::{LogLevel, WalkieConfig};

#[derive(Parser)]
#[command(name = "walkie", about = "LAN chat with push-to-talk")]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket URL of the server.
    #[arg(long)]
    server: Option<String>,

    /// HTTP fallback URL of the server.
    #[arg(long)]
    http: Option<String>,

    /// Display name.
    #[arg(short, long)]
    name: Option<String>,

    /// Use a generated test tone as the microphone.
    #[arg(long)]
    tone: bool,

    /// Log level when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        walkie_config::load_config(args.config.as_deref()).context("failed to load config")?;
    if let Some(url) = args.server {
        config.client.server_url = url;
    }
    if let Some(url) = args.http {
        config.client.http_url = url;
    }
    if let Some(name) = args.name {
        config.client.display_name = Some(name);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    walkie_config::validation::validate(&config).context("invalid settings")?;

    let level = config.logging.level.as_str();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("walkie={level},walkie_client={level}").into()),
        )
        .init();

    let name = display_name(&config);
    let store = open_store(&config).await;
    let capabilities = Capabilities::negotiate(&Probe::detect(
        args.tone,
        true,
        config.client.background_sync,
        &config.client.http_url,
    ));

    let voice = &config.voice;
    let tone = ToneCapture::new(voice.sample_rate, voice.frame_samples as usize);
    let memo_source = ToneCapture::new(voice.sample_rate, voice.frame_samples as usize);

    let (conn, mut events) = ConnectionHandle::connect(ConnectionConfig::from(&config.client));
    let mut client = ChatClient::new(
        &name,
        Arc::new(conn.clone()),
        Outbox::new(Arc::clone(&store)),
        capabilities,
        Some(Box::new(tone)),
        Some(Box::new(LevelMeter)),
        Duration::from_millis(voice.busy_indicator_ms),
    );

    if capabilities.background_sync {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        BackgroundSync::new(&config.client.http_url, Arc::clone(&store))?.spawn(trigger_rx);
        client = client.with_sync_trigger(trigger_tx);
    }

    println!("walkie: chatting as {name} via {}", config.client.server_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                if !run_line(&mut client, &memo_source, line.trim()).await {
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                for update in client.handle(event).await {
                    render(&update, client.capabilities());
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if client.is_transmitting() {
        let _ = client.release_to_talk().await;
    }
    conn.close().await;
    Ok(())
}

/// Handle one input line. Returns `false` to quit.
async fn run_line(client: &mut ChatClient, memo_source: &ToneCapture, line: &str) -> bool {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let result = match cmd {
        "" => Ok(()),
        "/quit" => return false,
        "/talk" => match client.press_to_talk().await {
            Ok(PttStart::Started) => {
                println!("* talking, /over to release");
                Ok(())
            }
            Ok(PttStart::Ignored) => {
                println!("* channel in use, try again");
                Ok(())
            }
            Err(e) => Err(e),
        },
        "/over" => client.release_to_talk().await.map(|_| ()),
        "/memo" => {
            let secs: f32 = rest.trim().parse().unwrap_or(1.0);
            let clip = memo_source.clip(secs);
            let pcm = pcm_from_f32(&clip);
            client
                .send_audio(&pcm, secs as f64)
                .await
                .map(|u| u.iter().for_each(|u| render(u, client.capabilities())))
        }
        "/name" if !rest.trim().is_empty() => client.rename(rest.trim()).await,
        "/who" => {
            let view = client.view();
            println!("* {} online: {}", view.online_count(), view.roster().join(", "));
            Ok(())
        }
        _ => client
            .send_text(line)
            .await
            .map(|u| u.iter().for_each(|u| render(u, client.capabilities()))),
    };

    if let Err(e) = result {
        println!("! {e}");
    }
    true
}

fn render(update: &Update, caps: Capabilities) {
    match update {
        Update::Connected { replayed } if *replayed > 0 => {
            println!("* connected, sent {replayed} queued message(s)")
        }
        Update::Connected { .. } => println!("* connected"),
        Update::Disconnected => println!("* disconnected, messages will be queued"),
        Update::Message { message, own } => {
            let body = match &message.body {
                MessageBody::Text { text } => text.clone(),
                MessageBody::Audio { duration, .. } => format!("[voice memo {duration:.1}s]"),
            };
            let bell = if caps.notifications && !own { "\x07" } else { "" };
            println!("{bell}<{}> {body}", message.user);
        }
        Update::Pending(message) => {
            println!("<{}> {} (queued)", message.user, message.text().unwrap_or("[voice memo]"))
        }
        Update::Presence { online, .. } => println!("* {online} online"),
        Update::Typing(names) if !names.is_empty() => println!("* {} typing", names.join(", ")),
        Update::Typing(_) => {}
        Update::Speaker(Some(name)) => println!("* {name} is talking"),
        Update::Speaker(None) => {}
        Update::ChannelBusy(speaker) => println!("* {speaker} is talking, try again shortly"),
        Update::Error(msg) => println!("! {msg}"),
    }
}

fn display_name(config: &WalkieConfig) -> String {
    config
        .client
        .display_name
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("guest-{}", &walkie_common::new_id()[..4]))
}

async fn open_store(config: &WalkieConfig) -> Arc<dyn OutboxStore> {
    let path = match &config.client.outbox_path {
        Some(path) => Ok(path.clone()),
        None => walkie_config::default_outbox_path(),
    };
    let opened = match path {
        Ok(path) => FileStore::open(path).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "Outbox not persistent, using memory");
            Arc::new(MemoryStore::new())
        }
    }
}
