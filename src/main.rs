use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use room_chat::common::{RoomId, SessionEvent};
use room_chat::config::{self, ChatConfig};
use room_chat::session::{SessionHandle, spawn_session};

#[derive(Parser)]
#[command(
    name = "room_chat",
    version,
    about = "Room-based chat session with simulated participants"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Stop the session after this many seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    run_secs: u64,
    /// Seed for the activity synthesizer (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
    /// Room to focus once connected
    #[arg(long)]
    room: Option<String>,
    /// Message to post once connected; may be repeated
    #[arg(long = "send", value_name = "TEXT")]
    send: Vec<String>,
    /// Do not start the activity synthesizer
    #[arg(long)]
    no_synth: bool,
    /// Write the effective config back to --config and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut chat_config = config::load_config(&cli.config);
    if let Some(seed) = cli.seed {
        chat_config.synth.seed = Some(seed);
    }

    if cli.write_config {
        config::save_config(&cli.config, &chat_config)?;
        log::info!("Config written to {}", cli.config);
        return Ok(());
    }

    run_session(&cli, &chat_config).await
}

async fn run_session(cli: &Cli, chat_config: &ChatConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (handle, mut events) = spawn_session(chat_config)?;
    let deadline = tokio::time::sleep(Duration::from_secs(cli.run_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                log_event(&event);
                if event == SessionEvent::Connected {
                    on_connected(cli, &handle).await;
                }
            }
            _ = &mut deadline => {
                log::info!("Run time of {}s elapsed", cli.run_secs);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn on_connected(cli: &Cli, handle: &SessionHandle) {
    if let Some(room) = &cli.room {
        if let Err(err) = handle.switch_room(RoomId::from(room.as_str())).await {
            log::warn!("Cannot focus `{room}`: {err}");
        }
    }
    if !cli.no_synth {
        if let Err(err) = handle.start_synthesizer().await {
            log::warn!("Synthesizer did not start: {err}");
        }
    }
    for content in &cli.send {
        if let Err(err) = handle.send(content.as_str()).await {
            log::warn!("Message not sent: {err}");
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::MessageAppended(message) => log::info!(
            "[{}] {} {}: {}",
            message.room_id,
            message.created_at.format("%H:%M:%S"),
            message.author.name,
            message.content
        ),
        SessionEvent::StatusChanged { id, status, .. } => log::info!("{id} is now {status}"),
        SessionEvent::TypingChanged { room, typists } => {
            let names: Vec<&str> = typists.iter().map(|p| p.name.as_str()).collect();
            log::info!("[{room}] typing: {}", names.join(", "));
        }
        SessionEvent::UnreadChanged { room, count } => log::info!("[{room}] {count} unread"),
        other => log::info!("{other:?}"),
    }
}
