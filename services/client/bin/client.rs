//! Terminal Client for a Wake Session
//!
//! Drives the interaction orchestrator against a running API server.
//! Typed lines are submitted as keyword attempts; lines prefixed with
//! `say ` are treated as an already-transcribed spoken phrase (stand-in
//! for the microphone path). The first line also counts as the unlocking
//! gesture when playback is gesture-gated.

use clap::Parser;
use rouse_client::client::HttpProtocolClient;
use rouse_client::event::Event;
use rouse_client::orchestrator::{NoRecorder, Orchestrator, OrchestratorConfig};
use rouse_client::playback::LogSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rouse-client", version, about = "Wake-session terminal client")]
struct Args {
    /// Base URL of the rouse API server.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server_url: String,

    /// Name used in personalized wake messages.
    #[arg(long)]
    user_name: Option<String>,

    /// Alarm time label passed to the session (e.g. "07:30").
    #[arg(long)]
    alarm_time: Option<String>,

    /// Seconds of user idleness before requesting a nudge.
    #[arg(long, default_value_t = 30)]
    idle_nudge_secs: u64,

    /// Seconds between the alarm trigger and the session start.
    #[arg(long, default_value_t = 3)]
    countdown_secs: u64,

    /// Simulate a platform that blocks audio until a user gesture.
    #[arg(long)]
    gesture_gated: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let client = Arc::new(HttpProtocolClient::new(args.server_url.clone()));
    let config = OrchestratorConfig {
        countdown: Duration::from_secs(args.countdown_secs),
        idle_nudge: Duration::from_secs(args.idle_nudge_secs),
        gesture_gated: args.gesture_gated,
        ..OrchestratorConfig::default()
    };
    let mut orchestrator = Orchestrator::new(
        client,
        Arc::new(NoRecorder),
        Arc::new(LogSink),
        config,
        args.alarm_time,
        args.user_name,
    );
    let events = orchestrator.events();

    // Stdin feeds user actions into the event loop.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut first_line = true;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if first_line {
                        first_line = false;
                        let _ = events.send(Event::Gesture);
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let event = match trimmed.strip_prefix("say ") {
                        Some(phrase) => Event::SpokenCaptured(phrase.to_string()),
                        None => Event::UserTyped(trimmed.to_string()),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    info!(server = %args.server_url, "alarm triggered; enforcement loop starting");
    orchestrator.on_alarm();
    orchestrator.run().await;
    info!("session released. Good morning.");
    Ok(())
}
