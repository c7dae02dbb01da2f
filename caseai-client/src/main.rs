//! CaseAI terminal client (caseai-client) - Main entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use caseai_client::playback::{AudioSink, CommandSink, HttpSynthesizer, NullSink};
use caseai_client::transport::{FeedTransport, PollingTransport, SseTransport};
use caseai_client::{ApiClient, ClientError, ConversationSession, SessionConfig};
use caseai_common::{Message, SessionId};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "caseai-client")]
#[command(about = "Terminal client for CaseAI case discussions")]
#[command(version)]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:5780", env = "CASEAI_SERVER")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available cases
    Cases,
    /// Start a new session for a case and join it
    Start {
        case_id: i64,
        #[command(flatten)]
        join: JoinOptions,
    },
    /// Join an existing session
    Join {
        session_id: String,
        #[command(flatten)]
        join: JoinOptions,
    },
}

#[derive(clap::Args, Debug)]
struct JoinOptions {
    #[arg(long, value_enum, default_value_t = TransportKind::Sse)]
    transport: TransportKind,

    /// Player command fed MPEG audio on stdin, e.g. "mpv --no-video -"; text only when unset
    #[arg(long, env = "CASEAI_PLAYER")]
    player: Option<String>,

    /// Voice for personas without one
    #[arg(long, default_value = "aura-asteria-en")]
    voice: String,

    /// Poll interval for --transport poll
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Sse,
    Poll,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseai_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let api = ApiClient::new(&args.server).context("Failed to build HTTP client")?;

    match args.command {
        Command::Cases => {
            for case in api.list_cases().await.context("Failed to list cases")? {
                println!("{:>3}  {}", case.case_id, case.title);
                println!("     {}", case.description);
            }
            Ok(())
        }
        Command::Start { case_id, join } => {
            let started = api
                .start_session(case_id)
                .await
                .with_context(|| format!("Failed to start case {}", case_id))?;
            println!("Session {}", started.session.started_case_id);
            run_session(api, started.session.started_case_id, join).await
        }
        Command::Join { session_id, join } => {
            let session = SessionId::parse(&session_id).context("Invalid session id")?;
            run_session(api, session, join).await
        }
    }
}

async fn run_session(api: ApiClient, session: SessionId, options: JoinOptions) -> Result<()> {
    let transport: Arc<dyn FeedTransport> = match options.transport {
        TransportKind::Sse => Arc::new(SseTransport::new(api.clone())),
        TransportKind::Poll => Arc::new(PollingTransport::new(
            api.clone(),
            Duration::from_millis(options.poll_interval_ms.max(100)),
        )),
    };
    let sink: Arc<dyn AudioSink> = match options.player.as_deref().and_then(CommandSink::from_command_line) {
        Some(player) => Arc::new(player),
        None => Arc::new(NullSink),
    };
    let synthesizer = Arc::new(HttpSynthesizer::new(api.clone()));

    let config = SessionConfig {
        default_voice: options.voice,
        ..SessionConfig::default()
    };
    let conversation = ConversationSession::join(api.clone(), session, transport, synthesizer, sink, config)
        .await
        .context("Failed to join session")?;

    println!("Type a message and press Enter. /end ends the session, /quit leaves.");

    let mut messages = conversation.subscribe_messages();
    let mut gate = conversation.gate().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            received = messages.recv() => match received {
                Ok(message) => print_message(&message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("({} messages skipped on screen)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            changed = gate.changed() => {
                if changed.is_err() {
                    break;
                }
                if gate.borrow_and_update().recording_allowed {
                    println!("[your turn]");
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/end" => {
                        api.end_session(session).await.context("Failed to end session")?;
                        info!("Session {} ended", session);
                    }
                    text => match conversation.submit(text).await {
                        Ok(_) => {}
                        Err(ClientError::TurnNotOpen) => {
                            eprintln!("Wait for your turn; not sent.");
                        }
                        Err(e) => eprintln!("Not sent: {}", e),
                    },
                }
            },
            _ = conversation.closed() => {
                println!("Session ended.");
                break;
            }
        }
    }

    conversation.leave();
    Ok(())
}

fn print_message(message: &Message) {
    let marker = if message.awaiting_user_input { " ?" } else { "" };
    match &message.persona_role {
        Some(role) if !role.is_empty() => {
            println!("{} ({}){}: {}", message.speaker(), role, marker, message.content)
        }
        _ => println!("{}{}: {}", message.speaker(), marker, message.content),
    }
}
