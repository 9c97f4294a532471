use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use notebook_cli::backends;
use notebook_cli::printer::{write_transcript, TranscriptPrinter};
use notebook_stream::{ChatOptions, SessionController, SessionEvent, SessionOutcome};
use tracing_subscriber::EnvFilter;
use user_identity::IdentityStore;

const LOG_ENV_VAR: &str = "NOTEBOOK_LOG";
const DEFAULT_LOG_LEVEL: &str = "warn";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Send one message to the notebook tutor and stream the reply.
#[derive(Debug, Parser)]
#[command(name = "notebook")]
struct Cli {
    /// Continue an existing conversation instead of starting a new one.
    #[arg(long, short = 'c')]
    conversation: Option<String>,

    /// Model to request. Defaults to gpt-4o-mini.
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Do not translate the message into English before answering.
    #[arg(long)]
    no_translate: bool,

    /// Do not translate the reply back.
    #[arg(long)]
    no_reply_translation: bool,

    #[arg(required = true)]
    message: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let identity = IdentityStore::load_default().context("loading user identity")?;
    let backend = backends::backend_from_env(identity.user_id())?;

    let options = ChatOptions::default()
        .with_translate_to_english(!cli.no_translate)
        .with_auto_translate_responses(!cli.no_reply_translation);

    let (events_tx, events_rx) = mpsc::channel();
    let controller = SessionController::new_with_observer(
        backend,
        options,
        Arc::new(move |event: SessionEvent| {
            let _ = events_tx.send(event);
        }),
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .context("installing Ctrl-C handler")?;

    let text = cli.message.join(" ");
    let handle = controller
        .send(cli.conversation.as_deref(), &text, cli.model.as_deref())
        .context("starting chat session")?;
    let conversation_id = handle.conversation_id().to_string();

    let mut printer = TranscriptPrinter::new();
    let mut stdout = io::stdout().lock();
    let mut cancel_requested = false;
    loop {
        match events_rx.recv_timeout(POLL_INTERVAL) {
            Ok(SessionEvent::TranscriptChanged { .. }) => {
                printer.update(&mut stdout, &controller.snapshot(&conversation_id))?;
            }
            Ok(event) if event.is_terminal() => break,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if !cancel_requested && interrupted.load(Ordering::Relaxed) {
            cancel_requested = true;
            controller.cancel(&handle);
        }
    }

    let outcome = handle.wait();
    let messages = controller.snapshot(&conversation_id);
    printer.update(&mut stdout, &messages)?;
    writeln!(stdout)?;
    if messages
        .iter()
        .any(|message| message.translated_content.is_some())
    {
        writeln!(stdout)?;
        write_transcript(&mut stdout, &messages)?;
    }

    eprintln!("conversation: {conversation_id}");
    match outcome {
        SessionOutcome::Completed => Ok(()),
        SessionOutcome::Cancelled => {
            eprintln!("generation stopped");
            Ok(())
        }
        SessionOutcome::Failed(error) => bail!("chat session failed: {error}"),
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR)
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .with_writer(io::stderr)
        .try_init();
}
