//! wr-bot: WhatsApp auto-responder main binary
//!
//! Wires the session manager, the admission filter, the built-in responder
//! and the conversation log together and runs until logout or Ctrl+C.
//!
//! Usage:
//!   wr-bot           - Run the bot on the console transport
//!   wr-bot --help    - Show help

mod console;
mod dispatch;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use wr_core::{AdmissionFilter, AutoResponder, Config, ConversationLog, ConversationStore};
use wr_session::{CredentialStore, SessionManager};

use crate::console::ConsoleTransport;
use crate::dispatch::Dispatcher;

enum RunMode {
    Run,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wr-bot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Run => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting wr-bot...");
    tracing::info!(
        "Admission window: {}ms, attempts ceiling: {}, record cap: {}",
        config.admission.window_ms,
        config.admission.max_attempts,
        config.admission.max_records
    );

    let store = Arc::new(
        ConversationStore::open(&config.store.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open conversation log: {}", e))?,
    );
    let filter = Arc::new(AdmissionFilter::new((&config.admission).into()));
    let responder = Arc::new(AutoResponder::new());

    let transport = Arc::new(ConsoleTransport);
    let credentials = CredentialStore::new(&config.session.credentials_path);
    let manager = Arc::new(SessionManager::new(
        transport,
        credentials,
        config.session.retry_delay(),
    ));

    let (events_tx, events_rx) = mpsc::channel(64);

    let dispatcher = Dispatcher::new(
        Arc::clone(&manager),
        filter,
        responder,
        Some(store as Arc<dyn ConversationLog>),
    );
    let dispatch_handle = tokio::spawn(async move { dispatcher.run(events_rx).await });

    let mut session_handle = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run(events_tx).await })
    };

    tracing::info!("wr-bot initialized, press Ctrl+C to exit");

    tokio::select! {
        result = &mut session_handle => {
            result?.map_err(|e| anyhow::anyhow!("Session error: {}", e))?;
            tracing::info!("Session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            manager.shutdown();
            session_handle.abort();
        }
    }

    // The dispatcher drains whatever is still queued, then exits.
    dispatch_handle.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Run
}

fn print_help() {
    println!("wr-bot - WhatsApp auto-responder");
    println!();
    println!("Usage:");
    println!("  wr-bot           Run the bot (console transport)");
    println!("  wr-bot --help    Show this help message");
    println!("  wr-bot --version Show version");
    println!();
    println!("Environment Variables:");
    println!("  WR_ADMISSION_WINDOW_MS  Debounce window in ms (default: 5000)");
    println!("  WR_MAX_ATTEMPTS         Attempts ceiling per message id (default: 2)");
    println!("  WR_MAX_RECORDS          Dedup record cap (default: 1000)");
    println!("  WR_RETRY_DELAY_MS       Reconnect delay in ms (default: 5000)");
    println!("  WR_SELF_ID              The bot's own JID, ignored as a sender");
    println!("  WR_CREDENTIALS_PATH     Credential blob path (default: data/credentials.json)");
    println!("  WR_DB_PATH              Conversation log path (default: data/conversations.db)");
}
