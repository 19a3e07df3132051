//! prompt-queue CLI
//!
//! Edit the persisted prompt queue and drain it into a chat page through a
//! WebDriver session.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prompt_queue::transfer::{self, EXPORT_FILE_NAME, HELPER_PROMPT};
use prompt_queue::{
    bridge, Detached, PageDriver, ProcessorConfig, QueueEvent, QueueFile, QueueProcessor,
    QueueStore, SiteProfile, SqliteStore, StartOutcome, WebDriverPage,
};

/// Queue prompts and submit them one by one into a chat web page.
#[derive(Parser)]
#[command(name = "prompt-queue")]
#[command(version)]
struct Cli {
    /// Queue database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Site profile JSON (selector tables); defaults to the built-in chatgpt.com profile
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add messages to the end of the queue
    Add {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Show the queue and settings
    List {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the message at a 1-based position
    Remove { position: usize },

    /// Remove every message
    Clear,

    /// Replace the queue with an exported queue file
    Import { file: PathBuf },

    /// Write the queue to a file (`-` for stdout)
    Export {
        #[arg(default_value = EXPORT_FILE_NAME)]
        file: PathBuf,
    },

    /// Append messages from the clipboard (JSON list, export file, or one per line)
    Paste {
        /// Read the text from stdin instead of the system clipboard
        #[arg(long)]
        stdin: bool,
    },

    /// Copy a prompt that asks the chat for an importable prompt list
    HelperPrompt,

    /// Set the minimum wait between successful messages
    Wait { seconds: u64 },

    /// Wait for a generated image before moving on
    ImageMode { state: Toggle },

    /// Drain the queue into the chat page
    Run {
        /// WebDriver server URL
        #[arg(long, default_value = "http://localhost:4444")]
        webdriver: String,

        /// Page to open; defaults to the profile's start URL
        #[arg(long)]
        url: Option<String>,

        /// Start right away instead of waiting for Enter
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete all persisted state
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Editing commands print their own results; only a run narrates progress.
    let default_filter = match cli.command {
        Commands::Run { .. } => "prompt_queue=info",
        _ => "prompt_queue=warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let profile = match &cli.profile {
        Some(path) => SiteProfile::from_file(path)?,
        None => SiteProfile::chatgpt(),
    };
    let store = SqliteStore::open(Some(db_path.as_path()))
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    match cli.command {
        Commands::Run {
            webdriver,
            url,
            yes,
        } => run(store, profile, &webdriver, url, yes).await,
        Commands::Reset => {
            store.clear_all()?;
            println!("All queue state removed from {}", db_path.display());
            Ok(())
        }
        command => edit(QueueProcessor::new(store, Detached, ProcessorConfig::default())?, command),
    }
}

fn default_db_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("No data directory on this platform; pass --db")?
        .join("prompt-queue");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir.join("queue.db"))
}

fn edit(processor: QueueProcessor<SqliteStore, Detached>, command: Commands) -> Result<()> {
    match command {
        Commands::Add { messages } => {
            let added = processor.append(messages)?;
            println!("Added {} message(s); {} queued", added, processor.len());
        }
        Commands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&processor.snapshot())?);
            } else {
                print_queue(&processor);
            }
        }
        Commands::Remove { position } => {
            if position == 0 {
                bail!("Positions start at 1");
            }
            let removed = processor.remove(position - 1)?;
            println!("Removed: {}", removed);
        }
        Commands::Clear => {
            processor.clear()?;
            println!("Queue cleared");
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            processor.import(QueueFile::parse(&text)?)?;
            println!("Queue imported: {} message(s)", processor.len());
        }
        Commands::Export { file } => {
            let json = processor.export().to_json_pretty()?;
            if file == Path::new("-") {
                println!("{}", json);
            } else {
                std::fs::write(&file, json)
                    .with_context(|| format!("Failed to write {}", file.display()))?;
                println!("Queue exported to {}", file.display());
            }
        }
        Commands::Paste { stdin } => {
            let text = if stdin {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                arboard::Clipboard::new()
                    .and_then(|mut clipboard| clipboard.get_text())
                    .context("Failed to read clipboard")?
            };
            let messages = transfer::parse_clipboard(&text);
            if messages.is_empty() {
                println!("Clipboard is empty");
            } else {
                let added = processor.append(messages)?;
                println!("Added {} message(s) from clipboard", added);
            }
        }
        Commands::HelperPrompt => {
            arboard::Clipboard::new()
                .and_then(|mut clipboard| clipboard.set_text(HELPER_PROMPT))
                .context("Failed to copy to clipboard")?;
            println!("Helper prompt copied! Paste it in the chat to generate a prompt list.");
        }
        Commands::Wait { seconds } => {
            let applied = processor.set_min_wait(Duration::from_secs(seconds))?;
            println!("Minimum wait time set to {} seconds", applied.as_secs());
        }
        Commands::ImageMode { state } => {
            let enabled = matches!(state, Toggle::On);
            processor.set_image_mode(enabled)?;
            println!(
                "Image queue mode {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Run { .. } | Commands::Reset => unreachable!("handled before editing"),
    }
    Ok(())
}

fn print_queue<S: QueueStore + 'static>(processor: &QueueProcessor<S, Detached>) {
    let snapshot = processor.snapshot();
    println!(
        "Minimum wait: {}s, image mode: {}",
        snapshot.min_wait.as_secs(),
        if snapshot.image_mode { "on" } else { "off" }
    );
    if snapshot.queue.is_empty() {
        println!("Queue is empty");
        return;
    }
    for (index, message) in snapshot.queue.iter().enumerate() {
        println!("{:>3}. {}", index + 1, message);
    }
}

async fn run(
    store: SqliteStore,
    profile: SiteProfile,
    webdriver: &str,
    url: Option<String>,
    yes: bool,
) -> Result<()> {
    let page = WebDriverPage::connect(webdriver).await?;
    let url = url.unwrap_or_else(|| profile.start_url.clone());
    page.open(&url).await?;

    if !yes {
        println!("Opened {}. Log in if needed, then press Enter to start.", url);
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
    }

    let (transport, host) = bridge::connect(PageDriver::new(page, profile));
    let host_task = tokio::spawn(host.run());

    let processor = Arc::new(QueueProcessor::new(
        store,
        transport,
        ProcessorConfig::default(),
    )?);

    let mut events = processor.subscribe();
    let reporter = tokio::spawn(async move {
        let mut dropped = Vec::new();
        loop {
            match events.recv().await {
                Ok(QueueEvent::Dropped { prompt, reason }) => dropped.push((prompt, reason)),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "event reporter fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
        dropped
    });

    match processor.start() {
        StartOutcome::Started => {
            tokio::select! {
                _ = processor.wait_until_idle() => {}
                _ = tokio::signal::ctrl_c() => {
                    processor.pause();
                    println!("Pausing; waiting for the current message to finish (Ctrl-C again to quit now)");
                    tokio::select! {
                        _ = processor.wait_until_idle() => {}
                        _ = tokio::signal::ctrl_c() => {
                            warn!("aborted with a message still in flight");
                            return Ok(());
                        }
                    }
                }
            }
        }
        StartOutcome::QueueEmpty => println!("Queue is empty"),
        StartOutcome::AlreadyProcessing => {}
    }

    let remaining = processor.len();
    drop(processor);

    let dropped = reporter.await?;
    for (prompt, reason) in &dropped {
        println!("Skipped after retries ({}): {}", reason, prompt);
    }
    println!("{} message(s) left in queue", remaining);

    let driver = host_task.await?;
    if let Err(e) = driver.into_page().close().await {
        warn!(error = %e, "failed to close WebDriver session");
    }
    info!("done");
    Ok(())
}
