use agent_host::panel::{InProcessLink, PanelController};
use agent_host::{Assistant, SelectionRelay};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use services::{JsonFileStore, KeyValueStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod repl;
mod view;

use view::TerminalView;

/// Ask Gemini about selected text, with files and notes as context
#[derive(Parser)]
#[command(name = "buddy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH", env = "BUDDY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the store file
    #[arg(long, value_name = "DIR", env = "BUDDY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Gemini model name, e.g. gemini-2.0-flash
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the interactive panel (default)
    Panel,
    /// Ask one question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Ask about a selection the way the context menu does
    Select { text: String },
    /// Manage files and notes sent as context
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Show or edit the conversation
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Save the Gemini API key
    SetKey { api_key: String },
}

#[derive(Subcommand)]
enum ContextAction {
    /// Attach a file
    AddFile { path: PathBuf },
    /// Add a free-text note
    AddText { text: String },
    /// List context items
    List,
    /// Remove a context item by id
    Remove { id: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    Show,
    Clear,
    /// Delete message #index
    Delete { index: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir.display().to_string());
    }

    let store_path = config::store_path(&settings);
    let store: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );
    tracing::debug!(store = %store_path.display(), endpoint = %settings.endpoint_url(), "starting");

    let assistant = Arc::new(Assistant::new(store.clone(), &settings)?);
    let panel = Arc::new(PanelController::new(assistant, Arc::new(TerminalView)));

    match cli.command.unwrap_or(Command::Panel) {
        Command::Panel => {
            let link = Arc::new(InProcessLink::new(panel.clone(), true));
            let relay = SelectionRelay::new(store.clone(), link);
            let watcher = panel.spawn_store_watcher();
            repl::run_panel(panel, relay).await?;
            watcher.abort();
        }
        Command::Ask { question } => {
            panel.ask(&question.join(" ")).await?;
        }
        Command::Select { text } => {
            // A one-shot run has no open panel: the selection goes through the
            // pending record and is consumed when the panel opens.
            let link = Arc::new(InProcessLink::new(panel.clone(), false));
            let relay = SelectionRelay::new(store.clone(), link);
            relay.relay(&text).await?;
        }
        Command::Context { action } => match action {
            ContextAction::AddFile { path } => {
                let item = panel.upload_file(&path).await?;
                println!("Added {} ({})", item.name, item.id);
            }
            ContextAction::AddText { text } => {
                panel.add_context(&text).await?;
            }
            ContextAction::List => panel.refresh_context().await?,
            ContextAction::Remove { id } => {
                if !panel.delete_context_item(&id).await? {
                    println!("No context item with id {}", id);
                }
            }
        },
        Command::History { action } => match action {
            HistoryAction::Show => panel.refresh_history().await?,
            HistoryAction::Clear => panel.clear_history().await?,
            HistoryAction::Delete { index } => {
                if !panel.delete_message(index).await? {
                    println!("No message #{}", index);
                }
            }
        },
        Command::SetKey { api_key } => {
            panel.save_api_key(&api_key).await?;
        }
    }

    Ok(())
}
