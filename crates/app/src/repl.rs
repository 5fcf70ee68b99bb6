//! Interactive panel loop.
//!
//! Plain lines are questions; slash commands map to the other panel controls.

use agent_host::panel::PanelController;
use agent_host::{RelayOutcome, SelectionRelay};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Type a question and press Enter, or use a command:
  /file <path>      attach a file
  /context <text>   add free-text context
  /rm <id>          remove a context item
  /items            list context items
  /history          show the conversation
  /del <n>          delete conversation message #n
  /clear            clear the conversation
  /key <api-key>    save your Gemini API key
  /select <text>    ask about a selection, as the context menu would
  /help             show this help
  /quit             leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Ask(String),
    AttachFile(PathBuf),
    AddContext(String),
    RemoveItem(String),
    ListItems,
    ShowHistory,
    DeleteMessage(usize),
    ClearHistory,
    SaveKey(String),
    Select(String),
    Help,
    Quit,
    Invalid(String),
}

impl PanelCommand {
    /// Parse one input line; `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(PanelCommand::Ask(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name, arg) {
            ("help", _) => PanelCommand::Help,
            ("quit" | "exit", _) => PanelCommand::Quit,
            ("items", _) => PanelCommand::ListItems,
            ("history", _) => PanelCommand::ShowHistory,
            ("clear", _) => PanelCommand::ClearHistory,
            ("file", path) if !path.is_empty() => PanelCommand::AttachFile(PathBuf::from(path)),
            ("context", text) if !text.is_empty() => PanelCommand::AddContext(text.to_string()),
            ("rm", id) if !id.is_empty() => PanelCommand::RemoveItem(id.to_string()),
            ("key", key) => PanelCommand::SaveKey(key.to_string()),
            ("select", text) if !text.is_empty() => PanelCommand::Select(text.to_string()),
            ("del", n) => match n.parse() {
                Ok(index) => PanelCommand::DeleteMessage(index),
                Err(_) => PanelCommand::Invalid(format!("Not a message number: '{}'", n)),
            },
            _ => PanelCommand::Invalid(format!("Unknown or incomplete command: /{}", rest)),
        };
        Some(command)
    }
}

/// Run the panel until `/quit` or end of input
pub async fn run_panel(panel: Arc<PanelController>, relay: SelectionRelay) -> Result<()> {
    println!("Page Buddy. Type /help for commands.");
    panel.open().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = PanelCommand::parse(&line) else {
            continue;
        };
        if command == PanelCommand::Quit {
            break;
        }
        if let Err(e) = execute(&panel, &relay, command).await {
            eprintln!("Error: {:#}", e);
        }
    }
    Ok(())
}

async fn execute(
    panel: &PanelController,
    relay: &SelectionRelay,
    command: PanelCommand,
) -> Result<()> {
    match command {
        PanelCommand::Ask(question) => {
            panel.ask(&question).await?;
        }
        PanelCommand::AttachFile(path) => {
            let item = panel.upload_file(&path).await?;
            println!("Attached {} ({})", item.name, item.mime_type);
        }
        PanelCommand::AddContext(text) => {
            panel.add_context(&text).await?;
        }
        PanelCommand::RemoveItem(id) => {
            if !panel.delete_context_item(&id).await? {
                println!("No context item with id {}", id);
            }
        }
        PanelCommand::ListItems => panel.refresh_context().await?,
        PanelCommand::ShowHistory => panel.refresh_history().await?,
        PanelCommand::DeleteMessage(index) => {
            if !panel.delete_message(index).await? {
                println!("No message #{}", index);
            }
        }
        PanelCommand::ClearHistory => panel.clear_history().await?,
        PanelCommand::SaveKey(key) => {
            panel.save_api_key(&key).await?;
        }
        PanelCommand::Select(text) => {
            if relay.relay(&text).await? == RelayOutcome::Queued {
                println!("Selection queued for the panel.");
            }
        }
        PanelCommand::Help => println!("{}", HELP),
        PanelCommand::Invalid(message) => println!("{}", message),
        PanelCommand::Quit => {}
    }
    Ok(())
}
