//! Terminal rendering of the panel.

use agent_host::PanelView;
use colored::Colorize;
use shared::history::{History, Role};
use shared::ContextItem;

pub struct TerminalView;

impl PanelView for TerminalView {
    fn show_context_items(&self, items: &[ContextItem]) {
        println!("{}", "Context".bold());
        if items.is_empty() {
            println!("  No files or context added yet.");
            return;
        }
        for item in items {
            println!("  [{}] {}", item.id.dimmed(), item.name.bold());
            if item.is_file {
                if let Some(size) = item.formatted_size() {
                    println!("      Size: {}", size);
                }
                println!("      Type: {}", item.mime_type);
            } else {
                for line in item.content.lines() {
                    println!("      {}", line);
                }
            }
            println!("      Added: {}", item.formatted_date());
        }
    }

    fn show_history(&self, history: &History) {
        println!("{}", "Conversation".bold());
        if history.is_empty() {
            println!("  No conversation history yet.");
            return;
        }
        for (index, message) in history.messages().iter().enumerate() {
            let label = match message.role {
                Role::User => message.role.label().cyan(),
                Role::Model => message.role.label().green(),
            };
            println!("  {} {} {}", format!("#{}", index).dimmed(), label, message.content);
        }
    }

    fn show_answer(&self, text: &str) {
        println!("\n{}\n", text);
    }

    fn show_status(&self, status: &str) {
        println!("{}", status.yellow());
    }
}
