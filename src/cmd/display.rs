//! Terminal rendering of a board view and of bus events.

use std::fmt::Write as _;

use console::{Emoji, style};
use dispatch_board::board::{BoardView, Priority, StatusKey};
use dispatch_board::sync::{ConnectionState, Notice, NoticeLevel};

use super::super::OutputFormat;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[..]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "[~]");

fn priority_tag(priority: Priority) -> String {
    let tag = format!("[{}]", priority);
    match priority {
        Priority::Urgent => style(tag).red().bold().to_string(),
        Priority::High => style(tag).yellow().to_string(),
        Priority::Medium => tag,
        Priority::Low => style(tag).dim().to_string(),
    }
}

/// Plain-text board: one block per column, one line per visible card.
pub fn render_text<S: StatusKey>(view: &BoardView<S>) -> String {
    let mut out = String::new();
    for column in &view.columns {
        let mut header = format!("{} ({})", column.status, column.cards.len());
        if column.hidden > 0 {
            let _ = write!(header, ", {} hidden", column.hidden);
        }
        let _ = writeln!(out, "{}", style(header).bold().cyan());
        if column.cards.is_empty() {
            let _ = writeln!(out, "  {}", style("(empty)").dim());
        }
        for card in &column.cards {
            let marker = if card.pending { PENDING.to_string() } else { String::new() };
            let _ = write!(
                out,
                "  {}{}  {} {}",
                marker,
                style(&card.id).bold(),
                card.title,
                priority_tag(card.priority)
            );
            if let Some(ref technician) = card.technician {
                let _ = write!(out, " @{}", technician);
            }
            out.push('\n');
        }
    }
    let _ = writeln!(out, "{}/{} cards shown", view.visible, view.total);
    out
}

pub fn render<S: StatusKey>(view: &BoardView<S>, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => render_text(view),
        OutputFormat::Json => serde_json::to_string_pretty(view)?,
        OutputFormat::Html => view.to_html(),
    })
}

pub fn connection_line(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Connecting { attempt } => {
            format!("{}connecting (attempt {})", LINK, attempt)
        }
        ConnectionState::Connected => format!("{}live", CHECK),
        ConnectionState::Disconnected {
            attempt,
            retry_in,
            polling,
        } => {
            let mut line = format!(
                "{}offline, retry {} in {:.0}s",
                WARN,
                attempt,
                retry_in.as_secs_f64()
            );
            if *polling {
                line.push_str(", polling for changes");
            }
            style(line).yellow().to_string()
        }
        ConnectionState::Closed => style("closed").dim().to_string(),
    }
}

pub fn notice_line(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Error => format!("{}{}", CROSS, style(&notice.message).red()),
        NoticeLevel::Warning => format!("{}{}", WARN, style(&notice.message).yellow()),
        NoticeLevel::Info => notice.message.clone(),
    }
}
