//! Token and option inputs shown above the editor.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::workbench::TokenEditor;
use crate::domain::model::Snapshot;

/// Everything the controls bar displays.
#[derive(Debug)]
pub struct ControlsView<'a> {
    pub token: &'a str,
    pub token_editor: &'a TokenEditor,
    pub max_rows: &'a str,
    pub timeout_ms: &'a str,
    pub snapshot: Option<&'a Snapshot>,
    pub focused: Option<ControlField>,
    pub enabled: bool,
}

/// Input fields of the controls bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlField {
    Token,
    MaxRows,
    Timeout,
}

#[derive(Debug, Default)]
pub struct ControlsBar;

impl ControlsBar {
    pub fn render(&self, frame: &mut Frame<'_>, area: Rect, view: &ControlsView<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(30),
                Constraint::Length(16),
                Constraint::Length(16),
                Constraint::Length(30),
            ])
            .split(area);

        let token_text = if view.token_editor.visible {
            if view.token.is_empty() {
                view.token_editor.help.to_string()
            } else {
                view.token.to_string()
            }
        } else {
            format!("saved {}", mask(view.token))
        };
        let token_style = if view.token_editor.visible && view.token.is_empty() {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC)
        } else {
            Style::default()
        };
        self.field(
            frame,
            chunks[0],
            "Token",
            Span::styled(token_text, token_style),
            view.focused == Some(ControlField::Token),
            view.enabled,
        );
        self.field(
            frame,
            chunks[1],
            "Max rows",
            Span::raw(view.max_rows.to_string()),
            view.focused == Some(ControlField::MaxRows),
            view.enabled,
        );
        self.field(
            frame,
            chunks[2],
            "Timeout ms",
            Span::raw(view.timeout_ms.to_string()),
            view.focused == Some(ControlField::Timeout),
            view.enabled,
        );

        let snapshot = match view.snapshot {
            Some(snapshot) => format!(
                "{} bytes ({}/{})",
                snapshot.size_bytes, snapshot.scope, snapshot.source
            ),
            None => "none".to_string(),
        };
        self.field(
            frame,
            chunks[3],
            "Snapshot",
            Span::raw(snapshot),
            false,
            view.enabled,
        );
    }

    fn field(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        title: &str,
        content: Span<'_>,
        focused: bool,
        enabled: bool,
    ) {
        let border = if !enabled {
            Color::DarkGray
        } else if focused {
            Color::Cyan
        } else {
            Color::Gray
        };
        let block = Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));
        let paragraph = Paragraph::new(Line::from(content)).block(block);
        frame.render_widget(paragraph, area);
    }
}

/// Show only the last four characters of a token.
fn mask(token: &str) -> String {
    let count = token.chars().count();
    let tail: String = token.chars().skip(count.saturating_sub(4)).collect();
    format!("{}{tail}", "•".repeat(count.saturating_sub(4).min(8)))
}
