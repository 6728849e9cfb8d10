//! Query editor pane rendering highlighted query text with a caret.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::editor::QueryEditor;
use crate::app::highlight::{HighlightSpan, Highlighter};

/// Ratatui component displaying the query with syntax colors.
#[derive(Debug, Default)]
pub struct QueryPane {
    highlighter: Highlighter,
}

impl QueryPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        editor: &QueryEditor,
        focused: bool,
        enabled: bool,
    ) {
        let border_color = if !enabled {
            Color::DarkGray
        } else if focused {
            Color::Cyan
        } else {
            Color::Gray
        };
        let block = Block::default()
            .title("Query")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let (line, column) = editor.caret_line_column();
        let scroll = line.saturating_sub(inner.height.saturating_sub(1) as usize);

        let lines: Vec<Line<'_>> = if editor.is_empty() {
            vec![Line::styled(
                "SELECT a FROM doc WHERE attributes.href CONTAINS 'docs'",
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )]
        } else {
            self.highlighter
                .highlight_lines(editor.tokens())
                .into_iter()
                .map(|line| Line::from(line.spans.iter().map(to_span).collect::<Vec<_>>()))
                .collect()
        };

        let paragraph = Paragraph::new(lines).scroll((scroll as u16, 0));
        frame.render_widget(paragraph, inner);

        if focused && enabled && inner.width > 0 && inner.height > 0 {
            let x = inner.x + (column as u16).min(inner.width - 1);
            let y = inner.y + (line - scroll) as u16;
            frame.set_cursor(x, y);
        }
    }
}

fn to_span(span: &HighlightSpan) -> Span<'static> {
    let mut style = Style::default();
    if let Some(color) = span.style.foreground {
        style = style.fg(Color::Rgb(color.r, color.g, color.b));
    }
    if span.style.attributes.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if span.style.attributes.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    Span::styled(span.content.clone(), style)
}
