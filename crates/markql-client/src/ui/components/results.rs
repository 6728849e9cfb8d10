//! Results table component.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap};

use crate::app::export::value_to_text;
use crate::domain::model::QueryResult;

const MAX_COLUMN_WIDTH: usize = 40;

/// Renders the latest query result as a scrollable table.
#[derive(Debug, Default)]
pub struct ResultsPane;

impl ResultsPane {
    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        result: Option<&QueryResult>,
        state: &mut TableState,
        focused: bool,
    ) {
        let title = match result {
            Some(result) if result.truncated => {
                format!("Results ({} rows, truncated)", result.rows.len())
            }
            Some(result) => format!("Results ({} rows)", result.rows.len()),
            None => "Results".to_string(),
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused {
                Color::Cyan
            } else {
                Color::Gray
            }));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(result) = result else {
            let placeholder = Paragraph::new("No results yet. Press ctrl+r to run the query.")
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true });
            frame.render_widget(placeholder, inner);
            return;
        };

        let (notice_area, table_area) = match &result.error {
            Some(_) => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(1), Constraint::Min(1)])
                    .split(inner);
                (Some(chunks[0]), chunks[1])
            }
            None => (None, inner),
        };

        if let (Some(area), Some(error)) = (notice_area, &result.error) {
            let text = match &error.code {
                Some(code) => format!("{code}: {}", error.message),
                None => error.message.clone(),
            };
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(Color::Red)),
                area,
            );
        }

        let header = Row::new(
            result
                .columns
                .iter()
                .map(|column| Cell::from(column.name.clone())),
        )
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));

        let rows = result.rows.iter().map(|row| {
            Row::new(
                result
                    .padded_row(row)
                    .map(|value| Cell::from(single_line(&value_to_text(value)))),
            )
        });

        let table = Table::new(rows, column_widths(result))
            .header(header)
            .highlight_style(Style::default().bg(Color::Rgb(32, 52, 70)));
        frame.render_stateful_widget(table, table_area, state);
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn column_widths(result: &QueryResult) -> Vec<Constraint> {
    let width = result
        .rows
        .iter()
        .map(|row| row.len())
        .max()
        .unwrap_or(0)
        .max(result.columns.len());

    (0..width)
        .map(|idx| {
            let header = result
                .columns
                .get(idx)
                .map_or(0, |column| column.name.chars().count());
            let widest = result
                .rows
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|value| value_to_text(value).chars().count())
                .max()
                .unwrap_or(0);
            Constraint::Length(header.max(widest).clamp(3, MAX_COLUMN_WIDTH) as u16)
        })
        .collect()
}
