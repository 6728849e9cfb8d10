//! Application loop for the TUI.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, TableState, Wrap};
use ratatui::{Frame, Terminal};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::app::editor::PastePayload;
use crate::app::workbench::{Action, Workbench};
use crate::ui::components::controls::{ControlField, ControlsBar, ControlsView};
use crate::ui::components::query_editor::QueryPane;
use crate::ui::components::results::ResultsPane;

const TICK_RATE: Duration = Duration::from_millis(120);

/// Which pane receives keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Query,
    Token,
    MaxRows,
    Timeout,
    Results,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Query => Focus::Results,
            Focus::Results => Focus::Token,
            Focus::Token => Focus::MaxRows,
            Focus::MaxRows => Focus::Timeout,
            Focus::Timeout => Focus::Query,
        }
    }

    fn control_field(self) -> Option<ControlField> {
        match self {
            Focus::Token => Some(ControlField::Token),
            Focus::MaxRows => Some(ControlField::MaxRows),
            Focus::Timeout => Some(ControlField::Timeout),
            Focus::Query | Focus::Results => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLevel {
    Info,
    Success,
    Error,
}

impl StatusLevel {
    fn of(status: &str) -> Self {
        if status.starts_with("Error:") {
            StatusLevel::Error
        } else if ["Captured", "Copied", "Saved", "Token saved", "Snapshot"]
            .iter()
            .any(|prefix| status.starts_with(prefix))
        {
            StatusLevel::Success
        } else {
            StatusLevel::Info
        }
    }
}

/// Interactive workbench: token and option inputs, highlighted query
/// editor, results table, and a status line.
pub struct UiApp {
    workbench: Workbench,
    focus: Focus,
    table: TableState,
    controls: ControlsBar,
    query_pane: QueryPane,
    results_pane: ResultsPane,
    pending: Option<Action>,
    should_quit: bool,
}

impl UiApp {
    pub fn new(workbench: Workbench) -> Self {
        let focus = if workbench.token_editor().visible {
            Focus::Token
        } else {
            Focus::Query
        };
        Self {
            workbench,
            focus,
            table: TableState::default(),
            controls: ControlsBar,
            query_pane: QueryPane::new(),
            results_pane: ResultsPane,
            pending: None,
            should_quit: false,
        }
    }

    pub fn workbench(&self) -> &Workbench {
        &self.workbench
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Launch the terminal UI and enter the event loop.
    pub fn run(mut self, runtime: &Runtime) -> Result<()> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
            .context("failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;

        let event_loop_result = self.event_loop(&mut terminal, runtime);

        disable_raw_mode().ok();
        let _ = execute!(
            terminal.backend_mut(),
            DisableBracketedPaste,
            LeaveAlternateScreen
        );
        let _ = terminal.show_cursor();

        event_loop_result
    }

    fn event_loop<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        runtime: &Runtime,
    ) -> Result<()> {
        loop {
            terminal.draw(|frame| self.render(frame))?;

            if self.should_quit {
                break;
            }

            if event::poll(TICK_RATE)? {
                let ev = event::read()?;
                if let Some(action) = self.handle_event(ev) {
                    self.perform(terminal, runtime, action)?;
                }
            }
        }
        Ok(())
    }

    /// Run an action to completion. Controls render disabled meanwhile.
    fn perform<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        runtime: &Runtime,
        action: Action,
    ) -> Result<()> {
        self.pending = Some(action);
        terminal.draw(|frame| self.render(frame))?;
        // Failures are already reflected in the status line.
        if let Err(err) = runtime.block_on(self.workbench.trigger(action)) {
            debug!(?action, error = %err, "action finished with error");
        }
        self.pending = None;

        if matches!(action, Action::RunQuery) {
            let has_rows = self
                .workbench
                .result()
                .is_some_and(|result| !result.rows.is_empty());
            self.table.select(has_rows.then_some(0));
        }
        if matches!(action, Action::SaveToken) && !self.workbench.token_editor().visible {
            self.focus = Focus::Query;
        }
        Ok(())
    }

    pub fn render(&mut self, frame: &mut Frame<'_>) {
        let size = frame.size();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Percentage(35),
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .split(size);

        let enabled = self.pending.is_none() && self.workbench.controls_enabled();
        let view = ControlsView {
            token: &self.workbench.token,
            token_editor: self.workbench.token_editor(),
            max_rows: &self.workbench.max_rows_input,
            timeout_ms: &self.workbench.timeout_input,
            snapshot: self.workbench.snapshot(),
            focused: self.focus.control_field(),
            enabled,
        };
        self.controls.render(frame, layout[0], &view);

        self.query_pane.render(
            frame,
            layout[1],
            &self.workbench.editor,
            self.focus == Focus::Query,
            enabled,
        );

        self.results_pane.render(
            frame,
            layout[2],
            self.workbench.result(),
            &mut self.table,
            self.focus == Focus::Results,
        );

        let key = Style::default().fg(Color::Cyan);
        let hints = Paragraph::new(Line::from(vec![
            Span::styled("ctrl+r", key),
            Span::raw(" run · "),
            Span::styled("ctrl+g", key),
            Span::raw(" capture · "),
            Span::styled("F6/F7", key),
            Span::raw(" copy csv/json · "),
            Span::styled("ctrl+t", key),
            Span::raw(" token · "),
            Span::styled("ctrl+s", key),
            Span::raw(" save token · "),
            Span::styled("shift+tab", key),
            Span::raw(" focus · "),
            Span::styled("ctrl+q", key),
            Span::raw(" quit"),
        ]))
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Gray));
        frame.render_widget(hints, layout[3]);

        self.render_status(frame, layout[4]);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let line = match self.pending {
            Some(action) => Line::styled(
                format!("{} ...", pending_label(action)),
                Style::default().fg(Color::Yellow),
            ),
            None => {
                let status = self.workbench.status();
                let style = match StatusLevel::of(status) {
                    StatusLevel::Info => Style::default().fg(Color::Gray),
                    StatusLevel::Success => Style::default().fg(Color::Green),
                    StatusLevel::Error => Style::default().fg(Color::Red),
                };
                Line::styled(status.to_string(), style)
            }
        };

        let block = Block::default().borders(Borders::TOP);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new(line), inner);
    }

    /// Apply an input event. Returns the action to run, if any.
    pub fn handle_event(&mut self, event: Event) -> Option<Action> {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key_event(key),
            Event::Paste(text) => {
                self.handle_paste(text);
                None
            }
            _ => None,
        }
    }

    fn handle_paste(&mut self, text: String) {
        match self.focus {
            Focus::Query => {
                self.workbench.editor.paste(&PastePayload::plain(text));
            }
            Focus::Token => self.workbench.token.push_str(text.trim()),
            Focus::MaxRows => self.workbench.max_rows_input.push_str(text.trim()),
            Focus::Timeout => self.workbench.timeout_input.push_str(text.trim()),
            Focus::Results => {}
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => {
                    self.should_quit = true;
                    return None;
                }
                KeyCode::Char('r') => return Some(Action::RunQuery),
                KeyCode::Char('g') => return Some(Action::Capture),
                KeyCode::Char('s') => return Some(Action::SaveToken),
                KeyCode::Char('t') => {
                    self.workbench.edit_token();
                    self.focus = Focus::Token;
                    return None;
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::F(5) => return Some(Action::RunQuery),
            KeyCode::F(6) => return Some(Action::CopyCsv),
            KeyCode::F(7) => return Some(Action::CopyJson),
            KeyCode::BackTab => {
                self.focus = self.focus.next();
                return None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Query => self.handle_query_key(key),
            Focus::Results => self.handle_results_key(key),
            Focus::Token | Focus::MaxRows | Focus::Timeout => self.handle_field_key(key),
        }
    }

    fn handle_query_key(&mut self, key: KeyEvent) -> Option<Action> {
        let editor = &mut self.workbench.editor;
        match key.code {
            KeyCode::Tab => editor.insert_tab(),
            KeyCode::Enter => editor.insert_at_caret("\n"),
            KeyCode::Backspace => editor.backspace(),
            KeyCode::Delete => editor.delete_forward(),
            KeyCode::Left => editor.move_left(),
            KeyCode::Right => editor.move_right(),
            KeyCode::Up => editor.move_vertical(-1),
            KeyCode::Down => editor.move_vertical(1),
            KeyCode::Home => editor.move_line_start(),
            KeyCode::End => editor.move_line_end(),
            KeyCode::Esc => self.focus = Focus::Results,
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                let mut buf = [0u8; 4];
                editor.insert_at_caret(ch.encode_utf8(&mut buf));
            }
            _ => {}
        }
        None
    }

    fn handle_results_key(&mut self, key: KeyEvent) -> Option<Action> {
        let rows = self
            .workbench
            .result()
            .map_or(0, |result| result.rows.len());
        let current = self.table.selected().unwrap_or(0);
        match key.code {
            KeyCode::Down | KeyCode::Char('j') if rows > 0 => {
                self.table.select(Some((current + 1).min(rows - 1)));
            }
            KeyCode::Up | KeyCode::Char('k') if rows > 0 => {
                self.table.select(Some(current.saturating_sub(1)));
            }
            KeyCode::PageDown if rows > 0 => {
                self.table.select(Some((current + 10).min(rows - 1)));
            }
            KeyCode::PageUp if rows > 0 => {
                self.table.select(Some(current.saturating_sub(10)));
            }
            KeyCode::Tab | KeyCode::Esc | KeyCode::Enter => self.focus = Focus::Query,
            _ => {}
        }
        None
    }

    fn handle_field_key(&mut self, key: KeyEvent) -> Option<Action> {
        let focus = self.focus;
        let field = match focus {
            Focus::Token => &mut self.workbench.token,
            Focus::MaxRows => &mut self.workbench.max_rows_input,
            Focus::Timeout => &mut self.workbench.timeout_input,
            Focus::Query | Focus::Results => return None,
        };
        match key.code {
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                field.push(ch);
                None
            }
            KeyCode::Backspace => {
                field.pop();
                None
            }
            KeyCode::Enter if focus == Focus::Token => Some(Action::SaveToken),
            KeyCode::Enter | KeyCode::Tab | KeyCode::Esc => {
                self.focus = focus.next();
                None
            }
            _ => None,
        }
    }
}

fn pending_label(action: Action) -> &'static str {
    match action {
        Action::Capture => "Capturing",
        Action::RunQuery => "Running query",
        Action::CopyCsv | Action::CopyJson => "Copying",
        Action::SaveToken => "Saving token",
    }
}
