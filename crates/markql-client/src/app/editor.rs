//! Query editor state with caret preservation across re-tokenization.
//!
//! The editor keeps the highlighted token stream as its rendered surface and
//! tracks the caret as a location inside that surface. Every edit projects the
//! caret back to a plain-text character offset, rewrites the text, tokenizes
//! again, and places the caret at the same offset in the new stream. Token
//! boundaries can move freely (typing inside a string splits or merges spans)
//! without disturbing the caret.

use crate::app::highlight::{plain_text, tokenize};
use crate::domain::model::Token;

/// Text inserted for a tab keypress.
pub const TAB_INSERT: &str = "  ";

/// Caret position expressed against the rendered token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaretLocation {
    /// Index of the token holding the caret. Equal to the token count when
    /// the stream is empty.
    pub token: usize,
    /// Character offset inside that token.
    pub offset: usize,
}

/// Clipboard payload offered to a paste.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PastePayload {
    pub plain: Option<String>,
    pub rich: Option<String>,
}

impl PastePayload {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain: Some(text.into()),
            rich: None,
        }
    }
}

/// Plain-text character offset of a caret location. Locations past the
/// stream resolve to the end of the text.
pub fn caret_offset(tokens: &[Token], location: CaretLocation) -> usize {
    let mut offset = 0;
    for (idx, token) in tokens.iter().enumerate() {
        let len = token.char_len();
        if idx == location.token {
            return offset + location.offset.min(len);
        }
        offset += len;
    }
    offset
}

/// Place a caret at a plain-text character offset, clamping to the end.
///
/// An offset on a token boundary lands at the end of the earlier token.
pub fn locate_caret(tokens: &[Token], offset: usize) -> CaretLocation {
    let mut remaining = offset;
    for (idx, token) in tokens.iter().enumerate() {
        let len = token.char_len();
        if remaining <= len {
            return CaretLocation {
                token: idx,
                offset: remaining,
            };
        }
        remaining -= len;
    }
    match tokens.last() {
        Some(last) => CaretLocation {
            token: tokens.len() - 1,
            offset: last.char_len(),
        },
        None => CaretLocation::default(),
    }
}

/// Byte index of a character offset within `text`, clamped to its length.
fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map_or(text.len(), |(idx, _)| idx)
}

/// Query input with highlighting and caret handling.
#[derive(Debug, Clone, Default)]
pub struct QueryEditor {
    tokens: Vec<Token>,
    caret: CaretLocation,
}

impl QueryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an editor holding `text` with the caret at its end.
    pub fn with_text(text: &str) -> Self {
        let mut editor = Self::new();
        editor.set_text(text);
        editor
    }

    /// Current plain text.
    pub fn text(&self) -> String {
        plain_text(&self.tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Rendered token stream.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn caret(&self) -> CaretLocation {
        self.caret
    }

    /// Caret as a plain-text character offset.
    pub fn caret_offset(&self) -> usize {
        caret_offset(&self.tokens, self.caret)
    }

    /// Zero-based (line, column) of the caret, in characters.
    pub fn caret_line_column(&self) -> (usize, usize) {
        let text = self.text();
        let offset = self.caret_offset();
        let before: String = text.chars().take(offset).collect();
        let line = before.matches('\n').count();
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count());
        (line, column)
    }

    /// Replace the whole text, placing the caret at the end.
    pub fn set_text(&mut self, text: &str) {
        self.rerender(text.to_string(), text.chars().count());
    }

    /// Move the caret to a plain-text offset, clamped to the text.
    pub fn set_caret_offset(&mut self, offset: usize) {
        self.caret = locate_caret(&self.tokens, offset);
    }

    /// Insert `text` at the caret and leave the caret after it.
    pub fn insert_at_caret(&mut self, text: &str) {
        let mut current = self.text();
        let offset = self.caret_offset();
        current.insert_str(byte_index(&current, offset), text);
        self.rerender(current, offset + text.chars().count());
    }

    /// Tab inserts two spaces rather than a tab character.
    pub fn insert_tab(&mut self) {
        self.insert_at_caret(TAB_INSERT);
    }

    /// Insert only the plain-text part of a paste. Returns whether anything
    /// was inserted.
    pub fn paste(&mut self, payload: &PastePayload) -> bool {
        match payload.plain.as_deref() {
            Some(text) if !text.is_empty() => {
                self.insert_at_caret(text);
                true
            }
            _ => false,
        }
    }

    pub fn backspace(&mut self) {
        let offset = self.caret_offset();
        if offset == 0 {
            return;
        }
        let mut current = self.text();
        let start = byte_index(&current, offset - 1);
        let end = byte_index(&current, offset);
        current.replace_range(start..end, "");
        self.rerender(current, offset - 1);
    }

    pub fn delete_forward(&mut self) {
        let mut current = self.text();
        let offset = self.caret_offset();
        if offset >= current.chars().count() {
            return;
        }
        let start = byte_index(&current, offset);
        let end = byte_index(&current, offset + 1);
        current.replace_range(start..end, "");
        self.rerender(current, offset);
    }

    pub fn move_left(&mut self) {
        let offset = self.caret_offset();
        self.set_caret_offset(offset.saturating_sub(1));
    }

    pub fn move_right(&mut self) {
        let offset = self.caret_offset();
        self.set_caret_offset(offset + 1);
    }

    /// Move to the start of the current line.
    pub fn move_line_start(&mut self) {
        let (_, column) = self.caret_line_column();
        let offset = self.caret_offset();
        self.set_caret_offset(offset - column);
    }

    /// Move to the end of the current line.
    pub fn move_line_end(&mut self) {
        let text = self.text();
        let offset = self.caret_offset();
        let rest = text.chars().skip(offset).take_while(|ch| *ch != '\n').count();
        self.set_caret_offset(offset + rest);
    }

    /// Move the caret up (negative) or down (positive) by whole lines,
    /// keeping the column where the target line is long enough.
    pub fn move_vertical(&mut self, delta: isize) {
        let text = self.text();
        let lines: Vec<&str> = text.split('\n').collect();
        let (line, column) = self.caret_line_column();
        let target = line
            .saturating_add_signed(delta)
            .min(lines.len().saturating_sub(1));
        let offset: usize = lines[..target]
            .iter()
            .map(|l| l.chars().count() + 1)
            .sum::<usize>()
            + column.min(lines[target].chars().count());
        self.set_caret_offset(offset);
    }

    fn rerender(&mut self, text: String, caret_offset: usize) {
        self.tokens = tokenize(&text);
        self.caret = locate_caret(&self.tokens, caret_offset);
    }
}
