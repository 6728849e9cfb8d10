//! Query tokenizer and syntax highlighting.
//!
//! The tokenizer is a single left-to-right scan that never fails and never
//! drops input: concatenating the text of the produced tokens always yields
//! the original query. Styling is layered on top and is purely presentational.

use std::collections::HashSet;

use crossterm::style::{Attribute, Color as TermColor, Stylize};
use once_cell::sync::Lazy;

use crate::domain::model::{Token, TokenKind};

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "AS", "LIMIT", "ORDER", "BY", "ASC",
        "DESC", "EXISTS", "IS", "NULL", "CONTAINS", "ANY", "ALL", "TO", "TABLE", "LIST", "RAW",
        "FRAGMENTS", "ON", "OFF",
    ]
    .into_iter()
    .collect()
});

static FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "TEXT",
        "INNER_HTML",
        "RAW_INNER_HTML",
        "FLATTEN",
        "FLATTEN_TEXT",
        "PROJECT",
        "FLATTEN_EXTRACT",
        "COALESCE",
        "ATTR",
        "COUNT",
        "SUMMARIZE",
        "TFIDF",
        "TRIM",
        "HAS_DIRECT_TEXT",
    ]
    .into_iter()
    .collect()
});

const PUNCTUATION: &[char] = &['(', ')', ',', '.', ';'];
const OPERATOR_CHARS: &[char] = &['<', '>', '~', '=', ':', '+', '-', '*', '/'];

/// Whether `word` belongs to the keyword vocabulary (case-insensitive).
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

/// Whether `word` belongs to the function vocabulary (case-insensitive).
pub fn is_function(word: &str) -> bool {
    FUNCTIONS.contains(word.to_ascii_uppercase().as_str())
}

/// Split query text into classified tokens.
pub fn tokenize(query: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = query.char_indices().collect();
    let len = chars.len();
    let byte_at = |idx: usize| chars.get(idx).map_or(query.len(), |(pos, _)| *pos);
    let char_at = |idx: usize| chars.get(idx).map(|(_, ch)| *ch);

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < len {
        let ch = chars[i].1;
        let next = char_at(i + 1);

        let (kind, end) = if ch == '-' && next == Some('-') {
            let mut j = i + 2;
            while j < len && chars[j].1 != '\n' {
                j += 1;
            }
            (TokenKind::Comment, j)
        } else if ch == '/' && next == Some('*') {
            let mut j = i + 2;
            while j + 1 < len && !(chars[j].1 == '*' && chars[j + 1].1 == '/') {
                j += 1;
            }
            (TokenKind::Comment, (j + 2).min(len))
        } else if ch == '\'' {
            let mut j = i + 1;
            while j < len {
                if chars[j].1 == '\'' {
                    if char_at(j + 1) == Some('\'') {
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                j += 1;
            }
            (TokenKind::String, j)
        } else if ch.is_whitespace() {
            (TokenKind::Whitespace, i + 1)
        } else if PUNCTUATION.contains(&ch) {
            (TokenKind::Punctuation, i + 1)
        } else if OPERATOR_CHARS.contains(&ch) {
            let mut j = i + 1;
            while j < len && OPERATOR_CHARS.contains(&chars[j].1) {
                j += 1;
            }
            (TokenKind::Operator, j)
        } else if ch.is_ascii_digit() {
            let mut j = i + 1;
            while j < len && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                j += 1;
            }
            (TokenKind::Number, j)
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let mut j = i + 1;
            while j < len && (chars[j].1.is_ascii_alphanumeric() || chars[j].1 == '_') {
                j += 1;
            }
            let word = &query[byte_at(i)..byte_at(j)];
            let kind = if is_keyword(word) {
                TokenKind::Keyword
            } else if is_function(word) {
                TokenKind::Function
            } else {
                TokenKind::Identifier
            };
            (kind, j)
        } else {
            (TokenKind::Other, i + 1)
        };

        tokens.push(Token::new(kind, &query[byte_at(i)..byte_at(end)]));
        i = end;
    }
    tokens
}

/// Concatenate token texts back into the plain query.
pub fn plain_text(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.text.as_str()).collect()
}

/// Escape text for embedding in markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// CSS class used when rendering a token kind as markup, if any.
pub fn css_class(kind: TokenKind) -> Option<&'static str> {
    match kind {
        TokenKind::Comment => Some("sql-comment"),
        TokenKind::String => Some("sql-str"),
        TokenKind::Operator | TokenKind::Punctuation => Some("sql-op"),
        TokenKind::Number => Some("sql-num"),
        TokenKind::Keyword => Some("sql-kw"),
        TokenKind::Function => Some("sql-fn"),
        TokenKind::Identifier | TokenKind::Whitespace | TokenKind::Other => None,
    }
}

/// Render tokens as escaped markup with `<span class="sql-…">` wrappers.
pub fn render_markup(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let escaped = escape_html(&token.text);
        match css_class(token.kind) {
            Some(class) => {
                out.push_str("<span class=\"");
                out.push_str(class);
                out.push_str("\">");
                out.push_str(&escaped);
                out.push_str("</span>");
            }
            None => out.push_str(&escaped),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HighlightAttributes {
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HighlightStyle {
    pub foreground: Option<RgbColor>,
    pub attributes: HighlightAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub content: String,
    pub kind: TokenKind,
    pub style: HighlightStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightLine {
    pub spans: Vec<HighlightSpan>,
}

/// Maps token kinds onto terminal styles.
#[derive(Debug, Clone, Default)]
pub struct Highlighter;

impl Highlighter {
    pub fn new() -> Self {
        Self
    }

    pub fn style_for(&self, kind: TokenKind) -> HighlightStyle {
        let (color, bold, italic) = match kind {
            TokenKind::Comment => (Some(RgbColor::new(98, 114, 164)), false, true),
            TokenKind::String => (Some(RgbColor::new(241, 250, 140)), false, false),
            TokenKind::Operator | TokenKind::Punctuation => {
                (Some(RgbColor::new(255, 121, 198)), false, false)
            }
            TokenKind::Number => (Some(RgbColor::new(189, 147, 249)), false, false),
            TokenKind::Keyword => (Some(RgbColor::new(139, 233, 253)), true, false),
            TokenKind::Function => (Some(RgbColor::new(80, 250, 123)), false, false),
            TokenKind::Identifier | TokenKind::Whitespace | TokenKind::Other => {
                (None, false, false)
            }
        };
        HighlightStyle {
            foreground: color,
            attributes: HighlightAttributes { bold, italic },
        }
    }

    /// Split a token stream into styled lines. Tokens spanning a newline
    /// (block comments, strings) are cut at each line break.
    pub fn highlight_lines(&self, tokens: &[Token]) -> Vec<HighlightLine> {
        let mut lines = vec![HighlightLine::default()];
        for token in tokens {
            let style = self.style_for(token.kind);
            for (idx, piece) in token.text.split('\n').enumerate() {
                if idx > 0 {
                    lines.push(HighlightLine::default());
                }
                if piece.is_empty() {
                    continue;
                }
                if let Some(line) = lines.last_mut() {
                    line.spans.push(HighlightSpan {
                        content: piece.to_string(),
                        kind: token.kind,
                        style,
                    });
                }
            }
        }
        lines
    }

    /// Render a query with ANSI colors for terminal output.
    pub fn render_ansi(&self, query: &str) -> String {
        let mut out = String::new();
        for token in tokenize(query) {
            let style = self.style_for(token.kind);
            let Some(color) = style.foreground else {
                out.push_str(&token.text);
                continue;
            };
            let mut styled = token.text.as_str().with(TermColor::Rgb {
                r: color.r,
                g: color.g,
                b: color.b,
            });
            if style.attributes.bold {
                styled = styled.attribute(Attribute::Bold);
            }
            if style.attributes.italic {
                styled = styled.attribute(Attribute::Italic);
            }
            out.push_str(&styled.to_string());
        }
        out
    }
}
