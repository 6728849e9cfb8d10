//! Infrastructure adapters for HTML parsing, configuration, and the clipboard.

pub mod clipboard;
pub mod config;
pub mod html;
