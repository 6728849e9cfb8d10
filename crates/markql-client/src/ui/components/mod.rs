//! Collection of reusable TUI components.

pub mod controls;
pub mod query_editor;
pub mod results;
