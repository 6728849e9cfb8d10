//! Clipboard sinks for exported results.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use tracing::debug;

/// Destination for copied text.
pub trait ClipboardSink {
    fn copy(&mut self, text: &str) -> Result<()>;
}

/// System clipboard with fallbacks to shell utilities for headless sessions.
pub struct SystemClipboard {
    primary: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let primary = arboard::Clipboard::new().ok();
        Self { primary }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardSink for SystemClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        if let Some(primary) = self.primary.as_mut()
            && primary.set_text(text.to_owned()).is_ok()
        {
            return Ok(());
        }

        // Once arboard fails it stays failed for this session.
        self.primary = None;
        fallback_copy(text)
    }
}

fn fallback_copy(text: &str) -> Result<()> {
    for command in fallback_commands() {
        match pipe_to_command(command, text) {
            Ok(()) => return Ok(()),
            Err(err) => debug!(command = command[0], error = %err, "clipboard fallback failed"),
        }
    }

    Err(anyhow!("no clipboard backend accepted the text"))
}

fn pipe_to_command(command: &[&str], text: &str) -> Result<()> {
    let (program, args) = command
        .split_first()
        .context("clipboard command missing program")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn clipboard command: {program}"))?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(text.as_bytes())
            .context("failed to write clipboard contents")?;
    }

    let status = child
        .wait()
        .with_context(|| format!("clipboard command did not exit cleanly: {program}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("{program} exited with status {status}"))
    }
}

#[cfg(target_os = "macos")]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![&["pbcopy"]]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![&["wl-copy"], &["xclip", "-selection", "clipboard"]]
}

#[cfg(target_os = "windows")]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![&["powershell.exe", "-NoProfile", "-Command", "Set-Clipboard"]]
}

#[cfg(not(any(unix, target_os = "windows")))]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    Vec::new()
}

/// Keeps every copied text in memory. Clones share the same history.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    copies: Arc<Mutex<Vec<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<String> {
        self.copies.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.copies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.lock().is_empty()
    }
}

impl ClipboardSink for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        self.copies.lock().push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clipboard_shares_history_between_clones() {
        let observer = MemoryClipboard::new();
        let mut sink = observer.clone();
        sink.copy("a,b").unwrap();
        sink.copy("c").unwrap();
        assert_eq!(observer.len(), 2);
        assert_eq!(observer.last().as_deref(), Some("c"));
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(pipe_to_command(&["markql-no-such-clipboard-tool"], "x").is_err());
    }
}
