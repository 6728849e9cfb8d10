//! Capture channel: typed request/response messaging between the workbench
//! and the page that owns the markup.
//!
//! The workbench talks to a [`CaptureChannel`]. Messages crossing a process or
//! context boundary are plain JSON; [`relay_message`] and
//! [`handle_page_message`] translate between that wire shape and the typed
//! interface, treating anything malformed as a failed capture.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::app::extract::{PageDocument, extract};
use crate::domain::errors::ClientError;
use crate::domain::model::{ScopeSelection, Snapshot, SnapshotSource};
use crate::infra::html::HtmlPage;

/// Message type accepted by the relay.
pub const CAPTURE_MESSAGE: &str = "captureSnapshot";
/// Message types accepted by the page-side handler.
pub const PAGE_MESSAGES: &[&str] = &["markql_capture", "xsql_capture"];

const GENERIC_CAPTURE_FAILURE: &str = "Capture failed";

/// Requests understood by a capture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaptureRequest {
    #[serde(rename = "captureSnapshot")]
    CaptureSnapshot {
        #[serde(rename = "tabId")]
        tab_id: u32,
        scope: ScopeSelection,
    },
}

/// Successful capture payload as reported by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPage {
    pub scope: Option<ScopeSelection>,
    pub source: SnapshotSource,
    pub html: String,
    pub size_bytes: Option<usize>,
}

/// Reply to a [`CaptureRequest::CaptureSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureReply {
    Captured(CapturedPage),
    Failed { error: String },
}

impl CaptureReply {
    pub fn failed(error: impl Into<String>) -> Self {
        CaptureReply::Failed {
            error: error.into(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        CaptureReply::Captured(CapturedPage {
            scope: Some(snapshot.scope),
            source: snapshot.source,
            size_bytes: Some(snapshot.size_bytes),
            html: snapshot.html,
        })
    }

    /// Decode a wire reply. Anything without `ok: true` and a string `html`
    /// is a failure.
    pub fn from_value(value: &Value) -> Self {
        let ok = value.get("ok").and_then(Value::as_bool) == Some(true);
        let html = value.get("html").and_then(Value::as_str);
        match (ok, html) {
            (true, Some(html)) => CaptureReply::Captured(CapturedPage {
                scope: value
                    .get("scope")
                    .and_then(Value::as_str)
                    .and_then(|scope| scope.parse().ok()),
                source: value
                    .get("source")
                    .and_then(Value::as_str)
                    .map_or(SnapshotSource::Unknown, SnapshotSource::from_tag),
                html: html.to_string(),
                size_bytes: value
                    .get("size_bytes")
                    .and_then(Value::as_u64)
                    .map(|size| size as usize),
            }),
            _ => CaptureReply::failed(
                value
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|error| !error.is_empty())
                    .unwrap_or(GENERIC_CAPTURE_FAILURE),
            ),
        }
    }

    /// Encode as a wire reply.
    pub fn to_value(&self) -> Value {
        match self {
            CaptureReply::Captured(page) => {
                let mut value = json!({
                    "ok": true,
                    "source": page.source.as_str(),
                    "html": page.html,
                    "size_bytes": page.size_bytes.unwrap_or(page.html.len()),
                });
                if let Some(scope) = page.scope {
                    value["scope"] = json!(scope.as_str());
                }
                value
            }
            CaptureReply::Failed { error } => json!({ "ok": false, "error": error }),
        }
    }

    /// Turn the reply into a snapshot, defaulting a missing scope to the one
    /// that was requested.
    pub fn into_snapshot(self, requested: ScopeSelection) -> Result<Snapshot, ClientError> {
        match self {
            CaptureReply::Captured(page) => Ok(Snapshot {
                scope: page.scope.unwrap_or(requested),
                source: page.source,
                size_bytes: page.size_bytes.unwrap_or(page.html.len()),
                html: page.html,
            }),
            CaptureReply::Failed { error } => Err(ClientError::Capture(error)),
        }
    }
}

/// Typed channel to whatever owns the page being captured.
#[async_trait]
pub trait CaptureChannel: Send + Sync {
    /// Identifier of the tab a capture should target.
    async fn active_tab(&self) -> Result<u32, ClientError>;

    /// Deliver a request. `Err` means the request never reached a handler;
    /// handler-side failures come back as [`CaptureReply::Failed`].
    async fn send(&self, request: CaptureRequest) -> Result<CaptureReply, ClientError>;
}

/// Scope named by a wire message; anything but `"full"` means main content.
fn wire_scope(message: &Value) -> ScopeSelection {
    match message.get("scope").and_then(Value::as_str) {
        Some("full") => ScopeSelection::Full,
        _ => ScopeSelection::Main,
    }
}

/// Answer a page-side capture message against `document`. Returns `None`
/// for messages this handler does not own.
pub fn handle_page_message<D: PageDocument>(document: &D, message: &Value) -> Option<Value> {
    let kind = message.get("type").and_then(Value::as_str)?;
    if !PAGE_MESSAGES.contains(&kind) {
        return None;
    }
    let snapshot = extract(document, wire_scope(message));
    Some(CaptureReply::from_snapshot(snapshot).to_value())
}

/// Relay a JSON capture message through `channel`. Returns `None` for
/// messages of other types.
pub async fn relay_message(channel: &dyn CaptureChannel, message: &Value) -> Option<Value> {
    if message.get("type").and_then(Value::as_str) != Some(CAPTURE_MESSAGE) {
        return None;
    }

    let Some(tab_id) = message
        .get("tabId")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
    else {
        return Some(CaptureReply::failed("Invalid tab id").to_value());
    };
    let request = CaptureRequest::CaptureSnapshot {
        tab_id,
        scope: wire_scope(message),
    };

    let reply = match channel.send(request).await {
        Ok(reply) => reply,
        Err(err) => CaptureReply::failed(err.to_string()),
    };
    Some(reply.to_value())
}

/// Where a tab's markup comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    File(PathBuf),
    Url(String),
    Inline(String),
}

impl FromStr for PageSource {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.starts_with("http://") || value.starts_with("https://") {
            Ok(PageSource::Url(value.to_string()))
        } else {
            Ok(PageSource::File(PathBuf::from(value)))
        }
    }
}

impl std::fmt::Display for PageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageSource::File(path) => write!(f, "{}", path.display()),
            PageSource::Url(url) => f.write_str(url),
            PageSource::Inline(_) => f.write_str("<inline>"),
        }
    }
}

/// Capture channel over local files, URLs, or inline markup. Each source is
/// a tab; markup is reloaded on every capture so edits are picked up.
#[derive(Debug)]
pub struct LocalPageChannel {
    tabs: Vec<PageSource>,
    active: Mutex<Option<u32>>,
    installed: Mutex<HashSet<u32>>,
    http: reqwest::Client,
}

impl LocalPageChannel {
    /// Open one tab per source; the first becomes active. Tab ids start at 1.
    pub fn new(sources: Vec<PageSource>) -> Self {
        let active = if sources.is_empty() { None } else { Some(1) };
        Self {
            tabs: sources,
            active: Mutex::new(active),
            installed: Mutex::new(HashSet::new()),
            http: reqwest::Client::new(),
        }
    }

    pub fn tabs(&self) -> impl Iterator<Item = (u32, &PageSource)> {
        self.tabs
            .iter()
            .enumerate()
            .map(|(idx, source)| (idx as u32 + 1, source))
    }

    pub fn set_active(&self, tab_id: u32) -> Result<(), ClientError> {
        self.source(tab_id)?;
        *self.active.lock() = Some(tab_id);
        Ok(())
    }

    fn source(&self, tab_id: u32) -> Result<&PageSource, ClientError> {
        tab_id
            .checked_sub(1)
            .and_then(|idx| self.tabs.get(idx as usize))
            .ok_or_else(|| ClientError::capture(format!("No tab with id {tab_id}")))
    }

    /// Make sure a capture handler is available for the tab. Idempotent.
    pub async fn ensure_handler(&self, tab_id: u32) -> Result<(), ClientError> {
        if self.installed.lock().contains(&tab_id) {
            return Ok(());
        }
        if let PageSource::File(path) = self.source(tab_id)? {
            let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
            if !exists {
                return Err(ClientError::capture(format!(
                    "Could not establish connection: {} not found",
                    path.display()
                )));
            }
        }
        self.installed.lock().insert(tab_id);
        debug!(tab_id, "capture handler installed");
        Ok(())
    }

    /// Current markup of a tab, read fresh from its source.
    pub async fn load_markup(&self, tab_id: u32) -> Result<String, ClientError> {
        match self.source(tab_id)? {
            PageSource::Inline(markup) => Ok(markup.clone()),
            PageSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|err| {
                ClientError::capture(format!("failed to read {}: {err}", path.display()))
            }),
            PageSource::Url(url) => {
                let response = self.http.get(url).send().await.map_err(|err| {
                    warn!(error = %err, url = %url, "page request failed");
                    ClientError::capture(format!("failed to load {url}: {err}"))
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ClientError::capture(format!("HTTP {status} for {url}")));
                }
                response
                    .text()
                    .await
                    .map_err(|err| ClientError::capture(format!("failed to read {url}: {err}")))
            }
        }
    }

    /// Answer one wire message: relay requests go through [`relay_message`],
    /// page-side capture messages run against the active tab. `None` means
    /// the message type is not handled here.
    pub async fn dispatch(&self, message: &Value) -> Option<Value> {
        let kind = message.get("type").and_then(Value::as_str)?;
        if !PAGE_MESSAGES.contains(&kind) {
            return relay_message(self, message).await;
        }

        let markup = match self.active_tab().await {
            Ok(tab_id) => self.load_markup(tab_id).await,
            Err(err) => Err(err),
        };
        match markup {
            Ok(markup) => handle_page_message(&HtmlPage::parse(&markup), message),
            Err(err) => Some(CaptureReply::failed(err.to_string()).to_value()),
        }
    }
}

/// Parse markup and extract the requested scope.
pub fn capture_markup(markup: &str, scope: ScopeSelection) -> Snapshot {
    let page = HtmlPage::parse(markup);
    extract(&page, scope)
}

#[async_trait]
impl CaptureChannel for LocalPageChannel {
    async fn active_tab(&self) -> Result<u32, ClientError> {
        self.active
            .lock()
            .ok_or_else(|| ClientError::capture("No active tab available"))
    }

    async fn send(&self, request: CaptureRequest) -> Result<CaptureReply, ClientError> {
        let CaptureRequest::CaptureSnapshot { tab_id, scope } = request;
        self.ensure_handler(tab_id).await?;
        let markup = self.load_markup(tab_id).await?;
        let snapshot = capture_markup(&markup, scope);
        debug!(
            tab_id,
            scope = %snapshot.scope,
            source = %snapshot.source,
            bytes = snapshot.size_bytes,
            "page captured"
        );
        Ok(CaptureReply::from_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_wire_names() {
        let request = CaptureRequest::CaptureSnapshot {
            tab_id: 7,
            scope: ScopeSelection::Full,
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"type": "captureSnapshot", "tabId": 7, "scope": "full"})
        );
    }

    #[test]
    fn malformed_replies_are_failures() {
        assert_eq!(
            CaptureReply::from_value(&json!({"html": "<p/>"})),
            CaptureReply::failed("Capture failed")
        );
        assert_eq!(
            CaptureReply::from_value(&json!({"ok": true, "html": 5})),
            CaptureReply::failed("Capture failed")
        );
        assert_eq!(
            CaptureReply::from_value(&json!({"ok": false, "error": "boom"})),
            CaptureReply::failed("boom")
        );
    }

    #[test]
    fn reply_without_scope_or_size_defaults_sensibly() {
        let reply = CaptureReply::from_value(&json!({"ok": true, "html": "<p>x</p>"}));
        let snapshot = reply.into_snapshot(ScopeSelection::Full).unwrap();
        assert_eq!(snapshot.scope, ScopeSelection::Full);
        assert_eq!(snapshot.source, SnapshotSource::Unknown);
        assert_eq!(snapshot.size_bytes, 8);
    }

    #[test]
    fn page_handler_accepts_legacy_type_and_normalizes_scope() {
        let page = HtmlPage::parse("<main>m</main>");
        let reply = handle_page_message(&page, &json!({"type": "xsql_capture", "scope": "weird"}))
            .expect("handled");
        assert_eq!(reply["ok"], json!(true));
        assert_eq!(reply["scope"], json!("main"));
        assert_eq!(reply["source"], json!("preferred"));
        assert_eq!(reply["html"], json!("<main>m</main>"));
        assert!(handle_page_message(&page, &json!({"type": "other"})).is_none());
    }

    #[tokio::test]
    async fn relay_wraps_channel_errors() {
        let channel = LocalPageChannel::new(vec![PageSource::File("/no/such/page.html".into())]);
        let reply = relay_message(
            &channel,
            &json!({"type": "captureSnapshot", "tabId": 1, "scope": "full"}),
        )
        .await
        .expect("handled");
        assert_eq!(reply["ok"], json!(false));
        assert!(reply["error"].as_str().unwrap().contains("not found"));

        assert!(relay_message(&channel, &json!({"type": "ping"})).await.is_none());
    }

    #[tokio::test]
    async fn local_channel_captures_inline_pages() {
        let channel = LocalPageChannel::new(vec![
            PageSource::Inline("<p>one</p>".into()),
            PageSource::Inline("<article>two</article>".into()),
        ]);
        assert_eq!(channel.active_tab().await.unwrap(), 1);
        channel.set_active(2).unwrap();
        assert!(channel.set_active(3).is_err());

        let reply = channel
            .send(CaptureRequest::CaptureSnapshot {
                tab_id: 2,
                scope: ScopeSelection::Main,
            })
            .await
            .unwrap();
        let snapshot = reply.into_snapshot(ScopeSelection::Main).unwrap();
        assert_eq!(snapshot.html, "<article>two</article>");
        assert_eq!(snapshot.source, SnapshotSource::Preferred);
    }

    #[tokio::test]
    async fn dispatch_routes_page_and_relay_messages() {
        let channel = LocalPageChannel::new(vec![PageSource::Inline(
            "<body><article>story</article></body>".into(),
        )]);
        let page_reply = channel
            .dispatch(&json!({"type": "markql_capture", "scope": "main"}))
            .await
            .expect("handled");
        assert_eq!(page_reply["html"], json!("<article>story</article>"));

        let relay_reply = channel
            .dispatch(&json!({"type": "captureSnapshot", "tabId": 1, "scope": "full"}))
            .await
            .expect("handled");
        assert_eq!(relay_reply["source"], json!("full"));

        assert!(channel.dispatch(&json!({"type": "ping"})).await.is_none());
        assert!(channel.dispatch(&json!({"tabId": 1})).await.is_none());
    }

    #[tokio::test]
    async fn channel_without_tabs_has_no_active_tab() {
        let channel = LocalPageChannel::new(Vec::new());
        let err = channel.active_tab().await.unwrap_err();
        assert_eq!(err, ClientError::capture("No active tab available"));
    }
}
