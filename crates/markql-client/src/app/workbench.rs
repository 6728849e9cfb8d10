//! Capture/query orchestration.
//!
//! The [`Workbench`] owns the current snapshot and result, the query editor
//! and the option inputs. Every user-triggered action runs through
//! [`Workbench::trigger`], which holds the [`ActionGate`] for the duration of
//! the action and turns failures into a status line.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::app::agent::{AgentClient, OptionBounds, QueryOptions, QueryRequest};
use crate::app::capture::{CaptureChannel, CaptureRequest};
use crate::app::editor::QueryEditor;
use crate::app::export::{ExportFormat, ExportOptions, ExportResult, Exporter};
use crate::app::session::{
    KEY_QUERY, KEY_SNAPSHOT_HTML, KEY_SNAPSHOT_SCOPE, KEY_TOKEN, LEGACY_KEY_QUERY,
    LEGACY_KEY_SNAPSHOT_HTML, LEGACY_KEY_TOKEN, SessionCache, SettingsStore,
};
use crate::domain::errors::{ClientError, ExportError, ValidationError};
use crate::domain::model::{QueryResult, ScopeSelection, Snapshot, SnapshotSource};
use crate::infra::clipboard::ClipboardSink;
use crate::infra::config::Config;

pub const TOKEN_HELP_MISSING: &str = "Start MarkQL agent and copy token from terminal output.";
pub const TOKEN_HELP_REPLACE: &str = "Paste a new token and save.";
pub const STATUS_READY: &str = "Ready.";

/// User-triggered actions. All of them share one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Capture,
    RunQuery,
    CopyCsv,
    CopyJson,
    SaveToken,
}

/// Mutual exclusion over user actions. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct ActionGate {
    busy: Arc<AtomicBool>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or fail with [`ClientError::Busy`] while another
    /// action holds it.
    pub fn try_acquire(&self) -> Result<ActionGuard, ClientError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy)?;
        Ok(ActionGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held while an action runs; releases the gate when dropped.
#[derive(Debug)]
pub struct ActionGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Visibility and help text of the token input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEditor {
    pub visible: bool,
    pub help: &'static str,
}

impl TokenEditor {
    /// Editor state for `token`. Without a token the editor is always open.
    /// Help text is shown only while it is open.
    fn for_token(token: &str, open: bool) -> Self {
        if token.trim().is_empty() {
            Self {
                visible: true,
                help: TOKEN_HELP_MISSING,
            }
        } else if open {
            Self {
                visible: true,
                help: TOKEN_HELP_REPLACE,
            }
        } else {
            Self {
                visible: false,
                help: "",
            }
        }
    }
}

/// Tunables that normally come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkbenchOptions {
    pub primary_scope: ScopeSelection,
    pub fallback_scope: ScopeSelection,
    pub max_rows: OptionBounds,
    pub timeout_ms: OptionBounds,
}

impl Default for WorkbenchOptions {
    fn default() -> Self {
        Self {
            primary_scope: ScopeSelection::Full,
            fallback_scope: ScopeSelection::Main,
            max_rows: OptionBounds::MAX_ROWS,
            timeout_ms: OptionBounds::TIMEOUT_MS,
        }
    }
}

impl WorkbenchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            primary_scope: config.capture.primary_scope(),
            fallback_scope: config.capture.fallback_scope(),
            max_rows: config.query.max_rows(),
            timeout_ms: config.query.timeout_ms(),
        }
    }
}

/// External collaborators of a [`Workbench`].
pub struct Collaborators {
    pub channel: Box<dyn CaptureChannel>,
    pub agent: Box<dyn AgentClient>,
    pub settings: Box<dyn SettingsStore>,
    pub session: Box<dyn SessionCache>,
    pub clipboard: Box<dyn ClipboardSink>,
}

pub struct Workbench {
    channel: Box<dyn CaptureChannel>,
    agent: Box<dyn AgentClient>,
    settings: Box<dyn SettingsStore>,
    session: Box<dyn SessionCache>,
    exporter: Exporter,
    options: WorkbenchOptions,
    gate: ActionGate,
    snapshot: Option<Snapshot>,
    result: Option<QueryResult>,
    status: String,
    token_editor: TokenEditor,
    pub token: String,
    pub editor: QueryEditor,
    pub max_rows_input: String,
    pub timeout_input: String,
}

impl Workbench {
    pub fn new(parts: Collaborators, options: WorkbenchOptions) -> Self {
        Self {
            channel: parts.channel,
            agent: parts.agent,
            settings: parts.settings,
            session: parts.session,
            exporter: Exporter::new(parts.clipboard),
            options,
            gate: ActionGate::new(),
            snapshot: None,
            result: None,
            status: STATUS_READY.to_string(),
            token_editor: TokenEditor::for_token("", true),
            token: String::new(),
            editor: QueryEditor::new(),
            max_rows_input: options.max_rows.default.to_string(),
            timeout_input: options.timeout_ms.default.to_string(),
        }
    }

    /// Share an externally created gate, e.g. with a UI thread.
    pub fn with_gate(mut self, gate: ActionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    /// Controls are usable only while no action runs.
    pub fn controls_enabled(&self) -> bool {
        !self.gate.is_held()
    }

    pub fn options(&self) -> &WorkbenchOptions {
        &self.options
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn token_editor(&self) -> &TokenEditor {
        &self.token_editor
    }

    /// Reveal the token input so a new token can be pasted.
    pub fn edit_token(&mut self) {
        self.token_editor = TokenEditor::for_token(&self.token, true);
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        debug!(status = %self.status, "status updated");
    }

    /// Run `action` with the gate held. Failures become an `Error: ...`
    /// status and are returned to the caller as well.
    pub async fn trigger(&mut self, action: Action) -> Result<(), ClientError> {
        let _guard = self.gate.try_acquire()?;
        let outcome = match action {
            Action::Capture => self.capture(true).await.map(|_| ()),
            Action::RunQuery => self.run_query().await,
            Action::CopyCsv => self.copy_export(ExportFormat::Csv).map(|_| ()),
            Action::CopyJson => self.copy_export(ExportFormat::Json).map(|_| ()),
            Action::SaveToken => self.save_token().await,
        };
        if let Err(err) = &outcome {
            warn!(?action, error = %err, "action failed");
            self.set_status(format!("Error: {err}"));
        }
        outcome
    }

    /// Load persisted token, query, and session snapshot, migrating values
    /// stored under legacy keys.
    pub async fn restore(&mut self) -> Result<(), ClientError> {
        if let Some(token) = self.load_setting(KEY_TOKEN, LEGACY_KEY_TOKEN).await? {
            self.token = token;
        }
        if let Some(query) = self.load_setting(KEY_QUERY, LEGACY_KEY_QUERY).await? {
            self.editor.set_text(&query);
        }
        self.token_editor = TokenEditor::for_token(&self.token, false);

        let status = match self.restore_snapshot().await {
            Some((bytes, scope)) => format!(
                "Restored cached snapshot ({bytes} bytes, scope={}).",
                scope.map_or("unknown", |scope| scope.as_str())
            ),
            None => STATUS_READY.to_string(),
        };
        self.set_status(status);
        Ok(())
    }

    async fn load_setting(&self, key: &str, legacy: &str) -> Result<Option<String>, ClientError> {
        let current = self.settings.get(key).await.map_err(ClientError::storage)?;
        if let Some(value) = current.filter(|value| !value.is_empty()) {
            return Ok(Some(value));
        }

        let legacy_value = self
            .settings
            .get(legacy)
            .await
            .map_err(ClientError::storage)?
            .filter(|value| !value.is_empty());
        if let Some(value) = &legacy_value {
            info!(key, legacy, "migrating legacy setting");
            self.settings
                .set(key, value)
                .await
                .map_err(ClientError::storage)?;
        }
        Ok(legacy_value)
    }

    /// Returns the restored size and scope; an html without a known scope is
    /// reported but not kept, so the next query captures afresh.
    async fn restore_snapshot(&mut self) -> Option<(usize, Option<ScopeSelection>)> {
        let html = match self.session_value(KEY_SNAPSHOT_HTML).await {
            Some(html) => html,
            None => {
                let legacy = self.session_value(LEGACY_KEY_SNAPSHOT_HTML).await?;
                if let Err(err) = self
                    .session
                    .set_many(&[(KEY_SNAPSHOT_HTML, legacy.as_str())])
                    .await
                {
                    warn!(error = %err, "failed to migrate legacy session snapshot");
                }
                legacy
            }
        };
        let scope = self
            .session_value(KEY_SNAPSHOT_SCOPE)
            .await
            .and_then(|scope| scope.parse::<ScopeSelection>().ok());

        let bytes = html.len();
        if let Some(scope) = scope {
            self.snapshot = Some(Snapshot::new(html, scope, SnapshotSource::Unknown));
        }
        Some((bytes, scope))
    }

    async fn session_value(&self, key: &str) -> Option<String> {
        match self.session.get(key).await {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(err) => {
                warn!(key, error = %err, "session cache read failed");
                None
            }
        }
    }

    /// Return the cached primary-scope snapshot, or capture a new one. A
    /// forced capture always asks the page.
    pub async fn capture(&mut self, force: bool) -> Result<&Snapshot, ClientError> {
        let primary = self.options.primary_scope;
        let fallback = self.options.fallback_scope;
        let cached = !force
            && self
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.scope == primary && !snapshot.html.is_empty());

        if !cached {
            self.set_status(format!("Capturing {primary} snapshot..."));
            let tab_id = self.channel.active_tab().await?;

            let snapshot = match self.request_snapshot(tab_id, primary).await {
                Ok(snapshot) => snapshot,
                Err(err) if fallback != primary => {
                    warn!(tab_id, scope = %primary, error = %err, "capture failed, retrying");
                    self.set_status(format!(
                        "{} capture failed, retrying {fallback}...",
                        title_case(primary)
                    ));
                    self.request_snapshot(tab_id, fallback).await?
                }
                Err(err) => return Err(err),
            };

            let cached_ok = self.persist_snapshot(&snapshot).await;
            self.set_status(format!(
                "Captured {} bytes ({}/{}){}.",
                snapshot.size_bytes,
                snapshot.scope,
                snapshot.source,
                if cached_ok { "" } else { " | cache skipped" }
            ));
            info!(
                tab_id,
                scope = %snapshot.scope,
                source = %snapshot.source,
                bytes = snapshot.size_bytes,
                "snapshot captured"
            );
            self.snapshot = Some(snapshot);
        }

        self.snapshot
            .as_ref()
            .ok_or_else(|| ClientError::capture("Capture failed"))
    }

    async fn request_snapshot(
        &self,
        tab_id: u32,
        scope: ScopeSelection,
    ) -> Result<Snapshot, ClientError> {
        self.channel
            .send(CaptureRequest::CaptureSnapshot { tab_id, scope })
            .await?
            .into_snapshot(scope)
    }

    /// Best effort; a failure is logged and reported as `cache skipped`.
    async fn persist_snapshot(&self, snapshot: &Snapshot) -> bool {
        let entries = [
            (KEY_SNAPSHOT_HTML, snapshot.html.as_str()),
            (KEY_SNAPSHOT_SCOPE, snapshot.scope.as_str()),
        ];
        match self.session.set_many(&entries).await {
            Ok(()) => true,
            Err(err) => {
                warn!(bytes = snapshot.size_bytes, error = %err, "snapshot not cached");
                false
            }
        }
    }

    /// Options from the current inputs, clamped into range.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            max_rows: self.options.max_rows.clamp_input(&self.max_rows_input),
            timeout_ms: self.options.timeout_ms.clamp_input(&self.timeout_input),
        }
    }

    /// Validate inputs, make sure a snapshot exists, and run the query
    /// through the agent.
    pub async fn run_query(&mut self) -> Result<(), ClientError> {
        let token = self.token.trim().to_string();
        if token.is_empty() {
            self.token_editor = TokenEditor::for_token("", true);
            return Err(ValidationError::MissingToken.into());
        }
        let query = self.editor.text().trim().to_string();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        self.settings
            .set(KEY_QUERY, &query)
            .await
            .map_err(ClientError::storage)?;

        let snapshot = self.capture(false).await?;
        let (html, snapshot_bytes) = (snapshot.html.clone(), snapshot.size_bytes);

        let options = self.query_options();
        self.max_rows_input = options.max_rows.to_string();
        self.timeout_input = options.timeout_ms.to_string();

        self.set_status("Running query...");
        let request = QueryRequest {
            html,
            query,
            options,
        };
        let result = self.agent.query(&token, &request).await?;

        let mut status = format!(
            "Snapshot {snapshot_bytes} bytes | elapsed {} ms | rows {}",
            result.elapsed_ms,
            result.rows.len()
        );
        if result.truncated {
            status.push_str(" (truncated)");
        }
        if let Some(error) = &result.error {
            status.push_str(&format!(" error={}", error.message));
        }
        self.set_status(status);
        self.result = Some(result);
        Ok(())
    }

    /// Render the current result without side effects.
    pub fn build_export(&self, format: ExportFormat) -> Result<String, ClientError> {
        let result = self
            .result
            .as_ref()
            .ok_or(ExportError::NoResult)?;
        Ok(format.render(result))
    }

    /// Copy the current result to the clipboard.
    pub fn copy_export(&mut self, format: ExportFormat) -> Result<ExportResult, ClientError> {
        let mut options = ExportOptions::new(format);
        options.copy_to_clipboard = true;
        let exported = self.exporter.export(self.result.as_ref(), &options)?;
        self.set_status(format!("Copied {} ({} rows).", format.label(), exported.rows));
        Ok(exported)
    }

    /// Write the current result to a file.
    pub fn export_to_file(
        &mut self,
        format: ExportFormat,
        path: impl Into<std::path::PathBuf>,
    ) -> Result<ExportResult, ClientError> {
        let mut options = ExportOptions::new(format);
        options.output_path = Some(path.into());
        let exported = self.exporter.export(self.result.as_ref(), &options)?;
        if let Some(path) = &exported.output_path {
            self.set_status(format!(
                "Saved {} ({} rows) to {}.",
                format.label(),
                exported.rows,
                path.display()
            ));
        }
        Ok(exported)
    }

    /// Persist the trimmed token. Saving an empty token clears the stored one
    /// and reopens the token editor.
    pub async fn save_token(&mut self) -> Result<(), ClientError> {
        let token = self.token.trim().to_string();
        self.settings
            .set(KEY_TOKEN, &token)
            .await
            .map_err(ClientError::storage)?;
        if token.is_empty() {
            self.token.clear();
            self.token_editor = TokenEditor::for_token("", true);
            return Ok(());
        }
        self.token_editor = TokenEditor::for_token(&token, false);
        self.token = token;
        self.set_status("Token saved.");
        Ok(())
    }
}

fn title_case(scope: ScopeSelection) -> &'static str {
    match scope {
        ScopeSelection::Full => "Full",
        ScopeSelection::Main => "Main",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::capture::CaptureReply;
    use crate::app::session::{MemorySessionCache, MemorySettingsStore};
    use crate::domain::model::Column;
    use crate::infra::clipboard::MemoryClipboard;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ChannelLog {
        requests: Vec<CaptureRequest>,
        gate_held: Vec<bool>,
    }

    struct FakeChannel {
        replies: Mutex<VecDeque<Result<CaptureReply, ClientError>>>,
        log: Arc<Mutex<ChannelLog>>,
        gate: ActionGate,
    }

    #[async_trait]
    impl CaptureChannel for FakeChannel {
        async fn active_tab(&self) -> Result<u32, ClientError> {
            Ok(3)
        }

        async fn send(&self, request: CaptureRequest) -> Result<CaptureReply, ClientError> {
            let mut log = self.log.lock();
            log.requests.push(request);
            log.gate_held.push(self.gate.is_held());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::capture("no scripted reply")))
        }
    }

    struct FakeAgent {
        requests: Arc<Mutex<Vec<(String, QueryRequest)>>>,
        reply: Result<QueryResult, ClientError>,
    }

    #[async_trait]
    impl AgentClient for FakeAgent {
        async fn query(
            &self,
            token: &str,
            request: &QueryRequest,
        ) -> Result<QueryResult, ClientError> {
            self.requests
                .lock()
                .push((token.to_string(), request.clone()));
            self.reply.clone()
        }
    }

    struct Harness {
        workbench: Workbench,
        channel_log: Arc<Mutex<ChannelLog>>,
        agent_requests: Arc<Mutex<Vec<(String, QueryRequest)>>>,
        clipboard: MemoryClipboard,
    }

    fn captured(html: &str, scope: &str, source: &str) -> Result<CaptureReply, ClientError> {
        Ok(CaptureReply::from_value(&json!({
            "ok": true, "scope": scope, "source": source, "html": html
        })))
    }

    fn sample_result() -> QueryResult {
        QueryResult {
            columns: vec![Column::new("tag"), Column::new("text")],
            rows: vec![vec![json!("a"), json!("x,y")], vec![json!("p")]],
            elapsed_ms: 4,
            ..QueryResult::default()
        }
    }

    fn harness_with(
        replies: Vec<Result<CaptureReply, ClientError>>,
        session: MemorySessionCache,
        settings: MemorySettingsStore,
    ) -> Harness {
        let gate = ActionGate::new();
        let channel_log = Arc::new(Mutex::new(ChannelLog::default()));
        let agent_requests = Arc::new(Mutex::new(Vec::new()));
        let clipboard = MemoryClipboard::new();
        let parts = Collaborators {
            channel: Box::new(FakeChannel {
                replies: Mutex::new(replies.into()),
                log: Arc::clone(&channel_log),
                gate: gate.clone(),
            }),
            agent: Box::new(FakeAgent {
                requests: Arc::clone(&agent_requests),
                reply: Ok(sample_result()),
            }),
            settings: Box::new(settings),
            session: Box::new(session),
            clipboard: Box::new(clipboard.clone()),
        };
        Harness {
            workbench: Workbench::new(parts, WorkbenchOptions::default()).with_gate(gate),
            channel_log,
            agent_requests,
            clipboard,
        }
    }

    fn harness(replies: Vec<Result<CaptureReply, ClientError>>) -> Harness {
        harness_with(
            replies,
            MemorySessionCache::new(1 << 20),
            MemorySettingsStore::new(),
        )
    }

    #[tokio::test]
    async fn cached_full_snapshot_skips_capture() {
        let mut h = harness(vec![captured("<html>1</html>", "full", "full")]);
        h.workbench.capture(false).await.unwrap();
        let again = h.workbench.capture(false).await.unwrap().clone();
        assert_eq!(again.html, "<html>1</html>");
        assert_eq!(h.channel_log.lock().requests.len(), 1);
    }

    #[tokio::test]
    async fn forced_capture_always_requests() {
        let mut h = harness(vec![
            captured("<html>1</html>", "full", "full"),
            captured("<html>2</html>", "full", "full"),
        ]);
        h.workbench.capture(false).await.unwrap();
        h.workbench.trigger(Action::Capture).await.unwrap();
        assert_eq!(h.workbench.snapshot().unwrap().html, "<html>2</html>");
        assert_eq!(h.channel_log.lock().requests.len(), 2);
    }

    #[tokio::test]
    async fn failed_full_capture_retries_main_once() {
        let mut h = harness(vec![
            Ok(CaptureReply::failed("frame blocked")),
            captured("<main>m</main>", "main", "preferred"),
        ]);
        let snapshot = h.workbench.capture(true).await.unwrap().clone();
        assert_eq!(snapshot.scope, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::Preferred);

        let log = h.channel_log.lock();
        assert_eq!(
            log.requests,
            vec![
                CaptureRequest::CaptureSnapshot {
                    tab_id: 3,
                    scope: ScopeSelection::Full
                },
                CaptureRequest::CaptureSnapshot {
                    tab_id: 3,
                    scope: ScopeSelection::Main
                },
            ]
        );
        drop(log);
        assert_eq!(
            h.workbench.status(),
            "Captured 14 bytes (main/preferred)."
        );
    }

    #[tokio::test]
    async fn fallback_failure_is_final() {
        let mut h = harness(vec![
            Err(ClientError::capture("no handler")),
            Ok(CaptureReply::failed("still broken")),
        ]);
        let err = h.workbench.trigger(Action::Capture).await.unwrap_err();
        assert_eq!(err, ClientError::capture("still broken"));
        assert_eq!(h.workbench.status(), "Error: still broken");
        assert_eq!(h.channel_log.lock().requests.len(), 2);
        assert!(h.workbench.snapshot().is_none());
    }

    #[tokio::test]
    async fn malformed_reply_counts_as_failure() {
        let mut h = harness(vec![
            Ok(CaptureReply::from_value(&json!({"ok": true, "html": 42}))),
            captured("<main/>", "main", "preferred"),
        ]);
        let snapshot = h.workbench.capture(true).await.unwrap();
        assert_eq!(snapshot.scope, ScopeSelection::Main);
    }

    #[tokio::test]
    async fn cache_quota_failure_is_not_a_capture_failure() {
        let mut h = harness_with(
            vec![captured("<html>large enough</html>", "full", "full")],
            MemorySessionCache::new(8),
            MemorySettingsStore::new(),
        );
        h.workbench.trigger(Action::Capture).await.unwrap();
        assert_eq!(
            h.workbench.status(),
            "Captured 25 bytes (full/full) | cache skipped."
        );
        assert!(h.workbench.snapshot().is_some());
    }

    #[tokio::test]
    async fn run_query_validates_before_any_io() {
        let mut h = harness(vec![]);
        h.workbench.editor.set_text("SELECT a FROM doc");
        let err = h.workbench.trigger(Action::RunQuery).await.unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::MissingToken));
        assert!(h.workbench.token_editor().visible);

        h.workbench.token = "secret".into();
        h.workbench.editor.set_text("   \n ");
        let err = h.workbench.trigger(Action::RunQuery).await.unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::EmptyQuery));
        assert_eq!(h.workbench.status(), "Error: Query is required");

        assert!(h.channel_log.lock().requests.is_empty());
        assert!(h.agent_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn run_query_captures_clamps_and_stores_result() {
        let settings = MemorySettingsStore::new();
        let mut h = harness_with(
            vec![captured("<html>doc</html>", "full", "full")],
            MemorySessionCache::new(1 << 20),
            settings,
        );
        h.workbench.token = "  secret ".into();
        h.workbench.editor.set_text("SELECT a FROM doc ");
        h.workbench.max_rows_input = "-5".into();
        h.workbench.timeout_input = "abc".into();

        h.workbench.trigger(Action::RunQuery).await.unwrap();

        let requests = h.agent_requests.lock();
        let (token, request) = &requests[0];
        assert_eq!(token, "secret");
        assert_eq!(request.query, "SELECT a FROM doc");
        assert_eq!(request.html, "<html>doc</html>");
        assert_eq!(request.options.max_rows, 1);
        assert_eq!(request.options.timeout_ms, 5000);
        drop(requests);

        assert_eq!(h.workbench.max_rows_input, "1");
        assert_eq!(h.workbench.result().unwrap().rows.len(), 2);
        assert_eq!(
            h.workbench.status(),
            "Snapshot 16 bytes | elapsed 4 ms | rows 2"
        );
        assert_eq!(h.channel_log.lock().gate_held, vec![true]);
        assert!(h.workbench.controls_enabled());
        assert_eq!(
            h.workbench.settings.get(KEY_QUERY).await.unwrap().as_deref(),
            Some("SELECT a FROM doc")
        );
    }

    #[tokio::test]
    async fn matching_fallback_scope_skips_retry() {
        let mut h = harness(vec![
            Ok(CaptureReply::failed("frame blocked")),
            captured("<main>m</main>", "full", "full"),
        ]);
        h.workbench.options.fallback_scope = ScopeSelection::Full;

        let err = h.workbench.capture(true).await.unwrap_err();
        assert_eq!(err, ClientError::capture("frame blocked"));
        assert_eq!(
            h.channel_log.lock().requests,
            vec![CaptureRequest::CaptureSnapshot {
                tab_id: 3,
                scope: ScopeSelection::Full
            }]
        );
        assert!(h.workbench.snapshot().is_none());
    }

    #[tokio::test]
    async fn empty_cached_snapshot_is_recaptured() {
        let mut h = harness(vec![
            captured("", "full", "empty"),
            captured("<html>2</html>", "full", "full"),
        ]);
        h.workbench.capture(false).await.unwrap();
        let again = h.workbench.capture(false).await.unwrap().clone();
        assert_eq!(again.html, "<html>2</html>");
        assert_eq!(h.channel_log.lock().requests.len(), 2);
    }

    #[tokio::test]
    async fn busy_gate_rejects_actions() {
        let mut h = harness(vec![captured("<html/>", "full", "full")]);
        let guard = h.workbench.gate().try_acquire().unwrap();
        assert!(!h.workbench.controls_enabled());
        assert_eq!(
            h.workbench.trigger(Action::Capture).await,
            Err(ClientError::Busy)
        );
        drop(guard);
        assert!(h.workbench.trigger(Action::Capture).await.is_ok());
    }

    #[tokio::test]
    async fn copy_requires_result_then_copies_csv() {
        let mut h = harness(vec![captured("<html/>", "full", "full")]);
        let err = h.workbench.trigger(Action::CopyCsv).await.unwrap_err();
        assert_eq!(h.workbench.status(), "Error: No query result to export");
        assert!(matches!(err, ClientError::Export(_)));
        assert!(h.clipboard.is_empty());

        h.workbench.token = "t".into();
        h.workbench.editor.set_text("SELECT a FROM doc");
        h.workbench.trigger(Action::RunQuery).await.unwrap();
        h.workbench.trigger(Action::CopyCsv).await.unwrap();
        assert_eq!(h.workbench.status(), "Copied CSV (2 rows).");
        assert_eq!(h.clipboard.last().as_deref(), Some("tag,text\na,\"x,y\"\np,"));

        h.workbench.trigger(Action::CopyJson).await.unwrap();
        assert_eq!(h.workbench.status(), "Copied JSON (2 rows).");
    }

    #[tokio::test]
    async fn restore_migrates_legacy_keys() {
        let settings = MemorySettingsStore::with_values([
            (LEGACY_KEY_TOKEN, "old-token"),
            (KEY_QUERY, "SELECT p FROM doc"),
            (LEGACY_KEY_QUERY, "SELECT ignored FROM doc"),
        ]);
        let session = MemorySessionCache::new(1 << 20);
        session
            .set_many(&[(LEGACY_KEY_SNAPSHOT_HTML, "<p>cached</p>")])
            .await
            .unwrap();
        let mut h = harness_with(vec![], session, settings);

        h.workbench.restore().await.unwrap();
        assert_eq!(h.workbench.token, "old-token");
        assert_eq!(h.workbench.editor.text(), "SELECT p FROM doc");
        assert!(!h.workbench.token_editor().visible);
        assert_eq!(
            h.workbench.status(),
            "Restored cached snapshot (13 bytes, scope=unknown)."
        );
        assert!(h.workbench.snapshot().is_none());
        assert_eq!(
            h.workbench.settings.get(KEY_TOKEN).await.unwrap().as_deref(),
            Some("old-token")
        );
        assert_eq!(
            h.workbench
                .session
                .get(KEY_SNAPSHOT_HTML)
                .await
                .unwrap()
                .as_deref(),
            Some("<p>cached</p>")
        );
    }

    #[tokio::test]
    async fn restored_full_snapshot_is_reused() {
        let session = MemorySessionCache::new(1 << 20);
        session
            .set_many(&[(KEY_SNAPSHOT_HTML, "<html/>"), (KEY_SNAPSHOT_SCOPE, "full")])
            .await
            .unwrap();
        let mut h = harness_with(vec![], session, MemorySettingsStore::new());
        h.workbench.restore().await.unwrap();
        assert_eq!(
            h.workbench.status(),
            "Restored cached snapshot (7 bytes, scope=full)."
        );
        assert!(h.workbench.token_editor().visible);
        assert_eq!(h.workbench.token_editor().help, TOKEN_HELP_MISSING);

        h.workbench.capture(false).await.unwrap();
        assert!(h.channel_log.lock().requests.is_empty());
    }

    #[tokio::test]
    async fn save_token_trims_and_hides_editor() {
        let mut h = harness(vec![]);
        h.workbench.token = "   ".into();
        h.workbench.trigger(Action::SaveToken).await.unwrap();
        assert!(h.workbench.token_editor().visible);
        assert_eq!(h.workbench.status(), STATUS_READY);

        h.workbench.token = " abc ".into();
        h.workbench.trigger(Action::SaveToken).await.unwrap();
        assert_eq!(h.workbench.status(), "Token saved.");
        assert!(!h.workbench.token_editor().visible);
        assert_eq!(h.workbench.token_editor().help, "");

        h.workbench.edit_token();
        assert!(h.workbench.token_editor().visible);
        assert_eq!(h.workbench.token_editor().help, TOKEN_HELP_REPLACE);
        assert_eq!(
            h.workbench.settings.get(KEY_TOKEN).await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn clearing_token_survives_restore() {
        let settings = MemorySettingsStore::with_values([(KEY_TOKEN, "old")]);
        let mut h = harness_with(vec![], MemorySessionCache::new(1 << 20), settings);
        h.workbench.restore().await.unwrap();
        assert_eq!(h.workbench.token, "old");
        assert!(!h.workbench.token_editor().visible);

        h.workbench.token = " ".into();
        h.workbench.trigger(Action::SaveToken).await.unwrap();
        assert_eq!(
            h.workbench.settings.get(KEY_TOKEN).await.unwrap().as_deref(),
            Some("")
        );
        assert!(h.workbench.token_editor().visible);
        assert_eq!(h.workbench.token_editor().help, TOKEN_HELP_MISSING);

        h.workbench.restore().await.unwrap();
        assert_eq!(h.workbench.token, "");
        assert!(h.workbench.token_editor().visible);
    }
}
