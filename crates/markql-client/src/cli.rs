//! Command line entry points.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::app::agent::HttpAgentClient;
use crate::app::capture::{CaptureChannel, CaptureRequest, LocalPageChannel, PageSource};
use crate::app::export::ExportFormat;
use crate::app::highlight::{Highlighter, render_markup, tokenize};
use crate::app::session::{FileSettingsStore, MemorySessionCache};
use crate::app::workbench::{Action, Collaborators, Workbench, WorkbenchOptions};
use crate::domain::model::{ScopeSelection, Snapshot};
use crate::infra::clipboard::SystemClipboard;
use crate::infra::config::Config;
use crate::ui::app::UiApp;

#[derive(Debug, Parser)]
#[command(
    name = "markql-client",
    version,
    about = "Capture web pages and query them through a local MarkQL agent"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). Logs go to stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture a page and print the selected markup.
    Capture(CaptureArgs),
    /// Capture a page and run a query against it.
    Query(QueryArgs),
    /// Print a query with syntax highlighting.
    Highlight(HighlightArgs),
    /// Answer JSON capture messages read line by line from stdin.
    Relay(RelayArgs),
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Open the interactive workbench.
    Tui(TuiArgs),
}

#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// HTML file or http(s) URL.
    pub page: PageSource,
    /// Capture exactly this scope. Without it the configured scope is tried
    /// first, then the fallback.
    #[arg(long, value_enum)]
    pub scope: Option<ScopeSelection>,
    /// Write the markup here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// HTML file or http(s) URL.
    pub page: PageSource,
    #[arg(short, long, conflicts_with = "query_file", required_unless_present = "query_file")]
    pub query: Option<String>,
    #[arg(long)]
    pub query_file: Option<PathBuf>,
    /// Agent token; falls back to the saved token.
    #[arg(long, env = "MARKQL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Persist the token passed with --token.
    #[arg(long, requires = "token")]
    pub save_token: bool,
    #[arg(long)]
    pub max_rows: Option<String>,
    #[arg(long)]
    pub timeout_ms: Option<String>,
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormat>,
    /// Write the result here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Also copy the result to the clipboard.
    #[arg(long)]
    pub copy: bool,
    /// Override the configured agent URL.
    #[arg(long)]
    pub agent_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct HighlightArgs {
    pub query: String,
    /// Emit HTML spans instead of terminal colors.
    #[arg(long, conflicts_with = "tokens")]
    pub markup: bool,
    /// Emit one JSON object per token.
    #[arg(long)]
    pub tokens: bool,
}

#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Pages served as tabs 1, 2, ...; the first is active.
    #[arg(required = true)]
    pub pages: Vec<PageSource>,
}

#[derive(Debug, Args)]
pub struct TuiArgs {
    /// Pages served as tabs 1, 2, ...; the first is active.
    pub pages: Vec<PageSource>,
}

/// Parse arguments, set up logging, and run the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, Command::Tui(_));
    if !interactive || cli.verbose > 0 {
        crate::init(cli.verbose);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Capture(args) => runtime.block_on(capture(args)),
        Command::Query(args) => runtime.block_on(query(args)),
        Command::Highlight(args) => highlight(&args),
        Command::Relay(args) => runtime.block_on(relay(args)),
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "markql-client", &mut io::stdout());
            Ok(())
        }
        Command::Tui(args) => tui(args, &runtime),
    }
}

fn workbench(
    config: &Config,
    pages: Vec<PageSource>,
    agent_url: Option<String>,
) -> Result<Workbench> {
    let agent_url = agent_url.unwrap_or_else(|| config.agent.url().to_string());
    let parts = Collaborators {
        channel: Box::new(LocalPageChannel::new(pages)),
        agent: Box::new(
            HttpAgentClient::new(agent_url).with_token_header(config.agent.token_header()),
        ),
        settings: Box::new(FileSettingsStore::in_config_dir()?),
        session: Box::new(MemorySessionCache::new(config.capture.session_quota_bytes())),
        clipboard: Box::new(SystemClipboard::new()),
    };
    Ok(Workbench::new(parts, WorkbenchOptions::from_config(config)))
}

async fn capture(args: CaptureArgs) -> Result<()> {
    let snapshot = match args.scope {
        Some(scope) => capture_exact(args.page, scope).await?,
        None => {
            let config = Config::load()?;
            let mut workbench = workbench(&config, vec![args.page], None)?;
            workbench.trigger(Action::Capture).await?;
            workbench
                .snapshot()
                .cloned()
                .ok_or_else(|| anyhow!("capture produced no snapshot"))?
        }
    };

    eprintln!(
        "Captured {} bytes ({}/{}).",
        snapshot.size_bytes, snapshot.scope, snapshot.source
    );
    emit(&snapshot.html, args.output.as_deref())
}

async fn capture_exact(page: PageSource, scope: ScopeSelection) -> Result<Snapshot> {
    let channel = LocalPageChannel::new(vec![page]);
    let tab_id = channel.active_tab().await?;
    let snapshot = channel
        .send(CaptureRequest::CaptureSnapshot { tab_id, scope })
        .await?
        .into_snapshot(scope)?;
    Ok(snapshot)
}

async fn query(args: QueryArgs) -> Result<()> {
    let config = Config::load()?;
    let query = match (&args.query, &args.query_file) {
        (Some(query), _) => query.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read query file {}", path.display()))?,
        (None, None) => return Err(anyhow!("a query or --query-file is required")),
    };
    let format = args.format.unwrap_or_else(|| config.export.format());

    let mut workbench = workbench(&config, vec![args.page], args.agent_url)?;
    workbench.restore().await?;
    if let Some(token) = args.token {
        workbench.token = token;
        if args.save_token {
            workbench.trigger(Action::SaveToken).await?;
        }
    }
    workbench.editor.set_text(&query);
    if let Some(max_rows) = args.max_rows {
        workbench.max_rows_input = max_rows;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        workbench.timeout_input = timeout_ms;
    }

    workbench.trigger(Action::RunQuery).await?;
    eprintln!("{}", workbench.status());

    match &args.output {
        Some(path) => {
            workbench.export_to_file(format, path)?;
            eprintln!("{}", workbench.status());
        }
        None => emit(&workbench.build_export(format)?, None)?,
    }
    if args.copy {
        let action = match format {
            ExportFormat::Csv => Action::CopyCsv,
            ExportFormat::Json => Action::CopyJson,
        };
        workbench.trigger(action).await?;
        eprintln!("{}", workbench.status());
    }
    Ok(())
}

fn highlight(args: &HighlightArgs) -> Result<()> {
    let tokens = tokenize(&args.query);
    let mut stdout = io::stdout().lock();
    if args.markup {
        writeln!(stdout, "{}", render_markup(&tokens))?;
    } else if args.tokens {
        for token in &tokens {
            writeln!(stdout, "{}", serde_json::to_string(token)?)?;
        }
    } else {
        writeln!(stdout, "{}", Highlighter::new().render_ansi(&args.query))?;
    }
    Ok(())
}

async fn relay(args: RelayArgs) -> Result<()> {
    let channel = LocalPageChannel::new(args.pages);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Value>(&line) {
            Ok(message) => channel.dispatch(&message).await.unwrap_or(Value::Null),
            Err(err) => json!({ "ok": false, "error": format!("invalid message: {err}") }),
        };
        let ok = reply.get("ok").and_then(serde_json::Value::as_bool);
        debug!(reply_ok = ?ok, "relay reply");
        let mut encoded = serde_json::to_string(&reply)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn tui(args: TuiArgs, runtime: &Runtime) -> Result<()> {
    let config = Config::load()?;
    let mut workbench = workbench(&config, args.pages, None)?;
    runtime.block_on(workbench.restore())?;
    UiApp::new(workbench).run(runtime)
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}")?;
            Ok(())
        }
    }
}
