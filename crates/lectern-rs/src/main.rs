//! Replay a recorded practice notebook against a lectern backend.
//!
//! Loads a notebook JSON file, authenticates against the configured practice
//! session (rejoining with a stored token when one is accepted), replays
//! each recorded cell output through the scoring pipeline, and prints a
//! summary. Logs go to stderr; tune them with `RUST_LOG` or `--verbose`.
//!
//! # Examples
//!
//! ```sh
//! # Replay with a stored token (or be told to join)
//! lectern lists-01.notebook.json
//!
//! # Join explicitly as a named student
//! lectern lists-01.notebook.json --student "Ada Lovelace" --session-pwd s3cret
//!
//! # Point at a different backend and loosen the threshold
//! lectern lists-01.notebook.json --server http://localhost:8000 --threshold 0.3
//! ```

use clap::Parser;
use lectern_rs::prelude::*;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Replay a recorded practice notebook against a lectern backend.
#[derive(Parser)]
#[command(name = "lectern", version)]
struct Cli {
    /// Path to the notebook JSON file to replay
    notebook: PathBuf,

    // ── Session ────────────────────────────────────────────────
    /// Override the backend server URL from the notebook metadata
    #[arg(long)]
    server: Option<String>,

    /// Student name to join with when no stored token is accepted
    #[arg(long)]
    student: Option<String>,

    /// Session password to join with (defaults to the notebook's)
    #[arg(long)]
    session_pwd: Option<String>,

    /// Directory for persisted session state (the stored bearer token)
    #[arg(long, default_value = ".lectern/session")]
    state_dir: PathBuf,

    // ── Scoring ────────────────────────────────────────────────
    /// Correctness threshold; attempts scoring strictly above it are
    /// reported
    #[arg(long)]
    threshold: Option<f64>,

    // ── Transport ──────────────────────────────────────────────
    /// Backend request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Verbose (debug-level) logging
    #[arg(long, short)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_directives = if verbose {
        "lectern_rs=debug,lectern=debug"
    } else {
        "lectern_rs=info,lectern=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_notebook(cli: &Cli) -> Result<Notebook, String> {
    let json = std::fs::read_to_string(&cli.notebook)
        .map_err(|e| format!("failed to read notebook '{}': {e}", cli.notebook.display()))?;
    let mut notebook = Notebook::from_json(&json)
        .map_err(|e| format!("failed to parse notebook '{}': {e}", cli.notebook.display()))?;

    // A file without a name falls back to its stem, mirroring how a live
    // host derives the practice id from the notebook name.
    if notebook.name.is_empty() {
        notebook.name = cli
            .notebook
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    if let Some(server) = &cli.server {
        notebook
            .metadata
            .practice
            .get_or_insert_with(Default::default)
            .server = Some(server.clone());
    }

    Ok(notebook)
}

async fn run(cli: &Cli) -> Result<String, String> {
    let notebook = load_notebook(cli)?;
    let session_pwd = cli.session_pwd.clone().or_else(|| {
        notebook
            .metadata
            .practice
            .as_ref()
            .and_then(|p| p.session_pwd.clone())
    });

    let mut config = ExtensionConfig::default()
        .with_state_dir(&cli.state_dir)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
    }

    let extension = PracticeExtension::new(
        config,
        Arc::new(LoggingPresenter),
        Arc::new(LoggingObserver),
    );
    let host = ReplayHost::new(notebook);

    let outcome = extension
        .on_practice_loaded(&host)
        .await
        .map_err(|e| e.to_string())?;

    match outcome {
        LoadOutcome::NotTracked => {
            return Ok("not a tracked practice notebook; nothing to do".into());
        }
        LoadOutcome::Expired => {
            return Ok("practice session has expired; no attempts reported".into());
        }
        LoadOutcome::NotLive { status } => {
            return Ok(format!("practice is not live (status: {status}); no attempts reported"));
        }
        LoadOutcome::AwaitingJoin => {
            let (Some(student), Some(pwd)) = (&cli.student, &session_pwd) else {
                return Err(
                    "session requires joining: pass --student (and --session-pwd if the \
                     notebook has none)"
                        .into(),
                );
            };
            match extension
                .on_join_submitted(&host, student, pwd)
                .await
                .map_err(|e| e.to_string())?
            {
                JoinOutcome::Authenticated => {}
                JoinOutcome::Rejected { status } => {
                    return Err(format!(
                        "join rejected (status: {status}); try a different --student name"
                    ));
                }
            }
        }
        LoadOutcome::Authenticated => {}
    }

    let pipeline = extension
        .pipeline()
        .ok_or_else(|| "pipeline did not activate after authentication".to_string())?;

    let cells = host.replay();
    pipeline.drain().await;

    let stats = pipeline.stats();
    Ok(format!(
        "replayed {cells} cell(s): {} attempt(s) scored, {} submission(s) dispatched",
        stats.scored, stats.dispatched
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
