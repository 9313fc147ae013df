//! Types and traits at the notebook-host boundary.
//!
//! The core does not own cell rendering, keyboard handling, or the kernel
//! protocol. It consumes exactly two things from its host: a one-time
//! "practice loaded" query for configured metadata, and a per-cell
//! "finished executing, output = X" event. This module defines that
//! boundary:
//!
//! - [`PracticeMetadata`] — the host-supplied practice configuration block.
//! - [`CompletedCell`] / [`CellOutput`] — one finished execution with its
//!   captured output records.
//! - [`CellListener`] — the hook the core registers; the host must invoke it
//!   exactly once per completed cell execution.
//! - [`NotebookHost`] — the host capability the extension is handed.
//!
//! [`Notebook`] and [`ReplayHost`] additionally model a recorded notebook
//! file, so the `lectern` CLI (and tests) can replay a session headlessly.

use crate::session::ExpirySpec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ── Practice metadata ──────────────────────────────────────────────

/// Practice configuration block supplied by the host at load time.
///
/// All fields are optional on the wire; the session manager decides which
/// absences make the notebook untracked versus which merely skip a feature
/// (a missing `expiry` means the session has no hard upper bound).
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PracticeMetadata {
    /// Last-known learner name; confirmed (and possibly replaced) by a join.
    pub student_id: Option<String>,
    /// Explicit practice id; falls back to the notebook name when absent.
    pub practice_id: Option<String>,
    /// Base URL of the backend service.
    pub server: Option<String>,
    /// Session password used for join and rejoin.
    pub session_pwd: Option<String>,
    /// Optional session expiry: epoch milliseconds or an RFC 3339 string.
    pub expiry: Option<ExpirySpec>,
}

/// A question bound to a cell through its metadata.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    /// The canonical expected output for this question.
    pub expected: String,
}

// ── Cell output ────────────────────────────────────────────────────

/// MIME-type keyed representations of a rich output record.
pub type MimeBundle = BTreeMap<String, serde_json::Value>;

/// Text payloads notebooks store either as one string or as a list of line
/// strings; the two forms are equivalent once concatenated.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PlainText {
    Single(String),
    Lines(Vec<String>),
}

impl PlainText {
    pub fn to_text(&self) -> String {
        match self {
            PlainText::Single(s) => s.clone(),
            PlainText::Lines(lines) => lines.concat(),
        }
    }
}

impl Default for PlainText {
    fn default() -> Self {
        PlainText::Single(String::new())
    }
}

/// One captured output record of a finished cell execution.
///
/// Only the three kinds the scoring pipeline understands are modeled;
/// anything else deserializes as [`CellOutput::Unrecognized`] and yields no
/// scoreable value.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum CellOutput {
    ExecuteResult {
        #[serde(default)]
        data: MimeBundle,
    },
    DisplayData {
        #[serde(default)]
        data: MimeBundle,
    },
    Stream {
        #[serde(default)]
        text: PlainText,
    },
    #[serde(other)]
    Unrecognized,
}

impl CellOutput {
    /// The wire name of this output kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CellOutput::ExecuteResult { .. } => "execute_result",
            CellOutput::DisplayData { .. } => "display_data",
            CellOutput::Stream { .. } => "stream",
            CellOutput::Unrecognized => "unrecognized",
        }
    }

    /// Extract the text the scorer should look at, if this kind carries any.
    ///
    /// `execute_result` and `display_data` use their `text/plain`
    /// representation; `stream` uses the raw streamed text.
    pub fn scoreable_text(&self) -> Option<String> {
        match self {
            CellOutput::ExecuteResult { data } | CellOutput::DisplayData { data } => {
                text_plain(data)
            }
            CellOutput::Stream { text } => Some(text.to_text()),
            CellOutput::Unrecognized => None,
        }
    }
}

fn text_plain(data: &MimeBundle) -> Option<String> {
    match data.get("text/plain")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(lines) => Some(
            lines
                .iter()
                .filter_map(|line| line.as_str())
                .collect::<Vec<_>>()
                .concat(),
        ),
        _ => None,
    }
}

// ── Cells ──────────────────────────────────────────────────────────

/// Per-cell metadata; only the `Question` descriptor matters to the core.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CellMetadata {
    #[serde(rename = "Question")]
    pub question: Option<Question>,
}

/// A cell execution the host reports as finished, with captured output.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CompletedCell {
    #[serde(default)]
    pub metadata: CellMetadata,
    #[serde(default)]
    pub outputs: Vec<CellOutput>,
}

impl CompletedCell {
    /// The question bound to this cell, if any. Cells without one are
    /// untouched by the core.
    pub fn question(&self) -> Option<&Question> {
        self.metadata.question.as_ref()
    }
}

// ── Host traits ────────────────────────────────────────────────────

/// Hook invoked by the host exactly once per completed cell execution.
pub trait CellListener: Send + Sync {
    fn on_cell_finished(&self, cell: &CompletedCell);
}

/// The capabilities a notebook host hands to the extension.
///
/// Hosts expose listener registration instead of the core rewriting their
/// dispatch internals; the core registers one listener per tracked notebook.
pub trait NotebookHost: Send + Sync {
    /// Name of the loaded notebook; used as the practice id when the
    /// metadata block does not carry one explicitly.
    fn notebook_name(&self) -> String;

    /// The configured practice metadata block, or `None` when this notebook
    /// carries no practice configuration at all.
    fn practice_metadata(&self) -> Option<PracticeMetadata>;

    /// Register a listener for completed cell executions.
    fn register_cell_listener(&self, listener: Arc<dyn CellListener>);
}

// ── Recorded notebook files ────────────────────────────────────────

/// A recorded notebook file: practice metadata plus cells with captured
/// outputs, as consumed by the `lectern` replay CLI.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Notebook {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: NotebookMetadata,
    #[serde(default)]
    pub cells: Vec<CompletedCell>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NotebookMetadata {
    pub practice: Option<PracticeMetadata>,
}

impl Notebook {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A [`NotebookHost`] over a recorded [`Notebook`]: listeners register as
/// they would against a live host, then [`replay`](ReplayHost::replay) fires
/// every recorded cell in file order.
pub struct ReplayHost {
    notebook: Notebook,
    listeners: Mutex<Vec<Arc<dyn CellListener>>>,
}

impl ReplayHost {
    pub fn new(notebook: Notebook) -> Self {
        Self {
            notebook,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Deliver every recorded cell, in order, to every registered listener.
    /// Returns the number of cells fired.
    pub fn replay(&self) -> usize {
        let listeners: Vec<Arc<dyn CellListener>> = {
            let guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for cell in &self.notebook.cells {
            for listener in &listeners {
                listener.on_cell_finished(cell);
            }
        }
        self.notebook.cells.len()
    }
}

impl NotebookHost for ReplayHost {
    fn notebook_name(&self) -> String {
        self.notebook.name.clone()
    }

    fn practice_metadata(&self) -> Option<PracticeMetadata> {
        self.notebook.metadata.practice.clone()
    }

    fn register_cell_listener(&self, listener: Arc<dyn CellListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }
}
