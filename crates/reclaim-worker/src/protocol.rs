//! Line protocol spoken by worker programs on stdout.
//!
//! Each line is either a JSON object tagged with `event`, or free text that is
//! only logged:
//!
//! ```text
//! {"event":"progress","phase":"brute_force","percent":12.5,"tested":1200,"total":9600}
//! {"event":"result","found":true,"value":"hunter2","tested":4410}
//! ```

use reclaim_core::job::{ProgressUpdate, WorkerOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerMessage {
    Progress(ProgressUpdate),
    Result {
        found: bool,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        tested: u64,
    },
}

impl WorkerMessage {
    /// Convert a `result` message into an outcome.
    pub fn into_outcome(self) -> Option<WorkerOutcome> {
        match self {
            WorkerMessage::Result {
                found: true,
                value: Some(value),
                tested,
            } => Some(WorkerOutcome::found(value, tested)),
            WorkerMessage::Result { tested, .. } => Some(WorkerOutcome::not_found(tested)),
            WorkerMessage::Progress(_) => None,
        }
    }
}

/// Parse one stdout line. `None` for blank lines, free text, and unknown events.
pub fn parse_line(line: &str) -> Option<WorkerMessage> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}
