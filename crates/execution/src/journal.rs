//! Durable record of execution intents and leg outcomes.
//!
//! Every batch writes its [`ExecutionIntent`] before the first leg is sent,
//! one [`JournalRecord::LegOutcome`] per leg as it resolves, and a
//! [`JournalRecord::Completed`] marker at the end. After a crash,
//! [`ExecutionJournal::incomplete_groups`] lists the batches that need
//! reconciling against broker state.
//!
//! The file journal stores one JSON record per line and fsyncs each append.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{ExecutionIntent, LegResult};

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt journal entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalRecord {
    Intent(ExecutionIntent),
    LegOutcome {
        group_id: Uuid,
        result: LegResult,
        at: DateTime<Utc>,
    },
    Completed {
        group_id: Uuid,
        success: bool,
        at: DateTime<Utc>,
    },
}

impl JournalRecord {
    #[must_use]
    pub const fn group_id(&self) -> Uuid {
        match self {
            Self::Intent(intent) => intent.group_id,
            Self::LegOutcome { group_id, .. } | Self::Completed { group_id, .. } => *group_id,
        }
    }
}

/// A batch reassembled from its journal records.
#[derive(Debug, Clone, PartialEq)]
pub struct JournaledGroup {
    pub intent: ExecutionIntent,
    pub outcomes: Vec<LegResult>,
    /// `Some(success)` once the batch finished.
    pub completed: Option<bool>,
}

impl JournaledGroup {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed.is_some()
    }

    /// Indices of legs with no recorded outcome.
    #[must_use]
    pub fn unresolved_legs(&self) -> Vec<usize> {
        (0..self.intent.legs.len())
            .filter(|i| !self.outcomes.iter().any(|o| o.leg_index == *i))
            .collect()
    }
}

/// Groups records by batch in the order their intents were written.
///
/// Outcomes for a group whose intent is missing are dropped with a warning.
#[must_use]
pub fn replay(records: &[JournalRecord]) -> Vec<JournaledGroup> {
    let mut groups: Vec<JournaledGroup> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for record in records {
        match record {
            JournalRecord::Intent(intent) => {
                index.insert(intent.group_id, groups.len());
                groups.push(JournaledGroup {
                    intent: intent.clone(),
                    outcomes: Vec::new(),
                    completed: None,
                });
            }
            JournalRecord::LegOutcome {
                group_id, result, ..
            } => match index.get(group_id) {
                Some(&i) => groups[i].outcomes.push(result.clone()),
                None => warn!(%group_id, "leg outcome without intent"),
            },
            JournalRecord::Completed {
                group_id, success, ..
            } => match index.get(group_id) {
                Some(&i) => groups[i].completed = Some(*success),
                None => warn!(%group_id, "completion without intent"),
            },
        }
    }

    groups
}

pub trait ExecutionJournal: Send + Sync {
    /// Durably appends one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    fn append(&self, record: &JournalRecord) -> Result<(), JournalError>;

    /// Every record in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn records(&self) -> Result<Vec<JournalRecord>, JournalError>;

    /// # Errors
    ///
    /// Propagates [`ExecutionJournal::records`] failures.
    fn groups(&self) -> Result<Vec<JournaledGroup>, JournalError> {
        Ok(replay(&self.records()?))
    }

    /// Batches with no completion marker.
    ///
    /// # Errors
    ///
    /// Propagates [`ExecutionJournal::records`] failures.
    fn incomplete_groups(&self) -> Result<Vec<JournaledGroup>, JournalError> {
        Ok(self
            .groups()?
            .into_iter()
            .filter(|group| !group.is_complete())
            .collect())
    }
}

// =============================================================================
// In-memory journal
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryJournal {
    records: Mutex<Vec<JournalRecord>>,
}

impl InMemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ExecutionJournal for InMemoryJournal {
    fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        Ok(self.records.lock().clone())
    }
}

// =============================================================================
// File journal
// =============================================================================

/// Append-only JSON-lines journal.
///
/// A partially written last line (crash mid-append) is ignored on read and
/// cut off when the journal is reopened, so new records start on a fresh
/// line. Any other unparseable line is reported as corruption.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileJournal {
    /// Opens (or creates) the journal, creating parent directories, and
    /// truncates a partially written last line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending or the
    /// truncated tail cannot be removed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        truncate_partial_tail(&file, &path)?;
        debug!(path = %path.display(), "opened execution journal");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drops everything after the last newline.
fn truncate_partial_tail(file: &File, path: &Path) -> Result<(), JournalError> {
    let contents = fs::read(path)?;
    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    if keep < contents.len() {
        warn!(
            path = %path.display(),
            dropped_bytes = contents.len() - keep,
            "truncating partial journal tail"
        );
        file.set_len(keep as u64)?;
        file.sync_data()?;
    }
    Ok(())
}

impl ExecutionJournal for FileJournal {
    fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        // Hold the writer lock so a concurrent append cannot be read half-written.
        let _guard = self.file.lock();
        let reader = BufReader::new(File::open(&self.path)?);

        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        let last_content = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if Some(i) == last_content => {
                    warn!(
                        path = %self.path.display(),
                        line = i + 1,
                        error = %e,
                        "ignoring truncated journal tail"
                    );
                }
                Err(e) => {
                    return Err(JournalError::Corrupt {
                        line: i + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(records)
    }
}
