use crate::id_space::{IndividualId, KRange};
use crate::SweepError;
use rustc_hash::FxHashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type IdSet = FxHashSet<IndividualId>;

/// Appended to a partial line before new records so it can never parse as an ID.
pub const TORN_MARKER: &str = "#torn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerState {
    Started,
    Completed,
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerState::Started => write!(f, "started"),
            LedgerState::Completed => write!(f, "completed"),
        }
    }
}

/// Result of reading one log from disk.
#[derive(Debug, Default)]
pub struct LogScan {
    pub ids: IdSet,
    /// Non-empty, newline-terminated lines seen (duplicates included).
    pub lines: usize,
    /// Lines that did not parse as an ID.
    pub malformed: usize,
    /// Earlier partial lines closed off by a later append.
    pub repaired: usize,
    /// True when the file ended in a partial line that was ignored.
    pub torn_tail: bool,
}

/// The pair of logs backing the `Started` and `Completed` states.
#[derive(Debug, Clone)]
pub struct Ledger {
    started_path: PathBuf,
    completed_path: PathBuf,
}

impl Ledger {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(started_path: P, completed_path: Q) -> Self {
        Self {
            started_path: started_path.as_ref().to_path_buf(),
            completed_path: completed_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, state: LedgerState) -> &Path {
        match state {
            LedgerState::Started => &self.started_path,
            LedgerState::Completed => &self.completed_path,
        }
    }

    /// Create both logs if they do not exist yet. Existing content is untouched.
    pub fn touch(&self) -> Result<(), SweepError> {
        for state in [LedgerState::Started, LedgerState::Completed] {
            let path = self.path(state);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SweepError::Ledger(format!("cannot create {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    /// Every ID recorded for `state`. A missing log is an empty set.
    pub fn load(&self, state: LedgerState) -> Result<IdSet, SweepError> {
        Ok(self.scan(state)?.ids)
    }

    pub fn scan(&self, state: LedgerState) -> Result<LogScan, SweepError> {
        let path = self.path(state);
        let scan = scan_log(path)?;
        if scan.torn_tail {
            warn!(log = %path.display(), "ignored partial trailing line in {} ledger", state);
        }
        if scan.malformed > 0 {
            warn!(log = %path.display(), malformed = scan.malformed, "skipped unparseable lines in {} ledger", state);
        }
        debug!(log = %path.display(), ids = scan.ids.len(), lines = scan.lines, "loaded {} ledger", state);
        Ok(scan)
    }

    /// Durably append one line per ID to the `state` log.
    pub fn append(&self, state: LedgerState, ids: &[IndividualId]) -> Result<(), SweepError> {
        append_ids(self.path(state), ids)
    }
}

/// Read a log, skipping blank and unparseable lines and any unterminated tail.
pub fn scan_log(path: &Path) -> Result<LogScan, SweepError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LogScan::default()),
        Err(e) => {
            return Err(SweepError::Ledger(format!("cannot read {}: {}", path.display(), e)));
        }
    };

    let mut scan = LogScan::default();
    let text = String::from_utf8_lossy(&bytes);
    let mut body: &str = &text;

    if !body.is_empty() && !body.ends_with('\n') {
        // A write that never finished. Its prefix could parse as a different ID.
        scan.torn_tail = true;
        body = match body.rfind('\n') {
            Some(idx) => &body[..=idx],
            None => "",
        };
    }

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.ends_with(TORN_MARKER) {
            scan.repaired += 1;
            continue;
        }
        scan.lines += 1;
        match line.parse::<IndividualId>() {
            Ok(id) => {
                scan.ids.insert(id);
            }
            Err(_) => scan.malformed += 1,
        }
    }

    Ok(scan)
}

/// Append `ids` as a single write on an append-mode handle, then sync.
///
/// If the log ends in a partial line, that line is closed off with a marker
/// first so neither it nor the new records can be misread.
pub fn append_ids(path: &Path, ids: &[IndividualId]) -> Result<(), SweepError> {
    if ids.is_empty() {
        return Ok(());
    }

    let ledger_err = |e: std::io::Error| SweepError::Ledger(format!("cannot append to {}: {}", path.display(), e));

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(ledger_err)?;

    let mut buf = String::with_capacity(ids.len() * 16 + 1);
    if ends_without_newline(&mut file).map_err(ledger_err)? {
        buf.push_str(TORN_MARKER);
        buf.push('\n');
    }
    for id in ids {
        buf.push_str(&id.to_string());
        buf.push('\n');
    }

    file.write_all(buf.as_bytes()).map_err(ledger_err)?;
    file.flush().map_err(ledger_err)?;
    file.sync_data().map_err(ledger_err)?;
    Ok(())
}

fn ends_without_newline(file: &mut fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// True if any constituent ID of `range` is in `set`.
pub fn contains_any(set: &IdSet, range: KRange) -> bool {
    first_present(set, range).is_some()
}

/// The lowest constituent ID of `range` present in `set`.
pub fn first_present(set: &IdSet, range: KRange) -> Option<IndividualId> {
    range.ids().find(|id| set.contains(id))
}

/// Constituent IDs of `range` absent from `set`, in range order.
pub fn missing(set: &IdSet, range: KRange) -> Vec<IndividualId> {
    range.ids().filter(|id| !set.contains(id)).collect()
}
