use crate::id_space::{IndividualId, KRange};
use crate::ledger::{self, IdSet};
use crate::SweepError;
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `{prefix}_{n}_{kmin}_{kmax}.{extension}`
#[derive(Debug, Clone)]
pub struct ArtifactName {
    prefix: String,
    extension: String,
}

impl ArtifactName {
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn from_config(config: &crate::SweepConfig) -> Self {
        Self::new(&config.artifact_prefix, &config.artifact_extension)
    }

    /// `None` for files that are not range artifacts at all, `Some(Err)` for
    /// artifact-looking names whose fields cannot be read.
    pub fn parse(&self, file_name: &str) -> Option<Result<(u64, u64, u64), String>> {
        let core = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;

        let parts: Vec<&str> = core.split('_').collect();
        if parts.len() != 3 {
            return Some(Err(format!("expected N_KMIN_KMAX, found {} field(s)", parts.len())));
        }
        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            match part.parse::<u64>() {
                Ok(v) => *slot = v,
                Err(e) => return Some(Err(format!("'{}': {}", part, e))),
            }
        }
        Some(Ok((nums[0], nums[1], nums[2])))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub range: KRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Complete,
    /// Some constituent IDs are not in `Completed` yet.
    Incomplete { missing: Vec<IndividualId> },
    /// Empty, or not a range of the ID space. Never archived.
    Invalid,
}

/// Complete iff every constituent ID of a non-empty range is in `completed`.
/// Ranges outside the ID space are rejected before any ID is enumerated.
pub fn classify(range: KRange, completed: &IdSet) -> Classification {
    if range.is_empty() || !range.in_space() {
        return Classification::Invalid;
    }
    let missing = ledger::missing(completed, range);
    if missing.is_empty() {
        Classification::Complete
    } else {
        Classification::Incomplete { missing }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedArtifact {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ArtifactScan {
    pub artifacts: Vec<RangeArtifact>,
    pub malformed: Vec<MalformedArtifact>,
}

/// List the range artifacts in `dir`, sorted by `(n, kmin)`. A missing
/// directory holds no artifacts.
pub fn scan_artifacts(dir: &Path, naming: &ArtifactName, step: u64) -> Result<ArtifactScan, SweepError> {
    let mut scan = ArtifactScan::default();
    if !dir.exists() {
        return Ok(scan);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()).map(str::to_string) else {
            continue;
        };
        match naming.parse(&file_name) {
            None => {}
            Some(Ok((n, kmin, kmax))) => scan.artifacts.push(RangeArtifact {
                path,
                file_name,
                range: KRange::new(n, kmin, kmax, step),
            }),
            Some(Err(reason)) => {
                warn!(artifact = %file_name, %reason, "could not parse n, kmin, kmax from file name, skipping");
                scan.malformed.push(MalformedArtifact { file_name, reason });
            }
        }
    }

    scan.artifacts
        .sort_by(|a, b| (a.range.n, a.range.kmin, a.range.kmax).cmp(&(b.range.n, b.range.kmin, b.range.kmax)));
    Ok(scan)
}

#[derive(Debug, Clone)]
pub struct ReconciledArtifact {
    pub artifact: RangeArtifact,
    pub classification: Classification,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub artifacts: Vec<ReconciledArtifact>,
    pub malformed: Vec<MalformedArtifact>,
}

impl Reconciliation {
    pub fn complete(&self) -> Vec<RangeArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.classification == Classification::Complete)
            .map(|a| a.artifact.clone())
            .collect()
    }

    pub fn count_complete(&self) -> usize {
        self.count(|c| matches!(c, Classification::Complete))
    }

    pub fn count_incomplete(&self) -> usize {
        self.count(|c| matches!(c, Classification::Incomplete { .. }))
    }

    pub fn count_invalid(&self) -> usize {
        self.count(|c| matches!(c, Classification::Invalid))
    }

    fn count(&self, pred: impl Fn(&Classification) -> bool) -> usize {
        self.artifacts.iter().filter(|a| pred(&a.classification)).count()
    }
}

pub fn reconcile(
    dir: &Path,
    naming: &ArtifactName,
    step: u64,
    completed: &IdSet,
) -> Result<Reconciliation, SweepError> {
    let scan = scan_artifacts(dir, naming, step)?;
    let mut out = Reconciliation {
        artifacts: Vec::with_capacity(scan.artifacts.len()),
        malformed: scan.malformed,
    };

    for artifact in scan.artifacts {
        let classification = classify(artifact.range, completed);
        match &classification {
            Classification::Complete => {
                info!(artifact = %artifact.file_name, ids = artifact.range.len(), "all constituent IDs completed");
            }
            Classification::Invalid => {
                info!(artifact = %artifact.file_name, range = %artifact.range, "range is empty or invalid, skipping");
            }
            Classification::Incomplete { missing } => {
                info!(
                    artifact = %artifact.file_name,
                    missing_count = missing.len(),
                    "not all constituent IDs are complete. Missing: {}",
                    missing.iter().join(" ")
                );
            }
        }
        out.artifacts.push(ReconciledArtifact { artifact, classification });
    }

    Ok(out)
}
