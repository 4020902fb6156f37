use crate::ledger::LedgerState;
use crate::reconciler::{self, ArtifactName, RangeArtifact};
use crate::{SweepConfig, SweepError};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A named-entry container that only grows.
pub trait ArchiveSink {
    /// Stored bytes of `name`, if the archive already has such an entry.
    /// Only valid before the first `append`.
    fn existing(&mut self, name: &str) -> Result<Option<Vec<u8>>, SweepError>;
    fn append(&mut self, name: &str, contents: &[u8]) -> Result<(), SweepError>;
    /// Make every appended entry durable.
    fn commit(&mut self) -> Result<(), SweepError>;
}

/// ZIP file sink. New entries go into a staged copy next to the archive,
/// which replaces the archive only on `commit`; until then the archive on
/// disk is the one the last successful run left.
pub struct ZipArchiveSink {
    path: PathBuf,
    staged: PathBuf,
    reader: Option<ZipArchive<File>>,
    writer: Option<ZipWriter<File>>,
}

impl ZipArchiveSink {
    /// Open `path` if it exists. An existing file that is not a readable
    /// archive is an error: appending to it could destroy its contents.
    /// A staged copy left by an interrupted run is discarded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref().to_path_buf();
        let staged = staged_path(&path);
        if staged.exists() {
            warn!(staged = %staged.display(), "discarding archive copy from an interrupted run");
            fs::remove_file(&staged)?;
        }
        let reader = if path.exists() {
            let file = File::open(&path)
                .map_err(|e| SweepError::Archive(format!("cannot open {}: {}", path.display(), e)))?;
            Some(
                ZipArchive::new(file)
                    .map_err(|e| SweepError::Archive(format!("{} is not a readable archive: {}", path.display(), e)))?,
            )
        } else {
            None
        };
        Ok(Self { path, staged, reader, writer: None })
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<File>, SweepError> {
        if self.writer.is_none() {
            let had_archive = self.reader.take().is_some();
            let writer = if had_archive {
                info!(archive = %self.path.display(), "updating existing archive");
                fs::copy(&self.path, &self.staged)?;
                let file = OpenOptions::new().read(true).write(true).open(&self.staged)?;
                ZipWriter::new_append(file)?
            } else {
                info!(archive = %self.path.display(), "creating new archive");
                ZipWriter::new(File::create(&self.staged)?)
            };
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| SweepError::Archive("archive writer unavailable".into()))
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Flush the directory entry after a rename. Not every platform can open a
/// directory, so a failure here is only logged.
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else { return };
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(dir = %parent.display(), error = %e, "could not sync archive directory");
    }
}

impl ArchiveSink for ZipArchiveSink {
    fn existing(&mut self, name: &str) -> Result<Option<Vec<u8>>, SweepError> {
        if self.writer.is_some() {
            return Err(SweepError::Archive("archive lookups must precede appends".into()));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut entry = match reader.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn append(&mut self, name: &str, contents: &[u8]) -> Result<(), SweepError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let writer = self.writer()?;
        writer.start_file(name, options)?;
        writer.write_all(contents)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SweepError> {
        if let Some(writer) = self.writer.take() {
            let file = writer.finish()?;
            file.sync_all()?;
            drop(file);
            fs::rename(&self.staged, &self.path)?;
            sync_parent(&self.path);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// New entries written.
    pub archived: usize,
    /// Sources whose identical bytes were already in the archive.
    pub already_archived: usize,
    pub removed: usize,
    pub removal_failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransientCleanup {
    pub removed: usize,
    pub failed: usize,
}

pub struct Archiver {
    output_dir: PathBuf,
    transient_extensions: Vec<String>,
}

impl Archiver {
    pub fn new<P: AsRef<Path>>(output_dir: P, transient_extensions: &[String]) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            transient_extensions: transient_extensions.to_vec(),
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(&config.output_dir, &config.transient_extensions)
    }

    /// Write every artifact into `sink`, then delete the sources. On any
    /// error before the sink is committed, no source is deleted.
    pub fn archive<A: ArchiveSink>(&self, sink: &mut A, complete: &[RangeArtifact]) -> Result<ArchiveOutcome, SweepError> {
        let mut outcome = ArchiveOutcome::default();
        if complete.is_empty() {
            return Ok(outcome);
        }

        let mut pending = Vec::with_capacity(complete.len());
        for artifact in complete {
            match sink.existing(&artifact.file_name)? {
                None => pending.push(artifact),
                Some(stored) => {
                    let source = fs::read(&artifact.path)?;
                    if stored != source {
                        return Err(SweepError::Archive(format!(
                            "{} is already archived with different content",
                            artifact.file_name
                        )));
                    }
                    info!(artifact = %artifact.file_name, "already archived, source left over from an earlier run");
                    outcome.already_archived += 1;
                }
            }
        }

        let written = pending.iter().try_for_each(|artifact| {
            let contents = fs::read(&artifact.path)?;
            info!(artifact = %artifact.file_name, bytes = contents.len(), "adding to archive");
            sink.append(&artifact.file_name, &contents)
        });
        if let Err(e) = written {
            error!(error = %e, "archive operation failed, source files were not removed");
            // Keep whatever was written readable; the sources stay either way.
            if let Err(commit_err) = sink.commit() {
                error!(error = %commit_err, "could not finalise partial archive");
            }
            return Err(e);
        }
        sink.commit()?;
        outcome.archived = pending.len();
        info!(archived = outcome.archived, "archive operation successful");

        for artifact in complete {
            match fs::remove_file(&artifact.path) {
                Ok(()) => outcome.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(artifact = %artifact.path.display(), "file already removed or missing");
                }
                Err(e) => {
                    error!(artifact = %artifact.path.display(), error = %e, "failed to remove archived file");
                    outcome.removal_failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Best-effort removal of side-files with a transient extension.
    pub fn sweep_transients(&self) -> TransientCleanup {
        let mut cleanup = TransientCleanup::default();
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %self.output_dir.display(), error = %e, "cannot list output directory for cleanup");
                }
                return cleanup;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let transient = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.transient_extensions.iter().any(|t| t == ext));
            if !transient || !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => cleanup.removed += 1,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to remove transient file");
                    cleanup.failed += 1;
                }
            }
        }
        cleanup
    }
}

/// Counts printed at the end of a consolidation run.
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub complete: usize,
    pub incomplete: usize,
    pub invalid: usize,
    pub malformed: usize,
    pub archive: ArchiveOutcome,
    pub transients: TransientCleanup,
    /// Set when archiving did not happen or did not finish.
    pub failure: Option<SweepError>,
}

/// Reconcile the output directory against `Completed` and archive what is complete.
pub fn consolidate(config: &SweepConfig) -> Result<ConsolidationReport, SweepError> {
    let completed = config.ledger().load(LedgerState::Completed)?;
    info!(completed = completed.len(), "loaded completed IDs");

    let naming = ArtifactName::from_config(config);
    let reconciliation = reconciler::reconcile(&config.output_dir, &naming, config.k_step, &completed)?;
    let complete = reconciliation.complete();

    let mut report = ConsolidationReport {
        complete: reconciliation.count_complete(),
        incomplete: reconciliation.count_incomplete(),
        invalid: reconciliation.count_invalid(),
        malformed: reconciliation.malformed.len(),
        ..Default::default()
    };

    let archiver = Archiver::from_config(config);
    if complete.is_empty() {
        info!("no completed range files found meeting the criteria for archiving");
    } else {
        info!(count = complete.len(), archive = %config.archive_path().display(), "range files ready for archiving");
        let result = ZipArchiveSink::open(config.archive_path())
            .and_then(|mut sink| archiver.archive(&mut sink, &complete));
        match result {
            Ok(outcome) => report.archive = outcome,
            Err(e) => report.failure = Some(e),
        }
    }

    report.transients = archiver.sweep_transients();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_space::KRange;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemorySink {
        entries: BTreeMap<String, Vec<u8>>,
        fail_on: Option<String>,
        commits: usize,
    }

    impl ArchiveSink for MemorySink {
        fn existing(&mut self, name: &str) -> Result<Option<Vec<u8>>, SweepError> {
            Ok(self.entries.get(name).cloned())
        }

        fn append(&mut self, name: &str, contents: &[u8]) -> Result<(), SweepError> {
            if self.fail_on.as_deref() == Some(name) {
                return Err(SweepError::Archive(format!("injected failure on {}", name)));
            }
            self.entries.insert(name.to_string(), contents.to_vec());
            Ok(())
        }

        fn commit(&mut self) -> Result<(), SweepError> {
            self.commits += 1;
            Ok(())
        }
    }

    fn artifacts(dir: &Path, kmins: &[u64]) -> Vec<RangeArtifact> {
        kmins
            .iter()
            .map(|&kmin| {
                let file_name = format!("uni_1024_{}_{}.txt", kmin, kmin + 8);
                let path = dir.join(&file_name);
                fs::write(&path, format!("results for {}", kmin)).unwrap();
                RangeArtifact { path, file_name, range: KRange::new(1024, kmin, kmin + 8, 2) }
            })
            .collect()
    }

    #[test]
    fn test_archive_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let batch = artifacts(dir.path(), &[1, 9, 17]);
        let mut sink = MemorySink::default();

        let outcome = Archiver::new(dir.path(), &[]).archive(&mut sink, &batch).unwrap();
        assert_eq!(outcome.archived, 3);
        assert_eq!(outcome.removed, 3);
        assert_eq!(sink.commits, 1);
        assert_eq!(sink.entries["uni_1024_9_17.txt"], b"results for 9");
        assert!(batch.iter().all(|a| !a.path.exists()));
    }

    #[test]
    fn test_write_failure_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let batch = artifacts(dir.path(), &[1, 9, 17]);
        let mut sink = MemorySink { fail_on: Some("uni_1024_9_17.txt".into()), ..Default::default() };

        let result = Archiver::new(dir.path(), &[]).archive(&mut sink, &batch);
        assert!(result.is_err());
        assert!(batch.iter().all(|a| a.path.exists()));
        // The entry written before the failure is kept and finalised.
        assert!(sink.entries.contains_key("uni_1024_1_9.txt"));
        assert_eq!(sink.commits, 1);
    }

    #[test]
    fn test_identical_leftover_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let batch = artifacts(dir.path(), &[1, 9]);
        let mut sink = MemorySink::default();
        sink.entries.insert("uni_1024_1_9.txt".into(), b"results for 1".to_vec());

        let outcome = Archiver::new(dir.path(), &[]).archive(&mut sink, &batch).unwrap();
        assert_eq!(outcome.already_archived, 1);
        assert_eq!(outcome.archived, 1);
        assert_eq!(outcome.removed, 2);
    }

    #[test]
    fn test_conflicting_leftover_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let batch = artifacts(dir.path(), &[1, 9]);
        let mut sink = MemorySink::default();
        sink.entries.insert("uni_1024_9_17.txt".into(), b"something else".to_vec());

        assert!(Archiver::new(dir.path(), &[]).archive(&mut sink, &batch).is_err());
        assert!(batch.iter().all(|a| a.path.exists()));
        assert!(!sink.entries.contains_key("uni_1024_1_9.txt"));
    }

    #[test]
    fn test_zip_sink_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive_ranges.zip");

        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        assert_eq!(sink.existing("a.txt").unwrap(), None);
        sink.append("a.txt", b"first").unwrap();
        sink.commit().unwrap();

        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        assert_eq!(sink.existing("a.txt").unwrap(), Some(b"first".to_vec()));
        sink.append("b.txt", b"second").unwrap();
        assert!(sink.existing("a.txt").is_err());
        sink.commit().unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut text = String::new();
        zip.by_name("b.txt").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "second");
    }

    #[test]
    fn test_interrupted_append_keeps_earlier_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive_ranges.zip");

        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        sink.append("uni_16_1_5.txt", b"first").unwrap();
        sink.commit().unwrap();

        // Killed after writing the next entry but before finalising it.
        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        sink.append("uni_16_5_8.txt", b"second").unwrap();
        std::mem::forget(sink);
        assert!(dir.path().join("archive_ranges.zip.partial").exists());

        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        assert!(!dir.path().join("archive_ranges.zip.partial").exists());
        assert_eq!(sink.existing("uni_16_1_5.txt").unwrap(), Some(b"first".to_vec()));
        assert_eq!(sink.existing("uni_16_5_8.txt").unwrap(), None);

        sink.append("uni_16_5_8.txt", b"second").unwrap();
        sink.commit().unwrap();
        let zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
    }

    #[test]
    fn test_first_archive_appears_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive_ranges.zip");

        let mut sink = ZipArchiveSink::open(&archive).unwrap();
        sink.append("uni_16_1_5.txt", b"first").unwrap();
        assert!(!archive.exists());
        sink.commit().unwrap();
        assert!(archive.exists());
        assert!(!dir.path().join("archive_ranges.zip.partial").exists());
    }

    #[test]
    fn test_unreadable_archive_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive_ranges.zip");
        fs::write(&archive, b"not a zip").unwrap();
        assert!(matches!(ZipArchiveSink::open(&archive), Err(SweepError::Archive(_))));
        assert_eq!(fs::read(&archive).unwrap(), b"not a zip");
    }

    #[test]
    fn test_sweep_transients() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("uni_1024_1_9.title"), "t").unwrap();
        fs::write(dir.path().join("uni_1024_9_17.title"), "t").unwrap();
        fs::write(dir.path().join("uni_1024_9_17.txt"), "keep").unwrap();

        let cleanup = Archiver::new(dir.path(), &["title".to_string()]).sweep_transients();
        assert_eq!(cleanup, TransientCleanup { removed: 2, failed: 0 });
        assert!(dir.path().join("uni_1024_9_17.txt").exists());

        let missing = Archiver::new(dir.path().join("nope"), &["title".to_string()]).sweep_transients();
        assert_eq!(missing, TransientCleanup::default());
    }
}
