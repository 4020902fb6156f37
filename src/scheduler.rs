use crate::id_space::{IndividualId, KRange};
use crate::ledger::{Ledger, LedgerState};
use crate::runner::ComputationRunner;
use crate::SchedulerError;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Opaque identifier handed back by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One range, ready to hand to a scheduler.
#[derive(Debug, Clone)]
pub struct JobUnit {
    pub name: String,
    pub range: KRange,
    pub ids: Vec<IndividualId>,
    pub description_path: PathBuf,
    /// Batch script text. Schedulers that run work themselves may ignore it.
    pub script: String,
}

pub trait JobScheduler {
    fn submit(&mut self, unit: &JobUnit) -> Result<JobId, SchedulerError>;
}

/// Pipes the job script into a `qsub`-style command and reads the job id from stdout.
#[derive(Debug, Clone)]
pub struct QsubScheduler {
    command: String,
}

impl QsubScheduler {
    pub fn new(command: &str) -> Self {
        Self { command: command.to_string() }
    }
}

impl JobScheduler for QsubScheduler {
    fn submit(&mut self, unit: &JobUnit) -> Result<JobId, SchedulerError> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    SchedulerError::Unavailable(format!("{} command not found: {}", self.command, e))
                }
                _ => SchedulerError::Unavailable(format!("cannot run {}: {}", self.command, e)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The exit status below is authoritative; a closed pipe shows up there.
            if let Err(e) = stdin.write_all(unit.script.as_bytes()) {
                warn!(job = %unit.name, error = %e, "failed writing job script to scheduler");
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SchedulerError::Unavailable(format!("lost {} process: {}", self.command, e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(SchedulerError::Rejected {
                status: output.status.code(),
                stdout,
                stderr,
            });
        }
        Ok(JobId(stdout.trim().to_string()))
    }
}

/// Runs each unit to completion in this process instead of queueing it.
///
/// Plays the role of the batch job itself: on exit 0 it records the range's
/// IDs as completed, on any other exit it leaves the ledger alone.
pub struct LocalScheduler<R: ComputationRunner> {
    runner: R,
    ledger: Ledger,
    runs: u64,
}

impl<R: ComputationRunner> LocalScheduler<R> {
    pub fn new(runner: R, ledger: Ledger) -> Self {
        Self { runner, ledger, runs: 0 }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: ComputationRunner> JobScheduler for LocalScheduler<R> {
    fn submit(&mut self, unit: &JobUnit) -> Result<JobId, SchedulerError> {
        self.runs += 1;
        let job_id = JobId(format!("local-{}", self.runs));

        let code = self
            .runner
            .run(&unit.description_path)
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;

        if code != 0 {
            warn!(job = %unit.name, exit_code = code, "computation failed, range not marked completed");
            return Err(SchedulerError::Rejected {
                status: Some(code),
                stdout: String::new(),
                stderr: format!("computation exited with {}", code),
            });
        }

        self.ledger
            .append(LedgerState::Completed, &unit.ids)
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;
        info!(job = %unit.name, %job_id, ids = unit.ids.len(), "range completed locally");
        Ok(job_id)
    }
}
