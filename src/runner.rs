use crate::SweepError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// The external computation, seen only through its exit code.
///
/// Exit code 0 means the range's artifact was fully written. Anything else
/// means the artifact must not be trusted.
pub trait ComputationRunner {
    /// Run against one range description. `Err` means the computation could
    /// not be started at all.
    fn run(&self, description: &Path) -> Result<i32, SweepError>;
}

/// Runs `executable flag description` as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
    flag: String,
    threads: u32,
}

impl ProcessRunner {
    pub fn new<P: AsRef<Path>>(executable: P, flag: &str, threads: u32) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            flag: flag.to_string(),
            threads,
        }
    }

    pub fn from_config(config: &crate::SweepConfig) -> Self {
        Self::new(&config.executable, &config.executable_flag, config.job.threads)
    }
}

impl ComputationRunner for ProcessRunner {
    fn run(&self, description: &Path) -> Result<i32, SweepError> {
        debug!(executable = %self.executable.display(), description = %description.display(), "running computation");
        let mut command = Command::new(&self.executable);
        if !self.flag.is_empty() {
            command.arg(&self.flag);
        }
        let status = command
            .arg(description)
            .env("OMP_NUM_THREADS", self.threads.to_string())
            .status()
            .map_err(|e| SweepError::Other(format!("cannot start {}: {}", self.executable.display(), e)))?;
        // Killed by a signal: no code, never a success.
        Ok(status.code().unwrap_or(-1))
    }
}
