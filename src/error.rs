use std::fmt;

/// Failure modes of the external job scheduler.
#[derive(Debug)]
pub enum SchedulerError {
    /// The scheduler could not be reached at all. Nothing further can be submitted.
    Unavailable(String),
    /// The scheduler ran but refused this particular job.
    Rejected {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl SchedulerError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SchedulerError::Unavailable(_))
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Unavailable(e) => write!(f, "scheduler unavailable: {}", e),
            SchedulerError::Rejected { status, stdout, stderr } => {
                match status {
                    Some(code) => write!(f, "job rejected (exit code {})", code)?,
                    None => write!(f, "job rejected")?,
                }
                if !stdout.trim().is_empty() {
                    write!(f, "; stdout: {}", stdout.trim())?;
                }
                if !stderr.trim().is_empty() {
                    write!(f, "; stderr: {}", stderr.trim())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

#[derive(Debug)]
pub enum SweepError {
    Config(String),
    Io(std::io::Error),
    Ledger(String),
    Scheduler(SchedulerError),
    Archive(String),
    Zip(zip::result::ZipError),
    Json(serde_json::Error),
    Other(String),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(e) => write!(f, "Configuration error: {}", e),
            SweepError::Io(e) => write!(f, "IO error: {}", e),
            SweepError::Ledger(e) => write!(f, "Ledger error: {}", e),
            SweepError::Scheduler(e) => write!(f, "Scheduler error: {}", e),
            SweepError::Archive(e) => write!(f, "Archive error: {}", e),
            SweepError::Zip(e) => write!(f, "Zip error: {}", e),
            SweepError::Json(e) => write!(f, "JSON error: {}", e),
            SweepError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Io(e) => Some(e),
            SweepError::Scheduler(e) => Some(e),
            SweepError::Zip(e) => Some(e),
            SweepError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        SweepError::Io(err)
    }
}

impl From<SchedulerError> for SweepError {
    fn from(err: SchedulerError) -> Self {
        SweepError::Scheduler(err)
    }
}

impl From<zip::result::ZipError> for SweepError {
    fn from(err: zip::result::ZipError) -> Self {
        SweepError::Zip(err)
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        SweepError::Json(err)
    }
}

impl From<String> for SweepError {
    fn from(err: String) -> Self {
        SweepError::Other(err)
    }
}

impl From<&str> for SweepError {
    fn from(err: &str) -> Self {
        SweepError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_streams() {
        let err = SchedulerError::Rejected {
            status: Some(38),
            stdout: String::new(),
            stderr: "qsub: Unknown queue\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("exit code 38"));
        assert!(text.contains("Unknown queue"));
        assert!(!text.contains("stdout"));
    }

    #[test]
    fn test_unavailable_is_distinguishable() {
        assert!(SchedulerError::Unavailable("qsub not found".into()).is_unavailable());
        let rejected = SchedulerError::Rejected { status: None, stdout: String::new(), stderr: String::new() };
        assert!(!rejected.is_unavailable());
    }
}
