use crate::id_space::KRange;
use crate::job_script;
use crate::ledger::{Ledger, LedgerState};
use crate::planner::{Plan, PlannedRange};
use crate::range_description::RangeDescription;
use crate::scheduler::{JobId, JobScheduler, JobUnit};
use crate::{SweepConfig, SweepError};
use std::fs;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Create the run's directories and both ledger logs.
pub fn prepare_run_dirs(config: &SweepConfig) -> Result<(), SweepError> {
    for dir in [&config.description_dir, &config.log_dir, &config.output_dir] {
        fs::create_dir_all(dir)?;
    }
    config.ledger().touch()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeFailure {
    /// The range description could not be written.
    Description(String),
    /// The scheduler refused the job.
    Rejected(String),
    /// The scheduler went away while this range was being submitted.
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub planned: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Planned ranges never attempted because the run was aborted.
    pub not_attempted: usize,
    pub jobs: Vec<(KRange, JobId)>,
    /// Ranges left claimed in `Started` without a running job.
    pub failures: Vec<(KRange, RangeFailure)>,
    /// Set when shared infrastructure broke and the rest of the plan was dropped.
    pub abort: Option<SweepError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.errored == 0 && self.abort.is_none()
    }
}

pub struct Dispatcher<'a, S: JobScheduler> {
    config: &'a SweepConfig,
    ledger: Ledger,
    scheduler: S,
    pause: Duration,
}

impl<'a, S: JobScheduler> Dispatcher<'a, S> {
    pub fn new(config: &'a SweepConfig, scheduler: S) -> Self {
        Self {
            config,
            ledger: config.ledger(),
            scheduler,
            pause: Duration::from_millis(config.submit_delay_ms),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> S {
        self.scheduler
    }

    /// `Started` is appended before anything is submitted, so a range whose
    /// submission fails stays claimed and is not retried automatically.
    pub fn dispatch(&mut self, plan: &Plan) -> DispatchReport {
        let mut report = DispatchReport {
            planned: plan.ranges.len(),
            skipped: plan.skipped.len(),
            ..Default::default()
        };

        for (index, planned) in plan.ranges.iter().enumerate() {
            let range = planned.range;

            if let Err(e) = self.ledger.append(LedgerState::Started, &planned.ids) {
                error!(kmin = range.kmin, kmax = range.kmax, error = %e, "cannot record range as started, stopping");
                report.errored += 1;
                report.not_attempted = plan.ranges.len() - index - 1;
                report.abort = Some(e);
                break;
            }
            info!(kmin = range.kmin, kmax = range.kmax, ids = planned.ids.len(), "range marked as started");

            match self.submit_range(planned) {
                Ok(job_id) => {
                    report.submitted += 1;
                    info!(
                        kmin = range.kmin,
                        kmax = range.kmax,
                        %job_id,
                        "submitted job {}/{}",
                        report.submitted,
                        self.config.max_jobs
                    );
                    report.jobs.push((range, job_id));
                }
                Err(failure) => {
                    report.errored += 1;
                    warn!(
                        kmin = range.kmin,
                        kmax = range.kmax,
                        ?failure,
                        "range recorded as started but not submitted"
                    );
                    let fatal = matches!(failure, RangeFailure::Unavailable(_));
                    if let RangeFailure::Unavailable(reason) = &failure {
                        report.abort = Some(SweepError::Scheduler(crate::SchedulerError::Unavailable(reason.clone())));
                    }
                    report.failures.push((range, failure));
                    if fatal {
                        report.not_attempted = plan.ranges.len() - index - 1;
                        break;
                    }
                }
            }

            if !self.pause.is_zero() && index + 1 < plan.ranges.len() {
                thread::sleep(self.pause);
            }
        }

        report
    }

    fn submit_range(&mut self, planned: &PlannedRange) -> Result<JobId, RangeFailure> {
        let range = planned.range;
        let description_path = self.config.description_path(range);
        RangeDescription::for_range(self.config, range)
            .write_to(&description_path)
            .map_err(|e| RangeFailure::Description(e.to_string()))?;

        let unit = JobUnit {
            name: self.config.job_name(range),
            range,
            ids: planned.ids.clone(),
            description_path,
            script: job_script::render(self.config, range, &planned.ids),
        };

        self.scheduler.submit(&unit).map_err(|e| match e {
            crate::SchedulerError::Unavailable(reason) => RangeFailure::Unavailable(reason),
            rejected => RangeFailure::Rejected(rejected.to_string()),
        })
    }
}
