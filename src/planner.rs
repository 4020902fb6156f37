use crate::id_space::{self, IndividualId, KRange};
use crate::ledger::{self, IdSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRange {
    pub range: KRange,
    /// Every constituent ID, in order. Committed to the ledgers later.
    pub ids: Vec<IndividualId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRange {
    pub range: KRange,
    /// The first constituent ID already present in `Started`.
    pub first_started: IndividualId,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub ranges: Vec<PlannedRange>,
    pub skipped: Vec<SkippedRange>,
    /// True when planning stopped on the cap with ranges still unexamined.
    pub capped: bool,
}

impl Plan {
    pub fn id_count(&self) -> usize {
        self.ranges.iter().map(|p| p.ids.len()).sum()
    }
}

pub struct RangePlanner {
    n: u64,
    width: u64,
    step: u64,
    cap: usize,
}

impl RangePlanner {
    pub fn new(n: u64, width: u64, step: u64, cap: usize) -> Self {
        Self { n, width, step, cap }
    }

    pub fn from_config(config: &crate::SweepConfig) -> Self {
        Self::new(config.n, config.range_width(), config.k_step, config.max_jobs)
    }

    /// Walk the partition in increasing `kmin` order until `cap` ranges are planned.
    pub fn plan(&self, started: &IdSet) -> Plan {
        let mut plan = Plan::default();
        let mut ranges = id_space::partition(self.n, self.width, self.step).peekable();

        while let Some(range) = ranges.next() {
            if let Some(first_started) = ledger::first_present(started, range) {
                debug!(kmin = range.kmin, kmax = range.kmax, id = %first_started, "range already claimed");
                plan.skipped.push(SkippedRange { range, first_started });
                continue;
            }

            let ids = range.id_list();
            if ids.is_empty() {
                continue;
            }
            plan.ranges.push(PlannedRange { range, ids });

            if plan.ranges.len() >= self.cap {
                plan.capped = ranges.peek().is_some();
                break;
            }
        }

        plan
    }
}
