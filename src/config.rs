use crate::id_space::{self, KRange};
use crate::ledger::Ledger;
use crate::SweepError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a submission or consolidation run needs to know.
///
/// Every field has a default, so a JSON config file only has to name what it
/// changes. Paths are used as given; relative paths resolve against the
/// directory the run is started from, which is also where batch jobs `cd` to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Space size. `k` ranges over `[1, n/2)`.
    pub n: u64,
    /// IDs per range. The range width in k-units is `ids_per_range * k_step`.
    pub ids_per_range: u64,
    pub k_step: u64,
    /// Upper bound on ranges planned by one submission run.
    pub max_jobs: usize,

    pub description_dir: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    pub started_ledger: PathBuf,
    pub completed_ledger: PathBuf,
    /// Archive file name inside `output_dir`.
    pub archive_name: String,
    pub artifact_prefix: String,
    pub artifact_extension: String,
    /// Side-file extensions in `output_dir` removed after consolidation.
    pub transient_extensions: Vec<String>,

    pub executable: PathBuf,
    pub executable_flag: String,
    pub mode: String,
    pub min_units: u32,
    pub max_units: u32,

    pub job: JobConfig,
    pub submit_command: String,
    pub submit_delay_ms: u64,
    pub staging: Option<StagingConfig>,
}

/// Values that go into the batch job script header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub name_prefix: String,
    pub account: String,
    pub walltime: String,
    pub threads: u32,
}

/// Where to copy the executable and its data files from before submitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub source_dir: PathBuf,
    pub layer_prefix: String,
    pub layer_count: u32,
    pub layer_extensions: Vec<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n: 1 << 21,
            ids_per_range: 512,
            k_step: id_space::DEFAULT_K_STEP,
            max_jobs: 128,
            description_dir: PathBuf::from("configs"),
            log_dir: PathBuf::from("logs"),
            output_dir: PathBuf::from("out"),
            started_ledger: PathBuf::from("started_ids.txt"),
            completed_ledger: PathBuf::from("completed_ids.txt"),
            archive_name: "archive_ranges.zip".to_string(),
            artifact_prefix: "uni".to_string(),
            artifact_extension: "txt".to_string(),
            transient_extensions: vec!["title".to_string()],
            executable: PathBuf::from("./sqct"),
            executable_flag: "-G".to_string(),
            mode: "UNIFORM".to_string(),
            min_units: 0,
            max_units: 100,
            job: JobConfig::default(),
            submit_command: "qsub".to_string(),
            submit_delay_ms: 500,
            staging: None,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name_prefix: "sqct".to_string(),
            account: "sqct".to_string(),
            walltime: "4800:00:00".to_string(),
            threads: 1,
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("../build"),
            layer_prefix: "bfs-layer".to_string(),
            layer_count: 19,
            layer_extensions: vec!["ind.bin".to_string(), "uni.bin".to_string()],
        }
    }
}

impl SweepConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SweepError::Config(format!("cannot read config {}: {}", path.display(), e)))?;
        let config: SweepConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Rebase every relative path onto `base`. Used to run against an isolated
    /// directory tree.
    pub fn rooted_at<P: AsRef<Path>>(mut self, base: P) -> Self {
        let base = base.as_ref();
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.description_dir);
        rebase(&mut self.log_dir);
        rebase(&mut self.output_dir);
        rebase(&mut self.started_ledger);
        rebase(&mut self.completed_ledger);
        rebase(&mut self.executable);
        if let Some(staging) = self.staging.as_mut() {
            rebase(&mut staging.source_dir);
        }
        self
    }

    /// Reject values no run can work with. Called before anything is mutated.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.k_step == 0 {
            return Err(SweepError::Config("k_step must be a positive integer".into()));
        }
        if self.ids_per_range == 0 {
            return Err(SweepError::Config("ids_per_range must be a positive integer".into()));
        }
        if self.ids_per_range.checked_mul(self.k_step).is_none() {
            return Err(SweepError::Config("ids_per_range * k_step overflows".into()));
        }
        if self.n < 4 {
            return Err(SweepError::Config(format!("n = {} leaves no k in [1, n/2)", self.n)));
        }
        if self.max_jobs == 0 {
            return Err(SweepError::Config("max_jobs must be a positive integer".into()));
        }
        if self.artifact_prefix.is_empty() || self.artifact_prefix.contains('_') {
            return Err(SweepError::Config(format!(
                "artifact_prefix '{}' must be non-empty and free of '_'",
                self.artifact_prefix
            )));
        }
        if self.artifact_extension.is_empty() {
            return Err(SweepError::Config("artifact_extension must be non-empty".into()));
        }
        if self.archive_name.is_empty() || self.archive_name.contains('/') {
            return Err(SweepError::Config(format!("archive_name '{}' must be a bare file name", self.archive_name)));
        }
        Ok(())
    }

    /// Range width in k-units.
    pub fn range_width(&self) -> u64 {
        self.ids_per_range * self.k_step
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.started_ledger, &self.completed_ledger)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(&self.archive_name)
    }

    pub fn artifact_file_name(&self, range: KRange) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.artifact_prefix, range.n, range.kmin, range.kmax, self.artifact_extension
        )
    }

    pub fn output_path(&self, range: KRange) -> PathBuf {
        self.output_dir.join(self.artifact_file_name(range))
    }

    pub fn description_path(&self, range: KRange) -> PathBuf {
        self.description_dir
            .join(format!("config_{}_{}_{}.txt", range.n, range.kmin, range.kmax))
    }

    pub fn job_name(&self, range: KRange) -> String {
        format!("{}_{}_{}_{}", self.job.name_prefix, range.n, range.kmin, range.kmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_run() {
        let config = SweepConfig::default();
        assert_eq!(config.n, 2_097_152);
        assert_eq!(config.range_width(), 1024);
        assert_eq!(config.max_jobs, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, r#"{ "n": 1024, "ids_per_range": 4, "job": { "account": "proj42" } }"#).unwrap();

        let config = SweepConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n, 1024);
        assert_eq!(config.range_width(), 8);
        assert_eq!(config.job.account, "proj42");
        assert_eq!(config.job.walltime, "4800:00:00");
        assert_eq!(config.artifact_prefix, "uni");
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, "{ n: ").unwrap();
        assert!(matches!(SweepConfig::from_json_file(&path), Err(SweepError::Json(_))));
        assert!(matches!(
            SweepConfig::from_json_file(dir.path().join("absent.json")),
            Err(SweepError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let cases: Vec<Box<dyn Fn(&mut SweepConfig)>> = vec![
            Box::new(|c| c.ids_per_range = 0),
            Box::new(|c| c.k_step = 0),
            Box::new(|c| c.n = 3),
            Box::new(|c| c.max_jobs = 0),
            Box::new(|c| c.artifact_prefix = "my_uni".into()),
            Box::new(|c| c.artifact_extension.clear()),
            Box::new(|c| c.archive_name = "a/b.zip".into()),
        ];
        for mutate in cases {
            let mut config = SweepConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(SweepError::Config(_))));
        }
    }

    #[test]
    fn test_naming() {
        let config = SweepConfig::default();
        let range = KRange::new(2_097_152, 1, 1025, 2);
        assert_eq!(config.artifact_file_name(range), "uni_2097152_1_1025.txt");
        assert_eq!(config.output_path(range), PathBuf::from("out/uni_2097152_1_1025.txt"));
        assert_eq!(config.description_path(range), PathBuf::from("configs/config_2097152_1_1025.txt"));
        assert_eq!(config.job_name(range), "sqct_2097152_1_1025");
    }

    #[test]
    fn test_rooted_at_rebases_relative_paths() {
        let mut config = SweepConfig::default();
        config.completed_ledger = PathBuf::from("/var/sweep/completed.txt");
        let config = config.rooted_at("/scratch/run1");
        assert_eq!(config.output_dir, PathBuf::from("/scratch/run1/out"));
        assert_eq!(config.started_ledger, PathBuf::from("/scratch/run1/started_ids.txt"));
        assert_eq!(config.completed_ledger, PathBuf::from("/var/sweep/completed.txt"));
        assert_eq!(config.archive_path(), PathBuf::from("/scratch/run1/out/archive_ranges.zip"));
    }
}
