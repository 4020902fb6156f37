use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use std::path::PathBuf;
use sweep::archiver::{self, ConsolidationReport};
use sweep::dispatcher::{self, DispatchReport, Dispatcher};
use sweep::ledger::LedgerState;
use sweep::planner::{Plan, RangePlanner};
use sweep::reconciler::{self, ArtifactName, Classification};
use sweep::runner::ProcessRunner;
use sweep::scheduler::{LocalScheduler, QsubScheduler};
use sweep::{staging, SweepConfig, SweepError};
use tracing::info;

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Partition an ID space into ranges, submit them, and archive completed results", long_about = None)]
struct Cli {
    /// JSON config file; unset fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Overrides {
    /// Space size n
    #[arg(long, global = true)]
    n: Option<u64>,
    /// IDs per range
    #[arg(long, global = true)]
    ids_per_range: Option<u64>,
    /// Maximum ranges to submit in this run
    #[arg(long, global = true)]
    max_jobs: Option<usize>,
    /// Scheduler account string
    #[arg(long, global = true)]
    account: Option<String>,
    /// Command the job script is piped into
    #[arg(long, global = true)]
    submit_command: Option<String>,
    /// Pause between submissions, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim unstarted ranges and submit them
    Submit {
        /// Run each range here instead of queueing it with the scheduler
        #[arg(long)]
        local: bool,
    },
    /// Show which ranges a submission would claim, without changing anything
    Plan,
    /// Report artifact completion and ledger sizes, without changing anything
    Status {
        /// Print the missing IDs of incomplete artifacts
        #[arg(long)]
        missing: bool,
    },
    /// Archive complete artifacts and clean up transient files
    Archive,
}

fn load_config(cli: &Cli) -> Result<SweepConfig, SweepError> {
    let mut config = match &cli.config {
        Some(path) => SweepConfig::from_json_file(path)?,
        None => SweepConfig::default(),
    };
    let o = &cli.overrides;
    if let Some(n) = o.n {
        config.n = n;
    }
    if let Some(ids) = o.ids_per_range {
        config.ids_per_range = ids;
    }
    if let Some(max_jobs) = o.max_jobs {
        config.max_jobs = max_jobs;
    }
    if let Some(account) = &o.account {
        config.job.account = account.clone();
    }
    if let Some(cmd) = &o.submit_command {
        config.submit_command = cmd.clone();
    }
    if let Some(delay) = o.delay_ms {
        config.submit_delay_ms = delay;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), SweepError> {
    sweep::init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Submit { local } => submit(&config, local),
        Commands::Plan => plan(&config),
        Commands::Status { missing } => status(&config, missing),
        Commands::Archive => archive(&config),
    }
}

fn print_configuration(config: &SweepConfig) {
    info!(
        n = config.n,
        max_k = sweep::id_space::max_k(config.n),
        ids_per_range = config.ids_per_range,
        max_jobs = config.max_jobs,
        description_dir = %config.description_dir.display(),
        output_dir = %config.output_dir.display(),
        executable = %config.executable.display(),
        log_dir = %config.log_dir.display(),
        account = %config.job.account,
        walltime = %config.job.walltime,
        "configuration"
    );
}

fn load_plan(config: &SweepConfig) -> Result<Plan, SweepError> {
    let started = config.ledger().load(LedgerState::Started)?;
    info!(started = started.len(), "loaded previously started IDs");
    Ok(RangePlanner::from_config(config).plan(&started))
}

fn submit(config: &SweepConfig, local: bool) -> Result<(), SweepError> {
    info!("starting submission process");
    print_configuration(config);

    staging::stage(config)?;
    staging::check_executable(&config.executable)?;
    dispatcher::prepare_run_dirs(config)?;

    let plan = load_plan(config)?;
    let report = if local {
        let scheduler = LocalScheduler::new(ProcessRunner::from_config(config), config.ledger());
        Dispatcher::new(config, scheduler).dispatch(&plan)
    } else {
        Dispatcher::new(config, QsubScheduler::new(&config.submit_command)).dispatch(&plan)
    };

    print_dispatch_summary(config, &plan, &report);
    match report.abort {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_dispatch_summary(config: &SweepConfig, plan: &Plan, report: &DispatchReport) {
    println!("-------------------------------------");
    println!("Submission process finished.");
    println!("Ranges Planned:       {} (Max was {})", report.planned, config.max_jobs);
    println!("Jobs Submitted:       {}", report.submitted);
    println!(
        "Ranges Skipped:       {} (due to existing IDs in {})",
        report.skipped,
        config.started_ledger.display()
    );
    println!("Submission Errors:    {}", report.errored);
    if report.not_attempted > 0 {
        println!("Not Attempted:        {}", report.not_attempted);
    }
    if plan.capped {
        println!("Reached max_jobs limit ({}); rerun to continue.", config.max_jobs);
    }
    for (range, failure) in &report.failures {
        println!("  claimed but not running: {} {:?}", range, failure);
    }
    if !report.failures.is_empty() {
        println!(
            "These ranges stay in {} and will not be resubmitted automatically.",
            config.started_ledger.display()
        );
    }
    println!("-------------------------------------");
}

fn plan(config: &SweepConfig) -> Result<(), SweepError> {
    print_configuration(config);
    let plan = load_plan(config)?;
    for planned in &plan.ranges {
        println!(
            "{}  {} IDs  -> {}",
            planned.range,
            planned.ids.len(),
            config.artifact_file_name(planned.range)
        );
    }
    println!("-------------------------------------");
    println!("Ranges To Submit:     {} (Max is {})", plan.ranges.len(), config.max_jobs);
    println!("IDs To Claim:         {}", plan.id_count());
    println!("Ranges Skipped:       {}", plan.skipped.len());
    println!("-------------------------------------");
    Ok(())
}

fn status(config: &SweepConfig, show_missing: bool) -> Result<(), SweepError> {
    let ledger = config.ledger();
    let started = ledger.load(LedgerState::Started)?;
    let completed = ledger.load(LedgerState::Completed)?;
    let in_flight = started.difference(&completed).count();

    let naming = ArtifactName::from_config(config);
    let result = reconciler::reconcile(&config.output_dir, &naming, config.k_step, &completed)?;

    if show_missing {
        for item in &result.artifacts {
            if let Classification::Incomplete { missing } = &item.classification {
                println!("{}: missing {}", item.artifact.file_name, missing.iter().join(" "));
            }
        }
    }

    println!("-------------------------------------");
    println!("Started IDs:          {}", started.len());
    println!("Completed IDs:        {}", completed.len());
    println!("In Flight:            {}", in_flight);
    println!("Complete Artifacts:   {}", result.count_complete());
    println!("Incomplete Artifacts: {}", result.count_incomplete());
    println!("Invalid Artifacts:    {}", result.count_invalid());
    println!("Unparseable Names:    {}", result.malformed.len());
    println!("-------------------------------------");
    Ok(())
}

fn archive(config: &SweepConfig) -> Result<(), SweepError> {
    info!(output_dir = %config.output_dir.display(), "scanning for range files");
    let report = archiver::consolidate(config)?;
    print_consolidation_summary(config, &report);
    match report.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_consolidation_summary(config: &SweepConfig, report: &ConsolidationReport) {
    println!("-------------------------------------");
    println!("Archiving finished.");
    println!("Complete:             {}", report.complete);
    println!("Incomplete:           {}", report.incomplete);
    println!("Invalid Ranges:       {}", report.invalid);
    println!("Unparseable Names:    {}", report.malformed);
    println!("Archived:             {} (into {})", report.archive.archived, config.archive_path().display());
    if report.archive.already_archived > 0 {
        println!("Already Archived:     {}", report.archive.already_archived);
    }
    println!("Removed:              {}", report.archive.removed);
    if report.archive.removal_failed > 0 {
        println!("Failed Removals:      {}", report.archive.removal_failed);
    }
    println!(
        "Transient Files:      {} removed, {} failed",
        report.transients.removed, report.transients.failed
    );
    if report.failure.is_some() {
        println!("Archive operation failed; source files were NOT removed.");
    }
    println!("-------------------------------------");
}
