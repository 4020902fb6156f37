use clap::Parser;
use std::path::PathBuf;
use sweep::ledger::{Ledger, LedgerState};
use sweep::{SweepConfig, SweepError};

#[derive(Parser)]
#[command(name = "ledger_checker")]
#[command(about = "Inspect the started/completed ledgers", long_about = None)]
struct Cli {
    /// JSON config file naming the ledger paths
    #[arg(long)]
    config: Option<PathBuf>,
    /// List IDs that are started but not completed
    #[arg(long)]
    in_flight: bool,
    /// Stop listing after this many IDs
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn main() -> Result<(), SweepError> {
    sweep::init_tracing();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SweepConfig::from_json_file(path)?,
        None => SweepConfig::default(),
    };
    let ledger: Ledger = config.ledger();

    let started = ledger.scan(LedgerState::Started)?;
    let completed = ledger.scan(LedgerState::Completed)?;
    let mut in_flight: Vec<_> = started.ids.difference(&completed.ids).copied().collect();
    in_flight.sort();
    let never_started = completed.ids.difference(&started.ids).count();

    println!("started:   {} IDs ({} lines, {} unparseable)", started.ids.len(), started.lines, started.malformed);
    println!("completed: {} IDs ({} lines, {} unparseable)", completed.ids.len(), completed.lines, completed.malformed);
    println!("in flight: {}", in_flight.len());
    println!("completed without a started record: {}", never_started);
    if started.torn_tail || completed.torn_tail {
        println!("warning: a ledger ends in a partial line");
    }

    if cli.in_flight {
        for id in in_flight.iter().take(cli.limit) {
            println!("  {}", id);
        }
        if in_flight.len() > cli.limit {
            println!("  ... {} more", in_flight.len() - cli.limit);
        }
    }
    Ok(())
}
