pub mod archiver;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod id_space;
pub mod job_script;
pub mod ledger;
pub mod planner;
pub mod range_description;
pub mod reconciler;
pub mod runner;
pub mod scheduler;
pub mod staging;

pub use config::SweepConfig;
pub use error::*;

use tracing_subscriber::EnvFilter;

/// Install a stderr `tracing` subscriber. The filter comes from `SWEEP_LOG`,
/// then `RUST_LOG`, then defaults to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("SWEEP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
