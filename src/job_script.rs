use crate::id_space::{IndividualId, KRange};
use crate::ledger::TORN_MARKER;
use crate::SweepConfig;
use std::fmt::Write;
use std::path::Path;

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '+' | '=' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn quote_path(p: &Path) -> String {
    shell_quote(&p.to_string_lossy())
}

/// Batch script for one range. It is the only place that sees the
/// computation's exit code, so it records the range's IDs as completed,
/// and only on exit 0.
pub fn render(config: &SweepConfig, range: KRange, ids: &[IndividualId]) -> String {
    let job = config.job_name(range);
    let description = config.description_path(range);
    let output = config.output_path(range);
    let ledger = quote_path(&config.completed_ledger);
    let (kmin, kmax, step) = (range.kmin, range.kmax, range.step);

    let mut s = String::new();
    let _ = writeln!(s, "#!/bin/bash");
    let _ = writeln!(s, "#PBS -N {}", job);
    let _ = writeln!(s, "#PBS -l select=1:ncpus={}", config.job.threads);
    let _ = writeln!(s, "#PBS -l walltime={}", config.job.walltime);
    let _ = writeln!(s, "#PBS -A {}", config.job.account);
    let _ = writeln!(s, "#PBS -o {}", config.log_dir.join(format!("{}.out", job)).display());
    let _ = writeln!(s, "#PBS -e {}", config.log_dir.join(format!("{}.err", job)).display());
    let _ = writeln!(s, "#PBS -j n");
    s.push('\n');
    s.push_str("echo \"PBS Job ID: $PBS_JOBID\"\n");
    s.push_str("echo \"Running on host: $(hostname)\"\n");
    s.push_str("echo \"Working directory: $PBS_O_WORKDIR\"\n");
    let _ = writeln!(s, "echo \"Processing config file: {}\"", description.display());
    let _ = writeln!(s, "echo \"Processing k range: [{}, {}) with step {}\"", kmin, kmax, step);
    let _ = writeln!(s, "echo \"Expecting output file: {}\"", output.display());
    s.push('\n');
    s.push_str("cd \"$PBS_O_WORKDIR\" || { echo \"Failed to cd to $PBS_O_WORKDIR\"; exit 1; }\n");
    s.push('\n');
    let _ = writeln!(s, "export OMP_NUM_THREADS={}", config.job.threads);
    let _ = writeln!(
        s,
        "{} {} {}",
        quote_path(&config.executable),
        shell_quote(&config.executable_flag),
        quote_path(&description)
    );
    s.push_str("EXIT_CODE=$?\n\n");
    s.push_str("echo \"Execution finished with exit code: $EXIT_CODE\"\n\n");
    s.push_str("if [ $EXIT_CODE -eq 0 ]; then\n");
    let _ = writeln!(s, "    echo \"Job successful. Marking IDs in range [{}, {}) as completed.\"", kmin, kmax);
    if ids.is_empty() {
        s.push_str("    echo \"No IDs in range to mark as completed.\"\n");
    } else {
        let _ = writeln!(s, "    LEDGER={}", ledger);
        s.push_str("    if [ -s \"$LEDGER\" ] && [ -n \"$(tail -c 1 \"$LEDGER\")\" ]; then\n");
        let _ = writeln!(s, "        printf '{}\\n' >> \"$LEDGER\"", TORN_MARKER);
        s.push_str("    fi\n");
        s.push_str("    cat >> \"$LEDGER\" <<'SWEEP_IDS'\n");
        for id in ids {
            let _ = writeln!(s, "{}", id);
        }
        s.push_str("SWEEP_IDS\n");
        let _ = writeln!(s, "    echo \"Successfully marked {} IDs as completed.\"", ids.len());
    }
    s.push_str("else\n");
    let _ = writeln!(
        s,
        "    echo \"Job failed (Exit Code: $EXIT_CODE). Not marking range [{}, {}) as completed.\"",
        kmin, kmax
    );
    s.push_str("fi\n\n");
    s.push_str("exit $EXIT_CODE\n");
    s
}
