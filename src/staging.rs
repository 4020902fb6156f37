use crate::{SweepConfig, SweepError};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagingReport {
    pub executable_copied: bool,
    pub layers_copied: usize,
}

/// Copy data layers that are missing locally, then refresh the executable.
/// No-op without a staging block. Any failure is a configuration error.
pub fn stage(config: &SweepConfig) -> Result<StagingReport, SweepError> {
    let mut report = StagingReport::default();
    let Some(staging) = config.staging.as_ref() else {
        return Ok(report);
    };

    let run_dir = config
        .executable
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let exe_name = config
        .executable
        .file_name()
        .ok_or_else(|| SweepError::Config(format!("executable {} has no file name", config.executable.display())))?;

    for i in 0..staging.layer_count {
        for ext in &staging.layer_extensions {
            let name = format!("{}-{}.{}", staging.layer_prefix, i, ext);
            let src = staging.source_dir.join(&name);
            let dst = run_dir.join(&name);
            if src.is_file() && !dst.exists() {
                info!(src = %src.display(), dst = %dst.display(), "copying data layer");
                fs::copy(&src, &dst)
                    .map_err(|e| SweepError::Config(format!("cannot copy {}: {}", src.display(), e)))?;
                report.layers_copied += 1;
            }
        }
    }

    let src = staging.source_dir.join(exe_name);
    if !src.is_file() {
        return Err(SweepError::Config(format!("source executable {} not found", src.display())));
    }
    info!(src = %src.display(), dst = %config.executable.display(), "copying executable");
    fs::copy(&src, &config.executable)
        .map_err(|e| SweepError::Config(format!("cannot copy executable {}: {}", src.display(), e)))?;
    make_executable(&config.executable)?;
    report.executable_copied = true;

    Ok(report)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), SweepError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| SweepError::Config(format!("cannot chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), SweepError> {
    Ok(())
}

/// The executable must exist (and on Unix carry an execute bit) before
/// anything is claimed.
pub fn check_executable(path: &Path) -> Result<(), SweepError> {
    let metadata = fs::metadata(path)
        .map_err(|_| SweepError::Config(format!("executable {} not found", path.display())))?;
    if !metadata.is_file() {
        return Err(SweepError::Config(format!("executable {} is not a file", path.display())));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SweepError::Config(format!("executable {} is not executable", path.display())));
        }
    }
    Ok(())
}
