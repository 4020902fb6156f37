use crate::id_space::KRange;
use crate::SweepError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str =
    "# Request approximation of R_z rotations by angles of the form $2\\pi k/n$ for k in the interval [k1,k2)";
const OUTPUT_LABEL: &str = "#Filename with approximation results";
const MIN_LABEL: &str = "#Minimal number of T gates to use for approximation";
const MAX_LABEL: &str = "#Maximal number of T gates to use for approximation";

/// Read positionally by the computation: comment lines and field order are fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDescription {
    pub mode: String,
    pub output_path: PathBuf,
    pub min_units: u32,
    pub max_units: u32,
    pub range: KRange,
}

impl RangeDescription {
    pub fn for_range(config: &crate::SweepConfig, range: KRange) -> Self {
        Self {
            mode: config.mode.clone(),
            output_path: config.output_path(range),
            min_units: config.min_units,
            max_units: config.max_units,
            range,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{HEADER}\n{mode}\n{OUTPUT_LABEL}\n{output}\n{MIN_LABEL}\n{min}\n{MAX_LABEL}\n{max}\n#n\n{n}\n#k1\n{kmin}\n#k2\n{kmax}\n#kstep\n{step}\n",
            mode = self.mode,
            output = self.output_path.display(),
            min = self.min_units,
            max = self.max_units,
            n = self.range.n,
            kmin = self.range.kmin,
            kmax = self.range.kmax,
            step = self.range.step,
        )
    }

    /// Read back the positional fields, skipping comment lines.
    pub fn parse(text: &str) -> Result<Self, SweepError> {
        let fields: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        if fields.len() != 8 {
            return Err(SweepError::Other(format!(
                "range description has {} fields, expected 8",
                fields.len()
            )));
        }
        let num = |i: usize| -> Result<u64, SweepError> {
            fields[i]
                .parse::<u64>()
                .map_err(|e| SweepError::Other(format!("field {} ('{}'): {}", i, fields[i], e)))
        };
        let units = |i: usize| -> Result<u32, SweepError> {
            u32::try_from(num(i)?).map_err(|e| SweepError::Other(format!("field {}: {}", i, e)))
        };
        Ok(Self {
            mode: fields[0].to_string(),
            output_path: PathBuf::from(fields[1]),
            min_units: units(2)?,
            max_units: units(3)?,
            range: KRange::new(num(4)?, num(5)?, num(6)?, num(7)?),
        })
    }

    /// Write the description so that a reader sees either nothing or all of it.
    pub fn write_to(&self, path: &Path) -> Result<(), SweepError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SweepConfig;

    #[test]
    fn test_render_is_byte_exact() {
        let config = SweepConfig::default();
        let desc = RangeDescription::for_range(&config, KRange::new(2097152, 1, 1025, 2));
        let expected = "\
# Request approximation of R_z rotations by angles of the form $2\\pi k/n$ for k in the interval [k1,k2)
UNIFORM
#Filename with approximation results
out/uni_2097152_1_1025.txt
#Minimal number of T gates to use for approximation
0
#Maximal number of T gates to use for approximation
100
#n
2097152
#k1
1
#k2
1025
#kstep
2
";
        assert_eq!(desc.render(), expected);
    }

    #[test]
    fn test_parse_reads_rendered_fields() {
        let config = SweepConfig::default();
        let desc = RangeDescription::for_range(&config, KRange::new(16, 5, 8, 2));
        let parsed = RangeDescription::parse(&desc.render()).unwrap();
        assert_eq!(parsed, desc);
    }

    #[test]
    fn test_parse_rejects_short_file() {
        assert!(RangeDescription::parse("UNIFORM\nout/x.txt\n0\n").is_err());
    }

    #[test]
    fn test_write_to_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SweepConfig::default();
        let desc = RangeDescription::for_range(&config, KRange::new(16, 1, 5, 2));
        let path = dir.path().join("configs").join("config_16_1_5.txt");

        desc.write_to(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), desc.render());
        assert!(!dir.path().join("configs").join("config_16_1_5.txt.tmp").exists());
    }
}
