use crate::archive::backend::{GridBackend, GridShape};
use crate::archive::config::NcoConfig;
use crate::error::ArchiveError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// NetCDF Operators: `ncrcat` concatenates along the record (time)
/// dimension, `ncdump` reads headers and the decoded time axis.
#[derive(Debug, Clone)]
pub struct NcoBackend {
    pub ncrcat: PathBuf,
    pub ncdump: PathBuf,
    pub time_dim: String,
}

fn resolve_bin(configured: Option<&Path>, name: &str) -> Result<PathBuf> {
    if let Some(bin) = configured {
        if bin.exists() {
            return Ok(bin.to_path_buf());
        }
    }
    let found = which::which(name)
        .with_context(|| format!("{name} binary not found in configuration or PATH"))?;
    Ok(found)
}

impl NcoBackend {
    pub fn resolve(cfg: &NcoConfig) -> Result<Self> {
        Ok(Self {
            ncrcat: resolve_bin(cfg.ncrcat_bin.as_deref(), "ncrcat")?,
            ncdump: resolve_bin(cfg.ncdump_bin.as_deref(), "ncdump")?,
            time_dim: cfg.time_dim.clone(),
        })
    }

    fn run(&self, bin: &Path, args: &[&std::ffi::OsStr]) -> Result<Output, ArchiveError> {
        let tool = bin
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| bin.display().to_string());
        let out = Command::new(bin)
            .args(args)
            .output()
            .map_err(|err| ArchiveError::backend(&tool, format!("failed to run: {err}")))?;
        if out.status.success() {
            return Ok(out);
        }
        Err(ArchiveError::backend(
            tool,
            format!(
                "exit {}\nstdout: {}\nstderr: {}",
                out.status,
                String::from_utf8_lossy(&out.stdout).trim(),
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ))
    }
}

impl GridBackend for NcoBackend {
    fn name(&self) -> &'static str {
        "nco"
    }

    fn grid_shape(&self, path: &Path) -> Result<GridShape, ArchiveError> {
        let out = self.run(&self.ncdump, &["-h".as_ref(), path.as_os_str()])?;
        let header = String::from_utf8_lossy(&out.stdout);
        Ok(parse_dimensions(&header, &self.time_dim))
    }

    fn time_axis(&self, path: &Path) -> Result<Vec<NaiveDate>, ArchiveError> {
        let out = self.run(
            &self.ncdump,
            &[
                "-t".as_ref(),
                "-v".as_ref(),
                self.time_dim.as_ref(),
                path.as_os_str(),
            ],
        )?;
        let dump = String::from_utf8_lossy(&out.stdout);
        parse_time_values(&dump, &self.time_dim).map_err(|message| {
            ArchiveError::backend("ncdump", format!("{}: {message}", path.display()))
        })
    }

    fn concat(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ArchiveError> {
        let mut args: Vec<&std::ffi::OsStr> = vec!["-O".as_ref()];
        args.extend(inputs.iter().map(|p| p.as_os_str()));
        args.push(dest.as_os_str());
        self.run(&self.ncrcat, &args)?;
        Ok(())
    }
}

/// Fixed-size dimensions from the `dimensions:` block of `ncdump -h`. The
/// record dimension is skipped whether it is declared `UNLIMITED` or not.
pub fn parse_dimensions(header: &str, time_dim: &str) -> GridShape {
    let mut dims = BTreeMap::new();
    let mut in_block = false;
    for line in header.lines() {
        let trimmed = line.trim();
        if trimmed == "dimensions:" {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        if trimmed.ends_with(':') {
            break;
        }
        let Some((name, value)) = trimmed.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name == time_dim {
            continue;
        }
        let value = value.trim().trim_end_matches(';').trim();
        if let Ok(len) = value.parse::<usize>() {
            dims.insert(name.to_string(), len);
        }
    }
    GridShape(dims)
}

/// Calendar dates from the `data:` section of `ncdump -t -v <time>`. Each
/// value is an ISO timestamp, possibly quoted and carrying a time of day.
pub fn parse_time_values(dump: &str, time_dim: &str) -> Result<Vec<NaiveDate>, String> {
    let Some((_, data)) = dump.split_once("\ndata:") else {
        return Err("no data section in ncdump output".to_string());
    };

    let mut collected = String::new();
    let mut capturing = false;
    for line in data.lines() {
        let trimmed = line.trim();
        if !capturing {
            let Some(rest) = trimmed.strip_prefix(time_dim) else {
                continue;
            };
            let Some(values) = rest.trim_start().strip_prefix('=') else {
                continue;
            };
            capturing = true;
            collected.push_str(values);
        } else {
            collected.push(' ');
            collected.push_str(trimmed);
        }
        if collected.contains(';') {
            break;
        }
    }
    if !capturing {
        return Err(format!("variable `{time_dim}` not found in data section"));
    }

    let values = collected.split(';').next().unwrap_or_default();
    let mut out = Vec::new();
    for raw in values.split(',') {
        let value = raw.trim().trim_matches('"').trim();
        if value.is_empty() || value == "_" {
            continue;
        }
        let day = value.get(..10).unwrap_or(value);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|err| format!("invalid time value `{value}`: {err}"))?;
        out.push(date);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "netcdf T_QUOT_SIM2_latest_tmp {\n\
dimensions:\n\
\ttime = UNLIMITED ; // (46 currently)\n\
\ty = 134 ;\n\
\tx = 143 ;\n\
variables:\n\
\tdouble time(time) ;\n\
\t\ttime:units = \"days since 1970-01-01 00:00:00\" ;\n\
}\n";

    #[test]
    fn dimensions_skip_the_record_axis() {
        let shape = parse_dimensions(HEADER, "time");
        assert_eq!(shape.0.len(), 2);
        assert_eq!(shape.0["x"], 143);
        assert_eq!(shape.0["y"], 134);
        assert_eq!(shape.to_string(), "[x=143,y=134]");
    }

    #[test]
    fn time_values_span_multiple_lines() {
        let dump = format!(
            "{}\ndata:\n\n time = \"2020-01-01\", \"2020-01-02\",\n    \"2020-02-14 12\" ;\n}}\n",
            HEADER.trim_end_matches("}\n")
        );
        let dates = parse_time_values(&dump, "time").expect("parse");
        assert_eq!(dates.len(), 3);
        let last = NaiveDate::from_ymd_opt(2020, 2, 14).expect("date");
        assert_eq!(dates[2], last);
    }

    #[test]
    fn empty_record_axis_yields_no_dates() {
        let dump = "netcdf x {\ndimensions:\n\ttime = UNLIMITED ; // (0 currently)\ndata:\n\n time = ;\n}\n";
        assert!(parse_time_values(dump, "time").expect("parse").is_empty());
    }

    #[test]
    fn time_bounds_are_not_mistaken_for_time() {
        let dump = "netcdf x {\ndata:\n\n time_bnds = 1, 2 ;\n\n time = \"1958-08-01\" ;\n}\n";
        let dates = parse_time_values(dump, "time").expect("parse");
        assert_eq!(dates, [NaiveDate::from_ymd_opt(1958, 8, 1).expect("date")]);
    }
}
