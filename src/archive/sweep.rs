use crate::archive::category::{Category, classify_name, classify_unprefixed, is_temporary_name};
use crate::archive::warn::{self, WarnEvent};
use crate::error::ArchiveError;
use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RetentionRule {
    pub category: Category,
    pub pattern: Regex,
}

pub fn compile_rules(patterns: &BTreeMap<Category, String>) -> Result<Vec<RetentionRule>> {
    patterns
        .iter()
        .map(|(category, pattern)| {
            let pattern = Regex::new(pattern)
                .map_err(|err| anyhow!("invalid retention pattern for {category}: {err}"))?;
            Ok(RetentionRule {
                category: *category,
                pattern,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SweepOptions<'a> {
    pub dataset_suffix: &'a str,
    /// Full extensions without the leading dot, e.g. `nc` or `csv.gz`.
    pub extensions: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub ambiguities: Vec<ArchiveError>,
}

impl SweepOutcome {
    /// (variable, category) pairs where more than one file was kept.
    pub fn ambiguous_pairs(&self) -> Vec<(String, Category)> {
        self.ambiguities
            .iter()
            .filter_map(|err| match err {
                ArchiveError::RetentionAmbiguity {
                    variable, category, ..
                } => category.parse::<Category>().ok().map(|c| (variable.clone(), c)),
                _ => None,
            })
            .collect()
    }
}

/// The comparable end-date token: the `end` group when the pattern names
/// one, otherwise the last group that participated in the match.
fn end_token<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    if let Some(end) = caps.name("end") {
        return Some(end.as_str());
    }
    caps.iter().skip(1).flatten().last().map(|m| m.as_str())
}

fn list_candidates(dir: &Path, extensions: &[String]) -> Result<Vec<(PathBuf, String)>> {
    let mut out = Vec::new();
    let read_dir = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in read_dir {
        let path = entry
            .with_context(|| format!("failed to read {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let listed = extensions.iter().any(|ext| {
            name.strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
                && !is_temporary_name(name, ext)
        });
        if listed {
            let name = name.to_string();
            out.push((path, name));
        }
    }
    out.sort();
    Ok(out)
}

/// Retention group of a file name: the variable when the name carries one,
/// `None` for download-side names that start with the suffix.
fn group_of(name: &str, dataset_suffix: &str) -> Option<(Option<String>, Category)> {
    match classify_name(name, dataset_suffix) {
        Ok((variable, category)) => Some((Some(variable), category)),
        Err(_) => classify_unprefixed(name, dataset_suffix).map(|category| (None, category)),
    }
}

/// Keeps, for every (variable, category), only the file(s) whose end date is
/// the greatest and deletes the others. Names without a variable prefix form
/// one group per category. Ties on the greatest end date are all kept and
/// reported. Running it again on a swept directory removes nothing.
pub fn sweep(dir: &Path, rules: &[RetentionRule], opts: &SweepOptions<'_>) -> Result<SweepOutcome> {
    let mut out = SweepOutcome::default();
    if !dir.exists() {
        return Ok(out);
    }
    let candidates = list_candidates(dir, &opts.extensions)?;

    for rule in rules {
        let mut groups: BTreeMap<Option<String>, Vec<(u64, &PathBuf)>> = BTreeMap::new();
        for (path, name) in &candidates {
            let Some(caps) = rule.pattern.captures(name) else {
                continue;
            };
            let Some((variable, category)) = group_of(name, opts.dataset_suffix) else {
                continue;
            };
            if category != rule.category {
                continue;
            }
            let Some(end) = end_token(&caps).and_then(|t| t.parse::<u64>().ok()) else {
                debug!(file = %name, "no comparable end date, left alone");
                continue;
            };
            groups.entry(variable).or_default().push((end, path));
        }

        for (variable, files) in groups {
            let variable = variable.unwrap_or_else(|| opts.dataset_suffix.to_string());
            let Some(max_end) = files.iter().map(|(end, _)| *end).max() else {
                continue;
            };
            let (newest, stale): (Vec<_>, Vec<_>) =
                files.into_iter().partition(|(end, _)| *end == max_end);

            if newest.len() > 1 {
                let err = ArchiveError::RetentionAmbiguity {
                    variable: variable.clone(),
                    category: rule.category.to_string(),
                    end: max_end.to_string(),
                    files: newest.iter().map(|(_, p)| (*p).clone()).collect(),
                };
                warn::emit(WarnEvent {
                    code: err.code().as_str(),
                    stage: "sweep",
                    action: "retain-all",
                    variable: &variable,
                    category: rule.category.as_str(),
                    file: &newest
                        .iter()
                        .map(|(_, p)| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                    reason: "tied-end-date",
                    err: &err.to_string(),
                });
                out.ambiguities.push(err);
            }

            for (_, path) in stale {
                if !opts.dry_run {
                    fs::remove_file(path)
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                }
                info!(
                    category = %rule.category,
                    variable = %variable,
                    file = %path.display(),
                    dry_run = opts.dry_run,
                    "superseded file removed"
                );
                out.removed.push(path.clone());
            }
            out.kept.extend(newest.into_iter().map(|(_, p)| p.clone()));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::config::default_category_patterns;
    use tempfile::tempdir;

    fn opts(dry_run: bool) -> SweepOptions<'static> {
        SweepOptions {
            dataset_suffix: "QUOT_SIM2",
            extensions: vec!["nc".to_string()],
            dry_run,
        }
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"x").expect("write");
        }
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn keeps_only_greatest_end_date() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "T_QUOT_SIM2_latest-19580101-20200101.nc",
                "T_QUOT_SIM2_latest-19580101-20201231.nc",
                "T_QUOT_SIM2_latest-19580101-20190601.nc",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");

        let out = sweep(tmp.path(), &rules, &opts(false)).expect("sweep");

        assert_eq!(out.removed.len(), 2);
        assert_eq!(
            remaining(tmp.path()),
            ["T_QUOT_SIM2_latest-19580101-20201231.nc"]
        );
    }

    #[test]
    fn groups_are_per_variable_and_category() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "T_QUOT_SIM2_previous-19580101-20191231.nc",
                "PRENEI_QUOT_SIM2_previous-19580101-20181231.nc",
                "T_QUOT_SIM2_historical-19580101-19991231.nc",
                "T_QUOT_SIM2_latest-19580101-20200214.nc",
                "T_QUOT_SIM2_latest-19580101-20200131.nc",
                "T_QUOT_SIM2_latest_tmp.nc",
                "T_QUOT_SIM2_latest-19580101-20190101.csv",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");

        let out = sweep(tmp.path(), &rules, &opts(false)).expect("sweep");

        let superseded = tmp.path().join("T_QUOT_SIM2_latest-19580101-20200131.nc");
        assert_eq!(out.removed, [superseded]);
        assert_eq!(out.kept.len(), 4);
        assert!(tmp.path().join("T_QUOT_SIM2_latest_tmp.nc").exists());
        let other_extension = "T_QUOT_SIM2_latest-19580101-20190101.csv";
        assert!(tmp.path().join(other_extension).exists());
    }

    #[test]
    fn second_sweep_removes_nothing() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "T_QUOT_SIM2_previous-19580101-20181231.nc",
                "T_QUOT_SIM2_previous-19580101-20191231.nc",
                "T_QUOT_SIM2_latest-20000101-20200214.nc",
                "T_QUOT_SIM2_latest-19580101-20200214.nc",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");

        sweep(tmp.path(), &rules, &opts(false)).expect("first");
        let after_first = remaining(tmp.path());
        let second = sweep(tmp.path(), &rules, &opts(false)).expect("second");

        assert!(second.removed.is_empty());
        assert_eq!(remaining(tmp.path()), after_first);
    }

    #[test]
    fn ties_are_retained_and_reported() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "T_QUOT_SIM2_latest-20000101-20200214.nc",
                "T_QUOT_SIM2_latest-19580101-20200214.nc",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");

        let out = sweep(tmp.path(), &rules, &opts(false)).expect("sweep");

        assert!(out.removed.is_empty());
        assert_eq!(out.ambiguities.len(), 1);
        assert!(matches!(
            out.ambiguities[0],
            ArchiveError::RetentionAmbiguity { .. }
        ));
        assert_eq!(remaining(tmp.path()).len(), 2);
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "T_QUOT_SIM2_historical-19580101-19891231.nc",
                "T_QUOT_SIM2_historical-19580101-19991231.nc",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");

        let out = sweep(tmp.path(), &rules, &opts(true)).expect("sweep");

        assert_eq!(out.removed.len(), 1);
        assert_eq!(remaining(tmp.path()).len(), 2);
    }

    #[test]
    fn unnamed_groups_use_the_last_capture() {
        let mut patterns = default_category_patterns();
        patterns.insert(Category::Latest, r"latest-(\d{8})-(\d{8})".to_string());
        let rules = compile_rules(&patterns).expect("rules");
        let latest = rules
            .iter()
            .find(|r| r.category == Category::Latest)
            .expect("latest rule");
        let caps = latest
            .pattern
            .captures("T_QUOT_SIM2_latest-19580101-20200214.nc")
            .expect("match");
        assert_eq!(end_token(&caps), Some("20200214"));
    }

    #[test]
    fn download_names_without_variable_group_by_category() {
        let tmp = tempdir().expect("tempdir");
        touch(
            tmp.path(),
            &[
                "QUOT_SIM2_latest-20250801-20260131.csv.gz",
                "QUOT_SIM2_latest-20250801-20260215.csv.gz",
                "QUOT_SIM2_latest-20250801-20260101.parquet",
                "QUOT_SIM2_latest-20250801-20251231.txt",
                "T_QUOT_SIM2_latest-19580101-20260131.nc",
            ],
        );
        let rules = compile_rules(&default_category_patterns()).expect("rules");
        let opts = SweepOptions {
            dataset_suffix: "QUOT_SIM2",
            extensions: ["csv.gz", "parquet", "nc"].map(String::from).to_vec(),
            dry_run: false,
        };

        let out = sweep(tmp.path(), &rules, &opts).expect("sweep");

        assert_eq!(out.removed.len(), 2);
        assert_eq!(
            remaining(tmp.path()),
            [
                "QUOT_SIM2_latest-20250801-20251231.txt",
                "QUOT_SIM2_latest-20250801-20260215.csv.gz",
                "T_QUOT_SIM2_latest-19580101-20260131.nc",
            ]
        );
    }
}
