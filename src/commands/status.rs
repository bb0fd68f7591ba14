use anyhow::Result;
use std::env;

use crate::archive::config::{ConfigOverrides, load_config};
use crate::archive::manifest::{Manifest, file_hash};
use crate::archive::snapshot::ArchiveSnapshot;
use crate::commands::CommandReport;

include!(concat!(env!("OUT_DIR"), "/safran_env_allowlist.rs"));

/// `SAFRAN_*` variables in the environment that nothing in this binary reads.
/// Usually a typo in a deployment file.
pub fn unknown_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = keys
        .into_iter()
        .filter(|k| k.starts_with("SAFRAN_"))
        .filter(|k| !GENERATED_SAFRAN_ENV_ALLOWLIST.contains(&k.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}

pub fn run(overrides: &ConfigOverrides) -> Result<CommandReport> {
    let cfg = load_config(overrides)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("archive_dir={}", cfg.archive_dir.display()));
    report.detail(format!("converted_dir={}", cfg.converted_dir.display()));
    report.detail(format!("logs_dir={}", cfg.logs_dir.display()));
    report.detail(format!("dataset_suffix={}", cfg.dataset_suffix()));
    report.detail(format!("extension={}", cfg.extension()));
    report.detail(format!("backend={}", cfg.merge.backend.as_str()));
    report.detail(format!("concurrency_limit={}", cfg.concurrency_limit()));

    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        report.warning(format!("unknown environment variable {key}"));
    }

    if !cfg.archive_dir.exists() {
        report.detail("archive_dir missing (nothing merged yet)");
        return Ok(report);
    }

    let snapshot = ArchiveSnapshot::scan(&cfg.archive_dir, cfg.dataset_suffix(), cfg.extension())?;
    report.detail(format!("tracked_pairs={}", snapshot.len()));
    for file in snapshot.current_members() {
        let range = file
            .date_range
            .map(|r| r.token())
            .unwrap_or_else(|| "-".to_string());
        report.detail(format!(
            "current.{}.{}={} ({range})",
            file.category,
            file.variable,
            file.file_name()
        ));
    }
    for tmp in &snapshot.stray_temporaries {
        report.warning(format!(
            "stale temporary {} (removed on next merge)",
            tmp.display()
        ));
    }

    let Some(manifest) = Manifest::load(&cfg.archive_dir)? else {
        report.detail("manifest missing (written after the next sweep)");
        return Ok(report);
    };
    if let Some(at) = manifest.updated_at {
        report.detail(format!("manifest_updated_at={}", at.to_rfc3339()));
    }
    for file in snapshot.current_members() {
        let recorded = manifest
            .get(&file.variable, file.category)
            .map(|entry| entry.file.as_str());
        if recorded != Some(file.file_name()) {
            report.warning(format!(
                "manifest is stale for {}/{} (run sweep)",
                file.category, file.variable
            ));
        }
    }
    for (variable, by_category) in &manifest.entries {
        for (category, entry) in by_category {
            if entry.ambiguous {
                report.warning(format!(
                    "{category}/{variable}: retention tie recorded in manifest"
                ));
            }
            let path = cfg.archive_dir.join(&entry.file);
            if !path.is_file() {
                report.issue(format!(
                    "manifest lists missing member {}",
                    path.display()
                ));
                continue;
            }
            if file_hash(&path)? != entry.sha256 {
                report.issue(format!("checksum mismatch for {}", path.display()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::unknown_env_keys;

    #[test]
    fn known_keys_are_not_reported() {
        // Built at runtime so the build script does not allowlist it.
        let typo = ["SAFRAN", "ARCHIVE", "DIRR"].join("_");
        let keys = vec!["SAFRAN_HOME".to_string(), typo.clone(), "PATH".to_string()];
        assert_eq!(unknown_env_keys(keys), [typo]);
    }
}
