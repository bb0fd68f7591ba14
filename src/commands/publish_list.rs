use anyhow::Result;
use std::path::PathBuf;

use crate::archive::audit;
use crate::archive::config::{ConfigOverrides, load_config};
use crate::archive::publish::{JsonListSink, PublishSink, publish_entries};
use crate::archive::snapshot::ArchiveSnapshot;
use crate::commands::CommandReport;

/// Lists the current archive members with their `[variable, category]`
/// labels, optionally writing them as JSON for the upload step.
pub fn run(out: Option<&PathBuf>, overrides: &ConfigOverrides) -> Result<CommandReport> {
    let cfg = load_config(overrides)?;
    let mut report = CommandReport::new("publish-list");

    let snapshot = ArchiveSnapshot::scan(&cfg.archive_dir, cfg.dataset_suffix(), cfg.extension())?;
    let entries = publish_entries(
        snapshot.current_members().into_iter().map(|f| f.path.as_path()),
        cfg.dataset_suffix(),
    );

    for entry in &entries {
        report.detail(format!(
            "{} [{}, {}]",
            entry.path.display(),
            entry.labels[0],
            entry.labels[1]
        ));
    }
    if let Some(path) = out {
        JsonListSink { path: path.clone() }.accept(&entries)?;
        audit::record(
            &cfg.logs_dir,
            "publish",
            "ok",
            &format!("{} entries written to {}", entries.len(), path.display()),
        );
        report.detail(format!(
            "written={} entries={}",
            path.display(),
            entries.len()
        ));
    }

    Ok(report)
}
