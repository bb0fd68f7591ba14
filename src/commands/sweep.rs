use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::audit;
use crate::archive::config::{ConfigOverrides, load_config, normalize_extension};
use crate::archive::lock::ArchiveLock;
use crate::archive::manifest::Manifest;
use crate::archive::snapshot::ArchiveSnapshot;
use crate::archive::sweep::{SweepOptions, compile_rules, sweep};
use crate::commands::CommandReport;

#[derive(Debug, Clone, Default)]
pub struct SweepCommandOptions {
    /// Directory to sweep; the archive dir when unset.
    pub dir: Option<PathBuf>,
    /// Extensions to consider; the configured list when empty.
    pub extensions: Vec<String>,
    pub dry_run: bool,
    pub overrides: ConfigOverrides,
}

/// Compares directories after resolving `.`/`..` and symlinks. A path that
/// cannot be resolved is compared as written.
fn same_dir(a: &Path, b: &Path) -> bool {
    let resolve = |p: &Path| fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    resolve(a) == resolve(b)
}

pub fn run(opts: &SweepCommandOptions) -> Result<CommandReport> {
    let cfg = load_config(&opts.overrides)?;
    let mut report = CommandReport::new("sweep");

    let dir = opts.dir.clone().unwrap_or_else(|| cfg.archive_dir.clone());
    let is_archive = same_dir(&dir, &cfg.archive_dir);
    let extensions = if opts.extensions.is_empty() {
        cfg.sweep_extensions()
    } else {
        opts.extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .collect()
    };
    report.detail(format!("dir={}", dir.display()));
    report.detail(format!("extensions={}", extensions.join(",")));
    report.detail(format!("dry_run={}", opts.dry_run));

    let refresh_archive = is_archive && !opts.dry_run && dir.exists();
    let _lock = if refresh_archive {
        Some(ArchiveLock::acquire(&cfg.archive_dir)?)
    } else {
        None
    };

    let rules = compile_rules(&cfg.category_patterns)?;
    let outcome = sweep(
        &dir,
        &rules,
        &SweepOptions {
            dataset_suffix: cfg.dataset_suffix(),
            extensions,
            dry_run: opts.dry_run,
        },
    )?;

    report.detail(format!(
        "kept={} removed={}",
        outcome.kept.len(),
        outcome.removed.len()
    ));
    let verb = if opts.dry_run {
        "would_remove"
    } else {
        "removed"
    };
    for path in &outcome.removed {
        report.detail(format!("{verb}={}", path.display()));
    }
    for err in &outcome.ambiguities {
        report.warning(format!("[{}] {err}", err.code().as_str()));
    }

    if refresh_archive {
        let archive_dir = &cfg.archive_dir;
        let snapshot = ArchiveSnapshot::scan(archive_dir, cfg.dataset_suffix(), cfg.extension())?;
        let previous = Manifest::load_for_refresh(archive_dir);
        let manifest = Manifest::from_members(
            snapshot.current_members(),
            &outcome.ambiguous_pairs(),
            previous.as_ref(),
        )?;
        let path = manifest.save(archive_dir)?;
        report.detail(format!("manifest={}", path.display()));
        let status = if outcome.ambiguities.is_empty() {
            "ok"
        } else {
            "ambiguous"
        };
        audit::record(
            &cfg.logs_dir,
            "sweep",
            status,
            &format!(
                "{} kept, {} removed",
                outcome.kept.len(),
                outcome.removed.len()
            ),
        );
    }

    Ok(report)
}
