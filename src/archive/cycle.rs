use crate::archive::audit;
use crate::archive::backend::GridBackend;
use crate::archive::category::GriddedFile;
use crate::archive::config::ArchiveConfig;
use crate::archive::lock::ArchiveLock;
use crate::archive::manifest::Manifest;
use crate::archive::merge::{MergeEngine, MergeOutcome};
use crate::archive::partition::MergeBatch;
use crate::archive::snapshot::ArchiveSnapshot;
use crate::archive::sweep::{SweepOptions, SweepOutcome, compile_rules, sweep};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct CycleOutcome {
    pub merge: MergeOutcome,
    pub sweep: Option<SweepOutcome>,
    pub survivors: Vec<GriddedFile>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Newly converted files; `None` means every file in the converted dir.
    pub converted_files: Option<Vec<PathBuf>>,
    pub skip_sweep: bool,
}

/// Files of the configured extension directly inside `dir`, name order.
pub fn discover_converted(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let ext_suffix = format!(".{extension}");
    let mut out = Vec::new();
    let read_dir = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in read_dir {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.ends_with(&ext_suffix));
        if path.is_file() && matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// One ingestion cycle over the archive: lock, cascade merge, retention
/// sweep, manifest. Only archive-level I/O faults return `Err`; per-variable
/// failures are inside the outcome.
pub fn run_cycle(
    cfg: &ArchiveConfig,
    backend: &dyn GridBackend,
    opts: &CycleOptions,
) -> Result<CycleOutcome> {
    let lock = ArchiveLock::acquire(&cfg.archive_dir)?;
    debug!(lock = %lock.path().display(), "archive locked");

    let converted = match &opts.converted_files {
        Some(files) => files.clone(),
        None => discover_converted(&cfg.converted_dir, cfg.extension())?,
    };
    info!(
        files = converted.len(),
        backend = backend.name(),
        archive_dir = %cfg.archive_dir.display(),
        "merge cycle started"
    );
    let batch = MergeBatch::from_paths(&converted, cfg.dataset_suffix());
    if batch.is_empty() {
        info!("no classifiable converted files, every stage skipped");
    }
    let merge = MergeEngine::new(cfg, backend).run(batch)?;

    for stage in &merge.stages {
        let status = if stage.skipped {
            "skipped"
        } else if stage.failed.is_empty() {
            "ok"
        } else {
            "partial"
        };
        audit::record(
            &cfg.logs_dir,
            &format!("merge:{}", stage.category),
            status,
            &format!(
                "{} merged, {} failed",
                stage.merged.len(),
                stage.failed.len()
            ),
        );
    }

    let sweep_outcome = if opts.skip_sweep {
        None
    } else {
        let rules = compile_rules(&cfg.category_patterns)?;
        let out = sweep(
            &cfg.archive_dir,
            &rules,
            &SweepOptions {
                dataset_suffix: cfg.dataset_suffix(),
                extensions: cfg.sweep_extensions(),
                dry_run: false,
            },
        )?;
        let status = if out.ambiguities.is_empty() {
            "ok"
        } else {
            "ambiguous"
        };
        audit::record(
            &cfg.logs_dir,
            "sweep",
            status,
            &format!("{} kept, {} removed", out.kept.len(), out.removed.len()),
        );
        Some(out)
    };

    let after = ArchiveSnapshot::scan(&cfg.archive_dir, cfg.dataset_suffix(), cfg.extension())?;
    let survivors = after
        .current_members()
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();
    let manifest_path = match &sweep_outcome {
        Some(out) => {
            let previous = Manifest::load_for_refresh(&cfg.archive_dir);
            let manifest = Manifest::from_members(
                survivors.iter(),
                &out.ambiguous_pairs(),
                previous.as_ref(),
            )?;
            Some(manifest.save(&cfg.archive_dir)?)
        }
        None => None,
    };

    Ok(CycleOutcome {
        merge,
        sweep: sweep_outcome,
        survivors,
        manifest_path,
    })
}
