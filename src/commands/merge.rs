use anyhow::Result;
use std::path::PathBuf;

use crate::archive::audit;
use crate::archive::backend::build_backend;
use crate::archive::config::{ConfigOverrides, load_config};
use crate::archive::cycle::{CycleOptions, run_cycle};
use crate::archive::publish::{JsonListSink, PublishSink, publish_entries};
use crate::commands::CommandReport;

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub files: Vec<PathBuf>,
    pub no_sweep: bool,
    pub publish_list: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

pub fn run(opts: &MergeOptions) -> Result<CommandReport> {
    let cfg = load_config(&opts.overrides)?;
    let mut report = CommandReport::new("merge");

    report.detail(format!("archive_dir={}", cfg.archive_dir.display()));
    report.detail(format!("converted_dir={}", cfg.converted_dir.display()));
    report.detail(format!("backend={}", cfg.merge.backend.as_str()));
    report.detail(format!("concurrency_limit={}", cfg.concurrency_limit()));

    let backend = build_backend(&cfg)?;
    let cycle_opts = CycleOptions {
        converted_files: (!opts.files.is_empty()).then(|| opts.files.clone()),
        skip_sweep: opts.no_sweep,
    };
    let cycle = run_cycle(&cfg, backend.as_ref(), &cycle_opts)?;

    for err in &cycle.merge.rejected {
        report.warning(format!("[{}] {err}", err.code().as_str()));
    }
    if !cycle.merge.removed_temporaries.is_empty() {
        report.detail(format!(
            "removed_stale_temporaries={}",
            cycle.merge.removed_temporaries.len()
        ));
    }

    for stage in &cycle.merge.stages {
        report.detail(format!(
            "stage.{} merged={} failed={} skipped={}",
            stage.category,
            stage.merged.len(),
            stage.failed.len(),
            stage.skipped
        ));
        for file in &stage.merged {
            report.detail(format!("merged={}", file.path.display()));
        }
    }
    for err in cycle.merge.ambiguities() {
        report.warning(format!(
            "[{}] {err} (widest base used)",
            err.code().as_str()
        ));
    }
    for failure in cycle.merge.failures() {
        report.issue(format!(
            "[{}] {}/{}: {}",
            failure.error.code().as_str(),
            failure.category,
            failure.variable,
            failure.error
        ));
    }

    match &cycle.sweep {
        Some(sweep) => {
            report.detail(format!(
                "sweep kept={} removed={}",
                sweep.kept.len(),
                sweep.removed.len()
            ));
            for removed in &sweep.removed {
                report.detail(format!("removed={}", removed.display()));
            }
            for err in &sweep.ambiguities {
                report.warning(format!("[{}] {err}", err.code().as_str()));
            }
        }
        None => report.detail("sweep skipped (--no-sweep)"),
    }
    report.detail(format!("members={}", cycle.survivors.len()));
    if let Some(path) = &cycle.manifest_path {
        report.detail(format!("manifest={}", path.display()));
    }

    if let Some(out) = &opts.publish_list {
        let merged = cycle
            .merge
            .merged_files()
            .into_iter()
            .filter(|f| f.path.exists())
            .map(|f| f.path.as_path())
            .collect::<Vec<_>>();
        let entries = publish_entries(merged, cfg.dataset_suffix());
        JsonListSink { path: out.clone() }.accept(&entries)?;
        audit::record(
            &cfg.logs_dir,
            "publish",
            "ok",
            &format!("{} entries written to {}", entries.len(), out.display()),
        );
        report.detail(format!(
            "publish_list={} entries={}",
            out.display(),
            entries.len()
        ));
    }

    Ok(report)
}
