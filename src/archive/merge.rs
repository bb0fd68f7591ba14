use crate::archive::backend::GridBackend;
use crate::archive::category::{Category, GriddedFile, temporary_name};
use crate::archive::concat::concatenate;
use crate::archive::config::ArchiveConfig;
use crate::archive::namer::name_by_range;
use crate::archive::partition::MergeBatch;
use crate::archive::snapshot::ArchiveSnapshot;
use crate::archive::warn::{self, WarnEvent};
use crate::error::ArchiveError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, info};

#[derive(Debug)]
pub struct VariableFailure {
    pub variable: String,
    pub category: Category,
    pub error: ArchiveError,
}

#[derive(Debug)]
pub struct StageOutcome {
    pub category: Category,
    pub skipped: bool,
    pub merged: Vec<GriddedFile>,
    pub failed: Vec<VariableFailure>,
    /// Base pairs where several members shared the greatest end date.
    pub ambiguities: Vec<ArchiveError>,
}

impl StageOutcome {
    fn new(category: Category, skipped: bool) -> Self {
        Self {
            category,
            skipped,
            merged: Vec::new(),
            failed: Vec::new(),
            ambiguities: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub stages: Vec<StageOutcome>,
    pub rejected: Vec<ArchiveError>,
    pub removed_temporaries: Vec<PathBuf>,
}

impl MergeOutcome {
    pub fn merged_files(&self) -> Vec<&GriddedFile> {
        self.stages.iter().flat_map(|s| s.merged.iter()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &VariableFailure> {
        self.stages.iter().flat_map(|s| s.failed.iter())
    }

    pub fn ambiguities(&self) -> impl Iterator<Item = &ArchiveError> {
        self.stages.iter().flat_map(|s| s.ambiguities.iter())
    }
}

fn base_ambiguity(
    stage: Category,
    base: Category,
    variable: &str,
    tied: &[&GriddedFile],
) -> ArchiveError {
    let err = ArchiveError::RetentionAmbiguity {
        variable: variable.to_string(),
        category: base.to_string(),
        end: tied
            .iter()
            .find_map(|f| f.date_range)
            .map(|r| r.end.format("%Y%m%d").to_string())
            .unwrap_or_default(),
        files: tied.iter().map(|f| f.path.clone()).collect(),
    };
    warn::emit(WarnEvent {
        code: err.code().as_str(),
        stage: stage.as_str(),
        action: "use-widest-base",
        variable,
        category: base.as_str(),
        file: &tied
            .iter()
            .map(|f| f.file_name())
            .collect::<Vec<_>>()
            .join(","),
        reason: "tied-end-date",
        err: &err.to_string(),
    });
    err
}

/// One variable's work inside a stage: the base member (if any) followed by
/// the new files in name order.
#[derive(Debug, Clone)]
struct MergeJob {
    variable: String,
    category: Category,
    has_base: bool,
    inputs: Vec<GriddedFile>,
}

/// Cascading historical → previous → latest merge over one archive
/// directory. Stages run strictly in order; variables inside a stage run on
/// up to `concurrency_limit` scoped workers.
pub struct MergeEngine<'a> {
    cfg: &'a ArchiveConfig,
    backend: &'a dyn GridBackend,
}

impl<'a> MergeEngine<'a> {
    pub fn new(cfg: &'a ArchiveConfig, backend: &'a dyn GridBackend) -> Self {
        Self { cfg, backend }
    }

    pub fn run(&self, batch: MergeBatch) -> Result<MergeOutcome> {
        let archive_dir = &self.cfg.archive_dir;
        fs::create_dir_all(archive_dir)
            .with_context(|| format!("failed to create {}", archive_dir.display()))?;

        let mut snapshot =
            ArchiveSnapshot::scan(archive_dir, self.cfg.dataset_suffix(), self.cfg.extension())?;
        let removed_temporaries = self.remove_stray_temporaries(&mut snapshot)?;

        for err in &batch.rejected {
            warn::emit_error("classify", "skip-file", "", "", err);
        }

        let mut stages = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let outcome = match batch.stage(category) {
                Some(new_files) => self.run_stage(category, new_files, &mut snapshot),
                None => {
                    info!(category = %category, "no new files, stage skipped");
                    StageOutcome::new(category, true)
                }
            };
            stages.push(outcome);
        }

        Ok(MergeOutcome {
            stages,
            rejected: batch.rejected,
            removed_temporaries,
        })
    }

    fn remove_stray_temporaries(&self, snapshot: &mut ArchiveSnapshot) -> Result<Vec<PathBuf>> {
        let stray = std::mem::take(&mut snapshot.stray_temporaries);
        for path in &stray {
            fs::remove_file(path)
                .with_context(|| format!("failed to remove stale {}", path.display()))?;
            debug!(path = %path.display(), "removed interrupted merge output");
        }
        Ok(stray)
    }

    fn run_stage(
        &self,
        category: Category,
        new_files: &BTreeMap<String, Vec<GriddedFile>>,
        snapshot: &mut ArchiveSnapshot,
    ) -> StageOutcome {
        let mut outcome = StageOutcome::new(category, false);
        let mut jobs = Vec::with_capacity(new_files.len());
        for (variable, files) in new_files {
            let base = match category.base() {
                Some(base_category) => {
                    let tied = snapshot.tied(base_category, variable);
                    if tied.len() > 1 {
                        outcome.ambiguities.push(base_ambiguity(
                            category,
                            base_category,
                            variable,
                            &tied,
                        ));
                    }
                    snapshot.current(base_category, variable).cloned()
                }
                None => None,
            };
            jobs.push(MergeJob {
                variable: variable.clone(),
                category,
                has_base: base.is_some(),
                inputs: base.into_iter().chain(files.iter().cloned()).collect(),
            });
        }

        let with_base = jobs.iter().filter(|j| j.has_base).count();
        info!(
            category = %category,
            variables = jobs.len(),
            with_base,
            new_files = new_files.values().map(Vec::len).sum::<usize>(),
            "merge stage started"
        );

        for (job, result) in jobs.iter().zip(self.run_jobs(&jobs)) {
            match result {
                Ok(file) => {
                    info!(category = %category, file = %file.file_name(), "merged");
                    outcome.merged.push(file);
                }
                Err(error) => {
                    warn::emit_error(
                        category.as_str(),
                        "merge",
                        &job.variable,
                        category.as_str(),
                        &error,
                    );
                    outcome.failed.push(VariableFailure {
                        variable: job.variable.clone(),
                        category,
                        error,
                    });
                }
            }
        }

        // Committed only once every worker of the stage has joined.
        for file in &outcome.merged {
            snapshot.commit(file.clone());
        }
        outcome
    }

    fn run_jobs(&self, jobs: &[MergeJob]) -> Vec<Result<GriddedFile, ArchiveError>> {
        let workers = self.cfg.concurrency_limit().min(jobs.len()).max(1);
        if workers == 1 {
            return jobs.iter().map(|job| self.merge_variable(job)).collect();
        }

        let next = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(jobs.len()));
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(idx) else {
                            break;
                        };
                        let result = self.merge_variable(job);
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((idx, result));
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn merge_variable(&self, job: &MergeJob) -> Result<GriddedFile, ArchiveError> {
        let temporary = self.cfg.archive_dir.join(temporary_name(
            &job.variable,
            self.cfg.dataset_suffix(),
            job.category,
            self.cfg.extension(),
        ));
        debug!(
            variable = %job.variable,
            category = %job.category,
            inputs = job.inputs.len(),
            temporary = %temporary.display(),
            "concatenating"
        );

        let result = concatenate(self.backend, &job.variable, &job.inputs, &temporary).and_then(
            |()| {
                name_by_range(
                    self.backend,
                    &temporary,
                    &job.variable,
                    job.category,
                    self.cfg.dataset_suffix(),
                    self.cfg.extension(),
                )
            },
        );
        if result.is_err() && temporary.exists() {
            let _ = fs::remove_file(&temporary);
        }
        result
    }
}
