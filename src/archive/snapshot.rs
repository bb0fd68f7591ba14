use crate::archive::category::{Category, GriddedFile, is_temporary_name, parse_canonical};
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory view of the archive members, threaded through the merge stages
/// so that a later stage reads the earlier stage's fresh outputs without
/// listing the directory again.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSnapshot {
    members: BTreeMap<(Category, String), Vec<GriddedFile>>,
    pub stray_temporaries: Vec<PathBuf>,
}

/// Members of one pair ordered so the current one sorts last: later end
/// date first, then earlier start (wider coverage), then file name.
fn member_order(a: &GriddedFile, b: &GriddedFile) -> Ordering {
    let end = |f: &GriddedFile| f.date_range.map(|r| r.end);
    let start = |f: &GriddedFile| f.date_range.map(|r| r.start);
    end(a)
        .cmp(&end(b))
        .then_with(|| start(b).cmp(&start(a)))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

impl ArchiveSnapshot {
    /// Lists canonically named members of `dir`. A missing directory is an
    /// empty archive; anything else that fails to list is fatal.
    pub fn scan(dir: &Path, dataset_suffix: &str, extension: &str) -> Result<Self> {
        let mut out = Self::default();
        if !dir.exists() {
            return Ok(out);
        }
        let read_dir =
            fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
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
            if is_temporary_name(name, extension) {
                out.stray_temporaries.push(path);
                continue;
            }
            if let Ok(file) = parse_canonical(&path, dataset_suffix, extension) {
                out.insert(file);
            }
        }
        for files in out.members.values_mut() {
            files.sort_by(member_order);
        }
        out.stray_temporaries.sort();
        Ok(out)
    }

    fn insert(&mut self, file: GriddedFile) {
        self.members
            .entry((file.category, file.variable.clone()))
            .or_default()
            .push(file);
    }

    /// Current member for a pair: the latest end date, then the earliest
    /// start. Several candidates only exist before the sweep has run or
    /// after a retention tie.
    pub fn current(&self, category: Category, variable: &str) -> Option<&GriddedFile> {
        self.members
            .get(&(category, variable.to_string()))
            .and_then(|files| files.iter().max_by(|a, b| member_order(a, b)))
    }

    /// Every member of the pair sharing its greatest end date.
    pub fn tied(&self, category: Category, variable: &str) -> Vec<&GriddedFile> {
        let Some(files) = self.members.get(&(category, variable.to_string())) else {
            return Vec::new();
        };
        let end = |f: &GriddedFile| f.date_range.map(|r| r.end);
        let max_end = files.iter().map(end).max().flatten();
        files
            .iter()
            .filter(|f| max_end.is_some() && end(*f) == max_end)
            .collect()
    }

    /// Records a freshly named merge output as the pair's only current file.
    pub fn commit(&mut self, file: GriddedFile) {
        self.members
            .insert((file.category, file.variable.clone()), vec![file]);
    }

    pub fn current_members(&self) -> Vec<&GriddedFile> {
        self.members
            .keys()
            .filter_map(|(category, variable)| self.current(*category, variable))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}
