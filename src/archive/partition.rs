use crate::archive::category::{Category, GriddedFile, classify_path};
use crate::error::ArchiveError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Groups files by variable. Each group is ordered by file name, which for
/// this naming scheme is also chronological order: every embedded date token
/// is a fixed-width, most-significant-first number following the same prefix.
pub fn partition_by_variable(files: &[GriddedFile]) -> BTreeMap<String, Vec<GriddedFile>> {
    let mut out: BTreeMap<String, Vec<GriddedFile>> = BTreeMap::new();
    for file in files {
        out.entry(file.variable.clone())
            .or_default()
            .push(file.clone());
    }
    for group in out.values_mut() {
        group.sort_by(|a, b| a.file_name().cmp(b.file_name()));
    }
    out
}

/// Newly converted files for one run, split by category then variable.
#[derive(Debug, Default)]
pub struct MergeBatch {
    pub by_category: BTreeMap<Category, BTreeMap<String, Vec<GriddedFile>>>,
    pub rejected: Vec<ArchiveError>,
}

impl MergeBatch {
    pub fn from_paths(paths: &[PathBuf], dataset_suffix: &str) -> Self {
        let mut classified: BTreeMap<Category, Vec<GriddedFile>> = BTreeMap::new();
        let mut rejected = Vec::new();
        for path in paths {
            match classify_path(path, dataset_suffix) {
                Ok(file) => classified.entry(file.category).or_default().push(file),
                Err(err) => rejected.push(err),
            }
        }
        let by_category = classified
            .into_iter()
            .map(|(category, files)| (category, partition_by_variable(&files)))
            .collect();
        Self {
            by_category,
            rejected,
        }
    }

    pub fn stage(&self, category: Category) -> Option<&BTreeMap<String, Vec<GriddedFile>>> {
        self.by_category.get(&category).filter(|m| !m.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.values().all(BTreeMap::is_empty)
    }
}
