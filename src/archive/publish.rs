use crate::archive::category::publish_labels;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishEntry {
    pub path: PathBuf,
    pub labels: [String; 2],
}

/// Downstream consumer of the final archive paths (catalog upload, local
/// listing, ...).
pub trait PublishSink {
    fn accept(&mut self, entries: &[PublishEntry]) -> Result<()>;
}

/// Paths whose names carry no `[variable, category]` label are left out.
pub fn publish_entries<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    dataset_suffix: &str,
) -> Vec<PublishEntry> {
    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let labels = publish_labels(name, dataset_suffix)?;
            Some(PublishEntry {
                path: path.to_path_buf(),
                labels,
            })
        })
        .collect()
}

/// Writes the entries as a pretty JSON array for the upload step.
#[derive(Debug, Clone)]
pub struct JsonListSink {
    pub path: PathBuf,
}

impl PublishSink for JsonListSink {
    fn accept(&mut self, entries: &[PublishEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, format!("{data}\n"))
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
