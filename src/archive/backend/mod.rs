pub mod json_grid;
pub mod nco;

use crate::archive::config::{ArchiveConfig, BackendKind};
use crate::error::ArchiveError;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Spatial (non-time) dimensions of a gridded file, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridShape(pub BTreeMap<String, usize>);

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|(name, len)| format!("{name}={len}"))
            .collect::<Vec<_>>();
        write!(f, "[{}]", parts.join(","))
    }
}

/// The array primitive the merge engine delegates to. Implementations must
/// append along the time dimension, keep every other piece of metadata from
/// the first input and never touch the inputs.
pub trait GridBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn grid_shape(&self, path: &Path) -> Result<GridShape, ArchiveError>;

    fn time_axis(&self, path: &Path) -> Result<Vec<NaiveDate>, ArchiveError>;

    fn concat(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ArchiveError>;
}

pub fn build_backend(cfg: &ArchiveConfig) -> Result<Box<dyn GridBackend>> {
    match cfg.merge.backend {
        BackendKind::Nco => Ok(Box::new(nco::NcoBackend::resolve(&cfg.nco)?)),
        BackendKind::Json => Ok(Box::new(json_grid::JsonGridBackend)),
    }
}
