use crate::archive::backend::{GridBackend, GridShape};
use crate::error::ArchiveError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TOOL: &str = "json-grid";

/// Self-describing grid document: one row of values per time step, each row
/// holding the product of the spatial dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDocument {
    pub variable: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub dims: BTreeMap<String, usize>,
    pub time: Vec<NaiveDate>,
    pub values: Vec<Vec<f32>>,
}

impl GridDocument {
    pub fn read(path: &Path) -> Result<Self, ArchiveError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            ArchiveError::backend(TOOL, format!("failed to read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            ArchiveError::backend(TOOL, format!("failed to parse {}: {err}", path.display()))
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ArchiveError> {
        let data = serde_json::to_string(self)
            .map_err(|err| ArchiveError::backend(TOOL, err.to_string()))?;
        fs::write(path, format!("{data}\n")).map_err(|err| {
            ArchiveError::backend(TOOL, format!("failed to write {}: {err}", path.display()))
        })
    }

    fn shape(&self) -> GridShape {
        GridShape(self.dims.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGridBackend;

impl GridBackend for JsonGridBackend {
    fn name(&self) -> &'static str {
        TOOL
    }

    fn grid_shape(&self, path: &Path) -> Result<GridShape, ArchiveError> {
        Ok(GridDocument::read(path)?.shape())
    }

    fn time_axis(&self, path: &Path) -> Result<Vec<NaiveDate>, ArchiveError> {
        Ok(GridDocument::read(path)?.time)
    }

    fn concat(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ArchiveError> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(ArchiveError::backend(TOOL, "no inputs"));
        };
        let mut out = GridDocument::read(first)?;
        for path in rest {
            let mut next = GridDocument::read(path)?;
            if next.dims != out.dims || next.variable != out.variable {
                return Err(ArchiveError::GridMismatch {
                    variable: out.variable.clone(),
                    expected: format!("{} {}", out.variable, out.shape()),
                    found: format!("{} {}", next.variable, next.shape()),
                    path: path.clone(),
                });
            }
            out.time.append(&mut next.time);
            out.values.append(&mut next.values);
        }
        out.write(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(variable: &str, nx: usize, days: &[(i32, u32, u32)]) -> GridDocument {
        let time = days
            .iter()
            .map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d).expect("date"))
            .collect::<Vec<_>>();
        let values = time.iter().map(|_| vec![1.5; nx * 2]).collect();
        GridDocument {
            variable: variable.to_string(),
            attributes: BTreeMap::from([("units".to_string(), "K".to_string())]),
            dims: BTreeMap::from([("x".to_string(), nx), ("y".to_string(), 2)]),
            time,
            values,
        }
    }

    #[test]
    fn concat_appends_time_steps_in_input_order() {
        let tmp = tempdir().expect("tempdir");
        let a = tmp.path().join("a.json");
        let b = tmp.path().join("b.json");
        let out = tmp.path().join("out.json");
        doc("T", 3, &[(1958, 8, 1), (1958, 8, 2)]).write(&a).expect("write a");
        doc("T", 3, &[(1958, 8, 3)]).write(&b).expect("write b");

        JsonGridBackend
            .concat(&[a.clone(), b.clone()], &out)
            .expect("concat");

        let merged = GridDocument::read(&out).expect("read");
        assert_eq!(merged.time.len(), 3);
        assert_eq!(merged.values.len(), 3);
        assert_eq!(merged.attributes["units"], "K");
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn concat_rejects_different_grids() {
        let tmp = tempdir().expect("tempdir");
        let a = tmp.path().join("a.json");
        let b = tmp.path().join("b.json");
        doc("T", 3, &[(1958, 8, 1)]).write(&a).expect("write a");
        doc("T", 4, &[(1958, 8, 2)]).write(&b).expect("write b");

        let err = JsonGridBackend
            .concat(&[a, b], &tmp.path().join("out.json"))
            .expect_err("mismatch");
        assert!(matches!(err, ArchiveError::GridMismatch { .. }));
    }
}
