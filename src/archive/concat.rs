use crate::archive::backend::GridBackend;
use crate::archive::category::GriddedFile;
use crate::error::ArchiveError;
use std::path::{Path, PathBuf};

/// Appends `inputs` along the time axis into `dest`. All inputs must belong
/// to `variable` and share the first input's spatial grid; inputs are left
/// untouched.
pub fn concatenate(
    backend: &dyn GridBackend,
    variable: &str,
    inputs: &[GriddedFile],
    dest: &Path,
) -> Result<(), ArchiveError> {
    let Some(first) = inputs.first() else {
        return Err(ArchiveError::EmptyInput {
            variable: variable.to_string(),
        });
    };

    if let Some(other) = inputs.iter().find(|f| f.variable != variable) {
        return Err(ArchiveError::GridMismatch {
            variable: variable.to_string(),
            expected: format!("variable {variable}"),
            found: format!("variable {}", other.variable),
            path: other.path.clone(),
        });
    }

    let expected = backend.grid_shape(&first.path)?;
    for file in &inputs[1..] {
        let found = backend.grid_shape(&file.path)?;
        if found != expected {
            return Err(ArchiveError::GridMismatch {
                variable: variable.to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
                path: file.path.clone(),
            });
        }
    }

    let paths = inputs.iter().map(|f| f.path.clone()).collect::<Vec<PathBuf>>();
    backend.concat(&paths, dest)
}
