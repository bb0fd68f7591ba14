use crate::archive::backend::GridBackend;
use crate::archive::category::{Category, DateRange, GriddedFile, canonical_name};
use crate::error::ArchiveError;
use std::fs;
use std::path::Path;

/// Renames a finished concatenation output to its canonical name once the
/// covered range is known. The rename stays inside the output's directory,
/// so a listing sees either the temporary name or the final one, never a
/// half-written file under the final name.
pub fn name_by_range(
    backend: &dyn GridBackend,
    temporary: &Path,
    variable: &str,
    category: Category,
    dataset_suffix: &str,
    extension: &str,
) -> Result<GriddedFile, ArchiveError> {
    let axis = backend.time_axis(temporary)?;
    let range = DateRange::covering(axis.iter()).ok_or_else(|| ArchiveError::EmptyTimeAxis {
        path: temporary.to_path_buf(),
    })?;

    let name = canonical_name(variable, dataset_suffix, category, &range, extension);
    let target = temporary.with_file_name(name);
    fs::rename(temporary, &target).map_err(|err| ArchiveError::io(&target, err))?;

    Ok(GriddedFile {
        variable: variable.to_string(),
        category,
        date_range: Some(range),
        path: target,
    })
}
