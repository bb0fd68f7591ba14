use std::path::PathBuf;

use thiserror::Error;

/// Failures scoped to one file, one variable or one (variable, category)
/// pair. None of these abort a whole run; they are collected into the
/// run report.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unclassifiable file name `{name}`: {reason}")]
    UnclassifiableName { name: String, reason: String },
    #[error(
        "grid mismatch for variable {variable}: expected {expected}, found {found} in {}",
        path.display()
    )]
    GridMismatch {
        variable: String,
        expected: String,
        found: String,
        path: PathBuf,
    },
    #[error("empty time axis in {}", path.display())]
    EmptyTimeAxis { path: PathBuf },
    #[error(
        "retention ambiguity for {variable}/{category}: {} files share end date {end}",
        files.len()
    )]
    RetentionAmbiguity {
        variable: String,
        category: String,
        end: String,
        files: Vec<PathBuf>,
    },
    #[error("no input files to concatenate for variable {variable}")]
    EmptyInput { variable: String },
    #[error("{tool} failed: {message}")]
    Backend { tool: String, message: String },
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    E001UnclassifiableName,
    E002GridMismatch,
    E003EmptyTimeAxis,
    E004RetentionAmbiguity,
    E005EmptyInput,
    E006BackendFailure,
    E007Io,
}

impl ArchiveErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001UnclassifiableName => "E001_UNCLASSIFIABLE_NAME",
            Self::E002GridMismatch => "E002_GRID_MISMATCH",
            Self::E003EmptyTimeAxis => "E003_EMPTY_TIME_AXIS",
            Self::E004RetentionAmbiguity => "E004_RETENTION_AMBIGUITY",
            Self::E005EmptyInput => "E005_EMPTY_INPUT",
            Self::E006BackendFailure => "E006_BACKEND_FAILURE",
            Self::E007Io => "E007_IO",
        }
    }
}

impl ArchiveError {
    pub fn code(&self) -> ArchiveErrorCode {
        match self {
            Self::UnclassifiableName { .. } => ArchiveErrorCode::E001UnclassifiableName,
            Self::GridMismatch { .. } => ArchiveErrorCode::E002GridMismatch,
            Self::EmptyTimeAxis { .. } => ArchiveErrorCode::E003EmptyTimeAxis,
            Self::RetentionAmbiguity { .. } => ArchiveErrorCode::E004RetentionAmbiguity,
            Self::EmptyInput { .. } => ArchiveErrorCode::E005EmptyInput,
            Self::Backend { .. } => ArchiveErrorCode::E006BackendFailure,
            Self::Io { .. } => ArchiveErrorCode::E007Io,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        let err = ArchiveError::EmptyTimeAxis {
            path: PathBuf::from("/tmp/x.nc"),
        };
        assert_eq!(err.code().as_str(), "E003_EMPTY_TIME_AXIS");
        assert_eq!(err.to_string(), "empty time axis in /tmp/x.nc");
    }
}
