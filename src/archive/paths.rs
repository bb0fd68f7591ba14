use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePaths {
    pub archive_dir: PathBuf,
    pub converted_dir: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

pub fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn safran_home() -> Result<PathBuf> {
    let home = required_home_dir()?;
    Ok(env_or_default_path("SAFRAN_HOME", home.join("safran")))
}

/// Directory defaults rooted at `SAFRAN_HOME`. The configuration file and the
/// directory variables may override each of them.
pub fn default_paths() -> Result<ArchivePaths> {
    let root = safran_home()?;
    Ok(ArchivePaths {
        archive_dir: root.join("output"),
        converted_dir: root.join("convert"),
        logs_dir: root.join("logs"),
    })
}
