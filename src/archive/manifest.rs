use crate::archive::category::{Category, GriddedFile};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const MANIFEST_FILE: &str = "manifest.json";
const HASH_BUFFER: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub ambiguous: bool,
}

/// Variable → category → current member. Kept next to the archive so the
/// newest version of a series does not have to be inferred from names alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub schema_version: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, BTreeMap<Category, ManifestEntry>>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: 1,
            updated_at: None,
            entries: BTreeMap::new(),
        }
    }
}

pub fn manifest_path(archive_dir: &Path) -> PathBuf {
    archive_dir.join(MANIFEST_FILE)
}

/// SHA-256 of a file, read in fixed-size chunks.
pub fn file_hash(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn entry_rank(entry: &ManifestEntry) -> (NaiveDate, Reverse<NaiveDate>, &str) {
    (entry.end, Reverse(entry.start), entry.file.as_str())
}

impl Manifest {
    /// Builds the manifest from the surviving members. `ambiguous` marks the
    /// pairs where the sweep kept more than one file; the entry then names
    /// the one with the earliest start. A member still listed under the same
    /// name and size in `previous` keeps its recorded checksum.
    pub fn from_members<'a>(
        members: impl IntoIterator<Item = &'a GriddedFile>,
        ambiguous: &[(String, Category)],
        previous: Option<&Manifest>,
    ) -> Result<Self> {
        let mut out = Self {
            updated_at: Some(Utc::now()),
            ..Self::default()
        };
        for member in members {
            let Some(range) = member.date_range else {
                continue;
            };
            let size = fs::metadata(&member.path)
                .with_context(|| format!("failed to stat {}", member.path.display()))?
                .len();
            let reused = previous
                .and_then(|m| m.get(&member.variable, member.category))
                .filter(|e| e.file == member.file_name() && e.size == size)
                .map(|e| e.sha256.clone());
            let sha256 = match reused {
                Some(sha256) => sha256,
                None => file_hash(&member.path)?,
            };
            let entry = ManifestEntry {
                file: member.file_name().to_string(),
                start: range.start,
                end: range.end,
                sha256,
                size,
                ambiguous: ambiguous
                    .iter()
                    .any(|(v, c)| *v == member.variable && *c == member.category),
            };
            let slot = out.entries.entry(member.variable.clone()).or_default();
            match slot.get(&member.category) {
                Some(existing) if entry_rank(existing) >= entry_rank(&entry) => {}
                _ => {
                    slot.insert(member.category, entry);
                }
            }
        }
        Ok(out)
    }

    /// Loads the manifest to carry checksums over; an unreadable one is
    /// logged and treated as absent since it is about to be replaced.
    pub fn load_for_refresh(archive_dir: &Path) -> Option<Self> {
        match Self::load(archive_dir) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "ignoring unreadable manifest");
                None
            }
        }
    }

    pub fn load(archive_dir: &Path) -> Result<Option<Self>> {
        let path = manifest_path(archive_dir);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(parsed))
    }

    /// Replaces the manifest through a temporary file in the same directory.
    pub fn save(&self, archive_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(archive_dir)
            .with_context(|| format!("failed to create {}", archive_dir.display()))?;
        let path = manifest_path(archive_dir);
        let data = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(archive_dir)
            .with_context(|| format!("failed to create temp file in {}", archive_dir.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())?;
        tmp.persist(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn get(&self, variable: &str, category: Category) -> Option<&ManifestEntry> {
        self.entries.get(variable)?.get(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::category::DateRange;
    use tempfile::tempdir;

    fn member(
        dir: &Path,
        variable: &str,
        category: Category,
        start: &str,
        end: &str,
    ) -> GriddedFile {
        let range = DateRange::parse_token(&format!("{start}-{end}")).expect("range");
        let name = format!("{variable}_QUOT_SIM2_{category}-{}.nc", range.token());
        let path = dir.join(name);
        fs::write(&path, format!("{variable}{category}{end}")).expect("write");
        GriddedFile {
            variable: variable.to_string(),
            category,
            date_range: Some(range),
            path,
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path();
        let members = [
            member(dir, "T", Category::Historical, "19580101", "19991231"),
            member(dir, "T", Category::Latest, "19580101", "20200214"),
        ];
        let manifest = Manifest::from_members(members.iter(), &[], None).expect("build");
        manifest.save(tmp.path()).expect("save");

        let loaded = Manifest::load(tmp.path()).expect("load").expect("present");
        let latest = loaded.get("T", Category::Latest).expect("latest");
        assert_eq!(latest.file, "T_QUOT_SIM2_latest-19580101-20200214.nc");
        assert_eq!(latest.sha256, file_hash(&members[1].path).expect("hash"));
        assert!(loaded.get("T", Category::Previous).is_none());
    }

    #[test]
    fn tied_members_keep_widest_coverage_and_flag() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path();
        let members = [
            member(dir, "T", Category::Latest, "20000101", "20200214"),
            member(dir, "T", Category::Latest, "19580101", "20200214"),
        ];
        let ambiguous = [("T".to_string(), Category::Latest)];
        let manifest = Manifest::from_members(members.iter(), &ambiguous, None).expect("build");
        let entry = manifest.get("T", Category::Latest).expect("entry");
        assert_eq!(entry.file, "T_QUOT_SIM2_latest-19580101-20200214.nc");
        assert!(entry.ambiguous);
    }

    #[test]
    fn file_hash_streams_known_digest() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("abc.nc");
        fs::write(&path, b"abc").expect("write");
        assert_eq!(
            file_hash(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn unchanged_members_reuse_recorded_checksum() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path();
        let historical = member(dir, "T", Category::Historical, "19580101", "19991231");
        let latest = member(dir, "T", Category::Latest, "19580101", "20200214");
        let mut previous =
            Manifest::from_members([&historical, &latest], &[], None).expect("first");
        let marker = "0".repeat(64);
        for entry in previous.entries.values_mut().flat_map(|m| m.values_mut()) {
            entry.sha256 = marker.clone();
        }
        previous
            .entries
            .get_mut("T")
            .and_then(|m| m.get_mut(&Category::Latest))
            .expect("latest entry")
            .file = "T_QUOT_SIM2_latest-19580101-20200131.nc".to_string();

        let refreshed =
            Manifest::from_members([&historical, &latest], &[], Some(&previous)).expect("second");

        let kept = refreshed.get("T", Category::Historical).expect("historical");
        assert_eq!(kept.sha256, marker);
        let rehashed = refreshed.get("T", Category::Latest).expect("latest");
        assert_eq!(rehashed.sha256, file_hash(&latest.path).expect("hash"));
    }
}
