use crate::archive::category::Category;
use crate::archive::paths::{ArchivePaths, default_paths, env_or_default_path, safran_home};
use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Nco,
    Json,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nco => "nco",
            Self::Json => "json",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nco" => Ok(Self::Nco),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown backend `{other}` (use nco or json)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub suffix: String,
    pub extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            suffix: "QUOT_SIM2".to_string(),
            extension: "nc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub concurrency_limit: usize,
    pub backend: BackendKind,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 1,
            backend: BackendKind::Nco,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcoConfig {
    pub ncrcat_bin: Option<PathBuf>,
    pub ncdump_bin: Option<PathBuf>,
    #[serde(default = "default_time_dim")]
    pub time_dim: String,
}

fn default_time_dim() -> String {
    "time".to_string()
}

impl Default for NcoConfig {
    fn default() -> Self {
        Self {
            ncrcat_bin: None,
            ncdump_bin: None,
            time_dim: default_time_dim(),
        }
    }
}

/// Retention patterns keyed by category. Each pattern must capture the end
/// date, through a group named `end` or else its last group.
pub fn default_category_patterns() -> BTreeMap<Category, String> {
    Category::ALL
        .into_iter()
        .map(|c| (c, format!(r"{c}-(?P<start>\d{{8}})-(?P<end>\d{{8}})")))
        .collect()
}

/// Everything the merge engine needs, resolved once and passed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub archive_dir: PathBuf,
    pub converted_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub dataset: DatasetConfig,
    pub merge: MergeConfig,
    pub category_patterns: BTreeMap<Category, String>,
    /// Extensions the retention sweep considers. Empty means the dataset
    /// extension only.
    pub retention_extensions: Vec<String>,
    pub nco: NcoConfig,
}

impl ArchiveConfig {
    pub fn with_paths(paths: ArchivePaths) -> Self {
        Self {
            archive_dir: paths.archive_dir,
            converted_dir: paths.converted_dir,
            logs_dir: paths.logs_dir,
            dataset: DatasetConfig::default(),
            merge: MergeConfig::default(),
            category_patterns: default_category_patterns(),
            retention_extensions: Vec::new(),
            nco: NcoConfig::default(),
        }
    }

    pub fn dataset_suffix(&self) -> &str {
        &self.dataset.suffix
    }

    pub fn extension(&self) -> &str {
        &self.dataset.extension
    }

    pub fn concurrency_limit(&self) -> usize {
        self.merge.concurrency_limit
    }

    pub fn sweep_extensions(&self) -> Vec<String> {
        if self.retention_extensions.is_empty() {
            vec![self.dataset.extension.clone()]
        } else {
            self.retention_extensions.clone()
        }
    }
}

/// `.csv.gz`, ` csv.gz` and `csv.gz` all name the same extension.
pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPaths {
    archive_dir: Option<PathBuf>,
    converted_dir: Option<PathBuf>,
    logs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialArchiveConfig {
    paths: Option<PartialPaths>,
    dataset: Option<DatasetConfig>,
    merge: Option<MergeConfig>,
    retention: Option<PartialRetention>,
    nco: Option<NcoConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRetention {
    #[serde(default)]
    patterns: BTreeMap<Category, String>,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub archive_dir: Option<PathBuf>,
    pub converted_dir: Option<PathBuf>,
    pub concurrency_limit: Option<usize>,
    pub backend: Option<BackendKind>,
}

fn parse_usize_var(var: &str, raw: &str) -> Result<usize> {
    let raw = raw.trim();
    raw.parse::<usize>()
        .map_err(|err| anyhow!("{var}: invalid number `{raw}`: {err}"))
}

fn env_or_usize(var: &str, fallback: usize) -> Result<usize> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => parse_usize_var(var, &v),
        _ => Ok(fallback),
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_path(var: &str, fallback: Option<PathBuf>) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => fallback,
    }
}

fn env_or_list(var: &str, fallback: Vec<String>) -> Vec<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.split(',').map(str::to_string).collect(),
        _ => fallback,
    }
}

fn env_or_backend(var: &str, fallback: BackendKind) -> Result<BackendKind> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => {
            v.parse::<BackendKind>().map_err(|e| anyhow!("{var}: {e}"))
        }
        _ => Ok(fallback),
    }
}

pub fn validate(cfg: &ArchiveConfig) -> Result<()> {
    let suffix = cfg.dataset.suffix.trim();
    if suffix.is_empty() {
        return Err(anyhow!("invalid dataset suffix: cannot be empty"));
    }
    if suffix.contains(['/', '\\']) {
        return Err(anyhow!(
            "invalid dataset suffix: cannot contain path separators"
        ));
    }
    if cfg.dataset.extension.trim().is_empty() {
        return Err(anyhow!("invalid file extension: cannot be empty"));
    }
    if cfg.merge.concurrency_limit == 0 {
        return Err(anyhow!("invalid concurrency limit: must be >= 1"));
    }
    if cfg.nco.time_dim.trim().is_empty() {
        return Err(anyhow!("invalid time dimension name: cannot be empty"));
    }
    for category in Category::ALL {
        let Some(pattern) = cfg.category_patterns.get(&category) else {
            return Err(anyhow!("missing retention pattern for category {category}"));
        };
        let regex = Regex::new(pattern)
            .map_err(|err| anyhow!("invalid retention pattern for {category}: {err}"))?;
        if regex.captures_len() < 2 {
            return Err(anyhow!(
                "invalid retention pattern for {category}: must capture the end date"
            ));
        }
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("SAFRAN_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = safran_home().ok()?;
    Some(home.join("safran-archive.toml"))
}

fn merge_file_config(base: &mut ArchiveConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialArchiveConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse archive config {}: {err}", path.display()))?;
    if let Some(paths) = parsed.paths {
        if let Some(dir) = paths.archive_dir {
            base.archive_dir = dir;
        }
        if let Some(dir) = paths.converted_dir {
            base.converted_dir = dir;
        }
        if let Some(dir) = paths.logs_dir {
            base.logs_dir = dir;
        }
    }
    if let Some(dataset) = parsed.dataset {
        base.dataset = dataset;
    }
    if let Some(merge) = parsed.merge {
        base.merge = merge;
    }
    if let Some(retention) = parsed.retention {
        base.category_patterns.extend(retention.patterns);
        if !retention.extensions.is_empty() {
            base.retention_extensions = retention.extensions;
        }
    }
    if let Some(nco) = parsed.nco {
        base.nco = nco;
    }
    Ok(())
}

fn apply_env(cfg: &mut ArchiveConfig) -> Result<()> {
    cfg.archive_dir = env_or_default_path("SAFRAN_ARCHIVE_DIR", cfg.archive_dir.clone());
    cfg.converted_dir = env_or_default_path("SAFRAN_CONVERTED_DIR", cfg.converted_dir.clone());
    cfg.logs_dir = env_or_default_path("SAFRAN_LOGS_DIR", cfg.logs_dir.clone());
    cfg.dataset.suffix = env_or_string("SAFRAN_DATASET_SUFFIX", &cfg.dataset.suffix);
    cfg.dataset.extension = env_or_string("SAFRAN_FILE_EXTENSION", &cfg.dataset.extension);
    cfg.merge.concurrency_limit = env_or_usize("SAFRAN_CONCURRENCY", cfg.merge.concurrency_limit)?;
    cfg.merge.backend = env_or_backend("SAFRAN_BACKEND", cfg.merge.backend)?;
    cfg.retention_extensions = env_or_list(
        "SAFRAN_SWEEP_EXTENSIONS",
        std::mem::take(&mut cfg.retention_extensions),
    );
    cfg.nco.ncrcat_bin = env_or_optional_path("SAFRAN_NCRCAT_BIN", cfg.nco.ncrcat_bin.take());
    cfg.nco.ncdump_bin = env_or_optional_path("SAFRAN_NCDUMP_BIN", cfg.nco.ncdump_bin.take());
    Ok(())
}

fn apply_overrides(cfg: &mut ArchiveConfig, overrides: &ConfigOverrides) {
    if let Some(dir) = &overrides.archive_dir {
        cfg.archive_dir = dir.clone();
    }
    if let Some(dir) = &overrides.converted_dir {
        cfg.converted_dir = dir.clone();
    }
    if let Some(limit) = overrides.concurrency_limit {
        cfg.merge.concurrency_limit = limit;
    }
    if let Some(backend) = overrides.backend {
        cfg.merge.backend = backend;
    }
}

fn normalize(cfg: &mut ArchiveConfig) {
    cfg.dataset.suffix = cfg.dataset.suffix.trim().to_string();
    cfg.dataset.extension = normalize_extension(&cfg.dataset.extension);
    cfg.retention_extensions = cfg
        .retention_extensions
        .iter()
        .map(|ext| normalize_extension(ext))
        .filter(|ext| !ext.is_empty())
        .collect();
}

pub fn load_config(overrides: &ConfigOverrides) -> Result<ArchiveConfig> {
    let mut cfg = ArchiveConfig::with_paths(default_paths()?);
    merge_file_config(&mut cfg)?;
    apply_env(&mut cfg)?;
    apply_overrides(&mut cfg, overrides);
    normalize(&mut cfg);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArchiveConfig {
        ArchiveConfig::with_paths(ArchivePaths {
            archive_dir: PathBuf::from("/data/output"),
            converted_dir: PathBuf::from("/data/convert"),
            logs_dir: PathBuf::from("/data/logs"),
        })
    }

    #[test]
    fn defaults_are_valid() {
        validate(&sample()).expect("defaults validate");
    }

    #[test]
    fn default_patterns_capture_eight_digit_end_dates() {
        let patterns = default_category_patterns();
        let re = Regex::new(&patterns[&Category::Previous]).expect("regex");
        let caps = re
            .captures("T_QUOT_SIM2_previous-19580101-20191231.nc")
            .expect("match");
        assert_eq!(&caps["end"], "20191231");
        assert!(re.captures("T_QUOT_SIM2_previous-2020-202507.nc").is_none());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = sample();
        cfg.merge.concurrency_limit = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn pattern_without_capture_is_rejected() {
        let mut cfg = sample();
        cfg.category_patterns
            .insert(Category::Latest, r"latest-\d{8}-\d{8}".to_string());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_toml_merges_section_by_section() {
        let raw = r#"
[dataset]
suffix = "QUOT_SIM2"
extension = ".json"

[retention]
extensions = [".csv.gz", "nc"]

[retention.patterns]
latest = 'latest-(\d{8})-(\d{8})'
"#;
        let parsed: PartialArchiveConfig = toml::from_str(raw).expect("parse");
        let mut cfg = sample();
        let dataset = parsed.dataset.expect("dataset");
        cfg.dataset = dataset;
        let retention = parsed.retention.expect("retention");
        cfg.category_patterns.extend(retention.patterns);
        cfg.retention_extensions = retention.extensions;
        normalize(&mut cfg);
        assert_eq!(cfg.extension(), "json");
        assert_eq!(cfg.sweep_extensions(), ["csv.gz", "nc"]);
        assert_eq!(
            cfg.category_patterns[&Category::Latest],
            r"latest-(\d{8})-(\d{8})"
        );
        assert!(cfg.category_patterns.contains_key(&Category::Historical));
        validate(&cfg).expect("valid");
    }

    #[test]
    fn overrides_win() {
        let mut cfg = sample();
        apply_overrides(
            &mut cfg,
            &ConfigOverrides {
                archive_dir: Some(PathBuf::from("/tmp/a")),
                concurrency_limit: Some(4),
                backend: Some(BackendKind::Json),
                ..ConfigOverrides::default()
            },
        );
        assert_eq!(cfg.archive_dir, PathBuf::from("/tmp/a"));
        assert_eq!(cfg.concurrency_limit(), 4);
        assert_eq!(cfg.merge.backend, BackendKind::Json);
    }

    #[test]
    fn sweep_extensions_default_to_dataset_extension() {
        let mut cfg = sample();
        assert_eq!(cfg.sweep_extensions(), ["nc"]);
        cfg.retention_extensions = vec![" .parquet".to_string(), String::new()];
        normalize(&mut cfg);
        assert_eq!(cfg.sweep_extensions(), ["parquet"]);
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let var = "SAFRAN_CONCURRENCY";
        assert_eq!(parse_usize_var(var, " 4 ").expect("valid"), 4);
        let err = parse_usize_var(var, "four").expect_err("invalid");
        let message = err.to_string();
        assert!(message.starts_with("SAFRAN_CONCURRENCY:"));
        assert!(message.contains("invalid number `four`"));
    }
}
