use crate::error::ArchiveError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DATE_TOKEN_FORMAT: &str = "%Y%m%d";
const TEMPORARY_MARKER: &str = "_tmp";

/// Temporal category of a gridded file. The derived ordering is the cascade
/// order: a category's merge result is the base of the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Historical,
    Previous,
    Latest,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Historical, Category::Previous, Category::Latest];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Previous => "previous",
            Self::Latest => "latest",
        }
    }

    /// Category whose current archive file seeds this category's merge.
    pub fn base(self) -> Option<Category> {
        match self {
            Self::Historical => None,
            Self::Previous => Some(Self::Historical),
            Self::Latest => Some(Self::Previous),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historical" => Ok(Self::Historical),
            "previous" => Ok(Self::Previous),
            "latest" => Ok(Self::Latest),
            other => Err(format!(
                "unknown category `{other}` (use historical, previous or latest)"
            )),
        }
    }
}

/// Closed interval of calendar dates covered by a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Smallest range covering every date, `None` for an empty axis.
    pub fn covering<'a>(dates: impl IntoIterator<Item = &'a NaiveDate>) -> Option<Self> {
        let mut iter = dates.into_iter();
        let first = *iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(*d), hi.max(*d)));
        Some(Self { start, end })
    }

    pub fn token(&self) -> String {
        format!(
            "{}-{}",
            self.start.format(DATE_TOKEN_FORMAT),
            self.end.format(DATE_TOKEN_FORMAT)
        )
    }

    pub fn parse_token(token: &str) -> Option<Self> {
        let (start, end) = token.split_once('-')?;
        Some(Self::new(parse_date_token(start)?, parse_date_token(end)?))
    }
}

pub fn parse_date_token(token: &str) -> Option<NaiveDate> {
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(token, DATE_TOKEN_FORMAT).ok()
}

/// One variable's gridded time series on disk. `date_range` is only known
/// for canonically named archive members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GriddedFile {
    pub variable: String,
    pub category: Category,
    pub date_range: Option<DateRange>,
    pub path: PathBuf,
}

impl GriddedFile {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

fn suffix_token(dataset_suffix: &str) -> String {
    format!("_{dataset_suffix}")
}

fn unclassifiable(name: &str, reason: impl Into<String>) -> ArchiveError {
    ArchiveError::UnclassifiableName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Splits `name` around the first `_<suffix>` token, returning the variable
/// prefix and whatever follows the token.
fn split_on_suffix<'a>(
    name: &'a str,
    dataset_suffix: &str,
) -> Result<(&'a str, &'a str), ArchiveError> {
    let token = suffix_token(dataset_suffix);
    let Some(idx) = name.find(&token) else {
        return Err(unclassifiable(
            name,
            format!("missing dataset suffix token `{token}`"),
        ));
    };
    let variable = &name[..idx];
    let rest = &name[idx + token.len()..];
    if variable.is_empty() {
        return Err(unclassifiable(name, "empty variable prefix"));
    }
    if !matches!(rest.chars().next(), None | Some('_' | '.' | '-')) {
        return Err(unclassifiable(
            name,
            format!("dataset suffix token `{token}` is not delimited"),
        ));
    }
    Ok((variable, rest))
}

fn category_of(rest: &str) -> Category {
    if rest.contains(Category::Latest.as_str()) {
        Category::Latest
    } else if rest.contains(Category::Previous.as_str()) {
        Category::Previous
    } else {
        Category::Historical
    }
}

/// Recovers `(variable, category)` from any converted or archived file name.
/// A name that mentions neither `latest` nor `previous` after the suffix
/// token is historical.
pub fn classify_name(name: &str, dataset_suffix: &str) -> Result<(String, Category), ArchiveError> {
    let (variable, rest) = split_on_suffix(name, dataset_suffix)?;
    Ok((variable.to_string(), category_of(rest)))
}

/// Category of a download-side name that starts with the suffix itself and
/// carries no variable, e.g. `QUOT_SIM2_latest-20250801-20260215.csv.gz`.
pub fn classify_unprefixed(name: &str, dataset_suffix: &str) -> Option<Category> {
    let rest = name.strip_prefix(dataset_suffix)?;
    match rest.chars().next() {
        Some('_' | '.' | '-') => Some(category_of(rest)),
        _ => None,
    }
}

fn path_name(path: &Path) -> Result<&str, ArchiveError> {
    path.file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| unclassifiable(&path.display().to_string(), "not a UTF-8 file name"))
}

pub fn classify_path(path: &Path, dataset_suffix: &str) -> Result<GriddedFile, ArchiveError> {
    let name = path_name(path)?;
    let (variable, category) = classify_name(name, dataset_suffix)?;
    Ok(GriddedFile {
        variable,
        category,
        date_range: None,
        path: path.to_path_buf(),
    })
}

/// Strict parser for archive members:
/// `<variable>_<suffix>_<category>-<YYYYMMDD>-<YYYYMMDD>.<ext>`.
pub fn parse_canonical(
    path: &Path,
    dataset_suffix: &str,
    extension: &str,
) -> Result<GriddedFile, ArchiveError> {
    let name = path_name(path)?;
    let (variable, rest) = split_on_suffix(name, dataset_suffix)?;
    let ext_suffix = format!(".{extension}");
    let tail = rest
        .strip_prefix('_')
        .and_then(|r| r.strip_suffix(ext_suffix.as_str()))
        .ok_or_else(|| unclassifiable(name, "not a canonical archive name"))?;
    let (category, range) = tail
        .split_once('-')
        .ok_or_else(|| unclassifiable(name, "missing date range"))?;
    let category = category
        .parse::<Category>()
        .map_err(|reason| unclassifiable(name, reason))?;
    let range = DateRange::parse_token(range)
        .ok_or_else(|| unclassifiable(name, "date range is not YYYYMMDD-YYYYMMDD"))?;
    Ok(GriddedFile {
        variable: variable.to_string(),
        category,
        date_range: Some(range),
        path: path.to_path_buf(),
    })
}

pub fn canonical_name(
    variable: &str,
    dataset_suffix: &str,
    category: Category,
    range: &DateRange,
    extension: &str,
) -> String {
    format!(
        "{variable}_{dataset_suffix}_{category}-{}.{extension}",
        range.token()
    )
}

/// Name of the in-progress concatenation output for one (variable, category).
/// It never parses as canonical, so listings cannot mistake it for a member.
pub fn temporary_name(
    variable: &str,
    dataset_suffix: &str,
    category: Category,
    extension: &str,
) -> String {
    format!("{variable}_{dataset_suffix}_{category}{TEMPORARY_MARKER}.{extension}")
}

pub fn is_temporary_name(name: &str, extension: &str) -> bool {
    name.ends_with(&format!("{TEMPORARY_MARKER}.{extension}"))
}

/// Two-element label used by the publish collaborator: the name is split on
/// `_<suffix>_`, then the remainder on its first hyphen.
pub fn publish_labels(name: &str, dataset_suffix: &str) -> Option<[String; 2]> {
    let token = format!("_{dataset_suffix}_");
    let (variable, rest) = name.split_once(&token)?;
    let (category, _) = rest.split_once('-')?;
    if variable.is_empty() || category.is_empty() {
        return None;
    }
    Some([variable.to_string(), category.to_string()])
}
