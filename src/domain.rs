use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GeodlError;

/// Where the metadata table and the accession map come from for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// GEO series: sample names from GEO, runs from the linked ENA study.
    Geo,
    /// ENA study: runs and names straight from the ENA file report.
    Ena,
    /// Local ENA metadata file.
    Meta,
    /// GEO series downloaded as .sra archives with the SRA Toolkit.
    Prefetch,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Geo => write!(f, "geo"),
            RetrievalMode::Ena => write!(f, "ena"),
            RetrievalMode::Meta => write!(f, "meta"),
            RetrievalMode::Prefetch => write!(f, "prefetch"),
        }
    }
}

impl RetrievalMode {
    pub fn default_name_column(self) -> &'static str {
        match self {
            RetrievalMode::Geo => "experiment_alias",
            RetrievalMode::Ena | RetrievalMode::Meta => "sample_alias",
            RetrievalMode::Prefetch => "run_accession",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Wget,
    Aspera,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Wget => write!(f, "wget"),
            TransferKind::Aspera => write!(f, "aspera"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Single,
    Paired,
}

impl Layout {
    pub fn from_url_count(key: &str, count: usize) -> Result<Self, GeodlError> {
        match count {
            1 => Ok(Layout::Single),
            2 => Ok(Layout::Paired),
            _ => Err(GeodlError::UnexpectedUrlCount {
                key: key.to_string(),
                count,
            }),
        }
    }

    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Layout::Single => &[""],
            Layout::Paired => &["_R1", "_R2"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = GeodlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("GSE").unwrap_or("");
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GeodlError::InvalidGeoAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// ENA study or project accession (`SRP`, `ERP`, `DRP` or `PRJ..`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyAccession(String);

impl StudyAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudyAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudyAccession {
    type Err = GeodlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let prefix_len = normalized
            .chars()
            .take_while(|ch| ch.is_ascii_uppercase())
            .count();
        let (prefix, digits) = normalized.split_at(prefix_len);
        let known_prefix = matches!(prefix, "SRP" | "ERP" | "DRP")
            || (prefix.starts_with("PRJ") && (4..=5).contains(&prefix.len()));
        if !known_prefix || digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GeodlError::InvalidStudyAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
