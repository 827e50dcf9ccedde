use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeodlError {
    #[error("invalid GEO series accession: {0}")]
    InvalidGeoAccession(String),

    #[error("invalid ENA study accession: {0}")]
    InvalidStudyAccession(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("{catalog} is unreachable: {message}")]
    #[diagnostic(help("check your network connection and the accession number"))]
    CatalogUnreachable { catalog: String, message: String },

    #[error("unexpected {catalog} response: {message}")]
    CatalogParse { catalog: String, message: String },

    #[error("{found} ENA studies match {accession}, expected exactly one")]
    #[diagnostic(help("resolve the ENA study manually and use the `ena` mode"))]
    AmbiguousAccession { accession: String, found: usize },

    #[error("sequence archive returned {found} run sets for {expected} ids")]
    InconsistentResultCount { expected: usize, found: usize },

    #[error("column `{column}` not found in {source_name}")]
    #[diagnostic(help("use --name-column / --url-column to select other columns"))]
    MissingColumn { column: String, source_name: String },

    #[error("duplicate sample name `{name}` in {source_name}")]
    DuplicateSampleName { name: String, source_name: String },

    #[error("line {line} of {source_name} has {found} fields, expected at least {expected}")]
    MalformedRow {
        source_name: String,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line} of {source_name} cannot be read: {message}")]
    InvalidRow {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("{0} was not found in the sample listing")]
    UnmappedAccession(String),

    #[error("{key} lists {count} fastq urls, expected 1 or 2")]
    UnexpectedUrlCount { key: String, count: usize },

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install it or point geodl at it in geodl.json"))]
    ToolNotFound(String),

    #[error("transfer failed (exit {code:?}): {command}")]
    TransferFailed { code: Option<i32>, command: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl GeodlError {
    pub fn unreachable(catalog: &str, message: impl Into<String>) -> Self {
        GeodlError::CatalogUnreachable {
            catalog: catalog.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(catalog: &str, message: impl Into<String>) -> Self {
        GeodlError::CatalogParse {
            catalog: catalog.to_string(),
            message: message.into(),
        }
    }
}
