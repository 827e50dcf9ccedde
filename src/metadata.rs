use std::collections::HashSet;
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::domain::Layout;
use crate::error::GeodlError;

/// Fields requested from the ENA file report.
pub const ENA_REPORT_FIELDS: &[&str] = &[
    "study_accession",
    "secondary_study_accession",
    "sample_accession",
    "secondary_sample_accession",
    "experiment_accession",
    "run_accession",
    "sample_alias",
    "sample_title",
    "scientific_name",
    "instrument_model",
    "library_layout",
    "read_count",
    "experiment_alias",
    "run_alias",
    "fastq_ftp",
];

const RUN_ACCESSION_COLUMN: &str = "run_accession";
const SAMPLE_TITLE_COLUMN: &str = "sample_title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub line: u64,
    /// Value of the naming column, used as the accession map key.
    pub key: String,
    pub urls: Vec<String>,
    pub run_accession: Option<String>,
    pub sample_title: Option<String>,
}

impl RunRecord {
    pub fn layout(&self) -> Result<Layout, GeodlError> {
        Layout::from_url_count(&self.key, self.urls.len())
    }
}

#[derive(Debug, Clone)]
pub struct MetadataTable {
    source: String,
    name_column: String,
    records: Vec<RunRecord>,
}

struct ColumnIndexes {
    name: usize,
    url: usize,
    run_accession: Option<usize>,
    sample_title: Option<usize>,
}

impl ColumnIndexes {
    fn from_header(
        header: &StringRecord,
        columns: &Columns,
        source: &str,
    ) -> Result<Self, GeodlError> {
        let find = |column: &str| header.iter().position(|value| value == column);
        let missing = |column: &str| GeodlError::MissingColumn {
            column: column.to_string(),
            source_name: source.to_string(),
        };
        let name = find(&columns.name).ok_or_else(|| missing(&columns.name))?;
        let url = find(&columns.url).ok_or_else(|| missing(&columns.url))?;
        Ok(Self {
            name,
            url,
            run_accession: find(RUN_ACCESSION_COLUMN),
            sample_title: find(SAMPLE_TITLE_COLUMN),
        })
    }

    fn required_len(&self) -> usize {
        self.name.max(self.url) + 1
    }
}

impl MetadataTable {
    pub fn new(
        source: impl Into<String>,
        name_column: impl Into<String>,
        records: Vec<RunRecord>,
    ) -> Result<Self, GeodlError> {
        let source = source.into();
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.key.as_str()) {
                return Err(GeodlError::DuplicateSampleName {
                    name: record.key.clone(),
                    source_name: source.clone(),
                });
            }
        }
        Ok(Self {
            source,
            name_column: name_column.into(),
            records,
        })
    }

    pub fn parse<R: Read>(reader: R, source: &str, columns: &Columns) -> Result<Self, GeodlError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(reader);

        let header = reader
            .headers()
            .map_err(|err| row_error(source, err))?
            .clone();
        let indexes = ColumnIndexes::from_header(&header, columns, source)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|err| row_error(source, err))?;
            let line = row.position().map(|pos| pos.line()).unwrap_or(0);
            let field = |index: usize| {
                row.get(index).ok_or_else(|| GeodlError::MalformedRow {
                    source_name: source.to_string(),
                    line,
                    expected: indexes.required_len(),
                    found: row.len(),
                })
            };
            let key = field(indexes.name)?.to_string();
            let urls = split_urls(field(indexes.url)?);
            let optional = |index: Option<usize>| {
                index
                    .and_then(|index| row.get(index))
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            };
            records.push(RunRecord {
                line,
                key,
                urls,
                run_accession: optional(indexes.run_accession),
                sample_title: optional(indexes.sample_title),
            });
        }

        Self::new(source, columns.name.clone(), records)
    }

    pub fn from_path(path: &Utf8Path, columns: &Columns) -> Result<Self, GeodlError> {
        let file = File::open(path)
            .map_err(|err| GeodlError::Filesystem(format!("open {path}: {err}")))?;
        let source = path.file_name().unwrap_or(path.as_str());
        Self::parse(file, source, columns)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name_column(&self) -> &str {
        &self.name_column
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decoding problems point at the offending line; only I/O errors are filesystem errors.
fn row_error(source: &str, err: csv::Error) -> GeodlError {
    match err.kind() {
        csv::ErrorKind::Io(_) => GeodlError::Filesystem(format!("read {source}: {err}")),
        _ => GeodlError::InvalidRow {
            source_name: source.to_string(),
            line: err.position().map(|pos| pos.line()).unwrap_or(0),
            message: err.to_string(),
        },
    }
}

pub fn split_urls(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn columns(name: &str) -> Columns {
        Columns {
            url: "fastq_ftp".to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn parse_single_and_paired_rows() {
        let text = "run_accession\tsample_alias\tfastq_ftp\n\
                    SRR1\tSampleA\tftp.sra.ebi.ac.uk/a.fastq.gz\n\
                    SRR2\tSampleB\tftp.sra.ebi.ac.uk/b_1.fastq.gz;ftp.sra.ebi.ac.uk/b_2.fastq.gz\n";
        let table =
            MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns("sample_alias")).unwrap();

        assert_eq!(table.len(), 2);
        let records = table.records();
        assert_eq!(records[0].key, "SampleA");
        assert_eq!(records[0].run_accession.as_deref(), Some("SRR1"));
        assert_eq!(records[0].layout().unwrap(), Layout::Single);
        assert_eq!(records[1].urls.len(), 2);
        assert_eq!(records[1].layout().unwrap(), Layout::Paired);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn missing_naming_column_is_reported_first() {
        let text = "sample\turls\nA\tftp://x\n";
        let err = MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns("sample_alias"))
            .unwrap_err();
        assert_matches!(err, GeodlError::MissingColumn { ref column, .. } if column == "sample_alias");
    }

    #[test]
    fn missing_url_column() {
        let text = "sample_alias\turls\nA\tftp://x\n";
        let err = MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns("sample_alias"))
            .unwrap_err();
        assert_matches!(err, GeodlError::MissingColumn { ref column, .. } if column == "fastq_ftp");
    }

    #[test]
    fn short_row_is_malformed() {
        let text = "sample_alias\tfastq_ftp\nA\n";
        let err = MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns("sample_alias"))
            .unwrap_err();
        assert_matches!(
            err,
            GeodlError::MalformedRow {
                line: 2,
                expected: 2,
                found: 1,
                ..
            }
        );
    }

    #[test]
    fn undecodable_row_points_at_its_line() {
        let text: &[u8] = b"sample_alias\tfastq_ftp\nSampleA\tftp://x/1\nSample\xffB\tftp://x/2\n";
        let err = MetadataTable::parse(text, "meta.tsv", &columns("sample_alias")).unwrap_err();
        assert_matches!(
            err,
            GeodlError::InvalidRow { line: 3, ref source_name, .. } if source_name == "meta.tsv"
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let text = "sample_alias\tfastq_ftp\nA\tftp://x/1\nB\tftp://x/2\nA\tftp://x/3\n";
        let err = MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns("sample_alias"))
            .unwrap_err();
        assert_matches!(
            err,
            GeodlError::DuplicateSampleName { ref name, ref source_name }
                if name == "A" && source_name == "meta.tsv"
        );
    }

    #[test]
    fn empty_url_segments_are_dropped() {
        assert_eq!(split_urls("a;;b;"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_urls("").is_empty());
    }
}
