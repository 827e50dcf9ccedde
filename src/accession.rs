use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::catalog::CatalogClient;
use crate::error::GeodlError;
use crate::metadata::{MetadataTable, RunRecord};

/// Run/sample identifier to display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessionMap {
    Explicit(BTreeMap<String, String>),
    /// Every key is its own display name (ena and meta modes).
    Identity,
}

impl AccessionMap {
    pub fn explicit<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        AccessionMap::Explicit(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn resolve<'a>(&'a self, key: &'a str) -> Result<&'a str, GeodlError> {
        match self {
            AccessionMap::Identity => Ok(key),
            AccessionMap::Explicit(map) => map
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| GeodlError::UnmappedAccession(key.to_string())),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            AccessionMap::Identity => None,
            AccessionMap::Explicit(map) => Some(map.len()),
        }
    }
}

/// Trims the display name and makes it a single file stem inside the output
/// directory: whitespace, path separators and a leading `.` become `_`.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .enumerate()
        .map(|(idx, ch)| match ch {
            '/' | '\\' => '_',
            '.' if idx == 0 => '_',
            ch if ch.is_whitespace() => '_',
            ch => ch,
        })
        .collect()
}

/// `(gsm_id, title)` rows of the "Samples (N)" table of a GEO series page.
pub fn parse_geo_samples(html: &str) -> Result<Vec<(String, String)>, GeodlError> {
    let heading = Regex::new(r"Samples\s*\((\d+)\)").unwrap();
    let found = heading
        .captures(html)
        .ok_or_else(|| GeodlError::parse("GEO", "no \"Samples (N)\" heading on the page"))?;
    let announced: usize = found[1].parse().unwrap_or(0);
    let start = found.get(0).map(|m| m.end()).unwrap_or(0);

    let row = Regex::new(r"(?is)<tr[^>]*>\s*<td[^>]*>(.*?)</td>\s*<td[^>]*>(.*?)</td>").unwrap();
    let gsm = Regex::new(r"^GSM\d+$").unwrap();
    let mut samples = Vec::new();
    for cap in row.captures_iter(&html[start..]) {
        let id = html_text(&cap[1]);
        if !gsm.is_match(&id) {
            if samples.is_empty() {
                continue;
            }
            break;
        }
        samples.push((id, html_text(&cap[2])));
    }

    if samples.is_empty() {
        return Err(GeodlError::parse("GEO", "sample table is empty or missing"));
    }
    if announced != samples.len() {
        tracing::warn!(
            announced,
            parsed = samples.len(),
            "GEO sample count differs from the page heading"
        );
    }
    Ok(samples)
}

/// Values of the `<secondary_id>` elements of an ENA study search.
pub fn parse_secondary_ids(xml: &str) -> Vec<String> {
    let re = Regex::new(r"(?is)<secondary_id>\s*([^<]*?)\s*</secondary_id>").unwrap();
    re.captures_iter(xml)
        .map(|cap| cap[1].to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// The ENA study linked from a GEO series, which must be unique.
pub fn resolve_ena_study(xml: &str, geo_accession: &str) -> Result<String, GeodlError> {
    let mut ids = parse_secondary_ids(xml);
    if ids.len() != 1 {
        return Err(GeodlError::AmbiguousAccession {
            accession: geo_accession.to_string(),
            found: ids.len(),
        });
    }
    Ok(ids.remove(0))
}

/// First BioProject accession linked from a GEO page.
pub fn parse_project_link(html: &str) -> Result<String, GeodlError> {
    let link = Regex::new(r#"(?is)<a\b([^>]*)>(.*?)</a>"#).unwrap();
    let project = Regex::new(r"PRJ[A-Z]{1,2}\d+").unwrap();
    for cap in link.captures_iter(html) {
        let attrs = &cap[1];
        let text = &cap[2];
        if !attrs.contains("PRJ") && !text.contains("PRJ") {
            continue;
        }
        if let Some(found) = project.find(text).or_else(|| project.find(attrs)) {
            return Ok(found.as_str().to_string());
        }
    }
    Err(GeodlError::parse("GEO", "no BioProject link on the page"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRun {
    pub accession: String,
    pub alias: String,
    pub sample_title: String,
}

/// Runs listed in an SRA `EXPERIMENT_PACKAGE_SET`, checked against the searched ids.
pub fn parse_archive_runs(xml: &str, expected: usize) -> Result<Vec<ArchiveRun>, GeodlError> {
    let run_sets = Regex::new(r"<RUN_SET\b").unwrap().find_iter(xml).count();
    if run_sets != expected {
        return Err(GeodlError::InconsistentResultCount {
            expected,
            found: run_sets,
        });
    }

    let package = Regex::new(r"(?s)<EXPERIMENT_PACKAGE>(.*?)</EXPERIMENT_PACKAGE>").unwrap();
    let title = Regex::new(r"(?s)<SAMPLE\b[^>]*>.*?<TITLE>(.*?)</TITLE>").unwrap();
    let run = Regex::new(r"<RUN\b([^>]*)>").unwrap();

    let mut runs = Vec::new();
    for pkg in package.captures_iter(xml) {
        let body = &pkg[1];
        let sample_title = title
            .captures(body)
            .map(|cap| html_text(&cap[1]))
            .ok_or_else(|| GeodlError::parse("SRA", "experiment package without sample title"))?;
        for cap in run.captures_iter(body) {
            let attrs = &cap[1];
            let accession = xml_attr(attrs, "accession")
                .ok_or_else(|| GeodlError::parse("SRA", "run without accession"))?;
            runs.push(ArchiveRun {
                alias: xml_attr(attrs, "alias").unwrap_or_else(|| accession.clone()),
                accession,
                sample_title: sample_title.clone(),
            });
        }
    }
    if runs.is_empty() {
        return Err(GeodlError::parse("SRA", "no runs in archive records"));
    }
    Ok(runs)
}

/// Display names keyed by run accession; shared sample titles get a replicate suffix.
pub fn archive_run_names(runs: &[ArchiveRun]) -> BTreeMap<String, String> {
    let mut per_title: HashMap<&str, usize> = HashMap::new();
    for run in runs {
        *per_title.entry(run.sample_title.as_str()).or_default() += 1;
    }
    runs.iter()
        .map(|run| {
            let name = if per_title[run.sample_title.as_str()] > 1 {
                let suffix = run
                    .alias
                    .split_once('_')
                    .map(|(_, rest)| rest)
                    .unwrap_or(run.alias.as_str());
                format!("{}_{}", run.sample_title, suffix)
            } else {
                run.sample_title.clone()
            };
            (run.accession.clone(), name)
        })
        .collect()
}

pub fn geo_sample_map<C: CatalogClient + ?Sized>(
    catalog: &C,
    geo_accession: &str,
) -> Result<AccessionMap, GeodlError> {
    let html = catalog.fetch_geo_page(geo_accession)?;
    let samples = parse_geo_samples(&html)?;
    tracing::info!(samples = samples.len(), "found samples on GEO page");
    Ok(AccessionMap::explicit(samples))
}

/// Two-step SRA resolution of a GEO series into one record per run.
pub fn prefetch_catalog<C: CatalogClient + ?Sized>(
    catalog: &C,
    geo_accession: &str,
) -> Result<(MetadataTable, AccessionMap), GeodlError> {
    let html = catalog.fetch_geo_page(geo_accession)?;
    let project = parse_project_link(&html)?;
    tracing::info!(%project, "GEO series links to BioProject");

    let ids = catalog.search_sequence_archive(&project)?;
    if ids.is_empty() {
        return Err(GeodlError::parse(
            "SRA",
            format!("no sequence archive entries for {project}"),
        ));
    }
    let xml = catalog.fetch_sequence_archive_records(&ids)?;
    let runs = parse_archive_runs(&xml, ids.len())?;
    let names = archive_run_names(&runs);

    let records = runs
        .iter()
        .enumerate()
        .map(|(idx, run)| RunRecord {
            line: idx as u64 + 1,
            key: run.accession.clone(),
            urls: Vec::new(),
            run_accession: Some(run.accession.clone()),
            sample_title: Some(run.sample_title.clone()),
        })
        .collect();
    let table = MetadataTable::new(project, "run_accession", records)?;
    Ok((table, AccessionMap::Explicit(names)))
}

fn xml_attr(attrs: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"\b{}="([^"]*)""#, regex::escape(name))).ok()?;
    re.captures(attrs).map(|cap| html_text(&cap[1]))
}

fn html_text(fragment: &str) -> String {
    let tags = Regex::new(r"(?s)<[^>]*>").unwrap();
    let text = tags.replace_all(fragment, "");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    decoded.trim().to_string()
}
