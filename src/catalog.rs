use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::GeodlError;

const GEO_QUERY_BASE: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi";
const ENA_SEARCH_BASE: &str = "https://www.ebi.ac.uk/ena/data/warehouse/search";
const ENA_FILEREPORT_BASE: &str = "https://www.ebi.ac.uk/ena/portal/api/filereport";
const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const ESEARCH_RETMAX: &str = "10000";

/// Read-only access to the remote catalogs.
pub trait CatalogClient {
    fn fetch_geo_page(&self, accession: &str) -> Result<String, GeodlError>;
    fn fetch_ena_study_search(&self, geo_accession: &str) -> Result<String, GeodlError>;
    fn fetch_ena_file_report(
        &self,
        ena_accession: &str,
        fields: &[&str],
    ) -> Result<String, GeodlError>;
    fn search_sequence_archive(&self, term: &str) -> Result<Vec<String>, GeodlError>;
    fn fetch_sequence_archive_records(&self, ids: &[String]) -> Result<String, GeodlError>;
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
}

impl CatalogHttpClient {
    pub fn new() -> Result<Self, GeodlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("geodl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GeodlError::unreachable("http", err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GeodlError::unreachable("http", err.to_string()))?;
        Ok(Self { client })
    }

    pub fn geo_page_url(accession: &str) -> String {
        build_query_url(GEO_QUERY_BASE, &[("acc", accession)])
    }

    pub fn ena_study_search_url(geo_accession: &str) -> String {
        let query = format!("\"geo_accession=\"{geo_accession}\"\"");
        build_query_url(
            ENA_SEARCH_BASE,
            &[
                ("query", query.as_str()),
                ("result", "study"),
                ("display", "xml"),
            ],
        )
    }

    pub fn ena_file_report_url(ena_accession: &str, fields: &[&str]) -> String {
        let fields = fields.join(",");
        build_query_url(
            ENA_FILEREPORT_BASE,
            &[
                ("accession", ena_accession),
                ("result", "read_run"),
                ("fields", fields.as_str()),
                ("format", "tsv"),
                ("download", "false"),
            ],
        )
    }

    fn send(&self, catalog: &str, url: &str) -> Result<Response, GeodlError> {
        tracing::debug!(catalog, url, "catalog request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GeodlError::unreachable(catalog, err.to_string()))?;
        if !response.status().is_success() {
            return Err(GeodlError::unreachable(
                catalog,
                format!("returned status {}", response.status().as_u16()),
            ));
        }
        Ok(response)
    }

    fn get_text(&self, catalog: &str, url: &str) -> Result<String, GeodlError> {
        self.send(catalog, url)?
            .text()
            .map_err(|err| GeodlError::unreachable(catalog, err.to_string()))
    }
}

impl CatalogClient for CatalogHttpClient {
    fn fetch_geo_page(&self, accession: &str) -> Result<String, GeodlError> {
        self.get_text("GEO", &Self::geo_page_url(accession))
    }

    fn fetch_ena_study_search(&self, geo_accession: &str) -> Result<String, GeodlError> {
        self.get_text("ENA", &Self::ena_study_search_url(geo_accession))
    }

    fn fetch_ena_file_report(
        &self,
        ena_accession: &str,
        fields: &[&str],
    ) -> Result<String, GeodlError> {
        self.get_text("ENA", &Self::ena_file_report_url(ena_accession, fields))
    }

    fn search_sequence_archive(&self, term: &str) -> Result<Vec<String>, GeodlError> {
        let url = build_query_url(
            &format!("{EUTILS_BASE}/esearch.fcgi"),
            &[
                ("db", "sra"),
                ("term", term),
                ("retmax", ESEARCH_RETMAX),
                ("retmode", "json"),
            ],
        );
        let payload: Value = self
            .send("SRA", &url)?
            .json()
            .map_err(|err| GeodlError::parse("SRA", err.to_string()))?;
        parse_esearch_ids(&payload)
    }

    fn fetch_sequence_archive_records(&self, ids: &[String]) -> Result<String, GeodlError> {
        let id_list = ids.join(",");
        let url = build_query_url(
            &format!("{EUTILS_BASE}/efetch.fcgi"),
            &[("db", "sra"), ("id", id_list.as_str()), ("rettype", "full")],
        );
        self.get_text("SRA", &url)
    }
}

pub fn parse_esearch_ids(payload: &Value) -> Result<Vec<String>, GeodlError> {
    let list = payload["esearchresult"]["idlist"]
        .as_array()
        .ok_or_else(|| GeodlError::parse("SRA", "esearch response has no idlist"))?;
    Ok(list
        .iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect())
}

fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push('?');
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_urls_are_percent_encoded() {
        let url = CatalogHttpClient::ena_study_search_url("GSE13373");
        assert_eq!(
            url,
            "https://www.ebi.ac.uk/ena/data/warehouse/search?query=%22geo_accession%3D%22GSE13373%22%22&result=study&display=xml"
        );
    }

    #[test]
    fn file_report_url_lists_fields() {
        let url = CatalogHttpClient::ena_file_report_url("SRP000001", &["run_accession", "fastq_ftp"]);
        assert!(url.contains("accession=SRP000001"));
        assert!(url.contains("fields=run_accession%2Cfastq_ftp"));
        assert!(url.contains("result=read_run"));
    }

    #[test]
    fn esearch_ids_from_json() {
        let payload: Value = serde_json::from_str(
            r#"{"esearchresult": {"count": "2", "idlist": ["101", "102"]}}"#,
        )
        .unwrap();
        assert_eq!(parse_esearch_ids(&payload).unwrap(), vec!["101", "102"]);

        let empty: Value = serde_json::from_str(r#"{"error": "bad"}"#).unwrap();
        assert!(parse_esearch_ids(&empty).is_err());
    }
}
