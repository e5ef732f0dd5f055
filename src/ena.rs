use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::error::MapError;

pub const PORTAL_SEARCH: &str = "https://www.ebi.ac.uk/ena/portal/api/search";
pub const BROWSER_XML: &str = "https://www.ebi.ac.uk/ena/browser/api/xml/";
pub const FILEREPORT: &str = "https://www.ebi.ac.uk/ena/portal/api/filereport";

/// Portal fields requested for sample-level metadata.
pub const SAMPLE_FIELDS: &str = "sample_accession,scientific_name,tax_id,host,host_tax_id,sex,age,isolation_source,country,geographic_location,collection_date,description,broker_name,center_name";

/// Filereport fields for run-level metadata (SRA module).
pub const READ_RUN_FIELDS: &str = "run_accession,study_accession,sample_accession,experiment_accession,library_source,library_strategy,instrument_platform,instrument_model,collection_date,country,host,scientific_name";

/// Filereport fields carrying run file locations, HTTP before FTP.
pub const FASTQ_URL_FIELDS: &str = "run_accession,fastq_ftp,fastq_http,submitted_ftp,submitted_http";

/// Filereport fields carrying archive-reported checksums.
pub const RUN_MD5_FIELDS: &str = "run_accession,fastq_ftp,fastq_md5,submitted_ftp,submitted_md5";

/// Analysis filereport fields for ENA-hosted assembly metadata.
pub const ANALYSIS_FIELDS: &str = "analysis_accession,study_accession,sample_accession,first_public,scientific_name,description,study_title";

/// Analysis filereport fields carrying submitted file locations.
pub const ANALYSIS_URL_FIELDS: &str = "analysis_accession,submitted_http,submitted_ftp";

pub type TsvRow = HashMap<String, String>;

/// Sample attributes recovered from the ENA browser XML fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserSample {
    pub scientific_name: Option<String>,
    pub host: Option<String>,
    pub isolation_source: Option<String>,
    pub country: Option<String>,
    pub collection_date: Option<String>,
}

pub trait EnaClient: Send + Sync {
    /// Portal search for one sample row; `Ok(None)` when the archive has no
    /// row for the accession.
    fn sample_search(&self, accession: &str) -> Result<Option<TsvRow>, MapError>;

    /// Browser XML fallback for sample attributes.
    fn sample_browser(&self, accession: &str) -> Result<Option<BrowserSample>, MapError>;

    /// Filereport fallback for sample metadata.
    fn sample_filereport(&self, accession: &str) -> Result<Option<TsvRow>, MapError>;

    /// First filereport row for a run accession with the given field list.
    fn read_run_report(&self, run: &str, fields: &str) -> Result<Option<TsvRow>, MapError>;

    /// Run accessions belonging to a sample, via portal search.
    fn runs_for_sample(&self, accession: &str) -> Result<Vec<String>, MapError>;

    /// All analysis filereport rows for an accession.
    fn analysis_report(&self, accession: &str, fields: &str) -> Result<Vec<TsvRow>, MapError>;
}

#[derive(Clone)]
pub struct EnaHttpClient {
    client: Client,
}

impl EnaHttpClient {
    pub fn new() -> Result<Self, MapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("metaphenomap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MapError::EnaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| MapError::EnaHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, MapError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(MapError::EnaHttp(err.to_string()));
                }
            }
        }
    }

    fn get_text(&self, url: &str, params: &[(&str, &str)]) -> Result<String, MapError> {
        let response = self.send_with_retries(|| self.client.get(url).query(params))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(MapError::EnaStatus { status, message });
        }
        response.text().map_err(|err| MapError::EnaHttp(err.to_string()))
    }
}

impl EnaClient for EnaHttpClient {
    fn sample_search(&self, accession: &str) -> Result<Option<TsvRow>, MapError> {
        let query = format!("sample_accession={accession}");
        let text = self.get_text(
            PORTAL_SEARCH,
            &[
                ("result", "sample"),
                ("query", &query),
                ("fields", SAMPLE_FIELDS),
                ("format", "tsv"),
            ],
        )?;
        Ok(parse_tsv(&text).into_iter().next())
    }

    fn sample_browser(&self, accession: &str) -> Result<Option<BrowserSample>, MapError> {
        let url = format!("{BROWSER_XML}{accession}");
        let text = self.get_text(&url, &[])?;
        parse_sample_xml(&text)
    }

    fn sample_filereport(&self, accession: &str) -> Result<Option<TsvRow>, MapError> {
        let text = self.get_text(
            FILEREPORT,
            &[
                ("accession", accession),
                ("result", "sample"),
                ("fields", SAMPLE_FIELDS),
                ("format", "tsv"),
            ],
        )?;
        Ok(parse_tsv(&text).into_iter().next())
    }

    fn read_run_report(&self, run: &str, fields: &str) -> Result<Option<TsvRow>, MapError> {
        let text = self.get_text(
            FILEREPORT,
            &[
                ("accession", run),
                ("result", "read_run"),
                ("fields", fields),
                ("format", "tsv"),
            ],
        )?;
        Ok(parse_tsv(&text).into_iter().next())
    }

    fn runs_for_sample(&self, accession: &str) -> Result<Vec<String>, MapError> {
        let query = format!("sample_accession={accession}");
        let text = self.get_text(
            PORTAL_SEARCH,
            &[
                ("result", "read_run"),
                ("query", &query),
                ("fields", "run_accession"),
                ("format", "tsv"),
            ],
        )?;
        Ok(parse_tsv(&text)
            .into_iter()
            .filter_map(|row| row.get("run_accession").cloned())
            .filter(|run| !run.is_empty())
            .collect())
    }

    fn analysis_report(&self, accession: &str, fields: &str) -> Result<Vec<TsvRow>, MapError> {
        let text = self.get_text(
            FILEREPORT,
            &[
                ("accession", accession),
                ("result", "analysis"),
                ("fields", fields),
                ("format", "tsv"),
            ],
        )?;
        Ok(parse_tsv(&text))
    }
}

/// Parses a tab-separated response with header row into keyed rows.
/// An empty body or a header-only body yields no rows.
pub fn parse_tsv(text: &str) -> Vec<TsvRow> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let keys: Vec<&str> = header.split('\t').collect();
    lines
        .map(|line| {
            keys.iter()
                .zip(line.split('\t'))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SampleSet {
    #[serde(rename = "SAMPLE", default)]
    samples: Vec<SampleXml>,
}

#[derive(Debug, Deserialize)]
struct SampleXml {
    #[serde(rename = "SAMPLE_NAME")]
    name: Option<SampleName>,
    #[serde(rename = "SAMPLE_ATTRIBUTES")]
    attributes: Option<SampleAttributes>,
}

#[derive(Debug, Deserialize)]
struct SampleName {
    #[serde(rename = "SCIENTIFIC_NAME")]
    scientific_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SampleAttributes {
    #[serde(rename = "SAMPLE_ATTRIBUTE", default)]
    attributes: Vec<SampleAttribute>,
}

#[derive(Debug, Deserialize)]
struct SampleAttribute {
    #[serde(rename = "TAG")]
    tag: Option<String>,
    #[serde(rename = "VALUE")]
    value: Option<String>,
}

/// Extracts the canonical-adjacent attributes from an ENA sample XML
/// document. First matching attribute per slot wins.
pub fn parse_sample_xml(xml: &str) -> Result<Option<BrowserSample>, MapError> {
    if xml.trim().is_empty() {
        return Ok(None);
    }
    let set: SampleSet =
        quick_xml::de::from_str(xml).map_err(|err| MapError::MalformedResponse {
            archive: "ena".to_string(),
            message: err.to_string(),
        })?;
    let Some(sample) = set.samples.into_iter().next() else {
        return Ok(None);
    };

    let mut out = BrowserSample {
        scientific_name: sample.name.and_then(|name| name.scientific_name),
        ..BrowserSample::default()
    };
    for attr in sample.attributes.map(|a| a.attributes).unwrap_or_default() {
        let tag = attr.tag.unwrap_or_default().trim().to_lowercase();
        let value = attr.value.unwrap_or_default().trim().to_string();
        if value.is_empty() {
            continue;
        }
        if tag.contains("host") && !tag.contains("host_tax") {
            out.host.get_or_insert(value);
        } else if tag.contains("isolation") || tag.contains("source") {
            out.isolation_source.get_or_insert(value);
        } else if tag.contains("country") || tag.contains("geo") || tag.contains("location") {
            out.country.get_or_insert(value);
        } else if tag.contains("collection") || tag.contains("date") {
            out.collection_date.get_or_insert(value);
        }
    }

    if out == BrowserSample::default() {
        return Ok(None);
    }
    Ok(Some(out))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tsv_header_and_rows() {
        let text = "run_accession\thost\nSRR000001\tHomo sapiens\nSRR000002\t\n";
        let rows = parse_tsv(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["run_accession"], "SRR000001");
        assert_eq!(rows[0]["host"], "Homo sapiens");
        assert_eq!(rows[1]["host"], "");
    }

    #[test]
    fn parse_tsv_header_only_is_empty() {
        assert!(parse_tsv("run_accession\thost\n").is_empty());
        assert!(parse_tsv("").is_empty());
    }

    #[test]
    fn parse_sample_xml_attributes() {
        let xml = r#"
        <SAMPLE_SET>
          <SAMPLE accession="SAMEA2620084">
            <SAMPLE_NAME>
              <SCIENTIFIC_NAME>Escherichia coli</SCIENTIFIC_NAME>
            </SAMPLE_NAME>
            <SAMPLE_ATTRIBUTES>
              <SAMPLE_ATTRIBUTE>
                <TAG>host scientific name</TAG>
                <VALUE>Homo sapiens</VALUE>
              </SAMPLE_ATTRIBUTE>
              <SAMPLE_ATTRIBUTE>
                <TAG>geographic location (country)</TAG>
                <VALUE>United Kingdom</VALUE>
              </SAMPLE_ATTRIBUTE>
              <SAMPLE_ATTRIBUTE>
                <TAG>collection date</TAG>
                <VALUE>2014-03-01</VALUE>
              </SAMPLE_ATTRIBUTE>
            </SAMPLE_ATTRIBUTES>
          </SAMPLE>
        </SAMPLE_SET>"#;
        let sample = parse_sample_xml(xml).unwrap().unwrap();
        assert_eq!(sample.scientific_name.as_deref(), Some("Escherichia coli"));
        assert_eq!(sample.host.as_deref(), Some("Homo sapiens"));
        assert_eq!(sample.country.as_deref(), Some("United Kingdom"));
        assert_eq!(sample.collection_date.as_deref(), Some("2014-03-01"));
        assert_eq!(sample.isolation_source, None);
    }

    #[test]
    fn parse_sample_xml_first_match_wins() {
        let xml = r#"
        <SAMPLE_SET>
          <SAMPLE>
            <SAMPLE_ATTRIBUTES>
              <SAMPLE_ATTRIBUTE><TAG>host</TAG><VALUE>first</VALUE></SAMPLE_ATTRIBUTE>
              <SAMPLE_ATTRIBUTE><TAG>host organism</TAG><VALUE>second</VALUE></SAMPLE_ATTRIBUTE>
              <SAMPLE_ATTRIBUTE><TAG>host_tax_id</TAG><VALUE>9606</VALUE></SAMPLE_ATTRIBUTE>
            </SAMPLE_ATTRIBUTES>
          </SAMPLE>
        </SAMPLE_SET>"#;
        let sample = parse_sample_xml(xml).unwrap().unwrap();
        assert_eq!(sample.host.as_deref(), Some("first"));
    }

    #[test]
    fn parse_sample_xml_empty_document() {
        assert_eq!(parse_sample_xml("").unwrap(), None);
        assert_eq!(
            parse_sample_xml("<SAMPLE_SET></SAMPLE_SET>").unwrap(),
            None
        );
    }
}
