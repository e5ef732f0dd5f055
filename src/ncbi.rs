use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::error::MapError;

const EUTILS: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Assembly document fields kept from an esummary response.
#[derive(Debug, Clone, Default)]
pub struct AssemblySummary {
    pub assembly_accession: Option<String>,
    pub organism: Option<String>,
    pub assembly_level: Option<String>,
    pub submitter: Option<String>,
    pub submission_date: Option<String>,
    pub biosample: Option<String>,
    pub ftp_path_genbank: Option<String>,
    pub ftp_path_refseq: Option<String>,
}

pub trait NcbiClient: Send + Sync {
    /// BioSample attribute tag/value pairs via efetch.
    fn biosample_attributes(&self, accession: &str) -> Result<Vec<(String, String)>, MapError>;

    /// Assembly UIDs matching a term via esearch.
    fn search_assembly(&self, term: &str) -> Result<Vec<String>, MapError>;

    /// Cross-reference UIDs via elink; an empty list is "no links", not an
    /// error.
    fn link(&self, dbfrom: &str, db: &str, id: &str) -> Result<Vec<String>, MapError>;

    /// One assembly document via esummary.
    fn assembly_summary(&self, uid: &str) -> Result<Option<AssemblySummary>, MapError>;

    /// Run accessions named by an SRA esummary document.
    fn sra_runs(&self, uid: &str) -> Result<Vec<String>, MapError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, MapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("metaphenomap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MapError::NcbiHttp(err.to_string()))?,
        );
        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| MapError::NcbiHttp(err.to_string()))?,
                );
            }
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| MapError::NcbiHttp(err.to_string()))?;
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
                    return Err(MapError::NcbiHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, MapError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(MapError::NcbiStatus { status, message })
    }

    fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, MapError> {
        let url = format!("{EUTILS}/{endpoint}");
        let response = self.send_with_retries(|| self.client.get(&url).query(params))?;
        let response = Self::handle_status(response)?;
        response.json().map_err(|err| MapError::NcbiHttp(err.to_string()))
    }
}

impl NcbiClient for NcbiHttpClient {
    fn biosample_attributes(&self, accession: &str) -> Result<Vec<(String, String)>, MapError> {
        let url = format!("{EUTILS}/efetch.fcgi");
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("db", "biosample"),
                ("id", accession),
                ("retmode", "xml"),
            ])
        })?;
        let response = Self::handle_status(response)?;
        let xml = response
            .text()
            .map_err(|err| MapError::NcbiHttp(err.to_string()))?;
        parse_biosample_xml(&xml)
    }

    fn search_assembly(&self, term: &str) -> Result<Vec<String>, MapError> {
        let js = self.get_json(
            "esearch.fcgi",
            &[("db", "assembly"), ("term", term), ("retmode", "json")],
        )?;
        let ids = js
            .get("esearchresult")
            .and_then(|v| v.get("idlist"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(id_string).collect())
            .unwrap_or_default();
        Ok(ids)
    }

    fn link(&self, dbfrom: &str, db: &str, id: &str) -> Result<Vec<String>, MapError> {
        let js = self.get_json(
            "elink.fcgi",
            &[("dbfrom", dbfrom), ("db", db), ("id", id), ("retmode", "json")],
        )?;
        let mut links = Vec::new();
        if let Some(linksets) = js.get("linksets").and_then(|v| v.as_array()) {
            for linkset in linksets {
                if let Some(dbs) = linkset.get("linksetdbs").and_then(|v| v.as_array()) {
                    for linkdb in dbs {
                        if let Some(ids) = linkdb.get("links").and_then(|v| v.as_array()) {
                            links.extend(ids.iter().filter_map(id_string));
                        }
                    }
                }
            }
        }
        Ok(links)
    }

    fn assembly_summary(&self, uid: &str) -> Result<Option<AssemblySummary>, MapError> {
        let js = self.get_json(
            "esummary.fcgi",
            &[("db", "assembly"), ("id", uid), ("retmode", "json")],
        )?;
        let Some(doc) = js.get("result").and_then(|v| v.get(uid)) else {
            return Ok(None);
        };
        Ok(Some(AssemblySummary {
            assembly_accession: json_str(doc, "assemblyaccession"),
            organism: json_str(doc, "organism"),
            assembly_level: json_str(doc, "assemblystatus"),
            submitter: json_str(doc, "submitter"),
            submission_date: json_str(doc, "submissiondate"),
            biosample: json_str(doc, "biosample"),
            ftp_path_genbank: json_str(doc, "ftppath_genbank"),
            ftp_path_refseq: json_str(doc, "ftppath_refseq"),
        }))
    }

    fn sra_runs(&self, uid: &str) -> Result<Vec<String>, MapError> {
        let js = self.get_json(
            "esummary.fcgi",
            &[("db", "sra"), ("id", uid), ("retmode", "json")],
        )?;
        let runs = js
            .get("result")
            .and_then(|v| v.get(uid))
            .and_then(|doc| doc.get("runs"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(extract_run_accessions(runs))
    }
}

/// Pulls run accessions out of an SRA summary's `runs` blob, which arrives
/// as escaped Run elements rather than a clean list.
pub fn extract_run_accessions(runs: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[SED]RR\d+").expect("static pattern"));
    let mut out: Vec<String> = re.find_iter(runs).map(|m| m.as_str().to_string()).collect();
    out.dedup();
    out
}

#[derive(Debug, Deserialize)]
struct BioSampleSet {
    #[serde(rename = "BioSample", default)]
    samples: Vec<BioSampleXml>,
}

#[derive(Debug, Deserialize)]
struct BioSampleXml {
    #[serde(rename = "Attributes")]
    attributes: Option<BioSampleAttributes>,
}

#[derive(Debug, Deserialize)]
struct BioSampleAttributes {
    #[serde(rename = "Attribute", default)]
    attributes: Vec<BioSampleAttribute>,
}

#[derive(Debug, Deserialize)]
struct BioSampleAttribute {
    #[serde(rename = "@attribute_name")]
    name: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// Attribute tag/value pairs from an efetch BioSample document, in document
/// order, empty values dropped.
pub fn parse_biosample_xml(xml: &str) -> Result<Vec<(String, String)>, MapError> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let set: BioSampleSet =
        quick_xml::de::from_str(xml).map_err(|err| MapError::MalformedResponse {
            archive: "ncbi".to_string(),
            message: err.to_string(),
        })?;
    let mut out = Vec::new();
    for sample in set.samples {
        for attr in sample.attributes.map(|a| a.attributes).unwrap_or_default() {
            let name = attr.name.unwrap_or_default();
            let value = attr.value.unwrap_or_default().trim().to_string();
            if !name.is_empty() && !value.is_empty() {
                out.push((name, value));
            }
        }
    }
    Ok(out)
}

fn json_str(doc: &Value, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn id_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::to_string)
        .or_else(|| value.as_u64().map(|v| v.to_string()))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
