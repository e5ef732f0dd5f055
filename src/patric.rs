use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::MapError;

const BASE_URL: &str = "https://www.bv-brc.org/api";

pub trait PatricClient: Send + Sync {
    /// Best-match genome document for a query, trying direct id lookup,
    /// exact-field queries, taxon id, then keyword search in that order.
    fn find_genome(&self, query: &str) -> Result<Option<Value>, MapError>;
}

#[derive(Clone)]
pub struct PatricHttpClient {
    client: Client,
}

impl PatricHttpClient {
    pub fn new() -> Result<Self, MapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("metaphenomap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MapError::PatricHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| MapError::PatricHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn get_json(&self, url: &str) -> Result<Value, MapError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| MapError::PatricHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "BV-BRC request failed".to_string());
            return Err(MapError::PatricStatus { status, message });
        }
        response.json().map_err(|err| MapError::PatricHttp(err.to_string()))
    }

    fn first_genome(rows: Value) -> Option<Value> {
        match rows {
            Value::Array(items) => items.into_iter().next(),
            Value::Object(_) if rows.get("genome_id").is_some() => Some(rows),
            _ => None,
        }
    }
}

impl PatricClient for PatricHttpClient {
    fn find_genome(&self, query: &str) -> Result<Option<Value>, MapError> {
        // Direct genome-id lookup first.
        let direct = format!("{BASE_URL}/genome/{query}?http_accept=application/json");
        if let Ok(doc) = self.get_json(&direct) {
            if doc.get("genome_id").is_some() {
                return Ok(Some(doc));
            }
        }

        for field in ["genome_id", "refseq_accession", "genbank_accession", "organism_name"] {
            let url = format!(
                "{BASE_URL}/genome/?eq({field},{query})&limit(1)&http_accept=application/json"
            );
            match self.get_json(&url) {
                Ok(rows) => {
                    if let Some(doc) = Self::first_genome(rows) {
                        return Ok(Some(doc));
                    }
                }
                Err(_) => continue,
            }
        }

        if query.chars().all(|ch| ch.is_ascii_digit()) && !query.is_empty() {
            let url = format!(
                "{BASE_URL}/genome/?eq(taxon_id,{query})&sort(+genome_length)&limit(1)&http_accept=application/json"
            );
            if let Ok(rows) = self.get_json(&url) {
                if let Some(doc) = Self::first_genome(rows) {
                    return Ok(Some(doc));
                }
            }
        }

        let url = format!(
            "{BASE_URL}/genome/?keyword({query})&sort(+genome_length)&limit(1)&http_accept=application/json"
        );
        if let Ok(rows) = self.get_json(&url) {
            if let Some(doc) = Self::first_genome(rows) {
                return Ok(Some(doc));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_genome_from_array() {
        let rows = json!([{"genome_id": "83332.12"}, {"genome_id": "other"}]);
        let doc = PatricHttpClient::first_genome(rows).unwrap();
        assert_eq!(doc["genome_id"], "83332.12");
    }

    #[test]
    fn first_genome_from_bare_object() {
        let doc = PatricHttpClient::first_genome(json!({"genome_id": "83332.12"})).unwrap();
        assert_eq!(doc["genome_id"], "83332.12");
        assert_eq!(PatricHttpClient::first_genome(json!({"other": 1})), None);
        assert_eq!(PatricHttpClient::first_genome(json!([])), None);
    }
}
