use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::MapError;

const BASE_URL: &str = "https://www.ebi.ac.uk/biosamples/samples";

pub trait BioSamplesClient: Send + Sync {
    /// The `characteristics` object of a BioSamples document, or `None`
    /// when the archive has no record for the accession.
    fn characteristics(&self, accession: &str) -> Result<Option<Value>, MapError>;
}

#[derive(Clone)]
pub struct BioSamplesHttpClient {
    client: Client,
}

impl BioSamplesHttpClient {
    pub fn new() -> Result<Self, MapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("metaphenomap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MapError::BioSamplesHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|err| MapError::BioSamplesHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl BioSamplesClient for BioSamplesHttpClient {
    fn characteristics(&self, accession: &str) -> Result<Option<Value>, MapError> {
        let url = format!("{BASE_URL}/{accession}");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| MapError::BioSamplesHttp(err.to_string()))?;
        // A missing sample is an expected outcome, not a failure.
        if !response.status().is_success() {
            return Ok(None);
        }
        let js: Value = response
            .json()
            .map_err(|err| MapError::BioSamplesHttp(err.to_string()))?;
        Ok(js.get("characteristics").cloned())
    }
}

/// First `text` value found under any of the given characteristic keys.
/// BioSamples serializes a characteristic as a list of `{text, ...}`
/// objects; a bare object is tolerated too.
pub fn pick_characteristic(characteristics: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(value) = characteristics.get(key) else {
            continue;
        };
        let text = match value {
            Value::Array(items) => items.first().and_then(|v| v.get("text")),
            Value::Object(_) => value.get("text"),
            _ => None,
        };
        if let Some(text) = text.and_then(|v| v.as_str()) {
            if !text.trim().is_empty() {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pick_prefers_first_key_with_text() {
        let ch = json!({
            "host": [{"text": "Homo sapiens", "tag": "attribute"}],
            "host organism": [{"text": "ignored"}],
        });
        assert_eq!(
            pick_characteristic(&ch, &["host", "host organism"]),
            Some("Homo sapiens".to_string())
        );
    }

    #[test]
    fn pick_falls_through_missing_keys() {
        let ch = json!({
            "geographic location": {"text": "Peru"},
        });
        assert_eq!(
            pick_characteristic(&ch, &["geo_loc_name", "geographic location"]),
            Some("Peru".to_string())
        );
        assert_eq!(pick_characteristic(&ch, &["collection date"]), None);
    }
}
