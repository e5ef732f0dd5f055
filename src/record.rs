use crate::domain::{Accession, Archive, Module};

/// Canonical output schema shared by every archive. Archive-native field
/// names are mapped into these; unmapped names become additive extras.
pub const CANONICAL_FIELDS: [&str; 8] = [
    "Scientific_Name",
    "Host",
    "Isolation_Source",
    "Disease",
    "AMR_Genes",
    "Virulence_Genes",
    "Location",
    "Collection_Date",
];

/// Alias table for attribute-style documents (NCBI BioSample, ENA browser
/// XML). Matching is a case-insensitive substring check on the archive's
/// attribute name, first alias in priority order wins. Unanchored matching
/// can mis-map adversarially named attributes; accepted for the closed set
/// of supported archives.
const FIELD_ALIASES: [(&str, &[&str]); 7] = [
    (
        "Host",
        &[
            "host",
            "host organism",
            "organism_host",
            "host_species",
            "host taxid",
        ],
    ),
    (
        "Isolation_Source",
        &[
            "isolation_source",
            "isolation source",
            "source",
            "specimen",
            "sample_type",
            "body_site",
            "source_material",
        ],
    ),
    (
        "Disease",
        &[
            "disease",
            "host_disease",
            "disease state",
            "clinical_information",
            "condition",
        ],
    ),
    (
        "AMR_Genes",
        &[
            "amr",
            "antibiotic resistance",
            "resistance_genes",
            "antimicrobial resistance",
            "drug resistance",
        ],
    ),
    (
        "Virulence_Genes",
        &["virulence", "virulence_factor", "virulence gene", "toxin_gene"],
    ),
    (
        "Location",
        &[
            "geo_loc_name",
            "geographic location",
            "country",
            "region",
            "location",
        ],
    ),
    (
        "Collection_Date",
        &[
            "collection_date",
            "sampling_date",
            "isolation_date",
            "date_collected",
        ],
    ),
];

/// Maps an archive-native attribute name to its canonical field, or `None`
/// when the attribute has no canonical counterpart.
pub fn canonical_field(native_name: &str) -> Option<&'static str> {
    let lowered = native_name.to_lowercase();
    for (canon, aliases) in FIELD_ALIASES {
        for alias in aliases {
            if lowered.contains(alias) {
                return Some(canon);
            }
        }
    }
    None
}

/// One accession's merged, canonicalized metadata plus provenance.
///
/// Fields keep insertion order so the output schema is stable: the canonical
/// set is seeded null at creation and archive extras append after it.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    accession: Accession,
    pub archive: Archive,
    pub module: Module,
    pub fetched_at: String,
    pub error: Option<String>,
    pub downloads: Vec<String>,
    pub verification: Option<String>,
    pub archive_path: Option<String>,
    fields: Vec<(String, Option<String>)>,
}

impl MetadataRecord {
    pub fn new(accession: Accession, archive: Archive, module: Module) -> Self {
        let fields = CANONICAL_FIELDS
            .iter()
            .map(|name| (name.to_string(), None))
            .collect();
        Self {
            accession,
            archive,
            module,
            fetched_at: chrono::Utc::now().to_rfc3339(),
            error: None,
            downloads: Vec::new(),
            verification: None,
            archive_path: None,
            fields,
        }
    }

    pub fn accession(&self) -> &Accession {
        &self.accession
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Last-writer-wins assignment; used when merging one fetch result on
    /// top of another (assembly fields overwrite sample fields).
    pub fn set(&mut self, name: &str, value: Option<String>) {
        let value = value.filter(|v| !v.trim().is_empty());
        if let Some(slot) = self.fields.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }

    /// First non-empty value wins; used while scanning one document so a
    /// later alias match does not overwrite an already-filled field.
    pub fn set_if_empty(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot @ None)) => *slot = Some(value.to_string()),
            Some(_) => {}
            None => self.fields.push((name.to_string(), Some(value.to_string()))),
        }
    }

    /// Merges a fetch result into this record, overwriting shared keys.
    /// The accession itself is immutable post-creation.
    pub fn merge(&mut self, fetched: Vec<(String, Option<String>)>) {
        for (name, value) in fetched {
            if name == "Accession" {
                continue;
            }
            if value.is_some() {
                self.set(&name, value);
            } else if !self.fields.iter().any(|(key, _)| *key == name) {
                // Null fields still appear in the output schema.
                self.fields.push((name, None));
            }
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {message}"),
            None => message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MetadataRecord {
        MetadataRecord::new("SRR000001".parse().unwrap(), Archive::Sra, Module::Sample)
    }

    #[test]
    fn canonical_schema_seeded_null() {
        let rec = record();
        for name in CANONICAL_FIELDS {
            assert!(rec.field_names().any(|key| key == name));
            assert_eq!(rec.get(name), None);
        }
    }

    #[test]
    fn alias_matching_priority() {
        assert_eq!(canonical_field("host_taxid"), Some("Host"));
        assert_eq!(canonical_field("Isolation Source"), Some("Isolation_Source"));
        assert_eq!(canonical_field("geo_loc_name"), Some("Location"));
        assert_eq!(canonical_field("collection_date"), Some("Collection_Date"));
        assert_eq!(canonical_field("library_layout"), None);
    }

    #[test]
    fn set_if_empty_keeps_first_value() {
        let mut rec = record();
        rec.set_if_empty("Host", "Homo sapiens");
        rec.set_if_empty("Host", "Mus musculus");
        assert_eq!(rec.get("Host"), Some("Homo sapiens"));
    }

    #[test]
    fn merge_is_last_writer_wins() {
        let mut rec = record();
        rec.merge(vec![("Host".to_string(), Some("sample host".to_string()))]);
        rec.merge(vec![("Host".to_string(), Some("assembly host".to_string()))]);
        assert_eq!(rec.get("Host"), Some("assembly host"));
    }

    #[test]
    fn merge_never_overwrites_accession() {
        let mut rec = record();
        rec.merge(vec![("Accession".to_string(), Some("other".to_string()))]);
        assert_eq!(rec.accession().as_str(), "SRR000001");
    }

    #[test]
    fn merge_keeps_null_extras_in_schema() {
        let mut rec = record();
        rec.merge(vec![("Platform".to_string(), None)]);
        assert!(rec.field_names().any(|key| key == "Platform"));
        assert_eq!(rec.get("Platform"), None);
    }

    #[test]
    fn mark_error_appends() {
        let mut rec = record();
        rec.mark_error("first");
        rec.mark_error("second");
        assert_eq!(rec.error.as_deref(), Some("first; second"));
    }
}
