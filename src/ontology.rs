use crate::record::MetadataRecord;

/// Light ontology normalization of the isolation source: the two
/// curated terms get a normalized label and an OBO IRI alongside the
/// original value.
pub fn normalize_fields(record: &mut MetadataRecord) {
    let Some(source) = record.get("Isolation_Source").map(str::to_lowercase) else {
        return;
    };
    if source.contains("feces") || source.contains("stool") {
        record.set("Isolation_Source_normalized", Some("feces".to_string()));
        record.set(
            "Isolation_Source_IRI",
            Some("http://purl.obolibrary.org/obo/ENVO_02000044".to_string()),
        );
    } else if source.contains("shoot apical meristem") {
        record.set(
            "Isolation_Source_normalized",
            Some("shoot apical meristem".to_string()),
        );
        record.set(
            "Isolation_Source_IRI",
            Some("http://purl.obolibrary.org/obo/PO_0020148".to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Archive, Module};

    use super::*;

    fn record_with_source(value: &str) -> MetadataRecord {
        let mut record =
            MetadataRecord::new("SRR000001".parse().unwrap(), Archive::Sra, Module::Sample);
        record.set("Isolation_Source", Some(value.to_string()));
        record
    }

    #[test]
    fn normalizes_stool_to_feces() {
        let mut record = record_with_source("Stool sample");
        normalize_fields(&mut record);
        assert_eq!(record.get("Isolation_Source_normalized"), Some("feces"));
        assert_eq!(
            record.get("Isolation_Source_IRI"),
            Some("http://purl.obolibrary.org/obo/ENVO_02000044")
        );
    }

    #[test]
    fn leaves_unknown_terms_alone() {
        let mut record = record_with_source("lung tissue");
        normalize_fields(&mut record);
        assert_eq!(record.get("Isolation_Source_normalized"), None);
    }

    #[test]
    fn no_source_no_change() {
        let mut record =
            MetadataRecord::new("SRR000001".parse().unwrap(), Archive::Sra, Module::Sample);
        normalize_fields(&mut record);
        assert_eq!(record.get("Isolation_Source_normalized"), None);
    }
}
