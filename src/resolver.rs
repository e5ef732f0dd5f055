use serde_json::Value;
use tracing::{debug, warn};

use crate::biosamples::{BioSamplesClient, pick_characteristic};
use crate::domain::{Accession, Archive, ResolvedTarget};
use crate::ena::{ANALYSIS_FIELDS, BrowserSample, EnaClient, READ_RUN_FIELDS, TsvRow};
use crate::error::MapError;
use crate::ncbi::NcbiClient;
use crate::patric::PatricClient;
use crate::record::{MetadataRecord, canonical_field};

/// Canonicalized output of one fetch strategy, in insertion order.
pub type Fields = Vec<(String, Option<String>)>;

/// Resolves an accession's metadata through the strategy registered for its
/// (archive, module) target. Fetch failures degrade the record with an
/// error marker instead of propagating.
pub struct MetadataResolver<'a, E, N, B, P> {
    ena: &'a E,
    ncbi: &'a N,
    biosamples: &'a B,
    patric: &'a P,
}

impl<'a, E, N, B, P> MetadataResolver<'a, E, N, B, P>
where
    E: EnaClient,
    N: NcbiClient,
    B: BioSamplesClient,
    P: PatricClient,
{
    pub fn new(ena: &'a E, ncbi: &'a N, biosamples: &'a B, patric: &'a P) -> Self {
        Self {
            ena,
            ncbi,
            biosamples,
            patric,
        }
    }

    pub fn resolve(&self, accession: &Accession, target: ResolvedTarget) -> MetadataRecord {
        let mut record = MetadataRecord::new(accession.clone(), target.archive, target.module);

        if target.module.wants_sample() {
            match self.fetch_sample(target.archive, accession) {
                Some(Ok(fields)) => record.merge(fields),
                Some(Err(err)) => {
                    warn!(accession = %accession, archive = %target.archive, "sample fetch failed: {err}");
                    record.mark_error(format!("sample fetch: {err}"));
                }
                None => {}
            }
        }
        if target.module.wants_assembly() {
            match self.fetch_assembly(target.archive, accession) {
                Some(Ok(fields)) => record.merge(fields),
                Some(Err(err)) => {
                    warn!(accession = %accession, archive = %target.archive, "assembly fetch failed: {err}");
                    record.mark_error(format!("assembly fetch: {err}"));
                }
                None => {}
            }
        }

        record
    }

    /// Static registry of sample strategies. Archives without a sample
    /// module yield `None`.
    fn fetch_sample(
        &self,
        archive: Archive,
        accession: &Accession,
    ) -> Option<Result<Fields, MapError>> {
        match archive {
            Archive::Ncbi => Some(self.ncbi_biosample(accession)),
            Archive::Ena => Some(self.ena_sample(accession)),
            Archive::Sra => Some(self.sra_run(accession)),
            Archive::EbiBioSamples => Some(self.ebi_biosample(accession)),
            Archive::Patric => Some(self.patric_sample(accession)),
        }
    }

    /// Static registry of assembly strategies.
    fn fetch_assembly(
        &self,
        archive: Archive,
        accession: &Accession,
    ) -> Option<Result<Fields, MapError>> {
        match archive {
            Archive::Ncbi => Some(self.ncbi_assembly(accession)),
            Archive::Ena => Some(self.ena_assembly(accession)),
            Archive::Patric => Some(self.patric_assembly(accession)),
            Archive::Sra | Archive::EbiBioSamples => None,
        }
    }

    fn ncbi_biosample(&self, accession: &Accession) -> Result<Fields, MapError> {
        let attrs = self.ncbi.biosample_attributes(accession.as_str())?;
        let mut fields = Fields::new();
        for (name, value) in attrs {
            if let Some(canon) = canonical_field(&name) {
                put_first(&mut fields, canon, Some(value));
            }
        }
        Ok(fields)
    }

    fn ena_sample(&self, accession: &Accession) -> Result<Fields, MapError> {
        // Portal search, then browser XML, then filereport; first endpoint
        // with a row wins. Endpoint errors fall through to the next.
        match self.ena.sample_search(accession.as_str()) {
            Ok(Some(row)) => return Ok(ena_sample_fields(&row)),
            Ok(None) => {}
            Err(err) => debug!(accession = %accession, "ENA portal search failed: {err}"),
        }
        match self.ena.sample_browser(accession.as_str()) {
            Ok(Some(sample)) => return Ok(browser_sample_fields(&sample)),
            Ok(None) => {}
            Err(err) => debug!(accession = %accession, "ENA browser XML failed: {err}"),
        }
        match self.ena.sample_filereport(accession.as_str()) {
            Ok(Some(row)) => return Ok(ena_sample_fields(&row)),
            Ok(None) => Ok(Fields::new()),
            Err(err) => {
                debug!(accession = %accession, "ENA filereport failed: {err}");
                Ok(Fields::new())
            }
        }
    }

    fn sra_run(&self, accession: &Accession) -> Result<Fields, MapError> {
        let Some(row) = self
            .ena
            .read_run_report(&accession.upper(), READ_RUN_FIELDS)?
        else {
            return Ok(Fields::new());
        };
        let get = |key: &str| non_empty(row.get(key));
        Ok(vec![
            ("SRA_Run".to_string(), get("run_accession")),
            ("SRA_Experiment".to_string(), get("experiment_accession")),
            ("SRA_Sample".to_string(), get("sample_accession")),
            ("SRA_Study".to_string(), get("study_accession")),
            ("Host".to_string(), get("host")),
            ("Isolation_Source".to_string(), get("library_source")),
            ("Library_Strategy".to_string(), get("library_strategy")),
            ("Platform".to_string(), get("instrument_platform")),
            ("Instrument".to_string(), get("instrument_model")),
            ("Location".to_string(), get("country")),
            ("Collection_Date".to_string(), get("collection_date")),
            ("Scientific_Name".to_string(), get("scientific_name")),
        ])
    }

    fn ebi_biosample(&self, accession: &Accession) -> Result<Fields, MapError> {
        let Some(ch) = self.biosamples.characteristics(accession.as_str())? else {
            return Ok(Fields::new());
        };
        Ok(vec![
            (
                "Host".to_string(),
                pick_characteristic(&ch, &["host", "host organism"]),
            ),
            (
                "Isolation_Source".to_string(),
                pick_characteristic(&ch, &["isolation source", "isolation_source", "source"]),
            ),
            (
                "Disease".to_string(),
                pick_characteristic(&ch, &["disease", "host disease"]),
            ),
            (
                "Location".to_string(),
                pick_characteristic(&ch, &["geographic location", "geo_loc_name", "country"]),
            ),
            (
                "Collection_Date".to_string(),
                pick_characteristic(&ch, &["collection date", "collection_date"]),
            ),
            (
                "Scientific_Name".to_string(),
                pick_characteristic(&ch, &["organism", "scientific name"]),
            ),
        ])
    }

    fn patric_sample(&self, accession: &Accession) -> Result<Fields, MapError> {
        let Some(doc) = self.patric.find_genome(accession.as_str())? else {
            return Ok(Fields::new());
        };
        Ok(patric_sample_fields(&doc))
    }

    fn ncbi_assembly(&self, accession: &Accession) -> Result<Fields, MapError> {
        let mut ids = self.ncbi.search_assembly(accession.as_str())?;
        if ids.is_empty() {
            // Cross-reference hop for BioSample-shaped accessions; an empty
            // link set means no additional data, not failure.
            match self.ncbi.link("biosample", "assembly", accession.as_str()) {
                Ok(linked) => ids = linked,
                Err(err) => debug!(accession = %accession, "assembly elink failed: {err}"),
            }
        }
        let Some(uid) = ids.first() else {
            return Ok(vec![("Assembly_Accession".to_string(), None)]);
        };
        let Some(summary) = self.ncbi.assembly_summary(uid)? else {
            return Ok(vec![("Assembly_Accession".to_string(), None)]);
        };
        Ok(vec![
            ("Assembly_Accession".to_string(), summary.assembly_accession),
            ("Organism".to_string(), summary.organism),
            ("Assembly_Level".to_string(), summary.assembly_level),
            ("Submitter".to_string(), summary.submitter),
            ("Submission_Date".to_string(), summary.submission_date),
            ("BioSample".to_string(), summary.biosample),
            ("FTP_Path_GenBank".to_string(), summary.ftp_path_genbank),
            ("FTP_Path_RefSeq".to_string(), summary.ftp_path_refseq),
        ])
    }

    fn ena_assembly(&self, accession: &Accession) -> Result<Fields, MapError> {
        let rows = self.ena.analysis_report(accession.as_str(), ANALYSIS_FIELDS)?;
        let Some(row) = rows.first() else {
            return Ok(vec![("ENA_Analysis_Accession".to_string(), None)]);
        };
        let get = |key: &str| non_empty(row.get(key));
        Ok(vec![
            ("ENA_Analysis_Accession".to_string(), get("analysis_accession")),
            ("ENA_Study".to_string(), get("study_accession")),
            ("ENA_Sample".to_string(), get("sample_accession")),
            ("ENA_First_Public".to_string(), get("first_public")),
            ("ENA_Scientific_Name".to_string(), get("scientific_name")),
            ("ENA_Study_Title".to_string(), get("study_title")),
            ("ENA_Assembly_Description".to_string(), get("description")),
        ])
    }

    fn patric_assembly(&self, accession: &Accession) -> Result<Fields, MapError> {
        let Some(doc) = self.patric.find_genome(accession.as_str())? else {
            return Ok(Fields::new());
        };
        Ok(vec![
            (
                "Assembly_Accession".to_string(),
                json_field(&doc, "refseq_accession").or_else(|| json_field(&doc, "genbank_accession")),
            ),
            ("Assembly_Level".to_string(), json_field(&doc, "genome_status")),
            ("Submitter".to_string(), json_field(&doc, "sequencing_centers")),
            ("BioSample".to_string(), json_field(&doc, "biosample_accession")),
            ("BioProject".to_string(), json_field(&doc, "bioproject_accession")),
        ])
    }
}

fn ena_sample_fields(row: &TsvRow) -> Fields {
    let get = |key: &str| non_empty(row.get(key));
    vec![
        ("Scientific_Name".to_string(), get("scientific_name")),
        ("Host".to_string(), get("host")),
        ("Host_Tax_ID".to_string(), get("host_tax_id")),
        ("Sex".to_string(), get("sex")),
        ("Age".to_string(), get("age")),
        (
            "Isolation_Source".to_string(),
            get("isolation_source").or_else(|| get("description")),
        ),
        (
            "Location".to_string(),
            get("geographic_location").or_else(|| get("country")),
        ),
        ("Collection_Date".to_string(), get("collection_date")),
        (
            "Center_Name".to_string(),
            get("center_name").or_else(|| get("broker_name")),
        ),
    ]
}

fn browser_sample_fields(sample: &BrowserSample) -> Fields {
    vec![
        ("Scientific_Name".to_string(), sample.scientific_name.clone()),
        ("Host".to_string(), sample.host.clone()),
        ("Isolation_Source".to_string(), sample.isolation_source.clone()),
        ("Location".to_string(), sample.country.clone()),
        ("Collection_Date".to_string(), sample.collection_date.clone()),
    ]
}

fn patric_sample_fields(doc: &Value) -> Fields {
    // The record's accession is immutable; the BV-BRC genome id is kept as
    // an extra instead of overwriting it.
    vec![
        (
            "Genome_ID".to_string(),
            json_field(doc, "genome_id")
                .or_else(|| json_field(doc, "genbank_accession"))
                .or_else(|| json_field(doc, "refseq_accession")),
        ),
        ("Scientific_Name".to_string(), json_field(doc, "organism_name")),
        ("Host".to_string(), json_field(doc, "host_name")),
        ("Isolation_Source".to_string(), json_field(doc, "isolation_source")),
        (
            "Location".to_string(),
            json_field(doc, "isolation_country")
                .or_else(|| json_field(doc, "geographic_location")),
        ),
        (
            "Collection_Date".to_string(),
            json_field(doc, "collection_year").or_else(|| json_field(doc, "collection_date")),
        ),
        ("Disease".to_string(), json_field(doc, "disease")),
        ("Genome_Status".to_string(), json_field(doc, "genome_status")),
        (
            "Platform".to_string(),
            json_field(doc, "sequencing_platform")
                .or_else(|| json_field(doc, "sequencing_centers")),
        ),
        ("Genome_Length".to_string(), json_field(doc, "genome_length")),
        ("GC_Content".to_string(), json_field(doc, "gc_content")),
        ("Contigs".to_string(), json_field(doc, "contigs")),
        ("Taxon_ID".to_string(), json_field(doc, "taxon_id")),
        ("BioSample".to_string(), json_field(doc, "biosample_accession")),
        ("BioProject".to_string(), json_field(doc, "bioproject_accession")),
    ]
}

/// Stringifies a BV-BRC document field; numeric fields (taxon id, genome
/// length, GC content) arrive as JSON numbers.
fn json_field(doc: &Value, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            (!parts.is_empty()).then(|| parts.join(";"))
        }
        _ => None,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First non-empty value wins within one document.
fn put_first(fields: &mut Fields, key: &str, value: Option<String>) {
    let value = value.filter(|v| !v.trim().is_empty());
    match fields.iter_mut().find(|(name, _)| name == key) {
        Some((_, slot @ None)) => *slot = value,
        Some(_) => {}
        None => fields.push((key.to_string(), value)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patric_fields_keep_accession_as_extra() {
        let doc = json!({
            "genome_id": "83332.12",
            "organism_name": "Mycobacterium tuberculosis H37Rv",
            "genome_length": 4411532,
            "gc_content": 65.6,
            "sequencing_centers": ["Broad Institute"],
        });
        let fields = patric_sample_fields(&doc);
        let get = |key: &str| {
            fields
                .iter()
                .find(|(name, _)| name == key)
                .and_then(|(_, value)| value.clone())
        };
        assert_eq!(get("Genome_ID").as_deref(), Some("83332.12"));
        assert_eq!(get("Genome_Length").as_deref(), Some("4411532"));
        assert_eq!(get("GC_Content").as_deref(), Some("65.6"));
        assert_eq!(get("Platform").as_deref(), Some("Broad Institute"));
        assert!(!fields.iter().any(|(name, _)| name == "Accession"));
    }

    #[test]
    fn ena_row_fallback_fields() {
        let mut row = TsvRow::new();
        row.insert("scientific_name".to_string(), "E. coli".to_string());
        row.insert("isolation_source".to_string(), "".to_string());
        row.insert("description".to_string(), "stool isolate".to_string());
        row.insert("country".to_string(), "Peru".to_string());
        let fields = ena_sample_fields(&row);
        let get = |key: &str| {
            fields
                .iter()
                .find(|(name, _)| name == key)
                .and_then(|(_, value)| value.clone())
        };
        assert_eq!(get("Isolation_Source").as_deref(), Some("stool isolate"));
        assert_eq!(get("Location").as_deref(), Some("Peru"));
    }

    #[test]
    fn put_first_does_not_overwrite() {
        let mut fields = Fields::new();
        put_first(&mut fields, "Host", Some("first".to_string()));
        put_first(&mut fields, "Host", Some("second".to_string()));
        assert_eq!(fields, vec![("Host".to_string(), Some("first".to_string()))]);
    }
}
