use std::collections::HashMap;
use std::fs;

use metaphenomap::domain::{Accession, Archive, Module};
use metaphenomap::ena::{BrowserSample, EnaClient, TsvRow};
use metaphenomap::error::MapError;
use metaphenomap::record::MetadataRecord;
use metaphenomap::verify::VerificationService;

const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

#[derive(Default)]
struct MockEna {
    run_rows: HashMap<String, TsvRow>,
}

impl EnaClient for MockEna {
    fn sample_search(&self, _accession: &str) -> Result<Option<TsvRow>, MapError> {
        Ok(None)
    }

    fn sample_browser(&self, _accession: &str) -> Result<Option<BrowserSample>, MapError> {
        Ok(None)
    }

    fn sample_filereport(&self, _accession: &str) -> Result<Option<TsvRow>, MapError> {
        Ok(None)
    }

    fn read_run_report(&self, run: &str, _fields: &str) -> Result<Option<TsvRow>, MapError> {
        Ok(self.run_rows.get(run).cloned())
    }

    fn runs_for_sample(&self, _accession: &str) -> Result<Vec<String>, MapError> {
        Ok(Vec::new())
    }

    fn analysis_report(&self, _accession: &str, _fields: &str) -> Result<Vec<TsvRow>, MapError> {
        Ok(Vec::new())
    }
}

fn acc(value: &str) -> Accession {
    value.parse().unwrap()
}

#[test]
fn matches_archive_reported_checksums() {
    let temp = tempfile::tempdir().unwrap();
    let good = temp.path().join("SRR000001_1.fastq.gz");
    let bad = temp.path().join("SRR000001_2.fastq.gz");
    fs::write(&good, b"hello world").unwrap();
    fs::write(&bad, b"corrupted body").unwrap();

    let mut row = TsvRow::new();
    row.insert(
        "fastq_ftp".to_string(),
        "vol1/fastq/SRR000001_1.fastq.gz;vol1/fastq/SRR000001_2.fastq.gz".to_string(),
    );
    row.insert(
        "fastq_md5".to_string(),
        format!("{HELLO_MD5};00000000000000000000000000000000"),
    );
    let mut ena = MockEna::default();
    ena.run_rows.insert("SRR000001".to_string(), row);

    let accession = acc("SRR000001");
    let record = MetadataRecord::new(accession.clone(), Archive::Sra, Module::Sample);
    let report = VerificationService::new(&ena).verify(
        &[good.clone(), bad.clone()],
        &accession,
        &record,
    );

    let good_entry = &report["SRR000001_1.fastq.gz"];
    assert_eq!(good_entry.md5, HELLO_MD5);
    assert_eq!(good_entry.expected_md5.as_deref(), Some(HELLO_MD5));
    assert!(good_entry.matched);

    let bad_entry = &report["SRR000001_2.fastq.gz"];
    assert!(!bad_entry.matched);
}

#[test]
fn files_without_archive_checksum_pass() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("GCF_000005845.2_genomic.fna.gz");
    fs::write(&path, b"hello world").unwrap();

    let ena = MockEna::default();
    let accession = acc("GCF_000005845.2");
    let record = MetadataRecord::new(accession.clone(), Archive::Ncbi, Module::Assembly);
    let report = VerificationService::new(&ena).verify(&[path], &accession, &record);

    let entry = &report["GCF_000005845.2_genomic.fna.gz"];
    assert_eq!(entry.md5, HELLO_MD5);
    assert!(entry.expected_md5.is_none());
    assert!(entry.matched);
}

#[test]
fn record_run_extras_drive_checksum_lookup() {
    // A sample-level accession whose record names the run discovered during
    // metadata resolution.
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ERR000001.fastq.gz");
    fs::write(&path, b"hello world").unwrap();

    let mut row = TsvRow::new();
    row.insert("fastq_ftp".to_string(), "vol1/fastq/ERR000001.fastq.gz".to_string());
    row.insert("fastq_md5".to_string(), HELLO_MD5.to_string());
    let mut ena = MockEna::default();
    ena.run_rows.insert("ERR000001".to_string(), row);

    let accession = acc("ERS000001");
    let mut record = MetadataRecord::new(accession.clone(), Archive::Ena, Module::Sample);
    record.set("SRA_Run", Some("ERR000001".to_string()));
    let report = VerificationService::new(&ena).verify(&[path], &accession, &record);

    let entry = &report["ERR000001.fastq.gz"];
    assert_eq!(entry.expected_md5.as_deref(), Some(HELLO_MD5));
    assert!(entry.matched);
}
