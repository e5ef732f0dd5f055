use std::collections::HashMap;

use metaphenomap::domain::{Accession, Archive};
use metaphenomap::ena::{BrowserSample, EnaClient, TsvRow};
use metaphenomap::error::MapError;
use metaphenomap::ncbi::{AssemblySummary, NcbiClient};
use metaphenomap::urls::UrlResolver;

#[derive(Default)]
struct MockEna {
    run_rows: HashMap<String, TsvRow>,
    sample_runs: HashMap<String, Vec<String>>,
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

    fn runs_for_sample(&self, accession: &str) -> Result<Vec<String>, MapError> {
        Ok(self.sample_runs.get(accession).cloned().unwrap_or_default())
    }

    fn analysis_report(&self, _accession: &str, _fields: &str) -> Result<Vec<TsvRow>, MapError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct MockNcbi {
    links: Vec<String>,
    runs_by_uid: HashMap<String, Vec<String>>,
}

impl NcbiClient for MockNcbi {
    fn biosample_attributes(&self, _accession: &str) -> Result<Vec<(String, String)>, MapError> {
        Ok(Vec::new())
    }

    fn search_assembly(&self, _term: &str) -> Result<Vec<String>, MapError> {
        Ok(Vec::new())
    }

    fn link(&self, _dbfrom: &str, _db: &str, _id: &str) -> Result<Vec<String>, MapError> {
        Ok(self.links.clone())
    }

    fn assembly_summary(&self, _uid: &str) -> Result<Option<AssemblySummary>, MapError> {
        Ok(None)
    }

    fn sra_runs(&self, uid: &str) -> Result<Vec<String>, MapError> {
        Ok(self.runs_by_uid.get(uid).cloned().unwrap_or_default())
    }
}

fn acc(value: &str) -> Accession {
    value.parse().unwrap()
}

fn fastq_row(run: &str) -> TsvRow {
    let mut row = TsvRow::new();
    row.insert(
        "fastq_ftp".to_string(),
        format!("ftp.sra.ebi.ac.uk/vol1/fastq/{run}/{run}.fastq.gz"),
    );
    row
}

#[test]
fn run_accession_uses_filereport_directly() {
    let mut ena = MockEna::default();
    ena.run_rows.insert("SRR000001".to_string(), fastq_row("SRR000001"));
    let ncbi = MockNcbi::default();

    let urls = UrlResolver::new(&ena, &ncbi).resolve_fastq_urls(&acc("SRR000001"), Archive::Sra);
    assert_eq!(
        urls,
        vec!["https://ftp.sra.ebi.ac.uk/vol1/fastq/SRR000001/SRR000001.fastq.gz"]
    );
}

#[test]
fn ena_sample_fans_out_over_its_runs() {
    let mut ena = MockEna::default();
    ena.sample_runs.insert(
        "ERS000001".to_string(),
        vec!["ERR000001".to_string(), "ERR000002".to_string()],
    );
    ena.run_rows.insert("ERR000001".to_string(), fastq_row("ERR000001"));
    ena.run_rows.insert("ERR000002".to_string(), fastq_row("ERR000002"));
    let ncbi = MockNcbi::default();

    let urls = UrlResolver::new(&ena, &ncbi).resolve_fastq_urls(&acc("ERS000001"), Archive::Ena);
    assert_eq!(urls.len(), 2);
    assert!(urls[0].contains("ERR000001"));
    assert!(urls[1].contains("ERR000002"));
}

#[test]
fn biosample_link_chain_is_capped() {
    let mut ena = MockEna::default();
    let mut ncbi = MockNcbi::default();
    // Fifteen linked SRA records, each naming one run with one file.
    for i in 0..15 {
        let uid = format!("{i}");
        let run = format!("SRR{i:06}");
        ncbi.links.push(uid.clone());
        ncbi.runs_by_uid.insert(uid, vec![run.clone()]);
        ena.run_rows.insert(run.clone(), fastq_row(&run));
    }

    let urls =
        UrlResolver::new(&ena, &ncbi).resolve_fastq_urls(&acc("SAMN02603086"), Archive::Ncbi);
    assert_eq!(urls.len(), 10);
}

#[test]
fn unsupported_archive_yields_no_urls() {
    let ena = MockEna::default();
    let ncbi = MockNcbi::default();
    let resolver = UrlResolver::new(&ena, &ncbi);

    assert!(resolver.resolve_fastq_urls(&acc("83332.12"), Archive::Patric).is_empty());
    assert!(resolver.resolve_fastq_urls(&acc("PRJEB1234"), Archive::Ena).is_empty());
}
