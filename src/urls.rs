use tracing::{debug, warn};

use crate::domain::{
    Accession, Archive, BIOSAMPLE_PREFIXES_NCBI, SAMPLE_PREFIXES_ENA, is_assembly_accession,
    is_run_accession,
};
use crate::ena::{ANALYSIS_URL_FIELDS, EnaClient, FASTQ_URL_FIELDS, TsvRow};
use crate::ncbi::NcbiClient;
use crate::record::MetadataRecord;

/// Well-known assembly file suffixes appended to the FTP base name.
pub const ASSEMBLY_SUFFIXES: [&str; 4] = [
    "_genomic.fna.gz",
    "_genomic.gff.gz",
    "_protein.faa.gz",
    "_cds_from_genomic.fna.gz",
];

/// Run file transport fields in preference order, HTTP before FTP.
const RUN_TRANSPORT_FIELDS: [&str; 4] =
    ["fastq_http", "fastq_ftp", "submitted_http", "submitted_ftp"];

/// Fan-out cap when traversing BioSample -> SRA link chains, to avoid
/// unbounded query amplification.
const LINKED_RECORD_CAP: usize = 10;

/// Resolves downloadable file URLs for an accession. Absence of data is a
/// valid outcome: both entry points return an empty list rather than erring.
pub struct UrlResolver<'a, E, N> {
    ena: &'a E,
    ncbi: &'a N,
}

impl<'a, E, N> UrlResolver<'a, E, N>
where
    E: EnaClient,
    N: NcbiClient,
{
    pub fn new(ena: &'a E, ncbi: &'a N) -> Self {
        Self { ena, ncbi }
    }

    pub fn resolve_fastq_urls(&self, accession: &Accession, archive: Archive) -> Vec<String> {
        let upper = accession.upper();

        if is_run_accession(accession) {
            return self.run_fastq_urls(&upper);
        }

        if archive == Archive::Ena && SAMPLE_PREFIXES_ENA.iter().any(|p| upper.starts_with(p)) {
            let runs = match self.ena.runs_for_sample(accession.as_str()) {
                Ok(runs) => runs,
                Err(err) => {
                    warn!(accession = %accession, "run enumeration failed: {err}");
                    return Vec::new();
                }
            };
            return runs
                .iter()
                .flat_map(|run| self.run_fastq_urls(run))
                .collect();
        }

        if archive == Archive::Ncbi && BIOSAMPLE_PREFIXES_NCBI.iter().any(|p| upper.starts_with(p))
        {
            return self.biosample_fastq_urls(accession);
        }

        if archive == Archive::Sra {
            return self.run_fastq_urls(&upper);
        }

        Vec::new()
    }

    pub fn resolve_assembly_urls(
        &self,
        accession: &Accession,
        archive: Archive,
        record: &MetadataRecord,
    ) -> Vec<String> {
        let base = record
            .get("FTP_Path_RefSeq")
            .or_else(|| record.get("FTP_Path_GenBank"));

        if is_assembly_accession(accession) || base.is_some() {
            // The archive base path determines all four URLs; no round-trip.
            let Some(base) = base else {
                return Vec::new();
            };
            let base = base.trim_end_matches('/');
            let Some(name) = base.rsplit('/').next().filter(|n| !n.is_empty()) else {
                return Vec::new();
            };
            return ASSEMBLY_SUFFIXES
                .iter()
                .map(|suffix| format!("{base}/{name}{suffix}"))
                .collect();
        }

        if archive == Archive::Ena {
            let rows = match self.ena.analysis_report(accession.as_str(), ANALYSIS_URL_FIELDS) {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(accession = %accession, "analysis filereport failed: {err}");
                    return Vec::new();
                }
            };
            return rows
                .iter()
                .flat_map(|row| transport_urls(row, &["submitted_http", "submitted_ftp"]))
                .collect();
        }

        Vec::new()
    }

    fn run_fastq_urls(&self, run: &str) -> Vec<String> {
        match self.ena.read_run_report(run, FASTQ_URL_FIELDS) {
            Ok(Some(row)) => transport_urls(&row, &RUN_TRANSPORT_FIELDS),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(run, "run filereport failed: {err}");
                Vec::new()
            }
        }
    }

    /// Two-hop BioSample -> SRA traversal: id-link, then summarize each
    /// linked record for its runs. Either hop returning nothing is "no
    /// additional data".
    fn biosample_fastq_urls(&self, accession: &Accession) -> Vec<String> {
        let uids = match self.ncbi.link("biosample", "sra", accession.as_str()) {
            Ok(uids) => uids,
            Err(err) => {
                warn!(accession = %accession, "biosample elink failed: {err}");
                return Vec::new();
            }
        };
        let mut urls = Vec::new();
        for uid in uids.iter().take(LINKED_RECORD_CAP) {
            let runs = match self.ncbi.sra_runs(uid) {
                Ok(runs) => runs,
                Err(err) => {
                    debug!(uid, "sra esummary failed: {err}");
                    continue;
                }
            };
            for run in runs {
                urls.extend(self.run_fastq_urls(&run));
            }
        }
        urls
    }
}

/// Compiles candidate URLs from semicolon-separated transport fields in
/// priority order. FTP entries are rewritten to HTTPS.
pub fn transport_urls(row: &TsvRow, keys: &[&str]) -> Vec<String> {
    let mut urls = Vec::new();
    for key in keys {
        let Some(value) = row.get(*key) else {
            continue;
        };
        for entry in value.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry.starts_with("http") {
                urls.push(entry.to_string());
            } else if let Some(rest) = entry.strip_prefix("ftp://") {
                urls.push(format!("https://{rest}"));
            } else if entry.starts_with("ftp") {
                // ENA reports scheme-less FTP host paths.
                urls.push(format!("https://{entry}"));
            }
        }
    }
    urls
}
