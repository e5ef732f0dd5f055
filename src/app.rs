use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use tracing::{info, warn};

use crate::biosamples::BioSamplesClient;
use crate::domain::{Accession, ResolvedTarget, route};
use crate::downloader::DownloadManager;
use crate::ena::EnaClient;
use crate::error::MapError;
use crate::fs_util;
use crate::ncbi::NcbiClient;
use crate::ontology::normalize_fields;
use crate::patric::PatricClient;
use crate::record::MetadataRecord;
use crate::resolver::MetadataResolver;
use crate::urls::UrlResolver;
use crate::verify::VerificationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DownloadKind {
    None,
    Fastq,
    Assembly,
    Both,
}

impl DownloadKind {
    fn wants_fastq(self) -> bool {
        matches!(self, DownloadKind::Fastq | DownloadKind::Both)
    }

    fn wants_assembly(self) -> bool {
        matches!(self, DownloadKind::Assembly | DownloadKind::Both)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Forced (archive, module) target; `None` routes per accession.
    pub forced_target: Option<ResolvedTarget>,
    pub download: DownloadKind,
    pub outdir: Utf8PathBuf,
    pub workers: usize,
    pub verify: bool,
    pub normalize: bool,
    pub dry_run: bool,
    pub zip_output: bool,
    pub zip_all: bool,
}

/// One run of the harvest pipeline. Accessions are processed sequentially;
/// concurrency lives inside the download batches. Each accession's failures
/// degrade its own record only.
pub struct App<E, N, B, P> {
    ena: E,
    ncbi: N,
    biosamples: B,
    patric: P,
    downloader: DownloadManager,
}

impl<E, N, B, P> App<E, N, B, P>
where
    E: EnaClient,
    N: NcbiClient,
    B: BioSamplesClient,
    P: PatricClient,
{
    pub fn new(ena: E, ncbi: N, biosamples: B, patric: P, downloader: DownloadManager) -> Self {
        Self {
            ena,
            ncbi,
            biosamples,
            patric,
            downloader,
        }
    }

    /// Runs the harvest for every accession. An unwritable output root is
    /// the one batch-fatal condition; it is detected before any accession
    /// is processed.
    pub fn run(
        &self,
        accessions: &[Accession],
        options: &RunOptions,
    ) -> Result<Vec<MetadataRecord>, MapError> {
        if !options.dry_run && options.download != DownloadKind::None {
            fs::create_dir_all(options.outdir.as_std_path()).map_err(|err| {
                MapError::Filesystem(format!("create output root {}: {err}", options.outdir))
            })?;
        }

        let mut records = Vec::with_capacity(accessions.len());
        for accession in accessions {
            records.push(self.process(accession, options));
        }

        if options.zip_all && !options.dry_run && options.download != DownloadKind::None {
            let zip_path = Utf8PathBuf::from(format!(
                "{}.zip",
                options.outdir.as_str().trim_end_matches('/')
            ));
            if let Err(err) =
                fs_util::zip_dir(options.outdir.as_std_path(), zip_path.as_std_path())
            {
                warn!("failed to zip output root: {err}");
            }
        }

        Ok(records)
    }

    fn process(&self, accession: &Accession, options: &RunOptions) -> MetadataRecord {
        let target = options.forced_target.unwrap_or_else(|| route(accession));
        info!(accession = %accession, archive = %target.archive, module = %target.module, "processing");

        let resolver =
            MetadataResolver::new(&self.ena, &self.ncbi, &self.biosamples, &self.patric);
        let mut record = resolver.resolve(accession, target);

        if options.normalize {
            normalize_fields(&mut record);
        }

        if options.download != DownloadKind::None {
            self.download_files(accession, target, options, &mut record);
        }

        record
    }

    fn download_files(
        &self,
        accession: &Accession,
        target: ResolvedTarget,
        options: &RunOptions,
        record: &mut MetadataRecord,
    ) {
        let url_resolver = UrlResolver::new(&self.ena, &self.ncbi);
        let mut urls = Vec::new();
        if options.download.wants_fastq() {
            urls.extend(url_resolver.resolve_fastq_urls(accession, target.archive));
        }
        if options.download.wants_assembly() {
            urls.extend(url_resolver.resolve_assembly_urls(accession, target.archive, record));
        }
        info!(accession = %accession, count = urls.len(), "resolved file URLs");

        if options.dry_run || urls.is_empty() {
            return;
        }

        let accession_dir = options.outdir.join(accession.dir_name());
        let paths = match self.downloader.download(
            &urls,
            accession_dir.as_std_path(),
            options.workers,
            Some(accession.as_str()),
        ) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(accession = %accession, "download batch failed: {err}");
                record.mark_error(format!("download: {err}"));
                return;
            }
        };
        record.downloads = paths
            .iter()
            .map(|path| path.display().to_string())
            .collect();

        if options.verify && !paths.is_empty() {
            let service = VerificationService::new(&self.ena);
            let report = service.verify(&paths, accession, record);
            record.verification = serde_json::to_string(&report).ok();
        }

        if options.zip_output && !paths.is_empty() {
            let zip_path = options.outdir.join(format!("{}.zip", accession.dir_name()));
            match fs_util::zip_dir(accession_dir.as_std_path(), zip_path.as_std_path()) {
                Ok(()) => record.archive_path = Some(zip_path.to_string()),
                Err(err) => warn!(accession = %accession, "zip failed: {err}"),
            }
        }
    }
}

/// Loads a newline-delimited accession list; blank lines are skipped.
pub fn load_accessions(path: &PathBuf) -> Result<Vec<Accession>, MapError> {
    let content = fs::read_to_string(path).map_err(|_| MapError::InputRead(path.clone()))?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Accession::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_accessions_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SRR000001\n\n  GCF_000005845.2  \n").unwrap();
        let accessions = load_accessions(&file.path().to_path_buf()).unwrap();
        assert_eq!(accessions.len(), 2);
        assert_eq!(accessions[0].as_str(), "SRR000001");
        assert_eq!(accessions[1].as_str(), "GCF_000005845.2");
    }

    #[test]
    fn load_accessions_missing_file() {
        let err = load_accessions(&PathBuf::from("/nonexistent/accessions.txt")).unwrap_err();
        assert!(matches!(err, MapError::InputRead(_)));
    }
}
