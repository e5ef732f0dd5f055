use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use metaphenomap::app::{App, DownloadKind, RunOptions, load_accessions};
use metaphenomap::biosamples::BioSamplesHttpClient;
use metaphenomap::domain::{Accession, Archive, Module, ResolvedTarget};
use metaphenomap::downloader::{DEFAULT_WORKERS, DownloadManager};
use metaphenomap::ena::EnaHttpClient;
use metaphenomap::error::MapError;
use metaphenomap::ncbi::NcbiHttpClient;
use metaphenomap::output;
use metaphenomap::patric::PatricHttpClient;

#[derive(Parser)]
#[command(name = "metaphenomap")]
#[command(about = "Harvest sample and assembly metadata for public-archive accessions")]
#[command(version, author)]
struct Cli {
    /// Text file with one accession per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Single accession
    #[arg(short, long)]
    accession: Option<String>,

    /// Output CSV path
    #[arg(short, long)]
    output: PathBuf,

    /// Archive to query (omit with --auto-db)
    #[arg(long)]
    db: Option<Archive>,

    /// Module to fetch (omit with --auto-db)
    #[arg(long)]
    module: Option<Module>,

    /// Auto-detect archive and module per accession
    #[arg(long)]
    auto_db: bool,

    /// Download FASTQ and/or assembly files
    #[arg(long, value_enum, default_value = "none")]
    download: DownloadKind,

    /// Directory to save downloads
    #[arg(long, default_value = "downloads")]
    outdir: Utf8PathBuf,

    /// Parallel download workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    max_workers: usize,

    /// Compute MD5s and include archive-reported MD5s where available
    #[arg(long)]
    verify: bool,

    /// Apply light ontology normalization
    #[arg(long)]
    normalize: bool,

    /// Zip each accession folder after download
    #[arg(long)]
    zip_output: bool,

    /// Zip the whole outdir at the end
    #[arg(long)]
    zip_all: bool,

    /// Debug-level logging (RUST_LOG still overrides)
    #[arg(short, long)]
    verbose: bool,

    /// No file writes or downloads
    #[arg(long)]
    dryrun: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<MapError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MapError) -> u8 {
    match error {
        MapError::ConflictingInput
        | MapError::MissingInput
        | MapError::MissingTarget
        | MapError::InputRead(_) => 2,
        MapError::EnaHttp(_)
        | MapError::EnaStatus { .. }
        | MapError::NcbiHttp(_)
        | MapError::NcbiStatus { .. }
        | MapError::BioSamplesHttp(_)
        | MapError::BioSamplesStatus { .. }
        | MapError::PatricHttp(_)
        | MapError::PatricStatus { .. } => 3,
        _ => 1,
    }
}

fn default_log_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_directive(cli.verbose))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let accessions = resolve_input(&cli).into_diagnostic()?;
    let forced_target = resolve_target(&cli).into_diagnostic()?;

    let ena = EnaHttpClient::new().into_diagnostic()?;
    let ncbi = NcbiHttpClient::new().into_diagnostic()?;
    let biosamples = BioSamplesHttpClient::new().into_diagnostic()?;
    let patric = PatricHttpClient::new().into_diagnostic()?;
    let downloader = DownloadManager::new().into_diagnostic()?;
    let app = App::new(ena, ncbi, biosamples, patric, downloader);

    let options = RunOptions {
        forced_target,
        download: cli.download,
        outdir: cli.outdir,
        workers: cli.max_workers,
        verify: cli.verify,
        normalize: cli.normalize,
        dry_run: cli.dryrun,
        zip_output: cli.zip_output,
        zip_all: cli.zip_all,
    };

    let records = app.run(&accessions, &options).into_diagnostic()?;

    if cli.dryrun {
        println!("{}", output::render_preview(&records, 5));
        eprintln!("dry-run: not writing CSV");
    } else {
        output::write_csv(&records, &cli.output).into_diagnostic()?;
        eprintln!("saved: {}", cli.output.display());
    }
    Ok(())
}

fn resolve_input(cli: &Cli) -> Result<Vec<Accession>, MapError> {
    match (&cli.accession, &cli.input) {
        (Some(_), Some(_)) => Err(MapError::ConflictingInput),
        (Some(accession), None) => Ok(vec![Accession::from_str(accession)?]),
        (None, Some(path)) => load_accessions(path),
        (None, None) => Err(MapError::MissingInput),
    }
}

fn resolve_target(cli: &Cli) -> Result<Option<ResolvedTarget>, MapError> {
    if cli.auto_db {
        return Ok(None);
    }
    match (cli.db, cli.module) {
        (Some(archive), Some(module)) => Ok(Some(ResolvedTarget { archive, module })),
        _ => Err(MapError::MissingTarget),
    }
}
