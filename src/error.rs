use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MapError {
    #[error("provide either --accession or --input, not both")]
    ConflictingInput,

    #[error("provide either --accession or --input")]
    MissingInput,

    #[error("empty accession string")]
    EmptyAccession,

    #[error("--db and --module are required unless --auto-db is set")]
    MissingTarget,

    #[error("failed to read accession list at {0}")]
    InputRead(PathBuf),

    #[error("ENA request failed: {0}")]
    EnaHttp(String),

    #[error("ENA returned status {status}: {message}")]
    EnaStatus { status: u16, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("BioSamples request failed: {0}")]
    BioSamplesHttp(String),

    #[error("BioSamples returned status {status}: {message}")]
    BioSamplesStatus { status: u16, message: String },

    #[error("BV-BRC request failed: {0}")]
    PatricHttp(String),

    #[error("BV-BRC returned status {status}: {message}")]
    PatricStatus { status: u16, message: String },

    #[error("malformed {archive} response: {message}")]
    MalformedResponse { archive: String, message: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write output CSV: {0}")]
    CsvWrite(String),
}
