//! Multi-archive metadata harvester for biological-sample and
//! genome-assembly accessions, with optional parallel retrieval and MD5
//! verification of the associated files.

pub mod app;
pub mod biosamples;
pub mod domain;
pub mod downloader;
pub mod ena;
pub mod error;
pub mod fs_util;
pub mod ncbi;
pub mod ontology;
pub mod output;
pub mod patric;
pub mod record;
pub mod resolver;
pub mod urls;
pub mod verify;
