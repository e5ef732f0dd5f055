use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// An archive-issued identifier for a sample, sequencing run, or assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uppercased view used by prefix routing; archives issue
    /// case-insensitive accessions but report them uppercase.
    pub fn upper(&self) -> String {
        self.0.to_uppercase()
    }

    /// Directory-safe form for per-accession output folders.
    pub fn dir_name(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = MapError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(MapError::EmptyAccession);
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    Ncbi,
    Ena,
    Sra,
    #[value(name = "ebibiosamples")]
    #[serde(rename = "ebibiosamples")]
    EbiBioSamples,
    Patric,
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Archive::Ncbi => "ncbi",
            Archive::Ena => "ena",
            Archive::Sra => "sra",
            Archive::EbiBioSamples => "ebibiosamples",
            Archive::Patric => "patric",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Sample,
    Assembly,
    Both,
}

impl Module {
    pub fn wants_sample(self) -> bool {
        matches!(self, Module::Sample | Module::Both)
    }

    pub fn wants_assembly(self) -> bool {
        matches!(self, Module::Assembly | Module::Both)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Module::Sample => "sample",
            Module::Assembly => "assembly",
            Module::Both => "both",
        };
        write!(f, "{name}")
    }
}

/// Where an accession's metadata is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub archive: Archive,
    pub module: Module,
}

pub const RUN_PREFIXES: [&str; 3] = ["SRR", "ERR", "DRR"];
pub const SAMPLE_PREFIXES_ENA: [&str; 4] = ["ERS", "SRS", "DRS", "SAMEA"];
pub const BIOSAMPLE_PREFIXES_NCBI: [&str; 2] = ["SAMN", "SAMD"];

fn patric_genome_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+$").expect("static pattern"))
}

/// Classifies an accession into (archive, module) from its prefix/shape.
/// First rule wins; unknown shapes degrade to the ENA sample default.
pub fn route(accession: &Accession) -> ResolvedTarget {
    let upper = accession.upper();
    if upper.starts_with("GCF_") || upper.starts_with("GCA_") {
        return ResolvedTarget {
            archive: Archive::Ncbi,
            module: Module::Assembly,
        };
    }
    if RUN_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return ResolvedTarget {
            archive: Archive::Sra,
            module: Module::Sample,
        };
    }
    if SAMPLE_PREFIXES_ENA.iter().any(|p| upper.starts_with(p)) {
        return ResolvedTarget {
            archive: Archive::Ena,
            module: Module::Sample,
        };
    }
    if BIOSAMPLE_PREFIXES_NCBI.iter().any(|p| upper.starts_with(p)) {
        return ResolvedTarget {
            archive: Archive::Ncbi,
            module: Module::Sample,
        };
    }
    if patric_genome_id().is_match(accession.as_str()) {
        return ResolvedTarget {
            archive: Archive::Patric,
            module: Module::Both,
        };
    }
    ResolvedTarget {
        archive: Archive::Ena,
        module: Module::Sample,
    }
}

pub fn is_run_accession(accession: &Accession) -> bool {
    let upper = accession.upper();
    RUN_PREFIXES.iter().any(|p| upper.starts_with(p))
}

pub fn is_assembly_accession(accession: &Accession) -> bool {
    let upper = accession.upper();
    upper.starts_with("GCF_") || upper.starts_with("GCA_")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn acc(value: &str) -> Accession {
        value.parse().unwrap()
    }

    #[test]
    fn parse_accession_trims() {
        let a = acc("  SRR000001 ");
        assert_eq!(a.as_str(), "SRR000001");
    }

    #[test]
    fn parse_accession_rejects_empty() {
        let err = "   ".parse::<Accession>().unwrap_err();
        assert_matches!(err, MapError::EmptyAccession);
    }

    #[test]
    fn route_assembly_prefixes() {
        for value in ["GCF_000005845.2", "GCA_000001405.29", "gcf_000005845.2"] {
            let target = route(&acc(value));
            assert_eq!(target.archive, Archive::Ncbi);
            assert_eq!(target.module, Module::Assembly);
        }
    }

    #[test]
    fn route_run_prefixes() {
        for value in ["SRR000001", "ERR164407", "DRR000001"] {
            let target = route(&acc(value));
            assert_eq!(target.archive, Archive::Sra);
            assert_eq!(target.module, Module::Sample);
        }
    }

    #[test]
    fn route_ena_sample_prefixes() {
        for value in ["ERS000001", "SRS000001", "DRS000001", "SAMEA2620084"] {
            let target = route(&acc(value));
            assert_eq!(target.archive, Archive::Ena);
            assert_eq!(target.module, Module::Sample);
        }
    }

    #[test]
    fn route_ncbi_biosample_prefixes() {
        for value in ["SAMN02603086", "SAMD00000001"] {
            let target = route(&acc(value));
            assert_eq!(target.archive, Archive::Ncbi);
            assert_eq!(target.module, Module::Sample);
        }
    }

    #[test]
    fn route_patric_genome_id() {
        let target = route(&acc("83332.12"));
        assert_eq!(target.archive, Archive::Patric);
        assert_eq!(target.module, Module::Both);
    }

    #[test]
    fn route_default_is_ena_sample() {
        for value in ["PRJEB1234", "unknown-thing", "83332"] {
            let target = route(&acc(value));
            assert_eq!(target.archive, Archive::Ena);
            assert_eq!(target.module, Module::Sample);
        }
    }

    #[test]
    fn route_is_deterministic() {
        let a = acc("SRR000001");
        assert_eq!(route(&a), route(&a));
    }

    #[test]
    fn dir_name_sanitizes_slashes() {
        assert_eq!(acc("a/b").dir_name(), "a_b");
    }
}
