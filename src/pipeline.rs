//! Per-record processing: SMILES to graph, conformers, scalar and shape descriptors, and one
//! all-or-nothing commit to the output sinks.
//!
//! The chemistry is delegated to four collaborators behind traits. The built-in implementations
//! live in [`crate::smiles`], [`crate::embed`], [`crate::properties`] and [`crate::features`];
//! a binding to a full cheminformatics toolkit can replace any of them.

use std::{fmt, path::Path};

use tracing::{debug, info, warn};

use crate::{
    Conformer, MolecularGraph,
    config::{EmbedParams, ExtractorConfig, NUM_CONFORMERS},
    error::{Error, Result},
    features::FeaturePattern,
    properties::ScalarProperties,
    record::{MoleculeRecord, RecordReader},
    scheduler::RunStats,
    shape::{FeatureSubsets, usrcat_descriptor},
    sinks::{MoleculeOutput, OutputSinks},
};

pub trait MoleculeParser: Send + Sync {
    fn parse(&self, smiles: &str) -> Result<MolecularGraph>;

    /// Makes every hydrogen an explicit atom.
    fn add_hydrogens(&self, mol: MolecularGraph) -> MolecularGraph;
}

pub trait ConformerEmbedder: Send + Sync {
    /// May return fewer than `count` conformers, including none.
    fn embed(
        &self,
        mol: &MolecularGraph,
        count: usize,
        params: &EmbedParams,
    ) -> Result<Vec<Conformer>>;
}

pub trait PropertyCalculator: Send + Sync {
    fn compute(&self, mol: &MolecularGraph) -> Result<ScalarProperties>;
}

pub trait FeatureMatcher: Send + Sync {
    /// Indices of matching atoms, ascending.
    fn match_pattern(&self, mol: &MolecularGraph, pattern: FeaturePattern) -> Vec<usize>;
}

/// Shared, read-only handles to the collaborators. Every worker uses the same instances.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub parser: &'a dyn MoleculeParser,
    pub embedder: &'a dyn ConformerEmbedder,
    pub properties: &'a dyn PropertyCalculator,
    pub features: &'a dyn FeatureMatcher,
}

/// Why a record produced no output. None of these stop the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The SMILES didn't parse.
    Parse(String),
    /// The embedder produced fewer conformers than required.
    Embedding { produced: usize, required: usize },
    /// A collaborator returned an error after parsing.
    Collaborator(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "unparseable SMILES: {e}"),
            Self::Embedding { produced, required } => {
                write!(f, "{produced} of {required} conformers embedded")
            }
            Self::Collaborator(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accepted { conformers: usize },
    Skipped(SkipReason),
}

pub struct MoleculePipeline<'a> {
    collaborators: Collaborators<'a>,
    params: &'a EmbedParams,
    extractor: &'a ExtractorConfig,
    sinks: &'a OutputSinks,
}

impl<'a> MoleculePipeline<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        params: &'a EmbedParams,
        extractor: &'a ExtractorConfig,
        sinks: &'a OutputSinks,
    ) -> Self {
        Self {
            collaborators,
            params,
            extractor,
            sinks,
        }
    }

    /// Computes everything a record contributes, without touching the sinks.
    pub fn prepare(
        &self,
        record: &MoleculeRecord,
    ) -> std::result::Result<MoleculeOutput, SkipReason> {
        let c = &self.collaborators;
        let required = NUM_CONFORMERS;

        let mol = match c.parser.parse(&record.smiles) {
            Ok(m) => m,
            Err(Error::Smiles(e)) => return Err(SkipReason::Parse(e.to_string())),
            Err(e) => return Err(SkipReason::Collaborator(e.to_string())),
        };
        let mut mol = c.parser.add_hydrogens(mol);
        mol.ident = record.identifier.clone();

        let mut conformers = c
            .embedder
            .embed(&mol, required, self.params)
            .map_err(|e| SkipReason::Collaborator(e.to_string()))?;

        if conformers.len() < required {
            return Err(SkipReason::Embedding {
                produced: conformers.len(),
                required,
            });
        }
        conformers.truncate(required);

        let props = c
            .properties
            .compute(&mol)
            .map_err(|e| SkipReason::Collaborator(e.to_string()))?;

        let subsets = FeatureSubsets::match_all(&mol, c.features);
        debug!(
            "{} features: {}",
            record.identifier,
            FeaturePattern::ALL
                .iter()
                .zip(&subsets.0)
                .map(|(p, atoms)| format!("{} {}", p.name(), atoms.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let descriptors: Vec<_> = conformers
            .iter()
            .map(|conf| usrcat_descriptor(&subsets, conf))
            .collect();

        MoleculeOutput::render(
            &record.identifier,
            &record.smiles,
            &mol,
            &conformers,
            &props,
            &descriptors,
        )
        .map_err(|e| SkipReason::Collaborator(format!("Unable to render output: {e}")))
    }

    /// Processes one record. Only a sink failure is an error.
    pub fn process_record(&self, record: &MoleculeRecord) -> Result<Outcome> {
        match self.prepare(record) {
            Ok(out) => {
                self.sinks.commit(&out)?;
                info!(
                    "{} conformers of {} : {} generated",
                    NUM_CONFORMERS, record.identifier, record.smiles
                );
                Ok(Outcome::Accepted {
                    conformers: NUM_CONFORMERS,
                })
            }
            Err(reason) => {
                match &reason {
                    SkipReason::Collaborator(_) => {
                        warn!("Skipping {} ({}): {reason}", record.identifier, record.smiles)
                    }
                    _ => debug!("Skipping {} ({}): {reason}", record.identifier, record.smiles),
                }
                Ok(Outcome::Skipped(reason))
            }
        }
    }

    /// Processes every record of one file, in order. An unreadable file is logged and counted,
    /// not fatal.
    pub fn process_file(&self, path: &Path, stats: &mut RunStats) -> Result<()> {
        stats.files += 1;

        let mut reader = match RecordReader::open(path, self.extractor) {
            Ok(r) => r,
            Err(e) => {
                warn!("Unable to open {}: {e}", path.display());
                stats.unreadable_files += 1;
                return Ok(());
            }
        };

        for record in reader.by_ref() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!("Error reading {}: {e}", path.display());
                    stats.unreadable_files += 1;
                    break;
                }
            };

            let outcome = self.process_record(&record)?;
            stats.record(&outcome);
        }

        stats.skipped_malformed += reader.rejected();
        Ok(())
    }
}
