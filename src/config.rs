//! Run configuration. Every field has a default, so a config file only needs to list the values
//! it overrides, e.g.
//!
//! ```toml
//! workers = 8
//!
//! [embed]
//! random_seed = 42
//!
//! [extractor]
//! blacklist = ["q"]
//! ```

use std::{fs, path::Path};

use serde::Deserialize;

use crate::error::Result;

/// Conformers the pipeline requests, and requires, per molecule.
pub const NUM_CONFORMERS: usize = 4;

/// Parameters passed to the embedding collaborator. The conformer count is fixed at
/// [`NUM_CONFORMERS`] and is not among them.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedParams {
    pub random_seed: u64,
    /// Embedding attempts per conformer.
    pub max_iterations: u32,
    /// Start from random coordinates, rather than a deterministic layout.
    pub use_random_coords: bool,
    /// Parallelism hint for the embedder's internal pool.
    pub num_threads: usize,
}

impl Default for EmbedParams {
    fn default() -> Self {
        Self {
            random_seed: 209,
            max_iterations: 3,
            use_random_coords: true,
            num_threads: 4,
        }
    }
}

/// Markers and filters for pulling records out of docking-output text.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub id_marker: String,
    pub smiles_marker: String,
    /// A SMILES string containing any of these is rejected.
    pub blacklist: Vec<char>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            id_marker: "Compound:".to_string(),
            smiles_marker: "SMILES:".to_string(),
            blacklist: vec!['q', 'r', 's'],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub workers: usize,
    /// Input file extension, without the dot.
    pub extension: String,
    pub embed: EmbedParams,
    pub extractor: ExtractorConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 30,
            extension: "pdbqt".to_string(),
            embed: EmbedParams::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
