//! Conformer generation, scalar descriptors, and USRCAT shape descriptors for large batches of
//! ligands extracted from docking output (e.g. PDBQT files that carry `Compound:` and `SMILES:`
//! remarks).
//!
//! The shape-descriptor computation ([`shape`]) and the parallel batch driver ([`scheduler`],
//! [`pipeline`]) are the core. Parsing, embedding, scalar descriptors and feature matching sit
//! behind traits in [`pipeline`], with lightweight built-in implementations in [`smiles`],
//! [`embed`], [`properties`] and [`features`].

pub mod config;
pub mod embed;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod properties;
pub mod record;
pub mod scheduler;
pub mod sdf;
pub mod shape;
pub mod sinks;
pub mod smiles;

use std::{
    io::{self, ErrorKind},
    str::FromStr,
};

pub use config::{EmbedParams, ExtractorConfig, RunConfig};
pub use error::{Error, Result};
pub use features::FeaturePattern;
use lin_alg::f64::Vec3;
use na_seq::Element;
pub use pipeline::{Collaborators, MoleculePipeline, Outcome, SkipReason};
pub use properties::ScalarProperties;
pub use record::{MoleculeRecord, RecordReader};
pub use scheduler::{RunStats, WorkChunk};
pub use shape::ShapeDescriptor;
pub use sinks::{MoleculeOutput, OutputPaths, OutputSinks};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BondType {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondType {
    /// Contribution to atom valence. Aromatic bonds count as 1.5.
    pub fn order(self) -> f64 {
        match self {
            Self::Single => 1.,
            Self::Double => 2.,
            Self::Triple => 3.,
            Self::Aromatic => 1.5,
        }
    }

    /// The bond-type column of an MDL V2000 bond line.
    pub fn to_str_sdf(self) -> &'static str {
        match self {
            Self::Single => "1",
            Self::Double => "2",
            Self::Triple => "3",
            Self::Aromatic => "4",
        }
    }
}

impl FromStr for BondType {
    type Err = io::Error;

    fn from_str(s: &str) -> io::Result<Self> {
        match s.trim() {
            "1" => Ok(Self::Single),
            "2" => Ok(Self::Double),
            "3" => Ok(Self::Triple),
            "4" => Ok(Self::Aromatic),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unsupported bond type: {s}"),
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AtomGeneric {
    pub element: Element,
    pub formal_charge: i8,
    pub aromatic: bool,
    /// Hydrogens carried by the atom without being graph nodes. Either stated in a bracket
    /// atom, or implied by the default valence. Zero after explicit hydrogens are added.
    pub implicit_hydrogens: u8,
    pub isotope: Option<u16>,
}

impl AtomGeneric {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            formal_charge: 0,
            aromatic: false,
            implicit_hydrogens: 0,
            isotope: None,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        matches!(self.element, Element::Hydrogen)
    }
}

#[derive(Clone, Debug)]
pub struct BondGeneric {
    pub bond_type: BondType,
    /// 0-based atom indices.
    pub atom_0: usize,
    pub atom_1: usize,
}

/// Atoms and bonds of one molecule, with an adjacency list kept in sync.
#[derive(Clone, Debug, Default)]
pub struct MolecularGraph {
    pub ident: String,
    atoms: Vec<AtomGeneric>,
    bonds: Vec<BondGeneric>,
    /// (neighbour atom, bond index), per atom.
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl MolecularGraph {
    pub fn new(atoms: Vec<AtomGeneric>, bonds: Vec<BondGeneric>) -> Self {
        let mut result = Self {
            ident: String::new(),
            adjacency: vec![Vec::new(); atoms.len()],
            atoms,
            bonds: Vec::with_capacity(bonds.len()),
        };

        for bond in bonds {
            result.add_bond(bond.atom_0, bond.atom_1, bond.bond_type);
        }
        result
    }

    pub fn atoms(&self) -> &[AtomGeneric] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[BondGeneric] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    /// Returns the index of the new atom.
    pub fn add_atom(&mut self, atom: AtomGeneric) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    /// Indices out of range are ignored; the caller guarantees both atoms exist.
    pub fn add_bond(&mut self, atom_0: usize, atom_1: usize, bond_type: BondType) {
        if atom_0 >= self.atoms.len() || atom_1 >= self.atoms.len() || atom_0 == atom_1 {
            return;
        }
        let i = self.bonds.len();
        self.bonds.push(BondGeneric {
            bond_type,
            atom_0,
            atom_1,
        });
        self.adjacency[atom_0].push((atom_1, i));
        self.adjacency[atom_1].push((atom_0, i));
    }

    pub fn atom_mut(&mut self, i: usize) -> Option<&mut AtomGeneric> {
        self.atoms.get_mut(i)
    }

    /// (neighbour atom, bond index) pairs.
    pub fn neighbors(&self, i: usize) -> &[(usize, usize)] {
        &self.adjacency[i]
    }

    pub fn degree(&self, i: usize) -> usize {
        self.adjacency[i].len()
    }

    pub fn heavy_degree(&self, i: usize) -> usize {
        self.adjacency[i]
            .iter()
            .filter(|(n, _)| !self.atoms[*n].is_hydrogen())
            .count()
    }

    /// Implicit hydrogens plus hydrogen neighbours.
    pub fn total_hydrogens(&self, i: usize) -> usize {
        let explicit = self.adjacency[i]
            .iter()
            .filter(|(n, _)| self.atoms[*n].is_hydrogen())
            .count();
        self.atoms[i].implicit_hydrogens as usize + explicit
    }

    /// Sum of bond orders, including hydrogens. Aromatic bonds contribute 1.5; the result is
    /// rounded.
    pub fn valence(&self, i: usize) -> usize {
        let bonded: f64 = self.adjacency[i]
            .iter()
            .map(|(_, b)| self.bonds[*b].bond_type.order())
            .sum();
        bonded.round() as usize + self.atoms[i].implicit_hydrogens as usize
    }

    pub fn has_bond_of_type(&self, i: usize, bond_type: BondType) -> bool {
        self.adjacency[i]
            .iter()
            .any(|(_, b)| self.bonds[*b].bond_type == bond_type)
    }

    /// Number of connected components. An empty graph has none.
    pub fn component_count(&self) -> usize {
        let mut visited = vec![false; self.atoms.len()];
        let mut count = 0;

        for start in 0..self.atoms.len() {
            if visited[start] {
                continue;
            }
            count += 1;
            visited[start] = true;
            let mut stack = vec![start];
            while let Some(curr) = stack.pop() {
                for &(n, _) in &self.adjacency[curr] {
                    if !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        count
    }

    /// Flags each bond that lies on a ring, i.e. that is not a bridge of the graph.
    pub fn ring_bonds(&self) -> Vec<bool> {
        let n = self.atoms.len();
        let mut in_ring = vec![true; self.bonds.len()];
        let mut disc = vec![usize::MAX; n];
        let mut low = vec![0; n];
        let mut time = 0;

        // Iterative Tarjan bridge search. Stack entries: (atom, bond used to reach it, next
        // neighbour position).
        for root in 0..n {
            if disc[root] != usize::MAX {
                continue;
            }
            disc[root] = time;
            low[root] = time;
            time += 1;
            let mut stack = vec![(root, usize::MAX, 0usize)];

            while let Some(top) = stack.last_mut() {
                let (v, via) = (top.0, top.1);
                if top.2 < self.adjacency[v].len() {
                    let (w, b) = self.adjacency[v][top.2];
                    top.2 += 1;
                    if b == via {
                        continue;
                    }
                    if disc[w] == usize::MAX {
                        disc[w] = time;
                        low[w] = time;
                        time += 1;
                        stack.push((w, b, 0));
                    } else {
                        low[v] = low[v].min(disc[w]);
                    }
                } else {
                    stack.pop();
                    if let Some(&(parent, _, _)) = stack.last() {
                        low[parent] = low[parent].min(low[v]);
                        if low[v] > disc[parent] {
                            in_ring[via] = false;
                        }
                    }
                }
            }
        }
        in_ring
    }
}

/// One 3D coordinate assignment for every atom of a [`MolecularGraph`], in atom order. Å.
#[derive(Clone, Debug, Default)]
pub struct Conformer {
    pub posits: Vec<Vec3>,
}

impl Conformer {
    pub fn new(posits: Vec<Vec3>) -> Self {
        Self { posits }
    }
}
