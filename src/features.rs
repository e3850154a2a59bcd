//! The five pharmacophoric feature classes USRCAT measures, and an atom-typing matcher that
//! reproduces their SMARTS definitions directly on the molecular graph.
//!
//! Hydrogen counts and valences are totals: explicit hydrogen atoms count, as they do when the
//! SMARTS are matched against a hydrogen-complete molecule. Upper-case SMARTS symbols are
//! aliphatic-only; lower-case are aromatic-only.

use na_seq::Element;

use crate::{BondType, MolecularGraph, pipeline::FeatureMatcher};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FeaturePattern {
    /// Every non-hydrogen atom. All other subsets are drawn from this one.
    Heavy,
    Hydrophobic,
    Aromatic,
    /// Hydrogen-bond acceptor.
    Acceptor,
    /// Hydrogen-bond donor.
    Donor,
}

impl FeaturePattern {
    /// In descriptor order.
    pub const ALL: [Self; 5] = [
        Self::Heavy,
        Self::Hydrophobic,
        Self::Aromatic,
        Self::Acceptor,
        Self::Donor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Heavy => "heavy",
            Self::Hydrophobic => "hydrophobic",
            Self::Aromatic => "aromatic",
            Self::Acceptor => "acceptor",
            Self::Donor => "donor",
        }
    }

    /// The reference SMARTS definition. Handy when plugging in a toolkit with a SMARTS engine.
    pub fn smarts(self) -> &'static str {
        match self {
            Self::Heavy => "[!#1]",
            Self::Hydrophobic => "[#6+0!$(*~[#7,#8,F]),SH0+0v2,s+0,S^3,Cl+0,Br+0,I+0]",
            Self::Aromatic => "[a]",
            Self::Acceptor => {
                "[$([O,S;H1;v2]-[!$(*=[O,N,P,S])]),$([O,S;H0;v2]),$([O,S;-]),\
                 $([N&v3;H1,H2]-[!$(*=[O,N,P,S])]),$([N;v3;H0]),$([n,o,s;+0]),F]"
            }
            Self::Donor => "[N!H0v3,N!H0+v4,OH+0,SH+0,nH+0]",
        }
    }
}

/// Matches [`FeaturePattern`]s by atom typing rather than general substructure search.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomTypingMatcher;

impl FeatureMatcher for AtomTypingMatcher {
    fn match_pattern(&self, mol: &MolecularGraph, pattern: FeaturePattern) -> Vec<usize> {
        (0..mol.atom_count())
            .filter(|&i| atom_matches(mol, i, pattern))
            .collect()
    }
}

pub fn atom_matches(mol: &MolecularGraph, i: usize, pattern: FeaturePattern) -> bool {
    match pattern {
        FeaturePattern::Heavy => !mol.atoms()[i].is_hydrogen(),
        FeaturePattern::Hydrophobic => is_hydrophobic(mol, i),
        FeaturePattern::Aromatic => mol.atoms()[i].aromatic,
        FeaturePattern::Acceptor => is_acceptor(mol, i),
        FeaturePattern::Donor => is_donor(mol, i),
    }
}

fn is_aliphatic_n_o_p_s(mol: &MolecularGraph, i: usize) -> bool {
    let atom = &mol.atoms()[i];
    !atom.aromatic
        && matches!(
            atom.element,
            Element::Oxygen | Element::Nitrogen | Element::Phosphorus | Element::Sulfur
        )
}

/// `-[!$(*=[O,N,P,S])]`: a single-bonded neighbour that has no double bond to an aliphatic
/// O, N, P or S.
fn has_plain_single_neighbor(mol: &MolecularGraph, i: usize) -> bool {
    mol.neighbors(i).iter().any(|&(n, b)| {
        mol.bonds()[b].bond_type == BondType::Single
            && !mol.neighbors(n).iter().any(|&(nn, bb)| {
                mol.bonds()[bb].bond_type == BondType::Double && is_aliphatic_n_o_p_s(mol, nn)
            })
    })
}

fn is_hydrophobic(mol: &MolecularGraph, i: usize) -> bool {
    let atom = &mol.atoms()[i];
    let neutral = atom.formal_charge == 0;

    match atom.element {
        Element::Carbon => {
            neutral
                && !mol.neighbors(i).iter().any(|&(n, _)| {
                    matches!(
                        mol.atoms()[n].element,
                        Element::Nitrogen | Element::Oxygen | Element::Fluorine
                    )
                })
        }
        Element::Sulfur if atom.aromatic => neutral,
        Element::Sulfur => {
            let sh0_v2 = neutral && mol.total_hydrogens(i) == 0 && mol.valence(i) == 2;
            // S^3: only single bonds.
            let sp3 = mol
                .neighbors(i)
                .iter()
                .all(|&(_, b)| mol.bonds()[b].bond_type == BondType::Single);
            sh0_v2 || sp3
        }
        Element::Chlorine | Element::Bromine | Element::Iodine => neutral,
        _ => false,
    }
}

fn is_acceptor(mol: &MolecularGraph, i: usize) -> bool {
    let atom = &mol.atoms()[i];
    let h = mol.total_hydrogens(i);
    let v = mol.valence(i);

    match atom.element {
        Element::Oxygen | Element::Sulfur | Element::Nitrogen if atom.aromatic => {
            atom.formal_charge == 0
        }
        Element::Oxygen | Element::Sulfur => {
            (h == 1 && v == 2 && has_plain_single_neighbor(mol, i))
                || (h == 0 && v == 2)
                || atom.formal_charge == -1
        }
        Element::Nitrogen => {
            v == 3 && ((matches!(h, 1 | 2) && has_plain_single_neighbor(mol, i)) || h == 0)
        }
        Element::Fluorine => !atom.aromatic,
        _ => false,
    }
}

fn is_donor(mol: &MolecularGraph, i: usize) -> bool {
    let atom = &mol.atoms()[i];
    let h = mol.total_hydrogens(i);
    let neutral = atom.formal_charge == 0;

    match atom.element {
        Element::Nitrogen if atom.aromatic => h == 1 && neutral,
        Element::Nitrogen => {
            let v = mol.valence(i);
            h > 0 && (v == 3 || (atom.formal_charge == 1 && v == 4))
        }
        Element::Oxygen | Element::Sulfur if !atom.aromatic => h == 1 && neutral,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::{add_hydrogens, parse_smiles};

    fn matches_for(smiles: &str, pattern: FeaturePattern) -> Vec<usize> {
        let mol = add_hydrogens(parse_smiles(smiles).unwrap());
        AtomTypingMatcher.match_pattern(&mol, pattern)
    }

    #[test]
    fn heavy_is_every_non_hydrogen() {
        assert_eq!(matches_for("CCO", FeaturePattern::Heavy), [0, 1, 2]);
    }

    #[test]
    fn ethanol_features() {
        // C0 is hydrophobic; C1 touches O.
        assert_eq!(matches_for("CCO", FeaturePattern::Hydrophobic), [0]);
        assert!(matches_for("CCO", FeaturePattern::Aromatic).is_empty());
        assert_eq!(matches_for("CCO", FeaturePattern::Acceptor), [2]);
        assert_eq!(matches_for("CCO", FeaturePattern::Donor), [2]);
    }

    #[test]
    fn pyridine_and_pyrrole() {
        assert_eq!(matches_for("n1ccccc1", FeaturePattern::Aromatic).len(), 6);
        assert_eq!(matches_for("n1ccccc1", FeaturePattern::Acceptor), [0]);
        assert!(matches_for("n1ccccc1", FeaturePattern::Donor).is_empty());

        assert_eq!(matches_for("c1cc[nH]c1", FeaturePattern::Donor), [3]);
    }

    #[test]
    fn amide_and_amine() {
        // Acetamide: carbonyl O accepts; the NH2 donates, and also matches the acceptor SMARTS
        // through its explicit hydrogens.
        let acc = matches_for("CC(=O)N", FeaturePattern::Acceptor);
        assert!(acc.contains(&2));
        assert_eq!(matches_for("CC(=O)N", FeaturePattern::Donor), [3]);

        // Trimethylamine.
        assert_eq!(matches_for("CN(C)C", FeaturePattern::Acceptor), [1]);
        assert!(matches_for("CN(C)C", FeaturePattern::Donor).is_empty());

        // Ammonium donates.
        assert_eq!(matches_for("C[NH3+]", FeaturePattern::Donor), [1]);
    }

    #[test]
    fn halogens_and_sulfur() {
        assert_eq!(matches_for("CCl", FeaturePattern::Hydrophobic), [0, 1]);
        assert_eq!(matches_for("CF", FeaturePattern::Acceptor), [1]);
        // Thioether S is hydrophobic and an acceptor.
        assert!(matches_for("CSC", FeaturePattern::Hydrophobic).contains(&1));
        assert!(matches_for("CSC", FeaturePattern::Acceptor).contains(&1));
        assert_eq!(matches_for("CS", FeaturePattern::Donor), [1]);
    }

    #[test]
    fn subsets_are_within_heavy() {
        for smiles in ["CC(=O)Nc1ccc(O)cc1", "Cn1cnc2c1c(=O)n(C)c(=O)n2C", "OCC[NH3+]"] {
            let heavy = matches_for(smiles, FeaturePattern::Heavy);
            for pattern in &FeaturePattern::ALL[1..] {
                for i in matches_for(smiles, *pattern) {
                    assert!(heavy.contains(&i), "{smiles}: {pattern:?} atom {i}");
                }
            }
        }
    }
}
