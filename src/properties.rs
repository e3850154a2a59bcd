//! Per-molecule scalar descriptors: 4 floats and 5 small integers, in the fixed order they are
//! written to the binary property streams.
//!
//! The built-in calculator uses atom-contribution models: monoisotopic weight, a simplified
//! Wildman-Crippen logP, Ertl TPSA (N and O only), and Labute's approximate surface area. These
//! track the toolkit values closely for drug-like molecules, but are not bit-identical to any of
//! them.

use std::{borrow::Cow, f64::consts::PI};

use na_seq::Element;

use crate::{
    BondType, MolecularGraph,
    error::{Error, Result},
    features::{AtomTypingMatcher, FeaturePattern},
    pipeline::{FeatureMatcher, PropertyCalculator},
    smiles::add_hydrogens,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScalarProperties {
    /// Monoisotopic, Da.
    pub mol_weight: f32,
    pub logp: f32,
    /// Topological polar surface area, Å².
    pub tpsa: f32,
    /// Labute approximate surface area, Å².
    pub asa: f32,
    pub heavy_atoms: i16,
    pub h_bond_donors: i16,
    pub h_bond_acceptors: i16,
    pub rotatable_bonds: i16,
    pub rings: i16,
}

impl ScalarProperties {
    pub fn float_values(&self) -> [f32; 4] {
        [self.mol_weight, self.logp, self.tpsa, self.asa]
    }

    pub fn int_values(&self) -> [i16; 5] {
        [
            self.heavy_atoms,
            self.h_bond_donors,
            self.h_bond_acceptors,
            self.rotatable_bonds,
            self.rings,
        ]
    }
}

fn monoisotopic_mass(el: &Element) -> Option<f64> {
    Some(match el {
        Element::Hydrogen => 1.007_825_032,
        Element::Carbon => 12.,
        Element::Nitrogen => 14.003_074_005,
        Element::Oxygen => 15.994_914_620,
        Element::Fluorine => 18.998_403_220,
        Element::Phosphorus => 30.973_761_630,
        Element::Sulfur => 31.972_071_000,
        Element::Chlorine => 34.968_852_680,
        Element::Bromine => 78.918_337_100,
        Element::Iodine => 126.904_473_000,
        _ => return None,
    })
}

/// Bond radius, Å. The Labute surface area uses it as the atomic sphere radius too.
fn labute_radius(el: &Element) -> Option<f64> {
    Some(match el {
        Element::Hydrogen => 0.23,
        Element::Carbon => 0.77,
        Element::Nitrogen => 0.70,
        Element::Oxygen => 0.66,
        Element::Fluorine => 0.611,
        Element::Phosphorus => 1.10,
        Element::Sulfur => 1.04,
        Element::Chlorine => 0.997,
        Element::Bromine => 1.142,
        Element::Iodine => 1.333,
        _ => return None,
    })
}

fn unsupported(mol: &MolecularGraph, i: usize) -> Error {
    Error::Descriptor(format!(
        "no parameters for element {} (atom {i})",
        mol.atoms()[i].element.to_letter()
    ))
}

/// Exact mass. An isotope label replaces the element's mass with its mass number.
pub fn exact_mol_weight(mol: &MolecularGraph) -> Result<f64> {
    let h_mass = monoisotopic_mass(&Element::Hydrogen).unwrap_or_default();
    let mut total = 0.;

    for (i, atom) in mol.atoms().iter().enumerate() {
        let mass = match atom.isotope {
            Some(iso) => iso as f64,
            None => monoisotopic_mass(&atom.element).ok_or_else(|| unsupported(mol, i))?,
        };
        total += mass + atom.implicit_hydrogens as f64 * h_mass;
    }
    Ok(total)
}

/// Atom-contribution logP. Expects explicit hydrogens.
pub fn crippen_logp(mol: &MolecularGraph) -> f64 {
    let ring_bonds = mol.ring_bonds();
    let mut logp = 0.;

    for (i, atom) in mol.atoms().iter().enumerate() {
        let neighbors = mol.neighbors(i);
        let has_double = mol.has_bond_of_type(i, BondType::Double);
        let in_ring = neighbors.iter().any(|(_, b)| ring_bonds[*b]);
        let hetero_neighbor = neighbors.iter().any(|(n, _)| {
            !matches!(
                mol.atoms()[*n].element,
                Element::Carbon | Element::Hydrogen
            )
        });

        logp += match atom.element {
            Element::Hydrogen => {
                let on_carbon = neighbors
                    .iter()
                    .any(|(n, _)| matches!(mol.atoms()[*n].element, Element::Carbon));
                if on_carbon { 0.123 } else { -0.2677 }
            }
            Element::Carbon => {
                if atom.aromatic {
                    if hetero_neighbor { -0.14 } else { 0.296 }
                } else if has_double {
                    if hetero_neighbor { -0.03 } else { 0.08 }
                } else if in_ring || mol.heavy_degree(i) <= 2 {
                    0.1441
                } else if mol.heavy_degree(i) == 3 {
                    0.
                } else {
                    -0.04
                }
            }
            Element::Nitrogen => {
                if atom.aromatic {
                    -0.3187
                } else if atom.formal_charge > 0 {
                    -1.019
                } else if has_double {
                    -0.5262
                } else {
                    -0.4458
                }
            }
            Element::Oxygen => {
                if atom.formal_charge < 0 {
                    -1.189
                } else if has_double {
                    -0.3339
                } else if mol.heavy_degree(i) >= 2 {
                    -0.2893
                } else {
                    -0.3567
                }
            }
            Element::Fluorine => 0.4118,
            Element::Phosphorus => 0.2836,
            Element::Sulfur => {
                if has_double {
                    -0.1084
                } else if atom.formal_charge != 0 {
                    -0.5188
                } else {
                    0.6237
                }
            }
            Element::Chlorine => 0.6895,
            Element::Bromine => 0.8813,
            Element::Iodine => 1.05,
            _ => 0.,
        };
    }
    logp
}

/// Ertl TPSA from nitrogen and oxygen fragment contributions. Expects explicit hydrogens.
pub fn tpsa(mol: &MolecularGraph) -> f64 {
    let mut area = 0.;

    for (i, atom) in mol.atoms().iter().enumerate() {
        let h = mol.total_hydrogens(i);
        let degree = mol.heavy_degree(i);
        let has_double = mol.has_bond_of_type(i, BondType::Double);
        let has_triple = mol.has_bond_of_type(i, BondType::Triple);

        area += match atom.element {
            Element::Nitrogen => {
                if atom.formal_charge > 0 {
                    match h {
                        0 => {
                            if degree == 4 {
                                0.
                            } else {
                                3.01
                            }
                        }
                        1 => 4.44,
                        2 => 16.61,
                        _ => 27.64,
                    }
                } else if atom.aromatic {
                    if h >= 1 { 15.79 } else { 12.89 }
                } else if has_triple {
                    23.79
                } else {
                    match (degree, h, has_double) {
                        (1, 2, _) => 26.02,
                        (1, 1, true) => 23.85,
                        (2, 1, false) => 12.03,
                        (2, 0, true) => 12.36,
                        (3, 0, false) => 3.24,
                        (3, 0, true) => 11.68,
                        _ => {
                            if h >= 2 {
                                26.02
                            } else if h == 1 {
                                12.03
                            } else {
                                3.24
                            }
                        }
                    }
                }
            }
            Element::Oxygen => {
                if atom.formal_charge < 0 {
                    23.06
                } else if atom.aromatic {
                    13.14
                } else if h >= 1 {
                    20.23
                } else if has_double {
                    17.07
                } else {
                    9.23
                }
            }
            _ => 0.,
        };
    }
    area
}

/// Overlap of sphere `j` with sphere `i`, at separation `d`.
fn labute_overlap(ri: f64, rj: f64, d: f64) -> f64 {
    rj * rj - (ri - d) * (ri - d) / d
}

/// Labute's approximate surface area, summed over heavy atoms with their hydrogens folded in.
/// Hydrogens may be implicit or explicit.
pub fn labute_asa(mol: &MolecularGraph) -> Result<f64> {
    let r_h = labute_radius(&Element::Hydrogen).unwrap_or_default();
    let mut area = 0.;

    let mut overlap = vec![0.; mol.atom_count()];
    let mut radii = vec![0.; mol.atom_count()];

    for (i, atom) in mol.atoms().iter().enumerate() {
        let r = labute_radius(&atom.element).ok_or_else(|| unsupported(mol, i))?;
        radii[i] = r;
        if atom.is_hydrogen() {
            continue;
        }

        // Each hydrogen sits at the full bond distance from its heavy atom.
        let h_count = mol.total_hydrogens(i) as f64;
        let d = r + r_h;
        overlap[i] += h_count * labute_overlap(r, r_h, d);
        area += h_count * PI * r_h * (4. * r_h - labute_overlap(r_h, r, d));
    }

    // Hydrogens not attached to a heavy atom, e.g. H2, count as free spheres.
    for (i, atom) in mol.atoms().iter().enumerate() {
        if atom.is_hydrogen() && mol.heavy_degree(i) == 0 {
            area += 4. * PI * r_h * r_h;
        }
    }

    for bond in mol.bonds() {
        let (a, b) = (bond.atom_0, bond.atom_1);
        if mol.atoms()[a].is_hydrogen() || mol.atoms()[b].is_hydrogen() {
            continue;
        }

        let (ri, rj) = (radii[a], radii[b]);
        let correction = match bond.bond_type {
            BondType::Single => 0.,
            BondType::Aromatic => 0.1,
            BondType::Double => 0.2,
            BondType::Triple => 0.3,
        };
        let d = (ri + rj - correction).max((ri - rj).abs()).min(ri + rj);

        overlap[a] += labute_overlap(ri, rj, d);
        overlap[b] += labute_overlap(rj, ri, d);
    }

    for (i, atom) in mol.atoms().iter().enumerate() {
        if !atom.is_hydrogen() {
            let r = radii[i];
            area += PI * r * (4. * r - overlap[i]);
        }
    }

    Ok(area)
}

/// Single, acyclic bonds between two atoms that each have another heavy neighbour, excluding
/// bonds next to a triple bond.
pub fn rotatable_bond_count(mol: &MolecularGraph) -> usize {
    let ring_bonds = mol.ring_bonds();

    mol.bonds()
        .iter()
        .enumerate()
        .filter(|(i, b)| {
            b.bond_type == BondType::Single
                && !ring_bonds[*i]
                && [b.atom_0, b.atom_1].iter().all(|&a| {
                    !mol.atoms()[a].is_hydrogen()
                        && mol.heavy_degree(a) > 1
                        && !mol.has_bond_of_type(a, BondType::Triple)
                })
        })
        .count()
}

/// Cyclomatic number; equals the size of the smallest set of smallest rings.
pub fn ring_count(mol: &MolecularGraph) -> usize {
    (mol.bonds().len() + mol.component_count()).saturating_sub(mol.atom_count())
}

fn to_i16(n: usize) -> i16 {
    n.min(i16::MAX as usize) as i16
}

/// The built-in [`PropertyCalculator`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicPropertyCalculator;

impl PropertyCalculator for BasicPropertyCalculator {
    fn compute(&self, mol: &MolecularGraph) -> Result<ScalarProperties> {
        let mol = if mol.atoms().iter().any(|a| a.implicit_hydrogens > 0) {
            Cow::Owned(add_hydrogens(mol.clone()))
        } else {
            Cow::Borrowed(mol)
        };

        let matcher = AtomTypingMatcher;
        let donors = matcher.match_pattern(&mol, FeaturePattern::Donor).len();
        let acceptors = matcher.match_pattern(&mol, FeaturePattern::Acceptor).len();

        Ok(ScalarProperties {
            mol_weight: exact_mol_weight(&mol)? as f32,
            logp: crippen_logp(&mol) as f32,
            tpsa: tpsa(&mol) as f32,
            asa: labute_asa(&mol)? as f32,
            heavy_atoms: to_i16(mol.heavy_atom_count()),
            h_bond_donors: to_i16(donors),
            h_bond_acceptors: to_i16(acceptors),
            rotatable_bonds: to_i16(rotatable_bond_count(&mol)),
            rings: to_i16(ring_count(&mol)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn props(smiles: &str) -> ScalarProperties {
        let mol = add_hydrogens(parse_smiles(smiles).unwrap());
        BasicPropertyCalculator.compute(&mol).unwrap()
    }

    #[test]
    fn ethanol() {
        let p = props("CCO");
        assert!((p.mol_weight - 46.0419).abs() < 1e-3, "mw={}", p.mol_weight);
        assert!((p.tpsa - 20.23).abs() < 1e-4);
        assert_eq!(p.heavy_atoms, 3);
        assert_eq!(p.h_bond_donors, 1);
        assert_eq!(p.h_bond_acceptors, 1);
        assert_eq!(p.rotatable_bonds, 0);
        assert_eq!(p.rings, 0);
        assert!((p.asa - 22.7238).abs() < 1e-3, "asa={}", p.asa);
    }

    #[test]
    fn implicit_hydrogens_give_the_same_weight() {
        let implicit = parse_smiles("CCO").unwrap();
        let p = BasicPropertyCalculator.compute(&implicit).unwrap();
        assert_eq!(p, props("CCO"));
    }

    #[test]
    fn ring_counts() {
        assert_eq!(props("c1ccccc1").rings, 1);
        assert_eq!(props("c1ccc2ccccc2c1").rings, 2);
        assert_eq!(props("C1CC1.C1CC1").rings, 2);
    }

    #[test]
    fn rotatable_bonds() {
        assert_eq!(props("CCCC").rotatable_bonds, 1);
        // Ring bonds and the bond next to the alkyne don't count.
        assert_eq!(props("c1ccccc1CC").rotatable_bonds, 1);
        assert_eq!(props("CC#CC").rotatable_bonds, 0);
    }

    #[test]
    fn logp_orders_sensibly() {
        assert!(props("CCCCCC").logp > props("CCO").logp);
        assert!(props("c1ccccc1Cl").logp > props("c1ccccc1O").logp);
    }

    #[test]
    fn labute_asa_values() {
        let asa = |smiles: &str| labute_asa(&add_hydrogens(parse_smiles(smiles).unwrap())).unwrap();
        assert!((asa("C") - 10.1096).abs() < 1e-3);
        assert!((asa("c1ccccc1") - 40.5305).abs() < 1e-3);

        // Implicit hydrogens fold in the same way as explicit ones.
        let implicit = labute_asa(&parse_smiles("CC(=O)Nc1ccc(O)cc1").unwrap()).unwrap();
        assert!((implicit - asa("CC(=O)Nc1ccc(O)cc1")).abs() < 1e-9);
    }

    #[test]
    fn aspirin_tpsa() {
        // Reference value 63.6 Å².
        let t = props("CC(=O)Oc1ccccc1C(=O)O").tpsa;
        assert!((t - 63.6).abs() < 0.1, "tpsa={t}");
    }
}
