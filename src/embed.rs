//! A small built-in conformer embedder: random starting coordinates, relaxed against distance
//! bounds derived from the bond graph.
//!
//! Bond lengths come from covalent radii, shortened for multiple bonds. 1-3 distances follow from
//! an ideal angle at the shared atom, picked from its bonding. All other pairs only get a minimum
//! separation. There are no torsion, chirality or planarity terms, so geometries are plausible
//! rather than refined.

use lin_alg::f64::Vec3;
use na_seq::Element;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{
    BondType, Conformer, MolecularGraph,
    config::EmbedParams,
    error::{Error, Result},
    pipeline::ConformerEmbedder,
};

/// Accepted deviation of each bonded distance from its target, Å.
const BOND_TOLERANCE: f64 = 0.1;
/// Relaxation sweeps per attempt.
const MAX_SWEEPS: usize = 600;
/// Non-bonded pairs are kept at least this multiple of their covalent-radius sum apart.
const NONBONDED_SCALE: f64 = 1.25;

fn covalent_radius(el: &Element) -> Option<f64> {
    Some(match el {
        Element::Hydrogen => 0.31,
        Element::Carbon => 0.76,
        Element::Nitrogen => 0.71,
        Element::Oxygen => 0.66,
        Element::Fluorine => 0.57,
        Element::Phosphorus => 1.07,
        Element::Sulfur => 1.05,
        Element::Chlorine => 1.02,
        Element::Bromine => 1.20,
        Element::Iodine => 1.39,
        _ => return None,
    })
}

fn bond_scale(bond_type: BondType) -> f64 {
    match bond_type {
        BondType::Single => 1.,
        BondType::Aromatic => 0.91,
        BondType::Double => 0.87,
        BondType::Triple => 0.78,
    }
}

/// Ideal bond angle at an atom, in radians.
fn ideal_angle(mol: &MolecularGraph, i: usize) -> f64 {
    let doubles = mol
        .neighbors(i)
        .iter()
        .filter(|(_, b)| mol.bonds()[*b].bond_type == BondType::Double)
        .count();

    let degrees: f64 = if mol.has_bond_of_type(i, BondType::Triple) || doubles >= 2 {
        180.
    } else if doubles == 1 || mol.atoms()[i].aromatic {
        120.
    } else {
        109.47
    };
    degrees.to_radians()
}

#[derive(Clone, Copy, Debug)]
struct Bound {
    i: usize,
    j: usize,
    lower: f64,
    upper: f64,
}

/// Distance bounds for one molecule. Bonds are listed last so they're the final correction applied
/// in each sweep.
#[derive(Debug)]
struct BoundsSet {
    atom_count: usize,
    bounds: Vec<Bound>,
    bond_count: usize,
}

impl BoundsSet {
    fn new(mol: &MolecularGraph) -> Result<Self> {
        let n = mol.atom_count();

        let mut radii = Vec::with_capacity(n);
        for (i, atom) in mol.atoms().iter().enumerate() {
            let r = covalent_radius(&atom.element).ok_or_else(|| {
                Error::Embedding(format!(
                    "No covalent radius for {} (atom {i})",
                    atom.element.to_letter()
                ))
            })?;
            radii.push(r);
        }

        // 0: unrelated, 1: bonded, 2: 1-3.
        let mut relation = vec![0u8; n * n];
        let mut bond_lens = vec![0.; n * n];

        let mut bonds = Vec::with_capacity(mol.bonds().len());
        for bond in mol.bonds() {
            let (i, j) = (bond.atom_0, bond.atom_1);
            let len = (radii[i] + radii[j]) * bond_scale(bond.bond_type);
            relation[i * n + j] = 1;
            relation[j * n + i] = 1;
            bond_lens[i * n + j] = len;
            bond_lens[j * n + i] = len;
            bonds.push(Bound {
                i,
                j,
                lower: len,
                upper: len,
            });
        }

        let mut bounds = Vec::new();
        for center in 0..n {
            let cos_theta = ideal_angle(mol, center).cos();
            let nbrs = mol.neighbors(center);

            for (a, &(i, _)) in nbrs.iter().enumerate() {
                for &(k, _) in &nbrs[a + 1..] {
                    if relation[i * n + k] != 0 {
                        continue;
                    }
                    let (d0, d1) = (bond_lens[i * n + center], bond_lens[k * n + center]);
                    let d = (d0 * d0 + d1 * d1 - 2. * d0 * d1 * cos_theta).sqrt();
                    relation[i * n + k] = 2;
                    relation[k * n + i] = 2;
                    bounds.push(Bound {
                        i,
                        j: k,
                        lower: d * 0.95,
                        upper: d * 1.05,
                    });
                }
            }
        }

        let mut nonbonded = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if relation[i * n + j] == 0 {
                    nonbonded.push(Bound {
                        i,
                        j,
                        lower: NONBONDED_SCALE * (radii[i] + radii[j]),
                        upper: f64::INFINITY,
                    });
                }
            }
        }

        nonbonded.append(&mut bounds);
        let bond_count = bonds.len();
        nonbonded.append(&mut bonds);

        Ok(Self {
            atom_count: n,
            bounds: nonbonded,
            bond_count,
        })
    }

    fn bonds(&self) -> &[Bound] {
        &self.bounds[self.bounds.len() - self.bond_count..]
    }

    /// One pass of pairwise corrections. Returns the largest violation seen.
    fn sweep(&self, posits: &mut [[f64; 3]], rng: &mut StdRng) -> f64 {
        let mut worst: f64 = 0.;

        for b in &self.bounds {
            let mut diff = [0.; 3];
            for k in 0..3 {
                diff[k] = posits[b.j][k] - posits[b.i][k];
            }
            let mut dist = (diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]).sqrt();

            if dist < 1e-8 {
                // Coincident atoms: separate along a random direction.
                diff = [
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ];
                dist = 1e-8;
            }

            let target = dist.clamp(b.lower, b.upper);
            let violation = (target - dist).abs();
            if violation < 1e-6 {
                continue;
            }
            worst = worst.max(violation);

            let len = (diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]).sqrt();
            let shift = (dist - target) / 2. / len;
            for k in 0..3 {
                posits[b.i][k] += diff[k] * shift;
                posits[b.j][k] -= diff[k] * shift;
            }
        }

        worst
    }

    fn bonds_ok(&self, posits: &[[f64; 3]]) -> bool {
        self.bonds().iter().all(|b| {
            let d: f64 = (0..3)
                .map(|k| (posits[b.j][k] - posits[b.i][k]).powi(2))
                .sum::<f64>()
                .sqrt();
            (d - b.lower).abs() <= BOND_TOLERANCE
        })
    }

    fn initial_posits(&self, random: bool, rng: &mut StdRng) -> Vec<[f64; 3]> {
        let half = 1.5 * (self.atom_count as f64).cbrt();

        (0..self.atom_count)
            .map(|i| {
                if random {
                    [
                        rng.gen_range(-half..half),
                        rng.gen_range(-half..half),
                        rng.gen_range(-half..half),
                    ]
                } else {
                    // Helix, with a little jitter so separate conformers differ.
                    let t = i as f64;
                    [
                        1.5 * t.cos() + rng.gen_range(-0.1..0.1),
                        1.5 * t.sin() + rng.gen_range(-0.1..0.1),
                        0.8 * t,
                    ]
                }
            })
            .collect()
    }

    fn embed_one(&self, seed: u64, params: &EmbedParams) -> Option<Conformer> {
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..params.max_iterations {
            let mut posits = self.initial_posits(params.use_random_coords, &mut rng);

            for _ in 0..MAX_SWEEPS {
                if self.sweep(&mut posits, &mut rng) < BOND_TOLERANCE / 10. {
                    break;
                }
            }

            if self.bonds_ok(&posits) {
                let posits = posits.iter().map(|p| Vec3::new(p[0], p[1], p[2])).collect();
                return Some(Conformer::new(posits));
            }
        }
        None
    }
}

/// The built-in [`ConformerEmbedder`]. Conformers of one molecule are embedded in parallel on a
/// dedicated thread pool; conformer `i` is seeded with `random_seed + i`, so output is
/// reproducible regardless of thread count.
#[derive(Debug)]
pub struct RandomCoordEmbedder {
    pool: rayon::ThreadPool,
}

impl RandomCoordEmbedder {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("embed-{i}"))
            .build()
            .map_err(|e| Error::Embedding(format!("Unable to build the embedding pool: {e}")))?;

        Ok(Self { pool })
    }
}

impl ConformerEmbedder for RandomCoordEmbedder {
    /// Returns fewer than `count` conformers when some fail every attempt.
    fn embed(
        &self,
        mol: &MolecularGraph,
        count: usize,
        params: &EmbedParams,
    ) -> Result<Vec<Conformer>> {
        if mol.atom_count() == 0 {
            return Ok(Vec::new());
        }
        let bounds = BoundsSet::new(mol)?;

        Ok(self.pool.install(|| {
            (0..count)
                .into_par_iter()
                .filter_map(|i| bounds.embed_one(params.random_seed.wrapping_add(i as u64), params))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NUM_CONFORMERS,
        smiles::{add_hydrogens, parse_smiles},
    };

    fn embed(smiles: &str, params: &EmbedParams) -> (MolecularGraph, Vec<Conformer>) {
        let mol = add_hydrogens(parse_smiles(smiles).unwrap());
        let embedder = RandomCoordEmbedder::new(params.num_threads).unwrap();
        let confs = embedder.embed(&mol, NUM_CONFORMERS, params).unwrap();
        (mol, confs)
    }

    fn dist(a: Vec3, b: Vec3) -> f64 {
        (a - b).magnitude()
    }

    #[test]
    fn ethanol_gets_four_conformers() {
        let (mol, confs) = embed("CCO", &EmbedParams::default());
        assert_eq!(confs.len(), 4);

        for conf in &confs {
            assert_eq!(conf.posits.len(), mol.atom_count());
            // C-C and C-O.
            assert!((dist(conf.posits[0], conf.posits[1]) - 1.52).abs() <= BOND_TOLERANCE);
            assert!((dist(conf.posits[1], conf.posits[2]) - 1.42).abs() <= BOND_TOLERANCE);
        }
    }

    #[test]
    fn deterministic_for_a_seed() {
        let params = EmbedParams::default();
        let (_, a) = embed("CC(=O)Nc1ccc(O)cc1", &params);
        let (_, b) = embed("CC(=O)Nc1ccc(O)cc1", &EmbedParams {
            num_threads: 1,
            ..params.clone()
        });

        assert_eq!(a.len(), NUM_CONFORMERS);
        assert_eq!(b.len(), NUM_CONFORMERS);
        for (ca, cb) in a.iter().zip(&b) {
            assert_eq!(ca.posits, cb.posits);
        }
        // Different seeds per conformer give different geometries.
        assert_ne!(a[0].posits, a[1].posits);
    }

    #[test]
    fn zero_attempts_gives_no_conformers() {
        let params = EmbedParams {
            max_iterations: 0,
            ..Default::default()
        };
        let (_, confs) = embed("CCO", &params);
        assert!(confs.is_empty());
    }

    #[test]
    fn deterministic_start_layout() {
        let params = EmbedParams {
            use_random_coords: false,
            ..Default::default()
        };
        let (_, confs) = embed("CCCC", &params);
        assert_eq!(confs.len(), 4);
    }

    #[test]
    fn benzene_ring_closes() {
        let (_, confs) = embed("c1ccccc1", &EmbedParams::default());
        assert!(!confs.is_empty());
        let p = &confs[0].posits;
        assert!((dist(p[5], p[0]) - 1.383).abs() <= BOND_TOLERANCE);
    }
}
