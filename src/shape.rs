//! USRCAT shape descriptors: Ultrafast Shape Recognition with CREDO Atom Types.
//!
//! For each conformer, distances from the atoms of five pharmacophoric subsets to four reference
//! points are summarised by their first three moments, giving 5 × 4 × 3 = 60 values. Layout is
//! subset-major, then reference point, then moment.
//!
//! Everything here is pure and allocation-light; nothing is shared between calls.

use lin_alg::f64::Vec3;

use crate::{Conformer, MolecularGraph, features::FeaturePattern, pipeline::FeatureMatcher};

pub const SUBSET_COUNT: usize = 5;
pub const REFERENCE_COUNT: usize = 4;
pub const MOMENT_COUNT: usize = 3;
pub const DESCRIPTOR_LEN: usize = SUBSET_COUNT * REFERENCE_COUNT * MOMENT_COUNT;

/// Equal weighting of the five subsets, for [`usrcat_similarity`].
pub const DEFAULT_WEIGHTS: [f64; SUBSET_COUNT] = [1.; SUBSET_COUNT];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReferencePoint {
    Centroid,
    /// The heavy atom closest to the centroid.
    Closest,
    /// The heavy atom farthest from the centroid.
    Farthest,
    /// The heavy atom farthest from [`Self::Farthest`].
    FarthestFromFarthest,
}

impl ReferencePoint {
    pub const ALL: [Self; REFERENCE_COUNT] = [
        Self::Centroid,
        Self::Closest,
        Self::Farthest,
        Self::FarthestFromFarthest,
    ];
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ShapeDescriptor(pub [f32; DESCRIPTOR_LEN]);

impl Default for ShapeDescriptor {
    fn default() -> Self {
        Self([0.; DESCRIPTOR_LEN])
    }
}

impl ShapeDescriptor {
    pub fn values(&self) -> &[f32; DESCRIPTOR_LEN] {
        &self.0
    }

    /// (mean, standard deviation, third-moment cube root) for one subset and reference point.
    pub fn subset_block(&self, subset: FeaturePattern, reference: ReferencePoint) -> [f32; 3] {
        let start = block_offset(subset_index(subset), reference as usize);
        [self.0[start], self.0[start + 1], self.0[start + 2]]
    }
}

fn subset_index(subset: FeaturePattern) -> usize {
    FeaturePattern::ALL
        .iter()
        .position(|p| *p == subset)
        .unwrap_or_default()
}

fn block_offset(subset: usize, reference: usize) -> usize {
    (subset * REFERENCE_COUNT + reference) * MOMENT_COUNT
}

/// Atom indices matching each [`FeaturePattern`], in descriptor order. Matched once per molecule
/// and reused for all of its conformers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureSubsets(pub [Vec<usize>; SUBSET_COUNT]);

impl FeatureSubsets {
    pub fn match_all(mol: &MolecularGraph, matcher: &dyn FeatureMatcher) -> Self {
        Self(FeaturePattern::ALL.map(|p| matcher.match_pattern(mol, p)))
    }

    /// The reference population.
    pub fn heavy(&self) -> &[usize] {
        &self.0[0]
    }
}

/// Mean, population standard deviation, and the signed cube root of the third central moment.
pub fn moments(values: &[f64]) -> [f64; 3] {
    match values {
        [] => [0.; 3],
        [v] => [*v, 0., 0.],
        [a, b] => [(a + b) / 2., (a - b).abs() / 2., 0.],
        _ => {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;

            let (mut m2, mut m3) = (0., 0.);
            for v in values {
                let dev = v - mean;
                m2 += dev * dev;
                m3 += dev * dev * dev;
            }

            [mean, (m2 / n).sqrt(), (m3 / n).cbrt()]
        }
    }
}

/// Centroid, closest, farthest and farthest-from-farthest, in that order. Ties go to the atom
/// listed first. `None` if there are no points.
pub fn reference_points(posits: &[Vec3]) -> Option<[Vec3; REFERENCE_COUNT]> {
    if posits.is_empty() {
        return None;
    }

    let n = posits.len() as f64;
    let (mut x, mut y, mut z) = (0., 0., 0.);
    for p in posits {
        x += p.x;
        y += p.y;
        z += p.z;
    }
    let centroid = Vec3::new(x / n, y / n, z / n);

    let mut closest = (posits[0], f64::INFINITY);
    let mut farthest = (posits[0], f64::NEG_INFINITY);
    for p in posits {
        let d = (*p - centroid).magnitude_squared();
        if d < closest.1 {
            closest = (*p, d);
        }
        if d > farthest.1 {
            farthest = (*p, d);
        }
    }

    let mut farthest_2 = (posits[0], f64::NEG_INFINITY);
    for p in posits {
        let d = (*p - farthest.0).magnitude_squared();
        if d > farthest_2.1 {
            farthest_2 = (*p, d);
        }
    }

    Some([centroid, closest.0, farthest.0, farthest_2.0])
}

/// The 60-value descriptor of one conformer. An empty heavy subset gives all zeros. Subset members
/// outside the heavy subset are measured directly; indices past the conformer's atoms are ignored.
pub fn usrcat_descriptor(subsets: &FeatureSubsets, conformer: &Conformer) -> ShapeDescriptor {
    let posits = &conformer.posits;

    let heavy: Vec<usize> = subsets
        .heavy()
        .iter()
        .copied()
        .filter(|&i| i < posits.len())
        .collect();
    let heavy_posits: Vec<Vec3> = heavy.iter().map(|&i| posits[i]).collect();

    let Some(refs) = reference_points(&heavy_posits) else {
        return ShapeDescriptor::default();
    };

    // Row per reference point, column per heavy atom.
    let table: Vec<Vec<f64>> = refs
        .iter()
        .map(|r| heavy_posits.iter().map(|p| (*p - *r).magnitude()).collect())
        .collect();

    // Atom index -> column in the table.
    let mut column = vec![None; posits.len()];
    for (col, &atom) in heavy.iter().enumerate() {
        if column[atom].is_none() {
            column[atom] = Some(col);
        }
    }

    let mut result = ShapeDescriptor::default();
    let mut dists = Vec::with_capacity(heavy.len());

    for (s, subset) in subsets.0.iter().enumerate() {
        for (r, ref_pt) in refs.iter().enumerate() {
            dists.clear();
            for &atom in subset {
                if atom >= posits.len() {
                    continue;
                }
                dists.push(match column[atom] {
                    Some(col) => table[r][col],
                    None => (posits[atom] - *ref_pt).magnitude(),
                });
            }

            let start = block_offset(s, r);
            for (k, m) in moments(&dists).into_iter().enumerate() {
                result.0[start + k] = m as f32;
            }
        }
    }

    result
}

/// USRCAT similarity in (0, 1]; 1 for identical descriptors. Each subset's 12 values contribute
/// their mean absolute difference, scaled by that subset's weight.
pub fn usrcat_similarity(
    a: &ShapeDescriptor,
    b: &ShapeDescriptor,
    weights: &[f64; SUBSET_COUNT],
) -> f64 {
    let block = REFERENCE_COUNT * MOMENT_COUNT;

    let dist: f64 = weights
        .iter()
        .enumerate()
        .map(|(s, w)| {
            let range = s * block..(s + 1) * block;
            let diff: f64 = a.0[range.clone()]
                .iter()
                .zip(&b.0[range])
                .map(|(x, y)| (*x as f64 - *y as f64).abs())
                .sum();
            w * diff / block as f64
        })
        .sum();

    1. / (1. + dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::AtomTypingMatcher,
        smiles::{add_hydrogens, parse_smiles},
    };

    const TOL: f64 = 1e-9;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).magnitude() < 1e-9
    }

    #[test]
    fn moments_small_n() {
        assert_eq!(moments(&[]), [0., 0., 0.]);
        assert_eq!(moments(&[2.5]), [2.5, 0., 0.]);
        assert_eq!(moments(&[1., 4.]), [2.5, 1.5, 0.]);
        assert_eq!(moments(&[4., 1.]), [2.5, 1.5, 0.]);
    }

    #[test]
    fn moments_skew_sign() {
        let [mean, std, third] = moments(&[1., 1., 1., 10.]);
        assert!((mean - 3.25).abs() < TOL);
        assert!((std - 15.1875_f64.sqrt()).abs() < TOL);
        assert!((third - 68.34375_f64.cbrt()).abs() < TOL);
        assert!(third > 0.);

        let [_, std, third] = moments(&[10., 10., 10., 1.]);
        assert!(std >= 0.);
        assert!(third < 0.);

        // Symmetric: no skew.
        let [_, _, third] = moments(&[1., 2., 3.]);
        assert!(third.abs() < TOL);
    }

    #[test]
    fn moments_tolerate_duplicates() {
        let [mean, std, third] = moments(&[2., 2., 2.]);
        assert_eq!((mean, std, third), (2., 0., 0.));
    }

    #[test]
    fn reference_points_are_order_independent() {
        let pts = vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(1.5, 0.2, 0.),
            Vec3::new(2.9, -0.4, 0.3),
            Vec3::new(4.7, 1.1, -0.2),
            Vec3::new(-1.2, 0.6, 0.9),
        ];
        let expected = reference_points(&pts).unwrap();

        let mut permuted = pts.clone();
        permuted.reverse();
        permuted.swap(0, 2);
        let got = reference_points(&permuted).unwrap();

        for (a, b) in expected.iter().zip(&got) {
            assert!(close(*a, *b), "{a:?} != {b:?}");
        }
    }

    #[test]
    fn reference_point_ties_go_to_first_atom() {
        // Square: every corner is equidistant from the centroid.
        let pts = [
            Vec3::new(1., 1., 0.),
            Vec3::new(-1., 1., 0.),
            Vec3::new(-1., -1., 0.),
            Vec3::new(1., -1., 0.),
        ];
        let [centroid, closest, farthest, farthest_2] = reference_points(&pts).unwrap();

        assert!(close(centroid, Vec3::new(0., 0., 0.)));
        assert!(close(closest, pts[0]));
        assert!(close(farthest, pts[0]));
        assert!(close(farthest_2, pts[2]));
    }

    #[test]
    fn empty_heavy_subset_is_all_zeros() {
        let conf = Conformer::new(vec![Vec3::new(1., 2., 3.)]);
        let desc = usrcat_descriptor(&FeatureSubsets::default(), &conf);
        assert_eq!(desc, ShapeDescriptor::default());
    }

    #[test]
    fn empty_subsets_give_zero_blocks() {
        // Linear triatomic: heavy = all, donors only the last atom, no aromatics.
        let conf = Conformer::new(vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(1., 0., 0.),
            Vec3::new(3., 0., 0.),
        ]);
        let subsets = FeatureSubsets([vec![0, 1, 2], vec![0, 1], vec![], vec![], vec![2]]);
        let desc = usrcat_descriptor(&subsets, &conf);

        assert_eq!(desc.values().len(), DESCRIPTOR_LEN);
        for r in ReferencePoint::ALL {
            assert_eq!(desc.subset_block(FeaturePattern::Aromatic, r), [0.; 3]);
            assert_eq!(desc.subset_block(FeaturePattern::Acceptor, r), [0.; 3]);
            assert_eq!(desc.subset_block(FeaturePattern::Donor, r)[1..], [0., 0.]);
        }

        // Centroid at 4/3; heavy distances to it are 4/3, 1/3, 5/3.
        let [mean, ..] = desc.subset_block(FeaturePattern::Heavy, ReferencePoint::Centroid);
        assert!((mean as f64 - 10. / 9.).abs() < 1e-6);

        // Hydrophobic pair against the farthest atom (index 2): distances 3 and 2.
        let block = desc.subset_block(FeaturePattern::Hydrophobic, ReferencePoint::Farthest);
        assert_eq!(block, [2.5, 0.5, 0.]);
    }

    #[test]
    fn members_outside_heavy_and_out_of_range() {
        let conf = Conformer::new(vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(2., 0., 0.),
            Vec3::new(1., 5., 0.),
        ]);
        // Atom 2 isn't heavy, and atom 9 doesn't exist.
        let subsets = FeatureSubsets([vec![0, 1], vec![2, 9], vec![], vec![], vec![]]);
        let desc = usrcat_descriptor(&subsets, &conf);

        let block = desc.subset_block(FeaturePattern::Hydrophobic, ReferencePoint::Centroid);
        assert_eq!(block, [5., 0., 0.]);
    }

    #[test]
    fn descriptor_from_molecule() {
        let mol = add_hydrogens(parse_smiles("CCO").unwrap());
        let mut posits = vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(1.52, 0., 0.),
            Vec3::new(2.0, 1.35, 0.),
        ];
        for i in 0..mol.atom_count() - 3 {
            posits.push(Vec3::new(i as f64 * 0.3, -1., 0.5));
        }
        let conf = Conformer::new(posits);

        let subsets = FeatureSubsets::match_all(&mol, &AtomTypingMatcher);
        let desc = usrcat_descriptor(&subsets, &conf);
        assert!(desc.values().iter().all(|v| v.is_finite()));

        // Donor and acceptor are the same single O atom.
        for r in ReferencePoint::ALL {
            let donor = desc.subset_block(FeaturePattern::Donor, r);
            assert_eq!(donor, desc.subset_block(FeaturePattern::Acceptor, r));
            assert_eq!(donor[1..], [0., 0.]);
        }
        // Hydrogens don't move the descriptor.
        let mut moved = conf.clone();
        for p in moved.posits.iter_mut().skip(3) {
            *p = Vec3::new(50., 50., 50.);
        }
        assert_eq!(usrcat_descriptor(&subsets, &moved), desc);
    }

    #[test]
    fn similarity() {
        let mol = add_hydrogens(parse_smiles("CCO").unwrap());
        let subsets = FeatureSubsets::match_all(&mol, &AtomTypingMatcher);
        let mut posits = vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(1.5, 0., 0.),
            Vec3::new(2., 1.4, 0.),
        ];
        posits.resize(mol.atom_count(), Vec3::new(0., 0., 0.));

        let a = usrcat_descriptor(&subsets, &Conformer::new(posits.clone()));
        assert!((usrcat_similarity(&a, &a, &DEFAULT_WEIGHTS) - 1.).abs() < TOL);

        posits[2] = Vec3::new(3.4, 0., 0.);
        let b = usrcat_descriptor(&subsets, &Conformer::new(posits));
        let sim = usrcat_similarity(&a, &b, &DEFAULT_WEIGHTS);
        assert!(sim > 0. && sim < 1.);
        assert_eq!(sim, usrcat_similarity(&b, &a, &DEFAULT_WEIGHTS));
    }
}
