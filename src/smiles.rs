//! A SMILES reader covering what docking libraries (ZINC, Enamine etc) emit: the organic subset,
//! bracket atoms, branches, ring closures, and disconnected fragments. Stereo marks are
//! accepted and discarded; nothing downstream uses them.
//!
//! Implicit hydrogens follow the default-valence rules of the organic subset. Aromatic atoms
//! reserve one valence for the ring's pi system where the element contributes one electron.

use std::collections::HashMap;

use na_seq::Element;
use thiserror::Error;

use crate::{AtomGeneric, BondType, MolecularGraph, error, pipeline::MoleculeParser};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unknown element '{0}'")]
    UnknownElement(String),
    #[error("unterminated bracket atom starting at position {0}")]
    UnclosedBracket(usize),
    #[error("unbalanced branch at position {0}")]
    UnbalancedBranch(usize),
    #[error("ring closure {0} is never closed")]
    UnclosedRing(u32),
    #[error("bond at position {0} has no atom on one side")]
    DanglingBond(usize),
    #[error("number at position {0} is out of range")]
    NumberOutOfRange(usize),
}

/// Elements we type, weigh, and embed. Anything else is rejected at parse time.
pub(crate) fn element_from_symbol(sym: &str) -> Option<Element> {
    Some(match sym {
        "H" => Element::Hydrogen,
        "C" => Element::Carbon,
        "N" => Element::Nitrogen,
        "O" => Element::Oxygen,
        "F" => Element::Fluorine,
        "P" => Element::Phosphorus,
        "S" => Element::Sulfur,
        "Cl" => Element::Chlorine,
        "Br" => Element::Bromine,
        "I" => Element::Iodine,
        _ => return None,
    })
}

fn default_valences(el: &Element) -> &'static [usize] {
    match el {
        Element::Carbon => &[4],
        Element::Nitrogen | Element::Phosphorus => &[3, 5],
        Element::Oxygen => &[2],
        Element::Sulfur => &[2, 4, 6],
        Element::Fluorine | Element::Chlorine | Element::Bromine | Element::Iodine => &[1],
        Element::Hydrogen => &[1],
        _ => &[],
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    graph: MolecularGraph,
    /// Atoms written in brackets; their hydrogen count is never inferred.
    bracket: Vec<bool>,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    /// Ring-closure digit -> (opening atom, bond written at the opening).
    rings: HashMap<u32, (usize, Option<BondType>)>,
    pending_bond: Option<(BondType, usize)>,
}

impl Parser {
    fn new(smiles: &str) -> Self {
        Self {
            chars: smiles.chars().collect(),
            pos: 0,
            graph: MolecularGraph::default(),
            bracket: Vec::new(),
            prev: None,
            branches: Vec::new(),
            rings: HashMap::new(),
            pending_bond: None,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn unexpected(&self) -> SmilesError {
        SmilesError::UnexpectedChar {
            ch: self.peek().unwrap_or(' '),
            pos: self.pos,
        }
    }

    fn parse(mut self) -> Result<MolecularGraph, SmilesError> {
        if self.chars.is_empty() {
            return Err(SmilesError::Empty);
        }

        while let Some(c) = self.peek() {
            match c {
                '[' => {
                    let atom = self.bracket_atom()?;
                    self.push_atom(atom, true);
                }
                'A'..='Z' | 'a'..='z' => {
                    let atom = self.organic_atom()?;
                    self.push_atom(atom, false);
                }
                '(' => {
                    if self.prev.is_none() || self.pending_bond.is_some() {
                        return Err(SmilesError::UnbalancedBranch(self.pos));
                    }
                    self.branches.push(self.prev);
                    self.pos += 1;
                }
                ')' => {
                    if self.pending_bond.is_some() {
                        return Err(SmilesError::DanglingBond(self.pos));
                    }
                    self.prev = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch(self.pos))?;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.pending_bond.is_some() {
                        return Err(self.unexpected());
                    }
                    let bt = match c {
                        '=' => BondType::Double,
                        '#' => BondType::Triple,
                        ':' => BondType::Aromatic,
                        _ => BondType::Single,
                    };
                    self.pending_bond = Some((bt, self.pos));
                    self.pos += 1;
                }
                '0'..='9' | '%' => {
                    let digit = self.ring_digit()?;
                    self.ring_closure(digit)?;
                }
                '.' => {
                    if let Some((_, p)) = self.pending_bond {
                        return Err(SmilesError::DanglingBond(p));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                _ => return Err(self.unexpected()),
            }
        }

        if let Some((_, p)) = self.pending_bond {
            return Err(SmilesError::DanglingBond(p));
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch(self.pos));
        }
        if let Some(digit) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(*digit));
        }
        if self.graph.atom_count() == 0 {
            return Err(SmilesError::Empty);
        }

        self.demote_acyclic_aromatic_bonds();
        self.assign_implicit_hydrogens();
        Ok(self.graph)
    }

    fn default_bond(&self, a: usize, b: usize) -> BondType {
        let atoms = self.graph.atoms();
        if atoms[a].aromatic && atoms[b].aromatic {
            BondType::Aromatic
        } else {
            BondType::Single
        }
    }

    fn push_atom(&mut self, atom: AtomGeneric, bracket: bool) {
        let i = self.graph.add_atom(atom);
        self.bracket.push(bracket);

        if let Some(prev) = self.prev {
            let bt = match self.pending_bond.take() {
                Some((bt, _)) => bt,
                None => self.default_bond(prev, i),
            };
            self.graph.add_bond(prev, i, bt);
        }
        self.pending_bond = None;
        self.prev = Some(i);
    }

    fn organic_atom(&mut self) -> Result<AtomGeneric, SmilesError> {
        let c = self.peek().ok_or(SmilesError::Empty)?;

        let (sym, aromatic, len) = match (c, self.peek_at(1)) {
            ('C', Some('l')) => ("Cl".to_string(), false, 2),
            ('B', Some('r')) => ("Br".to_string(), false, 2),
            ('C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => (c.to_string(), false, 1),
            ('c' | 'n' | 'o' | 'p' | 's', _) => (c.to_ascii_uppercase().to_string(), true, 1),
            ('B' | 'b', _) => return Err(SmilesError::UnknownElement("B".to_string())),
            _ => return Err(self.unexpected()),
        };

        let element = element_from_symbol(&sym).ok_or(SmilesError::UnknownElement(sym))?;
        self.pos += len;

        let mut atom = AtomGeneric::new(element);
        atom.aromatic = aromatic;
        Ok(atom)
    }

    /// `[` isotope? symbol chirality? hcount? charge? class? `]`
    fn bracket_atom(&mut self) -> Result<AtomGeneric, SmilesError> {
        let start = self.pos;
        self.pos += 1;

        let isotope = match self.number()? {
            Some(n) => {
                Some(u16::try_from(n).map_err(|_| SmilesError::NumberOutOfRange(start + 1))?)
            }
            None => None,
        };

        let c = self.peek().ok_or(SmilesError::UnclosedBracket(start))?;
        let (sym, aromatic) = if c.is_ascii_lowercase() {
            // Aromatic two-letter symbols (se, as) are outside the supported element set.
            if matches!(self.peek_at(1), Some('e' | 's')) && matches!(c, 's' | 'a') {
                let sym: String = [c, self.peek_at(1).unwrap_or(' ')].iter().collect();
                return Err(SmilesError::UnknownElement(sym));
            }
            self.pos += 1;
            (c.to_ascii_uppercase().to_string(), true)
        } else if c.is_ascii_uppercase() {
            self.pos += 1;
            match self.peek() {
                Some(l) if l.is_ascii_lowercase() => {
                    self.pos += 1;
                    (format!("{c}{l}"), false)
                }
                _ => (c.to_string(), false),
            }
        } else {
            return Err(self.unexpected());
        };

        let element =
            element_from_symbol(&sym).ok_or_else(|| SmilesError::UnknownElement(sym.clone()))?;

        // Chirality: @, @@, or an @-class like @TH1 / @SP2. Discarded.
        let chiral = self.peek() == Some('@');
        while self.peek() == Some('@') {
            self.pos += 1;
        }
        if chiral
            && matches!(self.peek(), Some('T' | 'A' | 'S' | 'O'))
            && self.peek_at(1).is_some_and(|c| c.is_ascii_uppercase())
        {
            self.pos += 2;
            self.number()?;
        }

        let mut h_count = 0;
        if self.peek() == Some('H') {
            self.pos += 1;
            h_count = self.number()?.unwrap_or(1);
        }

        let mut charge: i32 = 0;
        if let Some(sign @ ('+' | '-')) = self.peek() {
            let unit = if sign == '+' { 1 } else { -1 };
            self.pos += 1;
            if let Some(n) = self.number()? {
                charge = unit * n as i32;
            } else {
                charge = unit;
                while self.peek() == Some(sign) {
                    charge += unit;
                    self.pos += 1;
                }
            }
        }

        if self.peek() == Some(':') {
            self.pos += 1;
            self.number()?;
        }

        if self.peek() != Some(']') {
            return Err(SmilesError::UnclosedBracket(start));
        }
        self.pos += 1;

        let mut atom = AtomGeneric::new(element);
        atom.aromatic = aromatic;
        atom.isotope = isotope;
        atom.implicit_hydrogens = h_count.min(u8::MAX as u32) as u8;
        atom.formal_charge = charge.clamp(i8::MIN as i32, i8::MAX as i32) as i8;
        Ok(atom)
    }

    fn number(&mut self) -> Result<Option<u32>, SmilesError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .parse()
            .map(Some)
            .map_err(|_| SmilesError::NumberOutOfRange(start))
    }

    fn ring_digit(&mut self) -> Result<u32, SmilesError> {
        let c = self.peek().ok_or(SmilesError::Empty)?;
        if c == '%' {
            let (Some(d0), Some(d1)) = (self.peek_at(1), self.peek_at(2)) else {
                return Err(self.unexpected());
            };
            match (d0.to_digit(10), d1.to_digit(10)) {
                (Some(a), Some(b)) => {
                    self.pos += 3;
                    Ok(a * 10 + b)
                }
                _ => Err(self.unexpected()),
            }
        } else {
            self.pos += 1;
            Ok(c.to_digit(10).unwrap_or(0))
        }
    }

    fn ring_closure(&mut self, digit: u32) -> Result<(), SmilesError> {
        let Some(atom) = self.prev else {
            return Err(SmilesError::UnexpectedChar {
                ch: char::from_digit(digit % 10, 10).unwrap_or('%'),
                pos: self.pos,
            });
        };
        let bond_here = self.pending_bond.take().map(|(bt, _)| bt);

        match self.rings.remove(&digit) {
            Some((opener, bond_open)) => {
                let bt = bond_here
                    .or(bond_open)
                    .unwrap_or_else(|| self.default_bond(opener, atom));
                self.graph.add_bond(opener, atom, bt);
            }
            None => {
                self.rings.insert(digit, (atom, bond_here));
            }
        }
        Ok(())
    }

    /// Two aromatic atoms written next to each other across rings (e.g. biphenyl without an
    /// explicit `-`) are joined by a single bond.
    fn demote_acyclic_aromatic_bonds(&mut self) {
        let ring_bonds = self.graph.ring_bonds();
        let demote: Vec<(usize, usize)> = self
            .graph
            .bonds()
            .iter()
            .enumerate()
            .filter(|(i, b)| b.bond_type == BondType::Aromatic && !ring_bonds[*i])
            .map(|(_, b)| (b.atom_0, b.atom_1))
            .collect();

        if demote.is_empty() {
            return;
        }

        let atoms = self.graph.atoms().to_vec();
        let bonds = self
            .graph
            .bonds()
            .iter()
            .cloned()
            .map(|mut b| {
                if demote.contains(&(b.atom_0, b.atom_1)) {
                    b.bond_type = BondType::Single;
                }
                b
            })
            .collect();
        self.graph = MolecularGraph::new(atoms, bonds);
    }

    fn assign_implicit_hydrogens(&mut self) {
        for i in 0..self.graph.atom_count() {
            if self.bracket[i] {
                continue;
            }

            let atom = &self.graph.atoms()[i];
            let el = &atom.element;
            let aromatic = atom.aromatic;

            let mut n_aromatic = 0;
            let mut bonded = 0.;
            for &(_, b) in self.graph.neighbors(i) {
                match self.graph.bonds()[b].bond_type {
                    BondType::Aromatic => n_aromatic += 1,
                    bt => bonded += bt.order(),
                }
            }
            let mut bonded = bonded as usize + n_aromatic;

            if aromatic {
                let pi = match el {
                    Element::Carbon => true,
                    Element::Nitrogen | Element::Phosphorus => bonded == 2,
                    _ => false,
                };
                if pi {
                    bonded += 1;
                }
            }

            let h = default_valences(el)
                .iter()
                .find(|v| **v >= bonded)
                .map(|v| v - bonded)
                .unwrap_or(0);

            if let Some(atom) = self.graph.atom_mut(i) {
                atom.implicit_hydrogens = h as u8;
            }
        }
    }
}

/// Parse a SMILES string into a hydrogen-suppressed graph.
pub fn parse_smiles(smiles: &str) -> Result<MolecularGraph, SmilesError> {
    Parser::new(smiles.trim()).parse()
}

/// Convert every implicit hydrogen into an explicit atom. New hydrogens are appended after all
/// existing atoms, so existing atom indices are unchanged.
pub fn add_hydrogens(mut mol: MolecularGraph) -> MolecularGraph {
    let n = mol.atom_count();

    for i in 0..n {
        let h = mol.atoms()[i].implicit_hydrogens;
        if h == 0 {
            continue;
        }
        if let Some(atom) = mol.atom_mut(i) {
            atom.implicit_hydrogens = 0;
        }
        for _ in 0..h {
            let h_i = mol.add_atom(AtomGeneric::new(Element::Hydrogen));
            mol.add_bond(i, h_i, BondType::Single);
        }
    }
    mol
}

/// The built-in [`MoleculeParser`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SmilesParser;

impl MoleculeParser for SmilesParser {
    fn parse(&self, smiles: &str) -> error::Result<MolecularGraph> {
        Ok(parse_smiles(smiles)?)
    }

    fn add_hydrogens(&self, mol: MolecularGraph) -> MolecularGraph {
        add_hydrogens(mol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h_counts(smiles: &str) -> Vec<u8> {
        parse_smiles(smiles)
            .unwrap()
            .atoms()
            .iter()
            .map(|a| a.implicit_hydrogens)
            .collect()
    }

    #[test]
    fn ethanol() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bonds().len(), 2);
        assert_eq!(h_counts("CCO"), [3, 2, 1]);

        let mol = add_hydrogens(mol);
        assert_eq!(mol.atom_count(), 9);
        assert_eq!(mol.heavy_atom_count(), 3);
        // Heavy atoms keep their indices.
        assert!(mol.atoms()[..3].iter().all(|a| !a.is_hydrogen()));
        assert!(mol.atoms()[3..].iter().all(|a| a.is_hydrogen()));
        assert_eq!(mol.total_hydrogens(0), 3);
    }

    #[test]
    fn aromatic_rings() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.bonds().len(), 6);
        assert!(mol.bonds().iter().all(|b| b.bond_type == BondType::Aromatic));
        assert_eq!(h_counts("c1ccccc1"), [1; 6]);

        // Pyridine N, thiophene S, N-methylpyrrole N take no hydrogens.
        assert_eq!(h_counts("n1ccccc1")[0], 0);
        assert_eq!(h_counts("s1cccc1")[0], 0);
        assert_eq!(h_counts("Cn1cccc1")[1], 0);
        assert_eq!(h_counts("c1cc[nH]c1")[3], 1);
    }

    #[test]
    fn biphenyl_link_is_single() {
        let mol = parse_smiles("c1ccccc1c1ccccc1").unwrap();
        let singles = mol
            .bonds()
            .iter()
            .filter(|b| b.bond_type == BondType::Single)
            .count();
        assert_eq!(singles, 1);
    }

    #[test]
    fn branches_rings_and_bond_orders() {
        // Acetic acid.
        let mol = parse_smiles("CC(=O)O").unwrap();
        assert_eq!(mol.bonds()[1].bond_type, BondType::Double);
        assert_eq!(mol.degree(1), 3);
        assert_eq!(h_counts("CC(=O)O"), [3, 0, 0, 1]);

        // Cyclohexane via a two-digit ring label.
        let mol = parse_smiles("C%11CCCCC%11").unwrap();
        assert_eq!(mol.bonds().len(), 6);

        assert_eq!(h_counts("C#N"), [1, 0]);
        assert_eq!(h_counts("CS(=O)(=O)C")[1], 0);
    }

    #[test]
    fn bracket_atoms() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(mol.atoms()[0].formal_charge, 1);
        assert_eq!(mol.atoms()[0].implicit_hydrogens, 4);

        let mol = parse_smiles("C[C@@H](N)C(=O)[O-]").unwrap();
        assert_eq!(mol.atoms()[1].implicit_hydrogens, 1);
        assert_eq!(mol.atoms()[5].formal_charge, -1);

        let mol = parse_smiles("[13CH3]C").unwrap();
        assert_eq!(mol.atoms()[0].isotope, Some(13));

        assert_eq!(parse_smiles("[65535C]").unwrap().atoms()[0].isotope, Some(65535));
        assert!(matches!(
            parse_smiles("[70000C]"),
            Err(SmilesError::NumberOutOfRange(1))
        ));
        assert!(matches!(
            parse_smiles("[CH99999999999]"),
            Err(SmilesError::NumberOutOfRange(_))
        ));

        let mol = parse_smiles("[Fe++]");
        assert!(matches!(mol, Err(SmilesError::UnknownElement(_))));
    }

    #[test]
    fn fragments() {
        let mol = parse_smiles("CC(=O)[O-].[Na+]");
        assert!(mol.is_err());

        let mol = parse_smiles("Cl.CN").unwrap();
        assert_eq!(mol.component_count(), 2);
        assert_eq!(h_counts("Cl.CN"), [1, 3, 2]);
    }

    #[test]
    fn malformed() {
        assert!(matches!(parse_smiles(""), Err(SmilesError::Empty)));
        assert!(matches!(
            parse_smiles("CC(C"),
            Err(SmilesError::UnbalancedBranch(_))
        ));
        assert!(matches!(
            parse_smiles("CC)C"),
            Err(SmilesError::UnbalancedBranch(_))
        ));
        assert!(matches!(
            parse_smiles("C1CC"),
            Err(SmilesError::UnclosedRing(1))
        ));
        assert!(matches!(parse_smiles("CC="), Err(SmilesError::DanglingBond(_))));
        assert!(matches!(
            parse_smiles("C[CH3"),
            Err(SmilesError::UnclosedBracket(_))
        ));
        assert!(matches!(
            parse_smiles("C?C"),
            Err(SmilesError::UnexpectedChar { ch: '?', .. })
        ));
    }
}
