//! Structure Data Format (MDL V2000 SDF) for the conformer stream: one record per conformer, each
//! a full copy of the molecule with that conformer's coordinates.

use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::Path,
    str::FromStr,
};

use lin_alg::f64::Vec3;
use na_seq::Element;

use crate::{AtomGeneric, BondGeneric, BondType, Conformer, MolecularGraph};

/// Entries per `M  CHG` / `M  ISO` line.
const PROPERTY_ENTRIES_PER_LINE: usize = 8;

/// One SDF record.
#[derive(Clone, Debug)]
pub struct Sdf {
    pub ident: String,
    pub atoms: Vec<AtomGeneric>,
    pub bonds: Vec<BondGeneric>,
    /// One per atom.
    pub posits: Vec<Vec3>,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

/// A fixed-width column, by byte range.
fn fixed_col<'a>(line: &'a str, start: usize, end: usize) -> io::Result<&'a str> {
    line.get(start..end)
        .ok_or_else(|| invalid(format!("Line too short for columns {start}..{end}: {line}")))
}

fn parse_col<T: FromStr>(s: &str, what: &str) -> io::Result<T> {
    s.trim()
        .parse::<T>()
        .map_err(|_| invalid(format!("Could not parse {what}: {s}")))
}

impl Sdf {
    pub fn from_conformer(mol: &MolecularGraph, conformer: &Conformer) -> Self {
        Self {
            ident: mol.ident.clone(),
            atoms: mol.atoms().to_vec(),
            bonds: mol.bonds().to_vec(),
            posits: conformer.posits.clone(),
        }
    }

    /// From the text of a single record. A trailing `$$$$` is optional.
    pub fn new(text: &str) -> io::Result<Self> {
        let lines: Vec<&str> = text.lines().collect();

        // Title, program line, comment, then counts, e.g. "  9  8  0  0  0  0  0  0  0  0999 V2000"
        if lines.len() < 4 {
            return Err(invalid("Not enough lines to parse an SDF header"));
        }

        let counts_line = lines[3];
        let n_atoms: usize = parse_col(fixed_col(counts_line, 0, 3)?, "number of atoms")?;
        let n_bonds: usize = parse_col(fixed_col(counts_line, 3, 6)?, "number of bonds")?;

        let first_atom_line = 4;
        let first_bond_line = first_atom_line + n_atoms;
        let end_bond_line = first_bond_line + n_bonds;

        if lines.len() < end_bond_line {
            return Err(invalid(format!(
                "Not enough lines for {n_atoms} atoms and {n_bonds} bonds"
            )));
        }

        let mut atoms = Vec::with_capacity(n_atoms);
        let mut posits = Vec::with_capacity(n_atoms);

        for (i, line) in lines[first_atom_line..first_bond_line].iter().enumerate() {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return Err(invalid(format!("Atom line {i} does not have enough columns")));
            }

            let x = parse_col(cols[0], "X coordinate")?;
            let y = parse_col(cols[1], "Y coordinate")?;
            let z = parse_col(cols[2], "Z coordinate")?;

            posits.push(Vec3::new(x, y, z));
            atoms.push(AtomGeneric::new(Element::from_letter(cols[3])?));
        }

        let mut bonds = Vec::with_capacity(n_bonds);
        for (i, line) in lines[first_bond_line..end_bond_line].iter().enumerate() {
            let atom_0_sn: usize = parse_col(fixed_col(line, 0, 3)?, "bond atom 0")?;
            let atom_1_sn: usize = parse_col(fixed_col(line, 3, 6)?, "bond atom 1")?;
            let bond_type = BondType::from_str(fixed_col(line, 6, 9)?)?;

            if atom_0_sn == 0 || atom_1_sn == 0 || atom_0_sn > n_atoms || atom_1_sn > n_atoms {
                return Err(invalid(format!(
                    "Bond {i} references atoms out of range: {atom_0_sn}, {atom_1_sn}"
                )));
            }

            if bond_type == BondType::Aromatic {
                atoms[atom_0_sn - 1].aromatic = true;
                atoms[atom_1_sn - 1].aromatic = true;
            }

            bonds.push(BondGeneric {
                bond_type,
                atom_0: atom_0_sn - 1,
                atom_1: atom_1_sn - 1,
            });
        }

        for line in &lines[end_bond_line..] {
            if line.trim() == "M  END" {
                break;
            }
            if let Some(rest) = line.strip_prefix("M  CHG") {
                for (sn, val) in parse_property_line(rest, n_atoms)? {
                    atoms[sn - 1].formal_charge = val as i8;
                }
            } else if let Some(rest) = line.strip_prefix("M  ISO") {
                for (sn, val) in parse_property_line(rest, n_atoms)? {
                    atoms[sn - 1].isotope = u16::try_from(val).ok();
                }
            }
        }

        Ok(Self {
            ident: lines[0].trim().to_string(),
            atoms,
            bonds,
            posits,
        })
    }

    /// All records of a multi-record file.
    pub fn new_multiple(text: &str) -> io::Result<Vec<Self>> {
        let mut result = Vec::new();
        let mut record = String::new();

        for line in text.lines() {
            if line.trim_end() == "$$$$" {
                result.push(Self::new(&record)?);
                record.clear();
            } else {
                record.push_str(line);
                record.push('\n');
            }
        }

        if !record.trim().is_empty() {
            result.push(Self::new(&record)?);
        }
        Ok(result)
    }

    pub fn load_all(path: &Path) -> io::Result<Vec<Self>> {
        let data_str = fs::read_to_string(path)?;
        Self::new_multiple(&data_str)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if self.posits.len() != self.atoms.len() {
            return Err(invalid(format!(
                "{} coordinates for {} atoms",
                self.posits.len(),
                self.atoms.len()
            )));
        }

        writeln!(w, "{}", self.ident)?;
        writeln!(w, "     usrcat_batch 3D")?;
        writeln!(w)?;

        writeln!(
            w,
            "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
            self.atoms.len(),
            self.bonds.len()
        )?;

        for (atom, posit) in self.atoms.iter().zip(&self.posits) {
            writeln!(
                w,
                "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
                posit.x,
                posit.y,
                posit.z,
                atom.element.to_letter()
            )?;
        }

        for bond in &self.bonds {
            writeln!(
                w,
                "{:>3}{:>3}{:>3}  0",
                bond.atom_0 + 1,
                bond.atom_1 + 1,
                bond.bond_type.to_str_sdf()
            )?;
        }

        let charges: Vec<(usize, i32)> = self
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| a.formal_charge != 0)
            .map(|(i, a)| (i + 1, a.formal_charge as i32))
            .collect();
        write_property_lines(w, "CHG", &charges)?;

        let isotopes: Vec<(usize, i32)> = self
            .atoms
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.isotope.map(|iso| (i + 1, iso as i32)))
            .collect();
        write_property_lines(w, "ISO", &isotopes)?;

        writeln!(w, "M  END")?;
        writeln!(w, "$$$$")?;

        Ok(())
    }

    /// Back to a graph and conformer. Hydrogens are whatever atoms the record lists.
    pub fn to_mol(&self) -> (MolecularGraph, Conformer) {
        let mut mol = MolecularGraph::new(self.atoms.clone(), self.bonds.clone());
        mol.ident = self.ident.clone();
        (mol, Conformer::new(self.posits.clone()))
    }
}

/// `M  CHG  2   1   1   4  -1`: count, then (atom serial number, value) pairs.
fn parse_property_line(rest: &str, n_atoms: usize) -> io::Result<Vec<(usize, i32)>> {
    let cols: Vec<&str> = rest.split_whitespace().collect();
    let Some((count, pairs)) = cols.split_first() else {
        return Err(invalid("Empty property line"));
    };
    let count: usize = parse_col(count, "property count")?;

    if pairs.len() < count * 2 {
        return Err(invalid(format!("Property line lists fewer than {count} entries")));
    }

    let mut result = Vec::with_capacity(count);
    for pair in pairs.chunks_exact(2).take(count) {
        let sn: usize = parse_col(pair[0], "property atom")?;
        if sn == 0 || sn > n_atoms {
            return Err(invalid(format!("Property atom {sn} out of range")));
        }
        result.push((sn, parse_col(pair[1], "property value")?));
    }
    Ok(result)
}

fn write_property_lines<W: Write>(w: &mut W, tag: &str, entries: &[(usize, i32)]) -> io::Result<()> {
    for chunk in entries.chunks(PROPERTY_ENTRIES_PER_LINE) {
        write!(w, "M  {tag}{:>3}", chunk.len())?;
        for (sn, val) in chunk {
            write!(w, " {sn:>3} {val:>3}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::{add_hydrogens, parse_smiles};

    fn with_coords(smiles: &str) -> (MolecularGraph, Conformer) {
        let mut mol = add_hydrogens(parse_smiles(smiles).unwrap());
        mol.ident = "MOL1".to_string();
        let posits = (0..mol.atom_count())
            .map(|i| Vec3::new(i as f64 * 1.1, i as f64 * 0.25, 0.5))
            .collect();
        (mol, Conformer::new(posits))
    }

    fn render(sdf: &Sdf) -> String {
        let mut buf = Vec::new();
        sdf.write_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn write_layout() {
        let (mol, conf) = with_coords("CO");
        let text = render(&Sdf::from_conformer(&mol, &conf));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "MOL1");
        assert!(lines[3].starts_with("  6  5  0"));
        assert!(lines[3].ends_with("V2000"));
        assert_eq!(&lines[4][..31], "    0.0000    0.0000    0.5000 ");
        assert_eq!(&lines[4][31..33], "C ");
        assert_eq!(lines[10], "  1  2  1  0");
        assert_eq!(lines[lines.len() - 2], "M  END");
        assert_eq!(lines[lines.len() - 1], "$$$$");
    }

    #[test]
    fn read_back() {
        let (mol, conf) = with_coords("c1ccccc1C(=O)[O-]");
        let text = render(&Sdf::from_conformer(&mol, &conf));
        assert!(text.contains("M  CHG  1   9  -1"));

        let sdf = Sdf::new(&text).unwrap();
        assert_eq!(sdf.ident, "MOL1");
        assert_eq!(sdf.atoms.len(), mol.atom_count());
        assert_eq!(sdf.bonds.len(), mol.bonds().len());
        assert!(sdf.atoms[0].aromatic);
        assert_eq!(sdf.atoms[8].formal_charge, -1);
        assert_eq!(sdf.bonds[0].bond_type, BondType::Aromatic);

        for (a, b) in sdf.posits.iter().zip(&conf.posits) {
            assert!((*a - *b).magnitude() < 1e-4);
        }

        let (back, _) = sdf.to_mol();
        assert_eq!(back.heavy_atom_count(), mol.heavy_atom_count());
    }

    #[test]
    fn isotopes_round_trip() {
        let (mol, conf) = with_coords("[13CH4]");
        let sdf = Sdf::new(&render(&Sdf::from_conformer(&mol, &conf))).unwrap();
        assert_eq!(sdf.atoms[0].isotope, Some(13));
    }

    #[test]
    fn multiple_records() {
        let mut buf = Vec::new();
        for smiles in ["CCO", "CN", "O"] {
            let (mol, conf) = with_coords(smiles);
            Sdf::from_conformer(&mol, &conf).write_to(&mut buf).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();

        let all = Sdf::new_multiple(&text).unwrap();
        let counts: Vec<_> = all.iter().map(|s| s.atoms.len()).collect();
        assert_eq!(counts, [9, 7, 3]);
    }

    #[test]
    fn malformed() {
        assert!(Sdf::new("title\n\n").is_err());
        assert!(Sdf::new("t\n\n\n  3  0  0  0  0  0  0  0  0  0999 V2000\n").is_err());

        let (mol, mut conf) = with_coords("CC");
        conf.posits.pop();
        let mut buf = Vec::new();
        assert!(Sdf::from_conformer(&mol, &conf).write_to(&mut buf).is_err());
    }
}
