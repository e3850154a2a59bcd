//! The shared output files of a run, and the per-molecule unit written to them.
//!
//! Paths derive from the two output paths given on the command line:
//!
//! | file                               | contents                                   |
//! |------------------------------------|--------------------------------------------|
//! | `<conformers>`                     | SDF, one record per conformer              |
//! | `<conformers stem>_4properties.f32`| 4 × f32 per molecule                       |
//! | `<conformers stem>_5properties.i16`| 5 × i16 per molecule                       |
//! | `<conformers stem>_usrcat.f32`     | 60 × f32 per conformer, 4 conformers each  |
//! | `<smi>`                            | `identifier\tSMILES` per molecule          |
//! | `<smi stem>_only_smiles.txt`       | SMILES per molecule                        |
//! | `<smi stem>_only_id.txt`           | identifier per molecule                    |
//!
//! Binary values are little-endian. All files are opened for appending, so repeated runs
//! accumulate.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    Conformer, MolecularGraph,
    error::{Error, Result},
    properties::ScalarProperties,
    sdf::Sdf,
    shape::{DESCRIPTOR_LEN, ShapeDescriptor},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub conformers: PathBuf,
    pub float_properties: PathBuf,
    pub int_properties: PathBuf,
    pub shape_descriptors: PathBuf,
    pub combined: PathBuf,
    pub smiles_only: PathBuf,
    pub ids_only: PathBuf,
}

/// `dir/name.ext` -> `dir/name{suffix}`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}"))
}

impl OutputPaths {
    pub fn derive(conformers: &Path, combined: &Path) -> Self {
        Self {
            conformers: conformers.to_owned(),
            float_properties: sibling(conformers, "_4properties.f32"),
            int_properties: sibling(conformers, "_5properties.i16"),
            shape_descriptors: sibling(conformers, "_usrcat.f32"),
            combined: combined.to_owned(),
            smiles_only: sibling(combined, "_only_smiles.txt"),
            ids_only: sibling(combined, "_only_id.txt"),
        }
    }

    pub fn all(&self) -> [&Path; 7] {
        [
            &self.conformers,
            &self.float_properties,
            &self.int_properties,
            &self.shape_descriptors,
            &self.combined,
            &self.smiles_only,
            &self.ids_only,
        ]
    }
}

/// Everything one accepted molecule contributes to the sinks, rendered ahead of time so the
/// commit is a plain sequence of writes.
#[derive(Clone, Debug, Default)]
pub struct MoleculeOutput {
    pub identifier: String,
    pub smiles: String,
    pub conformers_sdf: Vec<u8>,
    pub float_properties: Vec<u8>,
    pub int_properties: Vec<u8>,
    pub shape_descriptors: Vec<u8>,
}

impl MoleculeOutput {
    /// `descriptors` holds one entry per conformer, in the same order.
    pub fn render(
        identifier: &str,
        smiles: &str,
        mol: &MolecularGraph,
        conformers: &[Conformer],
        props: &ScalarProperties,
        descriptors: &[ShapeDescriptor],
    ) -> io::Result<Self> {
        let mut conformers_sdf = Vec::new();
        for conf in conformers {
            Sdf::from_conformer(mol, conf).write_to(&mut conformers_sdf)?;
        }

        let mut float_properties = Vec::with_capacity(4 * 4);
        for v in props.float_values() {
            float_properties.write_f32::<LittleEndian>(v)?;
        }

        let mut int_properties = Vec::with_capacity(5 * 2);
        for v in props.int_values() {
            int_properties.write_i16::<LittleEndian>(v)?;
        }

        let mut shape_descriptors = Vec::with_capacity(descriptors.len() * DESCRIPTOR_LEN * 4);
        for desc in descriptors {
            for v in desc.values() {
                shape_descriptors.write_f32::<LittleEndian>(*v)?;
            }
        }

        Ok(Self {
            identifier: identifier.to_owned(),
            smiles: smiles.to_owned(),
            conformers_sdf,
            float_properties,
            int_properties,
            shape_descriptors,
        })
    }
}

#[derive(Debug)]
struct SinkFiles {
    conformers: BufWriter<File>,
    float_properties: BufWriter<File>,
    int_properties: BufWriter<File>,
    shape_descriptors: BufWriter<File>,
    combined: BufWriter<File>,
    smiles_only: BufWriter<File>,
    ids_only: BufWriter<File>,
}

impl SinkFiles {
    fn write(&mut self, out: &MoleculeOutput) -> io::Result<()> {
        self.conformers.write_all(&out.conformers_sdf)?;
        self.float_properties.write_all(&out.float_properties)?;
        self.int_properties.write_all(&out.int_properties)?;
        self.shape_descriptors.write_all(&out.shape_descriptors)?;
        writeln!(self.combined, "{}\t{}", out.identifier, out.smiles)?;
        writeln!(self.smiles_only, "{}", out.smiles)?;
        writeln!(self.ids_only, "{}", out.identifier)?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        for w in [
            &mut self.conformers,
            &mut self.float_properties,
            &mut self.int_properties,
            &mut self.shape_descriptors,
            &mut self.combined,
            &mut self.smiles_only,
            &mut self.ids_only,
        ] {
            w.flush()?;
        }
        Ok(())
    }
}

/// The output files, shared by every worker. One lock covers all of them, so a molecule's entries
/// are never interleaved with another's in any file.
#[derive(Debug)]
pub struct OutputSinks {
    paths: OutputPaths,
    files: Mutex<SinkFiles>,
}

fn open_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

impl OutputSinks {
    pub fn open(paths: OutputPaths) -> Result<Self> {
        let files = SinkFiles {
            conformers: open_append(&paths.conformers)?,
            float_properties: open_append(&paths.float_properties)?,
            int_properties: open_append(&paths.int_properties)?,
            shape_descriptors: open_append(&paths.shape_descriptors)?,
            combined: open_append(&paths.combined)?,
            smiles_only: open_append(&paths.smiles_only)?,
            ids_only: open_append(&paths.ids_only)?,
        };

        Ok(Self {
            paths,
            files: Mutex::new(files),
        })
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Writes one molecule to every file, under the lock.
    pub fn commit(&self, out: &MoleculeOutput) -> Result<()> {
        let mut files = self.files.lock().map_err(|_| Error::SinkPoisoned)?;
        files.write(out)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut files = self.files.lock().map_err(|_| Error::SinkPoisoned)?;
        files.flush()?;
        Ok(())
    }
}

/// Reads fixed-size little-endian records until EOF. A trailing partial record is an error.
fn read_records<T>(
    path: &Path,
    record_len: usize,
    mut parse: impl FnMut(&mut &[u8]) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    let mut data = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut data)?;

    if data.len() % record_len != 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "{} is {} bytes; not a multiple of the {record_len}-byte record",
                path.display(),
                data.len()
            ),
        ));
    }

    data.chunks_exact(record_len)
        .map(|mut chunk| parse(&mut chunk))
        .collect()
}

/// Molecular weight, logP, TPSA and surface area, per molecule.
pub fn read_float_properties(path: &Path) -> io::Result<Vec<[f32; 4]>> {
    read_records(path, 4 * 4, |r| {
        let mut v = [0.; 4];
        r.read_f32_into::<LittleEndian>(&mut v)?;
        Ok(v)
    })
}

/// Heavy atoms, donors, acceptors, rotatable bonds and rings, per molecule.
pub fn read_int_properties(path: &Path) -> io::Result<Vec<[i16; 5]>> {
    read_records(path, 5 * 2, |r| {
        let mut v = [0; 5];
        r.read_i16_into::<LittleEndian>(&mut v)?;
        Ok(v)
    })
}

/// One descriptor per conformer.
pub fn read_shape_descriptors(path: &Path) -> io::Result<Vec<ShapeDescriptor>> {
    read_records(path, DESCRIPTOR_LEN * 4, |r| {
        let mut v = [0.; DESCRIPTOR_LEN];
        r.read_f32_into::<LittleEndian>(&mut v)?;
        Ok(ShapeDescriptor(v))
    })
}
