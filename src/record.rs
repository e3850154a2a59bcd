//! Pulls compound identifiers and SMILES strings out of docking-output text, such as the
//! `REMARK` block of a PDBQT file:
//!
//! ```text
//! REMARK  Compound: Z1234567890
//! REMARK  SMILES: CC(=O)Nc1ccc(O)cc1
//! ```
//!
//! SMILES strings are sometimes wrapped onto the following line; that continuation is joined back.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use tracing::debug;

use crate::config::ExtractorConfig;

/// First tokens of lines that are structural records, and never the tail of a wrapped SMILES.
const PDBQT_KEYWORDS: [&str; 13] = [
    "REMARK", "USER", "ROOT", "ENDROOT", "BRANCH", "ENDBRANCH", "TORSDOF", "ATOM", "HETATM",
    "MODEL", "ENDMDL", "TER", "END",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoleculeRecord {
    pub identifier: String,
    pub smiles: String,
}

/// A lazy sequence of [`MoleculeRecord`]s from one input. Records whose SMILES contain a
/// blacklisted character, or that have no preceding identifier, are skipped and counted.
/// Iteration ends at EOF, or after yielding the first read error.
pub struct RecordReader<'a, R> {
    reader: R,
    config: &'a ExtractorConfig,
    /// A line read ahead while checking for a wrapped SMILES, that turned out not to be one.
    pending_line: Option<String>,
    identifier: Option<String>,
    rejected: usize,
    done: bool,
}

impl<'a> RecordReader<'a, BufReader<File>> {
    pub fn open(path: &Path, config: &'a ExtractorConfig) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), config))
    }
}

impl<'a, R: BufRead> RecordReader<'a, R> {
    pub fn new(reader: R, config: &'a ExtractorConfig) -> Self {
        Self {
            reader,
            config,
            pending_line: None,
            identifier: None,
            rejected: 0,
            done: false,
        }
    }

    /// Records skipped so far for a blacklisted character or a missing identifier.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Docking files occasionally carry stray non-UTF-8 bytes in remarks; decode lossily
    /// rather than failing the whole file.
    fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.pending_line.take() {
            return Ok(Some(line));
        }

        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn is_continuation(&self, line: &str) -> bool {
        let Some(first) = line.split_whitespace().next() else {
            return false;
        };

        !PDBQT_KEYWORDS.contains(&first)
            && !line.contains(&self.config.id_marker)
            && !line.contains(&self.config.smiles_marker)
    }
}

impl<R: BufRead> Iterator for RecordReader<'_, R> {
    type Item = io::Result<MoleculeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.next_line() {
                Ok(Some(l)) => l,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if let Some(id) = after_marker(&line, &self.config.id_marker) {
                self.identifier = (!id.is_empty()).then_some(id);
            }

            let Some(mut smiles) = after_marker(&line, &self.config.smiles_marker) else {
                continue;
            };

            match self.next_line() {
                Ok(Some(next)) => {
                    if self.is_continuation(&next) {
                        smiles.push_str(&strip_whitespace(&next));
                    } else {
                        self.pending_line = Some(next);
                    }
                }
                Ok(None) => (),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            let identifier = self.identifier.take();

            if smiles.is_empty() {
                self.rejected += 1;
                debug!("Skipping empty SMILES (compound {identifier:?})");
                continue;
            }

            if let Some(c) = smiles.chars().find(|c| self.config.blacklist.contains(c)) {
                self.rejected += 1;
                debug!("Skipping {identifier:?}: SMILES {smiles} contains '{c}'");
                continue;
            }

            let Some(identifier) = identifier else {
                self.rejected += 1;
                debug!("Skipping SMILES {smiles} with no compound identifier");
                continue;
            };

            return Some(Ok(MoleculeRecord { identifier, smiles }));
        }
    }
}

/// The text following `marker`, with all whitespace removed.
fn after_marker(line: &str, marker: &str) -> Option<String> {
    let pos = line.find(marker)?;
    Some(strip_whitespace(&line[pos + marker.len()..]))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
