//! Input discovery, and the fixed worker pool that runs the pipeline over contiguous chunks of the
//! input files.
//!
//! Each worker owns its chunk and its statistics; the only state shared between workers is the
//! read-only collaborators and the output sinks.

use std::{
    fmt,
    ops::Range,
    path::{Path, PathBuf},
    thread,
};

use tracing::{info, warn};

use crate::{
    config::RunConfig,
    error::{Error, Result},
    pipeline::{Collaborators, MoleculePipeline, Outcome, SkipReason},
    sinks::OutputSinks,
};

/// A half-open range of indices into the input file list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkChunk {
    pub start: usize,
    pub end: usize,
}

impl WorkChunk {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits `0..n` into `workers` contiguous chunks covering it exactly. Chunk sizes differ by at
/// most one; the first `n % workers` chunks take the extra item.
pub fn partition(n: usize, workers: usize) -> Result<Vec<WorkChunk>> {
    if workers == 0 {
        return Err(Error::NoWorkers);
    }
    if workers > n {
        return Err(Error::TooManyWorkers { workers, files: n });
    }

    let base = n / workers;
    let remainder = n % workers;

    let mut result = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < remainder);
        result.push(WorkChunk {
            start,
            end: start + len,
        });
        start += len;
    }
    Ok(result)
}

/// Every file under `folder`, recursively, with the given extension (case-insensitive), sorted by
/// path.
pub fn collect_input_files(
    folder: &Path,
    extension: &str,
    capacity: usize,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::with_capacity(capacity);
    let mut dirs_to_visit = vec![folder.to_path_buf()];

    while let Some(dir) = dirs_to_visit.pop() {
        for entry in dir.read_dir()? {
            let entry = entry?;
            let p = entry.path();
            let ty = entry.file_type()?;

            if ty.is_dir() {
                dirs_to_visit.push(p);
                continue;
            }

            let matches = p
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));

            if ty.is_file() && matches {
                files.push(p);
            }
        }
    }

    if files.is_empty() {
        return Err(Error::NoInputFiles {
            folder: folder.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    files.sort();
    Ok(files)
}

/// Counts for one worker, or summed over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files: usize,
    /// Records passed to the pipeline. Excludes those the extractor rejected.
    pub records: usize,
    pub accepted: usize,
    pub conformers: usize,
    /// Rejected by the extractor: blacklisted characters, or no identifier.
    pub skipped_malformed: usize,
    pub skipped_parse: usize,
    pub skipped_embedding: usize,
    pub skipped_collaborator: usize,
    pub unreadable_files: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &Outcome) {
        self.records += 1;
        match outcome {
            Outcome::Accepted { conformers } => {
                self.accepted += 1;
                self.conformers += conformers;
            }
            Outcome::Skipped(SkipReason::Parse(_)) => self.skipped_parse += 1,
            Outcome::Skipped(SkipReason::Embedding { .. }) => self.skipped_embedding += 1,
            Outcome::Skipped(SkipReason::Collaborator(_)) => self.skipped_collaborator += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.files += other.files;
        self.records += other.records;
        self.accepted += other.accepted;
        self.conformers += other.conformers;
        self.skipped_malformed += other.skipped_malformed;
        self.skipped_parse += other.skipped_parse;
        self.skipped_embedding += other.skipped_embedding;
        self.skipped_collaborator += other.skipped_collaborator;
        self.unreadable_files += other.unreadable_files;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {} records: {} accepted ({} conformers); skipped {} malformed, {} \
             unparseable, {} embedding, {} collaborator errors; {} unreadable files",
            self.files,
            self.records,
            self.accepted,
            self.conformers,
            self.skipped_malformed,
            self.skipped_parse,
            self.skipped_embedding,
            self.skipped_collaborator,
            self.unreadable_files,
        )
    }
}

/// Runs `workers` threads, one per chunk of `files`, and waits for all of them. The first worker
/// error (a sink failure) or panic is returned once every worker has finished.
pub fn run(
    files: &[PathBuf],
    workers: usize,
    config: &RunConfig,
    collaborators: Collaborators<'_>,
    sinks: &OutputSinks,
) -> Result<RunStats> {
    let chunks = partition(files.len(), workers)?;

    let result = thread::scope(|s| {
        let mut handles = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_files = &files[chunk.range()];

            let handle = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn_scoped(s, move || -> Result<RunStats> {
                    let pipeline = MoleculePipeline::new(
                        collaborators,
                        &config.embed,
                        &config.extractor,
                        sinks,
                    );
                    let mut stats = RunStats::default();
                    for path in chunk_files {
                        pipeline.process_file(path, &mut stats)?;
                    }
                    Ok(stats)
                });

            match handle {
                Ok(h) => handles.push(h),
                // Workers already started are joined when the scope ends.
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let mut total = RunStats::default();
        let mut first_err = None;

        for (i, handle) in handles.into_iter().enumerate() {
            let err = match handle.join() {
                Ok(Ok(stats)) => {
                    total.merge(&stats);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => Error::WorkerPanicked(i),
            };
            if first_err.is_none() {
                first_err = Some(err);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    });

    let flushed = sinks.flush();
    let stats = result?;
    flushed?;
    Ok(stats)
}

/// Discovers input files under `folder` and runs every one of them.
///
/// With `workers` unset, the configured worker count is lowered to the number of files when there
/// are fewer. An explicit count larger than the number of files is an error.
pub fn run_folder(
    folder: &Path,
    expected_files: usize,
    workers: Option<usize>,
    config: &RunConfig,
    collaborators: Collaborators<'_>,
    sinks: &OutputSinks,
) -> Result<RunStats> {
    let files = collect_input_files(folder, &config.extension, expected_files)?;

    if files.len() != expected_files {
        warn!(
            "Expected {expected_files} .{} files; found {}",
            config.extension,
            files.len()
        );
    }

    let workers = workers.unwrap_or_else(|| config.workers.min(files.len()));
    info!(
        "Processing {} files from {} with {workers} workers",
        files.len(),
        folder.display()
    );

    let stats = run(&files, workers, config, collaborators, sinks)?;
    info!("Done: {stats}");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn assert_exact_cover(n: usize, chunks: &[WorkChunk]) {
        let mut seen = vec![0; n];
        for c in chunks {
            for i in c.range() {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&s| s == 1), "{chunks:?}");

        // Contiguous, in order.
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[chunks.len() - 1].end, n);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn partition_uneven() {
        let chunks = partition(103, 30).unwrap();
        assert_eq!(chunks.len(), 30);
        assert_exact_cover(103, &chunks);

        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes.iter().filter(|&&s| s == 4).count(), 13);
        assert_eq!(sizes.iter().filter(|&&s| s == 3).count(), 17);
    }

    #[test]
    fn partition_various() {
        for (n, w) in [(1, 1), (7, 7), (10, 3), (64, 8), (1000, 30)] {
            let chunks = partition(n, w).unwrap();
            assert_eq!(chunks.len(), w);
            assert!(chunks.iter().all(|c| !c.is_empty()));
            assert_exact_cover(n, &chunks);
        }
    }

    #[test]
    fn partition_errors() {
        assert!(matches!(partition(10, 0), Err(Error::NoWorkers)));
        assert!(matches!(
            partition(3, 4),
            Err(Error::TooManyWorkers {
                workers: 4,
                files: 3
            })
        ));
    }

    #[test]
    fn collects_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("b");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("c.pdbqt"), "").unwrap();
        fs::write(sub.join("a.PDBQT"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = collect_input_files(dir.path(), "pdbqt", 0).unwrap();
        assert_eq!(files, vec![sub.join("a.PDBQT"), dir.path().join("c.pdbqt")]);
    }

    #[test]
    fn no_input_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_input_files(dir.path(), "pdbqt", 0),
            Err(Error::NoInputFiles { .. })
        ));
    }

    #[test]
    fn stats_merge() {
        let mut a = RunStats::default();
        a.record(&Outcome::Accepted { conformers: 4 });
        a.record(&Outcome::Skipped(SkipReason::Parse("x".to_string())));

        let mut b = RunStats::default();
        b.record(&Outcome::Skipped(SkipReason::Embedding {
            produced: 0,
            required: 4,
        }));
        b.skipped_malformed = 2;

        a.merge(&b);
        assert_eq!(a.records, 3);
        assert_eq!(a.accepted, 1);
        assert_eq!(a.conformers, 4);
        assert_eq!(a.skipped_parse, 1);
        assert_eq!(a.skipped_embedding, 1);
        assert_eq!(a.skipped_malformed, 2);
    }
}
