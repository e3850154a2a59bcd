//! Batch conformer, property and USRCAT descriptor generation for ligands in docking output.
//!
//! `usrcat_batch <INPUT_FOLDER> <CONFORMERS_SDF> <OUTPUT_SMI> <NUM_FILES>`

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use usrcat_batch::{
    Collaborators, OutputPaths, OutputSinks, Result, RunConfig, RunStats,
    embed::RandomCoordEmbedder, features::AtomTypingMatcher,
    properties::BasicPropertyCalculator, scheduler::run_folder, smiles::SmilesParser,
};

#[derive(Parser, Debug)]
#[command(name = "usrcat_batch", version)]
#[command(
    about = "Embed ligands from docking output, and write conformers, properties and USRCAT descriptors"
)]
struct Args {
    /// Folder searched recursively for input files (`.pdbqt` by default)
    input_folder: PathBuf,

    /// SDF file conformers are appended to. Binary property and descriptor files are written
    /// next to it.
    conformers: PathBuf,

    /// Identifier/SMILES file, tab-separated. Identifier-only and SMILES-only files are written
    /// next to it.
    output_smi: PathBuf,

    /// Number of input files expected in the folder
    num_files: usize,

    /// Worker threads. Defaults to the configured count, capped at the number of files
    #[arg(short, long)]
    workers: Option<usize>,

    /// TOML file overriding default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log each skipped record
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<RunStats> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let embedder = RandomCoordEmbedder::new(config.embed.num_threads)?;
    let collaborators = Collaborators {
        parser: &SmilesParser,
        embedder: &embedder,
        properties: &BasicPropertyCalculator,
        features: &AtomTypingMatcher,
    };

    let sinks = OutputSinks::open(OutputPaths::derive(&args.conformers, &args.output_smi))?;
    let paths = sinks.paths();
    info!(
        "Appending conformers to {}, descriptors to {}, identifiers to {}",
        paths.conformers.display(),
        paths.shape_descriptors.display(),
        paths.combined.display()
    );

    run_folder(
        &args.input_folder,
        args.num_files,
        args.workers,
        &config,
        collaborators,
        &sinks,
    )
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            // Help and version go to stdout, and aren't failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let default_filter = if args.verbose {
        "usrcat_batch=debug"
    } else {
        "usrcat_batch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_thread_names(true)
        .init();

    match run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
