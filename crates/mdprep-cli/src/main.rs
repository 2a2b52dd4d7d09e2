mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, convert::ConvertSubcommand, ligand::LigandSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mdprep",
    about = "Prepare protein and protein-ligand systems for GROMACS: ligand QM, RESP, tleap, conversion, equilibration",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: nearest directory with mdprep.yaml or system* folders)
    #[arg(long, global = true, env = "MDPREP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug-level logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write mdprep.yaml, create system subfolders and default mdp templates
    Init,

    /// Show the pending stage of every system
    Status,

    /// Check that the configured external tools are on PATH
    Doctor,

    /// Show or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Ligand quantum chemistry (Gaussian)
    Ligand {
        #[command(subcommand)]
        subcommand: LigandSubcommand,
    },

    /// Fit RESP charges and missing parameters from finished Gaussian logs
    Resp {
        /// Refit even when lig.prep and lig.frcmod already exist
        #[arg(long)]
        force: bool,
    },

    /// Write LIG.PDB with antechamber atom names and input coordinates
    Atoms,

    /// Build AMBER topologies with tleap
    Topology,

    /// Convert AMBER topologies to GROMACS and add position restraints
    Convert {
        #[command(subcommand)]
        subcommand: ConvertSubcommand,
    },

    /// Run EM and NVT/NPT equilibration across the configured GPUs
    Equilibrate,

    /// Run the whole pipeline
    Run {
        /// System type: protein (0) or complex (1)
        kind: String,

        /// Stop after submitting Gaussian jobs instead of waiting for them
        #[arg(long)]
        no_wait: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Status
            | Commands::Doctor
            | Commands::Config { .. }
            | Commands::Ligand {
                subcommand: LigandSubcommand::Check,
            } => tracing::Level::WARN,
            _ => tracing::Level::INFO,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Doctor => cmd::doctor::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Ligand { subcommand } => cmd::ligand::run(&root, subcommand, cli.json),
        Commands::Resp { force } => cmd::resp::run(&root, force, cli.json),
        Commands::Atoms => cmd::atoms::run(&root, cli.json),
        Commands::Topology => cmd::topology::run(&root, cli.json),
        Commands::Convert { subcommand } => cmd::convert::run(&root, subcommand, cli.json),
        Commands::Equilibrate => cmd::equilibrate::run(&root, cli.json),
        Commands::Run { kind, no_wait } => cmd::run::run(&root, &kind, no_wait, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
