//! fsp CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use fsp_solver::{MarginalDistribution, StateSpaceEnumeration};
use nalgebra::DMatrix;
use std::path::PathBuf;

mod network;

use network::NetworkDocument;

#[derive(Parser)]
#[command(name = "fsp")]
#[command(about = "fsp - Finite state projection sensitivities for reaction networks")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Marginal distributions and parameter sensitivities
    Marginal {
        /// Input network document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Print the truncated state-space enumeration
    States {
        /// Truncation parameter
        #[arg(long)]
        cr: u64,

        /// Number of species
        #[arg(long, default_value = "1")]
        dim: usize,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Marginal { input, output, threads } => {
            cmd_marginal(&input, output.as_ref(), threads)
        }
        Commands::States { cr, dim, output } => cmd_states(cr, dim, output.as_ref()),
        Commands::Version => {
            println!("fsp {}", fsp_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_marginal(input: &PathBuf, output: Option<&PathBuf>, threads: usize) -> Result<()> {
    let doc = load_document(input, threads)?;
    let fsp = doc.solver()?;
    let species = doc.species(fsp.crn().n_species());
    let init = fsp.point_mass_initial_state(&doc.initial_state)?;

    tracing::info!(
        n_states = fsp.n_states(),
        reactions = fsp.crn().n_reactions(),
        times = doc.times.len(),
        "solving"
    );
    let marginals = fsp.marginals(&species, &init, &doc.times, &doc.parameters)?;
    tracing::info!(species = marginals.len(), "solve complete");

    let per_species: serde_json::Map<String, serde_json::Value> =
        marginals.iter().map(|(s, m)| (s.to_string(), marginal_json(m))).collect();

    let output_json = serde_json::json!({
        "cr": fsp.config().cr,
        "n_states": fsp.n_states(),
        "parameters": doc.parameters,
        "times": doc.times,
        "marginals": per_species,
    });

    write_json(output, output_json)
}

fn cmd_states(cr: u64, dim: usize, output: Option<&PathBuf>) -> Result<()> {
    let space = StateSpaceEnumeration::new(cr, dim)?;
    tracing::info!(n_states = space.n_states(), "enumeration built");

    let output_json = serde_json::json!({
        "cr": space.cr(),
        "dim": space.dim(),
        "lower_bound": space.lower_bound(),
        "upper_bound": space.upper_bound(),
        "n_states": space.n_states(),
        "states": space.states(),
    });

    write_json(output, output_json)
}

fn load_document(input: &PathBuf, threads: usize) -> Result<NetworkDocument> {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    tracing::info!(path = %input.display(), "loading network");
    let json = std::fs::read_to_string(input)?;
    let doc: NetworkDocument = serde_json::from_str(&json)?;
    tracing::info!(reactions = doc.reactions.len(), cr = doc.config.cr, "network loaded");
    Ok(doc)
}

fn marginal_json(m: &MarginalDistribution) -> serde_json::Value {
    let sensitivities: Vec<Vec<Vec<f64>>> = m.sensitivities.iter().map(rows).collect();
    serde_json::json!({
        "probabilities": rows(&m.probabilities),
        "sensitivities": sensitivities,
        "mean": m.mean(),
        "mean_gradient": rows(&m.expectation_gradient(|k| k as f64)),
        "retained_mass": m.retained_mass(),
    })
}

fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
