//! markov-map CLI: MAP inference over Markov Logic Networks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use markov_map::config::{EngineConfig, InferenceMethod};
use markov_map::engine::Engine;
use markov_map::export::{write_json, write_text};
use markov_map::problem::Problem;

#[derive(Parser)]
#[command(name = "markov-map", version, about = "MAP inference for Markov Logic Networks")]
struct Cli {
    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground a problem and run MAP inference.
    Infer {
        /// Problem file (JSON).
        #[arg(long)]
        problem: PathBuf,

        /// Override the configured inference method (maxwalksat, ilp).
        #[arg(long)]
        method: Option<InferenceMethod>,

        /// Write results here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Emit a JSON document with a run summary instead of text lines.
        #[arg(long)]
        json: bool,
    },

    /// Ground a problem and report network statistics.
    Ground {
        /// Problem file (JSON).
        #[arg(long)]
        problem: PathBuf,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to this path.
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Infer {
            problem,
            method,
            output,
            json,
        } => {
            let mut config = config;
            if let Some(method) = method {
                config.inference.method = method;
            }
            let engine = Engine::new(config)?;
            let mln = Problem::load(&problem)?.into_mln()?;
            let outcome = engine.infer(&mln)?;

            let writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path).into_diagnostic()?)),
                None => Box::new(std::io::stdout().lock()),
            };
            if json {
                write_json(writer, &outcome.export()).into_diagnostic()?;
            } else {
                write_text(writer, &outcome.atoms).into_diagnostic()?;
            }
            if let Some(path) = &output {
                eprintln!("{}", outcome.summary());
                eprintln!("Wrote {} atoms to {}", outcome.atoms.len(), path.display());
            }
        }

        Commands::Ground { problem } => {
            let engine = Engine::new(config)?;
            let mln = Problem::load(&problem)?.into_mln()?;
            let (mrf, summary) = engine.ground(&mln)?;
            println!("Grounded {}", problem.display());
            println!("  rounds:          {}{}", summary.rounds, if summary.truncated { " (truncated)" } else { "" });
            println!("  interest atoms:  {}", summary.interest_atoms);
            println!("  ground atoms:    {}", mrf.atom_count());
            println!(
                "  ground clauses:  {} ({} hard)",
                mrf.constraint_count(),
                mrf.hard_count()
            );
            println!("  substitutions:   {}", summary.stats.substitutions);
            println!(
                "  pruned:          {} tautologies, {} absent, {} falsified, {} filtered",
                summary.stats.tautologies,
                summary.stats.absent,
                summary.stats.falsified,
                summary.stats.filtered
            );
            println!("  elapsed:         {} ms", summary.elapsed.as_millis());
        }

        Commands::Config { save } => {
            config.validate()?;
            let text = config.to_toml().map_err(|e| miette::miette!(e))?;
            print!("{text}");
            if let Some(path) = save {
                config.save(&path)?;
                eprintln!("Saved configuration to {}", path.display());
            }
        }
    }

    Ok(())
}
