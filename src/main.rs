//! softlogic CLI: probabilistic soft logic inference.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use softlogic::config::EngineConfig;
use softlogic::engine::Engine;
use softlogic::problem::Problem;

#[derive(Parser)]
#[command(name = "softlogic", version, about = "Probabilistic soft logic inference")]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground, compile and solve a problem, printing the inferred values.
    Solve {
        /// Path to the JSON problem file.
        #[arg(long)]
        problem: PathBuf,

        /// Print the solve report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ground and compile a problem, printing statistics only.
    Ground {
        /// Path to the JSON problem file.
        #[arg(long)]
        problem: PathBuf,
    },

    /// Print the default configuration, or write it to a file.
    Config {
        /// Write to this path instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
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
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { problem, json } => {
            let mut engine = load_engine(cli.config.as_deref(), &problem)?;
            let report = engine.solve()?;

            if json {
                let text = serde_json::to_string_pretty(&report).into_diagnostic()?;
                println!("{text}");
            } else {
                print!("{report}");
                println!();
                for (id, value) in &report.values {
                    let label = engine.describe(*id).unwrap_or_else(|| id.to_string());
                    println!("{label} = {value:.4}");
                }
            }
        }

        Commands::Ground { problem } => {
            let mut engine = load_engine(cli.config.as_deref(), &problem)?;
            let stats = engine.build()?.clone();
            print!("{}", engine.grounding_stats());
            println!("compile");
            println!("  groundings:   {}", stats.groundings);
            println!("  satisfied:    {}", stats.satisfied);
            println!("  constant:     {}", stats.constant);
            println!("  terms:        {}", stats.terms);
            print!("{}", engine.info());
        }

        Commands::Config { output } => {
            let config = match cli.config.as_deref() {
                Some(path) => EngineConfig::load(path)?,
                None => EngineConfig::default(),
            };
            match output {
                Some(path) => {
                    config.save(&path)?;
                    println!("Wrote configuration to {}", path.display());
                }
                None => {
                    let text = config.to_toml().map_err(|e| miette::miette!("{e}"))?;
                    print!("{text}");
                }
            }
        }
    }

    Ok(())
}

fn load_engine(config: Option<&Path>, problem: &Path) -> Result<Engine> {
    let config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let problem = Problem::load(problem)?;
    let mut engine = Engine::new(config)?;
    problem.apply(&mut engine)?;
    Ok(engine)
}
