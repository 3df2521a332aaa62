//! geowam command-line entry point.
//!
//! Loads a rule and fact file, saturates the fact store under its rules,
//! attempts the `?-` goals it contains and prints what was derived.
#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use geowam::{Derivation, EngineBuilder, EngineConfig, FactSource, OccursCheck};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(ClapParser, Debug)]
#[command(name = "geowam", version, about = "Forward deduction over geometric facts with a WAM-style machine")]
struct Cli {
    /// Rule and fact file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Check that variables do not occur in the terms they are bound to
    #[arg(long)]
    occurs_check: bool,

    /// Saturation rounds before giving up on a fixpoint
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Instruction budget per derivation attempt (0 = unlimited)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Run derivation attempts one after another
    #[arg(long)]
    sequential: bool,

    /// Print the compiled code of every rule
    #[arg(long)]
    listing: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if self.occurs_check {
            config.occurs_check = OccursCheck::On;
        }
        if let Some(rounds) = self.max_rounds {
            config.max_rounds = rounds;
        }
        if let Some(steps) = self.max_steps {
            config.max_steps = steps;
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }

    fn read_input(&self) -> Result<String> {
        match &self.input {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            None => {
                let mut buffer = String::new();
                io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
                Ok(buffer)
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "geowam=debug" } else { "geowam=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<bool> {
    let config = cli.engine_config()?;
    let input = cli.read_input()?;
    let mut engine = EngineBuilder::new()
        .with_config(config)
        .build_str(&input)
        .context("failed to load rule source")?;

    println!("geowam {}", VERSION);
    println!(
        "  {} facts, {} rules, {} goals",
        engine.store().len(),
        engine.program().len(),
        engine.goals().len()
    );
    println!();

    if cli.listing {
        println!("{}", engine.program().listing());
        println!();
    }

    let saturation = engine.saturate()?;
    let symbols = engine.symbols().clone();
    if saturation.fixpoint {
        println!("FIXPOINT after {} rounds", saturation.rounds);
    } else {
        println!("ROUND LIMIT reached after {} rounds", saturation.rounds);
    }
    println!("Derived {} facts:", saturation.new_facts.len());
    for fact in &saturation.new_facts {
        println!("  {}.", fact.display(&symbols));
    }
    for rule in &saturation.aborted {
        println!("  (aborted: {})", rule);
    }

    let goals = engine.goals().to_vec();
    for goal in &goals {
        println!();
        println!("?- {}.", goal.display(&symbols));
        match engine.solve(goal)? {
            Derivation::Exhausted => println!("  no"),
            Derivation::Derived { solutions, .. } => {
                for solution in solutions {
                    println!("  {}", solution.head.display(&symbols));
                }
            }
        }
    }

    println!();
    println!("Statistics:");
    println!("{}", engine.statistics());
    Ok(saturation.fixpoint)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !run(&cli)? {
        process::exit(3);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use geowam::OccursCheck;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "geowam",
            "rules.pl",
            "--occurs-check",
            "--max-rounds",
            "4",
            "--sequential",
        ]);
        let config = cli.engine_config().expect("config");
        assert_eq!(config.occurs_check, OccursCheck::On);
        assert_eq!(config.max_rounds, 4);
        assert!(!config.parallel);
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::parse_from(["geowam"]);
        assert!(cli.input.is_none());
        let config = cli.engine_config().expect("config");
        assert_eq!(config, geowam::EngineConfig::default());
    }
}
