use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;

use ctl_bdd::config::Config;
use ctl_bdd::session::Session;
use ctl_bdd::verifier::Verdict;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level.
    #[clap(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: simplelog::LevelFilter,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a CTL formula against every start state of a program.
    Check {
        /// Program source file.
        #[arg(value_name = "PROGRAM_FILE")]
        program: PathBuf,

        /// Atomic predicate, referred to by its position in the formula (repeatable).
        #[clap(long = "predicate", short = 'p', value_name = "COND")]
        predicates: Vec<String>,

        /// CTL formula over predicate numbers, e.g. "AG (0 OR EF 1)".
        #[clap(long, short = 'f', value_name = "CTL")]
        formula: String,

        /// Number of counterexamples to print (-1 for as many as allowed).
        #[clap(long, value_name = "INT", default_value = "10", allow_negative_numbers = true)]
        examples: i32,

        /// Operation cache size (in bits, so the actual size is `2^bits` entries).
        #[clap(long, value_name = "INT", default_value = "20", value_parser = clap::value_parser!(u8).range(0..=31))]
        cache_bits: u8,

        /// Node count that triggers garbage collection during translation.
        #[clap(long, value_name = "INT", default_value = "1048576")]
        gc_threshold: usize,
    },
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    match args.command {
        Command::Check {
            program,
            predicates,
            formula,
            examples,
            cache_bits,
            gc_threshold,
        } => {
            let source = std::fs::read_to_string(&program)
                .wrap_err_with(|| format!("Could not read program from {}", program.display()))?;

            let config = Config {
                cache_bits: usize::from(cache_bits),
                gc_threshold,
                ..Config::default()
            };
            let time_total = std::time::Instant::now();
            let mut session = Session::new(config);

            let verdict = session
                .verify(&source, &predicates, &formula)
                .wrap_err("Verification could not be completed")?;
            println!("{}", verdict);

            if verdict == Verdict::NotHolds {
                let counterexamples = session
                    .counterexamples(examples)
                    .wrap_err("Could not list counterexamples")?;
                for example in counterexamples {
                    println!("  {}", example);
                }
            }

            log::info!("Done in {:.3} s", time_total.elapsed().as_secs_f64());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut args = vec!["ctl-bdd", "check", "p.txt", "-p", "a == 1", "-f", "0"];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_cache_bits_range() {
        let Command::Check { cache_bits, .. } = check(&[]).unwrap().command;
        assert_eq!(cache_bits, 20);
        let Command::Check { cache_bits, .. } = check(&["--cache-bits", "31"]).unwrap().command;
        assert_eq!(cache_bits, 31);

        for bad in ["32", "40"] {
            let err = check(&["--cache-bits", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_negative_example_count() {
        let Command::Check { examples, .. } = check(&["--examples", "-1"]).unwrap().command;
        assert_eq!(examples, -1);
    }
}
