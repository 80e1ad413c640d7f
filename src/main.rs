use clap::{Args, Parser, Subcommand};
use demobench::bench::{BenchmarkRunner, FileSet, ProgressEvent};
use demobench::config::persistence::ResultsStorage;
use demobench::config::BenchmarkConfig;
use demobench::parser::{child_peak_rss, CommandParserFactory};
use demobench::report::{self, Reporter};
use demobench::{error, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time the parser over the demo files
    Run(RunArgs),
    /// Show saved benchmark results
    History {
        /// Number of most recent results to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Configuration file to read instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the configuration to the default location
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Glob pattern selecting demo files
    #[arg(short, long)]
    pattern: Option<String>,
    /// Number of trials
    #[arg(short = 'n', long)]
    trials: Option<usize>,
    /// Event to extract
    #[arg(short, long)]
    event: Option<String>,
    /// Player field to project, repeatable
    #[arg(long = "player-field")]
    player_fields: Vec<String>,
    /// Project no player fields, overriding the configuration
    #[arg(long, conflicts_with = "player_fields")]
    no_player_fields: bool,
    /// Non-player field to project, repeatable
    #[arg(long = "other-field")]
    other_fields: Vec<String>,
    /// Project no non-player fields, overriding the configuration
    #[arg(long, conflicts_with = "other_fields")]
    no_other_fields: bool,
    /// Shuffle the file order before every trial
    #[arg(long)]
    shuffle: bool,
    /// Keep discovery order even if the configuration shuffles
    #[arg(long, conflicts_with = "shuffle")]
    no_shuffle: bool,
    /// Seed for --shuffle
    #[arg(long, requires = "shuffle")]
    seed: Option<u64>,
    /// Configuration file to read instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Disable colored output
    #[arg(long)]
    no_color: bool,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    /// Append the result to the saved history
    #[arg(long)]
    save: bool,
}

impl RunArgs {
    /// Layer command line overrides on top of a loaded configuration
    fn apply(&self, mut config: BenchmarkConfig) -> BenchmarkConfig {
        if let Some(pattern) = &self.pattern {
            config.file_pattern = pattern.clone();
        }
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(event) = &self.event {
            config.event_name = event.clone();
        }
        if self.no_player_fields {
            config.player_fields.clear();
        } else if !self.player_fields.is_empty() {
            config.player_fields = self.player_fields.clone();
        }
        if self.no_other_fields {
            config.other_fields.clear();
        } else if !self.other_fields.is_empty() {
            config.other_fields = self.other_fields.clone();
        }
        if self.shuffle {
            config.shuffle = true;
            config.seed = self.seed.or(config.seed);
        } else if self.no_shuffle {
            config.shuffle = false;
            config.seed = None;
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Run(args) => run(&args),
        Commands::History { limit } => history(limit),
        Commands::Config { config, save } => show_config(config.as_deref(), save),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {}", error::user_friendly_message(&e));
            ExitCode::from(error::exit_code(&e))
        }
    }
}

fn init_logging(verbose: u8) {
    let default_directive = match verbose {
        0 => "demobench=warn",
        1 => "demobench=info",
        _ => "demobench=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BenchmarkConfig> {
    match path {
        Some(path) => BenchmarkConfig::load_from(path),
        None => BenchmarkConfig::load(),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let config = args.apply(load_config(args.config.as_deref())?);
    config.validate()?;

    let files = FileSet::discover(&config.file_pattern)?;
    let factory = CommandParserFactory::new(config.parser.clone())?;
    let runner = BenchmarkRunner::new(config.clone(), factory)?;
    let trials = config.trials;

    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), !args.no_color);
    if !args.json {
        reporter.header(files.len(), trials, &config.event_name)?;
    }

    let pb = report::progress_bar((files.len() * trials) as u64);
    let outcome = runner.run_with_progress(&files, |event| match event {
        ProgressEvent::TrialStarted { trial, trials } => {
            pb.set_message(format!("trial {}/{}", trial, trials));
        }
        ProgressEvent::FileParsed { .. } => pb.inc(1),
        ProgressEvent::TrialFinished(result) => {
            if !args.json {
                if let Err(e) = pb.suspend(|| reporter.trial(result, trials)) {
                    tracing::warn!(error = %e, "failed to write trial line");
                }
            }
        }
    });
    pb.finish_and_clear();

    let result = outcome?.into_result(config, child_peak_rss());

    if args.json {
        reporter.json(&result)?;
    } else {
        reporter.summary(&result)?;
    }

    if args.save {
        let storage = ResultsStorage::new()?;
        storage.append_result(result)?;
        tracing::info!(path = %storage.results_path().display(), "saved result");
    }

    Ok(())
}

fn history(limit: usize) -> Result<()> {
    let storage = ResultsStorage::new()?;
    let results = storage.get_recent_results(limit)?;

    if results.is_empty() {
        println!(
            "No saved results in {}",
            storage.results_path().display()
        );
        return Ok(());
    }

    let stdout = io::stdout();
    Reporter::new(stdout.lock(), false).history(&results)
}

fn show_config(path: Option<&Path>, save: bool) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml()?);

    if save {
        let saved_to = config.save()?;
        eprintln!("Saved configuration to {}", saved_to.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "demobench",
            "run",
            "--pattern",
            "/demos/*.dem",
            "-n",
            "3",
            "--player-field",
            "X",
            "--player-field",
            "Z",
            "--shuffle",
            "--seed",
            "9",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let config = args.apply(BenchmarkConfig::default());
        assert_eq!(config.file_pattern, "/demos/*.dem");
        assert_eq!(config.trials, 3);
        assert_eq!(config.player_fields, vec!["X", "Z"]);
        assert_eq!(config.event_name, "player_death");
        assert!(config.shuffle);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn test_flags_clear_configured_values() {
        let cli = Cli::parse_from([
            "demobench",
            "run",
            "--no-player-fields",
            "--no-other-fields",
            "--no-shuffle",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let configured = BenchmarkConfig::default()
            .with_other_fields(["round"])
            .with_shuffle(true, Some(3));
        let config = args.apply(configured);
        assert!(config.player_fields.is_empty());
        assert!(config.other_fields.is_empty());
        assert!(!config.shuffle);
        assert_eq!(config.seed, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Cli::try_parse_from(["demobench", "run", "--shuffle", "--no-shuffle"]).is_err());
        assert!(Cli::try_parse_from([
            "demobench",
            "run",
            "--player-field",
            "X",
            "--no-player-fields"
        ])
        .is_err());
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let config = BenchmarkConfig::default().with_other_fields(["round"]);
        assert_eq!(RunArgs::default().apply(config.clone()), config);
    }
}
