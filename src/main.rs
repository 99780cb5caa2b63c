//! dlsession - DL-Learner session client
//!
//! CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use dlsession::cli::describe::{DescribeCommand, DescribeOptions};
use dlsession::cli::learn::{LearnCommand, LearnOptions};
use dlsession::cli::sample::{SampleCommand, SampleOptions};
use dlsession::config::{descriptor_cache_dir, Config};
use dlsession::core::{KnowledgeSource, LearningProblem};
use dlsession::error::exit_codes;
use dlsession::transport::HttpTransport;

// =============================================================================
// CLI Definition
// =============================================================================

/// dlsession - run concept-learning sessions against a DL-Learner service
#[derive(Parser)]
#[command(name = "dlsession")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service address, overriding config and environment
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn a concept from positive and negative examples
    Learn {
        /// Ontology file or URL to learn over
        ontology: String,
        /// Treat the ontology as a URL rather than a file path
        #[arg(long)]
        url: bool,
        /// Positive example individuals (repeat or comma-separate)
        #[arg(long = "positive", short = 'p', value_delimiter = ',', required = true)]
        positives: Vec<String>,
        /// Negative example individuals (repeat or comma-separate)
        #[arg(long = "negative", short = 'n', value_delimiter = ',')]
        negatives: Vec<String>,
        /// Reasoner component key
        #[arg(long)]
        reasoner: Option<String>,
        /// Learning algorithm component key
        #[arg(long)]
        algorithm: Option<String>,
        /// Give up after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Refetch the service descriptor
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the operations the service advertises
    Describe {
        /// Refetch the service descriptor
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Draw a seeded instance sample around known positives
    Sample {
        /// Known positive individuals
        #[arg(required = true)]
        positives: Vec<String>,
        /// Record list to draw from
        #[arg(long)]
        records: Option<PathBuf>,
        /// Instance budget
        #[arg(long)]
        instances: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Print the effective configuration
    Config {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dlsession error: {}", e);
            ExitCode::from(exit_codes::USAGE as u8)
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint.address = endpoint;
    }

    match cli.command {
        Commands::Learn {
            ontology,
            url,
            positives,
            negatives,
            reasoner,
            algorithm,
            deadline_secs,
            refresh,
            json,
            quiet,
        } => {
            let source = if url {
                KnowledgeSource::url(ontology)
            } else {
                KnowledgeSource::file(ontology)
            };
            let options = LearnOptions {
                json,
                quiet,
                refresh,
                deadline: deadline_secs.map(Duration::from_secs),
                reasoner,
                algorithm,
            };
            run_learn(config, &source, &LearningProblem::new(positives, negatives), &options)
        }
        Commands::Describe {
            refresh,
            json,
            quiet,
        } => run_describe(config, &DescribeOptions { json, quiet, refresh }),
        Commands::Sample {
            positives,
            records,
            instances,
            seed,
            json,
            quiet,
        } => {
            let options = SampleOptions {
                json,
                quiet,
                instances,
                seed,
                records,
            };
            run_sample(config, &positives, &options)
        }
        Commands::Config { json } => run_config(&config, json),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn http_transport(config: &Config) -> Result<HttpTransport, Box<dyn std::error::Error>> {
    let endpoint = config.service_endpoint()?;
    Ok(HttpTransport::new(&endpoint, config.timeouts.connect())?)
}

fn print(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

fn run_learn(
    config: Config,
    source: &KnowledgeSource,
    problem: &LearningProblem,
    options: &LearnOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let transport = http_transport(&config)?;
    let cmd = LearnCommand::new(config, transport, descriptor_cache_dir());

    let output = cmd.run(source, problem, options);
    print(&cmd.format_output(&output, options));

    Ok(ExitCode::from(output.exit_code as u8))
}

fn run_describe(
    config: Config,
    options: &DescribeOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let transport = http_transport(&config)?;
    let cmd = DescribeCommand::new(config, transport, descriptor_cache_dir());

    let output = cmd.run(options);
    print(&cmd.format_output(&output, options));

    Ok(success_to_exit_code(output.success, exit_codes::TRANSPORT))
}

fn run_sample(
    config: Config,
    positives: &[String],
    options: &SampleOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = SampleCommand::new(config);

    let output = cmd.run(positives, options);
    print(&cmd.format_output(&output, options));

    Ok(success_to_exit_code(output.success, exit_codes::USAGE))
}

fn run_config(config: &Config, json: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(ExitCode::from(exit_codes::SUCCESS as u8))
}

fn success_to_exit_code(success: bool, failure: i32) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(failure as u8)
    }
}
