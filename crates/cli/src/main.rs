mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use respro_eval::EngineConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Response, outcome and template processing for assessment items.
#[derive(Parser)]
#[command(
    name = "respro",
    version,
    about = "Response, outcome and template processing for assessment items"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Random seed; overrides the config file
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run template and response processing for one item
    Item {
        /// Path to the item JSON document
        file: PathBuf,
        /// Path to a JSON object of candidate responses keyed by identifier
        #[arg(long)]
        responses: Option<PathBuf>,
    },

    /// Run test-level outcome processing against a session
    Test {
        /// Path to the test JSON document
        file: PathBuf,
        /// Path to the session JSON (`{"items": [...]}`)
        #[arg(long)]
        session: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
    if let Some(seed) = cli.seed {
        config.random.seed = Some(seed);
    }

    match cli.command {
        Commands::Item { file, responses } => {
            commands::item::cmd_item(&file, responses.as_deref(), &config, cli.output, cli.quiet);
        }
        Commands::Test { file, session } => {
            commands::test::cmd_test(&file, &session, &config, cli.output, cli.quiet);
        }
    }
}

fn load_config(path: Option<&std::path::Path>, output: OutputFormat, quiet: bool) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading config '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let config: EngineConfig = match toml::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("error parsing config '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if config.template.max_attempts == 0 {
        report_error("error: template.max_attempts must be at least 1", output, quiet);
        process::exit(1);
    }
    config
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
