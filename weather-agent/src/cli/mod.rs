use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::{AppOptions, ConfigInput, WeatherApp};
use crate::config::{AgentMode, load_config_from_string};
use crate::constant::VERSION;
use crate::llm::API_KEY_ENV_VARS;
use crate::repl::Repl;
use crate::utils::init_logging;

pub mod info;

#[derive(Parser, Debug)]
#[command(
    name = "weather-agent",
    about = "Weather Agent, a conversational assistant for weather, temperature, rain and local time.",
    disable_version_flag = true,
    help_expected = true,
    max_term_width = 100
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long = "version", short = 'V', help = "Show version and exit.")]
    version: bool,

    #[arg(long, help = "Print tool calls while answering. Default: no.")]
    verbose: bool,

    #[arg(long, help = "Log debug information. Default: no.")]
    debug: bool,

    #[arg(long = "examples", short = 'e', help = "Run the demo example queries and exit.")]
    examples: bool,

    #[arg(
        long = "mode",
        value_enum,
        help = "How queries are answered. Default: mode set in config file (router)."
    )]
    mode: Option<AgentMode>,

    #[arg(
        long = "config",
        value_name = "TOML_OR_JSON",
        help = "Config TOML/JSON string to load. Default: none."
    )]
    config_string: Option<String>,

    #[arg(
        long = "config-file",
        value_name = "PATH",
        help = "Config TOML/JSON file to load. Default: ~/.weather-agent/config.toml."
    )]
    config_file: Option<PathBuf>,

    #[arg(
        long = "model",
        short = 'm',
        help = "LLM model to use. Default: default model set in config file."
    )]
    model_name: Option<String>,

    #[arg(
        long = "max-steps-per-turn",
        value_name = "N",
        help = "Maximum number of steps in one turn. Default: from config."
    )]
    max_steps_per_turn: Option<i64>,

    #[arg(
        long = "max-retries-per-step",
        value_name = "N",
        help = "Maximum number of retries in one step. Default: from config."
    )]
    max_retries_per_step: Option<i64>,

    #[arg(
        value_name = "QUERY",
        trailing_var_arg = true,
        help = "Answer a single query and exit. Default: interactive session."
    )]
    query: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version, modes and tools.
    Info(info::InfoArgs),
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("weather-agent, version {VERSION}");
        return Ok(());
    }

    init_logging(cli.debug).await?;

    if let Some(command) = cli.command {
        return match command {
            Commands::Info(args) => {
                info::run_info_command(args);
                Ok(())
            }
        };
    }

    validate_cli_args(&cli).await?;

    let config_input = if let Some(config_string) = cli.config_string.as_ref() {
        Some(ConfigInput::Inline(load_config_from_string(config_string)?))
    } else {
        cli.config_file.clone().map(ConfigInput::Path)
    };

    let options = AppOptions {
        model_name: cli.model_name.clone(),
        mode: cli.mode,
        max_steps_per_turn: cli.max_steps_per_turn,
        max_retries_per_step: cli.max_retries_per_step,
    };
    let app = WeatherApp::create(config_input, options).await?;
    if !app.has_llm() {
        print_demo_mode_warning();
    }

    let repl = Repl::new(app.agent()).with_verbose(cli.verbose);
    let mut stdout = tokio::io::stdout();
    if cli.examples {
        info!("Running example queries");
        return repl.run_examples(&mut stdout).await;
    }
    if !cli.query.is_empty() {
        let query = cli.query.join(" ");
        return repl.run_single(&query, &mut stdout).await;
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl.run_interactive(stdin, &mut stdout).await
}

fn print_demo_mode_warning() {
    let key_var = API_KEY_ENV_VARS
        .last()
        .copied()
        .unwrap_or("GOOGLE_API_KEY");
    println!("WARNING: {key_var} environment variable is not set.");
    println!("Running in demo mode with simulated AI responses.");
    println!("To use real Google AI Studio, set the environment variable with your API key.\n");
}

async fn validate_cli_args(cli: &Cli) -> Result<()> {
    let conflict_sets = [
        vec![
            ("--config", cli.config_string.is_some()),
            ("--config-file", cli.config_file.is_some()),
        ],
        vec![("--examples", cli.examples), ("QUERY", !cli.query.is_empty())],
    ];

    for option_set in conflict_sets {
        let active: Vec<&str> = option_set
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(flag, _)| *flag)
            .collect();
        if active.len() > 1 {
            anyhow::bail!("Cannot combine {}.", active.join(", "));
        }
    }

    if let Some(config_string) = cli.config_string.as_ref() {
        if config_string.trim().is_empty() {
            anyhow::bail!("Config cannot be empty.");
        }
    }

    if let Some(config_file) = cli.config_file.as_ref() {
        let metadata = tokio::fs::metadata(config_file)
            .await
            .with_context(|| format!("config file does not exist: {}", config_file.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("config file is not a file: {}", config_file.display());
        }
    }

    if let Some(max_steps) = cli.max_steps_per_turn {
        if max_steps < 1 {
            anyhow::bail!("max-steps-per-turn must be >= 1.");
        }
    }

    if let Some(max_retries) = cli.max_retries_per_step {
        if max_retries < 1 {
            anyhow::bail!("max-retries-per-step must be >= 1.");
        }
    }

    if let Some(model_name) = cli.model_name.as_ref() {
        if model_name.trim().is_empty() {
            anyhow::bail!("Model name cannot be empty.");
        }
    }

    Ok(())
}
