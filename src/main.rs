//! Command-line interface for relfeed
//!
//! # Usage Examples
//!
//! ## Decode
//! ```bash
//! # Decode an event log, configuration from a file
//! relfeed decode --input changes.jsonl --config relfeed.toml
//!
//! # Read from stdin, pretty output with transaction ids
//! relfeed decode -o pretty-print -o include-xids=on < changes.jsonl
//!
//! # Only the orders table, without its notes column
//! relfeed decode -o 'include={"table": "orders", "skip_columns": ["notes"]}' < changes.jsonl
//! ```
//!
//! ## Check Configuration
//! ```bash
//! relfeed check-config --config relfeed.toml -o 'exclude={"tables": "^tmp_"}'
//! ```
//!
//! The change stream goes to stdout, one flushed message per line; logs go
//! to stderr and are controlled by `RUST_LOG` (or `--verbose`).

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use relfeed::load_decoder_config;
use relfeed_json::{JsonDecoder, WriterSink};
use relfeed_replay_source::Replayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relfeed")]
#[command(about = "Stream committed row changes as JSON documents, one per transaction")]
#[command(long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a change event log into a JSON change stream on stdout
    Decode {
        /// Event log to read, `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate options and rules, and print the resulting rule list
    CheckConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(long, env = "RELFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Decoder option `NAME[=VALUE]`, applied after the configuration file
    #[arg(short = 'o', long = "option", value_name = "NAME[=VALUE]")]
    options: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Decode { input, config } => {
            let decoder_config = load_decoder_config(config.config.as_deref(), &config.options)?;
            let stdout = io::stdout();
            let decoder = JsonDecoder::new(decoder_config, WriterSink::new(stdout.lock()));
            let mut replayer = Replayer::new(decoder);

            let summary = if input.as_os_str() == "-" {
                replayer.replay(io::stdin().lock(), "stdin")?
            } else {
                let file = File::open(&input)
                    .with_context(|| format!("Failed to open event log: {}", input.display()))?;
                replayer.replay(BufReader::new(file), &input.display().to_string())?
            };
            info!("{summary}");
        }
        Commands::CheckConfig { config } => {
            let decoder_config = load_decoder_config(config.config.as_deref(), &config.options)?;
            println!("{:#?}", decoder_config.options);
            if decoder_config.rules.is_empty() {
                println!("no rules: every table is included");
            }
            for rule in decoder_config.rules.iter() {
                println!("{rule}");
            }
        }
    }

    Ok(())
}
