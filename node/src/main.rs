//! Tessera Node Binary

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tessera_core::{FatalError, NodeConfig, Prefix, StateVersion};
use tessera_fsm::CommandOutput;
use tessera_node::NodeRuntime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status used when a committed entry cannot be decoded
const FATAL_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(name = "tessera-node")]
#[command(about = "Tessera node - replicated-log state machine over a durable key-value store")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an insert command
    Insert {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        value: String,
    },

    /// Apply every line of a log file as one committed entry
    Replay {
        /// File with one command envelope per line
        #[arg(short, long)]
        log: PathBuf,
    },

    /// Look up a single key
    Get {
        /// Namespace: history or version
        #[arg(short, long, default_value = "history")]
        namespace: Prefix,

        #[arg(short, long)]
        key: String,
    },

    /// List keys in [start, end]
    Range {
        #[arg(short, long, default_value = "history")]
        namespace: Prefix,

        #[arg(short, long, default_value = "")]
        start: String,

        #[arg(short, long, default_value = "\u{10FFFF}")]
        end: String,
    },

    /// Write a snapshot of the store to a file
    Snapshot {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the store with a snapshot file
    Restore {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the next version the state machine will attribute
    Version,

    /// Write a default configuration file
    InitConfig {
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &NodeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_output(output: &CommandOutput) {
    match output {
        CommandOutput::Inserted(receipt) => {
            let json = serde_json::json!({
                "key": receipt.key,
                "version": receipt.version.0,
                "commitment": receipt.commitment.to_hex(),
            });
            println!("{}", json);
        }
    }
}

/// Render a stored value for the terminal. The version namespace holds fixed-width counters.
fn render_value(namespace: Prefix, value: &[u8]) -> String {
    match namespace {
        Prefix::Version => match StateVersion::from_bytes(value) {
            Some(version) => version.0.to_string(),
            None => format!("<corrupt: {} bytes>", value.len()),
        },
        Prefix::History => String::from_utf8_lossy(value).into_owned(),
    }
}

fn write_config(config: &NodeConfig, output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, config.to_json()?)?;
    println!("Configuration saved to: {}", output.display());
    Ok(())
}

/// Stop the process. Continuing past an undecodable entry would diverge from the cluster.
fn halt(fatal: &FatalError) -> ! {
    error!("Halting: {}", fatal);
    eprintln!("fatal: {}", fatal);
    std::process::exit(FATAL_EXIT_CODE);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config);

    // Writing a configuration must not require an openable store
    if let Commands::InitConfig { output } = &cli.command {
        return write_config(&config, output);
    }

    let runtime = NodeRuntime::open(config).await?;
    let outcome = run(&runtime, cli.command).await;
    let closed = runtime.close().await;

    match settle(outcome, closed) {
        Ok(result) => result,
        Err(fatal) => halt(&fatal),
    }
}

/// Fold the close result into the command outcome. A fatal entry takes precedence
/// over everything else, including a failed close.
fn settle(
    outcome: anyhow::Result<()>,
    closed: anyhow::Result<()>,
) -> Result<anyhow::Result<()>, FatalError> {
    match outcome {
        Ok(()) => Ok(closed),
        Err(err) => match err.downcast::<FatalError>() {
            Ok(fatal) => {
                if let Err(e) = closed {
                    warn!("Close failed while halting: {:#}", e);
                }
                Err(fatal)
            }
            Err(err) => {
                if let Err(e) = closed {
                    warn!("Close failed: {:#}", e);
                }
                Ok(Err(err))
            }
        },
    }
}

async fn run(runtime: &NodeRuntime, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Insert { key, value } => match runtime.insert(&key, &value).await? {
            Ok(output) => print_output(&output),
            Err(e) => anyhow::bail!("insert rejected: {}", e),
        },

        Commands::Replay { log } => {
            let summary = runtime.replay(&log).await?;
            println!("applied: {}, failed: {}", summary.applied, summary.failed);
        }

        Commands::Get { namespace, key } => match runtime.get(namespace, &key).await? {
            Some(value) => println!("{}", render_value(namespace, &value)),
            None => anyhow::bail!("key '{}' not found in {}", key, namespace),
        },

        Commands::Range {
            namespace,
            start,
            end,
        } => {
            for pair in runtime.range(namespace, &start, &end).await? {
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&pair.key),
                    render_value(namespace, &pair.value)
                );
            }
        }

        Commands::Snapshot { output } => {
            let count = runtime.snapshot_to(&output).await?;
            println!("Snapshot of {} entries saved to: {}", count, output.display());
        }

        Commands::Restore { input } => {
            runtime.restore_from(&input).await?;
            info!("Restored from {}", input.display());
            println!("Restored; next version {}", runtime.next_version());
        }

        Commands::Version => println!("{}", runtime.next_version()),

        // Handled in main before the store is opened
        Commands::InitConfig { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fatal() -> FatalError {
        FatalError {
            index: 3,
            term: 1,
            reason: "bad envelope".into(),
        }
    }

    #[test]
    fn test_fatal_entry_wins_over_close_failure() {
        let settled = settle(Err(fatal().into()), Err(anyhow::anyhow!("flush failed")));
        assert_eq!(settled.unwrap_err(), fatal());
    }

    #[test]
    fn test_close_failure_reported_after_success() {
        let settled = settle(Ok(()), Err(anyhow::anyhow!("flush failed"))).unwrap();
        assert_eq!(settled.unwrap_err().to_string(), "flush failed");
        assert!(settle(Ok(()), Ok(())).unwrap().is_ok());
    }

    #[test]
    fn test_command_error_is_not_fatal() {
        let settled = settle(Err(anyhow::anyhow!("key missing")), Ok(())).unwrap();
        assert_eq!(settled.unwrap_err().to_string(), "key missing");
    }

    #[test]
    fn test_render_version_value() {
        let stored = StateVersion::new(258).to_bytes();
        assert_eq!(render_value(Prefix::Version, &stored), "258");
        assert_eq!(render_value(Prefix::Version, b"abc"), "<corrupt: 3 bytes>");
        assert_eq!(render_value(Prefix::History, b"hello"), "hello");
    }
}
