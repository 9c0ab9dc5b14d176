use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use analyst_line::{AnalysisService, Config, SqliteCheckpointStore, service};

/// Business-analysis agent with a human approval gate.
#[derive(Parser, Debug)]
#[command(name = "analyst-line", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new run; stops at the approval gate
    Start {
        /// Business theme to research
        #[arg(short, long, default_value = "")]
        theme: String,
        /// Reuse a thread id instead of generating one
        #[arg(long)]
        thread_id: Option<String>,
    },
    /// Answer a pending approval (y, retry, or n)
    Resume {
        #[arg(long)]
        thread_id: String,
        #[arg(short, long)]
        decision: String,
    },
    /// Print the latest checkpoint of a thread
    Inspect {
        #[arg(long)]
        thread_id: String,
    },
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "info,analyst_line=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(config.debug_mode);

    let output = match cli.command {
        Command::Start { theme, thread_id } => {
            let svc = AnalysisService::from_config(&config).context("initializing service")?;
            serde_json::to_string_pretty(&svc.start(&theme, thread_id.as_deref())?)?
        }
        Command::Resume {
            thread_id,
            decision,
        } => {
            let svc = AnalysisService::from_config(&config).context("initializing service")?;
            serde_json::to_string_pretty(&svc.resume(&decision, &thread_id)?)?
        }
        Command::Inspect { thread_id } => {
            let store = SqliteCheckpointStore::open(&config.checkpoint_db)
                .context("opening checkpoint database")?;
            serde_json::to_string_pretty(&service::inspect(&store, &thread_id)?)?
        }
    };
    println!("{output}");
    Ok(())
}
