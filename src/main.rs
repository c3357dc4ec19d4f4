//! # Convo Sync CLI (`convo`)
//!
//! ```bash
//! convo --config ./config/convo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `convo ensure` | Bootstrap the index, or load and verify the existing one |
//! | `convo sync` | Append only messages the index does not have yet |
//! | `convo reset` | Delete the index and its metadata |
//! | `convo status` | Show stored metadata and the real entry count |
//! | `convo query "<text>"` | Similarity search over the index |
//! | `convo context` | Latest messages of the thread |
//! | `convo reply` | Draft a reply to the partner's latest message |
//! | `convo analyze` | Describe the partner from indexed messages |
//! | `convo wishlist` | Checklist of plans from the whole conversation |
//!
//! Logging goes to stderr and honors `RUST_LOG` (default `convo_sync=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use convo_sync::commands;
use convo_sync::config;
use convo_sync::context::DEFAULT_RECENT;
use convo_sync::models::DataType;

/// Convo Sync: incremental chat-thread indexing and retrieval.
#[derive(Parser)]
#[command(
    name = "convo",
    about = "Incrementally index a chat thread for similarity search and reply drafting",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/convo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the index if absent, otherwise load and probe it.
    ///
    /// A corrupt index is deleted and rebuilt once.
    Ensure {
        #[arg(long, default_value = "partner_only")]
        data_type: DataType,
    },

    /// Fetch current messages and append the ones not yet indexed.
    Sync {
        #[arg(long, default_value = "partner_only")]
        data_type: DataType,

        /// Only report how many messages are new.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete the index directory and metadata file.
    ///
    /// Escalates to a forced OS-level removal if the directory is locked,
    /// and prints manual steps if that fails too.
    Reset {
        #[arg(long, default_value = "partner_only")]
        data_type: DataType,
    },

    /// Show stored metadata and the actual number of indexed entries.
    Status {
        #[arg(long, default_value = "partner_only")]
        data_type: DataType,
    },

    /// Similarity search over the index.
    Query {
        text: String,

        #[arg(long, default_value = "partner_only")]
        data_type: DataType,

        /// Number of results.
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },

    /// Show the latest messages of the thread.
    Context {
        #[arg(short, long, default_value_t = DEFAULT_RECENT)]
        n: usize,
    },

    /// Draft a reply to the partner's latest message.
    Reply {
        #[arg(long, default_value = "full_conversation")]
        data_type: DataType,

        /// Recent messages included in the prompt.
        #[arg(short, long, default_value_t = DEFAULT_RECENT)]
        n: usize,
    },

    /// Describe the partner's personality and interests.
    Analyze {
        #[arg(long, default_value = "partner_only")]
        data_type: DataType,

        /// Indexed messages handed to the generator.
        #[arg(short, long, default_value_t = 20)]
        k: usize,
    },

    /// List things both people want to do together, from the full conversation.
    Wishlist {
        /// Indexed messages handed to the generator.
        #[arg(short, long, default_value_t = 30)]
        k: usize,

        /// Print the generator's Markdown instead of plain text.
        #[arg(long)]
        markdown: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("convo_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ensure { data_type } => commands::run_ensure(&cfg, data_type).await?,
        Commands::Sync { data_type, dry_run } => {
            commands::run_sync(&cfg, data_type, dry_run).await?
        }
        Commands::Reset { data_type } => commands::run_reset(&cfg, data_type).await?,
        Commands::Status { data_type } => commands::run_status(&cfg, data_type).await?,
        Commands::Query { text, data_type, k } => {
            commands::run_query(&cfg, data_type, &text, k).await?
        }
        Commands::Context { n } => commands::run_context(&cfg, n).await?,
        Commands::Reply { data_type, n } => commands::run_reply(&cfg, data_type, n).await?,
        Commands::Analyze { data_type, k } => commands::run_analyze(&cfg, data_type, k).await?,
        Commands::Wishlist { k, markdown } => commands::run_wishlist(&cfg, k, markdown).await?,
    }

    Ok(())
}
