//! Clap CLI definitions for adctx.

use adctx_types::memory::{ExportFormat, DEFAULT_NAMESPACE};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  adctx add \"rust borrows are checked at compile time\"
  adctx update \"what is 2+2?\" \"4\" --ns math
  adctx query \"borrow checker\" -k 3
  adctx defrag --ns math
  adctx claim --ns math --batch 64     Stub trainer: drain pending samples
  adctx export --ns math -o math.json
  adctx stats --ns math";

/// adctx: namespace-partitioned semantic memory.
#[derive(Parser)]
#[command(
    name = "adctx",
    version,
    about = "adctx \u{00b7} semantic memory with autosave, defrag and a training queue",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Memorize a text.
    Add {
        /// Text to memorize.
        text: String,
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
    },
    /// Memorize a question/answer pair.
    Update {
        question: String,
        answer: String,
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
    },
    /// Retrieve the most similar memorized texts.
    Query {
        query: String,
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
        /// Number of results (defaults to `search.default_top_k`).
        #[arg(short, long)]
        k: Option<usize>,
        /// Do not memorize the query, whatever the config says.
        #[arg(long)]
        no_autosave: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Remove duplicate texts from a namespace.
    Defrag {
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
    },
    /// Claim a batch of pending training samples (stub trainer).
    Claim {
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
        /// Maximum batch size (defaults to `training.default_batch_size`).
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Export a namespace.
    Export {
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
        #[arg(long, value_enum, default_value = "json")]
        format: FormatArg,
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an exported namespace file.
    Import {
        /// File produced by `adctx export`.
        path: PathBuf,
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
        #[arg(long, value_enum, default_value = "json")]
        format: FormatArg,
    },
    /// Show size, dimension and rebuild status of a namespace.
    Stats {
        /// Namespace.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        ns: String,
    },
    /// List namespaces.
    Namespaces,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum FormatArg {
    Json,
    Msgpack,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Msgpack => ExportFormat::MessagePack,
        }
    }
}
