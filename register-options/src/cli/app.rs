use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "register-options")]
#[command(about = "Manage a schema-validated options record in a SQLite database")]
pub struct Cli {
    /// SQLite database file (overrides config and REGISTER_OPTIONS_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Name of the options record (overrides config and REGISTER_OPTIONS_RECORD)
    #[arg(long, global = true)]
    pub record: Option<String>,

    /// Storage scope: site, network, blog or user
    #[arg(long, global = true)]
    pub scope: Option<String>,

    /// Sub-site id for the blog scope
    #[arg(long, global = true)]
    pub blog_id: Option<u64>,

    /// User id for the user scope
    #[arg(long, global = true)]
    pub user_id: Option<u64>,

    /// Per-user storage: meta or option
    #[arg(long, global = true)]
    pub user_storage: Option<String>,

    /// Schema descriptor file (TOML or JSON)
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show every option of the record
    Show,
    /// Print one option as JSON
    Get {
        /// Option key
        key: String,
    },
    /// Validate and persist one option
    Set {
        /// Option key
        key: String,
        /// New value as JSON; anything that is not valid JSON is taken as a string
        value: String,
    },
    /// Remove one option from the record
    Delete {
        /// Option key
        key: String,
    },
    /// Remove every option from the record
    ResetAll {
        /// Skip confirmation prompt
        #[arg(short = 'f', long)]
        force: bool,
    },
    /// List registered options and their rules
    Schema,
    /// Write the defaults if the record does not exist yet
    Seed,
}
