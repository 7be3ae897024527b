use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Shared automation integrations: Google tokens, S3 uploads, Slack alerts, BigQuery
#[derive(Parser)]
#[command(name = "automation-shared", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Issue a Google service-account access token
    Token {
        /// OAuth2 scope (repeatable). Defaults to GOOGLE_SCOPES.
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// User to impersonate (domain-wide delegation). Defaults to GOOGLE_IMPERSONATE.
        #[arg(long)]
        impersonate: Option<String>,
    },

    /// Upload a file to S3 and print its public URL
    Upload {
        #[arg(long)]
        file: PathBuf,
        /// Object key
        #[arg(long)]
        key: String,
        /// Bucket (defaults to S3_DEFAULT_BUCKET)
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Post a Slack alert
    Notify {
        #[arg(short, long)]
        message: String,
        /// Mark as an error
        #[arg(long)]
        error: bool,
        /// Channel id (production only; other environments use the test channel)
        #[arg(long)]
        channel: Option<String>,
    },

    /// Run a BigQuery query and print the result as CSV
    Query {
        #[arg(long)]
        sql: String,
        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
