//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use cleanup::{AttachmentFilter, QueryOptions, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gmail-cleanup")]
#[command(version)]
#[command(about = "Safe, auditable bulk cleanup for a Gmail mailbox", long_about = None)]
pub struct Cli {
    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dry-run a search: counts plus a sample of matching messages
    Query {
        #[command(flatten)]
        filters: FilterArgs,

        /// Number of sample rows to show
        #[arg(long)]
        sample: Option<usize>,
    },

    /// Apply a label to matching messages (asks for YES)
    Label {
        #[command(flatten)]
        filters: FilterArgs,

        /// Label to apply (created when missing)
        #[arg(long)]
        target_label: Option<String>,

        /// Limit how many messages to label (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Export id/date/from/to/subject of matching messages
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output file
        #[arg(long, default_value = "reports/report.csv")]
        out: PathBuf,

        /// csv or json
        #[arg(long = "format", default_value = "csv")]
        fmt: String,

        /// Maximum rows to export
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Move messages to Trash. Requires a cleanup/* label and --execute
    Trash {
        /// ONLY trash messages in this label (recommended: cleanup/candidates)
        #[arg(long)]
        label: String,

        /// How many sample messages to show before trashing
        #[arg(long)]
        sample: Option<usize>,

        /// Actually perform the trash action
        #[arg(long)]
        execute: bool,

        /// Limit how many messages to trash (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Override the max_trash_without_force safety limit
        #[arg(long)]
        force: bool,
    },

    /// Remove a cleanup/* label from the messages carrying it
    LabelClear {
        /// Label to remove (must start with cleanup/)
        #[arg(long)]
        label: String,

        /// Limit how many messages to update (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Top senders and date range of matching messages
    Stats {
        #[command(flatten)]
        filters: FilterArgs,

        /// Maximum messages to scan
        #[arg(long)]
        scan_limit: Option<usize>,

        /// Number of senders to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Show the config file and its values
    Config {
        /// Write a config template if none exists
        #[arg(long)]
        init: bool,
    },

    /// Show environment, credential paths and scopes
    Doctor,
}

/// Search filters shared by query, label, export and stats
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Raw Gmail search text
    #[arg(long)]
    pub q: Option<String>,

    #[arg(long = "from")]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub subject: Option<String>,

    #[arg(long)]
    pub has_words: Option<String>,

    #[arg(long)]
    pub not_has_words: Option<String>,

    /// Only messages carrying this label
    #[arg(long)]
    pub label: Option<String>,

    /// Only messages in the inbox
    #[arg(long)]
    pub inbox: bool,

    /// YYYY/MM/DD
    #[arg(long)]
    pub after: Option<String>,

    /// YYYY/MM/DD
    #[arg(long)]
    pub before: Option<String>,

    /// e.g. 30d, 6m, 2y
    #[arg(long)]
    pub older_than: Option<String>,

    #[arg(long)]
    pub newer_than: Option<String>,

    #[arg(long)]
    pub has_attachment: bool,

    #[arg(long)]
    pub no_attachment: bool,

    /// e.g. 10M
    #[arg(long)]
    pub larger: Option<String>,

    #[arg(long)]
    pub smaller: Option<String>,
}

impl FilterArgs {
    /// Convert into query options; conflicting attachment flags are rejected
    pub fn to_options(&self) -> Result<QueryOptions> {
        let attachment = AttachmentFilter::from_flags(self.has_attachment, self.no_attachment)?;
        Ok(QueryOptions {
            q: self.q.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            has_words: self.has_words.clone(),
            not_has_words: self.not_has_words.clone(),
            label: self.label.clone(),
            scope: self.inbox.then(|| "inbox".to_string()),
            after: self.after.clone(),
            before: self.before.clone(),
            older_than: self.older_than.clone(),
            newer_than: self.newer_than.clone(),
            attachment,
            larger: self.larger.clone(),
            smaller: self.smaller.clone(),
        })
    }
}
