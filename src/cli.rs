use clap::{Parser, Subcommand};

/// Command-line options for Mailsweep.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull recent mail for every account, classify, store, and archive.
    Ingest {
        /// Lookback window in days.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=30))]
        days: u32,

        /// Maximum messages per account.
        #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=50))]
        max: u32,
    },

    /// Re-classify stored emails that are uncategorized or in generic buckets.
    Recategorize {
        /// User whose emails to re-classify.
        #[arg(long)]
        user_id: String,

        /// Maximum emails to process.
        #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..=500))]
        limit: u32,
    },

    /// Attempt unsubscribe automation for the given stored emails.
    Unsubscribe {
        /// Email record ids.
        #[arg(required = true)]
        email_ids: Vec<String>,
    },
}
