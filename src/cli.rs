use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::intent::Domain;

#[derive(Parser)]
#[command(name = "promptdesk")]
#[command(about = "Natural-language front end for Calendar, Gmail and Tasks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides PROMPTDESK_BIND
        #[arg(long)]
        bind: Option<String>,

        /// Also write daily-rolling logs here
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Run one prompt through the pipeline and print the result
    Ask {
        /// calendar, email or tasks
        domain: Domain,

        prompt: String,

        /// Google OAuth access token
        #[arg(long)]
        token: String,

        /// Also print a prose summary of the result
        #[arg(long)]
        summarize: bool,
    },

    /// Print the date anchors the oracle would be given right now
    Context,
}

impl Cli {
    pub fn log_dir(&self) -> Option<&PathBuf> {
        match &self.command {
            Some(Commands::Serve { log_dir, .. }) => log_dir.as_ref(),
            _ => None,
        }
    }
}
