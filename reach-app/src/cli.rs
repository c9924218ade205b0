//! Command-line interface of `reach-sim`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drives the hue-discrimination reaching protocol with a simulated participant
#[derive(Parser, Debug)]
#[command(name = "reach-sim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Protocol config file (JSON); the published protocol when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one full session and store its records
    Run {
        /// Participant identifier stored with every record
        #[arg(short, long, default_value = "SIM001")]
        participant: String,

        /// Seed for the protocol and the simulated participant
        #[arg(short, long)]
        seed: Option<u64>,

        /// Records file, created or extended
        #[arg(short, long, default_value = "reach-records.json")]
        output: PathBuf,

        /// Pace the session against the wall clock instead of simulated time
        #[arg(long)]
        realtime: bool,

        /// Hue distance the simulated participant discriminates at 75% correct
        #[arg(long, default_value = "8.0")]
        jnd: f32,

        /// Abandon the session after this many reach trials
        #[arg(long)]
        abort_after: Option<usize>,
    },

    /// Write the default protocol config as JSON
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "protocol.json")]
        output: PathBuf,
    },

    /// Summarize a records file per participant
    Summary {
        /// Records file written by `run`
        #[arg(short, long, default_value = "reach-records.json")]
        input: PathBuf,
    },
}
