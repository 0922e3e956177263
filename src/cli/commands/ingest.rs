use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Stop after this many ticks (runs until Ctrl-C when omitted)
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Size of the generated roster (ignored with a roster file)
    #[arg(long)]
    pub users: Option<usize>,

    /// Seed history before starting the continuous loop
    #[arg(long)]
    pub seed: bool,

    /// Show the dashboard for this user while ingesting, over the same store
    #[arg(long, value_name = "USER")]
    pub watch: Option<String>,
}

#[derive(Debug, Args)]
pub struct SeedCommand {
    /// Length of the seeded window, ending now
    #[arg(long, value_name = "SECS")]
    pub window_secs: Option<u64>,

    /// Spacing between seeded points per user and metric type
    #[arg(long, value_name = "SECS")]
    pub interval_secs: Option<u64>,

    /// Size of the generated roster (ignored with a roster file)
    #[arg(long)]
    pub users: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ImportCommand {
    /// JSON-lines file, one metric record per line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}
