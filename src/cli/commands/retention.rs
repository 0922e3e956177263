use clap::Args;

#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Keep records from the last N days, delete the rest
    #[arg(long, allow_negative_numbers = true)]
    pub days: i64,
}

#[derive(Debug, Args)]
pub struct RetentionCommand {
    /// TTL window in days (defaults to retention.window_days)
    #[arg(long, allow_negative_numbers = true)]
    pub days: Option<i64>,
}
