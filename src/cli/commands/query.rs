use clap::Args;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LatestCommand {
    /// User to look up
    pub user_id: String,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RecentCommand {
    /// User to look up
    pub user_id: String,

    /// Restrict to one metric type (heart_rate, steps, calories_burned, active_minutes)
    #[arg(long)]
    pub metric: Option<String>,

    /// Maximum records (defaults to dashboard.recent_limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// User to follow
    pub user_id: String,

    /// Refresh cadence in seconds (5..=30)
    #[arg(long)]
    pub interval: Option<u64>,
}
