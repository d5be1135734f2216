use clap::Subcommand;
use pomosync_core::Database;

use crate::context::CliResult;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Completed pomodoros and focus minutes, today and all-time
    Summary,
    /// Most recent recorded sessions
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let db = Database::open()?;

    match action {
        StatsAction::Summary => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::History { limit } => {
            let sessions = db.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }
    Ok(())
}
