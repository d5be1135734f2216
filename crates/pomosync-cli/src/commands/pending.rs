use clap::Subcommand;
use pomosync_core::runtime::recording_client;
use pomosync_core::{Config, EventBus, RecordingWorker};

use crate::context::{load_auth, open_queue, CliResult};

#[derive(Subcommand)]
pub enum PendingAction {
    /// List recordings waiting for delivery
    List,
    /// Retry every pending recording
    Sync,
}

pub async fn run(action: PendingAction) -> CliResult {
    let queue = open_queue()?;
    match action {
        PendingAction::List => {
            let queue = queue.lock().map_err(|_| "pending queue lock poisoned")?;
            println!("{}", serde_json::to_string_pretty(queue.entries())?);
        }
        PendingAction::Sync => {
            let config = Config::load()?;
            let auth = load_auth();
            if !auth.is_authenticated() {
                return Err("not authenticated; run `pomosync-cli auth login` first".into());
            }
            let worker = RecordingWorker::new(
                recording_client(&config, &auth)?,
                queue,
                auth,
                EventBus::new(),
            );
            let report = worker.sync_pending().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
