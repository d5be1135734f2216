//! Opening the core runtime the way every command needs it.

use std::sync::{Arc, Mutex};

use pomosync_core::auth::keyring_store;
use pomosync_core::storage::data_dir;
use pomosync_core::{
    AuthSession, Config, Database, LogNotifier, PendingQueue, RuntimeOptions, TerminalBell,
    TimerRuntime,
};

pub const KEY_ACCOUNT: &str = "account";
pub const KEY_TOKEN: &str = "token";

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Credentials from the OS keyring; anonymous when none are stored or the
/// keyring is unavailable.
pub fn load_auth() -> AuthSession {
    let stored = keyring_store::get(KEY_ACCOUNT).and_then(|account| {
        let token = keyring_store::get(KEY_TOKEN)?;
        Ok(account.zip(token))
    });
    match stored {
        Ok(Some((account, token))) => AuthSession::with_credentials(account, token),
        Ok(None) => AuthSession::anonymous(),
        Err(e) => {
            tracing::debug!(error = %e, "keyring unavailable; running anonymously");
            AuthSession::anonymous()
        }
    }
}

pub fn open_queue() -> CliResult<Arc<Mutex<PendingQueue>>> {
    let path = data_dir()?.join("pending_recordings.json");
    Ok(Arc::new(Mutex::new(PendingQueue::open(path)?)))
}

/// Load config, credentials, database and queue, then the timer itself.
pub async fn open_runtime() -> CliResult<TimerRuntime> {
    let config = Config::load()?;
    let db = Arc::new(Mutex::new(Database::open()?));
    let opts = RuntimeOptions::new(config, load_auth(), db, open_queue()?)
        .with_sound(Box::new(TerminalBell))
        .with_notifier(Box::new(LogNotifier));
    Ok(TimerRuntime::start(opts).await?)
}
