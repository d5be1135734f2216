use clap::Subcommand;
use pomosync_core::auth::keyring_store;

use crate::context::{load_auth, CliResult, KEY_ACCOUNT, KEY_TOKEN};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store a bearer token for the remote store
    Login {
        /// Account identifier; scopes the local timer state
        #[arg(long)]
        account: String,
        /// Bearer token issued by the backend
        #[arg(long)]
        token: String,
    },
    /// Remove stored credentials
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::Login { account, token } => {
            if account.trim().is_empty() || token.trim().is_empty() {
                return Err("--account and --token must not be empty".into());
            }
            keyring_store::set(KEY_ACCOUNT, &account)?;
            keyring_store::set(KEY_TOKEN, &token)?;
            println!("signed in as {account}");
        }
        AuthAction::Logout => {
            keyring_store::delete(KEY_TOKEN)?;
            keyring_store::delete(KEY_ACCOUNT)?;
            println!("signed out");
        }
        AuthAction::Status => match load_auth().account() {
            Some(account) => println!("authenticated as {account}"),
            None => println!("not authenticated"),
        },
    }
    Ok(())
}
