use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use super::PomodoroRecord;
use crate::auth::AuthSession;
use crate::error::{RecordError, StoreError};

/// The external Task/Project/Pomodoro store.
///
/// Idempotency is the caller's concern; implementations just submit.
#[async_trait]
pub trait RecordingClient: Send + Sync {
    async fn create_pomodoro_record(&self, record: &PomodoroRecord) -> Result<(), RecordError>;
}

/// `POST {base_url}/pomodoros` with the session's bearer token.
pub struct HttpRecordingClient {
    client: Client,
    endpoint: Url,
    auth: AuthSession,
}

impl HttpRecordingClient {
    pub fn new(base_url: &Url, auth: AuthSession, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "pomodoros")?,
            auth,
        })
    }
}

/// Join `path` onto `base`, treating `base` as a directory.
pub(crate) fn join_endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
}

#[async_trait]
impl RecordingClient for HttpRecordingClient {
    async fn create_pomodoro_record(&self, record: &PomodoroRecord) -> Result<(), RecordError> {
        let token = self.auth.token().ok_or(RecordError::Unauthorized)?;

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(RecordError::Unauthorized),
            s => {
                let message = resp.text().await.unwrap_or_default();
                Err(RecordError::Rejected {
                    status: s.as_u16(),
                    message,
                })
            }
        }
    }
}
