//! Authenticated remote timer endpoint: `GET`/`POST {base_url}/timer`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use super::{PersistenceAdapter, TimerRecord};
use crate::auth::AuthSession;
use crate::error::StoreError;
use crate::recording::join_endpoint;

pub struct RemoteStore {
    client: Client,
    endpoint: Url,
    auth: AuthSession,
}

impl RemoteStore {
    pub fn new(base_url: &Url, auth: AuthSession, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "timer")?,
            auth,
        })
    }

    fn token(&self) -> Result<String, StoreError> {
        self.auth.token().ok_or(StoreError::NotAuthenticated)
    }
}

#[async_trait]
impl PersistenceAdapter for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn load(&self) -> Result<Option<TimerRecord>, StoreError> {
        let resp = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(self.token()?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(StoreError::Unauthorized),
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            s if s.is_success() => {
                let body = resp.text().await?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                Ok(serde_json::from_str::<Option<TimerRecord>>(&body)?)
            }
            s => Err(StoreError::Status(s.as_u16())),
        }
    }

    async fn save(&self, record: &TimerRecord) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.token()?)
            .json(record)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(StoreError::Unauthorized),
            s => Err(StoreError::Status(s.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SessionTimes;
    use crate::timer::SessionType;

    fn record() -> TimerRecord {
        TimerRecord {
            is_running: false,
            is_paused: true,
            current_session: SessionType::Work,
            time_remaining: 600,
            pomodoro_count: 1,
            project_id: Some("p1".into()),
            task_id: None,
            last_updated_time: 1_700_000_000_000,
            session_times: Some(SessionTimes {
                work_time: 25,
                short_break_time: 5,
                long_break_time: 15,
            }),
            duration_ms: None,
            session_start_time: None,
            is_standalone: false,
        }
    }

    fn store(server: &mockito::ServerGuard, auth: AuthSession) -> RemoteStore {
        let base = Url::parse(&server.url()).unwrap();
        RemoteStore::new(&base, auth, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn load_parses_wire_shape() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/timer")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"isRunning":false,"isPaused":true,"currentSession":"work","timeRemaining":600,
                    "pomodoroCount":1,"projectId":"p1","taskId":null,"lastUpdatedTime":1700000000000,
                    "sessionTimes":{"workTime":25,"shortBreakTime":5,"longBreakTime":15}}"#,
            )
            .create_async()
            .await;

        let remote = store(&server, AuthSession::with_credentials("alice", "tok"));
        assert_eq!(remote.load().await.unwrap(), Some(record()));
    }

    #[tokio::test]
    async fn load_null_or_404_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/timer")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;
        let remote = store(&server, AuthSession::with_credentials("alice", "tok"));
        assert!(remote.load().await.unwrap().is_none());

        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/timer").with_status(404).create_async().await;
        let remote = store(&server, AuthSession::with_credentials("alice", "tok"));
        assert!(remote.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_posts_record_with_session_times() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/timer")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"isPaused":true,"timeRemaining":600,"sessionTimes":{"workTime":25}}"#.into(),
            ))
            .with_status(200)
            .create_async()
            .await;
        let remote = store(&server, AuthSession::with_credentials("alice", "tok"));
        remote.save(&record()).await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_distinguished() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/timer").with_status(401).create_async().await;
        let remote = store(&server, AuthSession::with_credentials("alice", "old"));
        assert!(matches!(remote.save(&record()).await, Err(StoreError::Unauthorized)));
    }

    #[tokio::test]
    async fn no_token_fails_fast() {
        let server = mockito::Server::new_async().await;
        let remote = store(&server, AuthSession::anonymous());
        assert!(matches!(remote.load().await, Err(StoreError::NotAuthenticated)));
    }
}
