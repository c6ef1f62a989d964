//! Fire-and-forget emitter for reader telemetry.
//!
//! Every call carries the client's [`SessionId`] explicitly, both in the
//! JSON body and in the `x-session-id` header. Sends run on spawned tasks;
//! failures are logged at debug level and dropped. Losing an event is
//! acceptable, blocking the caller is not.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::reading::ReadingTracker;
use crate::domain::types::{Rating, ScrollPercent, SessionId};

const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected {path} with status {status}")]
    Rejected { path: &'static str, status: u16 },
}

#[derive(Clone, Debug)]
pub struct TelemetryClient {
    http: Client,
    base: Url,
    session_id: SessionId,
}

impl TelemetryClient {
    pub fn new(base_url: &str, session_id: SessionId) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?.join("/")?;
        let http = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            http,
            base,
            session_id,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("margin-telemetry/", env!("CARGO_PKG_VERSION"))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Reports a page load. Must be called inside a Tokio runtime.
    pub fn track_view(&self, slug: &str) -> JoinHandle<()> {
        let body = json!({
            "slug": slug,
            "sessionId": self.session_id,
        });
        self.spawn_send("views", body)
    }

    pub fn submit_feedback(&self, slug: &str, rating: Rating) -> JoinHandle<()> {
        let body = json!({
            "slug": slug,
            "rating": rating.get(),
            "sessionId": self.session_id,
        });
        self.spawn_send("feedback", body)
    }

    /// Emits the single reading record for a visit. Taking the tracker by
    /// value means a visit cannot report twice.
    pub fn send_reading(
        &self,
        tracker: ReadingTracker,
        time_on_page: Duration,
        exit_depth: ScrollPercent,
    ) -> JoinHandle<()> {
        let report = tracker.finish(time_on_page, exit_depth);
        self.spawn_send("reading-analytics", report)
    }

    fn spawn_send<B>(&self, path: &'static str, body: B) -> JoinHandle<()>
    where
        B: Serialize + Send + Sync + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(err) = client.post(path, &body).await {
                debug!(
                    target = "margin::client",
                    path = path,
                    error = %err,
                    "telemetry send dropped"
                );
            }
        })
    }

    async fn post<B: Serialize>(&self, path: &'static str, body: &B) -> Result<(), ClientError> {
        let url = self.base.join(path)?;
        let response = self
            .http
            .post(url)
            .header(SESSION_HEADER, self.session_id.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected {
                path,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
