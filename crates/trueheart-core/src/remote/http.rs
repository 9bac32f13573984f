//! HTTP remote store speaking the `/sync/*` JSON API with bearer auth.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::codec::{decode_snapshot, encode_snapshot};
use super::{EventPage, RejectReason, RemoteError, RemoteResult, RemoteStore, SaveAck};
use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::models::{DeletionEvent, Snapshot};
use crate::util::compact_text;

/// Remote store client for one application id, authenticated per request.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    app_id: String,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(
        config: &SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> RemoteResult<Self> {
        config.validate().map_err(RemoteError::InvalidConfiguration)?;
        let base_url = config
            .remote_base_url()
            .map_err(RemoteError::InvalidConfiguration)?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            base_url,
            app_id: config.app_id.trim().to_string(),
            client,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/sync/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let token = self
            .credentials
            .session_token()
            .ok_or(RemoteError::Unauthenticated)?;
        Ok(request
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        self.authorize(request)?
            .send()
            .await
            .map_err(map_transport_error)
    }
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    app_id: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default, alias = "syncVersion")]
    sync_version: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AppendEventsRequest<'a> {
    app_id: &'a str,
    events: &'a [DeletionEvent],
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    events: Vec<DeletionEvent>,
    #[serde(default)]
    next: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

const fn default_success() -> bool {
    true
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn save(&self, snapshot: &Snapshot) -> RemoteResult<SaveAck> {
        let payload = SaveRequest {
            app_id: &self.app_id,
            data: encode_snapshot(snapshot)?,
        };
        let response = self
            .send(self.client.post(self.endpoint("save")).json(&payload))
            .await?;
        let body: SaveResponse = read_success_json(response).await?;
        if !body.success {
            return Err(unsuccessful(body.error));
        }
        tracing::debug!(
            sync_version = snapshot.sync_version,
            "Uploaded snapshot for app '{}'",
            self.app_id
        );
        Ok(SaveAck {
            sync_version: body.sync_version,
        })
    }

    async fn load(&self) -> RemoteResult<Option<Snapshot>> {
        let request = self
            .client
            .get(self.endpoint("load"))
            .query(&[("app_id", self.app_id.as_str())]);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("No remote snapshot stored yet for app '{}'", self.app_id);
            return Ok(None);
        }

        let body: LoadResponse = read_success_json(response).await?;
        if !body.success {
            return Err(unsuccessful(body.error));
        }
        match body.data.filter(|data| !data.trim().is_empty()) {
            Some(blob) => decode_snapshot(&blob).map(Some),
            None => Ok(None),
        }
    }

    async fn append_events(&self, events: &[DeletionEvent]) -> RemoteResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let payload = AppendEventsRequest {
            app_id: &self.app_id,
            events,
        };
        let response = self
            .send(self.client.post(self.endpoint("event")).json(&payload))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        tracing::debug!("Appended {} deletion events", events.len());
        Ok(())
    }

    async fn fetch_events(&self, since: u64, limit: usize) -> RemoteResult<EventPage> {
        let request = self.client.get(self.endpoint("events")).query(&[
            ("app_id", self.app_id.clone()),
            ("since", since.to_string()),
            ("limit", limit.to_string()),
        ]);
        let response = self.send(request).await?;
        let body: EventsResponse = read_success_json(response).await?;
        if !body.success {
            return Err(unsuccessful(body.error));
        }
        let fetched = u64::try_from(body.events.len()).unwrap_or(u64::MAX);
        let next_cursor = body.next.unwrap_or_else(|| since.saturating_add(fetched));
        Ok(EventPage {
            events: body.events,
            next_cursor,
        })
    }
}

async fn read_success_json<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|error| RemoteError::Decode(error.to_string()))
}

async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_error(status, &body)
}

fn classify_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_error_message(body);
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return RemoteError::Unauthenticated;
    }
    if is_empty_snapshot_rejection(status, message.as_deref()) {
        return RemoteError::Rejected(RejectReason::EmptySnapshot);
    }
    let message = message.unwrap_or_else(|| {
        let trimmed = compact_text(body);
        if trimmed.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            trimmed
        }
    });
    RemoteError::Api {
        status: status.as_u16(),
        message,
    }
}

/// The server refuses empty-over-non-empty uploads with 409/422 and an error
/// mentioning the empty payload.
fn is_empty_snapshot_rejection(status: StatusCode, message: Option<&str>) -> bool {
    matches!(
        status,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    ) && message.is_some_and(|message| message.to_ascii_lowercase().contains("empty"))
}

fn parse_error_message(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<ErrorBody>(body).ok()?;
    payload
        .error
        .or(payload.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

fn unsuccessful(error: Option<String>) -> RemoteError {
    let message = error.unwrap_or_else(|| "request was not successful".to_string());
    if message.to_ascii_lowercase().contains("empty") {
        RemoteError::Rejected(RejectReason::EmptySnapshot)
    } else {
        RemoteError::Api {
            status: 200,
            message,
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;

    fn store(base: &str) -> RemoteResult<HttpRemoteStore> {
        HttpRemoteStore::new(&SyncConfig::new(base), Arc::new(AuthState::signed_out()))
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(matches!(
            store("api.example.com"),
            Err(RemoteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let remote = store("https://api.example.com/").unwrap();
        assert_eq!(remote.endpoint("save"), "https://api.example.com/sync/save");
    }

    #[test]
    fn classify_maps_auth_failures() {
        assert_eq!(
            classify_error(StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#),
            RemoteError::Unauthenticated
        );
    }

    #[test]
    fn classify_detects_empty_snapshot_rejection() {
        assert_eq!(
            classify_error(
                StatusCode::CONFLICT,
                r#"{"error":"Refusing to overwrite non-empty data with empty snapshot"}"#
            ),
            RemoteError::Rejected(RejectReason::EmptySnapshot)
        );
        assert!(matches!(
            classify_error(StatusCode::CONFLICT, r#"{"error":"version conflict"}"#),
            RemoteError::Api { status: 409, .. }
        ));
    }

    #[test]
    fn classify_falls_back_to_raw_body() {
        assert_eq!(
            classify_error(StatusCode::BAD_GATEWAY, "upstream down"),
            RemoteError::Api {
                status: 502,
                message: "upstream down".to_string()
            }
        );
        assert_eq!(
            classify_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            RemoteError::Api {
                status: 500,
                message: "HTTP 500".to_string()
            }
        );
    }

    #[tokio::test]
    async fn requests_without_session_fail_fast() {
        let remote = store("https://api.example.com").unwrap();
        assert_eq!(remote.load().await, Err(RemoteError::Unauthenticated));
    }
}
