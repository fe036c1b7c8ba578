//! REST side of the board: snapshot fetch and status updates.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::board::models::Card;
use crate::board::status::{BoardKind, StatusKey};
use crate::errors::ApiError;

const USER_AGENT: &str = concat!("dispatch-board/", env!("CARGO_PKG_VERSION"));

/// Body of a status-update response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "S: StatusKey"))]
pub struct StatusUpdateResponse<S> {
    /// Absent means the 2xx status speaks for itself.
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub old_status: Option<S>,
    #[serde(default)]
    pub new_status: Option<S>,
    #[serde(default)]
    pub technician_name: Option<String>,
    /// Canonical card, when the server echoes it back.
    #[serde(default, alias = "work_order", alias = "technician")]
    pub card: Option<Card<S>>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<S> StatusUpdateResponse<S> {
    /// A bare acknowledgement with no body.
    pub fn accepted() -> Self {
        Self {
            success: true,
            old_status: None,
            new_status: None,
            technician_name: None,
            card: None,
            message: None,
        }
    }
}

/// The two REST calls the board engine makes.
///
/// Real implementation: [`HttpBoardApi`]. Tests script their own.
#[async_trait]
pub trait BoardApi<S: StatusKey>: Send + Sync {
    /// Fetch every card of the board.
    async fn fetch_snapshot(&self) -> Result<Vec<Card<S>>, ApiError>;

    /// Ask the server to move a card. A response with `success: false` is
    /// returned as [`ApiError::Rejected`].
    async fn update_status(
        &self,
        card_id: &str,
        to_status: S,
    ) -> Result<StatusUpdateResponse<S>, ApiError>;
}

/// Decode a snapshot body: either a bare array of cards or an object
/// wrapping one under `items` (or `data`). Records that do not decode are
/// skipped with a warning so one bad row cannot blank the board.
pub fn parse_snapshot<S: StatusKey>(body: &str) -> Result<Vec<Card<S>>, ApiError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let records = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map
            .remove("items")
            .or_else(|| map.remove("data"))
        {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(ApiError::Decode(
                    "snapshot object has no 'items' array".to_string(),
                ));
            }
        },
        other => {
            return Err(ApiError::Decode(format!(
                "expected an array of cards, got {}",
                json_type(&other)
            )));
        }
    };

    let mut cards = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Card<S>>(record) {
            Ok(card) => cards.push(card),
            Err(e) => tracing::warn!(position, error = %e, "skipping undecodable snapshot record"),
        }
    }
    Ok(cards)
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// [`BoardApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBoardApi<S> {
    client: reqwest::Client,
    base_url: Url,
    status_path: String,
    snapshot_path: String,
    token: Option<String>,
    timeout: Duration,
    _status: PhantomData<fn() -> S>,
}

impl<S: StatusKey> HttpBoardApi<S> {
    /// Client for the board of kind `S::KIND` rooted at `base_url`, using
    /// that board's default paths.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Transport)?;
        let kind: BoardKind = S::KIND;
        Ok(Self {
            client,
            base_url,
            status_path: kind.default_status_path().to_string(),
            snapshot_path: kind.default_snapshot_path().to_string(),
            token: None,
            timeout,
            _status: PhantomData,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Override the endpoint paths. `status_path` must contain `{id}`.
    pub fn with_paths(mut self, status_path: Option<&str>, snapshot_path: Option<&str>) -> Self {
        if let Some(path) = status_path {
            self.status_path = path.to_string();
        }
        if let Some(path) = snapshot_path {
            self.snapshot_path = path.to_string();
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path template against the base URL, substituting the
    /// (percent-encoded) card id for `{id}`.
    pub fn endpoint(&self, template: &str, card_id: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            for segment in template.split('/').filter(|s| !s.is_empty()) {
                match (segment, card_id) {
                    ("{id}", Some(id)) => segments.push(id),
                    ("{id}", None) => {
                        return Err(ApiError::InvalidUrl(format!(
                            "path '{}' needs a card id",
                            template
                        )));
                    }
                    _ => segments.push(segment),
                };
            }
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        match self.token {
            Some(ref token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err)
        }
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<String, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.text().await.map_err(|e| self.transport_error(e))
    }
}

#[async_trait]
impl<S: StatusKey> BoardApi<S> for HttpBoardApi<S> {
    async fn fetch_snapshot(&self) -> Result<Vec<Card<S>>, ApiError> {
        let url = self.endpoint(&self.snapshot_path, None)?;
        tracing::debug!(%url, "fetching board snapshot");
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = self.read_body(resp).await?;
        parse_snapshot(&body)
    }

    async fn update_status(
        &self,
        card_id: &str,
        to_status: S,
    ) -> Result<StatusUpdateResponse<S>, ApiError> {
        let url = self.endpoint(&self.status_path, Some(card_id))?;
        tracing::debug!(card_id, status = %to_status, %url, "sending status update");
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(&serde_json::json!({ "status": to_status }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = self.read_body(resp).await?;

        let parsed = if body.trim().is_empty() {
            StatusUpdateResponse::accepted()
        } else {
            serde_json::from_str::<StatusUpdateResponse<S>>(&body)
                .map_err(|e| ApiError::Decode(e.to_string()))?
        };
        if !parsed.success {
            return Err(ApiError::Rejected {
                card_id: card_id.to_string(),
            });
        }
        Ok(parsed)
    }
}
