use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ClientError, Result};
use likeguard_core::SubjectKind;

/// Likeguard HTTP client
pub struct LikeClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeStateResponse {
    pub liked: bool,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleResponse {
    pub action: String,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearResponse {
    deleted_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl LikeClient {
    /// Create a client for a likeguard service at the given base URL
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use likeguard_client::LikeClient;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = LikeClient::new("http://localhost:8080")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Read the current like state and count for one subject and identity
    ///
    /// Side-effect free; safe to call any number of times.
    pub async fn like_state(
        &self,
        kind: SubjectKind,
        subject_id: u64,
        identity: &str,
    ) -> Result<LikeStateResponse> {
        let url = format!("{}/likes/{}/{}", self.base_url, kind, subject_id);
        let response = self
            .http
            .get(url)
            .query(&[("identity", identity)])
            .send()
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))
    }

    /// Toggle the like for one subject and identity
    ///
    /// Returns the applied action ("liked" / "unliked") and the new count.
    /// A `Throttled` error carries the server's suggested backoff; retrying
    /// is the caller's decision.
    pub async fn toggle(
        &self,
        kind: SubjectKind,
        subject_id: u64,
        identity: &str,
    ) -> Result<ToggleResponse> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let body = json!({
            "subjectId": subject_id,
            "subjectType": kind,
            "identity": identity,
            "timestamp": timestamp.max(1),
        });

        let response = self
            .http
            .post(format!("{}/likes", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))
    }

    /// Operator-only bulk clear of the like ledger
    ///
    /// Requires the operator bearer token configured on the service. Returns
    /// the number of ledger records deleted.
    pub async fn clear_ledger(&self, operator_token: &str) -> Result<u64> {
        let response = self
            .http
            .delete(format!("{}/admin/likes", self.base_url))
            .bearer_auth(operator_token)
            .send()
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let cleared: ClearResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
        Ok(cleared.deleted_count)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());

        match status.as_u16() {
            429 => Err(ClientError::Throttled {
                retry_after: Duration::from_secs(retry_after.unwrap_or(2)),
            }),
            403 => Err(ClientError::Denied(message)),
            code => Err(ClientError::Api {
                status: code,
                message,
            }),
        }
    }
}
