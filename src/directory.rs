//! Remote directory service client
//!
//! The sync engine only needs raw payloads (decoding happens in the engine);
//! foreground actions need the write endpoints. Both sit behind
//! [`DirectoryClient`] so tests and alternative transports can stand in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::{CanonicalId, CenterStatus, CrowdLevel, NewHazardZone, NewSosAlert, RequestDraft};
use crate::sync::ResourceKind;

/// Body of `PATCH /centers/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CenterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CenterStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd: Option<CrowdLevel>,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch the raw collection for one resource kind.
    async fn fetch(&self, kind: ResourceKind, center_filter: Option<&str>) -> Result<Value>;

    async fn patch_center(&self, id: &CanonicalId, patch: &CenterPatch) -> Result<()>;

    /// Submit a new aid request; returns the server's echo, if any.
    async fn submit_request(&self, draft: &RequestDraft) -> Result<Value>;

    async fn fulfill_request(&self, id: &CanonicalId) -> Result<()>;

    async fn reject_request(&self, id: &CanonicalId, reason: &str) -> Result<()>;

    /// Create a hazard zone; returns the created record as the server echoes it.
    async fn create_hazard_zone(&self, zone: &NewHazardZone) -> Result<Value>;

    async fn delete_hazard_zone(&self, id: &CanonicalId) -> Result<()>;

    async fn send_sos(&self, alert: &NewSosAlert) -> Result<()>;
}

/// reqwest-backed directory client
pub struct HttpDirectory {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        send_checked(request, what, self.timeout).await
    }

    async fn json_body(response: reqwest::Response, timeout_ms: u64) -> Result<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| CoreError::from_transport(e, timeout_ms))
    }
}

/// Send with a per-request timeout and map non-2xx answers onto [`CoreError`].
pub(crate) async fn send_checked(
    request: RequestBuilder,
    what: &str,
    timeout: Duration,
) -> Result<reqwest::Response> {
    let timeout_ms = timeout.as_millis() as u64;
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CoreError::from_transport(e, timeout_ms))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string));
    debug!(what, %status, ?detail, "Remote call failed");
    Err(status_error(status, what, detail))
}

fn status_error(status: StatusCode, what: &str, detail: Option<String>) -> CoreError {
    let message = detail.unwrap_or_else(|| format!("{} returned HTTP {}", what, status));
    if status == StatusCode::NOT_FOUND {
        CoreError::NotFound(message)
    } else if status.is_server_error() {
        CoreError::TransientNetwork(message)
    } else {
        CoreError::Rejected(message)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    async fn fetch(&self, kind: ResourceKind, center_filter: Option<&str>) -> Result<Value> {
        let mut request = self.client.get(self.url(kind.path()));
        if let (ResourceKind::Requests, Some(center_id)) = (kind, center_filter) {
            request = request.query(&[("center_id", center_id)]);
        }
        let response = self.send(request, kind.path()).await?;
        Self::json_body(response, self.timeout.as_millis() as u64).await
    }

    async fn patch_center(&self, id: &CanonicalId, patch: &CenterPatch) -> Result<()> {
        let path = format!("/centers/{}", id);
        self.send(self.client.patch(self.url(&path)).json(patch), &path)
            .await?;
        Ok(())
    }

    async fn submit_request(&self, draft: &RequestDraft) -> Result<Value> {
        let response = self
            .send(
                self.client.post(self.url("/request-food")).json(draft),
                "/request-food",
            )
            .await?;
        // The echo is informational; an empty body is fine
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn fulfill_request(&self, id: &CanonicalId) -> Result<()> {
        let path = format!("/fulfill-request/{}", id);
        self.send(self.client.post(self.url(&path)), &path).await?;
        Ok(())
    }

    async fn reject_request(&self, id: &CanonicalId, reason: &str) -> Result<()> {
        let path = format!("/reject-request/{}", id);
        self.send(
            self.client
                .post(self.url(&path))
                .json(&serde_json::json!({ "reason": reason })),
            &path,
        )
        .await?;
        Ok(())
    }

    async fn create_hazard_zone(&self, zone: &NewHazardZone) -> Result<Value> {
        let response = self
            .send(self.client.post(self.url("/risk-zones")).json(zone), "/risk-zones")
            .await?;
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn delete_hazard_zone(&self, id: &CanonicalId) -> Result<()> {
        let path = format!("/risk-zones/{}", id);
        self.send(self.client.delete(self.url(&path)), &path).await?;
        Ok(())
    }

    async fn send_sos(&self, alert: &NewSosAlert) -> Result<()> {
        self.send(self.client.post(self.url("/sos-alert")).json(alert), "/sos-alert")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_status_mapping() {
        let e = status_error(StatusCode::NOT_FOUND, "/fulfill-request/9", None);
        assert_eq!(e.kind(), ErrorKind::NotFound);

        let e = status_error(StatusCode::BAD_GATEWAY, "/centers", None);
        assert!(e.is_transient());

        let e = status_error(
            StatusCode::BAD_REQUEST,
            "/request-food",
            Some("Quantity exceeds stock".into()),
        );
        assert_eq!(e.to_string(), "Rejected by server: Quantity exceeds stock");
    }

    #[test]
    fn test_center_patch_skips_unset_fields() {
        let patch = CenterPatch {
            status: None,
            crowd: Some(CrowdLevel::High),
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({"crowd": "High"}));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let dir = HttpDirectory::new("http://localhost:8000/", Duration::from_secs(5));
        assert_eq!(dir.url("/centers"), "http://localhost:8000/centers");
    }
}
