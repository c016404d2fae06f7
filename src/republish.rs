//! Republishing a resolved URL to a video host.
//!
//! The cascade only hands over `{url, title}`; everything about the host
//! (endpoints, key, fallback API) lives here.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::RepublishSettings;
use crate::resolver::locator::locate_url;
use crate::resolver::utils::truncate_body;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepublishRequest {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishResponse {
    pub hosted_url: String,
    pub file_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum RepublishError {
    #[error("republish API key is not configured")]
    MissingCredentials,

    #[error("republish request failed: {0}")]
    Network(String),

    #[error("video host rejected the upload: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("video host returned no hosted URL: {0}")]
    MissingUrl(String),
}

impl From<reqwest::Error> for RepublishError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Narrow contract the front end uses after a successful resolution
#[async_trait]
pub trait Republisher: Send + Sync {
    async fn republish(&self, request: &RepublishRequest) -> Result<RepublishResponse, RepublishError>;
}

/// Remote-upload client: primary upload API, then the legacy remote API
pub struct HttpRepublisher {
    settings: RepublishSettings,
    client: reqwest::Client,
}

impl HttpRepublisher {
    pub fn new(settings: RepublishSettings) -> Result<Self, RepublishError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;
        Ok(Self { settings, client })
    }

    async fn upload_primary(&self, key: &str, request: &RepublishRequest) -> Result<RepublishResponse, RepublishError> {
        let payload = json!({
            "url": request.url,
            "title": request.title.clone().unwrap_or_else(|| "video".to_string()),
            "api_key": key,
        });

        let response = self
            .client
            .post(&self.settings.upload_endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.as_u16() != 200 {
            return Err(RepublishError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| RepublishError::MissingUrl(truncate_body(&text)))?;
        let hosted_url = ["file_url", "url"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| locate_url(&body))
            .ok_or_else(|| RepublishError::MissingUrl(truncate_body(&text)))?;

        Ok(RepublishResponse {
            hosted_url,
            file_id: id_field(&body, "file_id"),
        })
    }

    async fn upload_fallback(&self, key: &str, request: &RepublishRequest) -> Result<RepublishResponse, RepublishError> {
        let response = self
            .client
            .post(&self.settings.fallback_endpoint)
            .form(&[("url", request.url.as_str()), ("api_key", key)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RepublishError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| RepublishError::MissingUrl(truncate_body(&text)))?;
        let hosted_url = body
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RepublishError::MissingUrl(truncate_body(&text)))?;

        Ok(RepublishResponse {
            hosted_url,
            file_id: id_field(&body, "id"),
        })
    }
}

// Ids come back as strings or numbers depending on the API
fn id_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Republisher for HttpRepublisher {
    async fn republish(&self, request: &RepublishRequest) -> Result<RepublishResponse, RepublishError> {
        let key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(RepublishError::MissingCredentials)?;

        match self.upload_primary(key, request).await {
            Ok(response) => {
                tracing::info!(hosted = %response.hosted_url, "republished via upload API");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(error = %e, "upload API failed, trying remote API");
                self.upload_fallback(key, request).await
            }
        }
    }
}

/// Status line for the front end; a failed upload still leaves the direct link usable
pub async fn republish_status(republisher: &dyn Republisher, request: &RepublishRequest) -> String {
    match republisher.republish(request).await {
        Ok(response) => format!("hosted: {}", response.hosted_url),
        Err(e) => {
            tracing::warn!(error = %e, "republish failed");
            format!("upload failed ({}), direct link still works: {}", e, request.url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::utils::test_support::{spawn_stub, StubResponse};

    fn settings(base: &str, key: Option<&str>) -> RepublishSettings {
        RepublishSettings {
            api_key: key.map(|k| k.to_string()),
            upload_endpoint: format!("{}/api/upload/url", base),
            fallback_endpoint: format!("{}/api/remote", base),
            timeout_secs: 5,
        }
    }

    fn request() -> RepublishRequest {
        RepublishRequest {
            url: "https://cdn/v.mp4".to_string(),
            title: Some("clip".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let republisher = HttpRepublisher::new(settings("http://127.0.0.1:9", None)).unwrap();
        let err = republisher.republish(&request()).await.unwrap_err();
        assert!(matches!(err, RepublishError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_status_keeps_direct_link_on_failure() {
        let republisher = HttpRepublisher::new(settings("http://127.0.0.1:9", None)).unwrap();
        let line = republish_status(&republisher, &request()).await;
        assert!(line.starts_with("upload failed (republish API key is not configured)"));
        assert!(line.ends_with("https://cdn/v.mp4"));

        let (base, _log) = spawn_stub(|_| StubResponse::json(200, r#"{"url":"https://host/v/2"}"#)).await;
        let republisher = HttpRepublisher::new(settings(&base, Some("k"))).unwrap();
        assert_eq!(republish_status(&republisher, &request()).await, "hosted: https://host/v/2");
    }

    #[tokio::test]
    async fn test_primary_upload() {
        let (base, log) = spawn_stub(|_| StubResponse::json(200, r#"{"file_url":"https://host/v/1","file_id":77}"#)).await;
        let republisher = HttpRepublisher::new(settings(&base, Some("k"))).unwrap();

        let response = republisher.republish(&request()).await.unwrap();

        assert_eq!(response.hosted_url, "https://host/v/1");
        assert_eq!(response.file_id.as_deref(), Some("77"));

        let requests = log.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("authorization"), Some("Bearer k"));
        let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(sent["title"], "clip");
        assert_eq!(sent["api_key"], "k");
    }

    #[tokio::test]
    async fn test_fallback_after_primary_rejects() {
        let (base, log) = spawn_stub(|req| {
            if req.path == "/api/remote" {
                StubResponse::json(200, r#"{"url":"https://legacy/v/9","id":"9"}"#)
            } else {
                StubResponse::json(500, "down")
            }
        })
        .await;
        let republisher = HttpRepublisher::new(settings(&base, Some("k"))).unwrap();

        let response = republisher.republish(&request()).await.unwrap();

        assert_eq!(response.hosted_url, "https://legacy/v/9");
        assert_eq!(response.file_id.as_deref(), Some("9"));
        let requests = log.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].body.contains("api_key=k"));
    }
}
