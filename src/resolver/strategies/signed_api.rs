// SignedAPIStrategy - replicates the web client's signed API calls
//
// For each endpoint every signature candidate is tried in rank order.
// 401/403 means the candidate was refused and the next one is tried; any
// other answer ends the endpoint. A fresh signing context (and timestamp) is
// built for every attempt.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::locator::{locate_file, LocatedFile};
use crate::resolver::models::{ShareIdentifier, StrategyOutcome};
use crate::resolver::signing::{SigningContext, SIGNATURE_ENCODERS};
use crate::resolver::traits::ResolutionStrategy;
use crate::resolver::utils::{build_client, truncate_body};

pub const SIGN_ENDPOINT: &str = "/file/sign";
pub const TEMP_INFO_ENDPOINT: &str = "/file/temp_info";

/// Endpoints in the order they are tried
pub const SIGNED_ENDPOINTS: &[&str] = &[SIGN_ENDPOINT, TEMP_INFO_ENDPOINT];

/// JSON body both endpoints expect
pub fn request_body(identifier: &ShareIdentifier) -> Value {
    json!({ "id": identifier.raw_code() })
}

/// Status and raw body of one endpoint call made outside this process
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointReport {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl EndpointReport {
    /// Body as structured data; string bodies are parsed when they hold JSON
    pub fn body_value(&self) -> Value {
        match &self.body {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        }
    }
}

/// Per-endpoint results of signed calls made by a delegate
/// (the page's own JS context or the signing helper)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedCallReport {
    #[serde(default)]
    pub sign: Option<EndpointReport>,
    #[serde(default)]
    pub temp_info: Option<EndpointReport>,
}

/// First endpoint report carrying a URL; failures go to the trail
pub fn evaluate_report(report: &SignedCallReport, trail: &mut Vec<String>) -> Option<LocatedFile> {
    let reports = [(SIGN_ENDPOINT, &report.sign), (TEMP_INFO_ENDPOINT, &report.temp_info)];

    for (endpoint, entry) in reports {
        let Some(entry) = entry else {
            trail.push(format!("{}: not reported", endpoint));
            continue;
        };

        let body = entry.body_value();
        if entry.status != 200 {
            let err = ResolveError::HttpStatus {
                status: entry.status,
                body: truncate_body(&body.to_string()),
            };
            trail.push(format!("{}: {}", endpoint, err));
            continue;
        }

        match locate_file(&body) {
            Some(found) => {
                trail.push(format!("{}: 200 with URL", endpoint));
                return Some(found);
            }
            None => trail.push(
                ResolveError::NoUrlFound(format!("{} answered {}", endpoint, truncate_body(&body.to_string())))
                    .to_string(),
            ),
        }
    }

    None
}

pub struct SignedApiStrategy {
    config: Arc<ResolverConfig>,
}

impl SignedApiStrategy {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        Self { config }
    }

    /// Walk the candidate list against one endpoint
    async fn try_endpoint(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        body: &Value,
        trail: &mut Vec<String>,
    ) -> Option<LocatedFile> {
        let mut rejected = 0;

        for index in 0..SIGNATURE_ENCODERS.len() {
            let ctx = SigningContext::build_now("POST", endpoint, None, Some(body));
            let candidate = &ctx.digest_encodings[index];

            match self.attempt(client, &ctx, index, body).await {
                Ok(value) => {
                    return match locate_file(&value) {
                        Some(found) => {
                            tracing::info!(endpoint, candidate = candidate.label, "signed call accepted");
                            trail.push(format!("{} [{}]: 200 with URL", endpoint, candidate.label));
                            Some(found)
                        }
                        None => {
                            let err = ResolveError::NoUrlFound(format!(
                                "{} answered {}",
                                endpoint,
                                truncate_body(&value.to_string())
                            ));
                            trail.push(err.to_string());
                            None
                        }
                    };
                }
                Err(e) if e.is_rejection() => {
                    tracing::debug!(endpoint, candidate = candidate.label, "signature candidate rejected");
                    trail.push(format!("{} [{}]: {}", endpoint, candidate.label, e));
                    rejected += 1;
                }
                Err(e @ ResolveError::InvalidHeader(_)) => {
                    trail.push(format!("{} [{}]: skipped, {}", endpoint, candidate.label, e));
                }
                Err(e) => {
                    tracing::warn!(endpoint, candidate = candidate.label, error = %e, "signed call failed");
                    trail.push(format!("{} [{}]: {}", endpoint, candidate.label, e));
                    return None;
                }
            }
        }

        if rejected > 0 {
            trail.push(
                ResolveError::SigningRejected {
                    endpoint: endpoint.to_string(),
                    attempts: rejected,
                }
                .to_string(),
            );
        }
        None
    }

    /// One signed POST; Ok only on 200 with a JSON body
    async fn attempt(
        &self,
        client: &reqwest::Client,
        ctx: &SigningContext,
        index: usize,
        body: &Value,
    ) -> Result<Value, ResolveError> {
        let headers = ctx.headers(&ctx.digest_encodings[index], &self.config)?;
        let response = client
            .post(self.config.api_url(&ctx.path))
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            return Err(ResolveError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            ResolveError::MalformedResponse(format!("{}: {} ({})", ctx.path, e, truncate_body(&text)))
        })
    }
}

#[async_trait]
impl ResolutionStrategy for SignedApiStrategy {
    fn name(&self) -> &'static str {
        "signed-api"
    }

    async fn resolve(&self, identifier: &ShareIdentifier) -> StrategyOutcome {
        let mut trail = Vec::new();

        let client = match build_client(&self.config, true) {
            Ok(c) => c,
            Err(e) => {
                trail.push(e.to_string());
                return StrategyOutcome::failed(trail);
            }
        };

        let body = request_body(identifier);
        for endpoint in SIGNED_ENDPOINTS {
            tracing::debug!(endpoint, id = %identifier, "trying signed endpoint");
            if let Some(found) = self.try_endpoint(&client, endpoint, &body, &mut trail).await {
                return found.into_outcome(trail);
            }
        }

        StrategyOutcome::failed(trail)
    }
}
