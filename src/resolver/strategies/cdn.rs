// CDNProbeStrategy - guesses CDN URLs from the share code

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use std::sync::Arc;
use url::Url;

use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::locator::size_label_from_bytes;
use crate::resolver::models::{ShareIdentifier, StrategyOutcome};
use crate::resolver::traits::ResolutionStrategy;
use crate::resolver::utils::{build_client, content_type, looks_like_media};

/// What a HEAD probe told us
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeVerdict {
    /// Guess exists and serves media
    Media { size_label: Option<String> },
    /// Guess redirects somewhere; the target is the answer
    Redirect(String),
    Rejected(String),
}

/// Classify one probe response
pub fn classify_probe(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    content_length: Option<u64>,
    location: Option<&str>,
) -> ProbeVerdict {
    match status {
        200..=299 if looks_like_media(url, content_type) => ProbeVerdict::Media {
            size_label: content_length.filter(|n| *n > 0).map(size_label_from_bytes),
        },
        200..=299 => ProbeVerdict::Rejected(format!(
            "{} not media ({})",
            status,
            content_type.unwrap_or("no content-type")
        )),
        300..=399 => match location.and_then(|loc| resolve_location(url, loc)) {
            Some(target) => ProbeVerdict::Redirect(target),
            None => ProbeVerdict::Rejected(format!("{} without usable Location", status)),
        },
        _ => ProbeVerdict::Rejected(format!("HTTP {}", status)),
    }
}

fn resolve_location(base: &str, location: &str) -> Option<String> {
    Url::parse(base)
        .ok()?
        .join(location.trim())
        .ok()
        .map(|u| u.to_string())
}

/// Misses here are expected, so failure diagnosis weighs this trail last
pub const STRATEGY_NAME: &str = "cdn-probe";

pub struct CdnProbeStrategy {
    config: Arc<ResolverConfig>,
}

impl CdnProbeStrategy {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        Self { config }
    }

    /// Guessed URLs for this identifier, in template order
    pub fn candidates(&self, identifier: &ShareIdentifier) -> Vec<String> {
        self.config
            .cdn_templates
            .iter()
            .map(|t| t.replace("{code}", identifier.raw_code()))
            .collect()
    }

    async fn probe(&self, client: &reqwest::Client, url: &str) -> Result<ProbeVerdict, ResolveError> {
        let response = client.head(url).send().await?;
        let headers = response.headers();

        let ct = content_type(headers);
        let length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let location = headers.get(LOCATION).and_then(|v| v.to_str().ok());

        Ok(classify_probe(
            url,
            response.status().as_u16(),
            ct.as_deref(),
            length,
            location,
        ))
    }
}

#[async_trait]
impl ResolutionStrategy for CdnProbeStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn resolve(&self, identifier: &ShareIdentifier) -> StrategyOutcome {
        let mut trail = Vec::new();

        // Redirects are answers here, so never follow them
        let client = match build_client(&self.config, false) {
            Ok(c) => c,
            Err(e) => {
                trail.push(e.to_string());
                return StrategyOutcome::failed(trail);
            }
        };

        for url in self.candidates(identifier) {
            match self.probe(&client, &url).await {
                Ok(ProbeVerdict::Media { size_label }) => {
                    tracing::info!(url = %url, "CDN guess serves media");
                    trail.push(format!("{}: media", url));
                    return StrategyOutcome::resolved(url, trail).with_size_label(size_label);
                }
                Ok(ProbeVerdict::Redirect(target)) => {
                    tracing::info!(url = %url, target = %target, "CDN guess redirects");
                    trail.push(format!("{}: redirect", url));
                    return StrategyOutcome::resolved(target, trail);
                }
                Ok(ProbeVerdict::Rejected(reason)) => trail.push(format!("{}: {}", url, reason)),
                Err(e) => trail.push(format!("{}: {}", url, e)),
            }
        }

        StrategyOutcome::failed(trail)
    }
}
