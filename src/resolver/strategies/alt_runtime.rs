// AlternateRuntimeStrategy - delegates the signed calls to a child process
//
// The helper computes the same canonical string in another runtime, which may
// hash or encode it differently than we do. Protocol:
// - invoked as `<program> <args...> <code>`
// - API and site origins passed via environment
// - last non-empty stdout line is a JSON report:
//   {"sign": {"status": 200, "body": ...}, "temp_info": {...}}

use async_trait::async_trait;
use std::sync::Arc;

use super::signed_api::{evaluate_report, SignedCallReport};
use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::models::{ShareIdentifier, StrategyOutcome};
use crate::resolver::traits::ResolutionStrategy;
use crate::resolver::utils::{run_output_with_timeout, truncate_body};

pub const API_BASE_ENV: &str = "SHARE_RESOLVER_API_BASE";
pub const SITE_BASE_ENV: &str = "SHARE_RESOLVER_SITE_BASE";

/// Parse the helper's stdout
pub fn parse_report(stdout: &str) -> Result<SignedCallReport, ResolveError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ResolveError::MalformedResponse("helper printed nothing".to_string()))?;

    serde_json::from_str(line)
        .map_err(|e| ResolveError::MalformedResponse(format!("helper output: {} ({})", e, truncate_body(line))))
}

pub struct AltRuntimeStrategy {
    config: Arc<ResolverConfig>,
}

impl AltRuntimeStrategy {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        Self { config }
    }

    async fn run_helper(&self, identifier: &ShareIdentifier) -> Result<SignedCallReport, ResolveError> {
        let settings = &self.config.alt_runtime;
        if !settings.enabled {
            return Err(ResolveError::AutomationUnavailable(
                "alternate runtime disabled in config".to_string(),
            ));
        }

        let mut args = settings.args.clone();
        args.push(identifier.raw_code().to_string());
        let envs = [
            (API_BASE_ENV, self.config.api_base.clone()),
            (SITE_BASE_ENV, self.config.site_base.clone()),
        ];

        tracing::debug!(program = %settings.program, ?args, "spawning signing helper");
        let output = run_output_with_timeout(&settings.program, &args, &envs, settings.timeout_secs).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::AutomationUnavailable(format!(
                "{} exited with {}: {}",
                settings.program,
                output.status,
                truncate_body(&stderr)
            )));
        }

        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ResolutionStrategy for AltRuntimeStrategy {
    fn name(&self) -> &'static str {
        "alt-runtime"
    }

    async fn resolve(&self, identifier: &ShareIdentifier) -> StrategyOutcome {
        let mut trail = Vec::new();

        match self.run_helper(identifier).await {
            Ok(report) => {
                if let Some(found) = evaluate_report(&report, &mut trail) {
                    tracing::info!("signing helper produced a URL");
                    return found.into_outcome(trail);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "signing helper failed");
                trail.push(e.to_string());
            }
        }

        StrategyOutcome::failed(trail)
    }
}
