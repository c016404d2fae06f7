// ResolutionStrategy trait definition

use async_trait::async_trait;

use super::models::{ShareIdentifier, StrategyOutcome};

/// One independent technique for turning a share identifier into a URL.
///
/// Implementations never fail outward: every error ends up in the outcome's
/// debug trail with `success = false`.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// Name of the strategy (for logging and trail sections)
    fn name(&self) -> &'static str;

    /// Attempt resolution once
    async fn resolve(&self, identifier: &ShareIdentifier) -> StrategyOutcome;
}
