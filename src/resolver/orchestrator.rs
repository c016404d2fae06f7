// Resolution cascade with fallback logic
//
// Strategies run strictly one after another in insertion order. The first
// success ends the cascade; every failure leaves its trail section behind.

use std::sync::Arc;

use super::identifier::IdentifierExtractor;
use super::models::{ResolutionOutcome, ShareIdentifier, TrailSection};
use super::strategies::{
    AltRuntimeStrategy, BrowserInterceptionStrategy, CdnProbeStrategy, SignedApiStrategy,
    StaticScrapeStrategy,
};
use super::traits::ResolutionStrategy;
use crate::config::ResolverConfig;

pub struct ResolutionCascade {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl ResolutionCascade {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The five strategies in fixed priority order
    pub fn standard(config: Arc<ResolverConfig>) -> Self {
        let mut cascade = Self::new();
        cascade.add_strategy(Box::new(SignedApiStrategy::new(config.clone())));
        cascade.add_strategy(Box::new(BrowserInterceptionStrategy::new(config.clone())));
        cascade.add_strategy(Box::new(StaticScrapeStrategy::new(config.clone())));
        cascade.add_strategy(Box::new(CdnProbeStrategy::new(config.clone())));
        cascade.add_strategy(Box::new(AltRuntimeStrategy::new(config)));
        cascade
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn ResolutionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, identifier: &ShareIdentifier) -> ResolutionOutcome {
        let mut sections = Vec::new();

        for strategy in &self.strategies {
            tracing::info!(strategy = strategy.name(), id = %identifier, "trying strategy");

            let outcome = strategy.resolve(identifier).await;
            if outcome.success && outcome.video_url.is_some() {
                tracing::info!(strategy = strategy.name(), "resolved");
                return ResolutionOutcome::resolved(strategy.name(), outcome, sections);
            }

            tracing::info!(
                strategy = strategy.name(),
                entries = outcome.debug_trail.len(),
                "strategy failed"
            );
            sections.push(TrailSection {
                strategy: strategy.name().to_string(),
                entries: outcome.debug_trail,
            });
        }

        tracing::warn!(id = %identifier, attempted = sections.len(), "all strategies failed");
        ResolutionOutcome::failed(sections)
    }

    /// `None` when the text holds no recognized link; the cascade is not run
    pub async fn resolve_text(&self, extractor: &IdentifierExtractor, text: &str) -> Option<ResolutionOutcome> {
        let identifier = extractor.extract(text)?;
        Some(self.resolve(&identifier).await)
    }
}

impl Default for ResolutionCascade {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::{LinkFamily, StrategyOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        url: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn boxed(name: &'static str, url: Option<&'static str>, calls: &Arc<AtomicUsize>) -> Box<dyn ResolutionStrategy> {
            Box::new(Self {
                name,
                url,
                calls: calls.clone(),
            })
        }
    }

    #[async_trait]
    impl ResolutionStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _identifier: &ShareIdentifier) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.url {
                Some(url) => StrategyOutcome::resolved(url, vec![format!("{} ok", self.name)]),
                None => StrategyOutcome::failed(vec![format!("{} failed", self.name)]),
            }
        }
    }

    fn identifier() -> ShareIdentifier {
        ShareIdentifier::new(LinkFamily::ShortLink, "abc").unwrap()
    }

    #[tokio::test]
    async fn test_second_strategy_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let third_calls = Arc::new(AtomicUsize::new(0));
        let mut cascade = ResolutionCascade::new();
        cascade.add_strategy(Scripted::boxed("one", None, &calls));
        cascade.add_strategy(Scripted::boxed("two", Some("http://good"), &calls));
        cascade.add_strategy(Scripted::boxed("three", Some("http://late"), &third_calls));

        let outcome = cascade.resolve(&identifier()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.video_url.as_deref(), Some("http://good"));
        assert_eq!(outcome.strategy.as_deref(), Some("two"));
        assert_eq!(outcome.debug_trail.len(), 1);
        assert_eq!(outcome.debug_trail[0].strategy, "one");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_fail_keeps_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cascade = ResolutionCascade::new();
        for name in ["a", "b", "c", "d"] {
            cascade.add_strategy(Scripted::boxed(name, None, &calls));
        }

        let outcome = cascade.resolve(&identifier()).await;

        assert!(!outcome.is_success());
        let order: Vec<&str> = outcome.debug_trail.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(outcome.flat_trail()[3], "[d] d failed");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_success_without_url_counts_as_failure() {
        struct Hollow;

        #[async_trait]
        impl ResolutionStrategy for Hollow {
            fn name(&self) -> &'static str {
                "hollow"
            }

            async fn resolve(&self, _identifier: &ShareIdentifier) -> StrategyOutcome {
                StrategyOutcome {
                    success: true,
                    ..StrategyOutcome::failed(vec![])
                }
            }
        }

        let mut cascade = ResolutionCascade::new();
        cascade.add_strategy(Box::new(Hollow));

        let outcome = cascade.resolve(&identifier()).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.debug_trail.len(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_text_skips_cascade() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cascade = ResolutionCascade::new();
        cascade.add_strategy(Scripted::boxed("one", Some("http://good"), &calls));
        let extractor = IdentifierExtractor::default();

        assert!(cascade.resolve_text(&extractor, "hello there https://other.example/x").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let outcome = cascade
            .resolve_text(&extractor, "look: https://www.diskwala.com/s/abc")
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_standard_order() {
        let cascade = ResolutionCascade::standard(Arc::new(ResolverConfig::default()));
        assert_eq!(
            cascade.strategy_names(),
            vec!["signed-api", "browser-interception", "static-scrape", "cdn-probe", "alt-runtime"]
        );
    }
}
