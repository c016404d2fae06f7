// Common data models for link resolution

use serde::{Deserialize, Serialize};
use std::fmt;

use super::diagnostics::{diagnose_trail, FailureReason};

/// Shape of the share link an identifier was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkFamily {
    /// `/app/<hex>` links carrying a 24+ character hex id
    AppShare,
    /// `/s/<code>` short links
    ShortLink,
    /// `?surl=<code>` query links
    SurlQuery,
    /// `/share/<code>` links
    SharePath,
}

impl LinkFamily {
    /// Whether `code` has the character class this family expects
    pub fn accepts(&self, code: &str) -> bool {
        if code.is_empty() {
            return false;
        }
        match self {
            Self::AppShare => code.len() >= 24 && code.chars().all(|c| c.is_ascii_hexdigit()),
            Self::ShortLink | Self::SurlQuery | Self::SharePath => code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        }
    }
}

impl fmt::Display for LinkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppShare => write!(f, "app-share"),
            Self::ShortLink => write!(f, "short-link"),
            Self::SurlQuery => write!(f, "surl-query"),
            Self::SharePath => write!(f, "share-path"),
        }
    }
}

/// Normalized code identifying one remote file.
///
/// Fields are private so the family/code invariant holds for every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShareIdentifier {
    family: LinkFamily,
    raw_code: String,
}

impl ShareIdentifier {
    /// Returns `None` when `raw_code` does not fit `family`
    pub fn new(family: LinkFamily, raw_code: impl Into<String>) -> Option<Self> {
        let mut raw_code = raw_code.into();
        if family == LinkFamily::AppShare {
            raw_code.make_ascii_lowercase();
        }
        family.accepts(&raw_code).then_some(Self { family, raw_code })
    }

    pub fn family(&self) -> LinkFamily {
        self.family
    }

    pub fn raw_code(&self) -> &str {
        &self.raw_code
    }

    /// Path of the public share page on the site
    pub fn page_path(&self) -> String {
        match self.family {
            LinkFamily::AppShare => format!("/app/{}", self.raw_code),
            _ => format!("/s/{}", self.raw_code),
        }
    }
}

impl fmt::Display for ShareIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.raw_code)
    }
}

/// Result of one strategy invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub success: bool,
    pub video_url: Option<String>,
    pub title: Option<String>,
    pub size_label: Option<String>,
    pub debug_trail: Vec<String>,
}

impl StrategyOutcome {
    pub fn resolved(video_url: impl Into<String>, debug_trail: Vec<String>) -> Self {
        Self {
            success: true,
            video_url: Some(video_url.into()),
            title: None,
            size_label: None,
            debug_trail,
        }
    }

    pub fn failed(debug_trail: Vec<String>) -> Self {
        Self {
            success: false,
            video_url: None,
            title: None,
            size_label: None,
            debug_trail,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_size_label(mut self, size_label: Option<String>) -> Self {
        self.size_label = size_label;
        self
    }
}

/// Debug trail of one failed strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailSection {
    pub strategy: String,
    pub entries: Vec<String>,
}

/// Terminal result of the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub success: bool,
    /// Strategy that produced the URL
    pub strategy: Option<String>,
    pub video_url: Option<String>,
    pub title: Option<String>,
    pub size_label: Option<String>,
    /// One section per failed strategy, in cascade order
    pub debug_trail: Vec<TrailSection>,
}

impl ResolutionOutcome {
    pub fn resolved(strategy: &str, outcome: StrategyOutcome, prior: Vec<TrailSection>) -> Self {
        Self {
            success: true,
            strategy: Some(strategy.to_string()),
            video_url: outcome.video_url,
            title: outcome.title,
            size_label: outcome.size_label,
            debug_trail: prior,
        }
    }

    pub fn failed(debug_trail: Vec<TrailSection>) -> Self {
        Self {
            success: false,
            strategy: None,
            video_url: None,
            title: None,
            size_label: None,
            debug_trail,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Concatenation of all trail entries, prefixed by strategy name
    pub fn flat_trail(&self) -> Vec<String> {
        self.debug_trail
            .iter()
            .flat_map(|section| {
                section
                    .entries
                    .iter()
                    .map(move |entry| format!("[{}] {}", section.strategy, entry))
            })
            .collect()
    }

    /// Presentation contract: URL data on success, diagnostics on failure
    pub fn view(&self) -> OutcomeView {
        match (&self.video_url, self.success) {
            (Some(url), true) => OutcomeView::Resolved {
                video_url: url.clone(),
                title: self.title.clone(),
                size_label: self.size_label.clone(),
            },
            _ => OutcomeView::Failed {
                debug_trail: self.flat_trail(),
                reason: diagnose_trail(self),
            },
        }
    }
}

/// What the presentation layer receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeView {
    #[serde(rename_all = "camelCase")]
    Resolved {
        video_url: String,
        title: Option<String>,
        size_label: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        debug_trail: Vec<String>,
        reason: Option<FailureReason>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_invariant() {
        assert!(ShareIdentifier::new(LinkFamily::AppShare, "abc").is_none());
        assert!(ShareIdentifier::new(LinkFamily::AppShare, "z".repeat(24)).is_none());
        assert!(ShareIdentifier::new(LinkFamily::ShortLink, "ab/c").is_none());
        assert!(ShareIdentifier::new(LinkFamily::ShortLink, "").is_none());

        let id = ShareIdentifier::new(LinkFamily::AppShare, "ABCDEF0123456789ABCDEF01").unwrap();
        assert_eq!(id.raw_code(), "abcdef0123456789abcdef01");
        assert_eq!(id.page_path(), "/app/abcdef0123456789abcdef01");

        let id = ShareIdentifier::new(LinkFamily::SurlQuery, "Ab_c-1").unwrap();
        assert_eq!(id.page_path(), "/s/Ab_c-1");
    }

    #[test]
    fn test_flat_trail_order() {
        let outcome = ResolutionOutcome::failed(vec![
            TrailSection {
                strategy: "one".to_string(),
                entries: vec!["a".to_string(), "b".to_string()],
            },
            TrailSection {
                strategy: "two".to_string(),
                entries: vec!["c".to_string()],
            },
        ]);

        assert_eq!(outcome.flat_trail(), vec!["[one] a", "[one] b", "[two] c"]);
    }

    #[test]
    fn test_view_serialization() {
        let outcome = ResolutionOutcome::resolved(
            "signed-api",
            StrategyOutcome::resolved("http://good", vec![])
                .with_title(Some("clip.mp4".to_string())),
            vec![],
        );

        let json = serde_json::to_value(outcome.view()).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["videoUrl"], "http://good");
        assert_eq!(json["title"], "clip.mp4");

        let failed = ResolutionOutcome::failed(vec![TrailSection {
            strategy: "cdn-probe".to_string(),
            entries: vec!["network timeout: https://cdn".to_string()],
        }]);
        let json = serde_json::to_value(failed.view()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["debugTrail"][0], "[cdn-probe] network timeout: https://cdn");
    }
}
