// Failure diagnostics - explains why a cascade came back empty
//
// Scans the aggregated debug trail to determine:
// - The most specific reason resolution failed
// - What the user can try next

use serde::{Deserialize, Serialize};

use super::models::{ResolutionOutcome, TrailSection};
use super::strategies::cdn;

/// Reasons a resolution can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Link is gone, private or expired (404/410)
    LinkUnavailable,

    /// Upstream is throttling (429)
    RateLimited,

    /// Every signature candidate was refused
    SigningRejected,

    /// Browser or alternate runtime could not run
    AutomationUnavailable,

    /// Upstream answered with something unparseable
    MalformedResponse,

    /// Responses parsed but carried no download URL
    NoUrlFound,

    /// Calls ran out of time
    NetworkTimeout,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Check if trying again later might help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NetworkTimeout | Self::AutomationUnavailable | Self::Unknown
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::LinkUnavailable => "Link is unavailable or expired",
            Self::RateLimited => "Rate limited by the file host",
            Self::SigningRejected => "Request signature rejected by the file host",
            Self::AutomationUnavailable => "Browser or helper runtime unavailable",
            Self::MalformedResponse => "Unexpected response format",
            Self::NoUrlFound => "No download URL in any response",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }

    /// Suggestions for the user
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::LinkUnavailable => &[
                "Check if the link is public",
                "Make sure the link is not expired",
            ],
            Self::RateLimited => &["Wait a few minutes", "Try again from a different network"],
            Self::SigningRejected | Self::MalformedResponse | Self::NoUrlFound => &[
                "Check if the link is public",
                "Try a different link",
                "Make sure the link is not expired",
            ],
            Self::AutomationUnavailable => &[
                "Install Chromium or point browser.executable at it",
                "Check the alt_runtime program in config.toml",
            ],
            Self::NetworkTimeout => &["Check your internet connection", "Try again later"],
            Self::Unknown => &["Try again later", "Try a different link"],
        }
    }
}

/// Classify a single trail entry
pub fn diagnose_entry(entry: &str) -> Option<FailureReason> {
    let lower = entry.to_lowercase();

    // Checked first: its detail text often quotes OS errors like "not found"
    if lower.contains("automation unavailable") {
        return Some(FailureReason::AutomationUnavailable);
    }

    if lower.contains("http 404") || lower.contains("http 410") {
        return Some(FailureReason::LinkUnavailable);
    }

    if lower.contains("http 429") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("signing rejected") {
        return Some(FailureReason::SigningRejected);
    }

    if lower.contains("malformed response") {
        return Some(FailureReason::MalformedResponse);
    }

    if lower.contains("no url found") {
        return Some(FailureReason::NoUrlFound);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(FailureReason::NetworkTimeout);
    }

    if !entry.trim().is_empty() {
        return Some(FailureReason::Unknown);
    }

    None
}

/// Most specific reason across a failed outcome's trail
///
/// CDN guesses 404 as a matter of course, so their entries only count when
/// no other strategy left a classifiable entry.
pub fn diagnose_trail(outcome: &ResolutionOutcome) -> Option<FailureReason> {
    if outcome.is_success() {
        return None;
    }

    let (guesses, direct): (Vec<&TrailSection>, Vec<&TrailSection>) = outcome
        .debug_trail
        .iter()
        .partition(|section| section.strategy == cdn::STRATEGY_NAME);

    most_specific(&direct).or_else(|| most_specific(&guesses))
}

fn most_specific(sections: &[&TrailSection]) -> Option<FailureReason> {
    sections
        .iter()
        .flat_map(|section| section.entries.iter())
        .filter_map(|entry| diagnose_entry(entry))
        .min_by_key(|reason| *reason as u8)
}
