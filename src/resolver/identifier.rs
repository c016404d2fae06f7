// Share link recognition
//
// Pulls the first link out of free text whose host belongs to the file host,
// then applies the family patterns in order. Pure, no I/O.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::errors::ResolveError;
use super::models::{LinkFamily, ShareIdentifier};
use crate::config::DEFAULT_HOSTS;

lazy_static! {
    static ref LINK_RE: Regex = Regex::new(
        r#"(?i)(?:https?://)?(?:[a-z0-9-]+\.)+[a-z]{2,}(?::\d+)?(?:[/?][^\s<>"'`]*)?"#
    )
    .unwrap();
    static ref APP_RE: Regex = Regex::new(r"/app/([0-9a-fA-F]{24,})(?:/|$)").unwrap();
    static ref SHORT_RE: Regex = Regex::new(r"/s/([A-Za-z0-9_-]+)").unwrap();
    static ref SHARE_RE: Regex = Regex::new(r"/share/([A-Za-z0-9_-]+)").unwrap();
}

/// Recognizes share links for a set of hosts
#[derive(Debug, Clone)]
pub struct IdentifierExtractor {
    hosts: Vec<String>,
}

impl IdentifierExtractor {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().trim().trim_start_matches('.').to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// First recognized identifier in `text`, or `None` when the text holds
    /// no link of this file host
    pub fn extract(&self, text: &str) -> Option<ShareIdentifier> {
        LINK_RE
            .find_iter(text)
            .filter_map(|m| parse_link(m.as_str()))
            .filter(|url| url.host_str().map_or(false, |h| self.is_known_host(h)))
            .find_map(|url| match_families(&url))
    }

    /// Like `extract`, for callers that treat "not our link" as an error
    pub fn require(&self, text: &str) -> Result<ShareIdentifier, ResolveError> {
        self.extract(text).ok_or_else(|| {
            let preview: String = text.trim().chars().take(80).collect();
            ResolveError::InvalidIdentifier(format!("no recognized share link in '{}'", preview))
        })
    }

    fn is_known_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.hosts
            .iter()
            .any(|known| host == *known || host.ends_with(&format!(".{}", known)))
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTS.iter().copied())
    }
}

/// Extract with the default host list
pub fn extract_identifier(text: &str) -> Option<ShareIdentifier> {
    IdentifierExtractor::default().extract(text)
}

fn parse_link(token: &str) -> Option<Url> {
    let lower = token.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(token).ok()
    } else {
        Url::parse(&format!("https://{}", token)).ok()
    }
}

fn match_families(url: &Url) -> Option<ShareIdentifier> {
    let path = url.path();

    if let Some(caps) = APP_RE.captures(path) {
        return ShareIdentifier::new(LinkFamily::AppShare, &caps[1]);
    }

    if let Some(caps) = SHORT_RE.captures(path) {
        return ShareIdentifier::new(LinkFamily::ShortLink, &caps[1]);
    }

    if let Some((_, code)) = url.query_pairs().find(|(k, _)| k == "surl") {
        let code: String = code
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if let Some(id) = ShareIdentifier::new(LinkFamily::SurlQuery, code) {
            return Some(id);
        }
    }

    if let Some(caps) = SHARE_RE.captures(path) {
        return ShareIdentifier::new(LinkFamily::SharePath, &caps[1]);
    }

    None
}
