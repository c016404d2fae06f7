// StaticScrapeStrategy - plain GET of the public share page
//
// Tried with the desktop user agent first, then the mobile one (the mobile
// page is lighter and sometimes embeds the player directly). Evidence order:
// media redirect, <video>, inline scripts, og:video, download anchors, iframes.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{COOKIE, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::locator::LocatedFile;
use crate::resolver::models::{ShareIdentifier, StrategyOutcome};
use crate::resolver::traits::ResolutionStrategy;
use crate::resolver::utils::{build_client, content_type, looks_like_media, truncate_body};

lazy_static! {
    static ref SCRIPT_MEDIA_RE: Regex = Regex::new(
        r#"(https?:(?:\\?/){2}[^\s"'<>]+?\.(?:mp4|m3u8|webm|mkv|mov|mpd)(?:[?#][^\s"'<>]*)?)(?:[\s"'<>\\]|$)"#
    )
    .unwrap();
    static ref SCRIPT_KEY_RE: Regex = Regex::new(
        r#"(?i)["']?(?:signed_?url|download_?url|video_?url|stream_?url|file_?url|dlink|url|src|file)["']?\s*[:=]\s*["'](https?:[^"']+)["']"#
    )
    .unwrap();
    static ref FILENAME_RE: Regex = Regex::new(r#""server_filename"\s*:\s*"([^"]+)""#).unwrap();
}

/// A URL found in markup and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PageFinding {
    pub file: LocatedFile,
    pub source: &'static str,
}

pub struct StaticScrapeStrategy {
    config: Arc<ResolverConfig>,
}

enum Fetched {
    Media(String),
    Page { final_url: String, html: String },
}

impl StaticScrapeStrategy {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        Self { config }
    }

    async fn fetch(&self, client: &reqwest::Client, url: &str, user_agent: &str) -> Result<Fetched, ResolveError> {
        let mut request = client.get(url).header(USER_AGENT, user_agent);
        if let Some(key) = &self.config.api_key {
            request = request.header(COOKIE, format!("api_key={}", key));
        }

        let response = request.send().await?;
        let final_url = response.url().to_string();
        let ct = content_type(response.headers());

        // Body of a media response is never read
        if response.status().is_success() && looks_like_media(&final_url, ct.as_deref()) {
            return Ok(Fetched::Media(final_url));
        }

        let status = response.status();
        let html = response.text().await?;
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&html),
            });
        }

        Ok(Fetched::Page { final_url, html })
    }
}

#[async_trait]
impl ResolutionStrategy for StaticScrapeStrategy {
    fn name(&self) -> &'static str {
        "static-scrape"
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

        let page_url = self.config.site_url(&identifier.page_path());
        let agents = [
            ("desktop", self.config.user_agent.as_str()),
            ("mobile", self.config.mobile_user_agent.as_str()),
        ];

        for (label, agent) in agents {
            tracing::debug!(url = %page_url, agent = label, "fetching share page");

            match self.fetch(&client, &page_url, agent).await {
                Ok(Fetched::Media(url)) => {
                    trail.push(format!("{}: page redirected to media", label));
                    return StrategyOutcome::resolved(url, trail);
                }
                Ok(Fetched::Page { final_url, html }) => match extract_from_html(&html, &final_url) {
                    Some(finding) => {
                        tracing::info!(source = finding.source, "found URL in page markup");
                        trail.push(format!("{}: URL from {}", label, finding.source));
                        return finding.file.into_outcome(trail);
                    }
                    None => {
                        trail.push(format!(
                            "{}: {}",
                            label,
                            ResolveError::NoUrlFound(format!("{} ({} bytes of markup)", final_url, html.len()))
                        ));
                    }
                },
                Err(e) => {
                    tracing::debug!(agent = label, error = %e, "page fetch failed");
                    trail.push(format!("{}: {}", label, e));
                }
            }
        }

        StrategyOutcome::failed(trail)
    }
}

/// Search parsed markup for a download URL, in evidence order
pub fn extract_from_html(html: &str, base_url: &str) -> Option<PageFinding> {
    let doc = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let (url, source) = find_media_url(&doc, base.as_ref())?;
    Some(PageFinding {
        file: LocatedFile {
            url,
            title: page_title(&doc, html),
            size_label: None,
        },
        source,
    })
}

fn find_media_url(doc: &Html, base: Option<&Url>) -> Option<(String, &'static str)> {
    if let Some(url) = first_attr(doc, "video[src]", "src", base)
        .or_else(|| first_attr(doc, "video source[src]", "src", base))
    {
        return Some((url, "video element"));
    }

    if let Some(url) = script_url(doc) {
        return Some((url, "inline script"));
    }

    if let Some(url) = first_attr(
        doc,
        r#"meta[property="og:video"], meta[property="og:video:url"], meta[property="og:video:secure_url"]"#,
        "content",
        base,
    ) {
        return Some((url, "og:video"));
    }

    if let Some(url) = download_anchor(doc, base) {
        return Some((url, "download anchor"));
    }

    first_attr(doc, "iframe[src]", "src", base).map(|url| (url, "iframe"))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_attr(doc: &Html, css: &str, attr: &str, base: Option<&Url>) -> Option<String> {
    let sel = selector(css)?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .find_map(|raw| absolutize(raw, base))
}

fn script_url(doc: &Html) -> Option<String> {
    let sel = selector("script")?;
    let bodies: Vec<String> = doc
        .select(&sel)
        .filter(|el| el.value().attr("src").is_none())
        .map(|el| el.text().collect::<String>())
        .collect();

    let media = bodies
        .iter()
        .find_map(|body| {
            SCRIPT_MEDIA_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| unescape_js_url(m.as_str().trim_end_matches('\\')))
        });
    media.or_else(|| {
        bodies.iter().find_map(|body| {
            SCRIPT_KEY_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| unescape_js_url(m.as_str()))
        })
    })
}

fn download_anchor(doc: &Html, base: Option<&Url>) -> Option<String> {
    let sel = selector("a[href]")?;
    doc.select(&sel)
        .filter(|el| anchor_text(el).contains("download"))
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| absolutize(href, base))
}

fn anchor_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_lowercase()
}

fn page_title(doc: &Html, html: &str) -> Option<String> {
    first_attr_text(doc, r#"meta[property="og:title"]"#, "content")
        .or_else(|| {
            let sel = selector("title")?;
            doc.select(&sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .find(|t| !t.is_empty())
        })
        .or_else(|| FILENAME_RE.captures(html).map(|c| c[1].to_string()))
}

fn first_attr_text(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Absolute http(s) URL, resolving relative references against `base`
fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("javascript:") || raw.starts_with('#') {
        return None;
    }
    let url = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => base?.join(raw).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Undo JS string escaping commonly found around embedded URLs
pub fn unescape_js_url(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::LinkFamily;
    use crate::resolver::utils::test_support::{spawn_stub, StubResponse};

    const BASE: &str = "https://www.site.example/s/abc";

    #[test]
    fn test_video_element_first() {
        let html = r#"<html><head><meta property="og:video" content="https://og/v.mp4">
            <title> Clip </title></head>
            <body><video><source src="/media/v.mp4"></video></body></html>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.source, "video element");
        assert_eq!(found.file.url, "https://www.site.example/media/v.mp4");
        assert_eq!(found.file.title.as_deref(), Some("Clip"));
    }

    #[test]
    fn test_inline_script_escaped_url() {
        let html = r#"<script>window.__DATA__ = {"dlink":"https:\/\/cdn.example\/f\/v.m3u8?t=1"};</script>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.source, "inline script");
        assert_eq!(found.file.url, "https://cdn.example/f/v.m3u8?t=1");
    }

    #[test]
    fn test_inline_script_extension_in_host() {
        let html = r#"<script>{"dlink":"https://s3.movies.example/clip.mp4"}</script>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.source, "inline script");
        assert_eq!(found.file.url, "https://s3.movies.example/clip.mp4");

        let html = r#"<script>var s = "https:\/\/cdn.webm.example\/v\/a.mkv?sig=1\u0026e=2";</script>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.file.url, "https://cdn.webm.example/v/a.mkv?sig=1&e=2");
    }

    #[test]
    fn test_script_key_pattern() {
        let html = r#"<script>var player = { file: "https://stream.example/play?id=9" };</script>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.file.url, "https://stream.example/play?id=9");
    }

    #[test]
    fn test_og_then_anchor_then_iframe() {
        let og = r#"<meta property="og:video:secure_url" content="https://og/v.mp4"><a href="/dl">Download</a>"#;
        assert_eq!(extract_from_html(og, BASE).unwrap().source, "og:video");

        let anchor = r#"<a href="/home">Home</a><a href="/get/1"> Download now </a><iframe src="https://embed/1"></iframe>"#;
        let found = extract_from_html(anchor, BASE).unwrap();
        assert_eq!(found.source, "download anchor");
        assert_eq!(found.file.url, "https://www.site.example/get/1");

        let iframe = r#"<iframe src="//embed.example/p/1"></iframe>"#;
        let found = extract_from_html(iframe, BASE).unwrap();
        assert_eq!(found.source, "iframe");
        assert_eq!(found.file.url, "https://embed.example/p/1");
    }

    #[test]
    fn test_nothing_found() {
        let html = r#"<html><a href="javascript:void(0)">Download</a><p>Please log in</p></html>"#;
        assert!(extract_from_html(html, BASE).is_none());
    }

    #[test]
    fn test_title_fallbacks() {
        let html = r#"<script>{"server_filename":"movie.mkv"}</script><video src="https://v/1.mkv"></video>"#;
        let found = extract_from_html(html, BASE).unwrap();
        assert_eq!(found.file.title.as_deref(), Some("movie.mkv"));
    }

    fn strategy_for(base: &str, api_key: Option<&str>) -> StaticScrapeStrategy {
        let mut config = ResolverConfig::default().with_site_base(base).with_timeout(5);
        config.api_key = api_key.map(|k| k.to_string());
        StaticScrapeStrategy::new(Arc::new(config))
    }

    fn short_link() -> ShareIdentifier {
        ShareIdentifier::new(LinkFamily::ShortLink, "abc").unwrap()
    }

    #[tokio::test]
    async fn test_mobile_retry_and_cookie() {
        let mobile_ua = ResolverConfig::default().mobile_user_agent;
        let (base, log) = spawn_stub(move |req| {
            if req.header("user-agent") == Some(mobile_ua.as_str()) {
                StubResponse::html(r#"<title>Mobile</title><video src="https://cdn/v.mp4"></video>"#)
            } else {
                StubResponse::with_type(403, "text/html", "blocked")
            }
        })
        .await;

        let outcome = strategy_for(&base, Some("k1")).resolve(&short_link()).await;

        assert!(outcome.success, "trail: {:?}", outcome.debug_trail);
        assert_eq!(outcome.video_url.as_deref(), Some("https://cdn/v.mp4"));
        assert_eq!(outcome.title.as_deref(), Some("Mobile"));
        assert!(outcome.debug_trail[0].contains("HTTP 403"));

        let requests = log.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/s/abc");
        assert_eq!(requests[0].header("cookie"), Some("api_key=k1"));
    }

    #[tokio::test]
    async fn test_media_redirect_wins() {
        let (base, _log) = spawn_stub(|req| {
            if req.path == "/s/abc" {
                StubResponse::with_type(302, "text/html", "").with_header("Location", "/files/v.mp4")
            } else {
                StubResponse::with_type(200, "video/mp4", "data")
            }
        })
        .await;

        let outcome = strategy_for(&base, None).resolve(&short_link()).await;

        assert!(outcome.success);
        assert_eq!(outcome.video_url, Some(format!("{}/files/v.mp4", base)));
    }

    #[tokio::test]
    async fn test_both_agents_fail() {
        let (base, log) = spawn_stub(|_| StubResponse::html("<p>nothing here</p>")).await;

        let outcome = strategy_for(&base, None).resolve(&short_link()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.debug_trail.len(), 2);
        assert!(outcome.debug_trail.iter().all(|e| e.contains("no URL found")));
        assert!(log.lock().unwrap()[0].header("cookie").is_none());
    }
}
