// BrowserInterceptionStrategy - headless Chromium on the share page
//
// The page's own scripts hold a valid session, so besides watching network
// traffic we issue the signed calls from inside the page with its cookies.
// Evidence order:
// 1. In-page signed call responses
// 2. Rendered <video>/<source>/<iframe> sources
// 3. Captured media responses, then captured API JSON bodies
//
// Every attempt gets a throwaway profile directory. The browser is closed
// and the profile removed on every exit path, timeout included.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, GetResponseBodyParams, RequestId};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use url::Url;

use super::signed_api::{evaluate_report, SignedCallReport, SIGN_ENDPOINT, TEMP_INFO_ENDPOINT};
use crate::config::ResolverConfig;
use crate::resolver::errors::ResolveError;
use crate::resolver::locator::{is_url, locate_file, LocatedFile};
use crate::resolver::models::{ShareIdentifier, StrategyOutcome};
use crate::resolver::traits::ResolutionStrategy;
use crate::resolver::utils::{has_media_extension, looks_like_media};

const MEDIA_SOURCES_JS: &str = r#"Array.from(document.querySelectorAll("video, video source, iframe"))
    .map(e => e.currentSrc || e.src || "")
    .filter(s => s.startsWith("http"))"#;

/// One `Network.responseReceived` event worth keeping
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub request_id: RequestId,
    pub url: String,
    pub mime_type: String,
    pub status: i64,
}

/// Everything the page gave us, before ranking
#[derive(Debug, Default)]
pub struct Evidence {
    pub signed: Option<LocatedFile>,
    pub element_sources: Vec<String>,
    pub media_responses: Vec<String>,
    pub api_bodies: Vec<Value>,
}

/// Aborts a background task when dropped, including when the attempt that
/// owns it is cancelled by its time budget
pub struct AbortOnDrop(pub JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Pick the strongest piece of evidence
pub fn choose_evidence(evidence: Evidence) -> Option<(LocatedFile, &'static str)> {
    if let Some(found) = evidence.signed {
        return Some((found, "in-page signed call"));
    }

    let bare = |url: String| LocatedFile {
        url,
        title: None,
        size_label: None,
    };

    if let Some(url) = evidence.element_sources.into_iter().find(|u| is_url(u)) {
        return Some((bare(url), "media element"));
    }

    if let Some(url) = evidence.media_responses.into_iter().find(|u| is_url(u)) {
        return Some((bare(url), "captured media response"));
    }

    evidence
        .api_bodies
        .iter()
        .find_map(locate_file)
        .map(|found| (found, "captured API response"))
}

fn from_cdp(e: CdpError) -> ResolveError {
    match e {
        CdpError::Timeout => ResolveError::NetworkTimeout("browser command".to_string()),
        other => ResolveError::AutomationUnavailable(format!("browser: {}", other)),
    }
}

/// Awaited expression whose result comes back as JSON
fn by_value(expression: impl Into<String>) -> Result<EvaluateParams, ResolveError> {
    EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(ResolveError::AutomationUnavailable)
}

/// JS issuing both signed calls with the page's credentials
fn signed_calls_js(api_base: &str, code: &str) -> String {
    let api = Value::String(api_base.trim_end_matches('/').to_string());
    let code = Value::String(code.to_string());
    format!(
        r#"(async () => {{
    const out = {{}};
    for (const [key, path] of [["sign", "{sign}"], ["temp_info", "{temp}"]]) {{
        try {{
            const r = await fetch({api} + path, {{
                method: "POST",
                credentials: "include",
                headers: {{ "Content-Type": "application/json" }},
                body: JSON.stringify({{ id: {code} }})
            }});
            out[key] = {{ status: r.status, body: await r.text() }};
        }} catch (e) {{
            out[key] = {{ status: 0, body: String(e) }};
        }}
    }}
    return out;
}})()"#,
        sign = SIGN_ENDPOINT,
        temp = TEMP_INFO_ENDPOINT,
        api = api,
        code = code,
    )
}

pub struct BrowserInterceptionStrategy {
    config: Arc<ResolverConfig>,
}

impl BrowserInterceptionStrategy {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        Self { config }
    }

    async fn launch(&self, profile: &Path) -> Result<(Browser, JoinHandle<()>), ResolveError> {
        let settings = &self.config.browser;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile)
            .no_sandbox()
            .request_timeout(self.config.request_timeout())
            .arg("--disable-gpu")
            .arg("--mute-audio")
            .arg(format!("--user-agent={}", self.config.user_agent));
        if let Some(proxy) = &self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if let Some(exe) = &settings.executable {
            builder = builder.chrome_executable(exe);
        }

        let browser_config = builder
            .build()
            .map_err(|e| ResolveError::AutomationUnavailable(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ResolveError::AutomationUnavailable(format!("browser launch failed: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handler_task))
    }

    /// Drive one page; the caller owns browser teardown
    async fn intercept(
        &self,
        browser: &Browser,
        identifier: &ShareIdentifier,
        trail: &mut Vec<String>,
    ) -> Result<Option<(LocatedFile, &'static str)>, ResolveError> {
        let page = browser.new_page("about:blank").await.map_err(from_cdp)?;

        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(from_cdp)?;
        let captured: Arc<Mutex<Vec<CapturedResponse>>> = Arc::default();
        let sink = captured.clone();
        let collector = AbortOnDrop(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let entry = CapturedResponse {
                    request_id: event.request_id.clone(),
                    url: event.response.url.clone(),
                    mime_type: event.response.mime_type.clone(),
                    status: event.response.status,
                };
                if let Ok(mut seen) = sink.lock() {
                    seen.push(entry);
                }
            }
        }));

        let page_url = self.config.site_url(&identifier.page_path());
        tracing::debug!(url = %page_url, "navigating");
        if let Err(e) = page.goto(page_url.as_str()).await {
            trail.push(format!("navigation: {}", from_cdp(e)));
        }
        sleep(Duration::from_millis(self.config.browser.settle_millis)).await;

        let signed = match self.signed_calls(&page, identifier).await {
            Ok(report) => evaluate_report(&report, trail),
            Err(e) => {
                trail.push(format!("in-page signed calls: {}", e));
                None
            }
        };

        let element_sources = match self.media_sources(&page).await {
            Ok(sources) => sources,
            Err(e) => {
                trail.push(format!("media elements: {}", e));
                Vec::new()
            }
        };

        let title = page.get_title().await.ok().flatten().filter(|t| !t.trim().is_empty());

        drop(collector);
        let captured = captured.lock().map(|seen| seen.clone()).unwrap_or_default();
        trail.push(format!("captured {} responses", captured.len()));

        let evidence = Evidence {
            signed,
            element_sources,
            media_responses: captured
                .iter()
                .filter(|r| has_media_extension(&r.url) || looks_like_media(&r.url, Some(&r.mime_type)))
                .map(|r| r.url.clone())
                .collect(),
            api_bodies: self.api_bodies(&page, &captured).await,
        };

        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "page close failed");
        }

        Ok(choose_evidence(evidence).map(|(mut found, source)| {
            if found.title.is_none() {
                found.title = title;
            }
            (found, source)
        }))
    }

    async fn signed_calls(&self, page: &Page, identifier: &ShareIdentifier) -> Result<SignedCallReport, ResolveError> {
        let js = signed_calls_js(&self.config.api_base, identifier.raw_code());
        page.evaluate_expression(by_value(js)?)
            .await
            .map_err(from_cdp)?
            .into_value::<SignedCallReport>()
            .map_err(|e| ResolveError::MalformedResponse(format!("in-page report: {}", e)))
    }

    async fn media_sources(&self, page: &Page) -> Result<Vec<String>, ResolveError> {
        page.evaluate_expression(by_value(MEDIA_SOURCES_JS)?)
            .await
            .map_err(from_cdp)?
            .into_value::<Vec<String>>()
            .map_err(|e| ResolveError::MalformedResponse(format!("media sources: {}", e)))
    }

    /// JSON bodies of successful responses from the API host
    async fn api_bodies(&self, page: &Page, captured: &[CapturedResponse]) -> Vec<Value> {
        let api_host = Url::parse(&self.config.api_base)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let Some(api_host) = api_host else {
            return Vec::new();
        };

        let mut bodies = Vec::new();
        for response in captured {
            let from_api = Url::parse(&response.url)
                .ok()
                .map_or(false, |u| u.host_str() == Some(api_host.as_str()));
            if !from_api || response.status != 200 || !response.mime_type.contains("json") {
                continue;
            }

            match page.execute(GetResponseBodyParams::new(response.request_id.clone())).await {
                Ok(reply) if !reply.result.base64_encoded => {
                    if let Ok(value) = serde_json::from_str::<Value>(&reply.result.body) {
                        bodies.push(value);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(url = %response.url, error = %e, "response body unavailable"),
            }
        }
        bodies
    }
}

#[async_trait]
impl ResolutionStrategy for BrowserInterceptionStrategy {
    fn name(&self) -> &'static str {
        "browser-interception"
    }

    async fn resolve(&self, identifier: &ShareIdentifier) -> StrategyOutcome {
        let mut trail = Vec::new();
        let settings = &self.config.browser;

        if !settings.enabled {
            trail.push(ResolveError::AutomationUnavailable("browser disabled in config".to_string()).to_string());
            return StrategyOutcome::failed(trail);
        }

        let profile = match tempfile::Builder::new().prefix("share-resolver-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                trail.push(ResolveError::AutomationUnavailable(format!("profile dir: {}", e)).to_string());
                return StrategyOutcome::failed(trail);
            }
        };

        let (mut browser, handler_task) = match self.launch(profile.path()).await {
            Ok(launched) => launched,
            Err(e) => {
                tracing::warn!(error = %e, "browser unavailable");
                trail.push(e.to_string());
                return StrategyOutcome::failed(trail);
            }
        };
        tracing::debug!(profile = %profile.path().display(), "browser launched");

        let budget = Duration::from_secs(settings.timeout_secs);
        let attempt = timeout(budget, self.intercept(&browser, identifier, &mut trail)).await;

        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "browser close failed");
        }
        let _ = timeout(Duration::from_secs(5), browser.wait()).await;
        handler_task.abort();
        drop(profile);
        tracing::debug!("browser torn down");

        match attempt {
            Ok(Ok(Some((found, source)))) => {
                tracing::info!(source, "browser produced a URL");
                trail.push(format!("URL from {}", source));
                found.into_outcome(trail)
            }
            Ok(Ok(None)) => {
                trail.push(ResolveError::NoUrlFound("nothing usable captured in the page".to_string()).to_string());
                StrategyOutcome::failed(trail)
            }
            Ok(Err(e)) => {
                trail.push(e.to_string());
                StrategyOutcome::failed(trail)
            }
            Err(_) => {
                trail.push(
                    ResolveError::NetworkTimeout(format!("browser attempt exceeded {}s", settings.timeout_secs))
                        .to_string(),
                );
                StrategyOutcome::failed(trail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserSettings;
    use crate::resolver::models::LinkFamily;
    use serde_json::json;

    #[tokio::test]
    async fn test_abort_on_drop_stops_task() {
        let held = Arc::new(());
        let in_task = held.clone();
        let guard = AbortOnDrop(tokio::spawn(async move {
            let _held = in_task;
            std::future::pending::<()>().await;
        }));
        sleep(Duration::from_millis(20)).await;
        assert_eq!(Arc::strong_count(&held), 2);

        drop(guard);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[tokio::test]
    async fn test_guard_dropped_when_budget_expires() {
        let held = Arc::new(());
        let in_task = held.clone();
        let attempt = async move {
            let _collector = AbortOnDrop(tokio::spawn(async move {
                let _held = in_task;
                std::future::pending::<()>().await;
            }));
            sleep(Duration::from_secs(30)).await;
        };

        assert!(timeout(Duration::from_millis(20), attempt).await.is_err());
        sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&held), 1);
    }

    fn located(url: &str) -> LocatedFile {
        LocatedFile {
            url: url.to_string(),
            title: Some("t".to_string()),
            size_label: None,
        }
    }

    #[test]
    fn test_signed_call_beats_everything() {
        let evidence = Evidence {
            signed: Some(located("https://signed/v.mp4")),
            element_sources: vec!["https://element/v.mp4".to_string()],
            media_responses: vec!["https://net/v.mp4".to_string()],
            api_bodies: vec![json!({"url": "https://api/v.mp4"})],
        };
        let (found, source) = choose_evidence(evidence).unwrap();
        assert_eq!(found.url, "https://signed/v.mp4");
        assert_eq!(source, "in-page signed call");
    }

    #[test]
    fn test_element_then_network_then_api() {
        let evidence = Evidence {
            element_sources: vec!["https://element/v.mp4".to_string()],
            media_responses: vec!["https://net/v.mp4".to_string()],
            ..Default::default()
        };
        assert_eq!(choose_evidence(evidence).unwrap().1, "media element");

        let evidence = Evidence {
            media_responses: vec!["https://net/seg.m3u8".to_string()],
            api_bodies: vec![json!({"url": "https://api/v.mp4"})],
            ..Default::default()
        };
        assert_eq!(choose_evidence(evidence).unwrap().0.url, "https://net/seg.m3u8");

        let evidence = Evidence {
            api_bodies: vec![json!({"errno": 1}), json!({"data": {"dlink": "https://api/v.mp4"}})],
            ..Default::default()
        };
        let (found, source) = choose_evidence(evidence).unwrap();
        assert_eq!(found.url, "https://api/v.mp4");
        assert_eq!(source, "captured API response");

        assert!(choose_evidence(Evidence::default()).is_none());
    }

    #[test]
    fn test_signed_calls_js_quotes_inputs() {
        let js = signed_calls_js("https://api.example/", "ab\"c");
        assert!(js.contains(r#"fetch("https://api.example" + path"#));
        assert!(js.contains(r#"id: "ab\"c""#));
        assert!(js.contains("credentials: \"include\""));
        assert!(js.contains(SIGN_ENDPOINT) && js.contains(TEMP_INFO_ENDPOINT));
    }

    #[tokio::test]
    async fn test_disabled_does_not_launch() {
        let config = ResolverConfig::default().with_browser(BrowserSettings {
            enabled: false,
            ..Default::default()
        });
        let strategy = BrowserInterceptionStrategy::new(Arc::new(config));
        let id = ShareIdentifier::new(LinkFamily::ShortLink, "abc").unwrap();

        let outcome = strategy.resolve(&id).await;

        assert!(!outcome.success);
        assert_eq!(outcome.debug_trail.len(), 1);
        assert!(outcome.debug_trail[0].starts_with("automation unavailable"));
    }

    #[tokio::test]
    async fn test_missing_executable_fails_cleanly() {
        let config = ResolverConfig::default().with_browser(BrowserSettings {
            executable: Some("/nonexistent/chromium-7c1e".into()),
            timeout_secs: 10,
            ..Default::default()
        });
        let strategy = BrowserInterceptionStrategy::new(Arc::new(config));
        let id = ShareIdentifier::new(LinkFamily::ShortLink, "abc").unwrap();

        let outcome = strategy.resolve(&id).await;

        assert!(!outcome.success);
        assert!(outcome.debug_trail[0].starts_with("automation unavailable"));
    }
}
