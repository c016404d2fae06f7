//! Resolver configuration: hosts, endpoints, timeouts and credentials.
//!
//! Loaded once at startup from `config.toml` and shared read-only by every
//! strategy. Missing keys fall back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hosts whose share links are recognized out of the box
pub const DEFAULT_HOSTS: &[&str] = &["diskwala.com", "diskwala.in", "diskwala.me"];

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36";

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "SHARE_RESOLVER_CONFIG";

/// Headless browser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub enabled: bool,
    /// Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Budget for the whole attempt, launch to teardown
    pub timeout_secs: u64,
    /// Wait after navigation so background requests can land
    pub settle_millis: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: None,
            timeout_secs: 60,
            settle_millis: 3000,
        }
    }
}

/// Out-of-process signer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AltRuntimeSettings {
    pub enabled: bool,
    pub program: String,
    /// Arguments placed before the share code
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AltRuntimeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "node".to_string(),
            args: vec!["sign.js".to_string()],
            timeout_secs: 30,
        }
    }
}

/// Video host used to republish resolved files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepublishSettings {
    pub api_key: Option<String>,
    pub upload_endpoint: String,
    pub fallback_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for RepublishSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            upload_endpoint: "https://vidhidepro.com/api/upload/url".to_string(),
            fallback_endpoint: "https://vidhide.com/api/remote".to_string(),
            timeout_secs: 180,
        }
    }
}

/// Configuration for the resolution cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Link hosts (subdomains included)
    pub hosts: Vec<String>,
    /// Origin of the public share pages
    pub site_base: String,
    /// Origin of the signed API
    pub api_base: String,
    /// Timeout for every single network call
    pub request_timeout_secs: u64,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    pub user_agent: String,
    pub mobile_user_agent: String,
    pub signature_header: String,
    pub timestamp_header: String,
    /// Site credential, sent as a cookie on page fetches
    pub api_key: Option<String>,
    /// CDN guesses; `{code}` is replaced with the share code
    pub cdn_templates: Vec<String>,
    pub browser: BrowserSettings,
    pub alt_runtime: AltRuntimeSettings,
    pub republish: RepublishSettings,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            site_base: "https://www.diskwala.com".to_string(),
            api_base: "https://api.diskwala.com".to_string(),
            request_timeout_secs: 20,
            proxy: None,
            user_agent: DESKTOP_UA.to_string(),
            mobile_user_agent: MOBILE_UA.to_string(),
            signature_header: "x-signature".to_string(),
            timestamp_header: "x-timestamp".to_string(),
            api_key: None,
            cdn_templates: vec![
                "https://cdn.diskwala.com/file/{code}".to_string(),
                "https://cdn.diskwala.com/videos/{code}.mp4".to_string(),
                "https://stream.diskwala.com/{code}/index.m3u8".to_string(),
                "https://files.diskwala.com/download/{code}".to_string(),
            ],
            browser: BrowserSettings::default(),
            alt_runtime: AltRuntimeSettings::default(),
            republish: RepublishSettings::default(),
        }
    }
}

impl ResolverConfig {
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_site_base(mut self, base: impl Into<String>) -> Self {
        self.site_base = base.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    pub fn with_signature_header(mut self, name: impl Into<String>) -> Self {
        self.signature_header = name.into();
        self
    }

    pub fn with_cdn_templates(mut self, templates: Vec<String>) -> Self {
        self.cdn_templates = templates;
        self
    }

    pub fn with_browser(mut self, browser: BrowserSettings) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_alt_runtime(mut self, alt_runtime: AltRuntimeSettings) -> Self {
        self.alt_runtime = alt_runtime;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// `site_base` + path, without doubled slashes
    pub fn site_url(&self, path: &str) -> String {
        join_base(&self.site_base, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        join_base(&self.api_base, path)
    }
}

fn join_base(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Default location: `$SHARE_RESOLVER_CONFIG` or `<config_dir>/share-resolver/config.toml`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(custom));
    }
    dirs::config_dir().map(|dir| dir.join("share-resolver").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_from(path: &Path) -> Result<ResolverConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg: ResolverConfig = toml::from_str(&data)
        .with_context(|| format!("parse config file: {}", path.display()))?;
    Ok(cfg)
}

/// Load from the default location, or built-in defaults when no file exists
pub fn load_or_default() -> Result<ResolverConfig> {
    match config_path() {
        Some(path) if path.exists() => {
            tracing::info!("loading config from {}", path.display());
            load_from(&path)
        }
        _ => {
            tracing::debug!("no config file found, using defaults");
            Ok(ResolverConfig::default())
        }
    }
}
