// Helper functions for strategy implementations

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::redirect::Policy;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::ResolveError;
use crate::config::ResolverConfig;

/// Longest body excerpt kept in a trail entry
pub const BODY_PREVIEW_CHARS: usize = 200;

const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".m3u8", ".webm", ".mkv", ".mov", ".mpd", ".m4v", ".avi"];

/// HTTP client honoring the configured timeout and proxy
pub fn build_client(config: &ResolverConfig, follow_redirects: bool) -> Result<reqwest::Client, ResolveError> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout())
        .user_agent(config.user_agent.clone());

    if !follow_redirects {
        builder = builder.redirect(Policy::none());
    }

    if let Some(proxy_url) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ResolveError::Network(format!("invalid proxy {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ResolveError::Network(format!("failed to build HTTP client: {}", e)))
}

/// Cut a body down for the debug trail (char-boundary safe)
pub fn truncate_body(body: &str) -> String {
    let compact = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= BODY_PREVIEW_CHARS {
        return compact;
    }
    let cut: String = compact.chars().take(BODY_PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
}

/// Media by content type; the URL extension only counts when the server sent
/// no type or a generic binary one
pub fn looks_like_media(url: &str, content_type: Option<&str>) -> bool {
    let ct = content_type
        .map(|ct| ct.trim().to_lowercase())
        .filter(|ct| !ct.is_empty());

    match ct {
        Some(ct) if is_media_type(&ct) => true,
        Some(ct) if is_generic_binary(&ct) => has_media_extension(url),
        Some(_) => false,
        None => has_media_extension(url),
    }
}

fn is_media_type(ct: &str) -> bool {
    ct.starts_with("video/") || ct.starts_with("audio/") || ct.contains("mpegurl") || ct.contains("dash+xml")
}

fn is_generic_binary(ct: &str) -> bool {
    ct.starts_with("application/octet-stream") || ct.starts_with("binary/octet-stream")
}

/// Media file extension in the URL path, ignoring query and fragment
pub fn has_media_extension(url: &str) -> bool {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    envs: &[(&str, String)],
    timeout_secs: u64,
) -> Result<std::process::Output, ResolveError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ResolveError::AutomationUnavailable(format!("failed to start {}: {}", program, e)))?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        ResolveError::AutomationUnavailable(format!("failed to capture stdout from {}", program))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        ResolveError::AutomationUnavailable(format!("failed to capture stderr from {}", program))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| {
                ResolveError::AutomationUnavailable(format!("failed to wait for {}: {}", program, e))
            })?;
            let stdout = collect_pipe(stdout_task, "stdout").await?;
            let stderr = collect_pipe(stderr_task, "stderr").await?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!(program, timeout_secs, "child process timed out");
            Err(ResolveError::NetworkTimeout(format!(
                "{} timed out after {}s",
                program, timeout_secs
            )))
        }
    }
}

async fn collect_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    which: &str,
) -> Result<Vec<u8>, ResolveError> {
    task.await
        .map_err(|e| ResolveError::AutomationUnavailable(format!("{} task failed: {}", which, e)))?
        .map_err(|e| ResolveError::AutomationUnavailable(format!("failed to read {}: {}", which, e)))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short\n body "), "short body");
        let long = "x".repeat(500);
        let cut = truncate_body(&long);
        assert_eq!(cut.chars().count(), BODY_PREVIEW_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_media_heuristics() {
        assert!(looks_like_media("https://cdn/x", Some("video/mp4")));
        assert!(looks_like_media("https://cdn/x", Some("application/vnd.apple.mpegurl")));
        assert!(looks_like_media("https://cdn/a/b.MP4?token=1", None));
        assert!(looks_like_media("https://cdn/v/clip.mkv", Some("application/octet-stream")));
        assert!(looks_like_media("https://cdn/v/clip.mp4", Some("")));
        assert!(!looks_like_media("https://cdn/live/index.m3u8#t=3", Some("text/plain")));
        assert!(!looks_like_media("https://cdn/videos/abc.mp4", Some("text/html; charset=utf-8")));
        assert!(!looks_like_media("https://cdn/page.html", Some("text/html")));
        assert!(!looks_like_media("https://cdn/mp4/page", None));
        assert!(!looks_like_media("https://cdn/blob", Some("application/octet-stream")));
        assert!(has_media_extension("https://cdn/live/index.m3u8#t=3"));
    }

    #[tokio::test]
    async fn test_missing_program_is_automation_unavailable() {
        let result = run_output_with_timeout("definitely-not-a-real-binary-7f3a", &[], &[], 5).await;
        assert!(matches!(result, Err(ResolveError::AutomationUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let result = run_output_with_timeout("sh", &args, &[], 1).await;
        assert!(matches!(result, Err(ResolveError::NetworkTimeout(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_and_env_captured() {
        let args = vec!["-c".to_string(), "echo \"$GREETING\"; echo oops >&2".to_string()];
        let envs = [("GREETING", "hello".to_string())];
        let output = run_output_with_timeout("sh", &args, &envs, 5).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }
}
