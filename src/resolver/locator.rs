// Recursive URL locator
//
// Response shapes from the file host drift between releases, so instead of typed
// structs we walk the JSON tree looking for a plausible download URL. The walk is
// depth-bounded and first-match-wins.

use serde_json::Value;

use super::models::StrategyOutcome;

/// Default depth bound for every search in this module
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Keys associated with download/link/source semantics, in priority order
pub const URL_KEYS: &[&str] = &[
    "url",
    "signedUrl",
    "signed_url",
    "downloadUrl",
    "download_url",
    "dlink",
    "videoUrl",
    "video_url",
    "link",
    "fileUrl",
    "file_url",
    "streamUrl",
    "stream_url",
    "src",
    "path",
    "location",
];

/// Keys that usually carry a file name or title
pub const TITLE_KEYS: &[&str] = &[
    "title",
    "name",
    "fileName",
    "file_name",
    "filename",
    "server_filename",
];

/// Keys that usually carry a byte size
pub const SIZE_KEYS: &[&str] = &["size", "file_size", "fileSize", "filesize"];

pub fn is_url(s: &str) -> bool {
    let lower = s.trim_start().get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Most plausible direct-resource URL in `value`
pub fn locate_url(value: &Value) -> Option<String> {
    locate_url_with_depth(value, DEFAULT_MAX_DEPTH)
}

pub fn locate_url_with_depth(value: &Value, max_depth: usize) -> Option<String> {
    visit_url(value, 0, max_depth, true)
}

// Bare strings only count when `relevant`: the root itself, or anything
// reached through an allowlisted key.
fn visit_url(value: &Value, depth: usize, max_depth: usize, relevant: bool) -> Option<String> {
    if depth > max_depth {
        return None;
    }

    match value {
        Value::String(s) if relevant && is_url(s) => Some(s.trim().to_string()),
        Value::Object(map) => {
            for key in URL_KEYS {
                if let Some(Value::String(s)) = map.get(*key) {
                    if is_url(s) {
                        return Some(s.trim().to_string());
                    }
                }
            }
            map.iter().find_map(|(key, child)| {
                visit_url(child, depth + 1, max_depth, URL_KEYS.contains(&key.as_str()))
            })
        }
        Value::Array(items) => items
            .iter()
            .find_map(|child| visit_url(child, depth + 1, max_depth, relevant)),
        _ => None,
    }
}

/// First non-empty title/name field
pub fn locate_title(value: &Value) -> Option<String> {
    find_keyed(value, TITLE_KEYS, 0, &|v| match v {
        Value::String(s) if !s.trim().is_empty() && !is_url(s) => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Human size label from the first size field
pub fn locate_size_label(value: &Value) -> Option<String> {
    find_keyed(value, SIZE_KEYS, 0, &|v| match v {
        Value::Number(n) => n.as_u64().filter(|b| *b > 0).map(size_label_from_bytes),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else if let Ok(bytes) = s.parse::<u64>() {
                Some(size_label_from_bytes(bytes))
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    })
}

/// URL plus the metadata found next to it
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedFile {
    pub url: String,
    pub title: Option<String>,
    pub size_label: Option<String>,
}

impl LocatedFile {
    pub fn into_outcome(self, debug_trail: Vec<String>) -> StrategyOutcome {
        StrategyOutcome::resolved(self.url, debug_trail)
            .with_title(self.title)
            .with_size_label(self.size_label)
    }
}

/// URL, title and size from one response body
pub fn locate_file(value: &Value) -> Option<LocatedFile> {
    locate_url(value).map(|url| LocatedFile {
        url,
        title: locate_title(value),
        size_label: locate_size_label(value),
    })
}

/// `"12.34 MB"`
pub fn size_label_from_bytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn find_keyed(
    value: &Value,
    keys: &[&str],
    depth: usize,
    pick: &dyn Fn(&Value) -> Option<String>,
) -> Option<String> {
    if depth > DEFAULT_MAX_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => keys
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(pick)
            .or_else(|| map.values().find_map(|child| find_keyed(child, keys, depth + 1, pick))),
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_keyed(child, keys, depth + 1, pick)),
        _ => None,
    }
}
