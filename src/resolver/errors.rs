// Error types for resolution strategies

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Input text does not contain a recognized share link
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Upstream answered forbidden for every signature candidate
    #[error("signing rejected: {endpoint} refused all {attempts} signature candidates")]
    SigningRejected { endpoint: String, attempts: usize },

    /// Network call or child process exceeded its time budget
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// Connection, TLS or protocol failure that is not a timeout
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status (body already truncated)
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Body could not be parsed
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Body parsed but no plausible download URL inside
    #[error("no URL found: {0}")]
    NoUrlFound(String),

    /// Browser or alternate runtime missing, disabled or crashed
    #[error("automation unavailable: {0}")]
    AutomationUnavailable(String),

    /// Header name or value cannot be put on the wire
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl ResolveError {
    /// Forbidden-class status: the signature candidate was rejected
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if *status == 401 || *status == 403)
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        let url = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "request".to_string());

        if e.is_timeout() {
            return Self::NetworkTimeout(url);
        }

        if e.is_decode() {
            return Self::MalformedResponse(e.to_string());
        }

        if let Some(status) = e.status() {
            return Self::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            };
        }

        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(format!("invalid JSON: {}", e))
    }
}
