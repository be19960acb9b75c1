//! Data shared between the extractor, coordinator and panel.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GuardError;

/// Canonical URL of a page. Cache key for analysis results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageIdentity(String);

impl PageIdentity {
    /// Canonicalise through `url::Url` when the string parses, so that
    /// `https://Example.com` and `https://example.com/` share one identity.
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) => Self(url.to_string()),
            Err(_) => Self(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part of the URL, if it has one.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}

impl fmt::Display for PageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageIdentity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Article text pulled off a page. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    #[serde(rename = "content")]
    pub body: String,
    pub url: PageIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnsupportedDomain,
    ContentNotFound,
}

/// Explicit extraction-failure marker: the reason plus the attempted url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub reason: FailureReason,
    pub url: PageIdentity,
    /// Title resolved before content extraction failed, if any.
    pub title: Option<String>,
}

impl From<ExtractionFailure> for GuardError {
    fn from(failure: ExtractionFailure) -> Self {
        match failure.reason {
            FailureReason::UnsupportedDomain => {
                GuardError::UnsupportedDomain(failure.url.to_string())
            }
            FailureReason::ContentNotFound => GuardError::ExtractionEmpty {
                url: failure.url.to_string(),
                title: failure.title.unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Positive,
    Negative,
}

/// Classifier verdict wrapped with the caller's blocking preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    /// 0–10, only meaningful for `Verdict::Negative`.
    pub severity: u8,
    pub title: String,
    pub url: PageIdentity,
    pub blocking_enabled: bool,
}

impl AnalysisResult {
    /// Severity that blocking decisions act on. Positive pages never block.
    pub fn effective_severity(&self) -> u8 {
        match self.verdict {
            Verdict::Positive => 0,
            Verdict::Negative => self.severity,
        }
    }

    pub fn label(&self) -> String {
        match self.verdict {
            Verdict::Positive => "Positive".to_string(),
            Verdict::Negative => format!("Negative ({}/10)", self.severity),
        }
    }
}

/// Most recent content/analysis pair for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: ExtractedContent,
    pub analysis: AnalysisResult,
}

impl CacheEntry {
    /// Staleness predicate: an entry may only be served for the page it was
    /// built from.
    pub fn is_fresh_for(&self, identity: &PageIdentity) -> bool {
        self.content.url == *identity && self.analysis.url == *identity
    }
}

/// Logged-in user as persisted by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub is_admin: bool,
    /// Unix epoch milliseconds.
    pub login_time: i64,
}

impl Session {
    pub fn new(user_id: impl Into<String>, is_admin: bool, login_time: i64) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin,
            login_time,
        }
    }

    pub fn is_active_at(&self, now_ms: i64, ttl_ms: i64) -> bool {
        !self.user_id.is_empty() && now_ms - self.login_time < ttl_ms
    }

    /// First and last name encoded in the user id (`isim_soyisim_...`).
    pub fn display_name(&self) -> String {
        let mut parts = self.user_id.split('_');
        match (parts.next(), parts.next()) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            _ => self.user_id.clone(),
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
