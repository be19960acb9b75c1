//! Runtime configuration with environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GuardError, GuardResult};

pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:5000/predict";

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// `POST` endpoint of the sentiment classifier.
    pub classifier_url: String,
    /// Upper bound on one classifier round trip.
    pub classifier_timeout: Duration,
    /// Upper bound on the panel's page-data fetch.
    pub page_data_timeout: Duration,
    /// How long a login stays valid.
    pub session_ttl: Duration,
    /// JSON file backing the shared store. In-memory when `None`.
    pub store_path: Option<PathBuf>,
    /// JSON selector table. Built-in table when `None`.
    pub selectors_path: Option<PathBuf>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            classifier_timeout: Duration::from_secs(10),
            page_data_timeout: Duration::from_secs(5),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            store_path: None,
            selectors_path: None,
        }
    }
}

impl GuardConfig {
    /// Defaults overridden by `NEWSGUARD_*` environment variables.
    pub fn from_env() -> GuardResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GuardResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("NEWSGUARD_CLASSIFIER_URL") {
            url::Url::parse(&url)
                .map_err(|e| GuardError::Config(format!("NEWSGUARD_CLASSIFIER_URL: {}", e)))?;
            config.classifier_url = url;
        }
        if let Some(v) = lookup("NEWSGUARD_CLASSIFIER_TIMEOUT_SECS") {
            config.classifier_timeout =
                Duration::from_secs(parse_u64("NEWSGUARD_CLASSIFIER_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("NEWSGUARD_PAGE_DATA_TIMEOUT_SECS") {
            config.page_data_timeout =
                Duration::from_secs(parse_u64("NEWSGUARD_PAGE_DATA_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("NEWSGUARD_SESSION_TTL_HOURS") {
            let hours = parse_u64("NEWSGUARD_SESSION_TTL_HOURS", &v)?;
            let secs = hours.checked_mul(60 * 60).ok_or_else(|| {
                GuardError::Config(format!("NEWSGUARD_SESSION_TTL_HOURS too large: {}", hours))
            })?;
            config.session_ttl = Duration::from_secs(secs);
        }
        config.store_path = lookup("NEWSGUARD_STORE_PATH").map(PathBuf::from);
        config.selectors_path = lookup("NEWSGUARD_SELECTORS_PATH").map(PathBuf::from);

        Ok(config)
    }

    pub fn with_classifier_url(mut self, url: impl Into<String>) -> Self {
        self.classifier_url = url.into();
        self
    }

    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn with_page_data_timeout(mut self, timeout: Duration) -> Self {
        self.page_data_timeout = timeout;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn session_ttl_ms(&self) -> i64 {
        i64::try_from(self.session_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

fn parse_u64(key: &str, value: &str) -> GuardResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| GuardError::Config(format!("{} must be a whole number, got {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let config = GuardConfig::default();
        assert_eq!(config.classifier_url, DEFAULT_CLASSIFIER_URL);
        assert_eq!(config.classifier_timeout, Duration::from_secs(10));
        assert_eq!(config.page_data_timeout, Duration::from_secs(5));
        assert_eq!(config.session_ttl_ms(), 24 * 60 * 60 * 1000);
    }

    #[test]
    fn env_overrides_apply() {
        let config = GuardConfig::from_lookup(lookup(&[
            ("NEWSGUARD_CLASSIFIER_URL", "http://10.0.0.2:8080/predict"),
            ("NEWSGUARD_CLASSIFIER_TIMEOUT_SECS", "3"),
            ("NEWSGUARD_SESSION_TTL_HOURS", "1"),
            ("NEWSGUARD_STORE_PATH", "/tmp/guard.json"),
        ]))
        .unwrap();
        assert_eq!(config.classifier_url, "http://10.0.0.2:8080/predict");
        assert_eq!(config.classifier_timeout, Duration::from_secs(3));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/guard.json")));
    }

    #[test]
    fn oversized_session_ttl_is_rejected() {
        let err = GuardConfig::from_lookup(lookup(&[(
            "NEWSGUARD_SESSION_TTL_HOURS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = GuardConfig::from_lookup(lookup(&[("NEWSGUARD_PAGE_DATA_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }
}
