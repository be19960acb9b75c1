//! Per-site selector table.
//!
//! Which selectors suit which site is maintained outside this crate; the
//! built-in table covers the news sites the guard shipped with.

use std::path::Path;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};

/// Selectors for one news domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub domain: String,
    /// Headline alternatives, tried in order; the first one matching wins.
    pub title: Vec<String>,
    /// Body selectors, matched together in document order.
    pub content: Vec<String>,
}

impl SiteConfig {
    fn new(domain: &str, title: &[&str], content: &[&str]) -> Self {
        Self {
            domain: domain.to_string(),
            title: title.iter().map(|s| s.to_string()).collect(),
            content: content.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `host` is this domain or one of its subdomains.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        let domain = self.domain.to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }

    /// Single selector group covering every body selector.
    pub fn content_selector(&self) -> GuardResult<Selector> {
        let joined = self.content.join(", ");
        Selector::parse(&joined)
            .map_err(|e| GuardError::Config(format!("{} content selector: {}", self.domain, e)))
    }

    fn validate(&self) -> GuardResult<()> {
        for sel in &self.title {
            Selector::parse(sel)
                .map_err(|e| GuardError::Config(format!("{} title {:?}: {}", self.domain, sel, e)))?;
        }
        if self.content.is_empty() {
            return Err(GuardError::Config(format!("{} has no content selectors", self.domain)));
        }
        self.content_selector().map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSelectors {
    pub sites: Vec<SiteConfig>,
}

impl SiteSelectors {
    pub fn builtin() -> Self {
        Self {
            sites: vec![
                SiteConfig::new(
                    "hurriyet.com.tr",
                    &[
                        "h1.rhd-article-title",
                        "h1.news-detail-title",
                        "h1[itemprop='headline']",
                        "h1.title",
                        ".article-header h1",
                        ".haber-baslik",
                        "h1",
                    ],
                    &[
                        ".rhd-article-content p",
                        ".news-content p",
                        ".article-content p",
                        "article p",
                        ".story-content p",
                        ".haber-icerik p",
                        ".news-detail p",
                    ],
                ),
                SiteConfig::new(
                    "milliyet.com.tr",
                    &[
                        "h1.news-detail-title",
                        "h1.news-detail-title.title-actived",
                        "h1[itemprop='headline']",
                    ],
                    &[
                        "article p",
                        ".news-content p",
                        ".news-content__inf p",
                        ".news-content__body p",
                        ".article-body p",
                        ".news-detail p",
                        ".news-content h2",
                        ".news-content__inf h2",
                    ],
                ),
                SiteConfig::new(
                    "sabah.com.tr",
                    &["h1.article-title", "h1[itemprop='headline']", "h1.pageTitle"],
                    &[
                        "div[itemprop='articleBody'] p",
                        "div.article-content p",
                        ".newsDetailText p",
                    ],
                ),
                SiteConfig::new(
                    "sozcu.com.tr",
                    &[
                        "h1.news-title",
                        "h1.content-title",
                        "h1[itemprop='headline']",
                        "h1",
                        ".article-title h1",
                    ],
                    &[
                        ".news-content p",
                        ".article-body p",
                        "article p",
                        ".content-detail p",
                    ],
                ),
            ],
        }
    }

    /// Parse and validate a JSON table (`{"sites": [...]}`).
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let table: Self = serde_json::from_str(json)
            .map_err(|e| GuardError::Config(format!("selector table: {}", e)))?;
        for site in &table.sites {
            site.validate()?;
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> GuardResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn for_host(&self, host: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.matches_host(host))
    }

    pub fn supports(&self, host: &str) -> bool {
        self.for_host(host).is_some()
    }
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self::builtin()
    }
}
