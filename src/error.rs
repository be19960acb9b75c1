//! Error taxonomy shared by every context.
//!
//! Errors are `Clone` because one in-flight classification is fanned out to
//! every caller waiting on the same page.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// No page context is attached (no active tab).
    #[error("no active page")]
    NoActiveSurface,

    /// The page has not finished loading yet.
    #[error("page is still loading, try again shortly")]
    SurfaceNotReady,

    /// No selector configuration exists for the page's domain.
    #[error("unsupported site: {0}")]
    UnsupportedDomain(String),

    /// Selectors matched nothing usable. Carries the partially resolved title.
    #[error("no article content found at {url}")]
    ExtractionEmpty { url: String, title: String },

    /// No session, or the session is older than its TTL.
    #[error("login required")]
    AuthRequired,

    /// Timeout, network failure or non-success status from the classifier.
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// The classifier answered with its own error, or an incomplete payload.
    #[error("{0}")]
    ClassifierRejected(String),

    /// The panel gave up waiting for page data.
    #[error("page data timed out")]
    PageDataTimeout,

    /// A peer context dropped its mailbox.
    #[error("{0} context is gone")]
    ContextClosed(&'static str),

    /// Page download failed (CLI only).
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),
}

impl GuardError {
    /// Whether the caller may retry the same action later. Nothing retries
    /// automatically; this only drives what the user is offered.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GuardError::SurfaceNotReady
                | GuardError::ClassifierUnavailable(_)
                | GuardError::PageDataTimeout
        )
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
