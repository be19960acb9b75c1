//! Messages exchanged between the three contexts.
//!
//! Contexts share no memory. Each request carries a oneshot sender for its
//! reply; a dropped sender means the peer context went away.

use tokio::sync::oneshot;

use crate::error::GuardResult;
use crate::model::{AnalysisResult, CacheEntry, ExtractedContent, PageIdentity};
use crate::render::OverlayState;

/// What the page context reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePage {
    pub url: PageIdentity,
    /// Document finished loading.
    pub ready: bool,
}

/// Ask the page to render the blocking decision for `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDirective {
    pub url: PageIdentity,
    pub severity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// No analysis cached, or blocking is switched off.
    NotApplied,
    /// The directive was for a page that is no longer showing.
    Stale,
    /// Evaluated; nothing needed showing.
    NotNeeded,
    Shown(OverlayState),
}

/// `getNewsData` answer: the cached pair when fresh, otherwise freshly
/// extracted content ready for `analyzeContent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsData {
    Cached(CacheEntry),
    Extracted(ExtractedContent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupStatus {
    Opening,
    /// Nothing is listening for panel launches.
    Unavailable,
}

/// Panel launch request relayed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLaunch;

/// Requests served by the coordinator.
#[derive(Debug)]
pub enum CoordinatorRequest {
    GetNewsData {
        reply: oneshot::Sender<GuardResult<NewsData>>,
    },
    AnalyzeContent {
        content: ExtractedContent,
        reply: oneshot::Sender<GuardResult<AnalysisResult>>,
    },
    /// `reanalyzePage` / `triggerAnalysis`.
    Reanalyze {
        reply: oneshot::Sender<GuardResult<AnalysisResult>>,
    },
    ApplyBlock {
        reply: oneshot::Sender<GuardResult<BlockStatus>>,
    },
    OpenPopup {
        reply: oneshot::Sender<PopupStatus>,
    },
}

impl CoordinatorRequest {
    pub fn action(&self) -> &'static str {
        match self {
            CoordinatorRequest::GetNewsData { .. } => "getNewsData",
            CoordinatorRequest::AnalyzeContent { .. } => "analyzeContent",
            CoordinatorRequest::Reanalyze { .. } => "reanalyzePage",
            CoordinatorRequest::ApplyBlock { .. } => "applyBlock",
            CoordinatorRequest::OpenPopup { .. } => "openPopup",
        }
    }
}

/// Requests served by the page-attached extractor.
#[derive(Debug)]
pub enum SurfaceRequest {
    ActivePage {
        reply: oneshot::Sender<Option<ActivePage>>,
    },
    ExtractContent {
        reply: oneshot::Sender<GuardResult<ExtractedContent>>,
    },
    ApplyBlock {
        directive: BlockDirective,
        reply: oneshot::Sender<BlockStatus>,
    },
}

impl SurfaceRequest {
    pub fn action(&self) -> &'static str {
        match self {
            SurfaceRequest::ActivePage { .. } => "activePage",
            SurfaceRequest::ExtractContent { .. } => "extractContent",
            SurfaceRequest::ApplyBlock { .. } => "applyBlock",
        }
    }
}
