//! Page-attached extractor context.
//!
//! Owns the page's DOM and its overlay. Every navigation starts a new
//! generation; an analysis that comes back for an older generation or a
//! different URL is dropped without rendering.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::config::GuardConfig;
use crate::dom::{extract, ContentFilter, SiteSelectors};
use crate::engine::coordinator::CoordinatorHandle;
use crate::engine::protocol::{ActivePage, BlockDirective, BlockStatus, SurfaceRequest};
use crate::error::{GuardError, GuardResult};
use crate::model::{now_millis, AnalysisResult, ExtractedContent, PageIdentity};
use crate::render::{select_overlay, Overlay, OverlayAction, OverlayEffect, OverlayHost, OverlayState};
use crate::store::SharedStore;

/// What the coordinator needs from the page.
#[async_trait]
pub trait SurfaceLink: Send + Sync {
    /// `None` when no page is attached.
    async fn active_page(&self) -> Option<ActivePage>;
    async fn extract(&self) -> GuardResult<ExtractedContent>;
    async fn apply_block(&self, directive: BlockDirective) -> GuardResult<BlockStatus>;
}

/// Mailbox address of the extractor.
#[derive(Clone)]
pub struct SurfaceHandle {
    tx: mpsc::Sender<SurfaceRequest>,
}

impl SurfaceHandle {
    pub fn new(tx: mpsc::Sender<SurfaceRequest>) -> Self {
        Self { tx }
    }

    async fn call<T>(&self, request: SurfaceRequest, rx: oneshot::Receiver<T>) -> GuardResult<T> {
        self.tx
            .send(request)
            .await
            .map_err(|_| GuardError::ContextClosed("extractor"))?;
        rx.await.map_err(|_| GuardError::ContextClosed("extractor"))
    }
}

#[async_trait]
impl SurfaceLink for SurfaceHandle {
    async fn active_page(&self) -> Option<ActivePage> {
        let (reply, rx) = oneshot::channel();
        self.call(SurfaceRequest::ActivePage { reply }, rx)
            .await
            .ok()
            .flatten()
    }

    async fn extract(&self) -> GuardResult<ExtractedContent> {
        let (reply, rx) = oneshot::channel();
        self.call(SurfaceRequest::ExtractContent { reply }, rx).await?
    }

    async fn apply_block(&self, directive: BlockDirective) -> GuardResult<BlockStatus> {
        let (reply, rx) = oneshot::channel();
        self.call(SurfaceRequest::ApplyBlock { directive, reply }, rx)
            .await
    }
}

/// Lifecycle events of the page the extractor is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// Navigation started; the document is not parsed yet.
    Loading { url: PageIdentity },
    Loaded { url: PageIdentity, html: String },
    /// Same-document URL change with the new DOM.
    UrlChanged { url: PageIdentity, html: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Rendered(OverlayState),
    /// Result arrived for a page that is no longer showing.
    Discarded,
    Gated,
    ExtractionFailed(GuardError),
    Failed(GuardError),
}

/// One finished analysis pipeline, for observers of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub url: PageIdentity,
    pub generation: u64,
    pub outcome: PipelineOutcome,
}

struct Page {
    url: PageIdentity,
    /// `None` while loading.
    html: Option<String>,
}

struct Finished {
    url: PageIdentity,
    generation: u64,
    result: GuardResult<AnalysisResult>,
}

pub struct Extractor<H: OverlayHost> {
    selectors: Arc<SiteSelectors>,
    filter: ContentFilter,
    store: Arc<dyn SharedStore>,
    session_ttl_ms: i64,
    coordinator: CoordinatorHandle,
    overlay: Overlay<H>,
    page: Option<Page>,
    generation: u64,
    reports: Option<mpsc::UnboundedSender<PipelineReport>>,
}

impl<H: OverlayHost> Extractor<H> {
    pub fn new(
        config: &GuardConfig,
        selectors: Arc<SiteSelectors>,
        store: Arc<dyn SharedStore>,
        coordinator: CoordinatorHandle,
        host: H,
    ) -> Self {
        Self {
            selectors,
            filter: ContentFilter::new(),
            store,
            session_ttl_ms: config.session_ttl_ms(),
            coordinator,
            overlay: Overlay::new(host),
            page: None,
            generation: 0,
            reports: None,
        }
    }

    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<PipelineReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Run until the navigation channel closes (page detached).
    pub async fn run(
        mut self,
        mut navigation: mpsc::Receiver<NavigationEvent>,
        mut requests: mpsc::Receiver<SurfaceRequest>,
        mut actions: mpsc::Receiver<OverlayAction>,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Finished>();
        loop {
            // Page events first, so requests always see the latest page.
            tokio::select! {
                biased;
                event = navigation.recv() => match event {
                    Some(event) => self.on_navigation(event, &done_tx),
                    None => break,
                },
                Some(action) = actions.recv() => self.on_action(action),
                Some(request) = requests.recv() => self.on_request(request),
                Some(done) = done_rx.recv() => self.on_finished(done),
            }
        }
        self.overlay.clear();
        log::debug!("Extractor detached");
    }

    fn on_navigation(&mut self, event: NavigationEvent, done_tx: &mpsc::UnboundedSender<Finished>) {
        let (url, html) = match event {
            NavigationEvent::Loading { url } => (url, None),
            NavigationEvent::Loaded { url, html } => (url, Some(html)),
            NavigationEvent::UrlChanged { url, html } => {
                let unchanged = self
                    .page
                    .as_ref()
                    .map(|p| p.url == url && p.html.is_some())
                    .unwrap_or(false);
                if unchanged {
                    return;
                }
                (url, Some(html))
            }
        };

        self.generation += 1;
        self.overlay.clear();
        log::debug!("Navigation to {} (generation {})", url, self.generation);
        let start = html.is_some();
        self.page = Some(Page { url, html });
        if start {
            self.start_pipeline(done_tx);
        }
    }

    fn start_pipeline(&mut self, done_tx: &mpsc::UnboundedSender<Finished>) {
        let Some(page) = &self.page else { return };
        let url = page.url.clone();
        let generation = self.generation;

        if !self.session_present() {
            self.overlay.show(OverlayState::Gate, url.clone(), 0);
            self.report(url, generation, PipelineOutcome::Gated);
            return;
        }

        let content = match self.extract_current() {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Extraction failed on {}: {}", url, e);
                self.report(url, generation, PipelineOutcome::ExtractionFailed(e));
                return;
            }
        };

        let coordinator = self.coordinator.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = coordinator.analyze_content(content).await;
            let _ = done_tx.send(Finished {
                url,
                generation,
                result,
            });
        });
    }

    fn on_finished(&mut self, done: Finished) {
        let current = done.generation == self.generation
            && self.page.as_ref().map(|p| &p.url) == Some(&done.url);
        if !current {
            log::debug!(
                "Dropping analysis for {} (generation {}, now {})",
                done.url,
                done.generation,
                self.generation
            );
            self.report(done.url, done.generation, PipelineOutcome::Discarded);
            return;
        }

        let outcome = match done.result {
            Ok(analysis) => {
                let severity = analysis.effective_severity();
                let state =
                    select_overlay(self.session_present(), self.blocking_enabled(), severity);
                PipelineOutcome::Rendered(self.overlay.show(state, done.url.clone(), severity))
            }
            Err(GuardError::AuthRequired) => {
                self.overlay.show(OverlayState::Gate, done.url.clone(), 0);
                PipelineOutcome::Gated
            }
            Err(e) => {
                log::warn!("Analysis failed for {}: {}", done.url, e);
                PipelineOutcome::Failed(e)
            }
        };
        self.report(done.url, done.generation, outcome);
    }

    fn on_request(&mut self, request: SurfaceRequest) {
        log::debug!("Extractor received {}", request.action());
        match request {
            SurfaceRequest::ActivePage { reply } => {
                let page = self.page.as_ref().map(|p| ActivePage {
                    url: p.url.clone(),
                    ready: p.html.is_some(),
                });
                let _ = reply.send(page);
            }
            SurfaceRequest::ExtractContent { reply } => {
                let _ = reply.send(self.extract_current());
            }
            SurfaceRequest::ApplyBlock { directive, reply } => {
                let _ = reply.send(self.apply_block(directive));
            }
        }
    }

    /// Render a pushed decision, re-reading session and preference.
    fn apply_block(&mut self, directive: BlockDirective) -> BlockStatus {
        let showing = self.page.as_ref().map(|p| &p.url) == Some(&directive.url);
        if !showing {
            return BlockStatus::Stale;
        }

        let state = select_overlay(
            self.session_present(),
            self.blocking_enabled(),
            directive.severity,
        );
        match self.overlay.show(state, directive.url, directive.severity) {
            OverlayState::Hidden => BlockStatus::NotNeeded,
            state => BlockStatus::Shown(state),
        }
    }

    fn on_action(&mut self, action: OverlayAction) {
        match self.overlay.act(action) {
            OverlayEffect::Ignored => log::debug!("Overlay ignored {:?}", action),
            OverlayEffect::Removed | OverlayEffect::NavigatedBack => {}
            OverlayEffect::PanelRequested => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    match coordinator.open_popup().await {
                        Ok(status) => log::debug!("Panel launch: {:?}", status),
                        Err(e) => log::warn!("Could not open panel: {}", e),
                    }
                });
            }
        }
    }

    fn extract_current(&self) -> GuardResult<ExtractedContent> {
        let page = self.page.as_ref().ok_or(GuardError::NoActiveSurface)?;
        let html = page.html.as_deref().ok_or(GuardError::SurfaceNotReady)?;
        extract(html, &page.url, &self.selectors, &self.filter).map_err(GuardError::from)
    }

    fn blocking_enabled(&self) -> bool {
        self.store.blocking_preference().unwrap_or_else(|e| {
            log::warn!("Could not read blocking preference: {}", e);
            true
        })
    }

    fn session_present(&self) -> bool {
        match self.store.session() {
            Ok(session) => session
                .map(|s| s.is_active_at(now_millis(), self.session_ttl_ms))
                .unwrap_or(false),
            Err(e) => {
                log::warn!("Could not read session: {}", e);
                false
            }
        }
    }

    fn report(&self, url: PageIdentity, generation: u64, outcome: PipelineOutcome) {
        if let Some(tx) = &self.reports {
            let _ = tx.send(PipelineReport {
                url,
                generation,
                outcome,
            });
        }
    }
}
