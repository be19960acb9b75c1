//! Coordinator context: owns the analysis cache, deduplicates classifier
//! calls per page and relays between the page and the panel.
//!
//! At most one classifier call runs per `(page, cache generation)`. Later
//! callers for the same key wait on the in-flight result. The generation is
//! bumped whenever the cache is cleared or the requested page changes; a
//! result produced under an older generation is still returned to its callers
//! but never written back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::GuardConfig;
use crate::dom::SiteSelectors;
use crate::engine::protocol::{
    ActivePage, BlockDirective, BlockStatus, CoordinatorRequest, NewsData, PanelLaunch,
    PopupStatus,
};
use crate::engine::surface::SurfaceLink;
use crate::error::{GuardError, GuardResult};
use crate::model::{now_millis, AnalysisResult, CacheEntry, ExtractedContent, PageIdentity, Session};
use crate::net::classifier::{Classifier, PredictRequest};
use crate::store::SharedStore;

type Flight = watch::Receiver<Option<GuardResult<CacheEntry>>>;

/// Where a flight gets its content from.
enum Source {
    /// Ask the page to extract.
    Extract,
    /// Content pushed by the caller.
    Supplied(ExtractedContent),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Serve a fresh cache entry when there is one.
    Cached,
    /// Always classify (after an explicit invalidation).
    Bypass,
}

#[derive(Default)]
struct Flights {
    generation: u64,
    /// Page the most recent request was about.
    current: Option<PageIdentity>,
    pending: HashMap<(PageIdentity, u64), Flight>,
}

pub struct Coordinator {
    store: Arc<dyn SharedStore>,
    classifier: Arc<dyn Classifier>,
    surface: Arc<dyn SurfaceLink>,
    selectors: Arc<SiteSelectors>,
    classifier_timeout: Duration,
    session_ttl_ms: i64,
    flights: Mutex<Flights>,
    panel_tx: Option<mpsc::UnboundedSender<PanelLaunch>>,
}

impl Coordinator {
    pub fn new(
        config: &GuardConfig,
        store: Arc<dyn SharedStore>,
        classifier: Arc<dyn Classifier>,
        surface: Arc<dyn SurfaceLink>,
        selectors: Arc<SiteSelectors>,
    ) -> Self {
        Self {
            store,
            classifier,
            surface,
            selectors,
            classifier_timeout: config.classifier_timeout,
            session_ttl_ms: config.session_ttl_ms(),
            flights: Mutex::new(Flights::default()),
            panel_tx: None,
        }
    }

    /// Relay `openPopup` requests to `tx`.
    pub fn with_panel_launcher(mut self, tx: mpsc::UnboundedSender<PanelLaunch>) -> Self {
        self.panel_tx = Some(tx);
        self
    }

    /// Cached analysis for `identity`, classifying on a miss.
    pub async fn get_analysis(self: &Arc<Self>, identity: &PageIdentity) -> GuardResult<CacheEntry> {
        self.require_session()?;
        self.resolve_page(Some(identity)).await?;
        self.join_or_start(identity, Source::Extract, Lookup::Cached).await
    }

    /// Classify content pushed by the page.
    pub async fn request_analysis(
        self: &Arc<Self>,
        content: ExtractedContent,
    ) -> GuardResult<AnalysisResult> {
        self.require_session()?;
        let identity = content.url.clone();
        let entry = self
            .join_or_start(&identity, Source::Supplied(content), Lookup::Cached)
            .await?;
        Ok(entry.analysis)
    }

    /// Drop the cache for `identity`, classify again and push the result to
    /// the page.
    pub async fn invalidate_and_reanalyze(
        self: &Arc<Self>,
        identity: &PageIdentity,
    ) -> GuardResult<AnalysisResult> {
        self.require_session()?;
        self.invalidate(identity)?;
        self.resolve_page(Some(identity)).await?;

        let entry = self
            .join_or_start(identity, Source::Extract, Lookup::Bypass)
            .await?;

        let directive = BlockDirective {
            url: identity.clone(),
            severity: entry.analysis.effective_severity(),
        };
        match self.surface.apply_block(directive).await {
            Ok(status) => log::debug!("Re-analysis of {} rendered: {:?}", identity, status),
            Err(e) => log::warn!("Could not push re-analysis to page: {}", e),
        }

        Ok(entry.analysis)
    }

    /// `reanalyzePage` / `triggerAnalysis` for whatever page is active.
    pub async fn reanalyze_active(self: &Arc<Self>) -> GuardResult<AnalysisResult> {
        self.require_session()?;
        let page = self
            .surface
            .active_page()
            .await
            .ok_or(GuardError::NoActiveSurface)?;
        self.invalidate_and_reanalyze(&page.url).await
    }

    /// `getNewsData`: the cached pair when fresh, else extracted content.
    pub async fn get_news_data(self: &Arc<Self>) -> GuardResult<NewsData> {
        self.require_session()?;
        let page = self.resolve_page(None).await?;

        {
            let mut flights = self.lock_flights()?;
            self.enter(&mut flights, &page.url)?;
            if let Some(entry) = self.store.fresh_entry(&page.url)? {
                log::debug!("Cache HIT: {}", page.url);
                return Ok(NewsData::Cached(self.with_current_preference(entry)?));
            }
        }

        let content = self.surface.extract().await?;
        if content.url != page.url {
            return Err(GuardError::SurfaceNotReady);
        }
        Ok(NewsData::Extracted(content))
    }

    /// Forward the cached decision to the page when blocking is on.
    pub async fn apply_block_decision(&self) -> GuardResult<BlockStatus> {
        let snapshot = self.store.snapshot()?;
        let entry = match snapshot.cache_entry() {
            Some(entry) if snapshot.blocking_preference() => entry,
            _ => {
                log::debug!("Block not applied: no analysis or blocking off");
                return Ok(BlockStatus::NotApplied);
            }
        };

        let page = self
            .surface
            .active_page()
            .await
            .ok_or(GuardError::NoActiveSurface)?;
        if !entry.is_fresh_for(&page.url) {
            return Ok(BlockStatus::Stale);
        }

        self.surface
            .apply_block(BlockDirective {
                url: page.url,
                severity: entry.analysis.effective_severity(),
            })
            .await
    }

    pub fn open_popup(&self) -> PopupStatus {
        match &self.panel_tx {
            Some(tx) if tx.send(PanelLaunch).is_ok() => PopupStatus::Opening,
            _ => PopupStatus::Unavailable,
        }
    }

    /// Serve requests until every handle is dropped. Each request runs in its
    /// own task so a slow classification never stalls the mailbox.
    pub async fn serve(self: Arc<Self>, mut requests: mpsc::Receiver<CoordinatorRequest>) {
        while let Some(request) = requests.recv().await {
            log::debug!("Coordinator received {}", request.action());
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.handle(request).await });
        }
        log::debug!("Coordinator mailbox closed");
    }

    async fn handle(self: Arc<Self>, request: CoordinatorRequest) {
        match request {
            CoordinatorRequest::GetNewsData { reply } => {
                let _ = reply.send(self.get_news_data().await);
            }
            CoordinatorRequest::AnalyzeContent { content, reply } => {
                let _ = reply.send(self.request_analysis(content).await);
            }
            CoordinatorRequest::Reanalyze { reply } => {
                let _ = reply.send(self.reanalyze_active().await);
            }
            CoordinatorRequest::ApplyBlock { reply } => {
                let _ = reply.send(self.apply_block_decision().await);
            }
            CoordinatorRequest::OpenPopup { reply } => {
                let _ = reply.send(self.open_popup());
            }
        }
    }

    fn require_session(&self) -> GuardResult<Session> {
        let now = now_millis();
        self.store
            .session()?
            .filter(|s| s.is_active_at(now, self.session_ttl_ms))
            .ok_or(GuardError::AuthRequired)
    }

    /// Active page, checked for identity, site support and readiness.
    async fn resolve_page(&self, expected: Option<&PageIdentity>) -> GuardResult<ActivePage> {
        let page = self
            .surface
            .active_page()
            .await
            .ok_or(GuardError::NoActiveSurface)?;

        if let Some(expected) = expected {
            if page.url != *expected {
                return Err(GuardError::NoActiveSurface);
            }
        }

        let supported = page
            .url
            .host()
            .map(|host| self.selectors.supports(&host))
            .unwrap_or(false);
        if !supported {
            return Err(GuardError::UnsupportedDomain(page.url.to_string()));
        }
        if !page.ready {
            return Err(GuardError::SurfaceNotReady);
        }
        Ok(page)
    }

    /// The cached verdict is reusable; the blocking posture is not.
    fn with_current_preference(&self, mut entry: CacheEntry) -> GuardResult<CacheEntry> {
        entry.analysis.blocking_enabled = self.store.blocking_preference()?;
        Ok(entry)
    }

    fn lock_flights(&self) -> GuardResult<MutexGuard<'_, Flights>> {
        self.flights
            .lock()
            .map_err(|_| GuardError::Store("flight table poisoned".into()))
    }

    /// Note a request for `identity`: a stored entry for another page is
    /// cleared and the generation moves on.
    fn enter(&self, flights: &mut Flights, identity: &PageIdentity) -> GuardResult<()> {
        let stale = self
            .store
            .cache_entry()?
            .map(|entry| !entry.is_fresh_for(identity))
            .unwrap_or(false);
        if stale {
            log::info!("Page changed to {}, dropping cached analysis", identity);
            self.store.clear_cache()?;
        }
        if stale || flights.current.as_ref() != Some(identity) {
            flights.generation += 1;
            flights.current = Some(identity.clone());
        }
        Ok(())
    }

    fn invalidate(&self, identity: &PageIdentity) -> GuardResult<()> {
        let mut flights = self.lock_flights()?;
        self.store.clear_cache()?;
        flights.generation += 1;
        flights.current = Some(identity.clone());
        log::info!(
            "Cache cleared for {} (generation {})",
            identity,
            flights.generation
        );
        Ok(())
    }

    async fn join_or_start(
        self: &Arc<Self>,
        identity: &PageIdentity,
        source: Source,
        lookup: Lookup,
    ) -> GuardResult<CacheEntry> {
        let mut flight = {
            let mut flights = self.lock_flights()?;
            self.enter(&mut flights, identity)?;
            let key = (identity.clone(), flights.generation);

            // A flight whose sender is gone died without publishing.
            let live = flights
                .pending
                .get(&key)
                .filter(|flight| flight.has_changed().is_ok())
                .cloned();

            if let Some(flight) = live {
                log::debug!("Joining in-flight analysis for {}", identity);
                flight
            } else {
                if flights.pending.remove(&key).is_some() {
                    log::warn!("Dropping dead analysis flight for {}", identity);
                }
                if lookup == Lookup::Cached {
                    if let Some(entry) = self.store.fresh_entry(identity)? {
                        log::debug!("Cache HIT: {}", identity);
                        return self.with_current_preference(entry);
                    }
                }
                log::debug!("Cache MISS: {}", identity);

                let (tx, rx) = watch::channel(None);
                flights.pending.insert(key.clone(), rx.clone());

                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let result = this.produce(&key.0, key.1, source).await;
                    this.finish(&key, &result);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        let outcome = flight
            .wait_for(|result| result.is_some())
            .await
            .map_err(|_| GuardError::ContextClosed("coordinator"))?;
        match &*outcome {
            Some(result) => result.clone(),
            None => Err(GuardError::ContextClosed("coordinator")),
        }
    }

    async fn produce(
        &self,
        identity: &PageIdentity,
        generation: u64,
        source: Source,
    ) -> GuardResult<CacheEntry> {
        let content = match source {
            Source::Supplied(content) => content,
            Source::Extract => {
                let content = self.surface.extract().await?;
                if content.url != *identity {
                    return Err(GuardError::SurfaceNotReady);
                }
                content
            }
        };

        let session = self.require_session()?;
        let blocking_enabled = self.store.blocking_preference()?;
        let request = PredictRequest {
            text: content.body.clone(),
            user_id: session.user_id,
            title: content.title.clone(),
        };

        log::info!("Classifying {} (generation {})", identity, generation);
        let verdict = match tokio::time::timeout(
            self.classifier_timeout,
            self.classifier.classify(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GuardError::ClassifierUnavailable(format!(
                "no answer within {}s",
                self.classifier_timeout.as_secs()
            ))),
        }
        .map_err(|e| {
            log::warn!("Classification failed for {}: {}", identity, e);
            e
        })?;

        let analysis = AnalysisResult {
            verdict: verdict.verdict,
            severity: verdict.severity,
            title: verdict.title.unwrap_or_else(|| content.title.clone()),
            url: identity.clone(),
            blocking_enabled,
        };
        log::info!("Analysis for {}: {}", identity, analysis.label());

        Ok(CacheEntry { content, analysis })
    }

    /// Persist a successful result if its generation is still current, then
    /// retire the flight.
    fn finish(&self, key: &(PageIdentity, u64), result: &GuardResult<CacheEntry>) {
        let Ok(mut flights) = self.lock_flights() else {
            log::error!("Flight table poisoned; dropping result for {}", key.0);
            return;
        };

        if let Ok(entry) = result {
            let current =
                flights.generation == key.1 && flights.current.as_ref() == Some(&key.0);
            if current {
                if let Err(e) = self.store.put_cache_entry(entry.clone()) {
                    log::warn!("Could not cache analysis for {}: {}", key.0, e);
                }
            } else {
                log::debug!(
                    "Not caching {}: generation {} superseded by {}",
                    key.0,
                    key.1,
                    flights.generation
                );
            }
        }
        flights.pending.remove(key);
    }
}

/// Mailbox address of the coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorRequest>,
}

impl CoordinatorHandle {
    pub fn new(tx: mpsc::Sender<CoordinatorRequest>) -> Self {
        Self { tx }
    }

    pub async fn get_news_data(&self) -> GuardResult<NewsData> {
        let (reply, rx) = oneshot::channel();
        self.call(CoordinatorRequest::GetNewsData { reply }, rx).await?
    }

    pub async fn analyze_content(&self, content: ExtractedContent) -> GuardResult<AnalysisResult> {
        let (reply, rx) = oneshot::channel();
        self.call(CoordinatorRequest::AnalyzeContent { content, reply }, rx)
            .await?
    }

    pub async fn reanalyze(&self) -> GuardResult<AnalysisResult> {
        let (reply, rx) = oneshot::channel();
        self.call(CoordinatorRequest::Reanalyze { reply }, rx).await?
    }

    pub async fn apply_block(&self) -> GuardResult<BlockStatus> {
        let (reply, rx) = oneshot::channel();
        self.call(CoordinatorRequest::ApplyBlock { reply }, rx).await?
    }

    pub async fn open_popup(&self) -> GuardResult<PopupStatus> {
        let (reply, rx) = oneshot::channel();
        self.call(CoordinatorRequest::OpenPopup { reply }, rx).await
    }

    async fn call<T>(
        &self,
        request: CoordinatorRequest,
        rx: oneshot::Receiver<T>,
    ) -> GuardResult<T> {
        self.tx
            .send(request)
            .await
            .map_err(|_| GuardError::ContextClosed("coordinator"))?;
        rx.await.map_err(|_| GuardError::ContextClosed("coordinator"))
    }
}
