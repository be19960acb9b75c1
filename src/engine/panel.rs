//! Panel context: presentation over the coordinator's contract plus the
//! session and blocking-preference controls.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GuardConfig;
use crate::engine::coordinator::CoordinatorHandle;
use crate::engine::protocol::NewsData;
use crate::error::{GuardError, GuardResult};
use crate::model::{now_millis, AnalysisResult, Session, Verdict};
use crate::render::overlay::MEDIUM_SEVERITY;
use crate::store::SharedStore;

/// What the panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelView {
    LoginRequired,
    Analysis {
        user: String,
        title: String,
        /// "Positive" or "Negative (n/10)".
        label: String,
        verdict: Verdict,
        severity: u8,
        blocking_enabled: bool,
    },
    Error {
        message: String,
        retryable: bool,
    },
}

impl PanelView {
    fn from_result(session: &Session, result: GuardResult<AnalysisResult>) -> Self {
        match result {
            Ok(analysis) => PanelView::Analysis {
                user: session.display_name(),
                label: analysis.label(),
                title: analysis.title,
                verdict: analysis.verdict,
                severity: analysis.severity,
                blocking_enabled: analysis.blocking_enabled,
            },
            Err(GuardError::AuthRequired) => PanelView::LoginRequired,
            Err(e) => PanelView::Error {
                retryable: e.is_retryable(),
                message: e.to_string(),
            },
        }
    }
}

pub struct Panel {
    coordinator: CoordinatorHandle,
    store: Arc<dyn SharedStore>,
    page_data_timeout: Duration,
    session_ttl_ms: i64,
}

impl Panel {
    pub fn new(config: &GuardConfig, coordinator: CoordinatorHandle, store: Arc<dyn SharedStore>) -> Self {
        Self {
            coordinator,
            store,
            page_data_timeout: config.page_data_timeout,
            session_ttl_ms: config.session_ttl_ms(),
        }
    }

    /// Show the analysis of the active page, from cache when fresh.
    pub async fn open(&self) -> PanelView {
        let session = match self.active_session() {
            Ok(session) => session,
            Err(e) => return self.session_view(e),
        };
        let result = self.load().await;
        PanelView::from_result(&session, result)
    }

    /// Explicit re-analysis: clears the cache and classifies again.
    pub async fn reanalyze(&self) -> PanelView {
        let session = match self.active_session() {
            Ok(session) => session,
            Err(e) => return self.session_view(e),
        };
        log::info!("Re-analysis requested from panel");
        let result = self.coordinator.reanalyze().await;
        PanelView::from_result(&session, result)
    }

    /// Persist the blocking toggle and re-run the analysis so the page's
    /// overlay follows the new setting.
    pub async fn set_blocking(&self, enabled: bool) -> PanelView {
        if let Err(e) = self.store.set_blocking_preference(enabled) {
            return PanelView::Error {
                message: e.to_string(),
                retryable: false,
            };
        }
        log::info!("Blocking negative content: {}", enabled);
        self.reanalyze().await
    }

    pub fn blocking_enabled(&self) -> GuardResult<bool> {
        self.store.blocking_preference()
    }

    pub fn login(&self, user_id: &str, is_admin: bool) -> GuardResult<Session> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(GuardError::AuthRequired);
        }
        let session = Session::new(user_id, is_admin, now_millis());
        self.store.set_session(session.clone())?;
        log::info!("Logged in as {}", session.display_name());
        Ok(session)
    }

    pub fn logout(&self) -> GuardResult<()> {
        self.store.clear_session()?;
        log::info!("Logged out");
        Ok(())
    }

    async fn load(&self) -> GuardResult<AnalysisResult> {
        let data = tokio::time::timeout(self.page_data_timeout, self.coordinator.get_news_data())
            .await
            .map_err(|_| GuardError::PageDataTimeout)??;

        let analysis = match data {
            NewsData::Cached(entry) => {
                log::debug!("Panel served from cache: {}", entry.analysis.url);
                entry.analysis
            }
            NewsData::Extracted(content) => self.coordinator.analyze_content(content).await?,
        };

        if self.should_block(&analysis) {
            match self.coordinator.apply_block().await {
                Ok(status) => log::debug!("Block requested from panel: {:?}", status),
                Err(e) => log::warn!("Could not apply block: {}", e),
            }
        }
        Ok(analysis)
    }

    fn should_block(&self, analysis: &AnalysisResult) -> bool {
        let enabled = self.store.blocking_preference().unwrap_or_else(|e| {
            log::warn!("Could not read blocking preference: {}", e);
            true
        });
        enabled
            && analysis.verdict == Verdict::Negative
            && analysis.severity >= MEDIUM_SEVERITY
    }

    /// Current session; an expired one is removed from the store.
    fn active_session(&self) -> GuardResult<Session> {
        match self.store.session()? {
            Some(session) if session.is_active_at(now_millis(), self.session_ttl_ms) => Ok(session),
            Some(_) => {
                log::info!("Session expired");
                self.store.clear_session()?;
                Err(GuardError::AuthRequired)
            }
            None => Err(GuardError::AuthRequired),
        }
    }

    fn session_view(&self, err: GuardError) -> PanelView {
        match err {
            GuardError::AuthRequired => PanelView::LoginRequired,
            e => PanelView::Error {
                message: e.to_string(),
                retryable: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::protocol::CoordinatorRequest;
    use crate::model::{CacheEntry, ExtractedContent, PageIdentity};
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    const URL: &str = "https://www.sabah.com.tr/gundem/haber";

    fn analysis(verdict: Verdict, severity: u8) -> AnalysisResult {
        AnalysisResult {
            verdict,
            severity,
            title: "Başlık".into(),
            url: PageIdentity::new(URL),
            blocking_enabled: true,
        }
    }

    fn panel(store: Arc<MemoryStore>) -> (Panel, mpsc::Receiver<CoordinatorRequest>) {
        let (tx, rx) = mpsc::channel(8);
        let panel = Panel::new(&GuardConfig::default(), CoordinatorHandle::new(tx), store);
        (panel, rx)
    }

    #[tokio::test]
    async fn expired_session_is_cleared_and_asks_for_login() {
        let store = Arc::new(MemoryStore::new());
        let day = 24 * 60 * 60 * 1000;
        store
            .set_session(Session::new("Ada_Yilmaz", false, now_millis() - day - 5))
            .unwrap();
        store.set_blocking_preference(false).unwrap();
        let (panel, _rx) = panel(store.clone());

        assert_eq!(panel.open().await, PanelView::LoginRequired);
        assert_eq!(store.session().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn page_data_wait_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let (panel, mut rx) = panel(store.clone());
        panel.login("Ada_Yilmaz", false).unwrap();

        // Accept the request but never answer it.
        let hold = tokio::spawn(async move {
            let request = rx.recv().await;
            std::future::pending::<()>().await;
            drop(request);
        });

        let view = panel.open().await;
        assert_eq!(
            view,
            PanelView::Error {
                message: GuardError::PageDataTimeout.to_string(),
                retryable: true,
            }
        );
        hold.abort();
    }

    #[tokio::test]
    async fn cached_negative_asks_coordinator_to_block() {
        let store = Arc::new(MemoryStore::new());
        let (panel, mut rx) = panel(store.clone());
        panel.login("Ada_Yilmaz_ada@x.com", false).unwrap();

        let entry = CacheEntry {
            content: ExtractedContent {
                title: "Başlık".into(),
                body: "Haber metni".into(),
                url: PageIdentity::new(URL),
            },
            analysis: analysis(Verdict::Negative, 6),
        };
        let coordinator = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(request) = rx.recv().await {
                seen.push(request.action());
                match request {
                    CoordinatorRequest::GetNewsData { reply } => {
                        let _ = reply.send(Ok(NewsData::Cached(entry.clone())));
                    }
                    CoordinatorRequest::ApplyBlock { reply } => {
                        let _ = reply.send(Ok(crate::engine::protocol::BlockStatus::NotNeeded));
                    }
                    other => panic!("unexpected {}", other.action()),
                }
            }
            seen
        });

        let view = panel.open().await;
        match view {
            PanelView::Analysis {
                label, user, ..
            } => {
                assert_eq!(label, "Negative (6/10)");
                assert_eq!(user, Session::new("Ada_Yilmaz_ada@x.com", false, 0).display_name());
            }
            other => panic!("unexpected view {:?}", other),
        }
        drop(panel);
        assert_eq!(coordinator.await.unwrap(), vec!["getNewsData", "applyBlock"]);
    }

    #[tokio::test]
    async fn positive_result_does_not_block() {
        let store = Arc::new(MemoryStore::new());
        let (panel, mut rx) = panel(store.clone());
        panel.login("u_1", false).unwrap();
        assert!(!panel.should_block(&analysis(Verdict::Positive, 0)));
        assert!(!panel.should_block(&analysis(Verdict::Negative, 3)));
        assert!(panel.should_block(&analysis(Verdict::Negative, 4)));
        store.set_blocking_preference(false).unwrap();
        assert!(!panel.should_block(&analysis(Verdict::Negative, 9)));
        rx.close();
    }

    struct UnreadableStore;

    impl SharedStore for UnreadableStore {
        fn snapshot(&self) -> GuardResult<crate::store::StoreSnapshot> {
            Err(GuardError::Store("disk gone".into()))
        }

        fn update(
            &self,
            _f: &mut dyn FnMut(&mut crate::store::StoreSnapshot),
        ) -> GuardResult<()> {
            Err(GuardError::Store("disk gone".into()))
        }
    }

    #[test]
    fn unreadable_preference_defaults_to_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let panel = Panel::new(
            &GuardConfig::default(),
            CoordinatorHandle::new(tx),
            Arc::new(UnreadableStore),
        );
        assert!(panel.should_block(&analysis(Verdict::Negative, 6)));
        assert!(!panel.should_block(&analysis(Verdict::Negative, 2)));
    }

    #[test]
    fn logout_clears_session_and_preference() {
        let store = Arc::new(MemoryStore::new());
        let (panel, _rx) = panel(store.clone());
        assert_eq!(panel.login("  ", false), Err(GuardError::AuthRequired));
        panel.login("u_1", true).unwrap();
        store.set_blocking_preference(false).unwrap();

        panel.logout().unwrap();
        assert_eq!(store.session().unwrap(), None);
        assert!(panel.blocking_enabled().unwrap());
    }
}
