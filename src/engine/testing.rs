//! Fakes shared by the engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::engine::protocol::{ActivePage, BlockDirective, BlockStatus};
use crate::engine::surface::SurfaceLink;
use crate::error::{GuardError, GuardResult};
use crate::model::{ExtractedContent, PageIdentity, Verdict};
use crate::net::classifier::{ClassifierVerdict, PredictRequest};
use crate::net::Classifier;
use crate::render::{select_overlay, OverlayState};

pub fn negative(severity: u8) -> ClassifierVerdict {
    ClassifierVerdict {
        verdict: Verdict::Negative,
        severity,
        title: Some("Deprem bölgesinde son durum".into()),
    }
}

pub fn positive() -> ClassifierVerdict {
    ClassifierVerdict {
        verdict: Verdict::Positive,
        severity: 0,
        title: None,
    }
}

/// Classifier with a settable answer. A gated stub holds every call until
/// [`StubClassifier::release`]; the answer is captured when the call starts.
pub struct StubClassifier {
    answer: Mutex<GuardResult<ClassifierVerdict>>,
    calls: AtomicUsize,
    gated: bool,
    panic_next: AtomicBool,
    open: watch::Sender<bool>,
    requests: Mutex<Vec<PredictRequest>>,
}

impl StubClassifier {
    pub fn answering(verdict: ClassifierVerdict) -> Self {
        Self::with_answer(Ok(verdict))
    }

    pub fn failing(err: GuardError) -> Self {
        Self::with_answer(Err(err))
    }

    fn with_answer(answer: GuardResult<ClassifierVerdict>) -> Self {
        let (open, _) = watch::channel(false);
        Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
            gated: false,
            panic_next: AtomicBool::new(false),
            open,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// The next call crashes instead of answering.
    pub fn panicking_once(self) -> Self {
        self.panic_next.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_answer(&self, verdict: ClassifierVerdict) {
        *self.answer.lock().unwrap() = Ok(verdict);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PredictRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, request: &PredictRequest) -> GuardResult<ClassifierVerdict> {
        let answer = self.answer.lock().unwrap().clone();
        self.requests.lock().unwrap().push(request.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("classifier crashed");
        }
        if self.gated {
            let mut open = self.open.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }
        answer
    }
}

/// In-memory page link for driving the coordinator without an extractor.
pub struct ScriptedSurface {
    page: Mutex<Option<ActivePage>>,
    extractions: AtomicUsize,
    directives: Mutex<Vec<BlockDirective>>,
}

impl ScriptedSurface {
    pub fn ready(url: &str) -> Self {
        Self {
            page: Mutex::new(Some(ActivePage {
                url: PageIdentity::new(url),
                ready: true,
            })),
            extractions: AtomicUsize::new(0),
            directives: Mutex::new(Vec::new()),
        }
    }

    pub fn navigate(&self, url: &str, ready: bool) {
        *self.page.lock().unwrap() = Some(ActivePage {
            url: PageIdentity::new(url),
            ready,
        });
    }

    pub fn detach(&self) {
        *self.page.lock().unwrap() = None;
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn directives(&self) -> Vec<BlockDirective> {
        self.directives.lock().unwrap().clone()
    }
}

#[async_trait]
impl SurfaceLink for ScriptedSurface {
    async fn active_page(&self) -> Option<ActivePage> {
        self.page.lock().unwrap().clone()
    }

    async fn extract(&self) -> GuardResult<ExtractedContent> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let page = self.active_page().await.ok_or(GuardError::NoActiveSurface)?;
        if !page.ready {
            return Err(GuardError::SurfaceNotReady);
        }
        Ok(ExtractedContent {
            title: "Deprem bölgesinde son durum".into(),
            body: "Bölgede arama kurtarma çalışmaları sürüyor.".into(),
            url: page.url,
        })
    }

    async fn apply_block(&self, directive: BlockDirective) -> GuardResult<BlockStatus> {
        self.directives.lock().unwrap().push(directive.clone());
        let showing = self.active_page().await.map(|p| p.url);
        if showing.as_ref() != Some(&directive.url) {
            return Ok(BlockStatus::Stale);
        }
        Ok(match select_overlay(true, true, directive.severity) {
            OverlayState::Hidden => BlockStatus::NotNeeded,
            state => BlockStatus::Shown(state),
        })
    }
}
