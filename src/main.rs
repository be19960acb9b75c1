use std::process::ExitCode;
use std::sync::Arc;

use newsguard::dom::SiteSelectors;
use newsguard::engine::{self, NavigationEvent, PipelineOutcome};
use newsguard::model::PageIdentity;
use newsguard::net::{fetch_url, HttpClassifier};
use newsguard::render::{OverlayHost, OverlayView};
use newsguard::store::{FileStore, MemoryStore, SharedStore};
use newsguard::{GuardConfig, GuardError, GuardResult};

/// Prints overlays instead of drawing them.
struct ConsoleHost;

impl OverlayHost for ConsoleHost {
    fn mount(&mut self, view: &OverlayView) {
        println!("[overlay] {}", view.message);
        let labels: Vec<&str> = view.buttons.iter().map(|(_, label)| *label).collect();
        println!("          [{}]", labels.join("] ["));
    }

    fn unmount(&mut self) {
        log::debug!("Overlay removed");
    }

    fn go_back(&mut self) {
        println!("[overlay] history back");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(url) = args.first() else {
        eprintln!("usage: newsguard <url> [user-id]");
        return ExitCode::from(2);
    };

    match run(url, args.get(1).map(String::as_str)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(url: &str, user_id: Option<&str>) -> GuardResult<()> {
    let config = GuardConfig::from_env()?;

    let store: Arc<dyn SharedStore> = match &config.store_path {
        Some(path) => Arc::new(FileStore::open(path.clone())?),
        None => Arc::new(MemoryStore::new()),
    };
    let selectors = match &config.selectors_path {
        Some(path) => SiteSelectors::load(path)?,
        None => SiteSelectors::builtin(),
    };
    let classifier = HttpClassifier::new(&config.classifier_url, config.classifier_timeout)?;

    let page = fetch_url(url).await?;
    if !(200..300).contains(&page.status) {
        log::warn!("{} answered HTTP {}", page.url, page.status);
    }

    let mut contexts = engine::launch(
        &config,
        store.clone(),
        Arc::new(classifier),
        Arc::new(selectors),
        ConsoleHost,
    );
    if let Some(user_id) = user_id {
        contexts.panel.login(user_id, false)?;
    }

    let identity = PageIdentity::new(&page.url);
    contexts
        .navigation
        .send(NavigationEvent::Loaded {
            url: identity.clone(),
            html: page.html,
        })
        .await
        .map_err(|_| GuardError::ContextClosed("extractor"))?;

    let report = contexts
        .reports
        .recv()
        .await
        .ok_or(GuardError::ContextClosed("extractor"))?;

    match report.outcome {
        PipelineOutcome::Rendered(state) => println!("overlay: {:?}", state),
        PipelineOutcome::Gated => {
            println!("login required: pass a user id as the second argument");
            return Ok(());
        }
        PipelineOutcome::Discarded => println!("page changed before the analysis finished"),
        PipelineOutcome::ExtractionFailed(e) | PipelineOutcome::Failed(e) => return Err(e),
    }

    if let Some(entry) = store.fresh_entry(&identity)? {
        let analysis = entry.analysis;
        println!("title:    {}", analysis.title);
        println!("verdict:  {}", analysis.label());
        println!("blocking: {}", if analysis.blocking_enabled { "on" } else { "off" });
    }
    Ok(())
}
