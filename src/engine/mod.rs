//! The three contexts and their wiring.
//!
//! The extractor, coordinator and panel share nothing but the store and their
//! mailboxes. [`launch`] stands all of them up on the current tokio runtime.

pub mod protocol;
pub mod coordinator;
pub mod surface;
pub mod panel;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::GuardConfig;
use crate::dom::SiteSelectors;
use crate::net::Classifier;
use crate::render::{OverlayAction, OverlayHost};
use crate::store::SharedStore;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use panel::{Panel, PanelView};
pub use protocol::{ActivePage, BlockDirective, BlockStatus, NewsData, PanelLaunch, PopupStatus};
pub use surface::{Extractor, NavigationEvent, PipelineOutcome, PipelineReport, SurfaceHandle, SurfaceLink};

const MAILBOX: usize = 32;

/// Addresses of a running set of contexts.
pub struct Contexts {
    pub coordinator: CoordinatorHandle,
    pub surface: SurfaceHandle,
    /// Feed page lifecycle events here. Dropping it detaches the extractor.
    pub navigation: mpsc::Sender<NavigationEvent>,
    /// User clicks on the overlay.
    pub actions: mpsc::Sender<OverlayAction>,
    /// `openPopup` requests relayed by the coordinator.
    pub panel_launches: mpsc::UnboundedReceiver<PanelLaunch>,
    pub reports: mpsc::UnboundedReceiver<PipelineReport>,
    pub panel: Panel,
}

/// Spawn the coordinator and an extractor rendering through `host`.
pub fn launch<H>(
    config: &GuardConfig,
    store: Arc<dyn SharedStore>,
    classifier: Arc<dyn Classifier>,
    selectors: Arc<SiteSelectors>,
    host: H,
) -> Contexts
where
    H: OverlayHost + 'static,
{
    let (coordinator_tx, coordinator_rx) = mpsc::channel(MAILBOX);
    let (surface_tx, surface_rx) = mpsc::channel(MAILBOX);
    let (navigation_tx, navigation_rx) = mpsc::channel(MAILBOX);
    let (action_tx, action_rx) = mpsc::channel(MAILBOX);
    let (launch_tx, launch_rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = mpsc::unbounded_channel();

    let coordinator_handle = CoordinatorHandle::new(coordinator_tx);
    let surface_handle = SurfaceHandle::new(surface_tx);

    let coordinator = Coordinator::new(
        config,
        store.clone(),
        classifier,
        Arc::new(surface_handle.clone()),
        selectors.clone(),
    )
    .with_panel_launcher(launch_tx);
    tokio::spawn(Arc::new(coordinator).serve(coordinator_rx));

    let extractor = Extractor::new(
        config,
        selectors,
        store.clone(),
        coordinator_handle.clone(),
        host,
    )
    .with_reports(report_tx);
    tokio::spawn(extractor.run(navigation_rx, surface_rx, action_rx));

    log::info!("Contexts launched (classifier at {})", config.classifier_url);

    Contexts {
        panel: Panel::new(config, coordinator_handle.clone(), store),
        coordinator: coordinator_handle,
        surface: surface_handle,
        navigation: navigation_tx,
        actions: action_tx,
        panel_launches: launch_rx,
        reports: report_rx,
    }
}
