//! Blocking overlay.
//!
//! State selection is a pure function of `(session, blocking, severity)`;
//! mounting is delegated to an [`OverlayHost`]. At most one overlay exists at
//! a time: every render unmounts the previous one first.

use std::sync::{Arc, Mutex};

use crate::model::PageIdentity;

/// Severity at or above which a page is blocked outright.
pub const HIGH_SEVERITY: u8 = 8;
/// Severity at or above which the reader is asked before continuing.
pub const MEDIUM_SEVERITY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    /// No session: offer login.
    Gate,
    WarnHigh,
    WarnMedium,
}

/// Pick the overlay for a page. Evaluated fresh for every event.
pub fn select_overlay(session_present: bool, blocking_enabled: bool, severity: u8) -> OverlayState {
    if !session_present {
        return OverlayState::Gate;
    }
    if !blocking_enabled {
        return OverlayState::Hidden;
    }
    match severity {
        s if s >= HIGH_SEVERITY => OverlayState::WarnHigh,
        s if s >= MEDIUM_SEVERITY => OverlayState::WarnMedium,
        _ => OverlayState::Hidden,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    /// Remove the warning and keep reading.
    Continue,
    /// Leave the page through history.
    Back,
    /// Open the panel to log in.
    OpenPanel,
    /// Close the login gate.
    Dismiss,
}

impl OverlayState {
    /// The actions a mounted overlay offers, in display order.
    pub fn actions(self) -> &'static [OverlayAction] {
        match self {
            OverlayState::Hidden => &[],
            OverlayState::Gate => &[OverlayAction::OpenPanel, OverlayAction::Dismiss],
            OverlayState::WarnHigh | OverlayState::WarnMedium => {
                &[OverlayAction::Continue, OverlayAction::Back]
            }
        }
    }
}

/// What a host is asked to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    pub state: OverlayState,
    pub url: PageIdentity,
    pub message: String,
    pub buttons: Vec<(OverlayAction, &'static str)>,
}

impl OverlayView {
    /// `None` for `Hidden`.
    pub fn build(state: OverlayState, url: PageIdentity, severity: u8) -> Option<Self> {
        let (message, labels): (String, [&'static str; 2]) = match state {
            OverlayState::Hidden => return None,
            OverlayState::Gate => (
                "Please log in to analyze this page.".to_string(),
                ["Log in", "Close"],
            ),
            OverlayState::WarnHigh => (
                format!(
                    "This page was blocked for a high negativity score ({}/10).",
                    severity
                ),
                ["Continue", "Go back"],
            ),
            OverlayState::WarnMedium => (
                format!(
                    "This page has a moderate negativity score ({}/10). Continue anyway?",
                    severity
                ),
                ["Yes", "No"],
            ),
        };
        let buttons = state.actions().iter().copied().zip(labels).collect();
        Some(Self {
            state,
            url,
            message,
            buttons,
        })
    }
}

/// Rendering side effects. Implemented by whatever owns the page.
pub trait OverlayHost: Send {
    fn mount(&mut self, view: &OverlayView);
    fn unmount(&mut self);
    fn go_back(&mut self);
}

/// Result of a user action on the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEffect {
    /// Action not offered by the current overlay.
    Ignored,
    Removed,
    NavigatedBack,
    /// Overlay removed; the caller should ask for the panel.
    PanelRequested,
}

pub struct Overlay<H: OverlayHost> {
    host: H,
    current: Option<OverlayView>,
}

impl<H: OverlayHost> Overlay<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            current: None,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.current
            .as_ref()
            .map(|v| v.state)
            .unwrap_or(OverlayState::Hidden)
    }

    pub fn current(&self) -> Option<&OverlayView> {
        self.current.as_ref()
    }

    /// Replace whatever is showing with `state` for `url`.
    pub fn show(&mut self, state: OverlayState, url: PageIdentity, severity: u8) -> OverlayState {
        self.clear();
        if let Some(view) = OverlayView::build(state, url, severity) {
            log::info!("Overlay {:?} on {}", view.state, view.url);
            self.host.mount(&view);
            self.current = Some(view);
        }
        self.state()
    }

    pub fn clear(&mut self) {
        if self.current.take().is_some() {
            self.host.unmount();
        }
    }

    pub fn act(&mut self, action: OverlayAction) -> OverlayEffect {
        if !self.state().actions().contains(&action) {
            return OverlayEffect::Ignored;
        }
        self.clear();
        match action {
            OverlayAction::Continue | OverlayAction::Dismiss => OverlayEffect::Removed,
            OverlayAction::Back => {
                self.host.go_back();
                OverlayEffect::NavigatedBack
            }
            OverlayAction::OpenPanel => OverlayEffect::PanelRequested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Mounted(OverlayView),
    Unmounted,
    Back,
}

/// Host that records every side effect; cloned handles share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Views currently mounted (mounts minus unmounts, in order).
    pub fn mounted(&self) -> Vec<OverlayView> {
        let mut stack = Vec::new();
        for event in self.events() {
            match event {
                HostEvent::Mounted(view) => stack.push(view),
                HostEvent::Unmounted => {
                    stack.pop();
                }
                HostEvent::Back => {}
            }
        }
        stack
    }

    fn record(&self, event: HostEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl OverlayHost for RecordingHost {
    fn mount(&mut self, view: &OverlayView) {
        self.record(HostEvent::Mounted(view.clone()));
    }

    fn unmount(&mut self) {
        self.record(HostEvent::Unmounted);
    }

    fn go_back(&mut self) {
        self.record(HostEvent::Back);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> PageIdentity {
        PageIdentity::new("https://www.hurriyet.com.tr/gundem/x")
    }

    #[test]
    fn state_function_matches_transition_rule() {
        for session in [false, true] {
            for blocking in [false, true] {
                for severity in 0..=10u8 {
                    let expected = if !session {
                        OverlayState::Gate
                    } else if blocking && severity >= 8 {
                        OverlayState::WarnHigh
                    } else if blocking && severity >= 4 {
                        OverlayState::WarnMedium
                    } else {
                        OverlayState::Hidden
                    };
                    assert_eq!(select_overlay(session, blocking, severity), expected);
                }
            }
        }
        assert_eq!(select_overlay(true, true, 8), OverlayState::WarnHigh);
        assert_eq!(select_overlay(true, true, 3), OverlayState::Hidden);
        assert_eq!(select_overlay(false, true, 9), OverlayState::Gate);
    }

    #[test]
    fn warnings_offer_continue_and_back() {
        let view = OverlayView::build(OverlayState::WarnHigh, url(), 9).unwrap();
        assert_eq!(
            view.buttons,
            vec![(OverlayAction::Continue, "Continue"), (OverlayAction::Back, "Go back")]
        );
        assert!(view.message.contains("9/10"));
        assert!(OverlayView::build(OverlayState::Hidden, url(), 9).is_none());
    }

    #[test]
    fn at_most_one_overlay_is_mounted() {
        let host = RecordingHost::new();
        let mut overlay = Overlay::new(host.clone());
        overlay.show(OverlayState::Gate, url(), 0);
        overlay.show(OverlayState::WarnMedium, url(), 5);
        overlay.show(OverlayState::WarnHigh, url(), 8);
        let mounted = host.mounted();
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].state, OverlayState::WarnHigh);

        overlay.show(OverlayState::Hidden, url(), 0);
        assert!(host.mounted().is_empty());
    }

    #[test]
    fn continue_only_removes() {
        let host = RecordingHost::new();
        let mut overlay = Overlay::new(host.clone());
        overlay.show(OverlayState::WarnHigh, url(), 8);
        assert_eq!(overlay.act(OverlayAction::Continue), OverlayEffect::Removed);
        assert_eq!(overlay.state(), OverlayState::Hidden);
        assert!(!host.events().contains(&HostEvent::Back));
    }

    #[test]
    fn back_navigates_history() {
        let host = RecordingHost::new();
        let mut overlay = Overlay::new(host.clone());
        overlay.show(OverlayState::WarnMedium, url(), 4);
        assert_eq!(overlay.act(OverlayAction::Back), OverlayEffect::NavigatedBack);
        assert_eq!(host.events().last(), Some(&HostEvent::Back));
    }

    #[test]
    fn gate_actions() {
        let mut overlay = Overlay::new(RecordingHost::new());
        overlay.show(OverlayState::Gate, url(), 0);
        assert_eq!(overlay.act(OverlayAction::Back), OverlayEffect::Ignored);
        assert_eq!(overlay.act(OverlayAction::OpenPanel), OverlayEffect::PanelRequested);
        assert_eq!(overlay.act(OverlayAction::Dismiss), OverlayEffect::Ignored);
    }
}
