pub mod overlay;

pub use overlay::{
    select_overlay, Overlay, OverlayAction, OverlayEffect, OverlayHost, OverlayState,
    OverlayView, RecordingHost,
};
