pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub mod dom;
pub mod net;
pub mod render;
pub mod engine;

pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
