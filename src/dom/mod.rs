//! Page-side content handling: parsing, per-site selectors, noise filtering
//! and article extraction.

pub mod parser;
pub mod selectors;
pub mod filter;
pub mod extract;

pub use extract::{extract, MAX_BODY_CHARS, MAX_TITLE_CHARS, TITLE_NOT_FOUND};
pub use filter::ContentFilter;
pub use selectors::{SiteConfig, SiteSelectors};
