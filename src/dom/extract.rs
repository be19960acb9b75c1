//! Article extraction: headline plus filtered body text.

use scraper::{Html, Selector};

use crate::dom::filter::ContentFilter;
use crate::dom::parser::{parse_page, truncate_chars, visible_text};
use crate::dom::selectors::{SiteConfig, SiteSelectors};
use crate::model::{ExtractedContent, ExtractionFailure, FailureReason, PageIdentity};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 15_000;

/// Title used when no headline selector matches.
pub const TITLE_NOT_FOUND: &str = "title not found";

/// Extract the article on `url` from its HTML.
///
/// A missing headline falls back to [`TITLE_NOT_FOUND`]; missing body text is
/// a failure that still carries the resolved title.
pub fn extract(
    html: &str,
    url: &PageIdentity,
    selectors: &SiteSelectors,
    filter: &ContentFilter,
) -> Result<ExtractedContent, ExtractionFailure> {
    let site = url
        .host()
        .and_then(|host| selectors.for_host(&host))
        .ok_or_else(|| ExtractionFailure {
            reason: FailureReason::UnsupportedDomain,
            url: url.clone(),
            title: None,
        })?;

    let document = parse_page(html);
    let title = extract_title(&document, site);
    let body = extract_body(&document, site, filter);

    if body.is_empty() {
        log::warn!("No article content found: {}", url);
        return Err(ExtractionFailure {
            reason: FailureReason::ContentNotFound,
            url: url.clone(),
            title: Some(title),
        });
    }

    log::debug!(
        "Extracted {} chars from {} ({:?})",
        body.chars().count(),
        url,
        title
    );

    Ok(ExtractedContent {
        title,
        body,
        url: url.clone(),
    })
}

/// First alternative with a match wins, even if a later one would match a
/// longer headline.
fn extract_title(document: &Html, site: &SiteConfig) -> String {
    for alternative in &site.title {
        let Ok(sel) = Selector::parse(alternative) else {
            log::warn!("Skipping invalid title selector {:?}", alternative);
            continue;
        };
        if let Some(el) = document.select(&sel).next() {
            return truncate_chars(&visible_text(el), MAX_TITLE_CHARS);
        }
    }
    TITLE_NOT_FOUND.to_string()
}

fn extract_body(document: &Html, site: &SiteConfig, filter: &ContentFilter) -> String {
    let sel = match site.content_selector() {
        Ok(sel) => sel,
        Err(e) => {
            log::warn!("{}", e);
            return String::new();
        }
    };

    let joined = document
        .select(&sel)
        .filter_map(|el| {
            let text = visible_text(el);
            filter.keep(el, &text).then_some(text)
        })
        .collect::<Vec<_>>()
        .join(" ");

    truncate_chars(&joined, MAX_BODY_CHARS)
}
