use scraper::{ElementRef, Selector};

/// Containers whose paragraphs are never article text: ad slots, share
/// widgets, related-content widgets and comment sections.
pub const DENYLISTED_CONTAINERS: &[&str] = &[
    ".medyanet-inline-adv",
    ".FIOnDemandWrapper",
    ".social-share",
    ".taboolaAd",
    ".trc_related_container",
    ".news-fullwith-img",
    ".ad-container",
    ".ad-slot",
    ".sponsored-content",
    ".widget",
    ".comment-section",
    ".share-buttons",
];

/// Paragraphs at or under this many characters are treated as noise.
pub const NOISE_THRESHOLD: usize = 20;

/// Filters content nodes down to article paragraphs.
pub struct ContentFilter {
    denylist: Option<Selector>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::with_denylist(DENYLISTED_CONTAINERS)
    }

    /// Invalid container selectors are skipped.
    pub fn with_denylist(containers: &[&str]) -> Self {
        let valid: Vec<&str> = containers
            .iter()
            .copied()
            .filter(|c| Selector::parse(c).is_ok())
            .collect();
        let denylist = if valid.is_empty() {
            None
        } else {
            Selector::parse(&valid.join(", ")).ok()
        };
        Self { denylist }
    }

    /// Whether `el` sits in (or is) a denylisted container.
    pub fn is_denylisted(&self, el: ElementRef<'_>) -> bool {
        let Some(denylist) = &self.denylist else {
            return false;
        };
        denylist.matches(&el)
            || el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| denylist.matches(&ancestor))
    }

    /// Keep a node when it is outside every denylisted container and its
    /// visible text clears the noise threshold.
    pub fn keep(&self, el: ElementRef<'_>, text: &str) -> bool {
        !self.is_denylisted(el) && !is_noise(text)
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_noise(text: &str) -> bool {
    text.chars().count() <= NOISE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::parse_page;

    fn paragraphs(html: &str) -> Vec<(bool, String)> {
        let doc = parse_page(html);
        let filter = ContentFilter::new();
        let p = Selector::parse("p").unwrap();
        doc.select(&p)
            .map(|el| {
                let text = crate::dom::parser::visible_text(el);
                (filter.keep(el, &text), text)
            })
            .collect()
    }

    #[test]
    fn drops_paragraphs_under_ad_and_share_containers() {
        let html = r#"
        <html><body><article>
            <p>Gerçek haber metni burada yer alıyor ve yeterince uzun.</p>
            <div class="ad-slot"><div><p>Reklam metni de yeterince uzun bir paragraf.</p></div></div>
            <section class="social-share"><p>Bu haberi paylaşın, arkadaşlarınıza gönderin.</p></section>
        </article></body></html>
        "#;
        let kept: Vec<_> = paragraphs(html).into_iter().filter(|(k, _)| *k).collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].1.starts_with("Gerçek haber"));
    }

    #[test]
    fn drops_short_noise() {
        let html = "<article><p>Kısa.</p><p>exactly twenty chars</p><p>twenty-one characters</p></article>";
        let kept: Vec<_> = paragraphs(html).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kept, vec![false, false, true]);
    }

    #[test]
    fn denylisted_node_itself_is_dropped() {
        let html = r#"<article><p class="widget">Widget paragraph with plenty of text in it.</p></article>"#;
        assert!(!paragraphs(html)[0].0);
    }
}
