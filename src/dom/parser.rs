use scraper::{ElementRef, Html, Node};

/// Tags whose children are never visible text
const SKIP_CHILDREN: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Parse a raw HTML page
pub fn parse_page(html: &str) -> Html {
    Html::parse_document(html)
}

/// Rendered text of an element: text nodes in document order, invisible
/// subtrees skipped, whitespace runs collapsed to one space, trimmed.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(el, &mut buf);
    collapse_whitespace(&buf)
}

fn collect_text(el: ElementRef<'_>, buf: &mut String) {
    let tag = el.value().name.local.as_ref();
    if SKIP_CHILDREN.contains(&tag) {
        return;
    }

    for child_ref in el.children() {
        match child_ref.value() {
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child_ref) {
                    if child_el.value().name.local.as_ref() == "br" {
                        buf.push(' ');
                    } else {
                        collect_text(child_el, buf);
                    }
                }
            }
            Node::Text(t) => buf.push_str(&t.text),
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
