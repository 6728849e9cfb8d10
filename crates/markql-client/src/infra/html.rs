//! HTML parsing adapter backed by `scraper`.

use scraper::{ElementRef, Html};

use crate::app::extract::{PageDocument, PageElement};

/// A parsed HTML page.
pub struct HtmlPage {
    html: Html,
}

impl HtmlPage {
    /// Parse a full document. Parsing is lenient and never fails.
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }
}

impl std::fmt::Debug for HtmlPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlPage").finish_non_exhaustive()
    }
}

impl PageElement for ElementRef<'_> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn child_elements(&self) -> Vec<Self> {
        self.children().filter_map(ElementRef::wrap).collect()
    }

    fn text_content(&self) -> String {
        self.text().collect()
    }

    fn outer_html(&self) -> String {
        self.html()
    }
}

impl PageDocument for HtmlPage {
    type Element<'a> = ElementRef<'a>;

    fn document_element(&self) -> Option<ElementRef<'_>> {
        Some(self.html.root_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::extract::extract;
    use crate::domain::model::{ScopeSelection, SnapshotSource};

    #[test]
    fn full_capture_serializes_html_element() {
        let page = HtmlPage::parse("<!doctype html><title>t</title><p>hello</p>");
        let snapshot = extract(&page, ScopeSelection::Full);
        assert_eq!(snapshot.source, SnapshotSource::Full);
        assert!(snapshot.html.starts_with("<html>"));
        assert!(snapshot.html.contains("<p>hello</p>"));
    }

    #[test]
    fn main_capture_prefers_article() {
        let page = HtmlPage::parse(
            "<body><div>a long long long sidebar text</div><article><h1>Post</h1></article></body>",
        );
        let snapshot = extract(&page, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::Preferred);
        assert_eq!(snapshot.html, "<article><h1>Post</h1></article>");
    }

    #[test]
    fn main_capture_uses_heuristic_without_landmarks() {
        let page = HtmlPage::parse(
            "<body><nav>home</nav><div id=\"content\"><p>First paragraph.</p><p>Second.</p></div></body>",
        );
        let snapshot = extract(&page, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::Heuristic);
        assert!(snapshot.html.starts_with("<div id=\"content\">"));
    }

    #[test]
    fn main_capture_of_empty_body_falls_back() {
        let page = HtmlPage::parse("");
        let snapshot = extract(&page, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::FullFallback);
        assert_eq!(snapshot.html, "<html><head></head><body></body></html>");
    }
}
