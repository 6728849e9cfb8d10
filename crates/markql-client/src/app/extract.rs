//! Content extraction: choose which part of a page to serialize.

use crate::domain::model::{ScopeSelection, Snapshot, SnapshotSource};

/// Maximum depth, counted from body's direct children (depth 1), visited by
/// the largest-text heuristic.
pub const HEURISTIC_MAX_DEPTH: usize = 3;

/// An element in a document tree.
pub trait PageElement: Sized {
    /// Lowercase tag name.
    fn tag_name(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
    /// Direct element children in document order.
    fn child_elements(&self) -> Vec<Self>;
    /// Concatenated text of all descendant text nodes.
    fn text_content(&self) -> String;
    /// Serialized markup including the element's own tag.
    fn outer_html(&self) -> String;
}

/// A parsed document.
pub trait PageDocument {
    type Element<'a>: PageElement
    where
        Self: 'a;

    /// The root element, if the document has one.
    fn document_element(&self) -> Option<Self::Element<'_>>;

    /// The `body` element: the first `body` child of the root.
    fn body(&self) -> Option<Self::Element<'_>> {
        self.document_element()?
            .child_elements()
            .into_iter()
            .find(|child| child.tag_name().eq_ignore_ascii_case("body"))
    }
}

/// Selectors that mark an explicit content region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSelector {
    Tag(&'static str),
    Role(&'static str),
}

impl ContentSelector {
    pub fn matches<E: PageElement>(&self, element: &E) -> bool {
        match self {
            ContentSelector::Tag(tag) => element.tag_name().eq_ignore_ascii_case(tag),
            ContentSelector::Role(role) => element.attribute("role") == Some(*role),
        }
    }
}

/// `article, main, [role='main'], [role='full']`
pub const CONTENT_SELECTORS: &[ContentSelector] = &[
    ContentSelector::Tag("article"),
    ContentSelector::Tag("main"),
    ContentSelector::Role("main"),
    ContentSelector::Role("full"),
];

/// Serialize the part of `document` described by `scope`.
pub fn extract<D: PageDocument>(document: &D, scope: ScopeSelection) -> Snapshot {
    match scope {
        ScopeSelection::Full => match document.document_element() {
            Some(root) => Snapshot::new(root.outer_html(), scope, SnapshotSource::Full),
            None => Snapshot::empty(scope),
        },
        ScopeSelection::Main => extract_main(document),
    }
}

fn extract_main<D: PageDocument>(document: &D) -> Snapshot {
    let scope = ScopeSelection::Main;
    let Some(root) = document.document_element() else {
        return Snapshot::empty(scope);
    };

    if let Some(preferred) = first_match(root, CONTENT_SELECTORS) {
        return Snapshot::new(preferred.outer_html(), scope, SnapshotSource::Preferred);
    }

    if let Some(candidate) = document
        .body()
        .and_then(|body| find_largest_element(&body, HEURISTIC_MAX_DEPTH))
    {
        return Snapshot::new(candidate.outer_html(), scope, SnapshotSource::Heuristic);
    }

    match document.document_element() {
        Some(root) => Snapshot::new(root.outer_html(), scope, SnapshotSource::FullFallback),
        None => Snapshot::empty(scope),
    }
}

/// First element in document order (root included) matching any selector.
pub fn first_match<E: PageElement>(root: E, selectors: &[ContentSelector]) -> Option<E> {
    let mut stack = vec![root];
    while let Some(element) = stack.pop() {
        if selectors.iter().any(|selector| selector.matches(&element)) {
            return Some(element);
        }
        let mut children = element.child_elements();
        children.reverse();
        stack.extend(children);
    }
    None
}

fn text_len<E: PageElement>(element: &E) -> usize {
    element.text_content().trim().chars().count()
}

/// Element under `root` (exclusive) with the longest trimmed text, visiting
/// at most `max_depth` levels. The first element reaching the maximum wins.
pub fn find_largest_element<E: PageElement>(root: &E, max_depth: usize) -> Option<E> {
    let mut best: Option<(E, usize)> = None;
    let mut stack: Vec<(E, usize)> = root
        .child_elements()
        .into_iter()
        .rev()
        .map(|child| (child, 1))
        .collect();

    while let Some((element, depth)) = stack.pop() {
        if depth > max_depth {
            continue;
        }
        let len = text_len(&element);
        let children = element.child_elements();
        if best.as_ref().is_none_or(|(_, best_len)| len > *best_len) {
            best = Some((element, len));
        }
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }

    best.map(|(element, _)| element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Node {
        tag: &'static str,
        attrs: Vec<(&'static str, &'static str)>,
        text: &'static str,
        children: Vec<Fixture>,
    }

    #[derive(Debug, Clone)]
    struct Fixture(Rc<Node>);

    fn el(tag: &'static str, text: &'static str, children: Vec<Fixture>) -> Fixture {
        Fixture(Rc::new(Node {
            tag,
            attrs: Vec::new(),
            text,
            children,
        }))
    }

    fn el_attr(
        tag: &'static str,
        attrs: Vec<(&'static str, &'static str)>,
        text: &'static str,
    ) -> Fixture {
        Fixture(Rc::new(Node {
            tag,
            attrs,
            text,
            children: Vec::new(),
        }))
    }

    impl PageElement for Fixture {
        fn tag_name(&self) -> &str {
            self.0.tag
        }

        fn attribute(&self, name: &str) -> Option<&str> {
            self.0
                .attrs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
        }

        fn child_elements(&self) -> Vec<Self> {
            self.0.children.clone()
        }

        fn text_content(&self) -> String {
            let mut text = self.0.text.to_string();
            for child in &self.0.children {
                text.push_str(&child.text_content());
            }
            text
        }

        fn outer_html(&self) -> String {
            let inner: String = self.0.children.iter().map(|c| c.outer_html()).collect();
            format!("<{0}>{1}{2}</{0}>", self.0.tag, self.0.text, inner)
        }
    }

    struct FixtureDoc(Option<Fixture>);

    impl PageDocument for FixtureDoc {
        type Element<'a> = Fixture;

        fn document_element(&self) -> Option<Fixture> {
            self.0.clone()
        }
    }

    fn page(body_children: Vec<Fixture>) -> FixtureDoc {
        FixtureDoc(Some(el(
            "html",
            "",
            vec![el("head", "", vec![]), el("body", "", body_children)],
        )))
    }

    #[test]
    fn full_scope_serializes_root() {
        let doc = page(vec![el("p", "hi", vec![])]);
        let snapshot = extract(&doc, ScopeSelection::Full);
        assert_eq!(snapshot.source, SnapshotSource::Full);
        assert_eq!(snapshot.scope, ScopeSelection::Full);
        assert!(snapshot.html.starts_with("<html>"));
        assert_eq!(snapshot.size_bytes, snapshot.html.len());
    }

    #[test]
    fn missing_root_yields_empty() {
        let doc = FixtureDoc(None);
        for scope in [ScopeSelection::Full, ScopeSelection::Main] {
            let snapshot = extract(&doc, scope);
            assert_eq!(snapshot.source, SnapshotSource::Empty);
            assert!(snapshot.html.is_empty());
            assert_eq!(snapshot.size_bytes, 0);
        }
    }

    #[test]
    fn preferred_region_wins_in_document_order() {
        let doc = page(vec![
            el("div", "a much longer block of text than the article", vec![]),
            el_attr("section", vec![("role", "main")], "role main"),
            el("article", "article", vec![]),
        ]);
        let snapshot = extract(&doc, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::Preferred);
        assert_eq!(snapshot.html, "<section>role main</section>");
    }

    #[test]
    fn role_match_is_exact() {
        let doc = page(vec![el_attr("div", vec![("role", "Main")], "x")]);
        assert_eq!(
            extract(&doc, ScopeSelection::Main).source,
            SnapshotSource::Heuristic
        );
    }

    #[test]
    fn heuristic_picks_longest_text_within_depth() {
        let doc = page(vec![
            el("nav", "menu", vec![]),
            el(
                "div",
                "",
                vec![el("p", "  short  ", vec![]), el("p", "the longest paragraph", vec![])],
            ),
        ]);
        let snapshot = extract(&doc, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::Heuristic);
        // The wrapping div aggregates both paragraphs, so it outranks them.
        assert!(snapshot.html.starts_with("<div>"));
    }

    #[test]
    fn heuristic_ties_keep_first_visited() {
        let body = el(
            "body",
            "",
            vec![el("div", "", vec![el("p", "same", vec![])]), el("p", "same", vec![])],
        );
        let best = find_largest_element(&body, HEURISTIC_MAX_DEPTH).unwrap();
        assert_eq!(best.outer_html(), "<div><p>same</p></div>");
    }

    #[test]
    fn heuristic_ignores_elements_below_depth_limit() {
        let deep = el(
            "div",
            "",
            vec![el("div", "", vec![el("div", "", vec![el("p", "deep text", vec![])])])],
        );
        let body = el("body", "", vec![deep]);
        let best = find_largest_element(&body, 2).unwrap();
        // Depth 1 already aggregates the deep text; nothing at depth 2 beats it.
        assert_eq!(best.tag_name(), "div");
        assert!(best.outer_html().starts_with("<div><div><div>"));
        assert!(find_largest_element(&el("body", "", vec![]), 3).is_none());
    }

    #[test]
    fn empty_body_falls_back_to_full_document() {
        let doc = page(vec![]);
        let snapshot = extract(&doc, ScopeSelection::Main);
        assert_eq!(snapshot.source, SnapshotSource::FullFallback);
        assert!(snapshot.html.starts_with("<html>"));
    }

    #[test]
    fn missing_body_falls_back_to_full_document() {
        let doc = FixtureDoc(Some(el("html", "text", vec![el("head", "", vec![])])));
        assert_eq!(
            extract(&doc, ScopeSelection::Main).source,
            SnapshotSource::FullFallback
        );
    }
}
