use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use thiserror::Error;

use super::text::{element_text, Pruning};
use super::Page;

const NAVBAR_SELECTORS: &[&str] = &[
    "nav",
    "header nav",
    "[role=\"navigation\"]",
    ".navbar",
    ".nav",
    ".navigation",
    "header",
];

const FOOTER_SELECTORS: &[&str] = &[
    "footer",
    "[role=\"contentinfo\"]",
    ".footer",
    ".site-footer",
    "#footer",
];

const MAIN_SELECTORS: &[&str] = &[
    "main",
    "[role=\"main\"]",
    ".main-content",
    ".content",
    "#main",
    "#content",
];

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("invalid selector {css:?}: {reason}")]
    Selector { css: String, reason: String },
}

/// A located region of a document plus how its text should be read.
#[derive(Debug, Clone, Copy)]
pub struct Region<'a> {
    pub element: ElementRef<'a>,
    pub pruning: Pruning,
}

impl<'a> Region<'a> {
    pub fn html(&self) -> String {
        self.element.html()
    }

    pub fn text(&self) -> String {
        element_text(self.element, self.pruning)
    }
}

/// One step of a section chain.
pub trait RegionMatcher: Send + Sync {
    fn label(&self) -> &str;
    fn locate<'a>(&self, page: &'a Page) -> Option<Region<'a>>;
}

/// First element matching a CSS selector.
pub struct CssMatcher {
    css: String,
    selector: Selector,
}

impl CssMatcher {
    pub fn new(css: &str) -> Result<Self, LocatorError> {
        let selector = Selector::parse(css).map_err(|e| LocatorError::Selector {
            css: css.to_string(),
            reason: e.to_string(),
        })?;
        Ok(CssMatcher {
            css: css.to_string(),
            selector,
        })
    }
}

impl RegionMatcher for CssMatcher {
    fn label(&self) -> &str {
        &self.css
    }

    fn locate<'a>(&self, page: &'a Page) -> Option<Region<'a>> {
        page.doc().select(&self.selector).next().map(|element| Region {
            element,
            pruning: Pruning::Noise,
        })
    }
}

/// `<body>` with navigation, header, footer and sidebar-like blocks pruned.
/// Only matches when the source really had a body tag.
pub struct BodyWithoutChrome;

impl RegionMatcher for BodyWithoutChrome {
    fn label(&self) -> &str {
        "body"
    }

    fn locate<'a>(&self, page: &'a Page) -> Option<Region<'a>> {
        static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
        if !page.has_body_tag() {
            return None;
        }
        page.doc().select(&BODY).next().map(|element| Region {
            element,
            pruning: Pruning::PageChrome,
        })
    }
}

/// The whole document. Always matches.
pub struct WholeDocument;

impl RegionMatcher for WholeDocument {
    fn label(&self) -> &str {
        "document"
    }

    fn locate<'a>(&self, page: &'a Page) -> Option<Region<'a>> {
        Some(Region {
            element: page.doc().root_element(),
            pruning: Pruning::Noise,
        })
    }
}

/// Ordered matchers; the first one that finds something wins.
pub struct SectionChain {
    name: String,
    matchers: Vec<Box<dyn RegionMatcher>>,
}

impl SectionChain {
    pub fn new(name: &str) -> Self {
        SectionChain {
            name: name.to_string(),
            matchers: Vec::new(),
        }
    }

    pub fn with(mut self, matcher: impl RegionMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn with_css(mut self, selectors: &[&str]) -> Result<Self, LocatorError> {
        for css in selectors {
            self.matchers.push(Box::new(CssMatcher::new(css)?));
        }
        Ok(self)
    }

    pub fn navbar() -> Result<Self, LocatorError> {
        SectionChain::new("navbar").with_css(NAVBAR_SELECTORS)
    }

    pub fn footer() -> Result<Self, LocatorError> {
        SectionChain::new("footer").with_css(FOOTER_SELECTORS)
    }

    pub fn main_content() -> Result<Self, LocatorError> {
        Ok(SectionChain::new("main")
            .with_css(MAIN_SELECTORS)?
            .with(BodyWithoutChrome)
            .with(WholeDocument))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locate<'a>(&self, page: &'a Page) -> Option<Region<'a>> {
        self.matchers.iter().find_map(|m| {
            let region = m.locate(page)?;
            tracing::trace!("{} chain matched {}", self.name, m.label());
            Some(region)
        })
    }

    /// Cleaned text of the winning region, or "" when nothing matched.
    pub fn text(&self, page: &Page) -> String {
        self.locate(page).map(|r| r.text()).unwrap_or_default()
    }

    pub fn outer_html(&self, page: &Page) -> Option<String> {
        self.locate(page).map(|r| r.html())
    }
}

/// The three chains used across the pipeline.
pub struct Locators {
    pub navbar: SectionChain,
    pub footer: SectionChain,
    pub main: SectionChain,
}

impl Locators {
    pub fn build() -> Result<Self, LocatorError> {
        Ok(Locators {
            navbar: SectionChain::navbar()?,
            footer: SectionChain::footer()?,
            main: SectionChain::main_content()?,
        })
    }

    /// Built-in chains; the selectors are constants, so building cannot fail.
    pub fn standard() -> &'static Locators {
        static STANDARD: LazyLock<Locators> =
            LazyLock::new(|| Locators::build().expect("built-in selectors parse"));
        &STANDARD
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Page {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Page::parse(&html)
    }

    #[test]
    fn nav_element_beats_navbar_class() {
        let doc = Page::parse(
            "<body><div class=\"navbar\">Class menu</div><nav>Semantic menu</nav></body>",
        );
        assert_eq!(Locators::standard().navbar.text(&doc), "Semantic menu");
    }

    #[test]
    fn navbar_falls_through_to_header() {
        let doc = Page::parse("<body><header>Brand <a>Docs</a></header><p>x</p></body>");
        assert_eq!(Locators::standard().navbar.text(&doc), "Brand Docs");
    }

    #[test]
    fn role_navigation_matches() {
        let doc = Page::parse("<body><div role=\"navigation\">Roles</div></body>");
        assert_eq!(Locators::standard().navbar.text(&doc), "Roles");
    }

    #[test]
    fn footer_chain_order() {
        let doc = Page::parse(
            "<body><div id=\"footer\">by id</div><div class=\"site-footer\">by class</div></body>",
        );
        assert_eq!(Locators::standard().footer.text(&doc), "by class");

        let doc = Page::parse("<body><div role=\"contentinfo\">info</div><footer>real</footer></body>");
        assert_eq!(Locators::standard().footer.text(&doc), "real");
    }

    #[test]
    fn unmatched_chain_is_empty() {
        let doc = Page::parse("<body><p>Only prose</p></body>");
        assert_eq!(Locators::standard().navbar.text(&doc), "");
        assert_eq!(Locators::standard().footer.text(&doc), "");
        assert!(Locators::standard().footer.outer_html(&doc).is_none());
    }

    #[test]
    fn main_prefers_explicit_markers() {
        let doc = Page::parse(
            "<body><nav>Menu</nav><div id=\"content\">Secondary</div><main>Primary</main></body>",
        );
        assert_eq!(Locators::standard().main.text(&doc), "Primary");
    }

    #[test]
    fn main_falls_back_to_pruned_body() {
        let doc = Page::parse(
            "<body><header>Top</header><nav>Menu</nav><aside class=\"sidebar\">Ads</aside>\
             <section><h1>Welcome</h1> <p>Hello   there</p></section><footer>Foot</footer></body>",
        );
        assert_eq!(Locators::standard().main.text(&doc), "Welcome Hello there");
    }

    #[test]
    fn bodyless_document_keeps_all_text() {
        let doc = Page::parse("<nav>Menu</nav>\n<p>Text</p>\n<footer>Foot</footer>");
        assert!(BodyWithoutChrome.locate(&doc).is_none());
        assert_eq!(Locators::standard().main.text(&doc), "Menu Text Foot");
    }

    #[test]
    fn injected_matcher_runs_in_order() {
        let chain = SectionChain::new("custom")
            .with_css(&[".hero"])
            .unwrap()
            .with(WholeDocument);
        let doc = Page::parse("<body><div class=\"hero\">Big</div><p>rest</p></body>");
        assert_eq!(chain.text(&doc), "Big");
        let doc = Page::parse("<body><p>rest</p></body>");
        assert_eq!(chain.text(&doc), "rest");
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(matches!(
            CssMatcher::new("div[[["),
            Err(LocatorError::Selector { .. })
        ));
    }

    #[test]
    fn homepage_fixture_sections() {
        let doc = fixture("homepage");
        let loc = Locators::standard();
        let nav = loc.navbar.text(&doc);
        assert!(nav.contains("Products"));
        assert!(!nav.contains("analytics"), "script leaked: {}", nav);
        assert!(loc.footer.text(&doc).contains("Acme Cloud Inc."));
        let main = loc.main.text(&doc);
        assert!(main.starts_with("Ship faster"));
        assert!(!main.contains("Products"));
        assert!(loc.navbar.outer_html(&doc).unwrap().starts_with("<nav"));
    }
}
