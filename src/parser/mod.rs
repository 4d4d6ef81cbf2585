pub mod sections;
pub mod text;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

pub use sections::{Locators, SectionChain};

static BODY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<body[\s>/]").unwrap());

/// A parsed document that remembers whether its source had a `<body>` tag.
/// html5ever always synthesizes one, so the tree alone cannot tell.
pub struct Page {
    doc: Html,
    body_tag: bool,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Page {
            doc: Html::parse_document(html),
            body_tag: BODY_TAG_RE.is_match(html),
        }
    }

    pub fn doc(&self) -> &Html {
        &self.doc
    }

    pub fn has_body_tag(&self) -> bool {
        self.body_tag
    }
}

/// Parse `html` and return the cleaned text of the region `chain` picks.
pub fn locate_text(html: &str, chain: &SectionChain) -> String {
    chain.text(&Page::parse(html))
}

// ── Tests ──
