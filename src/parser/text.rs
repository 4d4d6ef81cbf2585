use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Node};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static CHROME_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)nav|footer|sidebar").unwrap());

const NOISE_TAGS: &[&str] = &["script", "style", "noscript"];
const CHROME_TAGS: &[&str] = &["nav", "header", "footer"];

/// Which descendants are dropped before reading a region's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pruning {
    /// script/style/noscript only.
    Noise,
    /// Noise plus nav/header/footer and anything classed like nav, footer or sidebar.
    PageChrome,
}

impl Pruning {
    pub fn drops(self, element: &Element) -> bool {
        let name = element.name();
        if NOISE_TAGS.contains(&name) {
            return true;
        }
        match self {
            Pruning::Noise => false,
            Pruning::PageChrome => {
                CHROME_TAGS.contains(&name)
                    || element.classes().any(|c| CHROME_CLASS_RE.is_match(c))
            }
        }
    }
}

/// Collapse every whitespace run (CR, LF, tabs included) to one space and trim.
pub fn clean_text(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), " ").trim().to_string()
}

/// Cleaned text of `root`, skipping comments and pruned descendants.
/// The root itself is never pruned.
pub fn element_text(root: ElementRef<'_>, pruning: Pruning) -> String {
    let mut out = String::new();
    collect_text(root, pruning, &mut out);
    clean_text(&out)
}

fn collect_text(element: ElementRef<'_>, pruning: Pruning, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) => {
                if pruning.drops(inner) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, pruning, out);
                }
            }
            // comments, doctypes, processing instructions
            _ => {}
        }
    }
}

// ── Tests ──
