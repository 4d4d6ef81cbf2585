use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::utils::{contains_case_study_keyword, url_domain};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const BINARY_EXTENSIONS: &[&str] = &[".pdf", ".jpg", ".png", ".gif", ".zip"];

/// An anchor from a fetched page, resolved against the page URL.
#[derive(Debug, Clone)]
pub struct Link {
    pub href: String,
    pub text: String,
    pub url: Url,
}

/// All `<a href>` links in document order. Fragments are dropped; hrefs that
/// do not resolve are skipped.
pub fn page_links(base: &Url, doc: &Html) -> Vec<Link> {
    doc.select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let mut url = base.join(&href).ok()?;
            url.set_fragment(None);
            Some(Link {
                text: a.text().collect::<String>().trim().to_lowercase(),
                href,
                url,
            })
        })
        .collect()
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn same_site(base: &Url, url: &Url) -> bool {
    is_web(url) && url_domain(url) == url_domain(base)
}

fn is_homepage(base: &Url, url: &Url) -> bool {
    let mut home = base.clone();
    home.set_fragment(None);
    *url == home
}

/// First same-site link whose href or text carries a case-study keyword.
pub fn find_case_study(base: &Url, links: &[Link]) -> Option<Url> {
    links
        .iter()
        .find(|link| {
            (contains_case_study_keyword(&link.href) || contains_case_study_keyword(&link.text))
                && same_site(base, &link.url)
                && !is_homepage(base, &link.url)
        })
        .map(|link| link.url.clone())
}

/// Up to `cap` distinct same-site pages worth fetching, first-seen order.
/// `consumed` is a URL already fetched by another step (the case study).
pub fn internal_links(base: &Url, links: &[Link], cap: usize, consumed: Option<&Url>) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    if cap == 0 {
        return picked;
    }

    for link in links {
        let url = &link.url;
        if !same_site(base, url) || url.path() == "/" || is_homepage(base, url) {
            continue;
        }
        let path = url.path().to_lowercase();
        if BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }
        if consumed == Some(url) || !seen.insert(url.as_str().to_string()) {
            continue;
        }
        picked.push(url.clone());
        if picked.len() >= cap {
            break;
        }
    }
    picked
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn links_of(html: &str) -> (Url, Vec<Link>) {
        let base = Url::parse("https://www.acme.test").unwrap();
        let links = page_links(&base, &Html::parse_document(html));
        (base, links)
    }

    fn paths(urls: &[Url]) -> Vec<&str> {
        urls.iter().map(|u| u.path()).collect()
    }

    const THREE_LINKS: &str = "<body><a href=\"/about\">About</a>\
        <a href=\"/customer-stories/acme\">Acme</a><a href=\"/contact\">Contact</a></body>";

    #[test]
    fn case_study_by_keyword() {
        let (base, links) = links_of(THREE_LINKS);
        let found = find_case_study(&base, &links).unwrap();
        assert_eq!(found.as_str(), "https://www.acme.test/customer-stories/acme");
    }

    #[test]
    fn internal_links_skip_consumed_case_study() {
        let (base, links) = links_of(THREE_LINKS);
        let case_study = find_case_study(&base, &links);
        let picked = internal_links(&base, &links, 2, case_study.as_ref());
        assert_eq!(paths(&picked), vec!["/about", "/contact"]);
    }

    #[test]
    fn internal_links_independent_without_consumption() {
        let (base, links) = links_of(THREE_LINKS);
        let picked = internal_links(&base, &links, 2, None);
        assert_eq!(paths(&picked), vec!["/about", "/customer-stories/acme"]);
    }

    #[test]
    fn case_study_by_link_text() {
        let (base, links) = links_of("<a href=\"/p/42\">Read the Success Story</a>");
        assert_eq!(find_case_study(&base, &links).unwrap().path(), "/p/42");
    }

    #[test]
    fn case_study_must_stay_on_site() {
        let (base, links) = links_of(
            "<a href=\"https://other.test/customers\">Customers</a>\
             <a href=\"mailto:case@acme.test\">Case</a>\
             <a href=\"https://acme.test/case-studies\">Cases</a>",
        );
        assert_eq!(
            find_case_study(&base, &links).unwrap().as_str(),
            "https://acme.test/case-studies"
        );
    }

    #[test]
    fn case_study_never_the_homepage() {
        let (base, links) = links_of("<a href=\"/#customers\">Customers</a>");
        assert!(find_case_study(&base, &links).is_none());
    }

    #[test]
    fn internal_link_filters() {
        let (base, links) = links_of(
            "<a href=\"/\">Home</a><a href=\"#top\">Top</a><a href=\"/brochure.PDF\">PDF</a>\
             <a href=\"/logo.png\">Logo</a><a href=\"https://cdn.other.test/x\">CDN</a>\
             <a href=\"/docs\">Docs</a><a href=\"/docs#install\">Install</a><a href=\"/blog\">Blog</a>\
             <a href=\"/jobs\">Jobs</a>",
        );
        let picked = internal_links(&base, &links, 2, None);
        assert_eq!(paths(&picked), vec!["/docs", "/blog"]);
        assert!(internal_links(&base, &links, 0, None).is_empty());
    }

    #[test]
    fn homepage_fixture_links() {
        let html = std::fs::read_to_string("tests/fixtures/homepage.html").unwrap();
        let (base, links) = links_of(&html);
        let case_study = find_case_study(&base, &links).unwrap();
        assert_eq!(case_study.path(), "/customers");
        let picked = internal_links(&base, &links, 2, Some(&case_study));
        assert_eq!(paths(&picked), vec!["/products", "/pricing"]);
    }
}
