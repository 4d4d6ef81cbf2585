use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::snapshot::{self, SnapshotError};
use crate::utils::{domain_of, iso_timestamp};

pub const HOMEPAGE_FILE: &str = "homepage.html";
pub const NAVBAR_FILE: &str = "navbar.html";
pub const FOOTER_FILE: &str = "footer.html";
pub const CASE_STUDY_FILE: &str = "case_study.html";

pub fn internal_page_file(index: usize) -> String {
    format!("internal_page_{}.html", index)
}

/// A target website and its join key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub url: String,
    pub domain: String,
}

impl Site {
    pub fn new(url: &str) -> Self {
        Site {
            url: url.to_string(),
            domain: domain_of(url),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    #[default]
    NotStarted,
    Failed,
    Completed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::NotStarted => "not_started",
            CrawlStatus::Failed => "failed",
            CrawlStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEntry {
    pub url: String,
    pub http_status: u16,
    pub file_path: Option<String>,
    pub content_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub file_path: Option<String>,
    pub content_length: usize,
}

/// Per-site crawl record, keyed by the site URL in the progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub url: String,
    pub domain: String,
    pub crawl_time: String,
    pub timestamp: f64,
    pub status: CrawlStatus,
    #[serde(default)]
    pub pages: BTreeMap<String, PageEntry>,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_crawled: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components_extracted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type ProgressMap = BTreeMap<String, CrawlProgress>;

impl CrawlProgress {
    pub fn begin(site: &Site) -> Self {
        let now = Utc::now();
        CrawlProgress {
            url: site.url.clone(),
            domain: site.domain.clone(),
            crawl_time: iso_timestamp(now),
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            status: CrawlStatus::NotStarted,
            pages: BTreeMap::new(),
            components: BTreeMap::new(),
            pages_crawled: None,
            components_extracted: None,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CrawlStatus::Completed
    }

    /// `internal_N` pages with their index, in index order.
    pub fn internal_pages(&self) -> Vec<(usize, &PageEntry)> {
        let mut pages: Vec<(usize, &PageEntry)> = self
            .pages
            .iter()
            .filter_map(|(key, page)| {
                let index = key.strip_prefix("internal_")?.parse().ok()?;
                Some((index, page))
            })
            .collect();
        pages.sort_by_key(|(index, _)| *index);
        pages
    }
}

/// Reverse lookup: the earliest-crawled site recorded for `domain`.
/// Sites crawled at the same instant fall back to URL order.
pub fn find_by_domain<'a>(
    progress: &'a ProgressMap,
    domain: &str,
) -> Option<(&'a String, &'a CrawlProgress)> {
    progress
        .iter()
        .filter(|(_, p)| p.domain == domain)
        .min_by(|(_, a), (_, b)| a.timestamp.total_cmp(&b.timestamp))
}

/// Load the crawler's own snapshot. A missing file starts an empty map; an
/// unreadable one is moved aside to `.bak` so the crawl can start fresh.
pub fn load_progress(path: &Path) -> ProgressMap {
    match snapshot::load(path) {
        Ok(map) => map,
        Err(SnapshotError::Missing(_)) => ProgressMap::new(),
        Err(e) => {
            error!("Error loading progress: {}. Starting fresh.", e);
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bak");
            if let Err(e) = fs::rename(path, &backup) {
                warn!("Could not move unreadable progress file aside: {}", e);
            }
            ProgressMap::new()
        }
    }
}

/// Rewrite the whole progress snapshot. Failures are logged, not raised,
/// so one bad write never stops the crawl.
pub fn save_progress(path: &Path, progress: &ProgressMap) -> bool {
    match snapshot::save(path, progress) {
        Ok(()) => {
            info!("Progress saved ({} sites)", progress.len());
            true
        }
        Err(e) => {
            error!("Failed to save progress: {}", e);
            false
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, status: CrawlStatus) -> CrawlProgress {
        let mut p = CrawlProgress::begin(&Site::new(url));
        p.status = status;
        p
    }

    #[test]
    fn site_domain() {
        let site = Site::new("https://www.python.org");
        assert_eq!(site.domain, "python.org");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CrawlStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
    }

    #[test]
    fn internal_pages_in_numeric_order() {
        let mut p = record("https://a.test", CrawlStatus::Completed);
        for i in [10, 2, 1] {
            p.pages.insert(
                format!("internal_{}", i),
                PageEntry {
                    url: format!("https://a.test/{}", i),
                    http_status: 200,
                    file_path: None,
                    content_length: 1,
                },
            );
        }
        p.pages.insert(
            "homepage".into(),
            PageEntry {
                url: "https://a.test".into(),
                http_status: 200,
                file_path: None,
                content_length: 1,
            },
        );
        let order: Vec<usize> = p.internal_pages().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn reverse_lookup_by_domain() {
        let mut map = ProgressMap::new();
        map.insert("https://www.a.test".into(), record("https://www.a.test", CrawlStatus::Completed));
        map.insert("https://b.test".into(), record("https://b.test", CrawlStatus::Failed));
        let (url, _) = find_by_domain(&map, "a.test").unwrap();
        assert_eq!(url, "https://www.a.test");
        assert!(find_by_domain(&map, "c.test").is_none());
    }

    #[test]
    fn shared_domain_resolves_to_first_crawled() {
        let mut map = ProgressMap::new();
        let mut later = record("https://a.test", CrawlStatus::Completed);
        later.timestamp = 200.0;
        let mut earlier = record("https://www.a.test", CrawlStatus::Completed);
        earlier.timestamp = 100.0;
        map.insert(later.url.clone(), later);
        map.insert(earlier.url.clone(), earlier);

        let (url, _) = find_by_domain(&map, "a.test").unwrap();
        assert_eq!(url, "https://www.a.test");
    }

    #[test]
    fn roundtrip_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut map = ProgressMap::new();
        map.insert("https://a.test".into(), record("https://a.test", CrawlStatus::Completed));
        assert!(save_progress(&path, &map));
        let first = fs::read(&path).unwrap();

        let loaded = load_progress(&path);
        assert_eq!(loaded, map);
        assert!(save_progress(&path, &loaded));
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn malformed_progress_moves_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(load_progress(&path).is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("metadata.json.bak").exists());
    }
}
