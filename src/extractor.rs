use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::StageContext;
use crate::crawler::progress::{
    find_by_domain, internal_page_file, CrawlProgress, ProgressMap, CASE_STUDY_FILE, FOOTER_FILE,
    HOMEPAGE_FILE, NAVBAR_FILE,
};
use crate::parser::{locate_text, Locators, SectionChain};
use crate::snapshot;
use crate::utils::{is_case_study_url, now_iso};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub navbar_length: usize,
    pub homepage_length: usize,
    pub footer_length: usize,
    pub case_study_length: usize,
    pub total_files: usize,
}

/// Text pulled from one domain's raw files. Missing sections are "".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainExtraction {
    pub domain: String,
    pub processed_time: String,
    pub navbar: String,
    pub homepage: String,
    pub footer: String,
    pub case_study: String,
    pub files_processed: Vec<String>,
    pub stats: ExtractionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainExtraction {
    fn new(domain: &str) -> Self {
        DomainExtraction {
            domain: domain.to_string(),
            processed_time: now_iso(),
            ..Default::default()
        }
    }

    fn compute_stats(&mut self) {
        self.stats = ExtractionStats {
            navbar_length: self.navbar.chars().count(),
            homepage_length: self.homepage.chars().count(),
            footer_length: self.footer.chars().count(),
            case_study_length: self.case_study.chars().count(),
            total_files: self.files_processed.len(),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub total_domains: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSnapshot {
    pub extraction_time: String,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainExtraction>,
    #[serde(default)]
    pub summary: ExtractionSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DomainExtractor<'a> {
    locators: &'a Locators,
}

impl<'a> DomainExtractor<'a> {
    pub fn new(locators: &'a Locators) -> Self {
        DomainExtractor { locators }
    }

    /// Extract every domain directory under `raw_dir`, in name order.
    /// A failure while listing the directory is recorded on the snapshot,
    /// which is still returned for saving.
    pub fn extract_all(
        &self,
        raw_dir: &Path,
        progress: &ProgressMap,
        pb: &ProgressBar,
    ) -> ExtractionSnapshot {
        let mut out = ExtractionSnapshot {
            extraction_time: now_iso(),
            ..Default::default()
        };

        let dirs = match domain_dirs(raw_dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Unexpected error listing {}: {}", raw_dir.display(), e);
                out.error = Some(e.to_string());
                return out;
            }
        };
        pb.set_length(dirs.len() as u64);

        for (domain, dir) in dirs {
            pb.set_message(domain.clone());
            let entry = find_by_domain(progress, &domain).map(|(_, p)| p);
            let extraction = self.extract_domain(&dir, &domain, entry);

            out.summary.total_domains += 1;
            if extraction.error.is_none() {
                out.summary.successful_extractions += 1;
            } else {
                out.summary.failed_extractions += 1;
            }
            out.domains.insert(domain, extraction);
            pb.inc(1);
        }
        pb.finish_and_clear();
        out
    }

    /// One record per domain, always. An I/O failure keeps whatever was
    /// read before it and is recorded in `error`.
    pub fn extract_domain(
        &self,
        dir: &Path,
        domain: &str,
        entry: Option<&CrawlProgress>,
    ) -> DomainExtraction {
        info!("Processing domain: {}", domain);
        let mut out = DomainExtraction::new(domain);
        if let Err(e) = self.fill(dir, domain, entry, &mut out) {
            error!("Error processing domain {}: {:#}", domain, e);
            out.error = Some(format!("{:#}", e));
        }
        out.compute_stats();
        out
    }

    fn fill(
        &self,
        dir: &Path,
        domain: &str,
        entry: Option<&CrawlProgress>,
        out: &mut DomainExtraction,
    ) -> Result<()> {
        let loc = self.locators;
        for (file, chain) in [
            (NAVBAR_FILE, &loc.navbar),
            (FOOTER_FILE, &loc.footer),
            (HOMEPAGE_FILE, &loc.main),
        ] {
            match read_section(&dir.join(file), chain)? {
                Some(text) => {
                    let field = match file {
                        NAVBAR_FILE => &mut out.navbar,
                        FOOTER_FILE => &mut out.footer,
                        _ => &mut out.homepage,
                    };
                    *field = text;
                    out.files_processed.push(file.to_string());
                    info!("Extracted {} from {} for {}", chain.name(), file, domain);
                }
                None => info!("File {} not found for {}", file, domain),
            }
        }

        if let Some(text) = read_section(&dir.join(CASE_STUDY_FILE), &loc.main)? {
            out.case_study = text;
            out.files_processed.push(CASE_STUDY_FILE.to_string());
            info!("Extracted case study from {} for {}", CASE_STUDY_FILE, domain);
            return Ok(());
        }

        let Some(entry) = entry else {
            return Ok(());
        };
        for (index, page) in entry.internal_pages() {
            if !is_case_study_url(&page.url) {
                continue;
            }
            let file = internal_page_file(index);
            if let Some(text) = read_section(&dir.join(&file), &loc.main)? {
                out.case_study = text;
                out.files_processed.push(file);
                info!("Found case study in internal page {} for {}", index, domain);
                break;
            }
        }
        Ok(())
    }
}

/// Run `chain` over a stored document. `None` when the file does not exist.
fn read_section(path: &Path, chain: &SectionChain) -> Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let html = String::from_utf8_lossy(&bytes);
    let text = locate_text(&html, chain);
    debug!("{}: {} chars via {} chain", path.display(), text.chars().count(), chain.name());
    Ok(Some(text))
}

fn domain_dirs(raw_dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(raw_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Extract every domain under `raw_dir` with the built-in section chains.
pub fn extract_domains(raw_dir: &Path, progress: &ProgressMap, pb: &ProgressBar) -> ExtractionSnapshot {
    DomainExtractor::new(Locators::standard()).extract_all(raw_dir, progress, pb)
}

/// Extraction stage: raw HTML under `raw/` -> `processed/extracted.json`.
pub fn run(ctx: &StageContext) -> Result<ExtractionSnapshot> {
    info!("Starting text extraction from raw HTML files...");
    let paths = &ctx.paths;
    if !paths.raw_dir.is_dir() {
        bail!("Raw data directory not found: {}", paths.raw_dir.display());
    }

    let progress: ProgressMap = snapshot::load_or_default(&paths.metadata);
    let pb = ctx.progress_bar(0);
    let extracted = extract_domains(&paths.raw_dir, &progress, &pb);

    if let Some(e) = &extracted.error {
        warn!("Saving partial extraction results: {}", e);
    }
    snapshot::save(&paths.extracted, &extracted).context("Failed to save extraction results")?;

    let summary = &extracted.summary;
    info!("Extraction completed: {} domains", summary.total_domains);
    info!(
        "Successful: {}, failed: {}",
        summary.successful_extractions, summary.failed_extractions
    );
    info!("Results saved to: {}", paths.extracted.display());
    Ok(extracted)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::crawler::progress::{PageEntry, Site};

    fn extract(raw_dir: &Path, progress: &ProgressMap) -> ExtractionSnapshot {
        extract_domains(raw_dir, progress, &ProgressBar::hidden())
    }

    fn write(dir: &Path, file: &str, html: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(file), html).unwrap();
    }

    fn fixture(name: &str) -> String {
        fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn progress_with_internal(url: &str, internal: &[&str]) -> ProgressMap {
        let mut record = CrawlProgress::begin(&Site::new(url));
        for (i, page_url) in internal.iter().enumerate() {
            record.pages.insert(
                format!("internal_{}", i + 1),
                PageEntry {
                    url: page_url.to_string(),
                    http_status: 200,
                    file_path: None,
                    content_length: 0,
                },
            );
        }
        ProgressMap::from([(url.to_string(), record)])
    }

    #[test]
    fn extracts_every_section() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("acme.test");
        write(&dir, HOMEPAGE_FILE, &fixture("homepage"));
        write(&dir, NAVBAR_FILE, "<nav class=\"navbar\"><a href=\"/\">Home</a> <a>Pricing</a></nav>");
        write(&dir, FOOTER_FILE, "<footer>© 2024 Acme Cloud Inc.</footer>");
        write(&dir, CASE_STUDY_FILE, &fixture("case_study"));

        let out = extract(tmp.path(), &ProgressMap::new());
        assert_eq!(out.summary.total_domains, 1);
        assert_eq!(out.summary.successful_extractions, 1);

        let acme = &out.domains["acme.test"];
        assert_eq!(acme.navbar, "Home Pricing");
        assert_eq!(acme.footer, "© 2024 Acme Cloud Inc.");
        assert!(acme.homepage.starts_with("Ship faster"));
        assert!(acme.case_study.contains("Globex moved 400 services"));
        assert!(!acme.case_study.contains("Related stories"));
        assert_eq!(
            acme.files_processed,
            vec![NAVBAR_FILE, FOOTER_FILE, HOMEPAGE_FILE, CASE_STUDY_FILE]
        );
        assert_eq!(acme.stats.footer_length, "© 2024 Acme Cloud Inc.".chars().count());
        assert_eq!(acme.stats.total_files, 4);
        assert!(acme.error.is_none());
    }

    #[test]
    fn case_study_falls_back_to_matching_internal_page() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("acme.test");
        write(&dir, "internal_page_1.html", "<main>About us</main>");
        write(&dir, "internal_page_2.html", &fixture("case_study"));
        let progress = progress_with_internal(
            "https://www.acme.test",
            &["https://www.acme.test/about", "https://www.acme.test/customers/globex"],
        );

        let out = extract(tmp.path(), &progress);
        let acme = &out.domains["acme.test"];
        assert!(acme.case_study.starts_with("How Globex cut deploy times"));
        assert_eq!(acme.files_processed, vec!["internal_page_2.html"]);
    }

    #[test]
    fn missing_files_default_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty.test")).unwrap();
        // stray files next to domain directories are not domains
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let out = extract(tmp.path(), &ProgressMap::new());
        assert_eq!(out.summary.total_domains, 1);
        let empty = &out.domains["empty.test"];
        assert_eq!(empty.navbar, "");
        assert_eq!(empty.case_study, "");
        assert!(empty.files_processed.is_empty());
        assert_eq!(empty.stats, ExtractionStats::default());
        assert!(empty.error.is_none());
    }

    #[test]
    fn io_error_is_recorded_and_domain_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("broken.test");
        write(&dir, NAVBAR_FILE, "<nav>Menu</nav>");
        fs::create_dir_all(dir.join(HOMEPAGE_FILE)).unwrap();
        write(&tmp.path().join("fine.test"), FOOTER_FILE, "<footer>ok</footer>");

        let out = extract(tmp.path(), &ProgressMap::new());
        assert_eq!(out.summary.total_domains, 2);
        assert_eq!(out.summary.successful_extractions, 1);
        assert_eq!(out.summary.failed_extractions, 1);

        let broken = &out.domains["broken.test"];
        assert_eq!(broken.navbar, "Menu");
        assert!(broken.error.as_deref().unwrap().contains(HOMEPAGE_FILE));
        assert_eq!(broken.stats.navbar_length, 4);
        assert_eq!(out.domains["fine.test"].footer, "ok");
    }

    #[test]
    fn domains_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zeta.test", "alpha.test", "mid.test"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        let out = extract(tmp.path(), &ProgressMap::new());
        let names: Vec<&str> = out.domains.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["alpha.test", "mid.test", "zeta.test"]);
    }

    #[test]
    fn missing_raw_dir_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            data_dir: tmp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let ctx = StageContext::new(config, false);
        assert!(run(&ctx).is_err());
        assert!(!ctx.paths.extracted.exists());
    }

    #[test]
    fn run_writes_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            data_dir: tmp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let ctx = StageContext::new(config, false);
        write(&ctx.paths.raw_dir.join("acme.test"), FOOTER_FILE, "<footer>Acme</footer>");
        fs::write(&ctx.paths.metadata, "not json").unwrap();

        run(&ctx).unwrap();
        let saved: ExtractionSnapshot = snapshot::load(&ctx.paths.extracted).unwrap();
        assert_eq!(saved.domains["acme.test"].footer, "Acme");
        // the crawler's snapshot is only read here, never rewritten
        assert_eq!(fs::read_to_string(&ctx.paths.metadata).unwrap(), "not json");
    }
}
