pub mod client;
pub mod links;
pub mod progress;

use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::StageContext;
use crate::parser::{Locators, Page};
use client::PageClient;
use links::Link;
use progress::{
    internal_page_file, ComponentEntry, CrawlProgress, CrawlStatus, PageEntry, ProgressMap, Site,
    CASE_STUDY_FILE, FOOTER_FILE, HOMEPAGE_FILE, NAVBAR_FILE,
};

/// Where a single site's crawl has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlStage {
    Unvisited,
    HomepageFetched,
    ComponentsExtracted,
    CaseStudySearched,
    CaseStudyFetched,
    InternalLinksFetched,
    Completed,
    Failed,
}

fn advance(domain: &str, from: CrawlStage, to: CrawlStage) -> CrawlStage {
    debug!("{}: {:?} -> {:?}", domain, from, to);
    to
}

/// Crawl totals returned after completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total_sites: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pages: usize,
    pub components: usize,
    pub interrupted: bool,
}

/// Everything the crawler needs from a homepage, gathered up front.
struct HomepagePlan {
    navbar: Option<String>,
    footer: Option<String>,
    case_study: Option<Url>,
    links: Vec<Link>,
}

impl HomepagePlan {
    fn from_html(base: &Url, html: &str, locators: &Locators) -> Self {
        let page = Page::parse(html);
        let links = links::page_links(base, page.doc());
        HomepagePlan {
            navbar: locators.navbar.outer_html(&page),
            footer: locators.footer.outer_html(&page),
            case_study: links::find_case_study(base, &links),
            links,
        }
    }
}

pub struct Crawler<'a, C> {
    ctx: &'a StageContext,
    client: C,
    locators: &'a Locators,
}

impl<'a, C: PageClient> Crawler<'a, C> {
    pub fn new(ctx: &'a StageContext, client: C) -> Self {
        Crawler {
            ctx,
            client,
            locators: Locators::standard(),
        }
    }

    /// Crawl every configured site in order, rewriting the progress snapshot
    /// after each one. When `shutdown` resolves, the in-flight site is dropped
    /// and the snapshot is flushed before returning.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<CrawlSummary> {
        let paths = &self.ctx.paths;
        fs::create_dir_all(&paths.raw_dir)
            .with_context(|| format!("Failed to create {}", paths.raw_dir.display()))?;
        info!("Data directory ready at {}", paths.raw_dir.display());

        let mut progress = progress::load_progress(&paths.metadata);
        let sites = &self.ctx.config.sites;
        let mut summary = CrawlSummary {
            total_sites: sites.len(),
            ..Default::default()
        };

        let pb = self.ctx.progress_bar(sites.len());
        tokio::pin!(shutdown);

        for (i, url) in sites.iter().enumerate() {
            pb.set_message(url.clone());
            if progress.get(url).is_some_and(CrawlProgress::is_completed) {
                info!("Skipping {} - already crawled successfully", url);
                summary.skipped += 1;
                pb.inc(1);
                continue;
            }

            info!("Processing {}", url);
            let site = Site::new(url);
            let crawled = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                record = self.crawl_site(&site) => Some(record),
            };
            let Some(record) = crawled else {
                summary.interrupted = true;
                break;
            };

            progress.insert(url.clone(), record);
            progress::save_progress(&paths.metadata, &progress);
            pb.inc(1);

            if i + 1 < sites.len() {
                let interrupted = tokio::select! {
                    biased;
                    _ = &mut shutdown => true,
                    _ = pause(self.ctx.site_delay()) => false,
                };
                if interrupted {
                    summary.interrupted = true;
                    break;
                }
            }
        }
        pb.finish_and_clear();

        if summary.interrupted {
            warn!("Crawling interrupted, flushing progress");
        }
        progress::save_progress(&paths.metadata, &progress);

        tally(&mut summary, sites, &progress);
        info!(
            "Crawling completed! {}/{} websites successful",
            summary.completed, summary.total_sites
        );
        info!(
            "Total content extracted: {} pages, {} components",
            summary.pages, summary.components
        );
        Ok(summary)
    }

    async fn crawl_site(&self, site: &Site) -> CrawlProgress {
        let mut record = CrawlProgress::begin(site);
        let domain = site.domain.as_str();
        let mut stage = CrawlStage::Unvisited;

        let base = match Url::parse(&site.url) {
            Ok(url) => url,
            Err(e) => {
                return fail(record, stage, format!("invalid site URL {}: {}", site.url, e));
            }
        };

        let homepage = match self.client.get(&site.url).await {
            Ok(page) => page,
            Err(e) => {
                error!("Failed to fetch homepage for {}", site.url);
                return fail(record, stage, e.to_string());
            }
        };

        let domain_dir = self.ctx.paths.raw_dir.join(domain);
        record.pages.insert(
            "homepage".into(),
            PageEntry {
                url: homepage.url.clone(),
                http_status: homepage.status,
                file_path: save_raw(&domain_dir, HOMEPAGE_FILE, &homepage.body),
                content_length: homepage.body.len(),
            },
        );
        stage = advance(domain, stage, CrawlStage::HomepageFetched);

        let plan = HomepagePlan::from_html(&base, &homepage.body, self.locators);
        for (name, file, html) in [
            ("navbar", NAVBAR_FILE, &plan.navbar),
            ("footer", FOOTER_FILE, &plan.footer),
        ] {
            match html {
                Some(html) => {
                    record.components.insert(
                        name.into(),
                        ComponentEntry {
                            file_path: save_raw(&domain_dir, file, html),
                            content_length: html.len(),
                        },
                    );
                    info!("Extracted {} for {}", name, domain);
                }
                None => warn!("No {} found for {}", name, domain),
            }
        }
        stage = advance(domain, stage, CrawlStage::ComponentsExtracted);
        stage = advance(domain, stage, CrawlStage::CaseStudySearched);

        let mut consumed = None;
        match &plan.case_study {
            Some(url) => {
                info!("Found case study URL for {}: {}", domain, url);
                pause(self.ctx.crawl_delay()).await;
                match self.client.get(url.as_str()).await {
                    Ok(page) => {
                        record.pages.insert(
                            "case_study".into(),
                            PageEntry {
                                url: page.url.clone(),
                                http_status: page.status,
                                file_path: save_raw(&domain_dir, CASE_STUDY_FILE, &page.body),
                                content_length: page.body.len(),
                            },
                        );
                        consumed = Some(url.clone());
                        stage = advance(domain, stage, CrawlStage::CaseStudyFetched);
                        info!("Successfully crawled case study for {}", domain);
                    }
                    Err(e) => warn!("Failed to fetch case study for {}: {}", domain, e),
                }
            }
            None => info!("No case study found for {}", domain),
        }

        let internal = links::internal_links(
            &base,
            &plan.links,
            self.ctx.config.max_internal_links,
            consumed.as_ref(),
        );
        info!("Found {} internal links for {}", internal.len(), domain);

        for (i, url) in internal.iter().enumerate() {
            let index = i + 1;
            pause(self.ctx.crawl_delay()).await;
            match self.client.get(url.as_str()).await {
                Ok(page) => {
                    record.pages.insert(
                        format!("internal_{}", index),
                        PageEntry {
                            url: page.url.clone(),
                            http_status: page.status,
                            file_path: save_raw(&domain_dir, &internal_page_file(index), &page.body),
                            content_length: page.body.len(),
                        },
                    );
                    info!("Successfully crawled internal page {} for {}", index, domain);
                }
                Err(e) => warn!("Failed to fetch internal link {} for {}: {}", index, domain, e),
            }
        }
        stage = advance(domain, stage, CrawlStage::InternalLinksFetched);

        record.status = CrawlStatus::Completed;
        record.pages_crawled = Some(record.pages.len());
        record.components_extracted = Some(record.components.len());
        advance(domain, stage, CrawlStage::Completed);
        info!(
            "Successfully completed crawling {} - {} pages, {} components",
            domain,
            record.pages.len(),
            record.components.len()
        );
        record
    }
}

/// Crawl with the configured sites and an interrupt future.
pub async fn run<C: PageClient>(
    ctx: &StageContext,
    client: C,
    shutdown: impl Future<Output = ()>,
) -> Result<CrawlSummary> {
    Crawler::new(ctx, client).run(shutdown).await
}

fn fail(mut record: CrawlProgress, stage: CrawlStage, reason: String) -> CrawlProgress {
    advance(&record.domain, stage, CrawlStage::Failed);
    error!("{} failed: {}", record.url, reason);
    record.status = CrawlStatus::Failed;
    record.error = Some(reason);
    record
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Write one raw document under the site's directory; returns its path.
fn save_raw(domain_dir: &Path, filename: &str, content: &str) -> Option<String> {
    let path = domain_dir.join(filename);
    let written = fs::create_dir_all(domain_dir).and_then(|_| fs::write(&path, content));
    match written {
        Ok(()) => {
            debug!("Saved {}", path.display());
            Some(path.to_string_lossy().into_owned())
        }
        Err(e) => {
            error!("Error saving {}: {}", path.display(), e);
            None
        }
    }
}

fn tally(summary: &mut CrawlSummary, sites: &[String], progress: &ProgressMap) {
    for record in sites.iter().filter_map(|url| progress.get(url)) {
        match record.status {
            CrawlStatus::Completed => summary.completed += 1,
            CrawlStatus::Failed => summary.failed += 1,
            CrawlStatus::NotStarted => {}
        }
        summary.pages += record.pages_crawled.unwrap_or(0);
        summary.components += record.components_extracted.unwrap_or(0);
    }
}

// ── Tests ──
