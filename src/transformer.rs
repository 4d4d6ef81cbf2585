use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::StageContext;
use crate::crawler::progress::{find_by_domain, ProgressMap};
use crate::extractor::{DomainExtraction, ExtractionSnapshot};
use crate::snapshot;
use crate::utils::now_iso;

const REQUIRED_FIELDS: &[&str] = &["website", "section", "content", "crawl_timestamp", "isActive"];

/// The four content categories every domain is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Navbar,
    Homepage,
    Footer,
    CaseStudy,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Navbar,
        Section::Homepage,
        Section::Footer,
        Section::CaseStudy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Navbar => "navbar",
            Section::Homepage => "homepage",
            Section::Footer => "footer",
            Section::CaseStudy => "case_study",
        }
    }

    fn content_of<'a>(&self, extraction: &'a DomainExtraction) -> &'a str {
        match self {
            Section::Navbar => &extraction.navbar,
            Section::Homepage => &extraction.homepage,
            Section::Footer => &extraction.footer,
            Section::CaseStudy => &extraction.case_study,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| RecordError::InvalidSection(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid section: {0}")]
    InvalidSection(String),
    #[error("isActive must be boolean, got: {0}")]
    NonBooleanActive(String),
    #[error("record is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRecord {
    pub website: String,
    pub section: Section,
    pub content: String,
    pub crawl_timestamp: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub total_domains: usize,
    pub total_records: usize,
    pub records_by_section: BTreeMap<Section, usize>,
    pub domains_processed: Vec<String>,
    pub validation_errors: usize,
}

impl Default for TransformSummary {
    fn default() -> Self {
        TransformSummary {
            total_domains: 0,
            total_records: 0,
            records_by_section: Section::ALL.into_iter().map(|s| (s, 0)).collect(),
            domains_processed: Vec::new(),
            validation_errors: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardizedSnapshot {
    pub transformation_time: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub records: Vec<StandardizedRecord>,
    #[serde(default)]
    pub summary: TransformSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check a serialized record: every field present, a known section and a
/// real boolean `isActive`.
pub fn validate_record(record: &Value) -> Result<(), RecordError> {
    let obj = record.as_object().ok_or(RecordError::NotAnObject)?;
    for &field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(RecordError::MissingField(field));
        }
    }

    match &obj["section"] {
        Value::String(s) => {
            s.parse::<Section>()?;
        }
        other => return Err(RecordError::InvalidSection(other.to_string())),
    }

    let active = &obj["isActive"];
    if !active.is_boolean() {
        return Err(RecordError::NonBooleanActive(active.to_string()));
    }
    Ok(())
}

/// Site URL for `domain`: the crawled URL if the progress map knows it,
/// otherwise a synthesized `https://www.` address.
pub fn resolve_website(domain: &str, progress: &ProgressMap) -> String {
    if let Some((url, _)) = find_by_domain(progress, domain) {
        return url.clone();
    }
    if domain.is_empty() {
        String::new()
    } else if domain.starts_with("www.") {
        format!("https://{}", domain)
    } else {
        format!("https://www.{}", domain)
    }
}

fn crawl_timestamp(domain: &str, progress: &ProgressMap) -> String {
    find_by_domain(progress, domain)
        .map(|(_, p)| p.crawl_time.clone())
        .unwrap_or_default()
}

/// Exactly four records for one domain, one per section, empty content kept.
pub fn domain_records(
    domain: &str,
    extraction: &DomainExtraction,
    progress: &ProgressMap,
) -> Vec<StandardizedRecord> {
    let website = resolve_website(domain, progress);
    let timestamp = crawl_timestamp(domain, progress);
    info!("Transforming domain: {} -> {}", domain, website);

    Section::ALL
        .into_iter()
        .map(|section| {
            let content = section.content_of(extraction).trim().to_string();
            if content.is_empty() {
                debug!("  {}: empty content", section);
            } else {
                debug!("  {}: {} characters", section, content.chars().count());
            }
            StandardizedRecord {
                website: website.clone(),
                section,
                content,
                crawl_timestamp: timestamp.clone(),
                is_active: true,
            }
        })
        .collect()
}

fn check(record: &StandardizedRecord) -> Result<(), RecordError> {
    let value = serde_json::to_value(record).map_err(|_| RecordError::NotAnObject)?;
    validate_record(&value)
}

/// Flatten an extraction snapshot into standardized records.
pub fn transform(extracted: &ExtractionSnapshot, progress: &ProgressMap) -> StandardizedSnapshot {
    let mut out = StandardizedSnapshot {
        transformation_time: now_iso(),
        ..Default::default()
    };
    out.summary.total_domains = extracted.domains.len();
    if let Some(e) = &extracted.error {
        out.error = Some(format!("extraction input is partial: {}", e));
    }

    for (domain, extraction) in &extracted.domains {
        for record in domain_records(domain, extraction, progress) {
            match check(&record) {
                Ok(()) => {
                    out.summary.total_records += 1;
                    *out.summary.records_by_section.entry(record.section).or_insert(0) += 1;
                    out.records.push(record);
                }
                Err(e) => {
                    error!("Validation failed for {} {}: {}", record.website, record.section, e);
                    out.summary.validation_errors += 1;
                }
            }
        }
        out.summary.domains_processed.push(domain.clone());
    }
    out
}

/// Transform stage: `processed/extracted.json` -> `processed/standardized.json`.
pub fn run(ctx: &StageContext) -> Result<StandardizedSnapshot> {
    info!("Starting data transformation to standardized format...");
    let paths = &ctx.paths;
    let extracted: ExtractionSnapshot =
        snapshot::load(&paths.extracted).context("Failed to load extracted data")?;
    let progress: ProgressMap = snapshot::load_or_default(&paths.metadata);

    let mut standardized = transform(&extracted, &progress);
    standardized.source_file = paths.extracted.display().to_string();
    snapshot::save(&paths.standardized, &standardized)
        .context("Failed to save standardized data")?;

    let summary = &standardized.summary;
    info!("Domains processed: {}", summary.total_domains);
    info!("Total records created: {}", summary.total_records);
    for (section, count) in &summary.records_by_section {
        info!("  {}: {}", section, count);
    }
    if summary.validation_errors > 0 {
        warn!("Validation errors: {}", summary.validation_errors);
    }
    for (i, record) in standardized.records.iter().take(3).enumerate() {
        info!(
            "  Record {}: {} - {} ({} chars)",
            i + 1,
            record.website,
            record.section,
            record.content.chars().count()
        );
    }
    info!("Results saved to: {}", paths.standardized.display());
    Ok(standardized)
}

// ── Tests ──
