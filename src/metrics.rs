use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{QualityThresholds, StageContext};
use crate::snapshot;
use crate::transformer::{Section, StandardizedRecord, StandardizedSnapshot, TransformSummary};
use crate::utils::{now_iso, percent, round2};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseStudyAnalysis {
    pub total_websites: usize,
    pub websites_with_case_studies: usize,
    pub websites_without_case_studies: usize,
    pub case_study_percentage: f64,
    pub average_case_study_length: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityAnalysis {
    pub total_websites: usize,
    pub active_websites: usize,
    pub inactive_websites: usize,
    pub active_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionLengths {
    pub average_length: f64,
    pub min_length: usize,
    pub max_length: usize,
    pub total_records: usize,
    pub non_empty_records: usize,
    pub empty_records: usize,
    pub non_empty_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlPeriod {
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub total_timestamps: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetrics {
    pub total_records: usize,
    pub unique_websites: usize,
    pub total_content_length: usize,
    pub average_content_length_overall: f64,
    pub non_empty_records: usize,
    pub empty_records: usize,
    pub content_fill_rate: f64,
    pub section_distribution: BTreeMap<Section, usize>,
    pub website_distribution: BTreeMap<String, usize>,
    pub crawl_period: CrawlPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub name: String,
    pub threshold: f64,
    pub observed: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub computation_time: String,
    pub source_file: String,
    pub input_summary: TransformSummary,
    pub case_study_analysis: CaseStudyAnalysis,
    pub activity_analysis: ActivityAnalysis,
    pub content_length_by_section: BTreeMap<Section, SectionLengths>,
    pub additional_metrics: CorpusMetrics,
    pub quality_checks: Vec<QualityCheck>,
    pub validation_passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn has_content(record: &StandardizedRecord) -> bool {
    !record.content.trim().is_empty()
}

fn length(record: &StandardizedRecord) -> usize {
    record.content.chars().count()
}

fn mean(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round2(total as f64 / count as f64)
    }
}

pub fn case_study_analysis(records: &[StandardizedRecord]) -> CaseStudyAnalysis {
    // website -> case-study length when it has non-empty content
    let mut websites: BTreeMap<&str, Option<usize>> = BTreeMap::new();
    for record in records {
        let slot = websites.entry(record.website.as_str()).or_default();
        if record.section == Section::CaseStudy {
            *slot = has_content(record).then(|| length(record));
        }
    }

    let lengths: Vec<usize> = websites.values().filter_map(|len| *len).collect();
    for (website, len) in &websites {
        match len {
            Some(len) => debug!("Website with case study: {} ({} chars)", website, len),
            None => debug!("Website without case study: {}", website),
        }
    }

    let total = websites.len();
    let with = lengths.len();
    let analysis = CaseStudyAnalysis {
        total_websites: total,
        websites_with_case_studies: with,
        websites_without_case_studies: total - with,
        case_study_percentage: percent(with, total),
        average_case_study_length: mean(lengths.iter().sum(), with),
    };
    info!(
        "Case study analysis: {}/{} websites have case studies ({:.1}%)",
        with, total, analysis.case_study_percentage
    );
    analysis
}

/// A website counts as active only when every one of its records is.
pub fn activity_analysis(records: &[StandardizedRecord]) -> ActivityAnalysis {
    let mut websites: BTreeMap<&str, bool> = BTreeMap::new();
    for record in records {
        let active = websites.entry(record.website.as_str()).or_insert(true);
        *active &= record.is_active;
    }

    let total = websites.len();
    let active = websites.values().filter(|a| **a).count();
    let analysis = ActivityAnalysis {
        total_websites: total,
        active_websites: active,
        inactive_websites: total - active,
        active_percentage: percent(active, total),
    };
    info!(
        "Activity analysis: {}/{} websites are active ({:.1}%)",
        active, total, analysis.active_percentage
    );
    analysis
}

/// Length statistics per section. All four sections are always present.
pub fn content_length_by_section(
    records: &[StandardizedRecord],
) -> BTreeMap<Section, SectionLengths> {
    let mut by_section: BTreeMap<Section, Vec<&StandardizedRecord>> =
        Section::ALL.into_iter().map(|s| (s, Vec::new())).collect();
    for record in records {
        by_section.entry(record.section).or_default().push(record);
    }

    by_section
        .into_iter()
        .map(|(section, group)| {
            let lengths: Vec<usize> = group.iter().map(|r| length(r)).collect();
            let non_empty = group.iter().filter(|r| has_content(r)).count();
            let stats = SectionLengths {
                average_length: mean(lengths.iter().sum(), lengths.len()),
                min_length: lengths.iter().copied().min().unwrap_or(0),
                max_length: lengths.iter().copied().max().unwrap_or(0),
                total_records: group.len(),
                non_empty_records: non_empty,
                empty_records: group.len() - non_empty,
                non_empty_percentage: percent(non_empty, group.len()),
            };
            if !group.is_empty() {
                info!(
                    "Section '{}': avg={:.1} chars, {}/{} non-empty",
                    section,
                    stats.average_length,
                    non_empty,
                    group.len()
                );
            }
            (section, stats)
        })
        .collect()
}

pub fn corpus_metrics(records: &[StandardizedRecord]) -> CorpusMetrics {
    let total = records.len();
    let total_length: usize = records.iter().map(length).sum();
    let non_empty = records.iter().filter(|r| has_content(r)).count();

    let mut section_distribution = BTreeMap::new();
    let mut website_distribution = BTreeMap::new();
    for record in records {
        *section_distribution.entry(record.section).or_insert(0) += 1;
        *website_distribution.entry(record.website.clone()).or_insert(0) += 1;
    }

    // ISO-8601 instants are fixed width, so string order is time order
    let timestamps: Vec<&str> = records
        .iter()
        .map(|r| r.crawl_timestamp.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    CorpusMetrics {
        total_records: total,
        unique_websites: website_distribution.len(),
        total_content_length: total_length,
        average_content_length_overall: mean(total_length, total),
        non_empty_records: non_empty,
        empty_records: total - non_empty,
        content_fill_rate: percent(non_empty, total),
        section_distribution,
        website_distribution,
        crawl_period: CrawlPeriod {
            earliest: timestamps.iter().min().map(|t| t.to_string()),
            latest: timestamps.iter().max().map(|t| t.to_string()),
            total_timestamps: timestamps.len(),
        },
    }
}

pub fn quality_checks(report: &MetricsReport, thresholds: &QualityThresholds) -> Vec<QualityCheck> {
    let websites = report.additional_metrics.unique_websites;
    let fill_rate = report.additional_metrics.content_fill_rate;
    let cs = &report.case_study_analysis;
    let empty_ratio = if cs.total_websites == 0 {
        0.0
    } else {
        round2(cs.websites_without_case_studies as f64 / cs.total_websites as f64)
    };

    vec![
        QualityCheck {
            name: "min_websites".into(),
            threshold: thresholds.min_websites as f64,
            observed: websites as f64,
            passed: websites >= thresholds.min_websites,
        },
        QualityCheck {
            name: "min_fill_rate".into(),
            threshold: thresholds.min_fill_rate,
            observed: fill_rate,
            passed: fill_rate >= thresholds.min_fill_rate,
        },
        QualityCheck {
            name: "max_empty_case_study_ratio".into(),
            threshold: thresholds.max_empty_case_study_ratio,
            observed: empty_ratio,
            passed: empty_ratio <= thresholds.max_empty_case_study_ratio,
        },
    ]
}

/// Internal consistency checks. Returns one message per violation.
pub fn validate_metrics(report: &MetricsReport) -> Vec<String> {
    let mut errors = Vec::new();

    let cs = &report.case_study_analysis;
    if cs.websites_with_case_studies + cs.websites_without_case_studies != cs.total_websites {
        errors.push("Case study totals don't match".to_string());
    }

    let activity = &report.activity_analysis;
    if activity.active_websites + activity.inactive_websites != activity.total_websites {
        errors.push("Activity totals don't match".to_string());
    }

    for section in Section::ALL {
        if !report.content_length_by_section.contains_key(&section) {
            errors.push(format!("Missing section metrics: {}", section));
        }
    }
    errors
}

/// Compute the full report. Validation failures are recorded, never raised.
pub fn aggregate(input: &StandardizedSnapshot, thresholds: &QualityThresholds) -> MetricsReport {
    let records = &input.records;
    if records.is_empty() {
        warn!("No records found in standardized data; reporting zeros");
    }
    info!("Processing {} records...", records.len());

    let mut report = MetricsReport {
        computation_time: now_iso(),
        source_file: String::new(),
        input_summary: input.summary.clone(),
        case_study_analysis: case_study_analysis(records),
        activity_analysis: activity_analysis(records),
        content_length_by_section: content_length_by_section(records),
        additional_metrics: corpus_metrics(records),
        error: input
            .error
            .as_ref()
            .map(|e| format!("standardized input is partial: {}", e)),
        ..Default::default()
    };
    report.quality_checks = quality_checks(&report, thresholds);

    report.validation_errors = validate_metrics(&report);
    report.validation_passed = report.validation_errors.is_empty();
    if report.validation_passed {
        info!("All metrics validation passed");
    } else {
        for e in &report.validation_errors {
            warn!("Validation error: {}", e);
        }
    }
    for check in report.quality_checks.iter().filter(|c| !c.passed) {
        warn!(
            "Quality check {} failed: observed {} against threshold {}",
            check.name, check.observed, check.threshold
        );
    }
    report
}

fn log_key_findings(report: &MetricsReport) {
    let cs = &report.case_study_analysis;
    let activity = &report.activity_analysis;
    let corpus = &report.additional_metrics;

    info!("=== KEY FINDINGS ===");
    info!("Total websites analyzed: {}", corpus.unique_websites);
    info!("Total records processed: {}", corpus.total_records);
    info!(
        "Websites with case studies: {}/{} ({}%)",
        cs.websites_with_case_studies, cs.total_websites, cs.case_study_percentage
    );
    info!(
        "Active websites: {}/{} ({}%)",
        activity.active_websites, activity.total_websites, activity.active_percentage
    );
    info!("Content fill rate: {}%", corpus.content_fill_rate);
    info!("Average content length by section:");
    for (section, stats) in &report.content_length_by_section {
        info!(
            "  {}: {} chars ({}% non-empty)",
            section, stats.average_length, stats.non_empty_percentage
        );
    }
}

/// Aggregation stage: `processed/standardized.json` -> `aggregated/metrics.json`.
pub fn run(ctx: &StageContext) -> Result<MetricsReport> {
    info!("Starting data aggregation and metrics computation...");
    let paths = &ctx.paths;
    let input: StandardizedSnapshot =
        snapshot::load(&paths.standardized).context("Failed to load standardized data")?;

    let mut report = aggregate(&input, &ctx.config.quality);
    report.source_file = paths.standardized.display().to_string();
    snapshot::save(&paths.metrics, &report).context("Failed to save metrics")?;
    info!("Results saved to: {}", paths.metrics.display());

    log_key_findings(&report);
    Ok(report)
}

// ── Tests ──
