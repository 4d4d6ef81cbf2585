use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_SITES: &[&str] = &[
    "https://www.python.org",
    "https://www.apache.org",
    "https://www.mozilla.org",
    "https://www.linux.org",
    "https://www.nginx.com",
    "https://www.github.com",
    "https://www.stackoverflow.com",
    "https://www.docker.com",
];

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Tunables for every stage. Loaded from defaults, an optional TOML file and
/// `PIPELINE_*` environment variables, in that order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sites: Vec<String>,
    pub request_timeout_secs: u64,
    pub crawl_delay_secs: f64,
    pub site_delay_secs: f64,
    pub max_internal_links: usize,
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub quality: QualityThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sites: DEFAULT_SITES.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 10,
            crawl_delay_secs: 1.0,
            site_delay_secs: 2.0,
            max_internal_links: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_dir: PathBuf::from("data"),
            quality: QualityThresholds::default(),
        }
    }
}

/// Advisory data-quality thresholds reported next to the metrics.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_websites: usize,
    pub min_fill_rate: f64,
    pub max_empty_case_study_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        QualityThresholds {
            min_websites: 5,
            min_fill_rate: 70.0,
            max_empty_case_study_ratio: 0.8,
        }
    }
}

impl PipelineConfig {
    /// Layer the optional config file and the environment over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("PIPELINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sites"),
            )
            .build()
            .context("Failed to read pipeline configuration")?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .context("Invalid pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, secs) in [
            ("crawl_delay_secs", self.crawl_delay_secs),
            ("site_delay_secs", self.site_delay_secs),
        ] {
            if !secs.is_finite() || Duration::try_from_secs_f64(secs.max(0.0)).is_err() {
                bail!("{} must be a finite number of seconds, got {}", key, secs);
            }
        }
        Ok(())
    }
}

/// Where each stage reads and writes its snapshot.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub metadata: PathBuf,
    pub raw_dir: PathBuf,
    pub extracted: PathBuf,
    pub standardized: PathBuf,
    pub metrics: PathBuf,
}

impl DataPaths {
    pub fn new(root: &Path) -> Self {
        DataPaths {
            metadata: root.join("metadata.json"),
            raw_dir: root.join("raw"),
            extracted: root.join("processed").join("extracted.json"),
            standardized: root.join("processed").join("standardized.json"),
            metrics: root.join("aggregated").join("metrics.json"),
        }
    }
}

/// Everything a stage needs, passed in explicitly instead of living in globals.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub config: PipelineConfig,
    pub paths: DataPaths,
    pub show_progress: bool,
}

impl StageContext {
    pub fn new(config: PipelineConfig, show_progress: bool) -> Self {
        let paths = DataPaths::new(&config.data_dir);
        StageContext {
            config,
            paths,
            show_progress,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_secs_f64(self.config.crawl_delay_secs.max(0.0))
    }

    pub fn site_delay(&self) -> Duration {
        Duration::from_secs_f64(self.config.site_delay_secs.max(0.0))
    }

    pub fn progress_bar(&self, len: usize) -> indicatif::ProgressBar {
        if !self.show_progress {
            return indicatif::ProgressBar::hidden();
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

// ── Tests ──
