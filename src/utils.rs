use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

/// Words that mark a link or page as a customer case study.
pub const CASE_STUDY_KEYWORDS: &[&str] = &["case", "success", "story", "customer", "testimonial"];

/// Host without a leading "www." label (port kept when non-default).
/// This is the join key between every stage.
pub fn domain_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => url_domain(&parsed),
        Err(_) => url
            .split("//")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .trim_start_matches("www.")
            .to_string(),
    }
}

pub fn url_domain(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

pub fn contains_case_study_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    CASE_STUDY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// URL-only variant of the case-study heuristic, used on stored page URLs.
pub fn is_case_study_url(url: &str) -> bool {
    !url.is_empty() && contains_case_study_keyword(url)
}

/// Fixed-width ISO-8601 instant, safe to compare lexicographically.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn domain_strips_www_only() {
        assert_eq!(domain_of("https://www.python.org"), "python.org");
        assert_eq!(domain_of("https://docs.python.org/3/"), "docs.python.org");
        assert_eq!(domain_of("http://www.example.com:8080/a"), "example.com:8080");
        assert_eq!(domain_of("https://example.com:443/"), "example.com");
    }

    #[test]
    fn domain_of_unparseable_url() {
        assert_eq!(domain_of("www.example.com/path"), "example.com");
    }

    #[test]
    fn case_study_keywords() {
        assert!(is_case_study_url("https://x.org/Customer-Stories/acme"));
        assert!(is_case_study_url("https://x.org/success"));
        assert!(!is_case_study_url("https://x.org/about"));
        assert!(!is_case_study_url(""));
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = iso_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let b = iso_timestamp(Utc.with_ymd_and_hms(2024, 11, 12, 13, 14, 15).unwrap());
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(2, 3), 66.67);
        assert_eq!(percent(1, 3), 33.33);
    }
}
