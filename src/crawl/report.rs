//! End-of-crawl summary and the errored-URL list.

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Tally of one crawl run. Individual failures never abort a crawl; they
/// end up here for a retry pass later.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errored: Vec<String>,
}

impl CrawlReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, url: String) {
        self.failed += 1;
        self.errored.push(url);
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Writes the errored URLs next to `output` as `<stem>_errored.json`.
    /// Nothing is written when every URL succeeded.
    pub fn write_errored(&self, output: &Path) -> Result<Option<PathBuf>> {
        if self.errored.is_empty() {
            return Ok(None);
        }
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("crawl");
        let path = output.with_file_name(format!("{}_errored.json", stem));
        let json = serde_json::to_string_pretty(&self.errored)
            .context("Failed to serialize errored URLs")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Errored urls saved to {}", path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let mut report = CrawlReport::default();
        report.record_success();
        report.record_success();
        report.record_failure("https://a.test/broken".to_string());

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.errored, vec!["https://a.test/broken".to_string()]);
    }

    #[test]
    fn test_write_errored_creates_sibling_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("parts.jsonl");

        let mut report = CrawlReport::default();
        report.record_failure("https://a.test/1".to_string());
        report.record_failure("https://a.test/2".to_string());

        let path = report.write_errored(&output).unwrap().unwrap();
        assert_eq!(path, dir.path().join("parts_errored.json"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let urls: Vec<String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_write_errored_skipped_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("parts.jsonl");

        let mut report = CrawlReport::default();
        report.record_success();

        assert!(report.write_errored(&output).unwrap().is_none());
        assert!(!dir.path().join("parts_errored.json").exists());
    }
}
