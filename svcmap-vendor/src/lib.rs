use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pattern file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("pattern for vendor '{name}' does not compile: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPattern {
    pub id: u32,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub matched_ids: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    vendors: Vec<VendorPattern>,
}

/// Classifies banners against the operator-supplied pattern file and
/// keeps per-vendor match bookkeeping that is persisted back on save.
#[derive(Debug)]
pub struct VendorDetector {
    entries: Vec<(VendorPattern, Regex)>,
    counts: HashMap<u32, u64>,
}

impl VendorDetector {
    pub fn load(path: &Path) -> Result<Self, VendorError> {
        let raw = fs::read_to_string(path)?;
        let file: PatternFile = serde_json::from_str(&raw)?;

        let mut entries = Vec::with_capacity(file.vendors.len());
        let mut counts = HashMap::new();
        for vendor in file.vendors {
            let regex = Regex::new(&vendor.pattern).map_err(|source| VendorError::Pattern {
                name: vendor.name.clone(),
                source,
            })?;
            counts.insert(vendor.id, 0);
            entries.push((vendor, regex));
        }

        info!(patterns = entries.len(), path = %path.display(), "loaded vendor patterns");
        Ok(Self { entries, counts })
    }

    /// First pattern matching the banner wins.
    pub fn detect(&self, banner: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, regex)| regex.is_match(banner))
            .map(|(vendor, _)| vendor.id)
    }

    pub fn name(&self, id: u32) -> &str {
        self.entries
            .iter()
            .find(|(vendor, _)| vendor.id == id)
            .map(|(vendor, _)| vendor.name.as_str())
            .unwrap_or("Unknown")
    }

    /// Record a match against a server key (hash of `host:port`),
    /// deduplicating the key per vendor.
    pub fn record_match(&mut self, id: u32, server_key: u64) {
        if let Some((vendor, _)) = self.entries.iter_mut().find(|(v, _)| v.id == id) {
            if !vendor.matched_ids.contains(&server_key) {
                vendor.matched_ids.push(server_key);
            }
            *self.counts.entry(id).or_insert(0) += 1;
            debug!(vendor = %vendor.name, "vendor match recorded");
        }
    }

    /// `(name, match count)` pairs, most-matched first.
    pub fn statistics(&self) -> Vec<(String, u64)> {
        let mut stats: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(vendor, _)| {
                (
                    vendor.name.clone(),
                    self.counts.get(&vendor.id).copied().unwrap_or(0),
                )
            })
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1));
        stats
    }

    /// Persist the pattern file, including accumulated `matched_ids`.
    pub fn save(&self, path: &Path) -> Result<(), VendorError> {
        let file = PatternFile {
            vendors: self.entries.iter().map(|(v, _)| v.clone()).collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
