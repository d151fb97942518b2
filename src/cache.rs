use std::{collections::HashMap, fmt};

use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::report::{ReportQuery, SalesReport};

/// SHA-256 of a source's bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Caller-owned memo of built reports, keyed by source fingerprint and query.
///
/// Meant for long-lived callers that answer many queries over the same
/// sources. A one-shot CLI run builds its single report directly.
#[derive(Debug, Default)]
pub struct ReportCache {
    entries: HashMap<(Fingerprint, ReportQuery), SalesReport>,
    stats: CacheStats,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached report or builds, stores and returns a new one.
    ///
    /// A failed build is not cached.
    pub fn get_or_build<F>(
        &mut self,
        fingerprint: &Fingerprint,
        query: &ReportQuery,
        build: F,
    ) -> Result<SalesReport>
    where
        F: FnOnce() -> Result<SalesReport>,
    {
        let key = (fingerprint.clone(), query.clone());
        if let Some(report) = self.entries.get(&key) {
            self.stats.hits += 1;
            debug!("Report cache hit for source {}", fingerprint.short());
            return Ok(report.clone());
        }
        self.stats.misses += 1;
        debug!("Report cache miss for source {}", fingerprint.short());
        let report = build()?;
        self.entries.insert(key, report.clone());
        Ok(report)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::GroupBy,
        filter::{DateRange, Dimension, FilterCriteria},
        report::build_report,
        sales::{
            SalesTable,
            fixtures::{date, record},
        },
    };

    fn query() -> ReportQuery {
        ReportQuery {
            criteria: FilterCriteria::new(
                Dimension::ProductCode("X".into()),
                DateRange::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap(),
            ),
            group_by: GroupBy::Seller,
        }
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = Fingerprint::of(b"abc");
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.short(), "ba7816bf8f01");
        assert_ne!(fp, Fingerprint::of(b"abd"));
    }

    #[test]
    fn same_fingerprint_and_query_hits() {
        let table = SalesTable::from_records(vec![record(
            "Ana",
            "Acme",
            "X",
            Some(date(2024, 3, 1)),
            Some(1.0),
            Some(10.0),
        )]);
        let fp = Fingerprint::of(b"source");
        let mut cache = ReportCache::new();
        let first = cache
            .get_or_build(&fp, &query(), || Ok(build_report(&table, &query())))
            .unwrap();
        let second = cache
            .get_or_build(&fp, &query(), || anyhow::bail!("must not rebuild"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.stats().hit_rate(), 0.5);

        let other = Fingerprint::of(b"changed");
        assert!(cache.get_or_build(&other, &query(), || anyhow::bail!("boom")).is_err());
        assert_eq!(cache.len(), 1);
    }
}
