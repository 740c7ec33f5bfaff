//! Dashboard aggregation
//!
//! Turns the full set of analysis records into the numbers the dashboard
//! shows. Everything here is a pure function of its input: no caching, no
//! I/O, safe to call from any task while the store keeps growing.
//!
//! # Views
//!
//! ```text
//! [AnalysisRecord] ──→ compute_aggregate() ──→ DashboardAggregate
//!                                                 ├── counters()          (sites, avg score, trackers)
//!                                                 ├── risk_distribution   (Safe / Watch / Risky)
//!                                                 ├── score_trend         (last 10 scores, oldest first)
//!                                                 └── cookie_totals       (per category)
//! ```

use crate::model::{AnalysisRecord, CookieCategory, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of most recent scores kept in the trend series
pub const SCORE_TREND_LEN: usize = 10;

/// Summed cookie counts per category. Always carries all five categories.
pub type CookieTotals = BTreeMap<CookieCategory, u64>;

/// Record count per risk bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub safe: usize,
    pub watch: usize,
    pub risky: usize,
}

impl RiskDistribution {
    fn tally(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Safe => self.safe += 1,
            RiskLevel::Watch => self.watch += 1,
            RiskLevel::Risky => self.risky += 1,
        }
    }

    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Safe => self.safe,
            RiskLevel::Watch => self.watch,
            RiskLevel::Risky => self.risky,
        }
    }

    pub fn total(&self) -> usize {
        self.safe + self.watch + self.risky
    }
}

/// Headline counters shown at the top of the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCounters {
    pub total_sites: usize,
    pub average_privacy_score: u8,
    pub total_trackers_blocked: u64,
}

/// Derived dashboard statistics. Recomputed on every request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAggregate {
    pub total_sites: usize,
    /// Mean score rounded to the nearest integer (0 for an empty history)
    pub average_privacy_score: u8,
    pub total_trackers_blocked: u64,
    pub risk_distribution: RiskDistribution,
    /// Up to [`SCORE_TREND_LEN`] scores, ordered by `analyzed_at` ascending
    pub score_trend: Vec<u8>,
    pub cookie_totals: CookieTotals,
}

impl Default for DashboardAggregate {
    /// The all-zero aggregate (what an empty history produces)
    fn default() -> Self {
        Self {
            total_sites: 0,
            average_privacy_score: 0,
            total_trackers_blocked: 0,
            risk_distribution: RiskDistribution::default(),
            score_trend: Vec::new(),
            cookie_totals: zeroed_cookie_totals(),
        }
    }
}

impl DashboardAggregate {
    pub fn counters(&self) -> StatCounters {
        StatCounters {
            total_sites: self.total_sites,
            average_privacy_score: self.average_privacy_score,
            total_trackers_blocked: self.total_trackers_blocked,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_sites == 0
    }
}

fn zeroed_cookie_totals() -> CookieTotals {
    CookieCategory::ALL.into_iter().map(|c| (c, 0)).collect()
}

/// Compute dashboard statistics over every record.
///
/// Total: the empty slice yields [`DashboardAggregate::default`]. Records
/// sharing an `analyzed_at` keep their slice order in the trend.
pub fn compute_aggregate(records: &[AnalysisRecord]) -> DashboardAggregate {
    let total_sites = records.len();

    let score_sum: u64 = records.iter().map(|r| u64::from(r.privacy_score)).sum();
    let average_privacy_score = if total_sites == 0 {
        0
    } else {
        (score_sum as f64 / total_sites as f64).round() as u8
    };

    let total_trackers_blocked = records
        .iter()
        .map(|r| u64::from(r.trackers_blocked_count))
        .sum();

    let mut risk_distribution = RiskDistribution::default();
    for record in records {
        risk_distribution.tally(record.risk_level);
    }

    let mut cookie_totals = zeroed_cookie_totals();
    for record in records {
        for (category, count) in &record.cookie_categories {
            *cookie_totals.entry(*category).or_insert(0) += u64::from(*count);
        }
    }

    DashboardAggregate {
        total_sites,
        average_privacy_score,
        total_trackers_blocked,
        risk_distribution,
        score_trend: score_trend(records),
        cookie_totals,
    }
}

/// Last [`SCORE_TREND_LEN`] scores by analysis time, oldest first
fn score_trend(records: &[AnalysisRecord]) -> Vec<u8> {
    let mut ordered: Vec<&AnalysisRecord> = records.iter().collect();
    // sort_by_key is stable: equal timestamps stay in insertion order
    ordered.sort_by_key(|r| r.analyzed_at);

    let skip = ordered.len().saturating_sub(SCORE_TREND_LEN);
    ordered
        .into_iter()
        .skip(skip)
        .map(|r| r.privacy_score)
        .collect()
}
