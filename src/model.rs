// Analysis records - one immutable snapshot per completed page analysis
//
// Records are produced upstream (the page analyzer extracts cookies and
// trackers) and arrive here fully formed. This module only defines their
// shape, validates them on the way into the store, and offers a couple of
// helpers for producers that don't compute every field themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Highest valid privacy score
pub const MAX_PRIVACY_SCORE: u8 = 100;

/// Separator between site and timestamp in composite record ids
const ID_SEPARATOR: char = '|';

/// Coarse risk classification assigned by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Safe,
    Watch,
    Risky,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Safe, RiskLevel::Watch, RiskLevel::Risky];

    /// Classify a score the way the analyzer does when it omits the level
    ///
    /// 70+ is Safe, 40-69 is Watch, anything lower is Risky.
    pub fn from_score(score: u8) -> Self {
        match score {
            70..=u8::MAX => RiskLevel::Safe,
            40..=69 => RiskLevel::Watch,
            _ => RiskLevel::Risky,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Watch => "Watch",
            RiskLevel::Risky => "Risky",
        }
    }

    /// Case-insensitive parse (accepts "safe", "WATCH", ...)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cookie categories tracked per analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CookieCategory {
    Essential,
    Functional,
    Analytics,
    Marketing,
    Advertising,
}

impl CookieCategory {
    pub const ALL: [CookieCategory; 5] = [
        CookieCategory::Essential,
        CookieCategory::Functional,
        CookieCategory::Analytics,
        CookieCategory::Marketing,
        CookieCategory::Advertising,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CookieCategory::Essential => "Essential",
            CookieCategory::Functional => "Functional",
            CookieCategory::Analytics => "Analytics",
            CookieCategory::Marketing => "Marketing",
            CookieCategory::Advertising => "Advertising",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Categories that exist to follow the user across sites
    pub fn is_tracking(&self) -> bool {
        matches!(
            self,
            CookieCategory::Analytics | CookieCategory::Marketing | CookieCategory::Advertising
        )
    }
}

impl fmt::Display for CookieCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record cookie counts. Missing categories count as zero.
pub type CookieCounts = BTreeMap<CookieCategory, u32>;

/// Reasons a record is refused by the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record id is empty")]
    EmptyId,
    #[error("privacy score {0} is outside 0..=100")]
    ScoreOutOfRange(u8),
}

/// One completed page analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Opaque key, usually `site|timestamp` (see [`AnalysisRecord::composite_id`])
    pub id: String,
    /// When the analysis finished (RFC 3339 on the wire)
    pub analyzed_at: DateTime<Utc>,
    pub privacy_score: u8,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub cookie_categories: CookieCounts,
    #[serde(default)]
    pub trackers_blocked_count: u32,
}

impl AnalysisRecord {
    /// Build the `site|timestamp` composite key used for new analyses.
    ///
    /// Re-analyzing a site yields a fresh key, so the history keeps both runs.
    pub fn composite_id(site: &str, analyzed_at: DateTime<Utc>) -> String {
        format!("{}{}{}", site.trim(), ID_SEPARATOR, analyzed_at.to_rfc3339())
    }

    /// Site portion of the id (the whole id if it isn't a composite)
    pub fn site(&self) -> &str {
        self.id
            .rsplit_once(ID_SEPARATOR)
            .map(|(site, _)| site)
            .unwrap_or(&self.id)
    }

    /// Count for one category (0 when absent)
    pub fn cookie_count(&self, category: CookieCategory) -> u32 {
        self.cookie_categories.get(&category).copied().unwrap_or(0)
    }

    pub fn total_cookies(&self) -> u64 {
        self.cookie_categories.values().map(|&n| u64::from(n)).sum()
    }

    /// Checked before a record is accepted into the history
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }
        if self.privacy_score > MAX_PRIVACY_SCORE {
            return Err(RecordError::ScoreOutOfRange(self.privacy_score));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, score: u8) -> AnalysisRecord {
        AnalysisRecord {
            id: id.to_string(),
            analyzed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            privacy_score: score,
            risk_level: RiskLevel::from_score(score),
            cookie_categories: CookieCounts::new(),
            trackers_blocked_count: 0,
        }
    }

    #[test]
    fn test_risk_from_score_boundaries() {
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Watch);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Watch);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Risky);
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Risky);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(RiskLevel::parse("risky"), Some(RiskLevel::Risky));
        assert_eq!(RiskLevel::parse(" WATCH "), Some(RiskLevel::Watch));
        assert_eq!(RiskLevel::parse("dangerous"), None);
        assert_eq!(
            CookieCategory::parse("advertising"),
            Some(CookieCategory::Advertising)
        );
        assert_eq!(CookieCategory::parse("session"), None);
    }

    #[test]
    fn test_composite_id_keeps_site_recoverable() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let id = AnalysisRecord::composite_id("https://news.example.com/a?b=c", at);
        let rec = record(&id, 50);

        assert_eq!(rec.site(), "https://news.example.com/a?b=c");
        assert!(id.ends_with("2026-03-01T12:00:00+00:00"));

        // Plain ids are their own site
        assert_eq!(record("example.org", 50).site(), "example.org");
    }

    #[test]
    fn test_validate_rejects_bad_records() {
        assert_eq!(record("  ", 50).validate(), Err(RecordError::EmptyId));
        assert_eq!(
            record("a", 101).validate(),
            Err(RecordError::ScoreOutOfRange(101))
        );
        assert!(record("a", 100).validate().is_ok());
    }

    #[test]
    fn test_missing_cookie_categories_count_as_zero() {
        let mut rec = record("a", 50);
        rec.cookie_categories.insert(CookieCategory::Marketing, 4);
        rec.cookie_categories.insert(CookieCategory::Essential, 2);

        assert_eq!(rec.cookie_count(CookieCategory::Marketing), 4);
        assert_eq!(rec.cookie_count(CookieCategory::Analytics), 0);
        assert_eq!(rec.total_cookies(), 6);
    }

    #[test]
    fn test_record_json_uses_snake_case_fields() {
        let json = serde_json::to_value(record("a", 42)).unwrap();
        assert_eq!(json["privacy_score"], 42);
        assert_eq!(json["analyzed_at"], "2026-03-01T12:00:00Z");
        assert_eq!(json["risk_level"], "Watch");

        // Optional fields default when the producer leaves them out
        let parsed: AnalysisRecord = serde_json::from_str(
            r#"{"id":"b","analyzed_at":"2026-03-01T12:00:00Z","privacy_score":90,"risk_level":"Safe"}"#,
        )
        .unwrap();
        assert!(parsed.cookie_categories.is_empty());
        assert_eq!(parsed.trackers_blocked_count, 0);
    }
}
