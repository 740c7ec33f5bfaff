// Extension export format
//
// The browser side keeps its history as a keyed collection under the
// `analysisHistory` storage key:
//
//   { "analysisHistory": { "<site id>": { "analyzed_at": "...", "privacy_score": 72, ... } } }
//
// Only `analyzed_at` and `privacy_score` are guaranteed per value. Everything
// else defaults, and a missing risk level is derived from the score.

use crate::model::{AnalysisRecord, CookieCounts, RiskLevel};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Well-known storage key holding the history collection
pub const STORAGE_KEY: &str = "analysisHistory";

#[derive(Debug, Deserialize)]
struct ExportedEntry {
    analyzed_at: DateTime<Utc>,
    privacy_score: u8,
    #[serde(default)]
    risk_level: Option<RiskLevel>,
    #[serde(default)]
    cookie_categories: CookieCounts,
    #[serde(default)]
    trackers_blocked_count: u32,
}

/// Parse an exported collection into records, oldest first.
///
/// Accepts either the full storage object or the bare keyed collection.
pub fn parse_export(json: &str) -> Result<Vec<AnalysisRecord>> {
    let value: Value = serde_json::from_str(json).context("Export is not valid JSON")?;
    let collection = match value.get(STORAGE_KEY) {
        Some(inner) => inner,
        None => &value,
    };
    let Some(entries) = collection.as_object() else {
        bail!("Expected an object keyed by site id under \"{}\"", STORAGE_KEY);
    };

    let mut records = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        let entry: ExportedEntry = serde_json::from_value(entry.clone())
            .with_context(|| format!("Invalid history entry \"{}\"", id))?;
        let record = AnalysisRecord {
            id: id.clone(),
            analyzed_at: entry.analyzed_at,
            privacy_score: entry.privacy_score,
            risk_level: entry
                .risk_level
                .unwrap_or_else(|| RiskLevel::from_score(entry.privacy_score)),
            cookie_categories: entry.cookie_categories,
            trackers_blocked_count: entry.trackers_blocked_count,
        };
        record
            .validate()
            .with_context(|| format!("Invalid history entry \"{}\"", id))?;
        records.push(record);
    }

    // Appending oldest-first keeps insertion order in step with analysis time
    records.sort_by_key(|r| r.analyzed_at);
    Ok(records)
}

/// Build the keyed collection the extension reads back.
///
/// With duplicate ids (possible under `DuplicatePolicy::Append`) the later
/// record wins, matching what the extension's keyed storage can hold.
pub fn to_export(records: &[AnalysisRecord]) -> Result<Value> {
    let mut entries = Map::new();
    for record in records {
        let mut value = serde_json::to_value(record)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("id");
        }
        entries.insert(record.id.clone(), value);
    }

    let mut root = Map::new();
    root.insert(STORAGE_KEY.to_string(), Value::Object(entries));
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CookieCategory;

    #[test]
    fn test_minimal_entries_get_defaults() {
        let json = r#"{
            "analysisHistory": {
                "b.example": {"analyzed_at": "2026-04-02T10:00:00Z", "privacy_score": 30},
                "a.example": {"analyzed_at": "2026-04-01T10:00:00Z", "privacy_score": 85,
                              "cookie_categories": {"Marketing": 4}, "trackers_blocked_count": 6}
            }
        }"#;
        let records = parse_export(json).unwrap();

        assert_eq!(records.len(), 2);
        // Sorted oldest first regardless of key order
        assert_eq!(records[0].id, "a.example");
        assert_eq!(records[0].risk_level, RiskLevel::Safe);
        assert_eq!(records[0].cookie_count(CookieCategory::Marketing), 4);
        assert_eq!(records[0].trackers_blocked_count, 6);
        assert_eq!(records[1].risk_level, RiskLevel::Risky);
        assert!(records[1].cookie_categories.is_empty());
    }

    #[test]
    fn test_bare_collection_is_accepted() {
        let json = r#"{"x": {"analyzed_at": "2026-04-01T10:00:00Z", "privacy_score": 50, "risk_level": "Risky"}}"#;
        let records = parse_export(json).unwrap();
        // An explicit level is kept even if the score would say otherwise
        assert_eq!(records[0].risk_level, RiskLevel::Risky);
    }

    #[test]
    fn test_bad_entries_name_the_key() {
        let json = r#"{"analysisHistory": {"broken": {"privacy_score": 50}}}"#;
        let err = parse_export(json).unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));

        let json = r#"{"analysisHistory": {"high": {"analyzed_at": "2026-04-01T10:00:00Z", "privacy_score": 140}}}"#;
        assert!(parse_export(json).is_err());

        assert!(parse_export(r#"{"analysisHistory": []}"#).is_err());
    }

    #[test]
    fn test_export_reimports_to_the_same_records() {
        let json = r#"{"analysisHistory": {
            "a": {"analyzed_at": "2026-04-01T10:00:00Z", "privacy_score": 85, "risk_level": "Safe"},
            "b": {"analyzed_at": "2026-04-02T10:00:00Z", "privacy_score": 45, "risk_level": "Watch"}
        }}"#;
        let records = parse_export(json).unwrap();
        let exported = to_export(&records).unwrap();

        assert!(exported[STORAGE_KEY]["a"].get("id").is_none());
        assert_eq!(parse_export(&exported.to_string()).unwrap(), records);
    }
}
