// Plain-text render sink
//
// Draws each dashboard view as a few lines of text with proportional bars.
// Only formats what it is given; never fetches or computes.

use super::RenderSink;
use crate::aggregate::{CookieTotals, RiskDistribution, StatCounters};
use crate::error::CoreError;
use crate::model::RiskLevel;
use std::io::Write;
use std::sync::Mutex;

/// Width of the longest bar in characters
const BAR_WIDTH: usize = 30;

pub struct TextSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_lines(&self, lines: &[String]) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> RenderSink for TextSink<W> {
    fn render_counters(&self, counters: &StatCounters) -> anyhow::Result<()> {
        self.write_lines(&[
            "── Overview".to_string(),
            format!("  Sites analyzed     {}", format_number(counters.total_sites as u64)),
            format!("  Average score      {}/100", counters.average_privacy_score),
            format!(
                "  Trackers blocked   {}",
                format_number(counters.total_trackers_blocked)
            ),
        ])
    }

    fn render_risk_distribution(&self, distribution: &RiskDistribution) -> anyhow::Result<()> {
        let max = RiskLevel::ALL
            .into_iter()
            .map(|level| distribution.get(level) as u64)
            .max()
            .unwrap_or(0);

        let total = distribution.total() as u64;
        let mut lines = vec!["── Risk distribution".to_string()];
        for level in RiskLevel::ALL {
            let count = distribution.get(level) as u64;
            let percent = if total == 0 { 0 } else { count * 100 / total };
            lines.push(format!(
                "  {:<6} {:>5} {:>3}% {}",
                level.as_str(),
                count,
                percent,
                bar(count, max)
            ));
        }
        self.write_lines(&lines)
    }

    fn render_score_trend(&self, trend: &[u8]) -> anyhow::Result<()> {
        let line = if trend.is_empty() {
            "  (no analyses yet)".to_string()
        } else {
            let spark: String = trend.iter().map(|&s| spark_char(s)).collect();
            let scores: Vec<String> = trend.iter().map(|s| s.to_string()).collect();
            format!("  {}  {}", spark, scores.join(" "))
        };
        self.write_lines(&["── Score trend (oldest first)".to_string(), line])
    }

    fn render_cookie_totals(&self, totals: &CookieTotals) -> anyhow::Result<()> {
        let max = totals.values().copied().max().unwrap_or(0);
        let mut lines = vec!["── Cookies by category".to_string()];
        for (category, &count) in totals {
            lines.push(format!(
                "  {:<11} {:>7} {}",
                category.as_str(),
                format_number(count),
                bar(count, max)
            ));
        }
        self.write_lines(&lines)
    }

    fn render_error(&self, error: &CoreError) -> anyhow::Result<()> {
        self.write_lines(&[format!("!! Dashboard unavailable: {}", error)])
    }
}

fn bar(value: u64, max: u64) -> String {
    if max == 0 {
        return String::new();
    }
    let len = (value * BAR_WIDTH as u64).div_ceil(max) as usize;
    "█".repeat(len)
}

fn spark_char(score: u8) -> char {
    const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let idx = usize::from(score.min(100)) * (LEVELS.len() - 1) / 100;
    LEVELS[idx]
}

/// Format a large number with commas for readability
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, ch);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DashboardAggregate;

    fn rendered(f: impl FnOnce(&TextSink<Vec<u8>>)) -> String {
        let sink = TextSink::new(Vec::new());
        f(&sink);
        String::from_utf8(sink.out.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_bars_scale_to_the_largest_value() {
        assert_eq!(bar(0, 0), "");
        assert_eq!(bar(10, 10).chars().count(), BAR_WIDTH);
        assert_eq!(bar(5, 10).chars().count(), BAR_WIDTH / 2);
        assert_eq!(bar(1, 1000).chars().count(), 1);
    }

    #[test]
    fn test_trend_sparkline() {
        assert_eq!(spark_char(0), '▁');
        assert_eq!(spark_char(100), '█');

        let out = rendered(|s| s.render_score_trend(&[0, 100]).unwrap());
        assert!(out.contains("▁█  0 100"));

        let out = rendered(|s| s.render_score_trend(&[]).unwrap());
        assert!(out.contains("no analyses yet"));
    }

    #[test]
    fn test_risk_percentages() {
        let distribution = RiskDistribution {
            safe: 1,
            watch: 1,
            risky: 2,
        };
        let out = rendered(|s| s.render_risk_distribution(&distribution).unwrap());
        assert!(out.contains("Risky      2  50%"));
        assert!(out.contains("Safe       1  25%"));
    }

    #[test]
    fn test_zeroed_aggregate_renders_every_category() {
        let aggregate = DashboardAggregate::default();
        let out = rendered(|s| {
            s.render_counters(&aggregate.counters()).unwrap();
            s.render_cookie_totals(&aggregate.cookie_totals).unwrap();
        });
        assert!(out.contains("Sites analyzed     0"));
        for category in ["Essential", "Functional", "Analytics", "Marketing", "Advertising"] {
            assert!(out.contains(category), "missing {}", category);
        }
    }
}
