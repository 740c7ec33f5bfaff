// Answer providers - the AI collaborator behind ASK_QUESTION
//
// The background hands every question to an `AnswerProvider` together with
// the analysis it is grounded in and the caller's preferred provider name.
// The name is passed through untouched by everything upstream; deciding
// whether it is usable happens here.
//
// `OfflineAnswerer` is the built-in provider. It answers from the record
// alone, which keeps the CLI and the native host useful with no network.

use crate::model::{AnalysisRecord, CookieCategory, RiskLevel};
use async_trait::async_trait;

/// Provider name meaning "whatever is available"
pub const AUTO_PROVIDER: &str = "auto";

/// Name of the built-in rule-based provider
pub const OFFLINE_PROVIDER: &str = "offline";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{0}' is not available")]
    Unavailable(String),
    #[error("question is empty")]
    EmptyQuestion,
}

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Answer `question` about `context` using the `provider` the user picked
    async fn answer(
        &self,
        question: &str,
        context: &AnalysisRecord,
        provider: &str,
    ) -> Result<String, ProviderError>;
}

/// Rule-based answers drawn from the bound analysis
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAnswerer;

/// What a question is about, by keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Cookies(Option<CookieCategory>),
    Trackers,
    Score,
    Safety,
    Summary,
}

impl OfflineAnswerer {
    fn topic(question: &str) -> Topic {
        let q = question.to_lowercase();

        // A named category wins over the generic cookie topic
        if let Some(category) = CookieCategory::ALL
            .into_iter()
            .find(|c| q.contains(&c.as_str().to_lowercase()))
        {
            return Topic::Cookies(Some(category));
        }
        if q.contains("cookie") {
            return Topic::Cookies(None);
        }
        if q.contains("tracker") || q.contains("tracking") || q.contains("blocked") {
            return Topic::Trackers;
        }
        if q.contains("score") {
            return Topic::Score;
        }
        if q.contains("safe") || q.contains("risk") || q.contains("danger") || q.contains("trust")
        {
            return Topic::Safety;
        }
        Topic::Summary
    }

    fn cookies(context: &AnalysisRecord, category: Option<CookieCategory>) -> String {
        if let Some(category) = category {
            let count = context.cookie_count(category);
            let note = if category.is_tracking() && count > 0 {
                " These are used to follow you across sites."
            } else {
                ""
            };
            return format!(
                "{} sets {} {} cookie{}.{}",
                context.site(),
                count,
                category,
                plural(u64::from(count)),
                note
            );
        }

        let total = context.total_cookies();
        if total == 0 {
            return format!("{} did not set any cookies.", context.site());
        }
        let breakdown: Vec<String> = CookieCategory::ALL
            .into_iter()
            .filter_map(|c| match context.cookie_count(c) {
                0 => None,
                n => Some(format!("{} {}", n, c)),
            })
            .collect();
        format!(
            "{} sets {} cookie{}: {}.",
            context.site(),
            total,
            plural(total),
            breakdown.join(", ")
        )
    }

    fn trackers(context: &AnalysisRecord) -> String {
        match context.trackers_blocked_count {
            0 => format!("No trackers were blocked on {}.", context.site()),
            n => format!(
                "{} tracker{} {} blocked on {}.",
                n,
                plural(u64::from(n)),
                if n == 1 { "was" } else { "were" },
                context.site()
            ),
        }
    }

    fn score(context: &AnalysisRecord) -> String {
        format!(
            "{} scored {}/100, which rates as {}.",
            context.site(),
            context.privacy_score,
            context.risk_level
        )
    }

    fn safety(context: &AnalysisRecord) -> String {
        let verdict = match context.risk_level {
            RiskLevel::Safe => "looks safe to use",
            RiskLevel::Watch => "is usable but worth watching",
            RiskLevel::Risky => "is risky for your privacy",
        };
        let tracking: u64 = CookieCategory::ALL
            .into_iter()
            .filter(|c| c.is_tracking())
            .map(|c| u64::from(context.cookie_count(c)))
            .sum();
        format!(
            "{} {} (score {}/100). It sets {} tracking cookie{}.",
            context.site(),
            verdict,
            context.privacy_score,
            tracking,
            plural(tracking)
        )
    }

    fn summary(context: &AnalysisRecord) -> String {
        format!(
            "{} {} {}",
            Self::score(context),
            Self::trackers(context),
            Self::cookies(context, None)
        )
    }
}

#[async_trait]
impl AnswerProvider for OfflineAnswerer {
    fn name(&self) -> &'static str {
        OFFLINE_PROVIDER
    }

    async fn answer(
        &self,
        question: &str,
        context: &AnalysisRecord,
        provider: &str,
    ) -> Result<String, ProviderError> {
        let provider = provider.trim();
        if !provider.eq_ignore_ascii_case(AUTO_PROVIDER)
            && !provider.eq_ignore_ascii_case(OFFLINE_PROVIDER)
        {
            return Err(ProviderError::Unavailable(provider.to_string()));
        }
        if question.trim().is_empty() {
            return Err(ProviderError::EmptyQuestion);
        }

        let answer = match Self::topic(question) {
            Topic::Cookies(category) => Self::cookies(context, category),
            Topic::Trackers => Self::trackers(context),
            Topic::Score => Self::score(context),
            Topic::Safety => Self::safety(context),
            Topic::Summary => Self::summary(context),
        };
        Ok(answer)
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CookieCounts;
    use chrono::{TimeZone, Utc};

    fn context() -> AnalysisRecord {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        let mut cookies = CookieCounts::new();
        cookies.insert(CookieCategory::Essential, 3);
        cookies.insert(CookieCategory::Advertising, 5);
        AnalysisRecord {
            id: AnalysisRecord::composite_id("news.example", at),
            analyzed_at: at,
            privacy_score: 38,
            risk_level: RiskLevel::Risky,
            cookie_categories: cookies,
            trackers_blocked_count: 1,
        }
    }

    #[test]
    fn test_topic_detection() {
        assert_eq!(
            OfflineAnswerer::topic("How many ADVERTISING cookies?"),
            Topic::Cookies(Some(CookieCategory::Advertising))
        );
        assert_eq!(OfflineAnswerer::topic("any cookies?"), Topic::Cookies(None));
        assert_eq!(OfflineAnswerer::topic("were trackers blocked"), Topic::Trackers);
        assert_eq!(OfflineAnswerer::topic("explain the score"), Topic::Score);
        assert_eq!(OfflineAnswerer::topic("Is it safe?"), Topic::Safety);
        assert_eq!(OfflineAnswerer::topic("tell me more"), Topic::Summary);
    }

    #[tokio::test]
    async fn test_answers_are_grounded_in_the_record() {
        let ctx = context();
        let answer = OfflineAnswerer
            .answer("Is this site safe?", &ctx, "auto")
            .await
            .unwrap();
        assert!(answer.starts_with("news.example is risky"));
        assert!(answer.contains("38/100"));
        assert!(answer.contains("5 tracking cookies"));

        let answer = OfflineAnswerer
            .answer("cookies?", &ctx, "offline")
            .await
            .unwrap();
        assert_eq!(answer, "news.example sets 8 cookies: 3 Essential, 5 Advertising.");

        let answer = OfflineAnswerer
            .answer("trackers?", &ctx, "AUTO")
            .await
            .unwrap();
        assert_eq!(answer, "1 tracker was blocked on news.example.");
    }

    #[tokio::test]
    async fn test_unknown_provider_and_empty_question() {
        let ctx = context();
        let err = OfflineAnswerer
            .answer("hi", &ctx, "openai")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "provider 'openai' is not available");

        assert_eq!(
            OfflineAnswerer.answer("   ", &ctx, "auto").await,
            Err(ProviderError::EmptyQuestion)
        );
    }
}
