// Background dispatcher - sole owner of the history store and answer provider
//
// Drains the request queue until every transport is dropped. Store requests
// run one at a time in arrival order (each is awaited before the next envelope
// is taken), so appends and snapshot reads never interleave. Questions can
// take a while, so each ASK_QUESTION runs on its own task and may finish in
// any order.

use crate::aggregate::compute_aggregate;
use crate::answer::{AnswerProvider, ProviderError};
use crate::messaging::{self, ChannelTransport, Envelope, Payload, RemoteError, Reply, Request};
use crate::model::AnalysisRecord;
use crate::storage::{HistoryStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Background {
    store: Arc<dyn HistoryStore>,
    answerer: Arc<dyn AnswerProvider>,
    request_rx: mpsc::Receiver<Envelope>,
}

impl Background {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        answerer: Arc<dyn AnswerProvider>,
        request_rx: mpsc::Receiver<Envelope>,
    ) -> Self {
        Self {
            store,
            answerer,
            request_rx,
        }
    }

    /// Create the channel and start the dispatcher on the current runtime
    pub fn spawn(
        store: Arc<dyn HistoryStore>,
        answerer: Arc<dyn AnswerProvider>,
        buffer: usize,
    ) -> (ChannelTransport, JoinHandle<()>) {
        let (transport, request_rx) = messaging::channel(buffer);
        let background = Self::new(store, answerer, request_rx);
        let handle = tokio::spawn(background.run());
        (transport, handle)
    }

    /// Serve requests until the channel closes
    pub async fn run(mut self) {
        tracing::info!(
            "Background started (store: {}, answers: {})",
            self.store.name(),
            self.answerer.name()
        );

        let mut served = 0usize;
        while let Some(envelope) = self.request_rx.recv().await {
            served += 1;
            self.dispatch(envelope).await;
        }

        tracing::info!("Background stopped after {} request(s)", served);
    }

    async fn dispatch(&self, envelope: Envelope) {
        let Envelope { request, reply } = envelope;
        let kind = request.kind();
        tracing::debug!("Dispatching {}", kind);

        let result: Reply = match request {
            Request::AskQuestion {
                question,
                context,
                provider,
            } => {
                let answerer = Arc::clone(&self.answerer);
                tokio::spawn(async move {
                    let result = answerer
                        .answer(&question, &context, &provider)
                        .await
                        .map(Payload::Answer)
                        .map_err(provider_error);
                    if let Err(e) = &result {
                        tracing::warn!("ASK_QUESTION via '{}' failed: {}", provider, e);
                    }
                    if reply.send(result).is_err() {
                        tracing::debug!("ASK_QUESTION caller went away before the answer");
                    }
                });
                return;
            }
            Request::GetDashboardData => self
                .read_history()
                .await
                .map(|records| Payload::Dashboard(compute_aggregate(&records))),
            Request::GetHistory => self.read_history().await.map(|mut records| {
                records.sort_by_key(|r| r.analyzed_at);
                Payload::History(records)
            }),
            Request::RecordAnalysis { record } => self.append(record).await.map(|()| {
                tracing::debug!("Recorded analysis");
                Payload::Recorded
            }),
        };

        if let Err(e) = &result {
            tracing::error!("{} failed: {}", kind, e);
        }
        if reply.send(result).is_err() {
            tracing::debug!("{} caller went away before the reply", kind);
        }
    }

    async fn read_history(&self) -> Result<Vec<AnalysisRecord>, RemoteError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.read_all())
            .await
            .map_err(|e| RemoteError::StorageUnavailable(format!("history read panicked: {}", e)))?
            .map_err(store_error)
    }

    async fn append(&self, record: AnalysisRecord) -> Result<(), RemoteError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.append(&record))
            .await
            .map_err(|e| RemoteError::StorageUnavailable(format!("history write panicked: {}", e)))?
            .map_err(store_error)
    }
}

fn store_error(err: StoreError) -> RemoteError {
    match err {
        StoreError::Invalid(e) => RemoteError::InvalidRequest(e.to_string()),
        other => RemoteError::StorageUnavailable(other.to_string()),
    }
}

fn provider_error(err: ProviderError) -> RemoteError {
    match err {
        ProviderError::EmptyQuestion => RemoteError::InvalidRequest(err.to_string()),
        other => RemoteError::Provider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::OfflineAnswerer;
    use crate::messaging::{ChannelError, Transport};
    use crate::model::{CookieCounts, RiskLevel};
    use crate::storage::memory::MemoryHistoryStore;
    use crate::storage::DuplicatePolicy;
    use chrono::{Duration, TimeZone, Utc};

    fn record(site: &str, minute: i64, score: u8) -> AnalysisRecord {
        let at = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap() + Duration::minutes(minute);
        AnalysisRecord {
            id: AnalysisRecord::composite_id(site, at),
            analyzed_at: at,
            privacy_score: score,
            risk_level: RiskLevel::from_score(score),
            cookie_categories: CookieCounts::new(),
            trackers_blocked_count: 3,
        }
    }

    fn start() -> (ChannelTransport, JoinHandle<()>) {
        Background::spawn(
            Arc::new(MemoryHistoryStore::new(DuplicatePolicy::Overwrite)),
            Arc::new(OfflineAnswerer),
            8,
        )
    }

    /// Store whose medium is gone
    struct BrokenStore;

    impl HistoryStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn append(&self, _: &AnalysisRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk detached".into()))
        }
        fn read_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
            Err(StoreError::Unavailable("disk detached".into()))
        }
    }

    #[tokio::test]
    async fn test_record_then_dashboard() {
        let (transport, handle) = start();
        for (site, minute, score) in [("c", 2, 40), ("a", 0, 80), ("b", 1, 60)] {
            let reply = transport
                .send(Request::RecordAnalysis {
                    record: record(site, minute, score),
                })
                .await
                .unwrap();
            assert_eq!(reply, Payload::Recorded);
        }

        let Payload::Dashboard(aggregate) = transport.send(Request::GetDashboardData).await.unwrap()
        else {
            panic!("expected dashboard payload");
        };
        assert_eq!(aggregate.total_sites, 3);
        assert_eq!(aggregate.average_privacy_score, 60);
        assert_eq!(aggregate.score_trend, vec![80, 60, 40]);
        assert_eq!(aggregate.total_trackers_blocked, 9);

        let Payload::History(history) = transport.send(Request::GetHistory).await.unwrap() else {
            panic!("expected history payload");
        };
        let sites: Vec<&str> = history.iter().map(|r| r.site()).collect();
        assert_eq!(sites, vec!["a", "b", "c"]);

        drop(transport);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_record_is_rejected() {
        let (transport, _handle) = start();
        let mut bad = record("x", 0, 50);
        bad.privacy_score = 101;
        let err = transport
            .send(Request::RecordAnalysis { record: bad })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Remote(RemoteError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_not_zeroed() {
        let (transport, _handle) =
            Background::spawn(Arc::new(BrokenStore), Arc::new(OfflineAnswerer), 4);
        let err = transport.send(Request::GetDashboardData).await.unwrap_err();
        assert_eq!(
            err,
            ChannelError::Remote(RemoteError::StorageUnavailable(
                "storage unavailable: disk detached".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_questions_go_to_the_provider() {
        let (transport, _handle) = start();
        let context = record("shop.example", 0, 82);

        let reply = transport
            .send(Request::AskQuestion {
                question: "what is the score?".into(),
                context: context.clone(),
                provider: "auto".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Payload::Answer("shop.example scored 82/100, which rates as Safe.".into())
        );

        let err = transport
            .send(Request::AskQuestion {
                question: "what is the score?".into(),
                context,
                provider: "mistral".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChannelError::Remote(RemoteError::Provider(
                "provider 'mistral' is not available".into()
            ))
        );
    }
}
