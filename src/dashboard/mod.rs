// Dashboard controller - fetch the aggregate, hand it to a render sink
//
// State machine:
//
//   Idle ──request_refresh──→ Loading ──ok──→ Loaded
//     ↑                          │      └──err─→ Failed
//     └── (Loaded / Failed also go back to Loading on request_refresh)
//
// Refreshes requested while one is in flight join it instead of sending a
// second GET_DASHBOARD_DATA. The in-flight request is a `Shared` future, so
// whichever caller observes completion first settles the state and renders;
// a caller dropping its handle never strands the controller in Loading.
//
// There is no automatic retry. A failure renders the zeroed aggregate plus
// the error, and the last successful aggregate is kept for callers that
// want it.

pub mod text;

pub use text::TextSink;

use crate::aggregate::{CookieTotals, DashboardAggregate, RiskDistribution, StatCounters};
use crate::error::CoreError;
use crate::messaging::{Payload, Request, Transport};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the controller is in its refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardState {
    Idle,
    Loading,
    Loaded,
    Failed(CoreError),
}

/// Consumer of the four dashboard views
///
/// Each view is delivered separately; an error from one is logged and does
/// not stop the others.
pub trait RenderSink: Send + Sync {
    fn render_counters(&self, counters: &StatCounters) -> anyhow::Result<()>;
    fn render_risk_distribution(&self, distribution: &RiskDistribution) -> anyhow::Result<()>;
    fn render_score_trend(&self, trend: &[u8]) -> anyhow::Result<()>;
    fn render_cookie_totals(&self, totals: &CookieTotals) -> anyhow::Result<()>;
    /// Called after the zeroed views when a refresh fails
    fn render_error(&self, error: &CoreError) -> anyhow::Result<()>;
}

type RefreshResult = Result<DashboardAggregate, CoreError>;
type InFlight = Shared<BoxFuture<'static, RefreshResult>>;

struct Inner {
    state: DashboardState,
    last_loaded: Option<DashboardAggregate>,
    in_flight: Option<(u64, InFlight)>,
    generation: u64,
}

pub struct DashboardController {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn RenderSink>,
    inner: Mutex<Inner>,
}

impl DashboardController {
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            transport,
            sink,
            inner: Mutex::new(Inner {
                state: DashboardState::Idle,
                last_loaded: None,
                in_flight: None,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is plain data; a panic mid-update can't leave it torn
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> DashboardState {
        self.lock().state.clone()
    }

    /// Most recent successfully loaded aggregate, kept across failures
    pub fn last_aggregate(&self) -> Option<DashboardAggregate> {
        self.lock().last_loaded.clone()
    }

    /// Fetch a fresh aggregate, or join the fetch already in flight
    pub async fn request_refresh(&self) -> RefreshResult {
        let (generation, in_flight) = {
            let mut inner = self.lock();
            match &inner.in_flight {
                Some((generation, fut)) => {
                    tracing::debug!("Dashboard refresh joined in-flight request #{}", generation);
                    (*generation, fut.clone())
                }
                None => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let fut = fetch(Arc::clone(&self.transport)).boxed().shared();
                    inner.in_flight = Some((generation, fut.clone()));
                    inner.state = DashboardState::Loading;
                    tracing::debug!("Dashboard refresh #{} started", generation);
                    (generation, fut)
                }
            }
        };

        let result = in_flight.await;
        self.settle(generation, &result);
        result
    }

    /// Record the outcome of refresh `generation` and render it, once
    fn settle(&self, generation: u64, result: &RefreshResult) {
        {
            let mut inner = self.lock();
            match &inner.in_flight {
                Some((current, _)) if *current == generation => {}
                // Another waiter already settled this refresh
                _ => return,
            }
            inner.in_flight = None;
            match result {
                Ok(aggregate) => {
                    inner.last_loaded = Some(aggregate.clone());
                    inner.state = DashboardState::Loaded;
                }
                Err(e) => inner.state = DashboardState::Failed(e.clone()),
            }
        }

        match result {
            Ok(aggregate) => {
                tracing::info!(
                    "Dashboard loaded: {} site(s), average score {}",
                    aggregate.total_sites,
                    aggregate.average_privacy_score
                );
                self.render(aggregate);
            }
            Err(e) => {
                tracing::warn!("Dashboard refresh failed: {}", e);
                self.render(&DashboardAggregate::default());
                if let Err(render_err) = self.sink.render_error(e) {
                    tracing::warn!("Failed to render dashboard error: {}", render_err);
                }
            }
        }
    }

    fn render(&self, aggregate: &DashboardAggregate) {
        let views = [
            ("counters", self.sink.render_counters(&aggregate.counters())),
            (
                "risk distribution",
                self.sink
                    .render_risk_distribution(&aggregate.risk_distribution),
            ),
            (
                "score trend",
                self.sink.render_score_trend(&aggregate.score_trend),
            ),
            (
                "cookie totals",
                self.sink.render_cookie_totals(&aggregate.cookie_totals),
            ),
        ];
        for (view, outcome) in views {
            if let Err(e) = outcome {
                tracing::warn!("Failed to render {} view: {}", view, e);
            }
        }
    }
}

async fn fetch(transport: Arc<dyn Transport>) -> RefreshResult {
    match transport.send(Request::GetDashboardData).await? {
        Payload::Dashboard(aggregate) => Ok(aggregate),
        other => Err(CoreError::TransportFailure(format!(
            "unexpected reply to GET_DASHBOARD_DATA: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ChannelError, RemoteError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Transport that waits for the gate before answering
    struct GatedTransport {
        calls: AtomicUsize,
        gate: Notify,
        reply: Mutex<Result<Payload, ChannelError>>,
    }

    impl GatedTransport {
        fn new(reply: Result<Payload, ChannelError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                reply: Mutex::new(reply),
            })
        }

        fn set_reply(&self, reply: Result<Payload, ChannelError>) {
            *self.reply.lock().unwrap() = reply;
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: Request) -> Result<Payload, ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.reply.lock().unwrap().clone()
        }
    }

    /// Sink that records which views were drawn
    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<String>>,
        fail_counters: bool,
    }

    impl RecordingSink {
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl RenderSink for RecordingSink {
        fn render_counters(&self, counters: &StatCounters) -> anyhow::Result<()> {
            if self.fail_counters {
                anyhow::bail!("counter widget detached");
            }
            self.push(format!("counters:{}", counters.total_sites));
            Ok(())
        }
        fn render_risk_distribution(&self, d: &RiskDistribution) -> anyhow::Result<()> {
            self.push(format!("risk:{}", d.total()));
            Ok(())
        }
        fn render_score_trend(&self, trend: &[u8]) -> anyhow::Result<()> {
            self.push(format!("trend:{:?}", trend));
            Ok(())
        }
        fn render_cookie_totals(&self, totals: &CookieTotals) -> anyhow::Result<()> {
            self.push(format!("cookies:{}", totals.values().sum::<u64>()));
            Ok(())
        }
        fn render_error(&self, error: &CoreError) -> anyhow::Result<()> {
            self.push(format!("error:{}", error));
            Ok(())
        }
    }

    fn loaded(total_sites: usize) -> DashboardAggregate {
        DashboardAggregate {
            total_sites,
            score_trend: vec![70, 50],
            ..DashboardAggregate::default()
        }
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_request() {
        let transport = GatedTransport::new(Ok(Payload::Dashboard(loaded(2))));
        let sink = Arc::new(RecordingSink::default());
        let controller = DashboardController::new(transport.clone(), sink.clone());

        let release = async {
            tokio::task::yield_now().await;
            transport.gate.notify_one();
        };
        let (first, second, ()) = tokio::join!(
            controller.request_refresh(),
            controller.request_refresh(),
            release
        );

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().total_sites, 2);
        assert_eq!(second.unwrap().total_sites, 2);
        assert_eq!(controller.state(), DashboardState::Loaded);
        // Rendered once, not once per waiter
        assert_eq!(
            sink.entries(),
            vec!["counters:2", "risk:0", "trend:[70, 50]", "cookies:0"]
        );
    }

    #[tokio::test]
    async fn test_failure_renders_zeroed_views_and_keeps_last_loaded() {
        let transport = GatedTransport::new(Ok(Payload::Dashboard(loaded(4))));
        let sink = Arc::new(RecordingSink::default());
        let controller = DashboardController::new(transport.clone(), sink.clone());
        assert_eq!(controller.state(), DashboardState::Idle);

        transport.gate.notify_one();
        controller.request_refresh().await.unwrap();

        transport.set_reply(Err(ChannelError::Remote(RemoteError::StorageUnavailable(
            "locked".into(),
        ))));
        transport.gate.notify_one();
        let err = controller.request_refresh().await.unwrap_err();

        assert_eq!(err, CoreError::StorageUnavailable("locked".into()));
        assert_eq!(controller.state(), DashboardState::Failed(err.clone()));
        assert_eq!(controller.last_aggregate().unwrap().total_sites, 4);
        assert_eq!(
            sink.entries()[4..],
            [
                "counters:0".to_string(),
                "risk:0".to_string(),
                "trend:[]".to_string(),
                "cookies:0".to_string(),
                format!("error:{}", err),
            ]
        );
        // Each refresh is one call; nothing retried on its own
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_one_failing_view_does_not_block_the_rest() {
        let transport = GatedTransport::new(Ok(Payload::Dashboard(loaded(1))));
        let sink = Arc::new(RecordingSink {
            fail_counters: true,
            ..RecordingSink::default()
        });
        let controller = DashboardController::new(transport.clone(), sink.clone());

        transport.gate.notify_one();
        controller.request_refresh().await.unwrap();
        assert_eq!(sink.entries(), vec!["risk:0", "trend:[70, 50]", "cookies:0"]);
    }

    #[tokio::test]
    async fn test_unexpected_payload_is_transport_failure() {
        let transport = GatedTransport::new(Ok(Payload::Recorded));
        let sink = Arc::new(RecordingSink::default());
        let controller = DashboardController::new(transport.clone(), sink);

        transport.gate.notify_one();
        assert!(matches!(
            controller.request_refresh().await,
            Err(CoreError::TransportFailure(_))
        ));
    }
}
