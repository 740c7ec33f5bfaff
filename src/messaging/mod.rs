// Messaging channel - async request/response between the UI side and the
// background side
//
// Every history and AI access goes through `Transport::send`. The in-process
// transport is a bounded mpsc queue of envelopes, each carrying a oneshot for
// its single reply. The native-messaging host speaks the same requests as
// framed JSON over stdio (see `native`).
//
// Request flow:
//   UI (dashboard / qa / cli) -> Transport::send -> mpsc -> background::run
//                             <- oneshot reply  <-

pub mod native;
pub mod wire;

use crate::aggregate::DashboardAggregate;
use crate::model::AnalysisRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Requests understood by the background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")] // {"type": "ASK_QUESTION", ...}
pub enum Request {
    /// Recompute the dashboard aggregate from the full history
    GetDashboardData,

    /// Answer a question grounded in one analysis
    AskQuestion {
        question: String,
        context: AnalysisRecord,
        provider: String,
    },

    /// Append a completed analysis to the history
    RecordAnalysis { record: AnalysisRecord },

    /// Every record, sorted by analyzed_at
    GetHistory,
}

/// Request discriminant, used to pick the reply shape off the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    GetDashboardData,
    AskQuestion,
    RecordAnalysis,
    GetHistory,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::GetDashboardData => RequestKind::GetDashboardData,
            Request::AskQuestion { .. } => RequestKind::AskQuestion,
            Request::RecordAnalysis { .. } => RequestKind::RecordAnalysis,
            Request::GetHistory => RequestKind::GetHistory,
        }
    }
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::GetDashboardData => "GET_DASHBOARD_DATA",
            RequestKind::AskQuestion => "ASK_QUESTION",
            RequestKind::RecordAnalysis => "RECORD_ANALYSIS",
            RequestKind::GetHistory => "GET_HISTORY",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful reply bodies, one per request kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Dashboard(DashboardAggregate),
    Answer(String),
    Recorded,
    History(Vec<AnalysisRecord>),
}

impl Payload {
    fn kind_name(&self) -> &'static str {
        match self {
            Payload::Dashboard(_) => "dashboard",
            Payload::Answer(_) => "answer",
            Payload::Recorded => "recorded",
            Payload::History(_) => "history",
        }
    }
}

/// Failures reported by the background side (`{success: false, error}`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("{0}")]
    StorageUnavailable(String),
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Stable code carried next to the message on the wire
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::StorageUnavailable(_) => "storage_unavailable",
            RemoteError::Provider(_) => "provider_failure",
            RemoteError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// What the background sends back for one request
pub type Reply = Result<Payload, RemoteError>;

/// Outcome of a `send` as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The call never completed: closed channel, dropped reply, timeout,
    /// malformed or mismatched response
    #[error("{0}")]
    Transport(String),

    /// The call completed with an explicit failure
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// The single typed send primitive every UI component calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Suspend until exactly one reply (or a transport failure) arrives
    async fn send(&self, request: Request) -> Result<Payload, ChannelError>;
}

/// One queued request and the slot its reply goes into
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: oneshot::Sender<Reply>,
}

/// In-process transport backed by a bounded mpsc queue
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Envelope>,
    timeout: Option<Duration>,
}

impl ChannelTransport {
    /// Fail calls that take longer than `timeout` end to end.
    ///
    /// Expiry is reported as a transport failure. The background still
    /// finishes the request; its reply is discarded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn round_trip(&self, request: Request) -> Result<Payload, ChannelError> {
        let kind = request.kind();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChannelError::Transport("background channel closed".to_string()))?;

        let reply = reply_rx.await.map_err(|_| {
            ChannelError::Transport(format!("{} dropped without a reply", kind))
        })?;
        let payload = reply?;
        check_reply_kind(kind, &payload)?;
        Ok(payload)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, request: Request) -> Result<Payload, ChannelError> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.round_trip(request)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Transport(format!(
                    "no reply within {}ms",
                    limit.as_millis()
                ))),
            },
            None => self.round_trip(request).await,
        }
    }
}

/// Create a transport and the receiving end the background drains
pub fn channel(buffer: usize) -> (ChannelTransport, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelTransport { tx, timeout: None }, rx)
}

/// A reply whose shape doesn't match the request is a protocol error
fn check_reply_kind(kind: RequestKind, payload: &Payload) -> Result<(), ChannelError> {
    let matches = matches!(
        (kind, payload),
        (RequestKind::GetDashboardData, Payload::Dashboard(_))
            | (RequestKind::AskQuestion, Payload::Answer(_))
            | (RequestKind::RecordAnalysis, Payload::Recorded)
            | (RequestKind::GetHistory, Payload::History(_))
    );
    if matches {
        Ok(())
    } else {
        Err(ChannelError::Transport(format!(
            "{} answered with a {} reply",
            kind,
            payload.kind_name()
        )))
    }
}
