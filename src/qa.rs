// Q&A session - questions grounded in one analysis
//
// A session binds one `AnalysisRecord` as its context and keeps the log of
// answered questions. Binding a new context replaces the log. Only answered
// questions are logged; a failed ask leaves the log exactly as it was.
//
// Ordering: callers normally await each `ask` before the next, which keeps
// the log in request order. Concurrent asks are allowed and land in the log
// in the order their answers arrive.

use crate::error::CoreError;
use crate::messaging::{Payload, Request, Transport};
use crate::model::AnalysisRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Provider preference, re-read before every ask so a settings change takes
/// effect on the next question
pub type SharedProvider = Arc<Mutex<String>>;

/// One answered question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaTurn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct SessionState {
    context: Option<AnalysisRecord>,
    history: Vec<QaTurn>,
    /// Bumped whenever the context is replaced or the log cleared
    epoch: u64,
}

pub struct QaSession {
    transport: Arc<dyn Transport>,
    provider: SharedProvider,
    state: Mutex<SessionState>,
}

impl QaSession {
    pub fn new(transport: Arc<dyn Transport>, provider: SharedProvider) -> Self {
        Self {
            transport,
            provider,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind `context` and start a fresh log
    ///
    /// Fails with `NoContext` for a missing record (or one without an id),
    /// leaving any existing session untouched.
    pub fn initialize(&self, context: Option<AnalysisRecord>) -> Result<(), CoreError> {
        let context = match context {
            Some(record) if !record.id.trim().is_empty() => record,
            _ => return Err(CoreError::NoContext),
        };

        let mut state = self.lock();
        tracing::debug!(
            "Q&A context bound to {} ({} earlier turn(s) dropped)",
            context.id,
            state.history.len()
        );
        state.context = Some(context);
        state.history.clear();
        state.epoch += 1;
        Ok(())
    }

    /// Ask about the bound analysis
    ///
    /// Fails fast with `NoContext` before any request is sent.
    pub async fn ask(&self, question: &str) -> Result<String, CoreError> {
        let (context, epoch) = {
            let state = self.lock();
            match &state.context {
                Some(context) => (context.clone(), state.epoch),
                None => return Err(CoreError::NoContext),
            }
        };
        let provider = self.provider();

        let request = Request::AskQuestion {
            question: question.to_string(),
            context,
            provider,
        };
        let answer = match self.transport.send(request).await? {
            Payload::Answer(answer) => answer,
            other => {
                return Err(CoreError::TransportFailure(format!(
                    "unexpected reply to ASK_QUESTION: {:?}",
                    other
                )))
            }
        };

        let mut state = self.lock();
        if state.epoch == epoch {
            state.history.push(QaTurn {
                question: question.to_string(),
                answer: answer.clone(),
                timestamp: Utc::now(),
            });
        } else {
            // Context replaced or log cleared while this question was out
            tracing::debug!("Not logging answer to a question from before the last reset");
        }
        Ok(answer)
    }

    pub fn history(&self) -> Vec<QaTurn> {
        self.lock().history.clone()
    }

    /// Empty the log; the context stays bound
    ///
    /// Answers to questions still in flight are not logged afterwards.
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.history.clear();
        state.epoch += 1;
    }

    pub fn context(&self) -> Option<AnalysisRecord> {
        self.lock().context.clone()
    }

    /// Provider the next ask will use
    pub fn provider(&self) -> String {
        self.provider
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Switch provider; takes effect on the next ask
    pub fn set_provider(&self, name: &str) {
        *self.provider.lock().unwrap_or_else(|e| e.into_inner()) = name.trim().to_string();
    }
}

/// Text shown for a chat turn: the answer, or the error in its place
pub fn display_answer(result: &Result<String, CoreError>) -> String {
    match result {
        Ok(answer) => answer.clone(),
        Err(e) => format!("Error: {}", e),
    }
}
