//! Conversational query pipeline.
//!
//! A request walks a fixed set of stages. [`next_stage`] is the whole transition table;
//! [`ChatPipeline::run_stage`] maps each stage to its work. Only `Classify`,
//! `ParseQuery` (analytical intents) and `GenerateResponse` (non-conversational
//! intents) reach outside the process.

use crate::compose::{compose, Composed};
use crate::handlers::{handle, Outcome};
use crate::intent::{classify_intent, Intent};
use crate::metrics::{CHAT_LATENCY_SECONDS, CHAT_QUERIES_TOTAL, STORAGE_FAILURES_TOTAL};
use crate::model::{ChatResponse, UserId};
use crate::nlm::{Classifier, Extractor};
use crate::params::{extract_parameters, QueryParameters};
use crate::store::EnergyStore;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    ValidateAccess,
    EnrichContext,
    ParseQuery,
    GenerateResponse,
    End,
}

/// Pure transition function. `intent` is the classified intent (ignored before
/// classification has run).
pub fn next_stage(stage: Stage, intent: Intent) -> Stage {
    match stage {
        Stage::Classify if intent.is_conversational() => Stage::GenerateResponse,
        Stage::Classify => Stage::ValidateAccess,
        Stage::ValidateAccess if intent.needs_parameters() => Stage::EnrichContext,
        Stage::ValidateAccess => Stage::ParseQuery,
        Stage::EnrichContext => Stage::ParseQuery,
        Stage::ParseQuery => Stage::GenerateResponse,
        Stage::GenerateResponse | Stage::End => Stage::End,
    }
}

/// State carried through one request. Dropped when the request completes.
#[derive(Debug, Clone)]
pub struct QuerySession {
    pub chat_id: String,
    pub user_id: UserId,
    pub query: String,
    pub intent: Intent,
    pub params: QueryParameters,
    pub outcome: Option<Outcome>,
}

impl QuerySession {
    pub fn new(query: &str, user_id: UserId, chat_id: Option<String>) -> Self {
        let chat_id = chat_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            chat_id,
            user_id,
            query: query.to_string(),
            intent: Intent::OffTopic,
            params: QueryParameters::default(),
            outcome: None,
        }
    }
}

/// Entry point of the chat core. Cheap to clone; holds only shared collaborators.
#[derive(Clone)]
pub struct ChatPipeline {
    classifier: Arc<dyn Classifier>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn EnergyStore>,
}

impl ChatPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn EnergyStore>,
    ) -> Self {
        Self {
            classifier,
            extractor,
            store,
        }
    }

    /// Answers `query` for `user_id`. Always returns a response with a non-empty
    /// `chat_id` and `answer`; failures are folded into the answer text.
    pub async fn process(
        &self,
        query: &str,
        user_id: UserId,
        chat_id: Option<String>,
    ) -> ChatResponse {
        let started = Instant::now();
        let mut session = QuerySession::new(query, user_id, chat_id);

        let mut stage = Stage::Classify;
        while stage != Stage::End {
            debug!(chat_id = %session.chat_id, ?stage, "Running stage");
            self.run_stage(stage, &mut session).await;
            stage = next_stage(stage, session.intent);
        }

        let outcome = session.outcome.take().unwrap_or(Outcome::Failed);
        let Composed { answer, data } = compose(&outcome);

        CHAT_QUERIES_TOTAL
            .with_label_values(&[session.intent.as_str()])
            .inc();
        CHAT_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
        info!(
            chat_id = %session.chat_id,
            user_id,
            intent = %session.intent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered chat query"
        );

        ChatResponse {
            chat_id: session.chat_id,
            answer,
            data,
        }
    }

    async fn run_stage(&self, stage: Stage, session: &mut QuerySession) {
        match stage {
            Stage::Classify => {
                session.intent = classify_intent(self.classifier.as_ref(), &session.query).await;
            }
            Stage::ValidateAccess => validate_access(session),
            Stage::EnrichContext => {}
            Stage::ParseQuery => {
                if session.intent.needs_parameters() {
                    session.params =
                        extract_parameters(self.extractor.as_ref(), &session.query).await;
                }
            }
            Stage::GenerateResponse => {
                session.outcome = Some(self.generate(session).await);
            }
            Stage::End => {}
        }
    }

    async fn generate(&self, session: &QuerySession) -> Outcome {
        if session.intent.is_conversational() {
            return Outcome::SmallTalk(session.intent);
        }

        match handle(
            self.store.as_ref(),
            session.user_id,
            session.intent,
            &session.params,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    chat_id = %session.chat_id,
                    intent = %session.intent,
                    error = %e,
                    "Handler failed"
                );
                STORAGE_FAILURES_TOTAL.inc();
                Outcome::Failed
            }
        }
    }
}

/// Hook for per-request authorization. The owner id is trusted as given today.
fn validate_access(session: &QuerySession) {
    debug!(chat_id = %session.chat_id, user_id = session.user_id, "Access validated");
}
