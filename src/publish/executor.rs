//! Publish state machine
//!
//! ```text
//! Idle → Preparing → ReadyToPublish → Publishing → {Published, Failed}
//!          └─ blocked / rate limited → Idle
//! ```
//!
//! At most one publish attempt runs per executor. The state machine itself is
//! the serialization point; there is no external lock around the service call.

use super::rate_limit::{RateLimiter, parse_wait_from_message};
use super::readiness::{PublishContent, PublishFormat, PublishReadiness, PublishReadinessGate};
use crate::clock::Clock;
use crate::error::FlowError;
use crate::history::{PublicationRecord, WorkflowHistoryStore};
use crate::service::{ContentService, PublishRequest, ServiceError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub content_id: String,
    pub format: PublishFormat,
    pub external_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishState {
    Idle,
    Preparing,
    ReadyToPublish {
        content: PublishContent,
        readiness: PublishReadiness,
    },
    Publishing {
        content_id: String,
    },
    Published(PublishOutcome),
    Failed {
        message: String,
        retryable: bool,
        retry_after: Option<u64>,
    },
}

impl PublishState {
    pub fn name(&self) -> &'static str {
        match self {
            PublishState::Idle => "idle",
            PublishState::Preparing => "preparing",
            PublishState::ReadyToPublish { .. } => "ready to publish",
            PublishState::Publishing { .. } => "publishing",
            PublishState::Published(_) => "published",
            PublishState::Failed { .. } => "failed",
        }
    }
}

struct ExecutorInner {
    service: Arc<dyn ContentService>,
    history: Arc<dyn WorkflowHistoryStore>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    state: Mutex<PublishState>,
}

/// Combines the readiness gate and rate limiter to publish exactly once per request
#[derive(Clone)]
pub struct PublishExecutor {
    inner: Arc<ExecutorInner>,
}

fn transition(state: &mut PublishState, next: PublishState) {
    tracing::debug!(from = state.name(), to = next.name(), "Publish state transition");
    *state = next;
}

impl PublishExecutor {
    pub fn new(
        service: Arc<dyn ContentService>,
        history: Arc<dyn WorkflowHistoryStore>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                service,
                history,
                limiter,
                clock,
                timeout,
                state: Mutex::new(PublishState::Idle),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublishState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PublishState {
        self.lock().clone()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Evaluate content and, if it passes and the limiter allows, arm a publish
    ///
    /// Blocked content returns the itemized readiness and leaves the executor
    /// idle; nothing is retried automatically.
    pub fn prepare(&self, content: PublishContent) -> Result<PublishReadiness, FlowError> {
        let mut state = self.lock();
        if matches!(*state, PublishState::Publishing { .. }) {
            return Err(FlowError::ConcurrentOperation);
        }
        transition(&mut state, PublishState::Preparing);

        let readiness = PublishReadinessGate::evaluate(&content);
        if !readiness.ready {
            tracing::info!(
                content_id = %content.content_id,
                issues = %readiness.blocking_summary(),
                "Content blocked by readiness checks"
            );
            transition(&mut state, PublishState::Idle);
            return Err(FlowError::ReadinessBlocked { readiness });
        }

        let now = self.inner.clock.now();
        if !self.inner.limiter.can_act_now(now) {
            let wait = self.inner.limiter.wait_seconds(now);
            transition(&mut state, PublishState::Idle);
            return Err(FlowError::RateLimitExceeded {
                retry_after: Some(wait),
                message: format!("next publish allowed in {} seconds", wait),
            });
        }

        transition(
            &mut state,
            PublishState::ReadyToPublish {
                content,
                readiness: readiness.clone(),
            },
        );
        Ok(readiness)
    }

    /// Perform the external publish for the prepared content
    pub async fn publish(&self) -> Result<PublishOutcome, FlowError> {
        let content = {
            let mut state = self.lock();
            let content = match &*state {
                PublishState::Publishing { .. } => return Err(FlowError::ConcurrentOperation),
                PublishState::ReadyToPublish { content, .. } => content.clone(),
                other => {
                    return Err(FlowError::InvalidState {
                        action: "publish".into(),
                        state: other.name().into(),
                    });
                }
            };

            let now = self.inner.clock.now();
            if !self.inner.limiter.can_act_now(now) {
                let wait = self.inner.limiter.wait_seconds(now);
                return Err(FlowError::RateLimitExceeded {
                    retry_after: Some(wait),
                    message: format!("next publish allowed in {} seconds", wait),
                });
            }

            transition(
                &mut state,
                PublishState::Publishing {
                    content_id: content.content_id.clone(),
                },
            );
            content
        };
        let _abandon = AbandonGuard { executor: self };

        let request = PublishRequest {
            content_id: content.content_id.clone(),
            format_variant: content.format,
        };
        tracing::info!(content_id = %request.content_id, format = %request.format_variant, "Publishing");

        let result = tokio::time::timeout(self.inner.timeout, self.inner.service.publish(&request))
            .await
            .unwrap_or_else(|_| Err(ServiceError::timeout(self.inner.timeout)));

        match result {
            Ok(response) if response.success => Ok(self.finish_published(content, response.external_url)),
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "the service declined the publish".into());
                Err(self.finish_failed(message, None, false))
            }
            Err(e) => Err(self.finish_failed(e.message(), e.retry_after_secs(), e.is_rate_limit())),
        }
    }

    /// Return to idle from any state except an in-flight publish
    pub fn reset(&self) -> Result<(), FlowError> {
        let mut state = self.lock();
        if matches!(*state, PublishState::Publishing { .. }) {
            return Err(FlowError::ConcurrentOperation);
        }
        transition(&mut state, PublishState::Idle);
        Ok(())
    }

    fn finish_published(&self, content: PublishContent, external_url: Option<String>) -> PublishOutcome {
        let now = self.inner.clock.now();
        self.inner.limiter.record_action(now);

        let outcome = PublishOutcome {
            content_id: content.content_id,
            format: content.format,
            external_url,
            published_at: now,
        };

        let record = PublicationRecord {
            content_id: outcome.content_id.clone(),
            format: outcome.format,
            external_url: outcome.external_url.clone(),
            published_at: now,
        };
        if let Err(e) = self.inner.history.record_publication(record) {
            tracing::warn!(content_id = %outcome.content_id, error = %e, "Failed to record publication");
        }

        tracing::info!(
            content_id = %outcome.content_id,
            url = ?outcome.external_url,
            "Published"
        );
        transition(&mut self.lock(), PublishState::Published(outcome.clone()));
        outcome
    }

    /// Structured wait beats message parsing; with neither, a rate-limit
    /// classification still marks the failure retryable with unknown duration
    fn finish_failed(&self, message: String, structured_wait: Option<u64>, rate_limited: bool) -> FlowError {
        let wait = structured_wait.or_else(|| parse_wait_from_message(&message));

        let (next, error) = match wait {
            Some(seconds) => {
                self.inner.limiter.start_countdown(seconds, move || {
                    tracing::info!(seconds, "Publish wait elapsed");
                });
                (
                    PublishState::Failed {
                        message: message.clone(),
                        retryable: true,
                        retry_after: Some(seconds),
                    },
                    FlowError::RateLimitExceeded {
                        retry_after: Some(seconds),
                        message,
                    },
                )
            }
            None if rate_limited => (
                PublishState::Failed {
                    message: message.clone(),
                    retryable: true,
                    retry_after: None,
                },
                FlowError::RateLimitExceeded {
                    retry_after: None,
                    message,
                },
            ),
            None => (
                PublishState::Failed {
                    message: message.clone(),
                    retryable: false,
                    retry_after: None,
                },
                FlowError::Publish {
                    message,
                    retryable: false,
                },
            ),
        };

        tracing::warn!(error = %error, "Publish failed");
        transition(&mut self.lock(), next);
        error
    }
}

/// Moves a still-publishing executor to a retryable failure when the
/// `publish` future is dropped before the service call returns
struct AbandonGuard<'a> {
    executor: &'a PublishExecutor,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.executor.lock();
        if let PublishState::Publishing { content_id } = &*state {
            tracing::warn!(content_id = %content_id, "Publish attempt abandoned");
            transition(
                &mut state,
                PublishState::Failed {
                    message: "publish attempt was cancelled before the service answered".into(),
                    retryable: true,
                    retry_after: None,
                },
            );
        }
    }
}
