//! CLI command implementations
//!
//! Commands return a process exit code; `Err` carries a message for failures
//! that happen before the command could do anything useful.

use super::output::{OutputEvent, OutputHandler};
use super::signals::{CancellationToken, with_cancellation};
use crate::clock::Clock;
use crate::config::{HistorySettings, PostflowConfig};
use crate::error::FlowError;
use crate::history::{
    HistoryFilter, MemoryHistory, SqliteHistory, WorkflowHistoryStore, aggregate_results,
};
use crate::publish::{PublishContent, PublishExecutor, PublishFormat, PublishReadinessGate, RateLimiter};
use crate::service::ContentService;
use crate::workflow::{
    ExecutionStatus, TrackerEvent, WorkflowSubmission, WorkflowTemplateCatalog, WorkflowTracker,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Exit code for a run interrupted by a signal
pub const EXIT_INTERRUPTED: i32 = 130;

/// Shared collaborators for every command
pub struct AppContext {
    pub config: PostflowConfig,
    pub history: Arc<dyn WorkflowHistoryStore>,
    pub clock: Arc<dyn Clock>,
    service: Option<Arc<dyn ContentService>>,
}

impl AppContext {
    pub fn new(
        config: PostflowConfig,
        history: Arc<dyn WorkflowHistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            history,
            clock,
            service: None,
        }
    }

    pub fn with_service(mut self, service: Arc<dyn ContentService>) -> Self {
        self.service = Some(service);
        self
    }

    fn service(&self) -> Result<Arc<dyn ContentService>, String> {
        self.service
            .clone()
            .ok_or_else(|| "no content service configured (set [service] base_url)".to_string())
    }

    /// Local templates plus whatever the service offers; a failed fetch is not fatal
    async fn catalog(&self, handler: &dyn OutputHandler) -> WorkflowTemplateCatalog {
        let mut catalog = WorkflowTemplateCatalog::from_config(&self.config.templates);
        if let Some(service) = &self.service {
            if let Err(e) = catalog.refresh(service.as_ref()).await {
                tracing::warn!(error = %e, "Could not fetch remote templates");
                handler.emit(OutputEvent::Debug {
                    message: format!("using local templates only: {}", e),
                });
            }
        }
        catalog
    }
}

/// Open the configured history store
pub fn open_history(settings: &HistorySettings) -> Result<Arc<dyn WorkflowHistoryStore>, FlowError> {
    match settings.resolved_path() {
        Some(path) => Ok(Arc::new(SqliteHistory::open(&path)?)),
        None => Ok(Arc::new(MemoryHistory::new())),
    }
}

/// List available templates
pub async fn list_templates(ctx: &AppContext, handler: &dyn OutputHandler) -> i32 {
    let catalog = ctx.catalog(handler).await;
    if catalog.is_empty() {
        handler.emit(OutputEvent::info("(no templates available)"));
        return 0;
    }
    for template in catalog.list() {
        handler.emit(OutputEvent::template(template));
    }
    0
}

/// Submit a workflow and follow it until it finishes or the token is cancelled
pub async fn run_workflow(
    ctx: &AppContext,
    template_id: &str,
    period: &str,
    args: &[String],
    token: &CancellationToken,
    handler: &dyn OutputHandler,
) -> Result<i32, String> {
    let service = ctx.service()?;
    let overrides = parse_options(args)?;

    let catalog = Arc::new(ctx.catalog(handler).await);
    let submission = WorkflowSubmission::new(catalog, service.clone(), ctx.clock.clone())
        .with_timeout(Duration::from_secs(ctx.config.service.timeout));
    let tracker = WorkflowTracker::new(
        service,
        ctx.history.clone(),
        ctx.clock.clone(),
        ctx.config.tracker.to_tracker_config(),
    );
    let mut events = tracker.subscribe();

    let submitted = with_cancellation(token, submission.submit(template_id, period, overrides)).await;
    let execution = match submitted {
        None => {
            handler.emit(OutputEvent::info("Cancelled before the workflow was submitted"));
            return Ok(EXIT_INTERRUPTED);
        }
        Some(Ok(execution)) => execution,
        Some(Err(e)) => {
            handler.emit(OutputEvent::flow_error(&e));
            return Ok(1);
        }
    };
    let id = execution.id.clone();
    handler.emit(OutputEvent::Submitted {
        id: id.clone(),
        template: execution.template_id.clone(),
        period: execution.period.clone(),
    });

    tracker.track(execution).map_err(|e| e.to_string())?;
    tracker.start();

    let exit_code = loop {
        let event = tokio::select! {
            _ = token.cancelled() => {
                handler.emit(OutputEvent::info(format!("Stopped following {}", id)));
                break EXIT_INTERRUPTED;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(TrackerEvent::Updated(execution)) if execution.id == id => {
                handler.emit(OutputEvent::StatusChanged {
                    id: execution.id.clone(),
                    status: execution.status,
                    steps_completed: execution.successful_steps(),
                });
            }
            Ok(TrackerEvent::Finished(execution)) if execution.id == id => {
                let exit_code = i32::from(execution.status != ExecutionStatus::Completed);
                handler.emit(OutputEvent::ExecutionFinished {
                    id: execution.id.clone(),
                    status: execution.status,
                    results: aggregate_results(&execution),
                    failed_steps: execution.failed_steps().into_iter().map(String::from).collect(),
                    error: execution.error.clone(),
                });
                break exit_code;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Tracker events lagged");
            }
            Err(RecvError::Closed) => {
                break 1;
            }
        }
    };

    tracker.shutdown();
    Ok(exit_code)
}

/// Parse `key=value` workflow options; values that parse as JSON keep their type
pub fn parse_options(args: &[String]) -> Result<HashMap<String, serde_json::Value>, String> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("missing option name in '{}'", arg));
            }
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

/// List finished executions
pub fn show_history(ctx: &AppContext, filter: &HistoryFilter, handler: &dyn OutputHandler) -> i32 {
    match ctx.history.list(filter) {
        Ok(executions) if executions.is_empty() => {
            handler.emit(OutputEvent::info("(no executions in history)"));
            0
        }
        Ok(executions) => {
            for execution in &executions {
                handler.emit(OutputEvent::history_entry(execution));
            }
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::flow_error(&e));
            1
        }
    }
}

/// Delete an execution from history
pub fn forget(ctx: &AppContext, id: &str, handler: &dyn OutputHandler) -> i32 {
    match ctx.history.delete(id) {
        Ok(()) => {
            handler.emit(OutputEvent::info(format!("Removed {}", id)));
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::flow_error(&e));
            1
        }
    }
}

/// Per-category artifact counts of one execution
pub fn stats(ctx: &AppContext, id: &str, handler: &dyn OutputHandler) -> i32 {
    match ctx.history.aggregate(id) {
        Ok(counts) => {
            handler.emit(OutputEvent::Stats {
                id: id.to_string(),
                counts,
            });
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::flow_error(&e));
            1
        }
    }
}

/// Evaluate content against platform constraints without publishing
pub fn check(content: &PublishContent, handler: &dyn OutputHandler) -> i32 {
    let readiness = PublishReadinessGate::evaluate(content);
    handler.emit(OutputEvent::readiness(&readiness));
    if readiness.ready { 0 } else { 1 }
}

/// Publish a completed execution's content
pub async fn publish(
    ctx: &AppContext,
    execution_id: &str,
    caption: &str,
    format: PublishFormat,
    token: &CancellationToken,
    handler: &dyn OutputHandler,
) -> Result<i32, String> {
    let service = ctx.service()?;

    let execution = ctx
        .history
        .get(execution_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no execution '{}' in history", execution_id))?;
    if execution.status != ExecutionStatus::Completed {
        return Err(format!(
            "execution '{}' is {}, only completed executions can be published",
            execution_id, execution.status
        ));
    }

    let last_action = ctx.history.last_publication_at().map_err(|e| e.to_string())?;
    let limiter = RateLimiter::new(ctx.config.publish.min_interval).with_last_action(last_action);
    let executor = PublishExecutor::new(
        service,
        ctx.history.clone(),
        limiter,
        ctx.clock.clone(),
        Duration::from_secs(ctx.config.publish.timeout),
    );

    let content = PublishContent::from_caption(execution_id, caption, format);
    let result = match executor.prepare(content) {
        Ok(readiness) => {
            handler.emit(OutputEvent::readiness(&readiness));
            match with_cancellation(token, executor.publish()).await {
                Some(result) => result,
                None => {
                    handler.emit(OutputEvent::info(format!(
                        "Publish of {} cancelled, state: {}",
                        execution_id,
                        executor.state().name()
                    )));
                    return Ok(EXIT_INTERRUPTED);
                }
            }
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => {
            handler.emit(OutputEvent::Published {
                content_id: outcome.content_id,
                format: outcome.format.to_string(),
                url: outcome.external_url,
            });
            Ok(0)
        }
        Err(FlowError::ReadinessBlocked { readiness }) => {
            handler.emit(OutputEvent::readiness(&readiness));
            Ok(1)
        }
        Err(e) => {
            handler.emit(OutputEvent::flow_error(&e));
            Ok(1)
        }
    }
}
