//! Workflow submission

use super::catalog::WorkflowTemplateCatalog;
use super::model::WorkflowExecution;
use crate::clock::Clock;
use crate::error::FlowError;
use crate::service::{ContentService, CreateWorkflowRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Merges template defaults with caller overrides and issues creation requests
pub struct WorkflowSubmission {
    catalog: Arc<WorkflowTemplateCatalog>,
    service: Arc<dyn ContentService>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl WorkflowSubmission {
    pub fn new(
        catalog: Arc<WorkflowTemplateCatalog>,
        service: Arc<dyn ContentService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            service,
            clock,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit a workflow; the returned execution is the handle the tracker follows
    ///
    /// Nothing is sent when validation fails, and nothing is kept locally when
    /// the creation request fails.
    pub async fn submit(
        &self,
        template_id: &str,
        period: &str,
        overrides: HashMap<String, serde_json::Value>,
    ) -> Result<WorkflowExecution, FlowError> {
        if period.trim().is_empty() {
            return Err(FlowError::validation("period must not be empty"));
        }

        let template = self
            .catalog
            .get(template_id)
            .ok_or_else(|| FlowError::validation(format!("unknown template '{}'", template_id)))?;

        let options = merge_options(&template.default_options, overrides);
        let request = CreateWorkflowRequest {
            template_id: template_id.to_string(),
            period: period.to_string(),
            options,
        };

        let response = tokio::time::timeout(self.timeout, self.service.create_workflow(&request))
            .await
            .map_err(|_| {
                FlowError::submission(format!("creation request timed out after {:?}", self.timeout))
            })?
            .map_err(|e| FlowError::submission(e.to_string()))?;

        let execution = WorkflowExecution::starting(
            response.workflow_id,
            request.template_id,
            request.period,
            request.options,
            self.clock.now(),
        );

        tracing::info!(
            id = %execution.id,
            template = %execution.template_id,
            period = %execution.period,
            "Submitted workflow"
        );

        Ok(execution)
    }
}

/// Key-by-key merge; overrides win
pub fn merge_options(
    defaults: &HashMap<String, serde_json::Value>,
    overrides: HashMap<String, serde_json::Value>,
) -> HashMap<String, serde_json::Value> {
    let mut merged = defaults.clone();
    merged.extend(overrides);
    merged
}
