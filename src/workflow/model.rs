//! Workflow data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named configuration describing a workflow's steps and default options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step names, in execution order
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub default_options: HashMap<String, serde_json::Value>,
}

/// Lifecycle status of an execution
///
/// Transitions only move forward: Starting → Executing → {Completed, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Starting,
    Executing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Position in the lifecycle; terminal statuses share the last rank
    pub fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Starting => 0,
            ExecutionStatus::Executing => 1,
            ExecutionStatus::Completed | ExecutionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            ExecutionStatus::Completed | ExecutionStatus::Failed => true,
            ExecutionStatus::Starting | ExecutionStatus::Executing => false,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic
    pub fn can_become(self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Starting => "starting",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one workflow step, as reported by the service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StepResult {
    pub fn success(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            message: None,
            error: None,
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// One tracked, multi-step content-generation job
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub template_id: String,
    pub period: String,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    /// Generated output per category (e.g. `affirmations: 5`)
    #[serde(default)]
    pub results: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// A freshly acknowledged execution
    pub fn starting(
        id: impl Into<String>,
        template_id: impl Into<String>,
        period: impl Into<String>,
        options: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            period: period.into(),
            options,
            status: ExecutionStatus::Starting,
            steps: Vec::new(),
            results: HashMap::new(),
            created_at: now,
            last_updated_at: now,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn successful_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ExecutionStatus::*;

        assert!(Starting.can_become(Starting));
        assert!(Starting.can_become(Executing));
        assert!(Starting.can_become(Completed));
        assert!(Executing.can_become(Failed));
        assert!(!Executing.can_become(Starting));
        assert!(!Completed.can_become(Executing));
        assert!(!Completed.can_become(Failed));
        assert!(!Failed.can_become(Completed));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Starting.is_terminal());
        assert!(!ExecutionStatus::Executing.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionStatus::Executing).unwrap();
        assert_eq!(json, "\"executing\"");
        assert_eq!(ExecutionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_execution_step_summary() {
        let mut execution = WorkflowExecution::starting(
            "wf-1",
            "full",
            "Energie",
            HashMap::new(),
            Utc::now(),
        );
        execution.steps = vec![
            StepResult::success("affirmations"),
            StepResult::failure("images", "quota exceeded"),
        ];

        assert_eq!(execution.successful_steps(), 1);
        assert_eq!(execution.failed_steps(), vec!["images"]);
        assert!(!execution.is_terminal());
    }
}
