//! History of finished executions and publications
//!
//! Executions land here exactly once, when the tracker sees them reach a
//! terminal status. After that they are immutable apart from deletion.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryHistory;
pub use sqlite::SqliteHistory;

use crate::error::FlowError;
use crate::publish::PublishFormat;
use crate::workflow::WorkflowExecution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Optional list filters; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub period: Option<String>,
    pub template_id: Option<String>,
}

impl HistoryFilter {
    pub fn period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    pub fn template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.period.as_ref().is_none_or(|p| *p == execution.period)
            && self
                .template_id
                .as_ref()
                .is_none_or(|t| *t == execution.template_id)
    }
}

/// A successful publish
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PublicationRecord {
    pub content_id: String,
    pub format: PublishFormat,
    pub external_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Store of terminal executions
pub trait WorkflowHistoryStore: Send + Sync {
    /// Append, or replace an entry with the same id
    fn record(&self, execution: WorkflowExecution) -> Result<(), FlowError>;

    fn get(&self, id: &str) -> Result<Option<WorkflowExecution>, FlowError>;

    /// Matching executions, newest first
    fn list(&self, filter: &HistoryFilter) -> Result<Vec<WorkflowExecution>, FlowError>;

    fn delete(&self, id: &str) -> Result<(), FlowError>;

    fn record_publication(&self, record: PublicationRecord) -> Result<(), FlowError>;

    /// Publications, newest first
    fn publications(&self) -> Result<Vec<PublicationRecord>, FlowError>;

    /// Per-category artifact counts for one execution
    fn aggregate(&self, id: &str) -> Result<BTreeMap<String, u64>, FlowError> {
        self.get(id)?
            .map(|execution| aggregate_results(&execution))
            .ok_or_else(|| FlowError::not_found(id))
    }

    fn last_publication_at(&self) -> Result<Option<DateTime<Utc>>, FlowError> {
        Ok(self
            .publications()?
            .into_iter()
            .map(|p| p.published_at)
            .max())
    }
}

/// Count artifacts per result category
pub fn aggregate_results(execution: &WorkflowExecution) -> BTreeMap<String, u64> {
    execution
        .results
        .iter()
        .map(|(category, value)| (category.clone(), count_value(value)))
        .collect()
}

fn count_value(value: &serde_json::Value) -> u64 {
    use serde_json::Value;

    match value {
        Value::Null => 0,
        Value::Bool(b) => u64::from(*b),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(_) => 1,
        Value::Array(items) => items.len() as u64,
        Value::Object(map) => map.len() as u64,
    }
}

/// Newest first, ties broken by id so ordering is stable across stores
pub(crate) fn newest_first(a: &WorkflowExecution, b: &WorkflowExecution) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
