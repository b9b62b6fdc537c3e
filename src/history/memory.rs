//! In-memory history store

use super::{HistoryFilter, PublicationRecord, WorkflowHistoryStore, newest_first};
use crate::error::FlowError;
use crate::workflow::WorkflowExecution;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryHistory {
    executions: RwLock<HashMap<String, WorkflowExecution>>,
    publications: RwLock<Vec<PublicationRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.read().map(|e| e.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> FlowError {
    FlowError::storage("history lock poisoned")
}

impl WorkflowHistoryStore for MemoryHistory {
    fn record(&self, execution: WorkflowExecution) -> Result<(), FlowError> {
        let mut executions = self.executions.write().map_err(poisoned)?;
        executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<WorkflowExecution>, FlowError> {
        let executions = self.executions.read().map_err(poisoned)?;
        Ok(executions.get(id).cloned())
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<WorkflowExecution>, FlowError> {
        let executions = self.executions.read().map_err(poisoned)?;
        let mut matching: Vec<_> = executions
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(newest_first);
        Ok(matching)
    }

    fn delete(&self, id: &str) -> Result<(), FlowError> {
        let mut executions = self.executions.write().map_err(poisoned)?;
        executions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| FlowError::not_found(id))
    }

    fn record_publication(&self, record: PublicationRecord) -> Result<(), FlowError> {
        self.publications.write().map_err(poisoned)?.push(record);
        Ok(())
    }

    fn publications(&self) -> Result<Vec<PublicationRecord>, FlowError> {
        let mut records = self.publications.read().map_err(poisoned)?.clone();
        records.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(records)
    }
}
