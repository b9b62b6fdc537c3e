//! Workflow lifecycle: catalog → submission → tracker → history

mod catalog;
mod model;
mod submission;
mod tracker;

pub use catalog::WorkflowTemplateCatalog;
pub use model::{ExecutionStatus, StepResult, WorkflowExecution, WorkflowTemplate};
pub use submission::{WorkflowSubmission, merge_options};
pub use tracker::{ApplyOutcome, PollCycle, TrackerConfig, TrackerEvent, WorkflowTracker};
