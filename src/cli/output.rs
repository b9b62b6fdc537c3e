//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::error::{ErrorKind, FlowError};
use crate::publish::PublishReadiness;
use crate::workflow::{ExecutionStatus, WorkflowExecution, WorkflowTemplate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted by commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    Template {
        id: String,
        name: String,
        description: String,
        steps: Vec<String>,
    },
    Submitted {
        id: String,
        template: String,
        period: String,
    },
    StatusChanged {
        id: String,
        status: ExecutionStatus,
        steps_completed: usize,
    },
    ExecutionFinished {
        id: String,
        status: ExecutionStatus,
        results: BTreeMap<String, u64>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        failed_steps: Vec<String>,
        error: Option<String>,
    },
    HistoryEntry {
        id: String,
        template: String,
        period: String,
        status: ExecutionStatus,
        created_at: DateTime<Utc>,
    },
    Stats {
        id: String,
        counts: BTreeMap<String, u64>,
    },
    Readiness {
        ready: bool,
        caption_length: usize,
        hashtag_count: usize,
        blocking: Vec<String>,
        advisories: Vec<String>,
    },
    Published {
        content_id: String,
        format: String,
        url: Option<String>,
    },
    Error {
        error: String,
        kind: ErrorKind,
        retry_after: Option<u64>,
    },
    Info {
        message: String,
    },
    Debug {
        message: String,
    },
}

impl OutputEvent {
    pub fn template(template: &WorkflowTemplate) -> Self {
        Self::Template {
            id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            steps: template.steps.clone(),
        }
    }

    pub fn history_entry(execution: &WorkflowExecution) -> Self {
        Self::HistoryEntry {
            id: execution.id.clone(),
            template: execution.template_id.clone(),
            period: execution.period.clone(),
            status: execution.status,
            created_at: execution.created_at,
        }
    }

    pub fn readiness(readiness: &PublishReadiness) -> Self {
        Self::Readiness {
            ready: readiness.ready,
            caption_length: readiness.caption_length,
            hashtag_count: readiness.hashtag_count,
            blocking: readiness.blocking_issues.iter().map(ToString::to_string).collect(),
            advisories: readiness.advisories.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn flow_error(error: &FlowError) -> Self {
        Self::Error {
            error: error.to_string(),
            kind: error.kind(),
            retry_after: error.retry_after(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_counts(counts: &BTreeMap<String, u64>) -> String {
        counts
            .iter()
            .map(|(category, n)| format!("{}: {}", category, n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Template {
                id,
                name,
                description,
                steps,
            } => {
                println!("{} - {} ({} steps)", id, name, steps.len());
                if !description.is_empty() {
                    println!("  {}", description);
                }
            }
            OutputEvent::Submitted { id, template, period } => {
                eprintln!("Submitted '{}' for {} as {}", template, period, id);
            }
            OutputEvent::StatusChanged {
                id,
                status,
                steps_completed,
            } => {
                eprintln!("  {} {} ({} steps done)", id, status, steps_completed);
            }
            OutputEvent::ExecutionFinished {
                id,
                status,
                results,
                failed_steps,
                error,
            } => {
                if status == ExecutionStatus::Completed {
                    eprintln!("✓ {} completed", id);
                } else {
                    eprintln!("✗ {} {}", id, status);
                }
                if !results.is_empty() {
                    println!("{}", Self::format_counts(&results));
                }
                if !failed_steps.is_empty() {
                    eprintln!("  failed steps: {}", failed_steps.join(", "));
                }
                if let Some(error) = error {
                    eprintln!("  {}", error);
                }
            }
            OutputEvent::HistoryEntry {
                id,
                template,
                period,
                status,
                created_at,
            } => {
                println!(
                    "{}  {:<10} {:<12} {:<16} {}",
                    created_at.format("%Y-%m-%d %H:%M"),
                    status,
                    template,
                    period,
                    id
                );
            }
            OutputEvent::Stats { id, counts } => {
                if counts.is_empty() {
                    println!("{}: no results", id);
                } else {
                    println!("{}: {}", id, Self::format_counts(&counts));
                }
            }
            OutputEvent::Readiness {
                ready,
                caption_length,
                hashtag_count,
                blocking,
                advisories,
            } => {
                let mark = if ready { "✓" } else { "✗" };
                println!(
                    "{} {} characters, {} hashtags",
                    mark, caption_length, hashtag_count
                );
                for issue in blocking {
                    println!("  blocking: {}", issue);
                }
                for advisory in advisories {
                    println!("  note: {}", advisory);
                }
            }
            OutputEvent::Published {
                content_id,
                format,
                url,
            } => {
                println!("✓ Published {} as {}", content_id, format);
                if let Some(url) = url {
                    println!("  {}", url);
                }
            }
            OutputEvent::Error {
                error, retry_after, ..
            } => match retry_after {
                Some(seconds) => eprintln!("Error: {} (retry in {}s)", error, seconds),
                None => eprintln!("Error: {}", error),
            },
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }
}

/// JSON output handler, one object per line
pub struct JsonHandler;

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        if let Ok(s) = serde_json::to_string(&event) {
            println!("{}", s);
        }
    }
}

/// Quiet handler: only errors reach the terminal
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::Error { error, .. } = event {
            eprintln!("Error: {}", error);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}

/// Handler that records events, for command tests
#[cfg(test)]
#[derive(Default)]
pub struct RecordingHandler {
    events: std::sync::Mutex<Vec<OutputEvent>>,
}

#[cfg(test)]
impl RecordingHandler {
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl OutputHandler for RecordingHandler {
    fn emit(&self, event: OutputEvent) {
        self.events.lock().unwrap().push(event);
    }
}
