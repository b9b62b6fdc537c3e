//! Configuration types and loading for postflow

mod loader;
mod sections;
mod template;

pub use loader::PostflowConfig;
pub use sections::{HistorySettings, PublishSettings, ServiceConfig, TrackerSettings};
pub use template::TemplateConfig;
