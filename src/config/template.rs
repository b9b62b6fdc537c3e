//! Locally declared workflow templates

use crate::workflow::WorkflowTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A `[templates.<id>]` table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Step names, in execution order
    #[serde(default)]
    pub steps: Vec<String>,

    /// Options sent with every submission unless overridden
    #[serde(default)]
    pub default_options: HashMap<String, serde_json::Value>,
}

impl TemplateConfig {
    pub fn to_template(&self, id: &str) -> WorkflowTemplate {
        WorkflowTemplate {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self.steps.clone(),
            default_options: self.default_options.clone(),
        }
    }
}
