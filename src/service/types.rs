//! Core types and trait for the remote content service

use crate::publish::PublishFormat;
use crate::workflow::{ExecutionStatus, StepResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures talking to the content service
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Rate limited by the service, with its structured wait value when supplied
    #[error("rate limited: {message}")]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl ServiceError {
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn rate_limit(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::RateLimit {
            retry_after,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Server-supplied wait value, rounded up to whole seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimit {
                retry_after: Some(d),
                ..
            } => Some(d.as_secs() + u64::from(d.subsec_nanos() > 0)),
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ServiceError::RateLimit { .. })
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            ServiceError::RateLimit { message, .. }
            | ServiceError::Auth { message }
            | ServiceError::Network { message }
            | ServiceError::Parse { message }
            | ServiceError::Rejected { message, .. }
            | ServiceError::NotFound { message }
            | ServiceError::Config { message } => message.clone(),
            ServiceError::Timeout { .. } => self.to_string(),
        }
    }
}

/// Template catalog as returned by the service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplateCatalogResponse {
    #[serde(default)]
    pub templates: HashMap<String, TemplateDescriptor>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub default_options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub template_id: String,
    pub period: String,
    pub options: HashMap<String, serde_json::Value>,
}

/// Creation is acknowledged asynchronously; only the id comes back
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowResponse {
    pub workflow_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub results: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub error: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub content_id: String,
    pub format_variant: PublishFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub success: bool,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The external content-generation and platform-posting service
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn templates(&self) -> Result<TemplateCatalogResponse, ServiceError>;

    async fn create_workflow(
        &self,
        request: &CreateWorkflowRequest,
    ) -> Result<CreateWorkflowResponse, ServiceError>;

    async fn workflow_status(&self, workflow_id: &str) -> Result<StatusResponse, ServiceError>;

    async fn publish(&self, request: &PublishRequest) -> Result<PublishResponse, ServiceError>;
}
