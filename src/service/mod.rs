//! Remote content service
//!
//! The content-generation and platform-posting service is an opaque
//! collaborator. This module defines the wire shapes it exchanges and an HTTP
//! client for it.
//!
//! # Example
//!
//! ```ignore
//! use postflow::service::{ContentService, HttpContentService};
//!
//! let service = HttpContentService::from_config(&config.service)?;
//! let status = service.workflow_status("wf-42").await?;
//! println!("{:?}", status.status);
//! ```

mod http;
#[cfg(test)]
pub mod mock;
mod types;

pub use http::HttpContentService;
pub use types::{
    ContentService, CreateWorkflowRequest, CreateWorkflowResponse, PublishRequest,
    PublishResponse, ServiceError, StatusResponse, TemplateCatalogResponse, TemplateDescriptor,
};
