//! HTTP client for the content service

use super::types::{
    ContentService, CreateWorkflowRequest, CreateWorkflowResponse, PublishRequest,
    PublishResponse, ServiceError, StatusResponse, TemplateCatalogResponse,
};
use crate::config::ServiceConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// JSON-over-HTTP implementation of [`ContentService`]
#[derive(Debug, Clone)]
pub struct HttpContentService {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpContentService {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        if config.base_url.is_empty() {
            return Err(ServiceError::Config {
                message: "service.base_url is not set".into(),
            });
        }

        let timeout = Duration::from_secs(config.timeout);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    /// Send a request and decode a JSON body, bounded by the configured timeout
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.authorize(request).send()).await;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    response
                        .json::<T>()
                        .await
                        .map_err(|e| ServiceError::parse(format!("invalid response body: {}", e)))
                } else {
                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    Err(map_http_error(status, &headers, &body, start.elapsed()))
                }
            }
            Ok(Err(e)) => {
                if e.is_timeout() {
                    Err(ServiceError::timeout(start.elapsed()))
                } else if e.is_connect() {
                    Err(ServiceError::network(format!("connection failed: {}", e)))
                } else {
                    Err(ServiceError::network(format!("request failed: {}", e)))
                }
            }
            Err(_) => Err(ServiceError::timeout(start.elapsed())),
        }
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn templates(&self) -> Result<TemplateCatalogResponse, ServiceError> {
        self.send_json(self.client.get(self.url("workflows/templates")))
            .await
    }

    async fn create_workflow(
        &self,
        request: &CreateWorkflowRequest,
    ) -> Result<CreateWorkflowResponse, ServiceError> {
        self.send_json(self.client.post(self.url("workflows")).json(request))
            .await
    }

    async fn workflow_status(&self, workflow_id: &str) -> Result<StatusResponse, ServiceError> {
        let path = format!("workflows/{}/status", workflow_id);
        self.send_json(self.client.get(self.url(&path))).await
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishResponse, ServiceError> {
        self.send_json(self.client.post(self.url("publish")).json(request))
            .await
    }
}

/// Map a non-success HTTP status to a ServiceError
fn map_http_error(
    status: reqwest::StatusCode,
    headers: &HeaderMap,
    body: &str,
    elapsed: Duration,
) -> ServiceError {
    let message = error_message(body);
    match status.as_u16() {
        401 | 403 => ServiceError::Auth {
            message: format!("HTTP {}: {}", status, message),
        },
        404 => ServiceError::NotFound { message },
        429 => {
            let retry_after = retry_after_header(headers).or_else(|| retry_after_body(body));
            ServiceError::rate_limit(retry_after, message)
        }
        408 | 504 => ServiceError::timeout(elapsed),
        400..=499 => ServiceError::rejected(status.as_u16(), message),
        _ => ServiceError::network(format!("HTTP {}: {}", status, message)),
    }
}

/// Prefer a JSON `message`/`error` field, fall back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(|v| v.as_str()).map(String::from))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn retry_after_body(body: &str) -> Option<Duration> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    ["retry_after", "retryAfter", "wait_seconds"]
        .iter()
        .find_map(|key| json.get(key).and_then(|v| v.as_f64()))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
