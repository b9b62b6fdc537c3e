//! Scripted content service for tests

use super::types::{
    ContentService, CreateWorkflowRequest, CreateWorkflowResponse, PublishRequest,
    PublishResponse, ServiceError, StatusResponse, TemplateCatalogResponse,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Mock service answering from per-call queues
///
/// Create, status and publish calls wait on the gate (when set) before answering, so a
/// test can hold a call pending and release it with `gate.add_permits(n)`.
#[derive(Default)]
pub struct MockService {
    templates: Mutex<TemplateCatalogResponse>,
    creates: Mutex<VecDeque<Result<CreateWorkflowResponse, ServiceError>>>,
    statuses: Mutex<HashMap<String, VecDeque<Result<StatusResponse, ServiceError>>>>,
    publishes: Mutex<VecDeque<Result<PublishResponse, ServiceError>>>,
    gate: Option<Arc<Semaphore>>,
    pub create_requests: Mutex<Vec<CreateWorkflowRequest>>,
    pub create_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub publish_calls: AtomicU32,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold create, status and publish calls until permits are added to the returned gate
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let service = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (service, gate)
    }

    pub fn with_templates(self, templates: TemplateCatalogResponse) -> Self {
        *self.templates.lock().unwrap() = templates;
        self
    }

    pub fn push_create(&self, result: Result<CreateWorkflowResponse, ServiceError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, id: &str, result: Result<StatusResponse, ServiceError>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_publish(&self, result: Result<PublishResponse, ServiceError>) {
        self.publishes.lock().unwrap().push_back(result);
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self) {
        if let Some(ref gate) = self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl ContentService for MockService {
    async fn templates(&self) -> Result<TemplateCatalogResponse, ServiceError> {
        Ok(self.templates.lock().unwrap().clone())
    }

    async fn create_workflow(
        &self,
        request: &CreateWorkflowRequest,
    ) -> Result<CreateWorkflowResponse, ServiceError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.create_requests.lock().unwrap().push(request.clone());
        let next = self.creates.lock().unwrap().pop_front();
        self.wait_gate().await;
        next.unwrap_or_else(|| {
            Ok(CreateWorkflowResponse {
                workflow_id: format!("wf-{}", n),
            })
        })
    }

    async fn workflow_status(&self, workflow_id: &str) -> Result<StatusResponse, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(workflow_id)
            .and_then(|queue| queue.pop_front());
        self.wait_gate().await;
        next.unwrap_or_else(|| Err(ServiceError::network("no scripted status")))
    }

    async fn publish(&self, _request: &PublishRequest) -> Result<PublishResponse, ServiceError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.publishes.lock().unwrap().pop_front();
        self.wait_gate().await;
        next.unwrap_or_else(|| {
            Ok(PublishResponse {
                success: true,
                external_url: Some("https://example.com/p/1".into()),
                error: None,
            })
        })
    }
}
