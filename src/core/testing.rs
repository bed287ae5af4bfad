//! Shared test support: a scriptable in-memory backend gateway

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::gateway::{
    AttachRecipeRequest, AttachRecipeResponse, BackendGateway, CancelOutcome, ExtractRequest,
    ExtractResponse, GatewayResult, ResumeResponse, StartDownloadRequest, StartDownloadResponse,
    StartRescueRequest, StartRescueResponse,
};
use crate::core::models::{LocalFile, TaskStatus};

#[derive(Default)]
struct MockInner {
    download_responses: VecDeque<GatewayResult<StartDownloadResponse>>,
    rescue_responses: VecDeque<GatewayResult<StartRescueResponse>>,
    cancel_responses: VecDeque<GatewayResult<CancelOutcome>>,
    pause_responses: VecDeque<GatewayResult<()>>,
    resume_responses: VecDeque<GatewayResult<ResumeResponse>>,
    local_files: Vec<LocalFile>,
    calls: Vec<String>,
}

/// Scriptable gateway: queue responses per RPC, record every call.
///
/// When a queue is empty a benign default is returned (`Downloading` start
/// responses, `Canceling` cancel outcomes, empty file lists) so tests only
/// script what they assert on.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<MockInner>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_download(&self, response: GatewayResult<StartDownloadResponse>) {
        self.inner.lock().unwrap().download_responses.push_back(response);
    }

    pub fn queue_rescue(&self, response: GatewayResult<StartRescueResponse>) {
        self.inner.lock().unwrap().rescue_responses.push_back(response);
    }

    pub fn queue_cancel(&self, response: GatewayResult<CancelOutcome>) {
        self.inner.lock().unwrap().cancel_responses.push_back(response);
    }

    pub fn queue_pause(&self, response: GatewayResult<()>) {
        self.inner.lock().unwrap().pause_responses.push_back(response);
    }

    pub fn queue_resume(&self, response: GatewayResult<ResumeResponse>) {
        self.inner.lock().unwrap().resume_responses.push_back(response);
    }

    pub fn set_local_files(&self, files: Vec<LocalFile>) {
        self.inner.lock().unwrap().local_files = files;
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.inner.lock().unwrap().calls.push(name.to_string());
    }
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn start_download(
        &self,
        _req: StartDownloadRequest,
    ) -> GatewayResult<StartDownloadResponse> {
        self.record("start_download");
        self.inner
            .lock()
            .unwrap()
            .download_responses
            .pop_front()
            .unwrap_or_else(|| {
                Ok(StartDownloadResponse {
                    status: Some(TaskStatus::Downloading),
                    ..Default::default()
                })
            })
    }

    async fn start_rescue(&self, _req: StartRescueRequest) -> GatewayResult<StartRescueResponse> {
        self.record("start_rescue");
        self.inner
            .lock()
            .unwrap()
            .rescue_responses
            .pop_front()
            .unwrap_or_else(|| {
                Ok(StartRescueResponse {
                    status: Some(TaskStatus::Downloading),
                    ..Default::default()
                })
            })
    }

    async fn cancel_task(&self, _task_id: &str) -> GatewayResult<CancelOutcome> {
        self.record("cancel_task");
        self.inner
            .lock()
            .unwrap()
            .cancel_responses
            .pop_front()
            .unwrap_or(Ok(CancelOutcome::Canceling))
    }

    async fn pause_task(&self, _task_id: &str) -> GatewayResult<()> {
        self.record("pause_task");
        self.inner
            .lock()
            .unwrap()
            .pause_responses
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn resume_task(&self, _task_id: &str) -> GatewayResult<ResumeResponse> {
        self.record("resume_task");
        self.inner
            .lock()
            .unwrap()
            .resume_responses
            .pop_front()
            .unwrap_or_else(|| Ok(ResumeResponse::default()))
    }

    async fn list_local_files(&self) -> GatewayResult<Vec<LocalFile>> {
        self.record("list_local_files");
        Ok(self.inner.lock().unwrap().local_files.clone())
    }

    async fn extract_local_file(&self, _req: ExtractRequest) -> GatewayResult<ExtractResponse> {
        self.record("extract_local_file");
        Ok(ExtractResponse::default())
    }

    async fn attach_recipe(
        &self,
        _req: AttachRecipeRequest,
    ) -> GatewayResult<AttachRecipeResponse> {
        self.record("attach_recipe");
        Ok(AttachRecipeResponse::default())
    }

    async fn delete_local_file(&self, _full_path: &str) -> GatewayResult<()> {
        self.record("delete_local_file");
        Ok(())
    }
}
