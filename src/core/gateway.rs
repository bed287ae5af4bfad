//! Backend gateway contract
//!
//! The gateway is the external subsystem that performs the actual network
//! transfer, archive extraction and device flashing. The core only talks to
//! it through this trait; every RPC returns a typed response or a
//! `GatewayError`, never a loosely-typed ok/error bag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::models::{DataReset, FlashTransport, LocalFile, QdlStorage, TaskStatus};

/// Failure reported by or on the way to the backend
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GatewayError {
    /// The backend processed the request and reported a failure
    #[error("backend error: {message}")]
    Backend { message: String },

    /// The request never produced a backend verdict (bridge/transport fault)
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl GatewayError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Backend { message } | Self::Transport { message } => message,
        }
    }

    /// Heuristic carried over from the legacy backend: a failure whose
    /// message mentions "cancel" is treated as a user-initiated cancellation,
    /// not a genuine error. The backend exposes no structured reason field.
    /// TODO: replace with a structured reason once the backend protocol has one.
    pub fn is_cancellation(&self) -> bool {
        self.message().to_lowercase().contains("cancel")
    }
}

/// Request payload for a plain firmware download
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartDownloadRequest {
    pub task_id: String,

    pub source_url: String,

    pub display_name: String,

    pub publish_date: Option<String>,

    pub match_id: Option<String>,

    pub selected_params: Option<HashMap<String, String>>,

    pub recipe_url: Option<String>,
}

/// Request payload for a rescue (flash) operation.
///
/// Exactly one of `source_url` / `local_file_path` is non-empty; the backend
/// downloads the package when given a URL and reuses the file otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRescueRequest {
    pub task_id: String,

    pub source_url: String,

    pub local_file_path: String,

    pub display_name: String,

    pub publish_date: Option<String>,

    pub match_id: Option<String>,

    pub selected_params: Option<HashMap<String, String>>,

    pub recipe_url: Option<String>,

    pub data_reset: DataReset,

    pub dry_run: bool,

    pub flash_transport: FlashTransport,

    pub qdl_storage: QdlStorage,

    pub qdl_serial: String,
}

/// Successful response to a plain download start
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartDownloadResponse {
    pub task_id: String,

    /// Final status if the backend already knows it; `Completed` is assumed
    /// when unset
    pub status: Option<TaskStatus>,

    pub save_path: String,

    pub file_name: String,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,
}

/// Successful response to a rescue start
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartRescueResponse {
    pub task_id: String,

    pub status: Option<TaskStatus>,

    pub save_path: String,

    pub file_name: String,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    pub work_dir: String,

    pub dry_run: bool,

    pub reused_package: bool,

    pub reused_extraction: bool,

    pub flash_transport: Option<FlashTransport>,

    pub qdl_storage: Option<QdlStorage>,

    pub qdl_serial: String,

    /// Provenance of the flash commands (recipe-guided vs. extraction-only)
    pub command_source: String,

    /// Planned command sequence; populated for dry runs
    pub command_plan: Vec<String>,
}

/// Backend verdict on a cancel request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Cancellation is underway; a terminal progress event will follow
    Canceling,
    /// The task already finished or vanished server-side
    NotFound,
}

/// Successful response to a resume request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResponse {
    pub status: Option<TaskStatus>,
}

/// Request to extract a downloaded package in place
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub full_path: String,

    pub file_name: String,

    pub extracted_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub extracted_dir: String,

    pub reused_extraction: bool,
}

/// Request to associate a catalog recipe with a local file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttachRecipeRequest {
    pub full_path: String,

    pub file_name: String,

    pub recipe_url: String,

    pub match_id: String,

    pub selected_params: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttachRecipeResponse {
    pub recipe_url: String,

    pub match_id: String,
}

/// Result alias for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// RPC surface of the backend subsystem.
///
/// Long-running operations return once the backend has accepted (or already
/// finished) the work; progress arrives out-of-band through the push channel
/// handled by [`crate::core::orchestrator::RescueCenter::handle_progress_event`].
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn start_download(&self, req: StartDownloadRequest)
        -> GatewayResult<StartDownloadResponse>;

    async fn start_rescue(&self, req: StartRescueRequest) -> GatewayResult<StartRescueResponse>;

    async fn cancel_task(&self, task_id: &str) -> GatewayResult<CancelOutcome>;

    async fn pause_task(&self, task_id: &str) -> GatewayResult<()>;

    async fn resume_task(&self, task_id: &str) -> GatewayResult<ResumeResponse>;

    async fn list_local_files(&self) -> GatewayResult<Vec<LocalFile>>;

    async fn extract_local_file(&self, req: ExtractRequest) -> GatewayResult<ExtractResponse>;

    async fn attach_recipe(&self, req: AttachRecipeRequest) -> GatewayResult<AttachRecipeResponse>;

    async fn delete_local_file(&self, full_path: &str) -> GatewayResult<()>;
}
