//! Core data models for the firmware rescue workflow

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

/// Task lifecycle status enumeration
///
/// `Idle` and `Canceling` exist only inside the orchestrator; the backend
/// never reports them. All other values may arrive in an RPC response or a
/// push progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Starting,
    Downloading,
    Paused,
    Preparing,
    Flashing,
    Completed,
    Failed,
    Canceling,
    Canceled,
}

impl TaskStatus {
    /// Parse a status string reported by the backend.
    ///
    /// Only backend-reportable values are accepted; `idle`/`canceling` and
    /// anything unknown yield `None`.
    pub fn parse_backend(value: &str) -> Option<Self> {
        match value {
            "starting" => Some(Self::Starting),
            "downloading" => Some(Self::Downloading),
            "paused" => Some(Self::Paused),
            "preparing" => Some(Self::Preparing),
            "flashing" => Some(Self::Flashing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again (only dismissal removes them).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Statuses with backend work still in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::Downloading
                | Self::Paused
                | Self::Preparing
                | Self::Flashing
                | Self::Canceling
        )
    }
}

/// Workflow mode for a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Download,
    Rescue,
}

/// Coarse workflow phase reported with progress events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Download,
    Prepare,
    Flash,
}

impl Phase {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "download" => Some(Self::Download),
            "prepare" => Some(Self::Prepare),
            "flash" => Some(Self::Flash),
            _ => None,
        }
    }
}

/// Whether the rescue wipes user data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataReset {
    Yes,
    No,
}

/// Transport used to push firmware to the device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashTransport {
    Fastboot,
    Qdl,
    Unisoc,
    Mediatek,
}

impl FlashTransport {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fastboot" => Some(Self::Fastboot),
            "qdl" => Some(Self::Qdl),
            "unisoc" => Some(Self::Unisoc),
            "mediatek" => Some(Self::Mediatek),
            _ => None,
        }
    }
}

/// Storage type hint for QDL flashing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QdlStorage {
    Auto,
    Emmc,
    Ufs,
}

impl QdlStorage {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::Auto),
            "emmc" => Some(Self::Emmc),
            "ufs" => Some(Self::Ufs),
            _ => None,
        }
    }
}

/// User-selected options for a rescue task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescueOptions {
    pub data_reset: DataReset,

    pub flash_transport: FlashTransport,

    pub qdl_storage: QdlStorage,

    pub qdl_serial: String,
}

/// A firmware variant offered by the catalog (input only, not owned here)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FirmwareVariant {
    pub name: String,

    pub url: String,

    pub match_id: String,

    pub publish_date: Option<String>,

    pub recipe_url: Option<String>,

    pub selected_params: Option<HashMap<String, String>>,
}

/// An already-downloaded firmware package on disk (read-only projection)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub file_name: String,

    pub full_path: String,

    pub size_bytes: u64,

    /// Unix timestamp (seconds)
    pub modified_at: i64,

    pub recipe_url: Option<String>,

    pub match_id: Option<String>,

    pub selected_params: Option<HashMap<String, String>>,

    pub has_extracted_dir: bool,
}

/// Normalized progress message from the backend push channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    pub task_id: String,

    pub source_url: String,

    pub display_name: String,

    pub status: TaskStatus,

    pub dry_run: Option<bool>,

    pub flash_transport: Option<FlashTransport>,

    pub qdl_storage: Option<QdlStorage>,

    pub qdl_serial: String,

    pub save_path: String,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    pub speed_bps: u64,

    pub phase: Option<Phase>,

    pub step_index: Option<u32>,

    pub step_total: Option<u32>,

    pub step_label: String,

    pub command_source: String,

    pub error: String,
}

/// One tracked download or rescue operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    pub source_url: String,

    pub display_name: String,

    pub publish_date: Option<String>,

    pub match_id: Option<String>,

    pub recipe_url: Option<String>,

    pub mode: TaskMode,

    /// Plan-only rescue; meaningful only when `mode` is `Rescue`
    pub dry_run: bool,

    pub options: Option<RescueOptions>,

    pub status: TaskStatus,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    pub speed_bps: u64,

    pub phase: Option<Phase>,

    pub step_index: Option<u32>,

    pub step_total: Option<u32>,

    pub step_label: String,

    pub command_source: String,

    pub save_path: String,

    pub work_dir: String,

    pub last_error: String,

    pub started_at: chrono::DateTime<chrono::Utc>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    /// Idle placeholder used for the "current task" slot before any work starts
    pub fn idle() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: String::new(),
            source_url: String::new(),
            display_name: String::new(),
            publish_date: None,
            match_id: None,
            recipe_url: None,
            mode: TaskMode::Download,
            dry_run: false,
            options: None,
            status: TaskStatus::Idle,
            downloaded_bytes: 0,
            total_bytes: None,
            speed_bps: 0,
            phase: None,
            step_index: None,
            step_total: None,
            step_label: String::new(),
            command_source: String::new(),
            save_path: String::new(),
            work_dir: String::new(),
            last_error: String::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Create a plain download task in `Starting` state
    pub fn new_download(id: String, variant: &FirmwareVariant) -> Self {
        let mut task = Self::idle();
        task.id = id;
        task.source_url = variant.url.clone();
        task.display_name = variant.name.clone();
        task.publish_date = variant.publish_date.clone();
        task.match_id = non_empty(&variant.match_id);
        task.recipe_url = variant.recipe_url.clone();
        task.status = TaskStatus::Starting;
        task
    }

    /// Create a rescue task in `Starting` state
    pub fn new_rescue(
        id: String,
        variant: &FirmwareVariant,
        options: RescueOptions,
        dry_run: bool,
    ) -> Self {
        let mut task = Self::new_download(id, variant);
        task.mode = TaskMode::Rescue;
        task.dry_run = dry_run;
        task.options = Some(options);
        task
    }

    /// Create a rescue task seeded from an already-downloaded local file
    pub fn new_rescue_from_file(
        id: String,
        file: &LocalFile,
        options: RescueOptions,
        dry_run: bool,
    ) -> Self {
        let mut task = Self::idle();
        task.id = id;
        task.source_url = file.full_path.clone();
        task.display_name = file.file_name.clone();
        task.match_id = file.match_id.clone();
        task.recipe_url = file.recipe_url.clone();
        task.mode = TaskMode::Rescue;
        task.dry_run = dry_run;
        task.options = Some(options);
        task.status = TaskStatus::Starting;
        task
    }

    /// Progress ratio in 0.0..=1.0, when the total is known
    pub fn progress_ratio(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.downloaded_bytes as f64 / total as f64).min(1.0))
    }

    /// Merge a progress message into this task.
    ///
    /// Monotonic merge: fields the message carries overwrite, fields it
    /// omits (zero / empty / unset) keep their previously known value.
    /// Status transitions obey the lifecycle rules: terminal statuses are
    /// final, and `Canceling` only yields to a terminal status.
    ///
    /// Returns false when the message was rejected entirely.
    pub fn merge_progress(&mut self, msg: &ProgressMessage) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.status == TaskStatus::Canceling && !msg.status.is_terminal() {
            // A stale in-flight event must not undo an optimistic cancel.
            return false;
        }

        self.status = msg.status;

        if !msg.source_url.is_empty() {
            self.source_url = msg.source_url.clone();
        }
        if !msg.display_name.is_empty() {
            self.display_name = msg.display_name.clone();
        }
        if msg.downloaded_bytes > 0 {
            self.downloaded_bytes = msg.downloaded_bytes;
        }
        if let Some(total) = msg.total_bytes.filter(|total| *total > 0) {
            self.total_bytes = Some(total);
        }
        if msg.speed_bps > 0 {
            self.speed_bps = msg.speed_bps;
        }
        if let Some(phase) = msg.phase {
            self.phase = Some(phase);
        }
        if let Some(step_index) = msg.step_index {
            self.step_index = Some(step_index);
        }
        if let Some(step_total) = msg.step_total {
            self.step_total = Some(step_total);
        }
        if !msg.step_label.is_empty() {
            self.step_label = msg.step_label.clone();
        }
        if !msg.command_source.is_empty() {
            self.command_source = msg.command_source.clone();
        }
        if !msg.save_path.is_empty() {
            self.save_path = msg.save_path.clone();
        }
        if let Some(dry_run) = msg.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(options) = self.options.as_mut() {
            if let Some(transport) = msg.flash_transport {
                options.flash_transport = transport;
            }
            if let Some(storage) = msg.qdl_storage {
                options.qdl_storage = storage;
            }
            if !msg.qdl_serial.is_empty() {
                options.qdl_serial = msg.qdl_serial.clone();
            }
        }
        if !msg.error.is_empty() {
            self.last_error = msg.error.clone();
        }
        if self.status == TaskStatus::Canceled {
            self.last_error.clear();
        }

        self.updated_at = chrono::Utc::now();
        true
    }

    /// User-facing status line derived from the current state.
    ///
    /// Presentation wording only; derived from `status`, `step_index`,
    /// `step_total`, `step_label`, `mode` and `dry_run`.
    pub fn status_line(&self) -> String {
        let step_suffix = match (self.step_index, self.step_total) {
            (Some(index), Some(total)) if total > 0 => {
                if self.step_label.is_empty() {
                    format!(" ({}/{})", index, total)
                } else {
                    format!(" ({}/{}): {}", index, total, self.step_label)
                }
            }
            _ => String::new(),
        };

        match self.status {
            TaskStatus::Idle => "Idle".to_string(),
            TaskStatus::Starting => "Starting".to_string(),
            TaskStatus::Downloading => "Downloading".to_string(),
            TaskStatus::Paused => "Paused".to_string(),
            TaskStatus::Preparing => format!("Preparing{}", step_suffix),
            TaskStatus::Flashing => format!("Flashing{}", step_suffix),
            TaskStatus::Completed => match (self.mode, self.dry_run) {
                (TaskMode::Rescue, true) => "Flash plan ready".to_string(),
                (TaskMode::Rescue, false) => "Rescue completed".to_string(),
                (TaskMode::Download, _) => "Download completed".to_string(),
            },
            TaskStatus::Failed => "Failed".to_string(),
            TaskStatus::Canceling => "Canceling".to_string(),
            TaskStatus::Canceled => "Canceled".to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
