//! Download/rescue workflow orchestrator
//!
//! This module owns the task lifecycle: it starts download and rescue tasks,
//! merges backend RPC responses and push progress events into per-task state,
//! maintains an ordered history with dismissal tracking, and exposes a
//! reactive read model (current task, history, local-file cache) plus an
//! event stream for the presentation layer.
//!
//! All state lives behind a single `RwLock`; the lock is never held across a
//! gateway await, so RPC completions and push events interleave exactly at
//! those boundaries. The merge policy keeps the state convergent regardless
//! of arrival order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::core::config::AppConfig;
use crate::core::gateway::{
    AttachRecipeRequest, BackendGateway, CancelOutcome, ExtractRequest, GatewayError,
    StartDownloadRequest, StartRescueRequest,
};
use crate::core::identity::new_task_id;
use crate::core::models::{
    AppError, AppResult, FirmwareVariant, LocalFile, ProgressMessage, RescueOptions, Task,
    TaskStatus,
};
use crate::core::notify::NotificationGate;
use crate::core::progress::normalize;
use crate::utils::file_matching::best_local_match;

/// Severity of a transient user notification
#[derive(Debug, Clone, Copy, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Info,
    Error,
}

/// Events emitted by the orchestrator for any presentation layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum RescueEvent {
    TaskCreated {
        task_id: String,
        task: Task,
    },
    TaskUpdated {
        task_id: String,
        task: Task,
    },
    TaskDismissed {
        task_id: String,
    },
    CurrentChanged {
        task: Task,
    },
    LocalFilesUpdated {
        files: Vec<LocalFile>,
    },
    /// Dry-run rescue produced a command plan
    PlanReady {
        task_id: String,
        commands: Vec<String>,
        command_source: String,
    },
    /// Transient, de-duplicated user notification
    Notice {
        task_id: String,
        message: String,
        severity: NoticeSeverity,
    },
}

/// Channel for communicating with the presentation layer
pub type EventSender = mpsc::UnboundedSender<RescueEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RescueEvent>;

/// Outcome of a plain download start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { task_id: String },
    /// Skip: a matching package is already on disk; no task was created and
    /// no backend call was made
    AlreadyDownloaded { file_name: String },
}

struct OrchestratorState {
    /// Last-touched task, convenience pointer for the presentation layer
    current: Task,

    /// All tasks not yet dismissed, newest first; updates happen in place
    history: Vec<Task>,

    /// Ids the user dismissed; events for them are dropped until a terminal
    /// event releases the id
    dismissed: HashSet<String>,

    /// Wholesale-replaced projection of downloaded packages
    local_files: Vec<LocalFile>,

    gate: NotificationGate,

    events: Option<EventSender>,

    history_limit: Option<usize>,
}

impl OrchestratorState {
    fn emit(&self, event: RescueEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.history.iter().find(|task| task.id == task_id)
    }

    fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.history.iter_mut().find(|task| task.id == task_id)
    }

    fn sync_current(&mut self, task: &Task) {
        if self.current.id == task.id {
            self.current = task.clone();
        }
    }

    /// Surface a failure notification unless an identical one is cooling down
    fn notice_error(&mut self, task_id: &str, message: &str) {
        if self.gate.should_emit(task_id, message) {
            warn!(task_id, "task error: {}", message);
            self.emit(RescueEvent::Notice {
                task_id: task_id.to_string(),
                message: message.to_string(),
                severity: NoticeSeverity::Error,
            });
        }
    }

    fn insert_task(&mut self, task: Task) {
        self.history.insert(0, task.clone());
        if let Some(max) = self.history_limit {
            while self.history.len() > max {
                let Some(pos) = self
                    .history
                    .iter()
                    .rposition(|entry| entry.status.is_terminal())
                else {
                    break;
                };
                let removed = self.history.remove(pos);
                // Auto-dismiss so a stale event cannot recreate the entry.
                self.dismissed.insert(removed.id.clone());
                self.emit(RescueEvent::TaskDismissed {
                    task_id: removed.id,
                });
            }
        }
        self.current = task.clone();
        self.emit(RescueEvent::TaskCreated {
            task_id: task.id.clone(),
            task: task.clone(),
        });
        self.emit(RescueEvent::CurrentChanged { task });
    }

    /// Merge a normalized progress message into the matching history entry
    /// (creating a transient record when none exists). Returns the task's
    /// status after an accepted merge, `None` when the message was dropped.
    fn apply_progress(&mut self, msg: ProgressMessage) -> Option<TaskStatus> {
        if self.dismissed.contains(&msg.task_id) {
            if msg.status.is_terminal() {
                // The backend task is gone; release the id without
                // resurrecting a history entry.
                debug!(task_id = %msg.task_id, "late terminal event released dismissal");
                self.dismissed.remove(&msg.task_id);
            }
            return None;
        }

        let pos = match self.history.iter().position(|task| task.id == msg.task_id) {
            Some(pos) => pos,
            None => {
                // Event for a task we never started: track it transiently.
                let mut transient = Task::idle();
                transient.id = msg.task_id.clone();
                transient.status = TaskStatus::Starting;
                self.history.insert(0, transient);
                0
            }
        };

        let task = &mut self.history[pos];
        if !task.merge_progress(&msg) {
            return None;
        }
        let snapshot = task.clone();
        self.sync_current(&snapshot);
        self.emit(RescueEvent::TaskUpdated {
            task_id: snapshot.id.clone(),
            task: snapshot.clone(),
        });

        if snapshot.status == TaskStatus::Failed {
            let message = if snapshot.last_error.is_empty() {
                "Task failed".to_string()
            } else {
                snapshot.last_error.clone()
            };
            self.notice_error(&snapshot.id, &message);
        }

        Some(snapshot.status)
    }

    /// Map a gateway failure onto the task: a cancellation-flavored message
    /// resolves to `Canceled` with no error surfaced, anything else to
    /// `Failed` with a de-duplicated notification.
    fn apply_failure(&mut self, task_id: &str, err: &GatewayError) {
        let Some(task) = self.find_task_mut(task_id) else {
            debug!(task_id, "failure for unknown task dropped");
            return;
        };
        if task.status.is_terminal() {
            return;
        }

        if err.is_cancellation() {
            task.status = TaskStatus::Canceled;
            task.last_error.clear();
        } else {
            task.status = TaskStatus::Failed;
            task.last_error = err.message().to_string();
        }
        task.updated_at = chrono::Utc::now();
        let snapshot = task.clone();
        self.sync_current(&snapshot);
        self.emit(RescueEvent::TaskUpdated {
            task_id: snapshot.id.clone(),
            task: snapshot.clone(),
        });
        if snapshot.status == TaskStatus::Failed {
            let message = snapshot.last_error.clone();
            self.notice_error(task_id, &message);
        }
    }

    /// Apply a confirmed status (e.g. from a resume response) without any
    /// byte/speed payload; lifecycle guards still apply.
    fn apply_status_confirmation(&mut self, task_id: &str, status: TaskStatus) {
        let Some(task) = self.find_task_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        if task.status == TaskStatus::Canceling && !status.is_terminal() {
            return;
        }
        task.status = status;
        task.updated_at = chrono::Utc::now();
        let snapshot = task.clone();
        self.sync_current(&snapshot);
        self.emit(RescueEvent::TaskUpdated {
            task_id: snapshot.id.clone(),
            task: snapshot,
        });
    }
}

/// Shared handle to the download/rescue workflow orchestrator.
///
/// Cheap to clone; all clones share the same state and gateway.
#[derive(Clone)]
pub struct RescueCenter {
    gateway: Arc<dyn BackendGateway>,
    state: Arc<RwLock<OrchestratorState>>,
}

impl RescueCenter {
    pub fn new(gateway: Arc<dyn BackendGateway>, config: &AppConfig) -> Self {
        let state = OrchestratorState {
            current: Task::idle(),
            history: Vec::new(),
            dismissed: HashSet::new(),
            local_files: Vec::new(),
            gate: NotificationGate::new(Duration::from_secs(
                config.notification.dedup_window_secs,
            )),
            events: None,
            history_limit: config.history.max_entries,
        };
        Self {
            gateway,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Attach an existing event channel
    pub async fn attach_events(&self, sender: EventSender) {
        self.state.write().await.events = Some(sender);
    }

    /// Create an event channel and attach its sender
    pub async fn subscribe(&self) -> EventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.attach_events(sender).await;
        receiver
    }

    // ---- read model -----------------------------------------------------

    pub async fn current_task(&self) -> Task {
        self.state.read().await.current.clone()
    }

    pub async fn history(&self) -> Vec<Task> {
        self.state.read().await.history.clone()
    }

    pub async fn local_files(&self) -> Vec<LocalFile> {
        self.state.read().await.local_files.clone()
    }

    // ---- task creation --------------------------------------------------

    /// Start a plain firmware download.
    ///
    /// Refreshes the local-file cache first and short-circuits with
    /// [`StartOutcome::AlreadyDownloaded`] when a matching package is already
    /// on disk.
    pub async fn start_download(&self, variant: &FirmwareVariant) -> AppResult<StartOutcome> {
        if variant.url.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "firmware variant has no download URL".to_string(),
            ));
        }

        // The duplicate check awaits one refresh; task operations otherwise
        // never block on the local-file cache.
        self.refresh_local_files().await;
        {
            let state = self.state.read().await;
            if let Some(existing) = best_local_match(variant, &state.local_files) {
                info!(
                    file_name = %existing.file_name,
                    "skipping download, package already on disk"
                );
                let file_name = existing.file_name.clone();
                state.emit(RescueEvent::Notice {
                    task_id: String::new(),
                    message: format!("Already downloaded: {}", file_name),
                    severity: NoticeSeverity::Info,
                });
                return Ok(StartOutcome::AlreadyDownloaded { file_name });
            }
        }

        let task = Task::new_download(new_task_id(), variant);
        let task_id = task.id.clone();
        info!(task_id = %task_id, url = %variant.url, "starting firmware download");
        self.state.write().await.insert_task(task);

        let request = StartDownloadRequest {
            task_id: task_id.clone(),
            source_url: variant.url.clone(),
            display_name: variant.name.clone(),
            publish_date: variant.publish_date.clone(),
            match_id: some_non_empty(&variant.match_id),
            selected_params: variant.selected_params.clone(),
            recipe_url: variant.recipe_url.clone(),
        };
        let result = self.gateway.start_download(request).await;

        let resolved = {
            let mut state = self.state.write().await;
            if state.dismissed.contains(&task_id) {
                debug!(task_id = %task_id, "task dismissed mid-start, response discarded");
                None
            } else {
                match result {
                    Ok(resp) => {
                        let msg = ProgressMessage {
                            task_id: task_id.clone(),
                            source_url: String::new(),
                            display_name: resp.file_name.clone(),
                            status: resp.status.unwrap_or(TaskStatus::Completed),
                            dry_run: None,
                            flash_transport: None,
                            qdl_storage: None,
                            qdl_serial: String::new(),
                            save_path: resp.save_path.clone(),
                            downloaded_bytes: resp.downloaded_bytes,
                            total_bytes: resp.total_bytes,
                            speed_bps: 0,
                            phase: None,
                            step_index: None,
                            step_total: None,
                            step_label: String::new(),
                            command_source: String::new(),
                            error: String::new(),
                        };
                        state.apply_progress(msg)
                    }
                    Err(err) => {
                        state.apply_failure(&task_id, &err);
                        None
                    }
                }
            }
        };

        if resolved == Some(TaskStatus::Completed) {
            self.spawn_local_refresh();
        }
        Ok(StartOutcome::Started { task_id })
    }

    /// Start a rescue (flash) workflow from a catalog variant
    pub async fn start_rescue(
        &self,
        variant: &FirmwareVariant,
        options: RescueOptions,
        dry_run: bool,
    ) -> AppResult<String> {
        if variant.url.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "firmware variant has no download URL".to_string(),
            ));
        }

        let task = Task::new_rescue(new_task_id(), variant, options.clone(), dry_run);
        let task_id = task.id.clone();
        info!(task_id = %task_id, url = %variant.url, dry_run, "starting rescue");
        self.state.write().await.insert_task(task);

        let request = StartRescueRequest {
            task_id: task_id.clone(),
            source_url: variant.url.clone(),
            local_file_path: String::new(),
            display_name: variant.name.clone(),
            publish_date: variant.publish_date.clone(),
            match_id: some_non_empty(&variant.match_id),
            selected_params: variant.selected_params.clone(),
            recipe_url: variant.recipe_url.clone(),
            data_reset: options.data_reset,
            dry_run,
            flash_transport: options.flash_transport,
            qdl_storage: options.qdl_storage,
            qdl_serial: options.qdl_serial.clone(),
        };
        self.finish_rescue_start(task_id.clone(), request).await;
        Ok(task_id)
    }

    /// Start a rescue workflow reusing an already-downloaded package.
    ///
    /// No duplicate check: the caller explicitly chose the file.
    pub async fn start_rescue_from_file(
        &self,
        file: &LocalFile,
        options: RescueOptions,
        dry_run: bool,
    ) -> AppResult<String> {
        if file.full_path.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "local file has no path".to_string(),
            ));
        }

        let task = Task::new_rescue_from_file(new_task_id(), file, options.clone(), dry_run);
        let task_id = task.id.clone();
        info!(task_id = %task_id, path = %file.full_path, dry_run, "starting rescue from local file");
        self.state.write().await.insert_task(task);

        let request = StartRescueRequest {
            task_id: task_id.clone(),
            source_url: String::new(),
            local_file_path: file.full_path.clone(),
            display_name: file.file_name.clone(),
            publish_date: None,
            match_id: file.match_id.clone(),
            selected_params: file.selected_params.clone(),
            recipe_url: file.recipe_url.clone(),
            data_reset: options.data_reset,
            dry_run,
            flash_transport: options.flash_transport,
            qdl_storage: options.qdl_storage,
            qdl_serial: options.qdl_serial.clone(),
        };
        self.finish_rescue_start(task_id.clone(), request).await;
        Ok(task_id)
    }

    async fn finish_rescue_start(&self, task_id: String, request: StartRescueRequest) {
        let result = self.gateway.start_rescue(request).await;

        let resolved = {
            let mut state = self.state.write().await;
            if state.dismissed.contains(&task_id) {
                debug!(task_id = %task_id, "task dismissed mid-start, response discarded");
                None
            } else {
                match result {
                    Ok(resp) => {
                        let msg = ProgressMessage {
                            task_id: task_id.clone(),
                            source_url: String::new(),
                            display_name: resp.file_name.clone(),
                            status: resp.status.unwrap_or(TaskStatus::Completed),
                            dry_run: Some(resp.dry_run),
                            flash_transport: resp.flash_transport,
                            qdl_storage: resp.qdl_storage,
                            qdl_serial: resp.qdl_serial.clone(),
                            save_path: resp.save_path.clone(),
                            downloaded_bytes: resp.downloaded_bytes,
                            total_bytes: resp.total_bytes,
                            speed_bps: 0,
                            phase: None,
                            step_index: None,
                            step_total: None,
                            step_label: String::new(),
                            command_source: resp.command_source.clone(),
                            error: String::new(),
                        };
                        let resolved = state.apply_progress(msg);
                        if resolved.is_some() {
                            if !resp.work_dir.is_empty() {
                                if let Some(task) = state.find_task_mut(&task_id) {
                                    task.work_dir = resp.work_dir.clone();
                                }
                            }
                            if resp.dry_run && !resp.command_plan.is_empty() {
                                state.emit(RescueEvent::PlanReady {
                                    task_id: task_id.clone(),
                                    commands: resp.command_plan.clone(),
                                    command_source: resp.command_source.clone(),
                                });
                            }
                        }
                        resolved
                    }
                    Err(err) => {
                        state.apply_failure(&task_id, &err);
                        None
                    }
                }
            }
        };

        if resolved == Some(TaskStatus::Completed) {
            self.spawn_local_refresh();
        }
    }

    // ---- push channel ---------------------------------------------------

    /// Handle a raw progress payload from the backend push channel.
    ///
    /// Malformed payloads are dropped silently; this never fails or panics.
    pub async fn handle_progress_event(&self, raw: &Value) {
        let Some(msg) = normalize(raw) else {
            debug!("dropped malformed progress payload");
            return;
        };
        if msg.task_id.is_empty() {
            debug!("dropped progress payload without task id");
            return;
        }
        let resolved = self.state.write().await.apply_progress(msg);
        if resolved == Some(TaskStatus::Completed) {
            self.spawn_local_refresh();
        }
    }

    // ---- lifecycle control ----------------------------------------------

    /// Request cancellation of an in-progress task.
    ///
    /// The task flips to `Canceling` immediately for instant feedback; the
    /// definitive terminal state arrives via the cancel response or a later
    /// progress event. Repeated calls while `Canceling` are no-ops.
    pub async fn cancel_task(&self, task_id: &str) -> AppResult<()> {
        {
            let mut state = self.state.write().await;
            let Some(task) = state.find_task_mut(task_id) else {
                return Ok(());
            };
            if task.status == TaskStatus::Canceling || !task.status.is_in_progress() {
                return Ok(());
            }
            task.status = TaskStatus::Canceling;
            task.updated_at = chrono::Utc::now();
            let snapshot = task.clone();
            state.sync_current(&snapshot);
            state.emit(RescueEvent::TaskUpdated {
                task_id: snapshot.id.clone(),
                task: snapshot,
            });
            info!(task_id, "cancel requested");
        }

        let result = self.gateway.cancel_task(task_id).await;
        let mut state = self.state.write().await;
        if state.dismissed.contains(task_id) {
            return Ok(());
        }
        match result {
            Ok(CancelOutcome::NotFound) => {
                // Already finished or vanished server-side.
                if let Some(task) = state.find_task_mut(task_id) {
                    if !task.status.is_terminal() {
                        task.status = TaskStatus::Canceled;
                        task.last_error.clear();
                        task.updated_at = chrono::Utc::now();
                        let snapshot = task.clone();
                        state.sync_current(&snapshot);
                        state.emit(RescueEvent::TaskUpdated {
                            task_id: snapshot.id.clone(),
                            task: snapshot,
                        });
                    }
                }
            }
            Ok(CancelOutcome::Canceling) => {
                // Stay at Canceling; a terminal progress event resolves it.
            }
            Err(err) => {
                state.apply_failure(task_id, &err);
            }
        }
        Ok(())
    }

    /// Ask the backend to pause a task. Advisory: local status changes only
    /// when a progress event or response confirms it.
    pub async fn pause_task(&self, task_id: &str) -> AppResult<()> {
        if self.state.read().await.find_task(task_id).is_none() {
            return Ok(());
        }
        if let Err(err) = self.gateway.pause_task(task_id).await {
            warn!(task_id, "pause request failed: {}", err.message());
            let message = format!("Pause failed: {}", err.message());
            self.state.write().await.notice_error(task_id, &message);
        }
        Ok(())
    }

    /// Ask the backend to resume a paused task. Advisory, like `pause_task`.
    pub async fn resume_task(&self, task_id: &str) -> AppResult<()> {
        if self.state.read().await.find_task(task_id).is_none() {
            return Ok(());
        }
        match self.gateway.resume_task(task_id).await {
            Ok(resp) => {
                if let Some(status) = resp.status {
                    self.state
                        .write()
                        .await
                        .apply_status_confirmation(task_id, status);
                }
            }
            Err(err) => {
                warn!(task_id, "resume request failed: {}", err.message());
                let message = format!("Resume failed: {}", err.message());
                self.state.write().await.notice_error(task_id, &message);
            }
        }
        Ok(())
    }

    /// Remove a task from history and stop tracking it.
    ///
    /// Dismissal implies intent to stop backend work: an in-progress task
    /// gets a best-effort, un-awaited cancel RPC.
    pub async fn dismiss_task(&self, task_id: &str) {
        let was_in_progress = {
            let mut state = self.state.write().await;
            let Some(pos) = state.history.iter().position(|task| task.id == task_id) else {
                return;
            };
            let task = state.history.remove(pos);
            state.dismissed.insert(task_id.to_string());
            if state.current.id == task_id {
                state.current = Task::idle();
                let current = state.current.clone();
                state.emit(RescueEvent::CurrentChanged { task: current });
            }
            state.emit(RescueEvent::TaskDismissed {
                task_id: task_id.to_string(),
            });
            info!(task_id, "task dismissed");
            task.status.is_in_progress()
        };

        if was_in_progress {
            let gateway = Arc::clone(&self.gateway);
            let id = task_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = gateway.cancel_task(&id).await {
                    debug!(task_id = %id, "best-effort cancel after dismissal failed: {}", err.message());
                }
            });
        }
    }

    /// Dismiss every task in history
    pub async fn dismiss_all(&self) {
        let ids: Vec<String> = {
            let state = self.state.read().await;
            state.history.iter().map(|task| task.id.clone()).collect()
        };
        for id in ids {
            self.dismiss_task(&id).await;
        }
    }

    // ---- local files ----------------------------------------------------

    /// Replace the local-file projection wholesale. Best-effort: failures
    /// are logged and swallowed.
    pub async fn refresh_local_files(&self) {
        match self.gateway.list_local_files().await {
            Ok(files) => {
                let mut state = self.state.write().await;
                state.local_files = files.clone();
                state.emit(RescueEvent::LocalFilesUpdated { files });
            }
            Err(err) => {
                warn!("local file refresh failed: {}", err.message());
            }
        }
    }

    /// Extract a downloaded package in place; returns the extraction dir
    pub async fn extract_local_file(&self, file: &LocalFile) -> AppResult<String> {
        let resp = self
            .gateway
            .extract_local_file(ExtractRequest {
                full_path: file.full_path.clone(),
                file_name: file.file_name.clone(),
                extracted_dir: None,
            })
            .await
            .map_err(|err| AppError::Gateway(err.message().to_string()))?;
        self.refresh_local_files().await;
        Ok(resp.extracted_dir)
    }

    /// Associate a catalog recipe with an already-downloaded package
    pub async fn attach_recipe(
        &self,
        file: &LocalFile,
        variant: &FirmwareVariant,
    ) -> AppResult<()> {
        let recipe_url = variant
            .recipe_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AppError::InvalidInput("variant carries no recipe URL".to_string())
            })?;
        self.gateway
            .attach_recipe(AttachRecipeRequest {
                full_path: file.full_path.clone(),
                file_name: file.file_name.clone(),
                recipe_url: recipe_url.to_string(),
                match_id: variant.match_id.clone(),
                selected_params: variant.selected_params.clone(),
            })
            .await
            .map_err(|err| AppError::Gateway(err.message().to_string()))?;
        self.refresh_local_files().await;
        Ok(())
    }

    /// Delete a downloaded package from disk
    pub async fn delete_local_file(&self, file: &LocalFile) -> AppResult<()> {
        self.gateway
            .delete_local_file(&file.full_path)
            .await
            .map_err(|err| AppError::Gateway(err.message().to_string()))?;
        self.refresh_local_files().await;
        Ok(())
    }

    fn spawn_local_refresh(&self) {
        let center = self.clone();
        tokio::spawn(async move {
            center.refresh_local_files().await;
        });
    }
}

fn some_non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
