//! Firmware Rescue - Core Library
//!
//! This library provides the core workflow logic for the firmware rescue
//! application: tracked download/rescue tasks, progress event reconciliation,
//! local-file matching, and a reactive read model for any presentation layer.
//! Network transfer, archive extraction and device flashing are delegated to
//! an external backend reached through [`core::gateway::BackendGateway`].

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    config::AppConfig,
    gateway::{BackendGateway, GatewayError},
    identity::{default_rescue_options, new_task_id},
    models::{
        AppError, AppResult, FirmwareVariant, LocalFile, ProgressMessage, RescueOptions, Task,
        TaskMode, TaskStatus,
    },
    orchestrator::{RescueCenter, RescueEvent, StartOutcome},
    progress::normalize,
};

pub use crate::utils::file_matching::{best_local_match, best_variant_for_local_file};

use std::sync::Arc;

/// Application state shared between presentation-layer entry points
#[derive(Clone)]
pub struct AppState {
    pub center: RescueCenter,
    pub config: Arc<tokio::sync::RwLock<AppConfig>>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> anyhow::Result<Self> {
        let config = Self::load_or_initialize_config();
        let center = RescueCenter::new(gateway, &config);
        Ok(Self {
            center,
            config: Arc::new(tokio::sync::RwLock::new(config)),
        })
    }

    fn load_or_initialize_config() -> AppConfig {
        match AppConfig::load() {
            Ok(cfg) => {
                if let Err(err) = cfg.validate() {
                    tracing::warn!(
                        "Invalid configuration detected ({}), falling back to defaults",
                        err
                    );
                    let default_cfg = AppConfig::default();
                    if let Err(save_err) = default_cfg.save() {
                        tracing::warn!("Failed to persist default configuration: {}", save_err);
                    }
                    default_cfg
                } else {
                    cfg
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {}. Using defaults",
                    err
                );
                AppConfig::default()
            }
        }
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    utils::logging::init_tracing();
    tracing::info!("{} v{} initialized", NAME, VERSION);
    Ok(())
}
