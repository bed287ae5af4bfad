//! Task identity and default rescue options

use crate::core::models::{DataReset, FlashTransport, QdlStorage, RescueOptions};
use uuid::Uuid;

/// Generate a task id unique within this process.
///
/// Combines the current unix-millisecond timestamp with a random UUID v4 so
/// a collision would require both components to repeat.
pub fn new_task_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}-{}", millis, Uuid::new_v4().simple())
}

/// Default options presented when a rescue dialog opens
pub fn default_rescue_options() -> RescueOptions {
    RescueOptions {
        data_reset: DataReset::Yes,
        flash_transport: FlashTransport::Fastboot,
        qdl_storage: QdlStorage::Auto,
        qdl_serial: String::new(),
    }
}
