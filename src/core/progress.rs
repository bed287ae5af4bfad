//! Progress event normalization
//!
//! Push messages arrive from the backend as untyped JSON. This module coerces
//! them into a well-typed [`ProgressMessage`] or rejects them. The only
//! required field is `status`; everything else degrades to a type-appropriate
//! default so a minor backend protocol change cannot crash the consumer.

use serde_json::Value;

use crate::core::models::{FlashTransport, Phase, ProgressMessage, QdlStorage, TaskStatus};

/// Validate and coerce a raw push payload.
///
/// Returns `None` when the payload is not a JSON object or its `status`
/// field is not a known backend lifecycle value. Unknown `phase`,
/// `flashTransport` and `qdlStorage` values degrade to unset instead of
/// rejecting the whole message. Pure and side-effect free.
pub fn normalize(raw: &Value) -> Option<ProgressMessage> {
    let object = raw.as_object()?;

    let status = object
        .get("status")
        .and_then(Value::as_str)
        .and_then(TaskStatus::parse_backend)?;

    Some(ProgressMessage {
        task_id: string_field(object, "taskId"),
        source_url: string_field(object, "sourceUrl"),
        display_name: string_field(object, "displayName"),
        status,
        dry_run: object.get("dryRun").and_then(Value::as_bool),
        flash_transport: enum_field(object, "flashTransport", FlashTransport::parse),
        qdl_storage: enum_field(object, "qdlStorage", QdlStorage::parse),
        qdl_serial: string_field(object, "qdlSerial"),
        save_path: string_field(object, "savePath"),
        downloaded_bytes: u64_field(object, "bytesDownloaded"),
        total_bytes: object.get("totalBytes").and_then(Value::as_u64),
        speed_bps: u64_field(object, "speedBytesPerSecond"),
        phase: enum_field(object, "phase", Phase::parse),
        step_index: u32_field(object, "stepIndex"),
        step_total: u32_field(object, "stepTotal"),
        step_label: string_field(object, "stepLabel"),
        command_source: string_field(object, "commandSource"),
        error: string_field(object, "error"),
    })
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn u64_field(object: &serde_json::Map<String, Value>, key: &str) -> u64 {
    object.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn u32_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<u32> {
    object
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
}

fn enum_field<T>(
    object: &serde_json::Map<String, Value>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    object.get(key).and_then(Value::as_str).and_then(|s| parse(s))
}
