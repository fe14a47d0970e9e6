//! Schema validation helpers for Parley JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Reject unknown keys and wrongly typed values in one layer document.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "store",
        "enhancements",
        "reveal",
        "session",
        "services",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("store") {
        validate_store(value, layer, "store")?;
    }
    if let Some(value) = map.get("enhancements") {
        validate_enhancements(value, layer, "enhancements")?;
    }
    if let Some(value) = map.get("reveal") {
        validate_reveal(value, layer, "reveal")?;
    }
    if let Some(value) = map.get("session") {
        validate_session(value, layer, "session")?;
    }
    if let Some(value) = map.get("services") {
        validate_services(value, layer, "services")?;
    }
    Ok(())
}

/// `store` section.
fn validate_store(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["backend", "url", "api_key", "timeout_secs"], layer, path)?;

    if let Some(value) = map.get("backend") {
        expect_one_of(value, &["memory", "rest"], layer, &join_path(path, "backend"))?;
    }
    if let Some(value) = map.get("url") {
        expect_string(value, layer, &join_path(path, "url"))?;
    }
    if let Some(value) = map.get("api_key") {
        expect_string(value, layer, &join_path(path, "api_key"))?;
    }
    if let Some(value) = map.get("timeout_secs") {
        expect_u64(value, layer, &join_path(path, "timeout_secs"))?;
    }
    Ok(())
}

/// `enhancements` section.
fn validate_enhancements(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["storage", "cache_dir", "default_provider"],
        layer,
        path,
    )?;

    if let Some(value) = map.get("storage") {
        expect_one_of(value, &["remote", "local"], layer, &join_path(path, "storage"))?;
    }
    if let Some(value) = map.get("cache_dir") {
        expect_string(value, layer, &join_path(path, "cache_dir"))?;
    }
    if let Some(value) = map.get("default_provider") {
        expect_string(value, layer, &join_path(path, "default_provider"))?;
    }
    Ok(())
}

/// `reveal` section.
fn validate_reveal(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["step_delay_ms"], layer, path)?;

    if let Some(value) = map.get("step_delay_ms") {
        expect_u64(value, layer, &join_path(path, "step_delay_ms"))?;
    }
    Ok(())
}

/// `session` section.
fn validate_session(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["reconcile_window_secs", "event_buffer"], layer, path)?;

    if let Some(value) = map.get("reconcile_window_secs") {
        expect_u64(value, layer, &join_path(path, "reconcile_window_secs"))?;
    }
    if let Some(value) = map.get("event_buffer") {
        expect_u64(value, layer, &join_path(path, "event_buffer"))?;
    }
    Ok(())
}

/// `services` section.
fn validate_services(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["assistant", "functions_url", "api_key"], layer, path)?;

    if let Some(value) = map.get("assistant") {
        expect_one_of(value, &["echo", "remote"], layer, &join_path(path, "assistant"))?;
    }
    if let Some(value) = map.get("functions_url") {
        expect_string(value, layer, &join_path(path, "functions_url"))?;
    }
    if let Some(value) = map.get("api_key") {
        expect_string(value, layer, &join_path(path, "api_key"))?;
    }
    Ok(())
}

/// Borrow `value` as an object.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a string drawn from a fixed vocabulary.
fn expect_one_of(
    value: &Value,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let Some(raw) = value.as_str() else {
        return Err(invalid_field(layer, path, "expected string"));
    };
    if allowed.contains(&raw) {
        Ok(())
    } else {
        Err(invalid_field(
            layer,
            path,
            &format!("expected one of {}", allowed.join(", ")),
        ))
    }
}

/// Every key in `map` must appear in `allowed`.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    ConfigError::Field {
        origin: layer.to_string(),
        key: if path.is_empty() { "<root>" } else { path }.to_string(),
        reason: message.to_string(),
    }
}
