//! Deep merge of layer documents.

use serde_json::Value;

/// Fold `layer` into `base`: objects merge key by key, anything else in
/// `layer` replaces what `base` had.
pub(super) fn overlay(base: &mut Value, layer: Value) {
    let Value::Object(incoming) = layer else {
        *base = layer;
        return;
    };
    let Value::Object(existing) = base else {
        *base = Value::Object(incoming);
        return;
    };
    for (key, value) in incoming {
        match existing.get_mut(&key) {
            Some(slot) => overlay(slot, value),
            None => {
                existing.insert(key, value);
            }
        }
    }
}
