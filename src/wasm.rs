use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

/// Decompiles a `project.json` text and returns a JSON object mapping each
/// target name to its BSL source.
#[wasm_bindgen]
pub fn decompile_project_json(json: &str) -> Result<String, JsValue> {
    let targets = crate::decompile_json(json).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    let sources: Map<String, Value> = targets
        .into_iter()
        .map(|target| (target.name, Value::String(target.source)))
        .collect();
    serde_json::to_string(&Value::Object(sources)).map_err(|e| JsValue::from_str(&e.to_string()))
}
