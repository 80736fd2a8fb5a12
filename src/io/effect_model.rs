//! Loading and querying compiled tactical effect-model artifacts (the
//! "hazard catalog" that `trigger_hazard_source`/`run_hazard_routine` draw
//! their effect lists from).

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::ScenarioError;

pub const DEFAULT_EFFECT_MODEL_PATH: &str = "compiled/tactical_effect_models_v1.json";

pub struct HazardSource {
    pub hazard_id: String,
    pub hazard_name: Option<String>,
    pub source_type: String,
    pub source_name: String,
    pub effects: Vec<Value>,
    pub raw_text: Option<String>,
}

pub fn load_effect_model(path: &str) -> Result<Value, ScenarioError> {
    let text = fs::read_to_string(Path::new(path)).map_err(|source| ScenarioError::Io { path: path.to_string(), source })?;
    serde_json::from_str(&text).map_err(|source| ScenarioError::Json { path: path.to_string(), source })
}

pub fn lookup_hazard_source(
    hazard_id: &str,
    source_name: &str,
    source_type: &str,
    model_path: &str,
) -> Result<HazardSource, ScenarioError> {
    let model = load_effect_model(model_path)?;
    let entries = model
        .get("hazards")
        .and_then(|h| h.get("entries"))
        .and_then(|e| e.as_array())
        .cloned()
        .unwrap_or_default();

    for hazard in &entries {
        if hazard.get("hazard_id").and_then(|v| v.as_str()) != Some(hazard_id) {
            continue;
        }
        let sources = hazard.get("sources").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        for source in &sources {
            let matches_type = source.get("source_type").and_then(|v| v.as_str()) == Some(source_type);
            let matches_name = source.get("source_name").and_then(|v| v.as_str()) == Some(source_name);
            if matches_type && matches_name {
                return Ok(HazardSource {
                    hazard_id: hazard_id.to_string(),
                    hazard_name: hazard.get("hazard_name").and_then(|v| v.as_str()).map(String::from),
                    source_type: source_type.to_string(),
                    source_name: source_name.to_string(),
                    effects: source.get("effects").and_then(|v| v.as_array()).cloned().unwrap_or_default(),
                    raw_text: source.get("raw_text").and_then(|v| v.as_str()).map(String::from),
                });
            }
        }
    }

    Err(ScenarioError::EffectModel(format!(
        "hazard source not found: hazard_id={hazard_id} source_type={source_type} source_name={source_name}"
    )))
}
