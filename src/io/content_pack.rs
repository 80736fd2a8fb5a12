//! Versioned content-pack loading, validation, and scenario integration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScenarioError;

const ALLOWED_KINDS: [&str; 6] = ["action", "spell", "feat", "item", "trait", "condition"];

fn fail(message: impl Into<String>) -> ScenarioError {
    ScenarioError::ContentPackValidation(message.into())
}

fn fail_resolution(message: impl Into<String>) -> ScenarioError {
    ScenarioError::ContentPackResolution(message.into())
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(fail(message))
    }
}

fn require_resolution(condition: bool, message: impl Into<String>) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(fail_resolution(message))
    }
}

/// `MAJOR.MINOR.PATCH`, each component either `0` or digits with no leading
/// zero, matching the original pack loader's semver pattern.
fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    parts.iter().all(|part| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()) && (part.len() == 1 || !part.starts_with('0'))
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compatibility {
    pub min_engine_phase: i64,
    pub max_engine_phase: i64,
    #[serde(default)]
    pub feature_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPack {
    pub pack_id: String,
    pub version: String,
    pub compatibility: Compatibility,
    pub entries: Vec<ContentEntry>,
}

/// Structural validation mirroring the original pack loader's checks, run
/// against the raw JSON before it's deserialized into typed structs so the
/// error messages stay field-addressable.
pub fn validate_content_pack(data: &Value) -> Result<(), ScenarioError> {
    let obj = data.as_object().ok_or_else(|| fail("content pack must be object"))?;

    for key in ["pack_id", "version", "compatibility", "entries"] {
        require(obj.contains_key(key), format!("content pack missing key: {key}"))?;
    }

    let pack_id = obj["pack_id"].as_str();
    require(matches!(pack_id, Some(s) if !s.is_empty()), "pack_id must be non-empty string")?;

    let version = obj["version"].as_str();
    require(matches!(version, Some(v) if is_semver(v)), "version must be semver string MAJOR.MINOR.PATCH")?;

    let compatibility = obj["compatibility"].as_object().ok_or_else(|| fail("compatibility must be object"))?;
    let min_phase = compatibility.get("min_engine_phase").and_then(|v| v.as_i64());
    let max_phase = compatibility.get("max_engine_phase").and_then(|v| v.as_i64());
    require(matches!(min_phase, Some(p) if p > 0), "compatibility.min_engine_phase must be positive int")?;
    require(matches!(max_phase, Some(p) if p > 0), "compatibility.max_engine_phase must be positive int")?;
    require(min_phase.unwrap() <= max_phase.unwrap(), "compatibility min_engine_phase cannot exceed max_engine_phase")?;

    let feature_tags = compatibility.get("feature_tags").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
    let feature_tags = feature_tags.as_array().ok_or_else(|| fail("compatibility.feature_tags must be list"))?;
    for (idx, tag) in feature_tags.iter().enumerate() {
        require(
            matches!(tag.as_str(), Some(s) if !s.is_empty()),
            format!("compatibility.feature_tags[{idx}] must be non-empty string"),
        )?;
    }

    let entries = obj["entries"].as_array().ok_or_else(|| fail("entries must be non-empty list"))?;
    require(!entries.is_empty(), "entries must be non-empty list")?;

    let mut seen_ids = std::collections::HashSet::new();
    for (idx, entry) in entries.iter().enumerate() {
        let context = format!("entries[{idx}]");
        let entry_obj = entry.as_object().ok_or_else(|| fail(format!("{context} must be object")))?;
        for key in ["id", "kind", "payload"] {
            require(entry_obj.contains_key(key), format!("{context} missing key: {key}"))?;
        }

        let entry_id = entry_obj["id"].as_str();
        require(matches!(entry_id, Some(s) if !s.is_empty()), format!("{context}.id must be non-empty string"))?;
        let entry_id = entry_id.unwrap();
        require(!seen_ids.contains(entry_id), format!("duplicate entry id: {entry_id}"))?;
        seen_ids.insert(entry_id.to_string());

        let kind = entry_obj["kind"].as_str();
        require(matches!(kind, Some(k) if ALLOWED_KINDS.contains(&k)), format!("{context}.kind invalid: {kind:?}"))?;

        if let Some(source) = entry_obj.get("source_ref") {
            if !source.is_null() {
                require(
                    matches!(source.as_str(), Some(s) if !s.is_empty()),
                    format!("{context}.source_ref must be non-empty string when present"),
                )?;
            }
        }

        let tags = entry_obj.get("tags").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        let tags = tags.as_array().ok_or_else(|| fail(format!("{context}.tags must be list when present")))?;
        for (tag_idx, tag) in tags.iter().enumerate() {
            require(
                matches!(tag.as_str(), Some(s) if !s.is_empty()),
                format!("{context}.tags[{tag_idx}] must be non-empty string"),
            )?;
        }

        require(entry_obj["payload"].is_object(), format!("{context}.payload must be object"))?;
    }

    Ok(())
}

pub fn load_content_pack(path: &Path) -> Result<ContentPack, ScenarioError> {
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io { path: path.display().to_string(), source })?;
    let data: Value = serde_json::from_str(&text).map_err(|source| ScenarioError::Json { path: path.display().to_string(), source })?;
    validate_content_pack(&data)?;
    serde_json::from_value(data).map_err(|source| ScenarioError::Json { path: path.display().to_string(), source })
}

pub fn content_pack_supports_phase(pack: &ContentPack, phase: i64) -> bool {
    pack.compatibility.min_engine_phase <= phase && phase <= pack.compatibility.max_engine_phase
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub pack_id: String,
    pub kind: String,
    pub source_ref: Option<String>,
    pub tags: Vec<String>,
    pub payload: Value,
}

/// Builds an entry lookup across packs, rejecting duplicate entry ids.
pub fn build_content_entry_lookup(packs: &[ContentPack]) -> Result<BTreeMap<String, ResolvedEntry>, ScenarioError> {
    let mut lookup = BTreeMap::new();
    for pack in packs {
        for entry in &pack.entries {
            require_resolution(!entry.id.is_empty(), format!("entry missing id in pack: {}", pack.pack_id))?;
            require_resolution(!lookup.contains_key(&entry.id), format!("duplicate entry id across packs: {}", entry.id))?;
            lookup.insert(
                entry.id.clone(),
                ResolvedEntry {
                    pack_id: pack.pack_id.clone(),
                    kind: entry.kind.clone(),
                    source_ref: entry.source_ref.clone(),
                    tags: entry.tags.clone(),
                    payload: entry.payload.clone(),
                },
            );
        }
    }
    Ok(lookup)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackCompatibilityMetadata {
    pub min_engine_phase: i64,
    pub max_engine_phase: i64,
    pub feature_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackMetadata {
    pub pack_id: String,
    pub version: String,
    pub entry_count: usize,
    pub compatibility: PackCompatibilityMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentContext {
    pub selected_pack_id: Option<String>,
    pub packs: Vec<PackMetadata>,
    pub entry_lookup: BTreeMap<String, ResolvedEntry>,
}

fn resolve_pack_path(raw_path: &str, scenario_path: &Path) -> PathBuf {
    let candidate = PathBuf::from(raw_path);
    if candidate.is_absolute() {
        return candidate;
    }
    let scenario_relative = scenario_path.parent().unwrap_or_else(|| Path::new(".")).join(&candidate);
    if scenario_relative.exists() {
        scenario_relative
    } else {
        candidate
    }
}

/// Resolves a scenario's declared content packs, checks engine-phase
/// compatibility and any `required_content_features`, and returns the
/// merged entry lookup the driver resolves `content_entry_id` templates
/// against.
pub fn resolve_scenario_content_context(
    scenario: &Value,
    scenario_path: &Path,
    engine_phase: i64,
) -> Result<ContentContext, ScenarioError> {
    let raw_pack_paths: Vec<String> = scenario
        .get("content_packs")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if raw_pack_paths.is_empty() {
        return Ok(ContentContext { selected_pack_id: None, packs: Vec::new(), entry_lookup: BTreeMap::new() });
    }

    let mut loaded_packs: BTreeMap<String, ContentPack> = BTreeMap::new();
    for raw_path in &raw_pack_paths {
        let pack_path = resolve_pack_path(raw_path, scenario_path);
        require_resolution(pack_path.exists(), format!("content pack path not found: {raw_path}"))?;
        let pack = load_content_pack(&pack_path)?;
        require_resolution(
            content_pack_supports_phase(&pack, engine_phase),
            format!("content pack {} incompatible with engine phase {engine_phase}", pack.pack_id),
        )?;
        require_resolution(!loaded_packs.contains_key(&pack.pack_id), format!("duplicate content pack id: {}", pack.pack_id))?;
        loaded_packs.insert(pack.pack_id.clone(), pack);
    }

    let mut selected_pack_id = scenario.get("content_pack_id").and_then(|v| v.as_str()).map(String::from);
    if selected_pack_id.is_none() && loaded_packs.len() == 1 {
        selected_pack_id = loaded_packs.keys().next().cloned();
    }
    if let Some(selected) = &selected_pack_id {
        require_resolution(loaded_packs.contains_key(selected), format!("scenario content_pack_id not loaded: {selected}"))?;
    }

    let required_features: Vec<String> = scenario
        .get("required_content_features")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if !required_features.is_empty() {
        require_resolution(
            selected_pack_id.is_some(),
            "required_content_features requires content_pack_id or exactly one loaded content pack",
        )?;
        let selected = &loaded_packs[selected_pack_id.as_ref().unwrap()];
        let feature_tags: std::collections::HashSet<&str> =
            selected.compatibility.feature_tags.iter().map(|s| s.as_str()).collect();
        let missing: Vec<&String> = required_features.iter().filter(|tag| !feature_tags.contains(tag.as_str())).collect();
        require_resolution(
            missing.is_empty(),
            format!("content pack {} missing required feature tags: {missing:?}", selected_pack_id.as_ref().unwrap()),
        )?;
    }

    let packs_sorted: Vec<ContentPack> = loaded_packs.values().cloned().collect();
    let entry_lookup = build_content_entry_lookup(&packs_sorted)?;

    let pack_metadata = packs_sorted
        .iter()
        .map(|pack| {
            let mut feature_tags = pack.compatibility.feature_tags.clone();
            feature_tags.sort();
            PackMetadata {
                pack_id: pack.pack_id.clone(),
                version: pack.version.clone(),
                entry_count: pack.entries.len(),
                compatibility: PackCompatibilityMetadata {
                    min_engine_phase: pack.compatibility.min_engine_phase,
                    max_engine_phase: pack.compatibility.max_engine_phase,
                    feature_tags,
                },
            }
        })
        .collect();

    Ok(ContentContext { selected_pack_id, packs: pack_metadata, entry_lookup })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_pack() -> Value {
        json!({
            "pack_id": "core",
            "version": "1.0.0",
            "compatibility": {"min_engine_phase": 1, "max_engine_phase": 4, "feature_tags": ["hazards"]},
            "entries": [
                {"id": "spell.fireball", "kind": "spell", "payload": {"damage": "6d6"}}
            ]
        })
    }

    #[test]
    fn validates_well_formed_pack() {
        assert!(validate_content_pack(&sample_pack()).is_ok());
    }

    #[test]
    fn rejects_bad_semver() {
        let mut pack = sample_pack();
        pack["version"] = json!("1.0");
        assert!(validate_content_pack(&pack).is_err());
    }

    #[test]
    fn rejects_duplicate_entry_ids() {
        let mut pack = sample_pack();
        pack["entries"].as_array_mut().unwrap().push(json!({"id": "spell.fireball", "kind": "spell", "payload": {}}));
        assert!(validate_content_pack(&pack).is_err());
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut pack = sample_pack();
        pack["entries"][0]["kind"] = json!("weapon");
        assert!(validate_content_pack(&pack).is_err());
    }

    #[test]
    fn phase_support_checks_inclusive_bounds() {
        let pack: ContentPack = serde_json::from_value(sample_pack()).unwrap();
        assert!(content_pack_supports_phase(&pack, 1));
        assert!(content_pack_supports_phase(&pack, 4));
        assert!(!content_pack_supports_phase(&pack, 5));
    }
}
