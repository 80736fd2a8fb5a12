//! Browser-facing command-authoring helpers for content-entry driven commands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ScenarioError;
use crate::io::content_pack::ContentContext;

pub const TEMPLATE_COMMAND_TYPES: [&str; 4] = ["cast_spell", "use_feat", "use_item", "interact"];

fn fail(message: impl Into<String>) -> ScenarioError {
    ScenarioError::Validation(message.into())
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(fail(message))
    }
}

fn entry_payload(content_context: &ContentContext, content_entry_id: &str) -> Result<Value, ScenarioError> {
    let entry = content_context
        .entry_lookup
        .get(content_entry_id)
        .ok_or_else(|| fail(format!("unknown content entry {content_entry_id}")))?;
    Ok(entry.payload.clone())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntryOption {
    pub entry_id: String,
    pub command_type: String,
    pub kind: String,
    pub pack_id: String,
    pub source_ref: Option<String>,
    pub tags: Vec<String>,
}

/// Lists template-capable entries (ones whose payload declares a
/// `command_type` among `cast_spell`/`use_feat`/`use_item`/`interact`) in
/// deterministic entry-id order, for a UI's command-builder dropdown.
pub fn list_content_entry_options(content_context: &ContentContext, command_type: Option<&str>) -> Result<Vec<ContentEntryOption>, ScenarioError> {
    if let Some(ct) = command_type {
        require(TEMPLATE_COMMAND_TYPES.contains(&ct), format!("unsupported command_type filter: {ct}"))?;
    }

    let mut out = Vec::new();
    for entry_id in content_context.entry_lookup.keys() {
        let entry = &content_context.entry_lookup[entry_id];
        let template_type = entry.payload.get("command_type").and_then(|v| v.as_str()).unwrap_or("");
        if !TEMPLATE_COMMAND_TYPES.contains(&template_type) {
            continue;
        }
        if let Some(ct) = command_type {
            if template_type != ct {
                continue;
            }
        }
        out.push(ContentEntryOption {
            entry_id: entry_id.clone(),
            command_type: template_type.to_string(),
            kind: entry.kind.clone(),
            pack_id: entry.pack_id.clone(),
            source_ref: entry.source_ref.clone(),
            tags: entry.tags.clone(),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandIntent {
    pub actor: String,
    pub command_type: String,
    pub content_entry_id: String,
    pub source_pack_id: String,
    pub command: Value,
}

/// Builds a validated command intent a UI client can submit directly,
/// merging a content entry's template with actor/target/dc/overrides and
/// re-validating the type-specific required fields after overrides apply.
#[allow(clippy::too_many_arguments)]
pub fn build_ui_command_intent(
    content_context: &ContentContext,
    actor: &str,
    command_type: &str,
    content_entry_id: &str,
    target: Option<&str>,
    dc: Option<i64>,
    overrides: Option<&Map<String, Value>>,
) -> Result<CommandIntent, ScenarioError> {
    require(!actor.is_empty(), "actor must be non-empty string")?;
    require(TEMPLATE_COMMAND_TYPES.contains(&command_type), format!("unsupported command_type: {command_type}"))?;
    require(!content_entry_id.is_empty(), "content_entry_id must be non-empty string")?;

    let payload = entry_payload(content_context, content_entry_id)?;
    let template_type = payload.get("command_type").and_then(|v| v.as_str()).unwrap_or("");
    require(template_type == command_type, format!("command_type mismatch: {template_type} != {command_type}"))?;

    let mut command = Map::new();
    command.insert("type".to_string(), Value::String(command_type.to_string()));
    command.insert("actor".to_string(), Value::String(actor.to_string()));
    command.insert("content_entry_id".to_string(), Value::String(content_entry_id.to_string()));

    match command_type {
        "cast_spell" => {
            require(matches!(target, Some(t) if !t.is_empty()), "cast_spell intent requires target")?;
            require(matches!(dc, Some(d) if d > 0), "cast_spell intent requires positive dc")?;
            command.insert("target".to_string(), Value::String(target.unwrap().to_string()));
            command.insert("dc".to_string(), Value::from(dc.unwrap()));
        }
        "use_feat" | "use_item" | "interact" => {
            command.insert("target".to_string(), Value::String(target.unwrap_or(actor).to_string()));
        }
        _ => {}
    }

    if let Some(overrides) = overrides {
        if let Some(override_type) = overrides.get("type") {
            require(override_type.as_str() == Some(command_type), "overrides.type cannot change command type")?;
        }
        if let Some(override_actor) = overrides.get("actor") {
            require(override_actor.as_str() == Some(actor), "overrides.actor cannot change actor")?;
        }
        for (key, value) in overrides {
            command.insert(key.clone(), value.clone());
        }
    }

    match command_type {
        "cast_spell" => {
            require(matches!(command.get("target").and_then(|v| v.as_str()), Some(t) if !t.is_empty()), "cast_spell target must be non-empty string")?;
            require(matches!(command.get("dc").and_then(|v| v.as_i64()), Some(d) if d > 0), "cast_spell dc must be positive int")?;
        }
        "use_feat" | "use_item" => {
            require(
                matches!(command.get("target").and_then(|v| v.as_str()), Some(t) if !t.is_empty()),
                format!("{command_type} target must be non-empty string"),
            )?;
        }
        _ => {}
    }

    let entry = &content_context.entry_lookup[content_entry_id];
    Ok(CommandIntent {
        actor: actor.to_string(),
        command_type: command_type.to_string(),
        content_entry_id: content_entry_id.to_string(),
        source_pack_id: entry.pack_id.clone(),
        command: Value::Object(command),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAuthoringCatalog {
    pub template_command_types: Vec<String>,
    pub options: Vec<ContentEntryOption>,
}

pub fn build_command_authoring_catalog(content_context: &ContentContext) -> Result<CommandAuthoringCatalog, ScenarioError> {
    Ok(CommandAuthoringCatalog {
        template_command_types: TEMPLATE_COMMAND_TYPES.iter().map(|s| s.to_string()).collect(),
        options: list_content_entry_options(content_context, None)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::content_pack::ResolvedEntry;
    use std::collections::BTreeMap;

    fn context_with_spell() -> ContentContext {
        let mut entry_lookup = BTreeMap::new();
        entry_lookup.insert(
            "spell.fireball".to_string(),
            ResolvedEntry {
                pack_id: "core".to_string(),
                kind: "spell".to_string(),
                source_ref: None,
                tags: vec!["evocation".to_string()],
                payload: serde_json::json!({"command_type": "cast_spell", "damage": "6d6"}),
            },
        );
        ContentContext { selected_pack_id: Some("core".to_string()), packs: Vec::new(), entry_lookup }
    }

    #[test]
    fn lists_template_capable_entries() {
        let ctx = context_with_spell();
        let options = list_content_entry_options(&ctx, None).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].entry_id, "spell.fireball");
    }

    #[test]
    fn builds_cast_spell_intent_with_required_fields() {
        let ctx = context_with_spell();
        let intent = build_ui_command_intent(&ctx, "hero", "cast_spell", "spell.fireball", Some("goblin"), Some(18), None).unwrap();
        assert_eq!(intent.command["target"], "goblin");
        assert_eq!(intent.command["dc"], 18);
    }

    #[test]
    fn rejects_mismatched_command_type() {
        let ctx = context_with_spell();
        let result = build_ui_command_intent(&ctx, "hero", "use_feat", "spell.fireball", Some("hero"), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_cannot_change_actor() {
        let ctx = context_with_spell();
        let mut overrides = Map::new();
        overrides.insert("actor".to_string(), Value::String("villain".to_string()));
        let result = build_ui_command_intent(&ctx, "hero", "cast_spell", "spell.fireball", Some("goblin"), Some(18), Some(&overrides));
        assert!(result.is_err());
    }
}
