//! Scenario, content-pack, effect-model, and event-log I/O.

pub mod command_authoring;
pub mod content_pack;
pub mod effect_model;
pub mod event_log;
pub mod scenario;

pub use command_authoring::{build_command_authoring_catalog, build_ui_command_intent, list_content_entry_options};
pub use content_pack::{resolve_scenario_content_context, ContentContext};
pub use effect_model::{load_effect_model, lookup_hazard_source, HazardSource, DEFAULT_EFFECT_MODEL_PATH};
pub use event_log::{canonical_event_log, replay_hash};
pub use scenario::{battle_state_from_scenario, load_scenario, validate_scenario};
