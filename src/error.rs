//! Error types for the reducer and for scenario/content-pack loading.

use thiserror::Error;

/// Raised by the reducer when a command's preconditions are not met.
///
/// The driver converts every `ReductionError` into a `command_error` event
/// and halts the run; it never retries or rolls back partial state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReductionError {
    #[error("actor {actor} is not the active unit ({active})")]
    NotActiveUnit { actor: String, active: String },

    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("unit is not alive: {0}")]
    UnitNotAlive(String),

    #[error("actor {0} has no actions remaining")]
    NoActionsRemaining(String),

    #[error("destination ({x},{y}) is not reachable")]
    IllegalMove { x: i64, y: i64 },

    #[error("no line of effect from {from} to {to}")]
    NoLineOfEffect { from: String, to: String },

    #[error("unsupported mode for {command}: {mode}")]
    UnsupportedMode { command: String, mode: String },

    #[error("unit id already exists: {0}")]
    DuplicateUnitId(String),

    #[error("no open tile available to place unit")]
    NoOpenTile,

    #[error("invalid spawn position ({x},{y})")]
    InvalidSpawnPosition { x: i64, y: i64 },

    #[error("hazard source not found: hazard_id={hazard_id} source_type={source_type} source_name={source_name}")]
    HazardSourceNotFound {
        hazard_id: String,
        source_type: String,
        source_name: String,
    },

    #[error("invalid target policy: {0}")]
    InvalidTargetPolicy(String),

    #[error("unknown content entry: {0}")]
    UnknownContentEntry(String),

    #[error("content entry {entry_id} is not a {expected} template (found {found})")]
    ContentEntryTypeMismatch {
        entry_id: String,
        expected: String,
        found: String,
    },

    #[error("unsupported command type: {0}")]
    UnsupportedCommand(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Raised while loading or validating scenario, content-pack, or effect-model
/// JSON. These are static/validation errors: synchronous, abort the run, and
/// produce a nonzero CLI exit code.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("scenario validation failed: {0}")]
    Validation(String),

    #[error("content pack validation failed: {0}")]
    ContentPackValidation(String),

    #[error("content pack resolution failed: {0}")]
    ContentPackResolution(String),

    #[error("effect model error: {0}")]
    EffectModel(String),
}

impl ScenarioError {
    pub fn validation(message: impl Into<String>) -> Self {
        ScenarioError::Validation(message.into())
    }
}
