use crate::state::ParameterState;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serializes a snapshot for the storage round-trip.
pub fn state_to_json(state: &ParameterState) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(state)?)
}

/// Hydrates a snapshot; missing fields fall back to defaults.
pub fn state_from_json(value: serde_json::Value) -> Result<ParameterState> {
    Ok(serde_json::from_value(value)?)
}

pub fn save_state_to_file(state: &ParameterState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_state_from_file(path: &Path) -> Result<ParameterState> {
    let json = std::fs::read_to_string(path)?;
    let state: ParameterState = serde_json::from_str(&json)?;
    Ok(state)
}
