//! Messages exchanged between the viewer UI and the host tool.
//!
//! Both sides speak JSON objects tagged by `type`. The UI sends requests
//! (`get-selection-svg`, storage, media embedding) and the host answers with
//! responses or `notify` messages that surface as transient notices.

pub mod host;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::state::{serialization, ParameterState};

/// Storage key the UI persists its parameter snapshot under.
pub const STATE_STORAGE_KEY: &str = "cache";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed data URL: {0}")]
    DataUrl(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid state snapshot: {0}")]
    Snapshot(#[from] serialization::SerializationError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PluginMessage {
    GetSelectionSvg,
    SelectionSvg {
        svg: String,
        #[serde(
            rename = "geometryScale",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        geometry_scale: Option<f32>,
    },
    NoSelection,
    InvalidSelection,
    SaveStorage {
        key: String,
        value: serde_json::Value,
    },
    LoadStorage {
        key: String,
    },
    StorageLoaded {
        key: String,
        #[serde(default)]
        value: serde_json::Value,
    },
    AddImage {
        image: String,
    },
    AddVideo {
        video: String,
        image: String,
    },
    Notify {
        message: String,
    },
}

impl PluginMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Messages the UI sends to the host.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            PluginMessage::GetSelectionSvg
                | PluginMessage::SaveStorage { .. }
                | PluginMessage::LoadStorage { .. }
                | PluginMessage::AddImage { .. }
                | PluginMessage::AddVideo { .. }
        )
    }

    pub fn save_state(state: &ParameterState) -> Result<Self> {
        Ok(PluginMessage::SaveStorage {
            key: STATE_STORAGE_KEY.to_string(),
            value: serialization::state_to_json(state)?,
        })
    }

    /// The hydrated state carried by a `storage-loaded` answer for the state
    /// key. `None` for any other message or when nothing was stored.
    pub fn loaded_state(&self) -> Option<Result<ParameterState>> {
        match self {
            PluginMessage::StorageLoaded { key, value }
                if key == STATE_STORAGE_KEY && !value.is_null() =>
            {
                Some(serialization::state_from_json(value.clone()).map_err(ProtocolError::from))
            }
            _ => None,
        }
    }
}

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn decode_data_url(url: &str) -> Result<DataUrl> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ProtocolError::DataUrl("missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProtocolError::DataUrl("missing payload separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ProtocolError::DataUrl(format!("not base64 encoded ({header})")))?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok(DataUrl {
        mime: mime.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_are_kebab_case() {
        let message = PluginMessage::from_json(r#"{"type":"get-selection-svg"}"#).unwrap();
        assert_eq!(message, PluginMessage::GetSelectionSvg);
        assert!(message.is_request());

        let text = PluginMessage::NoSelection.to_json().unwrap();
        assert_eq!(text, r#"{"type":"no-selection"}"#);
    }

    #[test]
    fn selection_scale_is_optional() {
        let message =
            PluginMessage::from_json(r#"{"type":"selection-svg","svg":"<svg/>"}"#).unwrap();
        assert_eq!(
            message,
            PluginMessage::SelectionSvg {
                svg: "<svg/>".into(),
                geometry_scale: None
            }
        );

        let scaled = PluginMessage::SelectionSvg {
            svg: "<svg/>".into(),
            geometry_scale: Some(2.0),
        };
        let value: serde_json::Value = serde_json::from_str(&scaled.to_json().unwrap()).unwrap();
        assert_eq!(value["geometryScale"], json!(2.0));
        assert!(!scaled.is_request());
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            PluginMessage::from_json(r#"{"type":"add-3d-hologram"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(PluginMessage::from_json("not json").is_err());
    }

    #[test]
    fn state_snapshot_through_storage_messages() {
        let mut state = ParameterState::default();
        state.extrusion.depth = 42.0;
        let PluginMessage::SaveStorage { key, value } = PluginMessage::save_state(&state).unwrap()
        else {
            panic!("expected save-storage");
        };
        assert_eq!(key, STATE_STORAGE_KEY);

        let loaded = PluginMessage::StorageLoaded { key, value };
        let restored = loaded.loaded_state().unwrap().unwrap();
        assert_eq!(restored.extrusion.depth, 42.0);

        let empty = PluginMessage::from_json(r#"{"type":"storage-loaded","key":"cache"}"#).unwrap();
        assert!(empty.loaded_state().is_none());
    }

    #[test]
    fn data_url_decoding() {
        let url = encode_data_url("image/png", &[1, 2, 3, 250]);
        assert!(url.starts_with("data:image/png;base64,"));
        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded.mime, "image/png");
        assert_eq!(decoded.bytes, vec![1, 2, 3, 250]);
    }

    #[test]
    fn bad_data_urls() {
        assert!(matches!(
            decode_data_url("image/png;base64,AAAA"),
            Err(ProtocolError::DataUrl(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png,AAAA"),
            Err(ProtocolError::DataUrl(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(ProtocolError::Base64(_))
        ));
    }
}
