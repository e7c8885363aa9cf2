use serde::{Deserialize, Serialize};

/// The rule a synchronized playlist is derived from: three ordered lists of playlist ids.
///
/// It is never stored anywhere but inside the cover image of the playlist it governs,
/// as the JSON text produced by [`SynchronizationDefinition::encode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizationDefinition {
    #[serde(rename = "included_playlist_ids")]
    pub included: Vec<String>,
    #[serde(rename = "excluded_playlist_ids")]
    pub excluded: Vec<String>,
    #[serde(rename = "required_playlist_ids")]
    pub required: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("no synchronization definition found")]
    NotFound,
    #[error("synchronization definition is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode synchronization definition: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SynchronizationDefinition {
    pub fn new(included: Vec<String>, excluded: Vec<String>, required: Vec<String>) -> Self {
        Self {
            included,
            excluded,
            required,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DefinitionError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a payload read back from a cover. An empty payload counts as missing,
    /// anything else that is not a complete definition is corrupt.
    pub fn decode(payload: &[u8]) -> Result<Self, DefinitionError> {
        let text = std::str::from_utf8(payload)
            .map_err(|error| DefinitionError::Corrupt(error.to_string()))?
            .trim();
        if text.is_empty() {
            return Err(DefinitionError::NotFound);
        }
        serde_json::from_str(text).map_err(|error| DefinitionError::Corrupt(error.to_string()))
    }
}
