//! Settings persistence
//!
//! The store is shared by the content script and both settings pages. It
//! holds one JSON record under [`Settings::STORAGE_KEY`] and notifies every
//! surface when it changes. Callers treat any failure as "use defaults".

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod chrome;

pub use memory::MemoryStore;

use thiserror::Error;

use crate::settings::{Settings, StoredSettings};

/// Store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing permission, quota, or no extension context
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode settings: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("stored settings are malformed: {0}")]
    Deserialize(#[source] serde_json::Error),
}

pub type LoadResult = Result<Option<StoredSettings>, StoreError>;
pub type LoadCallback = Box<dyn FnOnce(LoadResult)>;
pub type SaveCallback = Box<dyn FnOnce(Result<(), StoreError>)>;
/// `(old, new)`; either side is None when the key was absent or unreadable
pub type ChangeCallback = Box<dyn FnMut(Option<StoredSettings>, Option<StoredSettings>)>;

/// Key-value settings store with change notification
pub trait ConfigStore {
    /// Read the record; `Ok(None)` when nothing was ever saved
    fn load(&self, done: LoadCallback);

    /// Replace the record
    fn save(&self, settings: &Settings, done: SaveCallback);

    /// Register for changes made by any surface, for the life of the page
    fn subscribe(&self, on_change: ChangeCallback);
}

/// Decode a stored JSON record
pub fn decode(json: &str) -> Result<StoredSettings, StoreError> {
    serde_json::from_str(json).map_err(StoreError::Deserialize)
}

/// Encode settings for storage
pub fn encode(settings: &Settings) -> Result<String, StoreError> {
    settings.to_json().map_err(StoreError::Serialize)
}

/// Resolve a load result, falling back to defaults on any failure
pub fn settings_or_default(result: LoadResult) -> Settings {
    match result {
        Ok(Some(stored)) => stored.resolve(),
        Ok(None) => {
            log::info!("No saved settings, using defaults");
            Settings::default()
        }
        Err(e) => {
            log::warn!("{e}; using default settings");
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_typed() {
        assert!(matches!(decode("{"), Err(StoreError::Deserialize(_))));
        assert!(matches!(decode(r#"{"opacity":"loud"}"#), Err(StoreError::Deserialize(_))));
        assert_eq!(decode("{}").unwrap(), StoredSettings::default());
    }

    #[test]
    fn test_failures_fall_back_to_defaults() {
        let unavailable = Err(StoreError::Unavailable("no chrome.storage".into()));
        assert_eq!(settings_or_default(unavailable), Settings::default());
        assert_eq!(settings_or_default(Ok(None)), Settings::default());

        let stored = StoredSettings {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(!settings_or_default(Ok(Some(stored))).enabled);
    }

    #[test]
    fn test_encode_decode() {
        let settings = Settings {
            stars_enabled: true,
            ..Default::default()
        };
        let stored = decode(&encode(&settings).unwrap()).unwrap();
        assert_eq!(stored.resolve(), settings);
    }
}
