//! Settings-page helpers
//!
//! The popup and options pages never talk to the content script. They write
//! the store and every open tab picks the change up through its store
//! subscription.

use std::rc::Rc;

use thiserror::Error;

use crate::color::{ColorError, Rgba};
use crate::persistence::{ConfigStore, SaveCallback, settings_or_default};
use crate::settings::{Preset, Settings};

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
    #[error("invalid settings JSON: {0}")]
    InvalidSettings(#[from] serde_json::Error),
}

/// Load the current record, apply `preset` (which also enables the overlay)
/// and save it back
pub fn save_preset(store: &Rc<dyn ConfigStore>, preset: Preset, done: SaveCallback) {
    let writer = store.clone();
    store.load(Box::new(move |result| {
        let mut settings = settings_or_default(result);
        settings.apply_preset(preset);
        log::info!("Applying preset {}", preset.as_str());
        writer.save(&settings, done);
    }));
}

/// [`save_preset`] by name
pub fn save_preset_named(
    store: &Rc<dyn ConfigStore>,
    name: &str,
    done: SaveCallback,
) -> Result<(), SurfaceError> {
    let preset =
        Preset::from_str(name).ok_or_else(|| SurfaceError::UnknownPreset(name.to_string()))?;
    save_preset(store, preset, done);
    Ok(())
}

/// Save a full or partial settings record from the options page. Missing
/// fields take their defaults.
pub fn save_settings_json(
    store: &dyn ConfigStore,
    json: &str,
    done: SaveCallback,
) -> Result<Settings, SurfaceError> {
    let settings = Settings::from_json(json)?;
    store.save(&settings, done);
    Ok(settings)
}

/// Alpha for a picked color when the field's current value is unreadable
pub const DEFAULT_PICKER_ALPHA: f32 = 0.15;

/// `#rrggbb` for a color picker showing a stored `rgba(...)` value
pub fn picker_hex(value: &str) -> Result<String, ColorError> {
    Ok(value.parse::<Rgba>()?.to_hex())
}

/// New palette value after the picker chose `hex`: RGB from the picker,
/// alpha from the current value
pub fn apply_picker_hex(current: &str, hex: &str) -> Result<String, ColorError> {
    let picked = Rgba::from_hex(hex)?;
    let base = current
        .parse::<Rgba>()
        .unwrap_or(Rgba::new(0, 0, 0, DEFAULT_PICKER_ALPHA));
    Ok(base.with_rgb_of(&picked).to_string())
}

#[cfg(target_arch = "wasm32")]
mod exports {
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;

    use crate::persistence::ConfigStore;
    use crate::persistence::chrome::ChromeStore;

    fn report(result: Result<(), crate::persistence::StoreError>) {
        if let Err(e) = result {
            log::warn!("Saving settings failed: {e}");
        }
    }

    /// Popup quick presets
    #[wasm_bindgen]
    pub fn apply_preset(name: &str) -> Result<(), JsValue> {
        let store: Rc<dyn ConfigStore> = Rc::new(ChromeStore::new());
        super::save_preset_named(&store, name, Box::new(report))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Options page "save"
    #[wasm_bindgen]
    pub fn save_settings(json: &str) -> Result<(), JsValue> {
        super::save_settings_json(&ChromeStore::new(), json, Box::new(report))
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Options page: stored color to picker value
    #[wasm_bindgen]
    pub fn color_to_hex(value: &str) -> Result<String, JsValue> {
        super::picker_hex(value).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Options page: picker value merged into the stored color
    #[wasm_bindgen]
    pub fn color_from_hex(current: &str, hex: &str) -> Result<String, JsValue> {
        super::apply_picker_hex(current, hex).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDocument;
    use crate::lifecycle::LifecycleCoordinator;
    use crate::persistence::MemoryStore;
    use crate::persistence::memory::load_now;
    use crate::platform::ManualScheduler;
    use crate::style::STYLESHEET_ID;
    use std::cell::Cell;

    fn stored(store: &MemoryStore) -> Settings {
        match load_now(store) {
            Some(Ok(Some(s))) => s.resolve(),
            _ => panic!("nothing stored"),
        }
    }

    fn ok_flag() -> (Rc<Cell<bool>>, SaveCallback) {
        let flag = Rc::new(Cell::new(false));
        let sink = flag.clone();
        (flag, Box::new(move |r| sink.set(r.is_ok())))
    }

    #[test]
    fn test_preset_keeps_other_fields_and_enables() {
        let memory = Rc::new(MemoryStore::with_json(
            r#"{"enabled":false,"starsEnabled":true,"motionIntensity":40}"#,
        ));
        let store: Rc<dyn ConfigStore> = memory.clone();
        let (saved, done) = ok_flag();
        save_preset(&store, Preset::Subtle, done);
        assert!(saved.get());

        let s = stored(&memory);
        assert!(s.enabled);
        assert!(s.stars_enabled);
        assert_eq!(s.motion_intensity, 40.0);
        assert_eq!(s.animation_speed, 0.5);
        assert_eq!(s.blur_radius, 160.0);
        assert_eq!(s.opacity, 50.0);
    }

    #[test]
    fn test_unknown_preset_writes_nothing() {
        let memory = Rc::new(MemoryStore::new());
        let store: Rc<dyn ConfigStore> = memory.clone();
        let err = save_preset_named(&store, "psychedelic", Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, SurfaceError::UnknownPreset(_)));
        assert_eq!(memory.raw_json(), None);
    }

    #[test]
    fn test_save_settings_json_normalizes() {
        let store = MemoryStore::new();
        let (saved, done) = ok_flag();
        let json = r#"{"opacity":400,"animationSpeed":-1}"#;
        let settings = save_settings_json(&store, json, done).unwrap();
        assert!(saved.get());
        assert_eq!(settings.opacity, 100.0);
        assert_eq!(stored(&store), settings);

        assert!(matches!(
            save_settings_json(&store, "{oops", Box::new(|_| {})),
            Err(SurfaceError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_picker_hex_from_stored_color() {
        assert_eq!(picker_hex("rgba(138, 43, 226, 0.15)").unwrap(), "#8a2be2");
        assert_eq!(picker_hex("rgb(0, 206, 209)").unwrap(), "#00ced1");
        assert!(matches!(picker_hex("teal"), Err(ColorError::Syntax(_))));
    }

    #[test]
    fn test_picked_hex_keeps_alpha() {
        assert_eq!(
            apply_picker_hex("rgba(138, 43, 226, 0.15)", "#00ff00").unwrap(),
            "rgba(0, 255, 0, 0.15)"
        );
        assert_eq!(
            apply_picker_hex("rgba(1, 2, 3, 0.5)", "ff0000").unwrap(),
            "rgba(255, 0, 0, 0.5)"
        );
        // Unreadable current value falls back to the default alpha
        assert_eq!(apply_picker_hex("", "#0000ff").unwrap(), "rgba(0, 0, 255, 0.15)");
        assert!(matches!(
            apply_picker_hex("rgba(1, 2, 3, 0.5)", "#12"),
            Err(ColorError::Hex(_))
        ));
    }

    #[test]
    fn test_unavailable_store_reports_failure() {
        let memory = Rc::new(MemoryStore::new());
        memory.set_unavailable(true);
        let store: Rc<dyn ConfigStore> = memory.clone();
        let failed = Rc::new(Cell::new(false));
        let sink = failed.clone();
        save_preset(&store, Preset::Vibrant, Box::new(move |r| sink.set(r.is_err())));
        assert!(failed.get());
    }

    #[test]
    fn test_preset_reaches_running_overlay() {
        let dom = Rc::new(MemoryDocument::with_skeleton());
        let scheduler = Rc::new(ManualScheduler::new());
        let memory = Rc::new(MemoryStore::with_json(r#"{"enabled":false}"#));
        let store: Rc<dyn ConfigStore> = memory.clone();
        let coordinator = LifecycleCoordinator::new(dom.clone(), scheduler.clone(), store.clone());
        coordinator.start();
        scheduler.run_until_idle(100);
        assert!(dom.find_by_id(STYLESHEET_ID).is_empty());

        save_preset(&store, Preset::Intense, Box::new(|_| {}));
        let sheets = dom.find_by_id(STYLESHEET_ID);
        assert_eq!(sheets.len(), 1);
        // 30s blob at speed 2.5
        assert!(dom.text(sheets[0]).contains("aurora-drift-1 12s"));
        assert_eq!(coordinator.settings().blur_radius, 80.0);
    }
}
