//! Overlay settings and quick-panel presets
//!
//! Persisted as JSON under a single store key. The record written by the
//! settings pages may be partial or come from an older version, so it is read
//! as [`StoredSettings`] and resolved over the compiled-in defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::Rgba;

/// Number of palette slots (`color1` ..= `color8`)
pub const COLOR_SLOTS: usize = 8;

/// Lowest animation speed accepted; keeps `base / speed` finite
pub const MIN_ANIMATION_SPEED: f64 = 0.1;
pub const MAX_ANIMATION_SPEED: f64 = 10.0;

/// Palette slot name for a 1-based index
pub fn slot_name(index: usize) -> String {
    format!("color{index}")
}

/// 1-based slot index for a palette key, None for unknown keys
pub fn slot_index(name: &str) -> Option<usize> {
    let index: usize = name.strip_prefix("color")?.parse().ok()?;
    (1..=COLOR_SLOTS).contains(&index).then_some(index)
}

/// Quick-panel presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Subtle,
    #[default]
    Normal,
    Vibrant,
    Intense,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Subtle, Preset::Normal, Preset::Vibrant, Preset::Intense];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Subtle => "subtle",
            Preset::Normal => "normal",
            Preset::Vibrant => "vibrant",
            Preset::Intense => "intense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "subtle" => Some(Preset::Subtle),
            "normal" => Some(Preset::Normal),
            "vibrant" => Some(Preset::Vibrant),
            "intense" => Some(Preset::Intense),
            _ => None,
        }
    }

    /// Animation speed multiplier
    pub fn animation_speed(&self) -> f64 {
        match self {
            Preset::Subtle => 0.5,
            Preset::Normal => 1.0,
            Preset::Vibrant => 1.5,
            Preset::Intense => 2.5,
        }
    }

    /// Blob blur radius in px
    pub fn blur_radius(&self) -> f64 {
        match self {
            Preset::Subtle => 160.0,
            Preset::Normal => 120.0,
            Preset::Vibrant => 100.0,
            Preset::Intense => 80.0,
        }
    }

    /// Overlay opacity (0 - 100)
    pub fn opacity(&self) -> f64 {
        match self {
            Preset::Subtle => 50.0,
            _ => 100.0,
        }
    }
}

/// What paints the overlay container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backdrop {
    /// Animated radial-gradient blobs
    #[default]
    Procedural,
    /// Packaged raster image in place of the gradients
    Image,
}

/// Overlay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Master switch
    pub enabled: bool,
    /// Animation speed multiplier (1.0 = nominal durations)
    pub animation_speed: f64,
    /// Blob blur radius in px
    #[serde(rename = "blur")]
    pub blur_radius: f64,
    /// Overlay opacity (0 - 100)
    pub opacity: f64,
    /// Keyframe displacement scale (100 = reference)
    pub motion_intensity: f64,
    /// Star field layer
    pub stars_enabled: bool,
    /// Palette, keyed `color1` ..= `color8`
    pub colors: BTreeMap<String, Rgba>,
    pub backdrop: Backdrop,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            animation_speed: 1.0,
            blur_radius: 120.0,
            opacity: 100.0,
            motion_intensity: 100.0,
            stars_enabled: false,
            colors: default_colors(),
            backdrop: Backdrop::Procedural,
        }
    }
}

/// Compiled-in palette: purple, teal, pink, green, deep purple
pub fn default_colors() -> BTreeMap<String, Rgba> {
    [
        Rgba::new(138, 43, 226, 0.15),
        Rgba::new(0, 206, 209, 0.12),
        Rgba::new(255, 105, 180, 0.18),
        Rgba::new(50, 205, 50, 0.10),
        Rgba::new(147, 51, 234, 0.14),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, color)| (slot_name(i + 1), color))
    .collect()
}

impl Settings {
    /// Store key shared by the content script and both settings pages
    pub const STORAGE_KEY: &'static str = "auroraConfig";

    /// Defaults with a preset applied
    pub fn from_preset(preset: Preset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    /// Apply a quick-panel preset; presets always switch the overlay on
    pub fn apply_preset(&mut self, preset: Preset) {
        self.animation_speed = preset.animation_speed();
        self.blur_radius = preset.blur_radius();
        self.opacity = preset.opacity();
        self.enabled = true;
    }

    /// Clamp every numeric field into its documented range
    pub fn normalized(mut self) -> Self {
        self.animation_speed = if self.animation_speed.is_finite() {
            self.animation_speed.clamp(MIN_ANIMATION_SPEED, MAX_ANIMATION_SPEED)
        } else {
            1.0
        };
        self.blur_radius = non_negative(self.blur_radius, 120.0);
        self.opacity = non_negative(self.opacity, 100.0).min(100.0);
        self.motion_intensity = non_negative(self.motion_intensity, 100.0);
        self.colors.retain(|slot, _| slot_index(slot).is_some());
        self
    }

    /// Opacity as a CSS fraction
    pub fn opacity_fraction(&self) -> f64 {
        self.opacity / 100.0
    }

    /// Keyframe displacement multiplier
    pub fn motion_scale(&self) -> f64 {
        self.motion_intensity / 100.0
    }

    /// Parse a stored JSON record, merging it over defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let stored: StoredSettings = serde_json::from_str(json)?;
        Ok(stored.resolve())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn non_negative(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { fallback }
}

/// A settings record as found in the store; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub enabled: Option<bool>,
    pub animation_speed: Option<f64>,
    #[serde(rename = "blur")]
    pub blur_radius: Option<f64>,
    pub opacity: Option<f64>,
    pub motion_intensity: Option<f64>,
    pub stars_enabled: Option<bool>,
    pub colors: Option<BTreeMap<String, String>>,
    pub backdrop: Option<Backdrop>,
}

impl StoredSettings {
    /// Shallow merge over defaults; `colors` merges slot by slot and drops
    /// unknown slots or unparseable colors
    pub fn resolve(self) -> Settings {
        let defaults = Settings::default();
        let mut colors = defaults.colors.clone();
        for (slot, value) in self.colors.unwrap_or_default() {
            if slot_index(&slot).is_none() {
                log::warn!("Ignoring unknown palette slot {slot:?}");
                continue;
            }
            match value.parse::<Rgba>() {
                Ok(color) => {
                    colors.insert(slot, color);
                }
                Err(e) => log::warn!("Keeping default for {slot}: {e}"),
            }
        }

        Settings {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            animation_speed: self.animation_speed.unwrap_or(defaults.animation_speed),
            blur_radius: self.blur_radius.unwrap_or(defaults.blur_radius),
            opacity: self.opacity.unwrap_or(defaults.opacity),
            motion_intensity: self.motion_intensity.unwrap_or(defaults.motion_intensity),
            stars_enabled: self.stars_enabled.unwrap_or(defaults.stars_enabled),
            colors,
            backdrop: self.backdrop.unwrap_or(defaults.backdrop),
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_palette_has_five_slots() {
        let settings = Settings::default();
        let keys: Vec<&str> = settings.colors.keys().map(String::as_str).collect();
        assert_eq!(keys, ["color1", "color2", "color3", "color4", "color5"]);
        assert_eq!(settings.colors["color4"].to_string(), "rgba(50, 205, 50, 0.1)");
    }

    #[test]
    fn test_slot_index() {
        assert_eq!(slot_index("color1"), Some(1));
        assert_eq!(slot_index("color8"), Some(8));
        assert_eq!(slot_index("color9"), None);
        assert_eq!(slot_index("color0"), None);
        assert_eq!(slot_index("accent"), None);
    }

    #[test]
    fn test_empty_record_resolves_to_defaults() {
        assert_eq!(Settings::from_json("{}").unwrap(), Settings::default());
    }

    #[test]
    fn test_shallow_merge_keeps_unset_fields() {
        let settings = Settings::from_json(r#"{"enabled":false,"animationSpeed":2.0}"#).unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.animation_speed, 2.0);
        assert_eq!(settings.blur_radius, 120.0);
        assert_eq!(settings.opacity, 100.0);
        assert_eq!(settings.colors, default_colors());
    }

    #[test]
    fn test_colors_merge_key_by_key() {
        let json = r#"{"colors":{"color2":"rgba(1, 2, 3, 0.5)","color7":"rgb(9, 9, 9)","bogus":"rgb(0,0,0)","color3":"pink"}}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.colors["color1"], default_colors()["color1"]);
        assert_eq!(settings.colors["color2"], Rgba::new(1, 2, 3, 0.5));
        assert_eq!(settings.colors["color3"], default_colors()["color3"]);
        assert_eq!(settings.colors["color7"], Rgba::new(9, 9, 9, 1.0));
        assert!(!settings.colors.contains_key("bogus"));
        assert_eq!(settings.colors.len(), 6);
    }

    #[test]
    fn test_legacy_record_shape_loads() {
        // Records written by the quick panel carry blur/opacity as integers
        let json = r#"{"enabled":true,"animationSpeed":1.5,"blur":100,"opacity":100,
            "colors":{"color1":"rgba(138, 43, 226, 0.15)"}}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.blur_radius, 100.0);
        assert_eq!(settings.animation_speed, 1.5);
        assert_eq!(settings.backdrop, Backdrop::Procedural);
    }

    #[test]
    fn test_normalize_clamps() {
        let settings = Settings {
            animation_speed: 0.0,
            blur_radius: -4.0,
            opacity: 250.0,
            motion_intensity: f64::NAN,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.animation_speed, MIN_ANIMATION_SPEED);
        assert_eq!(settings.blur_radius, 0.0);
        assert_eq!(settings.opacity, 100.0);
        assert_eq!(settings.motion_intensity, 100.0);
    }

    #[test]
    fn test_presets() {
        let subtle = Settings::from_preset(Preset::Subtle);
        assert_eq!(subtle.animation_speed, 0.5);
        assert_eq!(subtle.blur_radius, 160.0);
        assert_eq!(subtle.opacity, 50.0);

        let mut off = Settings {
            enabled: false,
            ..Default::default()
        };
        off.apply_preset(Preset::Intense);
        assert!(off.enabled);
        assert_eq!(off.animation_speed, 2.5);
        assert_eq!(off.blur_radius, 80.0);

        for preset in Preset::ALL {
            assert_eq!(Preset::from_str(preset.as_str()), Some(preset));
        }
        assert_eq!(Preset::from_str(" Vibrant "), Some(Preset::Vibrant));
        assert_eq!(Preset::from_str("loud"), None);
    }

    #[test]
    fn test_json_roundtrip_keeps_camel_case_keys() {
        let json = Settings::default().to_json().unwrap();
        assert!(json.contains("\"animationSpeed\":1.0"));
        assert!(json.contains("\"blur\":120.0"));
        assert!(json.contains("\"starsEnabled\":false"));
        assert_eq!(Settings::from_json(&json).unwrap(), Settings::default());
    }

    proptest! {
        #[test]
        fn prop_resolved_settings_are_in_range(
            speed in proptest::num::f64::ANY,
            blur in proptest::num::f64::ANY,
            opacity in proptest::num::f64::ANY,
            motion in proptest::num::f64::ANY,
        ) {
            let settings = StoredSettings {
                animation_speed: Some(speed),
                blur_radius: Some(blur),
                opacity: Some(opacity),
                motion_intensity: Some(motion),
                ..Default::default()
            }
            .resolve();
            prop_assert!(settings.animation_speed >= MIN_ANIMATION_SPEED);
            prop_assert!(settings.animation_speed <= MAX_ANIMATION_SPEED);
            prop_assert!(settings.blur_radius >= 0.0 && settings.blur_radius.is_finite());
            prop_assert!((0.0..=100.0).contains(&settings.opacity));
            prop_assert!(settings.motion_intensity >= 0.0 && settings.motion_intensity.is_finite());
        }

        #[test]
        fn prop_set_fields_override_defaults(enabled in any::<bool>(), stars in any::<bool>()) {
            let settings = StoredSettings {
                enabled: Some(enabled),
                stars_enabled: Some(stars),
                ..Default::default()
            }
            .resolve();
            prop_assert_eq!(settings.enabled, enabled);
            prop_assert_eq!(settings.stars_enabled, stars);
            prop_assert_eq!(settings.colors, default_colors());
        }
    }
}
