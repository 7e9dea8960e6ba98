//! RGBA color values used by the palette
//!
//! Colors are stored as CSS `rgba(...)` strings so the settings pages and the
//! stylesheet can use them verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Color parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("not an rgb()/rgba() color: {0:?}")]
    Syntax(String),
    #[error("channel out of range in {0:?}")]
    Range(String),
    #[error("not a #rrggbb hex color: {0:?}")]
    Hex(String),
}

/// An sRGB color with alpha in 0.0 - 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` (leading `#` optional) into an opaque color
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::Hex(hex.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| ColorError::Hex(hex.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, 1.0))
    }

    /// `#rrggbb` for color picker inputs (alpha dropped)
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Take the RGB part of `other`, keep this color's alpha
    pub fn with_rgb_of(&self, other: &Rgba) -> Self {
        Self::new(other.r, other.g, other.b, self.a)
    }
}

impl FromStr for Rgba {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("rgba(")
            .or_else(|| trimmed.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ColorError::Syntax(s.to_string()))?;

        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(ColorError::Syntax(s.to_string()));
        }

        let mut rgb = [0u8; 3];
        for (slot, part) in rgb.iter_mut().zip(&parts) {
            let value: u32 = part.parse().map_err(|_| ColorError::Syntax(s.to_string()))?;
            *slot = u8::try_from(value).map_err(|_| ColorError::Range(s.to_string()))?;
        }

        let a = match parts.get(3) {
            Some(part) => {
                let a: f32 = part.parse().map_err(|_| ColorError::Syntax(s.to_string()))?;
                if !(0.0..=1.0).contains(&a) {
                    return Err(ColorError::Range(s.to_string()));
                }
                a
            }
            None => 1.0,
        };

        Ok(Self::new(rgb[0], rgb[1], rgb[2], a))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f32 Display already gives the shortest form (0.1, not 0.10000000149)
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

impl TryFrom<String> for Rgba {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgba() {
        let c: Rgba = "rgba(138, 43, 226, 0.15)".parse().unwrap();
        assert_eq!((c.r, c.g, c.b), (138, 43, 226));
        assert!((c.a - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_rgb_defaults_alpha() {
        let c: Rgba = "rgb(1,2,3)".parse().unwrap();
        assert_eq!(c, Rgba::new(1, 2, 3, 1.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("hsl(1, 2%, 3%)".parse::<Rgba>(), Err(ColorError::Syntax(_))));
        assert!(matches!("rgba(300, 0, 0, 0.5)".parse::<Rgba>(), Err(ColorError::Range(_))));
        assert!(matches!("rgba(0, 0, 0, 1.5)".parse::<Rgba>(), Err(ColorError::Range(_))));
        assert!(matches!("rgba(0, 0)".parse::<Rgba>(), Err(ColorError::Syntax(_))));
    }

    #[test]
    fn test_display_is_css() {
        assert_eq!(Rgba::new(50, 205, 50, 0.1).to_string(), "rgba(50, 205, 50, 0.1)");
        assert_eq!(Rgba::new(0, 0, 0, 1.0).to_string(), "rgba(0, 0, 0, 1)");
    }

    #[test]
    fn test_hex_conversions() {
        let c = Rgba::from_hex("#ff69b4").unwrap();
        assert_eq!(c, Rgba::new(255, 105, 180, 1.0));
        assert_eq!(c.to_hex(), "#ff69b4");
        assert_eq!(Rgba::from_hex("00cED1").unwrap().to_hex(), "#00ced1");
        assert!(Rgba::from_hex("#abc").is_err());
        assert!(Rgba::from_hex("#gg0000").is_err());
    }

    #[test]
    fn test_picker_keeps_alpha() {
        let stored: Rgba = "rgba(138, 43, 226, 0.15)".parse().unwrap();
        let picked = Rgba::from_hex("#00ff00").unwrap();
        assert_eq!(stored.with_rgb_of(&picked).to_string(), "rgba(0, 255, 0, 0.15)");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Rgba::new(1, 2, 3, 0.5)).unwrap();
        assert_eq!(json, "\"rgba(1, 2, 3, 0.5)\"");
        let back: Rgba = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgba::new(1, 2, 3, 0.5));
        assert!(serde_json::from_str::<Rgba>("\"blue\"").is_err());
    }
}
