//! Stylesheet synthesis
//!
//! Pure `Settings -> CSS`. The same settings and context always produce
//! byte-identical text, so the presence controller can decide whether a
//! stylesheet needs replacing by comparing strings.
//!
//! Blob geometry is fixed; only colors, timing, blur, opacity and motion are
//! parameterized. Durations are `base / animation_speed`; callers must keep
//! the speed away from zero (see [`Settings::normalized`]).

mod stars;

pub use stars::{STAR_COUNT, star_shadows};

use crate::settings::{Backdrop, COLOR_SLOTS, Settings, slot_index};

/// Overlay container element id
pub const OVERLAY_ID: &str = "aurora-bg";
/// Overlay container class (all rules hang off this)
pub const OVERLAY_CLASS: &str = "aurora-dream-container";
/// Synthesized stylesheet element id
pub const STYLESHEET_ID: &str = "aurora-dream-styles";
/// Star layer child class
pub const STAR_LAYER_CLASS: &str = "aurora-stars";
/// Stacking index for the container; far below any host layer
pub const OVERLAY_Z_INDEX: i32 = -9999;

/// Packaged raster backdrop
pub const BACKGROUND_IMAGE_PATH: &str = "aurora-bg.jpg";

const HUE_SHIFT_SECONDS: f64 = 60.0;
const TWINKLE_SECONDS: f64 = 4.0;

/// Document color-scheme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorScheme {
    #[default]
    Dark,
    Light,
}

impl ColorScheme {
    pub fn from_prefers_dark(prefers_dark: bool) -> Self {
        if prefers_dark { Self::Dark } else { Self::Light }
    }

    /// Container base color under the blobs
    pub fn base_background(&self) -> &'static str {
        match self {
            ColorScheme::Dark => "#0a0e1a",
            ColorScheme::Light => "#1a1e2a",
        }
    }
}

/// Document-derived inputs to synthesis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleContext {
    pub scheme: ColorScheme,
    /// Resolved URL of [`BACKGROUND_IMAGE_PATH`], if the host can serve it
    pub image_url: Option<String>,
}

/// Stylesheet text ready for injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyle {
    css: String,
}

impl CompiledStyle {
    pub fn css(&self) -> &str {
        &self.css
    }
}

impl From<String> for CompiledStyle {
    fn from(css: String) -> Self {
        Self { css }
    }
}

/// Element structure the stylesheet targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMarkup {
    pub id: &'static str,
    pub class: &'static str,
    /// Class attribute of each child, in document order
    pub children: Vec<String>,
}

/// One blob per palette slot plus the star layer. Unstyled children render
/// nothing, so the markup never changes with settings.
pub fn overlay_markup() -> OverlayMarkup {
    let children = (1..=COLOR_SLOTS)
        .map(|i| format!("aurora-blob aurora-blob-{i}"))
        .chain(std::iter::once(STAR_LAYER_CLASS.to_string()))
        .collect();
    OverlayMarkup {
        id: OVERLAY_ID,
        class: OVERLAY_CLASS,
        children,
    }
}

struct Keyframe {
    at: &'static str,
    dx: f64,
    dy: f64,
    scale: f64,
    rotate: f64,
    opacity: f64,
}

const fn kf(at: &'static str, dx: f64, dy: f64, scale: f64, rotate: f64, opacity: f64) -> Keyframe {
    Keyframe {
        at,
        dx,
        dy,
        scale,
        rotate,
        opacity,
    }
}

const REST: Keyframe = kf("0%, 100%", 0.0, 0.0, 1.0, 0.0, 1.0);

struct Blob {
    size: u32,
    anchor: [(&'static str, &'static str); 2],
    /// Anchored by its center instead of its corner
    centered: bool,
    duration: f64,
    delay: f64,
    keyframes: &'static [Keyframe],
}

const BLOBS: [Blob; COLOR_SLOTS] = [
    Blob {
        size: 600,
        anchor: [("top", "-10%"), ("left", "-5%")],
        centered: false,
        duration: 30.0,
        delay: 0.0,
        keyframes: &[
            REST,
            kf("25%", 100.0, 50.0, 1.1, 0.0, 0.8),
            kf("50%", 200.0, -30.0, 0.95, 0.0, 1.0),
            kf("75%", 50.0, 80.0, 1.05, 0.0, 0.9),
        ],
    },
    Blob {
        size: 700,
        anchor: [("top", "20%"), ("right", "-10%")],
        centered: false,
        duration: 35.0,
        delay: -5.0,
        keyframes: &[
            REST,
            kf("33%", -120.0, 100.0, 1.15, 0.0, 0.85),
            kf("66%", -80.0, -60.0, 0.9, 0.0, 1.0),
        ],
    },
    Blob {
        size: 550,
        anchor: [("bottom", "10%"), ("left", "15%")],
        centered: false,
        duration: 40.0,
        delay: -10.0,
        keyframes: &[
            REST,
            kf("30%", 150.0, -80.0, 1.2, 5.0, 0.9),
            kf("60%", -100.0, 50.0, 0.85, -5.0, 0.95),
        ],
    },
    Blob {
        size: 650,
        anchor: [("bottom", "-5%"), ("right", "20%")],
        centered: false,
        duration: 28.0,
        delay: -15.0,
        keyframes: &[
            REST,
            kf("40%", -150.0, -100.0, 1.1, 0.0, 0.8),
            kf("80%", 100.0, 60.0, 0.95, 0.0, 1.0),
        ],
    },
    Blob {
        size: 800,
        anchor: [("top", "40%"), ("left", "50%")],
        centered: true,
        duration: 45.0,
        delay: -20.0,
        keyframes: &[
            REST,
            kf("20%", 80.0, 100.0, 1.15, 0.0, 0.85),
            kf("40%", -100.0, -80.0, 0.9, 0.0, 0.95),
            kf("60%", 120.0, -50.0, 1.1, 0.0, 0.9),
            kf("80%", -60.0, 80.0, 0.95, 0.0, 1.0),
        ],
    },
    Blob {
        size: 500,
        anchor: [("top", "55%"), ("left", "-8%")],
        centered: false,
        duration: 32.0,
        delay: -8.0,
        keyframes: &[
            REST,
            kf("35%", 90.0, -70.0, 1.1, 0.0, 0.85),
            kf("70%", 140.0, 40.0, 0.9, 0.0, 1.0),
        ],
    },
    Blob {
        size: 600,
        anchor: [("top", "-15%"), ("right", "25%")],
        centered: false,
        duration: 38.0,
        delay: -12.0,
        keyframes: &[
            REST,
            kf("25%", -90.0, 60.0, 1.05, 3.0, 0.9),
            kf("75%", 60.0, 110.0, 0.92, -3.0, 1.0),
        ],
    },
    Blob {
        size: 450,
        anchor: [("bottom", "-12%"), ("left", "45%")],
        centered: false,
        duration: 42.0,
        delay: -18.0,
        keyframes: &[REST, kf("50%", -130.0, -90.0, 1.12, 0.0, 0.85)],
    },
];

/// CSS number: at most 3 decimals, no trailing zeros, no `-0`
fn num(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

/// Render the stylesheet for `settings`
pub fn synthesize(settings: &Settings, ctx: &StyleContext) -> CompiledStyle {
    let speed = settings.animation_speed;
    let motion = settings.motion_scale();
    let base = ctx.scheme.base_background();

    let image = match (settings.backdrop, &ctx.image_url) {
        (Backdrop::Image, Some(url)) => Some(url.replace('"', "%22")),
        _ => None,
    };
    let background = match &image {
        Some(url) => format!("{base} url(\"{url}\") center / cover no-repeat"),
        None => base.to_string(),
    };

    let mut css = String::with_capacity(8 * 1024);
    css.push_str(&format!(
        "/* Aurora Dream: container */
.{OVERLAY_CLASS} {{
  position: fixed !important;
  inset: 0 !important;
  width: 100vw !important;
  height: 100vh !important;
  z-index: {OVERLAY_Z_INDEX} !important;
  pointer-events: none !important;
  overflow: hidden !important;
  background: {background} !important;
  opacity: {opacity} !important;
  will-change: transform !important;
  transform: translate3d(0, 0, 0) !important;
}}
",
        opacity = num(settings.opacity_fraction()),
    ));

    if image.is_none() {
        css.push_str(&format!(
            ".{OVERLAY_CLASS} .aurora-blob {{
  position: absolute !important;
  border-radius: 50% !important;
  filter: blur({blur}px) !important;
  opacity: 1 !important;
  will-change: transform, opacity !important;
  mix-blend-mode: screen !important;
}}
",
            blur = num(settings.blur_radius),
        ));

        for (slot, color) in &settings.colors {
            let Some(index) = slot_index(slot) else {
                continue;
            };
            push_blob(&mut css, index, &BLOBS[index - 1], &color.to_string(), speed, motion);
        }
    }

    css.push_str(&format!(
        ".{OVERLAY_CLASS}::after {{
  content: '' !important;
  position: absolute !important;
  inset: 0 !important;
  background: linear-gradient(135deg, rgba(138, 43, 226, 0.03) 0%, transparent 50%, rgba(0, 206, 209, 0.03) 100%) !important;
  animation: aurora-hue-shift {duration}s linear infinite !important;
  pointer-events: none !important;
}}
@keyframes aurora-hue-shift {{
  0%, 100% {{ filter: hue-rotate(0deg); }}
  50% {{ filter: hue-rotate(15deg); }}
}}
",
        duration = num(HUE_SHIFT_SECONDS / speed),
    ));

    if settings.stars_enabled {
        css.push_str(&format!(
            "/* Aurora Dream: star field */
.{OVERLAY_CLASS} .{STAR_LAYER_CLASS} {{
  position: absolute !important;
  top: 0 !important;
  left: 0 !important;
  width: 2px !important;
  height: 2px !important;
  border-radius: 50% !important;
  background: transparent !important;
  box-shadow: {shadows} !important;
  animation: aurora-twinkle {duration}s ease-in-out infinite alternate !important;
}}
@keyframes aurora-twinkle {{
  0% {{ opacity: 0.4; }}
  100% {{ opacity: 1; }}
}}
",
            shadows = star_shadows(),
            duration = num(TWINKLE_SECONDS / speed),
        ));
    }

    CompiledStyle { css }
}

fn push_blob(css: &mut String, index: usize, blob: &Blob, color: &str, speed: f64, motion: f64) {
    let anchor: String = blob
        .anchor
        .iter()
        .map(|(side, offset)| format!("  {side}: {offset} !important;\n"))
        .collect();
    let delay = if blob.delay == 0.0 {
        String::new()
    } else {
        format!("  animation-delay: {}s !important;\n", num(blob.delay / speed))
    };
    let centering = if blob.centered {
        "  transform: translate(-50%, -50%) !important;\n"
    } else {
        ""
    };

    css.push_str(&format!(
        ".{OVERLAY_CLASS} .aurora-blob-{index} {{
  width: {size}px !important;
  height: {size}px !important;
  background: radial-gradient(circle, {color} 0%, transparent 70%) !important;
{anchor}{centering}  animation: aurora-drift-{index} {duration}s ease-in-out infinite !important;
{delay}}}
@keyframes aurora-drift-{index} {{
",
        size = blob.size,
        duration = num(blob.duration / speed),
    ));

    // Declarations inside @keyframes cannot be !important
    let prefix = if blob.centered { "translate(-50%, -50%) " } else { "" };
    for frame in blob.keyframes {
        let rotate = if frame.rotate == 0.0 {
            String::new()
        } else {
            format!(" rotate({}deg)", num(frame.rotate))
        };
        css.push_str(&format!(
            "  {at} {{ transform: {prefix}translate({dx}px, {dy}px) scale({scale}){rotate}; opacity: {opacity}; }}\n",
            at = frame.at,
            dx = num(frame.dx * motion),
            dy = num(frame.dy * motion),
            scale = num(frame.scale),
            opacity = num(frame.opacity),
        ));
    }
    css.push_str("}\n");
}
