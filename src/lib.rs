//! Aurora Dream - animated aurora backdrop for single-page web apps
//!
//! Core modules:
//! - `presence`: Keeps one overlay and its stylesheet attached to a hostile document
//! - `lifecycle`: Startup sequencing and settings propagation
//! - `style`: Deterministic settings to CSS synthesis
//! - `compat`: Versioned host compatibility overrides
//! - `settings`: Settings data, presets, stored-record merging
//! - `persistence`: Settings store contract and adapters
//! - `dom`: Host document contract and adapters
//! - `platform`: Frame and timer scheduling
//! - `surface`: Helpers for the popup and options pages

pub mod color;
pub mod compat;
pub mod dom;
pub mod lifecycle;
pub mod persistence;
pub mod platform;
pub mod presence;
pub mod settings;
pub mod style;
pub mod surface;

pub use color::Rgba;
pub use lifecycle::{LifecycleCoordinator, Phase};
pub use presence::PresenceController;
pub use settings::{Backdrop, Preset, Settings};
pub use style::{CompiledStyle, StyleContext, synthesize};

/// Timing and retry constants
pub mod consts {
    /// Animation-frame attempts to find `<body>` before an insertion cycle
    /// is abandoned
    pub const MAX_INSERT_ATTEMPTS: u32 = 50;

    /// Wait after `<body>` appears before looking for app content
    pub const INITIAL_SETTLE_MS: u32 = 500;
    /// Interval between main-content marker checks
    pub const MARKER_POLL_MS: u32 = 250;
    /// Marker checks before proceeding without one
    pub const MARKER_POLL_ATTEMPTS: u32 = 20;
    /// Wait after the marker (or the last check) before the first insertion
    pub const FINAL_SETTLE_MS: u32 = 300;
}
