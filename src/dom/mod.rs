//! Host document abstraction
//!
//! The presence controller and lifecycle coordinator only talk to the page
//! through [`HostDocument`]. In the browser that is [`web::WebDocument`];
//! natively and in tests it is [`memory::MemoryDocument`], which lets a test
//! play the hostile host (evict nodes, replace `<body>`, deliver mutations).

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

use crate::compat::{InlineTarget, Matcher};
use crate::style::OverlayMarkup;

/// Mutation callback: counts of direct children added and removed since the
/// previous delivery
pub type MutationCallback = Box<dyn FnMut(usize, usize)>;

/// Color-scheme callback: `true` when the page now prefers dark
pub type SchemeCallback = Box<dyn FnMut(bool)>;

/// How much of the tree an observation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchScope {
    /// Direct child additions/removals of the target only
    Children,
    /// Child-list changes anywhere under the target
    Subtree,
}

/// An armed observation. `disarm` is idempotent and implementations also
/// disarm on drop.
pub trait Subscription {
    fn disarm(&mut self);
}

/// Operations the overlay needs from the page it decorates
pub trait HostDocument {
    /// Element handle; equality is node identity
    type Node: Clone + PartialEq;
    type Watch: Subscription;

    /// `<html>`
    fn document_root(&self) -> Option<Self::Node>;

    /// `<body>`, where the overlay is appended
    fn attachment_point(&self) -> Option<Self::Node>;

    /// `<head>`, or the document root while there is no head yet
    fn style_container(&self) -> Option<Self::Node>;

    /// Detached overlay element tree
    fn create_overlay(&self, markup: &OverlayMarkup) -> Option<Self::Node>;

    /// Detached `<style id=..>` holding `css`
    fn create_stylesheet(&self, id: &str, css: &str) -> Option<Self::Node>;

    /// Append as last child; false if the host refused
    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> bool;

    /// Remove from its parent, if it has one
    fn detach(&self, node: &Self::Node);

    /// Inclusive descendant check
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;

    /// Whether anything in the document matches
    fn has_match(&self, matcher: &Matcher) -> bool;

    /// Force an inline transparent background on the target(s); returns how
    /// many elements were touched
    fn force_transparent(&self, target: &InlineTarget) -> usize;

    /// Arm a child-list observation on `target`
    fn observe(
        &self,
        target: &Self::Node,
        scope: WatchScope,
        callback: MutationCallback,
    ) -> Option<Self::Watch>;

    /// Current `prefers-color-scheme: dark`
    fn prefers_dark(&self) -> bool;

    /// Register for color-scheme changes for the life of the document
    fn on_color_scheme_change(&self, callback: SchemeCallback);

    /// URL of a packaged static asset, if the host can serve one
    fn asset_url(&self, path: &str) -> Option<String>;

    /// Whether `node` is currently part of the document
    fn is_connected(&self, node: &Self::Node) -> bool {
        self.document_root()
            .is_some_and(|root| self.contains(&root, node))
    }
}
