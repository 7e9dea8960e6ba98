//! Overlay presence controller
//!
//! Keeps exactly one overlay element and one synthesized stylesheet attached
//! to a document whose own scripts keep rewriting it.
//!
//! - Insertion appends the overlay as the *last* child of `<body>`. If there
//!   is no body yet it retries on animation frames, up to
//!   [`MAX_INSERT_ATTEMPTS`], then gives up for the cycle without error.
//! - After each insertion a child-list watch is armed on `<body>`, and another
//!   on `<html>` so a wholesale `<body>` swap is seen too. Any direct child
//!   mutation of either re-checks that the overlay is still inside the
//!   current body and re-inserts immediately if not. An abandoned cycle keeps
//!   the `<html>` watch, so the body appearing later restarts insertion.
//! - Each insertion cycle also installs the host compatibility overrides.
//!
//! Re-insertion is not rate limited: a host that evicts the overlay on every
//! mutation gets one re-insertion per mutation delivery.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::compat::{OVERRIDE_STYLESHEET_ID, inline_targets, override_css};
use crate::consts::MAX_INSERT_ATTEMPTS;
use crate::dom::{HostDocument, MutationCallback, Subscription, WatchScope};
use crate::platform::Scheduler;
use crate::style::{CompiledStyle, STYLESHEET_ID, overlay_markup};

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceStats {
    /// Successful overlay insertions
    pub insertions: u32,
    /// Insertions triggered by the watchdog
    pub repairs: u32,
    /// Retry loops that hit the ceiling
    pub abandoned: u32,
    /// Stylesheet replacements on an already attached overlay
    pub restyles: u32,
}

struct Presence<D: HostDocument> {
    dom: Rc<D>,
    scheduler: Rc<dyn Scheduler>,
    overlay: Option<D::Node>,
    stylesheet: Option<D::Node>,
    overrides: Option<D::Node>,
    /// Child-list watch on `<body>`
    watch: Option<D::Watch>,
    /// Child-list watch on `<html>`
    root_watch: Option<D::Watch>,
    /// Style to show; None once removed
    style: Option<CompiledStyle>,
    /// Text of the attached stylesheet
    applied_css: Option<String>,
    retry_pending: bool,
    /// Bumped by `remove()`; retries from an older epoch are dropped
    epoch: u64,
    stats: PresenceStats,
}

impl<D: HostDocument> Presence<D> {
    fn overlay_attached(&self) -> bool {
        match (&self.overlay, self.dom.attachment_point()) {
            (Some(overlay), Some(body)) => self.dom.contains(&body, overlay),
            _ => false,
        }
    }

    fn connected(&self, node: &Option<D::Node>) -> bool {
        node.as_ref().is_some_and(|n| self.dom.is_connected(n))
    }

    /// Replace the stylesheet unless the attached one already has this text
    fn refresh_stylesheet(&mut self) -> bool {
        let Some(style) = &self.style else {
            return false;
        };
        let css = style.css();
        if self.connected(&self.stylesheet) && self.applied_css.as_deref() == Some(css) {
            return false;
        }

        // Old sheet goes first so two never coexist
        if let Some(old) = self.stylesheet.take() {
            self.dom.detach(&old);
        }
        self.applied_css = None;

        let Some(container) = self.dom.style_container() else {
            log::debug!("No style container yet");
            return false;
        };
        let Some(sheet) = self.dom.create_stylesheet(STYLESHEET_ID, css) else {
            log::warn!("Could not create stylesheet");
            return false;
        };
        if !self.dom.append_child(&container, &sheet) {
            return false;
        }
        self.stylesheet = Some(sheet);
        self.applied_css = Some(css.to_string());
        true
    }

    fn install_overrides(&mut self) {
        if self.connected(&self.overrides) {
            return;
        }
        if let Some(stale) = self.overrides.take() {
            self.dom.detach(&stale);
        }
        let Some(container) = self.dom.style_container() else {
            return;
        };
        let Some(sheet) = self.dom.create_stylesheet(OVERRIDE_STYLESHEET_ID, &override_css())
        else {
            return;
        };
        if self.dom.append_child(&container, &sheet) {
            self.overrides = Some(sheet);
        }
    }

    fn neutralize_host(&self) {
        let touched: usize = inline_targets()
            .iter()
            .map(|target| self.dom.force_transparent(target))
            .sum();
        if touched > 0 {
            log::debug!("Cleared inline backgrounds on {} host elements", touched);
        }
    }

    /// Append a fresh overlay to `body`; true on success
    fn insert_into(&mut self, body: &D::Node) -> bool {
        // Stylesheet first so the overlay never paints unstyled
        self.refresh_stylesheet();
        self.install_overrides();

        // A stale handle may still sit somewhere else in the document
        if let Some(old) = self.overlay.take() {
            self.dom.detach(&old);
        }
        let Some(overlay) = self.dom.create_overlay(&overlay_markup()) else {
            log::warn!("Could not create overlay element");
            return false;
        };
        if !self.dom.append_child(body, &overlay) {
            return false;
        }
        self.overlay = Some(overlay);
        self.neutralize_host();
        self.stats.insertions += 1;
        true
    }
}

/// Owner of the overlay's attachment state. Cloning shares the same state.
pub struct PresenceController<D: HostDocument> {
    inner: Rc<RefCell<Presence<D>>>,
}

impl<D: HostDocument> Clone for PresenceController<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: HostDocument + 'static> PresenceController<D> {
    pub fn new(dom: Rc<D>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Presence {
                dom,
                scheduler,
                overlay: None,
                stylesheet: None,
                overrides: None,
                watch: None,
                root_watch: None,
                style: None,
                applied_css: None,
                retry_pending: false,
                epoch: 0,
                stats: PresenceStats::default(),
            })),
        }
    }

    /// Make sure one overlay and one stylesheet showing `style` are attached,
    /// now or once the body exists. An attached overlay is kept and only its
    /// stylesheet refreshed.
    pub fn ensure_present(&self, style: CompiledStyle) {
        let epoch = {
            let mut p = self.inner.borrow_mut();
            p.style = Some(style);
            if p.overlay_attached() {
                if p.refresh_stylesheet() {
                    p.stats.restyles += 1;
                }
                p.install_overrides();
                return;
            }
            if p.retry_pending {
                // The loop in flight inserts with the newest style
                return;
            }
            p.epoch
        };
        try_insert(&self.inner, 0, epoch);
    }

    /// Disarm the watch and detach everything. Safe to call repeatedly.
    pub fn remove(&self) {
        let mut p = self.inner.borrow_mut();
        p.epoch += 1;
        p.retry_pending = false;
        p.style = None;
        p.applied_css = None;
        for mut watch in [p.watch.take(), p.root_watch.take()].into_iter().flatten() {
            watch.disarm();
        }
        let dom = p.dom.clone();
        for node in [p.overlay.take(), p.stylesheet.take(), p.overrides.take()]
            .into_iter()
            .flatten()
        {
            dom.detach(&node);
        }
    }

    /// Overlay is inside the current body
    pub fn is_attached(&self) -> bool {
        self.inner.borrow().overlay_attached()
    }

    /// The body watch is armed
    pub fn is_watching(&self) -> bool {
        self.inner.borrow().watch.is_some()
    }

    /// The document-root watch is armed
    pub fn is_watching_root(&self) -> bool {
        self.inner.borrow().root_watch.is_some()
    }

    /// Handle of the overlay currently believed attached
    pub fn overlay(&self) -> Option<D::Node> {
        self.inner.borrow().overlay.clone()
    }

    pub fn stats(&self) -> PresenceStats {
        self.inner.borrow().stats
    }
}

type Shared<D> = Rc<RefCell<Presence<D>>>;

/// One step of the insertion loop
fn try_insert<D: HostDocument + 'static>(inner: &Shared<D>, attempt: u32, epoch: u64) {
    let mut p = inner.borrow_mut();
    if p.epoch != epoch || p.style.is_none() {
        log::debug!("Dropping insertion retry from a removed cycle");
        return;
    }
    p.retry_pending = false;

    if p.overlay_attached() {
        p.refresh_stylesheet();
        return;
    }

    match p.dom.attachment_point() {
        Some(body) => {
            if !p.insert_into(&body) {
                return;
            }
            log::debug!("Overlay attached after {} deferred attempts", attempt);
            drop(p);
            arm_watches(inner, Some(&body));
        }
        None if attempt + 1 >= MAX_INSERT_ATTEMPTS => {
            p.stats.abandoned += 1;
            log::debug!(
                "No attachment point after {} attempts; waiting for the next mutation",
                MAX_INSERT_ATTEMPTS
            );
            drop(p);
            arm_watches(inner, None);
        }
        None => {
            p.retry_pending = true;
            let scheduler = p.scheduler.clone();
            drop(p);
            let weak = Rc::downgrade(inner);
            let scheduled = scheduler.next_frame(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    try_insert(&inner, attempt + 1, epoch);
                }
            }));
            if !scheduled {
                let mut p = inner.borrow_mut();
                p.retry_pending = false;
                p.stats.abandoned += 1;
                drop(p);
                log::debug!("Could not schedule an insertion retry; waiting for a mutation");
                arm_watches(inner, None);
            }
        }
    }
}

/// Re-arm the child-list watches on `<html>` and, when given, `body`,
/// replacing the previous ones
fn arm_watches<D: HostDocument + 'static>(inner: &Shared<D>, body: Option<&D::Node>) {
    let dom = inner.borrow().dom.clone();

    let watch = body.and_then(|body| {
        let watch = dom.observe(body, WatchScope::Children, watchdog(inner));
        if watch.is_none() {
            log::warn!("Could not watch the attachment point; overlay will not self-repair");
        }
        watch
    });
    let root_watch = dom
        .document_root()
        .and_then(|root| dom.observe(&root, WatchScope::Children, watchdog(inner)));

    let mut p = inner.borrow_mut();
    for mut old in [p.watch.take(), p.root_watch.take()].into_iter().flatten() {
        old.disarm();
    }
    p.watch = watch;
    p.root_watch = root_watch;
}

fn watchdog<D: HostDocument + 'static>(inner: &Shared<D>) -> MutationCallback {
    let weak: Weak<RefCell<Presence<D>>> = Rc::downgrade(inner);
    Box::new(move |added, removed| {
        if let Some(inner) = weak.upgrade() {
            on_mutation(&inner, added, removed);
        }
    })
}

fn on_mutation<D: HostDocument + 'static>(inner: &Shared<D>, added: usize, removed: usize) {
    let epoch = {
        let mut p = inner.borrow_mut();
        if p.style.is_none() || p.retry_pending || p.overlay_attached() {
            return;
        }
        p.stats.repairs += 1;
        log::debug!("Overlay missing (+{}/-{} children), re-inserting", added, removed);
        p.epoch
    };
    try_insert(inner, 0, epoch);
}
