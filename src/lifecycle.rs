//! Startup sequencing and settings propagation
//!
//! `Start → WaitForAttachmentPoint → WaitForHostSettle → LoadSettings →
//! Apply → Steady`. Single-page apps render their shell late and then
//! hydrate, so the first insertion waits for a main-content marker (or a
//! bounded poll) instead of racing the framework. Once steady, store changes
//! and color-scheme changes re-enter Apply directly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::compat::Matcher;
use crate::consts::{FINAL_SETTLE_MS, INITIAL_SETTLE_MS, MARKER_POLL_ATTEMPTS, MARKER_POLL_MS};
use crate::dom::{HostDocument, Subscription, WatchScope};
use crate::persistence::{ConfigStore, settings_or_default};
use crate::platform::Scheduler;
use crate::presence::PresenceController;
use crate::settings::{Backdrop, Settings};
use crate::style::{BACKGROUND_IMAGE_PATH, ColorScheme, CompiledStyle, StyleContext, synthesize};

/// Elements that mean the host app has rendered its main content
pub const CONTENT_MARKERS: &[Matcher] = &[
    Matcher::Tag("main"),
    Matcher::AttrEquals {
        attr: "role",
        value: "main",
    },
    Matcher::Id("__next"),
    Matcher::Id("root"),
    Matcher::Id("app"),
    Matcher::Tag("app-root"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    WaitForAttachmentPoint,
    WaitForHostSettle,
    LoadSettings,
    Apply,
    Steady,
}

/// Settle timing in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub initial_settle_ms: u32,
    pub poll_interval_ms: u32,
    pub poll_attempts: u32,
    pub final_settle_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            initial_settle_ms: INITIAL_SETTLE_MS,
            poll_interval_ms: MARKER_POLL_MS,
            poll_attempts: MARKER_POLL_ATTEMPTS,
            final_settle_ms: FINAL_SETTLE_MS,
        }
    }
}

struct Lifecycle<D: HostDocument> {
    dom: Rc<D>,
    scheduler: Rc<dyn Scheduler>,
    store: Rc<dyn ConfigStore>,
    presence: PresenceController<D>,
    timing: Timing,
    phase: Phase,
    settings: Settings,
    /// One-shot root watch while waiting for `<body>`
    body_watch: Option<D::Watch>,
    subscribed: bool,
    torn_down: bool,
}

impl<D: HostDocument> Lifecycle<D> {
    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            log::debug!("Lifecycle {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn style_context(&self) -> StyleContext {
        let image_url = match self.settings.backdrop {
            Backdrop::Image => {
                let url = self.dom.asset_url(BACKGROUND_IMAGE_PATH);
                if url.is_none() {
                    log::warn!("Backdrop image unavailable, using procedural backdrop");
                }
                url
            }
            Backdrop::Procedural => None,
        };
        StyleContext {
            scheme: ColorScheme::from_prefers_dark(self.dom.prefers_dark()),
            image_url,
        }
    }
}

type Shared<D> = Rc<RefCell<Lifecycle<D>>>;

/// Drives one overlay through startup and settings changes
pub struct LifecycleCoordinator<D: HostDocument> {
    inner: Shared<D>,
}

impl<D: HostDocument> Clone for LifecycleCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: HostDocument + 'static> LifecycleCoordinator<D> {
    pub fn new(dom: Rc<D>, scheduler: Rc<dyn Scheduler>, store: Rc<dyn ConfigStore>) -> Self {
        Self::with_timing(dom, scheduler, store, Timing::default())
    }

    pub fn with_timing(
        dom: Rc<D>,
        scheduler: Rc<dyn Scheduler>,
        store: Rc<dyn ConfigStore>,
        timing: Timing,
    ) -> Self {
        let presence = PresenceController::new(dom.clone(), scheduler.clone());
        Self {
            inner: Rc::new(RefCell::new(Lifecycle {
                dom,
                scheduler,
                store,
                presence,
                timing,
                phase: Phase::Start,
                settings: Settings::default(),
                body_watch: None,
                subscribed: false,
                torn_down: false,
            })),
        }
    }

    /// Begin the startup sequence. Only the first call has any effect.
    pub fn start(&self) {
        let (dom, has_body) = {
            let mut lc = self.inner.borrow_mut();
            if lc.phase != Phase::Start || lc.torn_down {
                return;
            }
            log::info!("Aurora Dream starting");
            lc.set_phase(Phase::WaitForAttachmentPoint);
            (lc.dom.clone(), lc.dom.attachment_point().is_some())
        };
        if has_body {
            begin_settle(&self.inner);
            return;
        }

        let Some(root) = dom.document_root() else {
            log::warn!("No document root; skipping the wait for <body>");
            begin_settle(&self.inner);
            return;
        };
        let weak = Rc::downgrade(&self.inner);
        let dom_for_check = dom.clone();
        let watch = dom.observe(
            &root,
            WatchScope::Subtree,
            Box::new(move |_, _| {
                if dom_for_check.attachment_point().is_none() {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    on_body_ready(&inner);
                }
            }),
        );
        match watch {
            Some(watch) => self.inner.borrow_mut().body_watch = Some(watch),
            None => {
                log::warn!("Cannot observe the document; continuing without waiting for <body>");
                begin_settle(&self.inner);
            }
        }
    }

    /// Replace the current settings and re-apply them
    pub fn apply_settings(&self, settings: Settings) {
        self.inner.borrow_mut().settings = settings.normalized();
        apply(&self.inner);
    }

    /// Stop everything and remove the overlay. Further notifications are
    /// ignored.
    pub fn teardown(&self) {
        let (presence, watch) = {
            let mut lc = self.inner.borrow_mut();
            lc.torn_down = true;
            (lc.presence.clone(), lc.body_watch.take())
        };
        if let Some(mut watch) = watch {
            watch.disarm();
        }
        presence.remove();
        log::info!("Aurora Dream stopped");
    }

    pub fn phase(&self) -> Phase {
        self.inner.borrow().phase
    }

    pub fn settings(&self) -> Settings {
        self.inner.borrow().settings.clone()
    }

    pub fn presence(&self) -> PresenceController<D> {
        self.inner.borrow().presence.clone()
    }

    /// The stylesheet the current settings produce
    pub fn compiled_style(&self) -> CompiledStyle {
        let lc = self.inner.borrow();
        synthesize(&lc.settings, &lc.style_context())
    }
}

fn on_body_ready<D: HostDocument + 'static>(inner: &Shared<D>) {
    let watch = {
        let mut lc = inner.borrow_mut();
        if lc.phase != Phase::WaitForAttachmentPoint || lc.torn_down {
            return;
        }
        lc.body_watch.take()
    };
    if let Some(mut watch) = watch {
        watch.disarm();
    }
    log::debug!("Attachment point appeared");
    begin_settle(inner);
}

fn begin_settle<D: HostDocument + 'static>(inner: &Shared<D>) {
    let (scheduler, delay) = {
        let mut lc = inner.borrow_mut();
        lc.set_phase(Phase::WaitForHostSettle);
        (lc.scheduler.clone(), lc.timing.initial_settle_ms)
    };
    let weak = Rc::downgrade(inner);
    scheduler.after(delay, Box::new(move || poll_markers(&weak, 0)));
}

fn poll_markers<D: HostDocument + 'static>(weak: &Weak<RefCell<Lifecycle<D>>>, attempt: u32) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let (scheduler, delay, next) = {
        let lc = inner.borrow();
        if lc.torn_down {
            return;
        }
        let found = CONTENT_MARKERS.iter().any(|m| lc.dom.has_match(m));
        let timing = lc.timing;
        if found {
            log::debug!("Main content marker found after {} polls", attempt + 1);
            (lc.scheduler.clone(), timing.final_settle_ms, None)
        } else if attempt + 1 < timing.poll_attempts {
            (lc.scheduler.clone(), timing.poll_interval_ms, Some(attempt + 1))
        } else {
            log::debug!("No main content marker; proceeding anyway");
            (lc.scheduler.clone(), timing.final_settle_ms, None)
        }
    };

    let weak = weak.clone();
    match next {
        Some(attempt) => scheduler.after(delay, Box::new(move || poll_markers(&weak, attempt))),
        None => scheduler.after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    load_settings(&inner);
                }
            }),
        ),
    }
}

fn load_settings<D: HostDocument + 'static>(inner: &Shared<D>) {
    let store = {
        let mut lc = inner.borrow_mut();
        if lc.torn_down {
            return;
        }
        lc.set_phase(Phase::LoadSettings);
        lc.store.clone()
    };
    let weak = Rc::downgrade(inner);
    store.load(Box::new(move |result| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let settings = settings_or_default(result);
        inner.borrow_mut().settings = settings;
        apply(&inner);
        enter_steady(&inner);
    }));
}

/// Synthesize and hand the result to the presence controller
fn apply<D: HostDocument + 'static>(inner: &Shared<D>) {
    let (presence, style) = {
        let mut lc = inner.borrow_mut();
        if lc.torn_down {
            return;
        }
        if lc.phase == Phase::LoadSettings {
            lc.set_phase(Phase::Apply);
        }
        let style = lc
            .settings
            .enabled
            .then(|| synthesize(&lc.settings, &lc.style_context()));
        (lc.presence.clone(), style)
    };
    match style {
        Some(style) => presence.ensure_present(style),
        None => {
            log::info!("Aurora Dream disabled");
            presence.remove();
        }
    }
}

fn enter_steady<D: HostDocument + 'static>(inner: &Shared<D>) {
    let (dom, store) = {
        let mut lc = inner.borrow_mut();
        lc.set_phase(Phase::Steady);
        if lc.subscribed || lc.torn_down {
            return;
        }
        lc.subscribed = true;
        (lc.dom.clone(), lc.store.clone())
    };
    log::info!("Aurora Dream ready");

    let weak = Rc::downgrade(inner);
    store.subscribe(Box::new(move |_old, new| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        // A cleared key means defaults
        let settings = new.map(|s| s.resolve()).unwrap_or_default();
        log::debug!("Settings changed (enabled: {})", settings.enabled);
        inner.borrow_mut().settings = settings;
        apply(&inner);
    }));

    let weak = Rc::downgrade(inner);
    dom.on_color_scheme_change(Box::new(move |prefers_dark| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.borrow().settings.enabled {
            return;
        }
        log::debug!("Color scheme changed (dark: {})", prefers_dark);
        apply(&inner);
    }));
}
