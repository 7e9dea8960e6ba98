//! Browser document via `web-sys`

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    Document, Element, HtmlElement, MediaQueryListEvent, MutationObserver, MutationObserverInit,
    MutationRecord, Window,
};

use super::{HostDocument, MutationCallback, SchemeCallback, Subscription, WatchScope};
use crate::compat::{InlineTarget, Matcher};
use crate::style::{OVERLAY_ID, OverlayMarkup};

const DARK_QUERY: &str = "(prefers-color-scheme: dark)";

#[wasm_bindgen(inline_js = "
    export function runtime_url(path) {
        try {
            return chrome.runtime.getURL(path);
        } catch (e) {
            return undefined;
        }
    }
")]
extern "C" {
    fn runtime_url(path: &str) -> Option<String>;
}

pub struct WebDocument {
    window: Window,
    document: Document,
}

impl WebDocument {
    pub fn new() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self { window, document })
    }

    fn make_transparent(element: &Element) -> bool {
        let Some(element) = element.dyn_ref::<HtmlElement>() else {
            return false;
        };
        element
            .style()
            .set_property_with_priority("background", "transparent", "important")
            .is_ok()
    }
}

/// `MutationObserver` handle. The callback is owned by the JS function the
/// observer holds, so disconnecting (even from inside the callback) is safe.
pub struct WebWatch {
    observer: Option<MutationObserver>,
}

impl Subscription for WebWatch {
    fn disarm(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}

impl Drop for WebWatch {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl HostDocument for WebDocument {
    type Node = Element;
    type Watch = WebWatch;

    fn document_root(&self) -> Option<Element> {
        self.document.document_element()
    }

    fn attachment_point(&self) -> Option<Element> {
        self.document.body().map(Element::from)
    }

    fn style_container(&self) -> Option<Element> {
        self.document
            .head()
            .map(Element::from)
            .or_else(|| self.document.document_element())
    }

    fn create_overlay(&self, markup: &OverlayMarkup) -> Option<Element> {
        let container = self.document.create_element("div").ok()?;
        container.set_id(markup.id);
        container.set_class_name(markup.class);
        for class in &markup.children {
            let child = self.document.create_element("div").ok()?;
            child.set_class_name(class);
            container.append_child(&child).ok()?;
        }
        Some(container)
    }

    fn create_stylesheet(&self, id: &str, css: &str) -> Option<Element> {
        let sheet = self.document.create_element("style").ok()?;
        sheet.set_id(id);
        sheet.set_text_content(Some(css));
        Some(sheet)
    }

    fn append_child(&self, parent: &Element, child: &Element) -> bool {
        match parent.append_child(child) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("appendChild refused: {:?}", e);
                false
            }
        }
    }

    fn detach(&self, node: &Element) {
        node.remove();
    }

    fn contains(&self, ancestor: &Element, node: &Element) -> bool {
        let node: &web_sys::Node = node;
        ancestor.contains(Some(node))
    }

    fn has_match(&self, matcher: &Matcher) -> bool {
        self.document
            .query_selector(&matcher.selector())
            .ok()
            .flatten()
            .is_some()
    }

    fn force_transparent(&self, target: &InlineTarget) -> usize {
        match target {
            InlineTarget::FirstContentWrapper => self
                .document
                .body()
                .and_then(|body| body.first_element_child())
                .filter(|el| el.id() != OVERLAY_ID)
                .map_or(0, |el| usize::from(Self::make_transparent(&el))),
            InlineTarget::Matching(matcher) => {
                let Ok(list) = self.document.query_selector_all(&matcher.selector()) else {
                    return 0;
                };
                (0..list.length())
                    .filter_map(|i| list.get(i))
                    .filter_map(|node| node.dyn_into::<Element>().ok())
                    .filter(|el| el.id() != OVERLAY_ID)
                    .filter(|el| Self::make_transparent(el))
                    .count()
            }
        }
    }

    fn observe(
        &self,
        target: &Element,
        scope: WatchScope,
        mut callback: MutationCallback,
    ) -> Option<WebWatch> {
        let handler = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                let (mut added, mut removed) = (0, 0);
                for record in records.iter() {
                    if let Ok(record) = record.dyn_into::<MutationRecord>() {
                        added += record.added_nodes().length() as usize;
                        removed += record.removed_nodes().length() as usize;
                    }
                }
                callback(added, removed);
            },
        )
        .into_js_value();

        let observer = MutationObserver::new(handler.unchecked_ref()).ok()?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(scope == WatchScope::Subtree);
        if let Err(e) = observer.observe_with_options(target, &init) {
            log::warn!("MutationObserver.observe failed: {:?}", e);
            return None;
        }
        Some(WebWatch {
            observer: Some(observer),
        })
    }

    fn prefers_dark(&self) -> bool {
        self.window
            .match_media(DARK_QUERY)
            .ok()
            .flatten()
            .is_some_and(|query| query.matches())
    }

    fn on_color_scheme_change(&self, mut callback: SchemeCallback) {
        let Some(query) = self.window.match_media(DARK_QUERY).ok().flatten() else {
            return;
        };
        let closure = Closure::<dyn FnMut(_)>::new(move |event: MediaQueryListEvent| {
            callback(event.matches());
        });
        let _ = query.add_event_listener_with_callback("change", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn asset_url(&self, path: &str) -> Option<String> {
        runtime_url(path)
    }
}
