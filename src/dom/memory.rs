//! In-memory document
//!
//! A small element tree with DOM-like mutation observation. Mutations are
//! queued and only delivered by [`MemoryDocument::flush_mutations`], the way a
//! browser delivers `MutationObserver` records after the current task, so
//! observer callbacks never run inside a tree operation.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{HostDocument, MutationCallback, SchemeCallback, Subscription, WatchScope};
use crate::compat::{InlineTarget, Matcher};
use crate::style::{OVERLAY_ID, OverlayMarkup};

/// Element handle (index into the arena; detached nodes stay allocated)
pub type NodeId = usize;

/// Upper bound on delivery rounds per flush, so a host that evicts on every
/// mutation cannot spin a test forever
pub const MAX_FLUSH_ROUNDS: usize = 64;

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    inline_background: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Observer {
    target: NodeId,
    scope: WatchScope,
    /// First record sequence number this observer may see
    since: u64,
    callback: Rc<RefCell<MutationCallback>>,
    armed: Rc<Cell<bool>>,
}

#[derive(Debug, Clone, Copy)]
struct MutationRecord {
    seq: u64,
    target: NodeId,
    added: usize,
    removed: usize,
}

struct DomState {
    nodes: Vec<NodeData>,
    root: NodeId,
    observers: Vec<Observer>,
    pending: Vec<MutationRecord>,
    next_seq: u64,
    prefers_dark: bool,
    scheme_listeners: Vec<Rc<RefCell<SchemeCallback>>>,
    asset_base: Option<String>,
    refuse_appends: bool,
}

impl DomState {
    fn alloc(&mut self, tag: &str) -> NodeId {
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            ..Default::default()
        });
        self.nodes.len() - 1
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn child_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].tag == tag)
    }

    fn unlink(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get(node).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent].children.retain(|&c| c != node);
        self.nodes[node].parent = None;
        self.record(parent, 0, 1);
    }

    fn record(&mut self, target: NodeId, added: usize, removed: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(MutationRecord {
            seq,
            target,
            added,
            removed,
        });
    }

    /// Returns false (like a DOM `HierarchyRequestError`) when `child` is
    /// `parent` or one of its ancestors
    fn link(&mut self, parent: NodeId, child: NodeId, first: bool) -> bool {
        if self.is_inclusive_ancestor(child, parent) {
            return false;
        }
        self.unlink(child);
        if first {
            self.nodes[parent].children.insert(0, child);
        } else {
            self.nodes[parent].children.push(child);
        }
        self.nodes[child].parent = Some(parent);
        self.record(parent, 1, 0);
        true
    }

    fn matches(&self, node: NodeId, matcher: &Matcher) -> bool {
        let data = &self.nodes[node];
        match matcher {
            Matcher::Tag(tag) => data.tag == *tag,
            Matcher::Id(id) => data.attrs.get("id").is_some_and(|v| v == id),
            Matcher::AttrEquals { attr, value } => {
                data.attrs.get(*attr).is_some_and(|v| v == value)
            }
            Matcher::AttrContains { attr, needle } => {
                data.attrs.get(*attr).is_some_and(|v| v.contains(needle))
            }
        }
    }

    /// Connected nodes in document order
    fn connected(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        out
    }

    fn observes(&self, observer: &Observer, record: &MutationRecord) -> bool {
        if record.seq < observer.since {
            return false;
        }
        match observer.scope {
            WatchScope::Children => observer.target == record.target,
            WatchScope::Subtree => self.is_inclusive_ancestor(observer.target, record.target),
        }
    }
}

/// In-memory [`HostDocument`]
pub struct MemoryDocument {
    state: RefCell<DomState>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// A document that is still loading: `<html>` only
    pub fn new() -> Self {
        let mut state = DomState {
            nodes: Vec::new(),
            root: 0,
            observers: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
            prefers_dark: true,
            scheme_listeners: Vec::new(),
            asset_base: None,
            refuse_appends: false,
        };
        state.root = state.alloc("html");
        Self {
            state: RefCell::new(state),
        }
    }

    /// `<html>` with `<head>` and an empty `<body>`
    pub fn with_skeleton() -> Self {
        let doc = Self::new();
        doc.add_head();
        doc.add_body();
        doc.take_pending();
        doc
    }

    pub fn root(&self) -> NodeId {
        self.state.borrow().root
    }

    pub fn head(&self) -> Option<NodeId> {
        let state = self.state.borrow();
        state.child_by_tag(state.root, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        let state = self.state.borrow();
        state.child_by_tag(state.root, "body")
    }

    pub fn add_head(&self) -> NodeId {
        let head = self.create_element("head");
        let root = self.root();
        self.prepend(root, head);
        head
    }

    pub fn add_body(&self) -> NodeId {
        let body = self.create_element("body");
        let root = self.root();
        self.append(root, body);
        body
    }

    /// Swap `<body>` for a fresh one, as a client-side navigation might
    pub fn replace_body(&self) -> NodeId {
        if let Some(old) = self.body() {
            self.remove(old);
        }
        self.add_body()
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.state.borrow_mut().alloc(tag)
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        self.state.borrow_mut().nodes[node]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.borrow().nodes[node].attrs.get(name).cloned()
    }

    /// Host-side append (last child). False if it would create a cycle.
    pub fn append(&self, parent: NodeId, child: NodeId) -> bool {
        self.state.borrow_mut().link(parent, child, false)
    }

    /// Host-side insert as first child
    pub fn prepend(&self, parent: NodeId, child: NodeId) -> bool {
        self.state.borrow_mut().link(parent, child, true)
    }

    /// Host-side removal
    pub fn remove(&self, node: NodeId) {
        self.state.borrow_mut().unlink(node);
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().nodes[node].parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state.borrow().nodes[node].children.clone()
    }

    pub fn text(&self, node: NodeId) -> String {
        self.state.borrow().nodes[node].text.clone()
    }

    pub fn inline_background(&self, node: NodeId) -> Option<String> {
        self.state.borrow().nodes[node].inline_background.clone()
    }

    /// Connected elements with this id
    pub fn find_by_id(&self, id: &str) -> Vec<NodeId> {
        let state = self.state.borrow();
        state
            .connected()
            .into_iter()
            .filter(|&n| state.nodes[n].attrs.get("id").is_some_and(|v| v == id))
            .collect()
    }

    /// Make every subsequent `append_child` through [`HostDocument`] fail
    pub fn set_refuse_appends(&self, refuse: bool) {
        self.state.borrow_mut().refuse_appends = refuse;
    }

    pub fn set_asset_base(&self, base: &str) {
        self.state.borrow_mut().asset_base = Some(base.trim_end_matches('/').to_string());
    }

    /// Change the color-scheme preference and notify listeners
    pub fn set_prefers_dark(&self, prefers_dark: bool) {
        let listeners = {
            let mut state = self.state.borrow_mut();
            if state.prefers_dark == prefers_dark {
                return;
            }
            state.prefers_dark = prefers_dark;
            state.scheme_listeners.clone()
        };
        for listener in listeners {
            (listener.borrow_mut())(prefers_dark);
        }
    }

    /// Observers that are still armed
    pub fn armed_observers(&self) -> usize {
        self.state
            .borrow()
            .observers
            .iter()
            .filter(|o| o.armed.get())
            .count()
    }

    pub fn pending_mutations(&self) -> usize {
        self.state.borrow().pending.len()
    }

    fn take_pending(&self) {
        self.state.borrow_mut().pending.clear();
    }

    /// Deliver queued mutation records to armed observers, repeating while
    /// callbacks cause further mutations. Returns the number of callback
    /// invocations.
    pub fn flush_mutations(&self) -> usize {
        let mut deliveries = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let batch: Vec<_> = {
                let mut state = self.state.borrow_mut();
                if state.pending.is_empty() {
                    break;
                }
                let records = std::mem::take(&mut state.pending);
                state.observers.retain(|o| o.armed.get());
                let state = &*state;
                state
                    .observers
                    .iter()
                    .filter_map(|o| {
                        let hits: Vec<&MutationRecord> =
                            records.iter().filter(|r| state.observes(o, r)).collect();
                        if hits.is_empty() {
                            return None;
                        }
                        let added = hits.iter().map(|r| r.added).sum::<usize>();
                        let removed = hits.iter().map(|r| r.removed).sum::<usize>();
                        Some((o.callback.clone(), o.armed.clone(), added, removed))
                    })
                    .collect()
            };
            for (callback, armed, added, removed) in batch {
                // An earlier callback in this round may have disarmed it
                if armed.get() {
                    (callback.borrow_mut())(added, removed);
                    deliveries += 1;
                }
            }
        }
        deliveries
    }
}

/// Armed observation on a [`MemoryDocument`]
pub struct MemoryWatch {
    armed: Rc<Cell<bool>>,
}

impl Subscription for MemoryWatch {
    fn disarm(&mut self) {
        self.armed.set(false);
    }
}

impl Drop for MemoryWatch {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl HostDocument for MemoryDocument {
    type Node = NodeId;
    type Watch = MemoryWatch;

    fn document_root(&self) -> Option<NodeId> {
        Some(self.root())
    }

    fn attachment_point(&self) -> Option<NodeId> {
        self.body()
    }

    fn style_container(&self) -> Option<NodeId> {
        self.head().or_else(|| Some(self.root()))
    }

    fn create_overlay(&self, markup: &OverlayMarkup) -> Option<NodeId> {
        let mut state = self.state.borrow_mut();
        let container = state.alloc("div");
        let attrs = &mut state.nodes[container].attrs;
        attrs.insert("id".into(), markup.id.into());
        attrs.insert("class".into(), markup.class.into());
        for class in &markup.children {
            let child = state.alloc("div");
            state.nodes[child].attrs.insert("class".into(), class.clone());
            state.nodes[child].parent = Some(container);
            state.nodes[container].children.push(child);
        }
        Some(container)
    }

    fn create_stylesheet(&self, id: &str, css: &str) -> Option<NodeId> {
        let mut state = self.state.borrow_mut();
        let sheet = state.alloc("style");
        state.nodes[sheet].attrs.insert("id".into(), id.into());
        state.nodes[sheet].text = css.to_string();
        Some(sheet)
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> bool {
        let mut state = self.state.borrow_mut();
        if state.refuse_appends {
            return false;
        }
        state.link(*parent, *child, false)
    }

    fn detach(&self, node: &NodeId) {
        self.remove(*node);
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        self.state.borrow().is_inclusive_ancestor(*ancestor, *node)
    }

    fn has_match(&self, matcher: &Matcher) -> bool {
        let state = self.state.borrow();
        state.connected().into_iter().any(|n| state.matches(n, matcher))
    }

    fn force_transparent(&self, target: &InlineTarget) -> usize {
        let mut state = self.state.borrow_mut();
        let targets: Vec<NodeId> = {
            let view: &DomState = &state;
            let is_overlay =
                |n: NodeId| view.nodes[n].attrs.get("id").is_some_and(|v| v == OVERLAY_ID);
            match target {
                InlineTarget::FirstContentWrapper => view
                    .child_by_tag(view.root, "body")
                    .and_then(|body| view.nodes[body].children.first().copied())
                    .filter(|&n| !is_overlay(n))
                    .into_iter()
                    .collect(),
                InlineTarget::Matching(matcher) => view
                    .connected()
                    .into_iter()
                    .filter(|&n| view.matches(n, matcher) && !is_overlay(n))
                    .collect(),
            }
        };
        for &node in &targets {
            state.nodes[node].inline_background = Some("transparent".to_string());
        }
        targets.len()
    }

    fn observe(
        &self,
        target: &NodeId,
        scope: WatchScope,
        callback: MutationCallback,
    ) -> Option<MemoryWatch> {
        let armed = Rc::new(Cell::new(true));
        let mut state = self.state.borrow_mut();
        let since = state.next_seq;
        state.observers.push(Observer {
            target: *target,
            scope,
            since,
            callback: Rc::new(RefCell::new(callback)),
            armed: armed.clone(),
        });
        Some(MemoryWatch { armed })
    }

    fn prefers_dark(&self) -> bool {
        self.state.borrow().prefers_dark
    }

    fn on_color_scheme_change(&self, callback: SchemeCallback) {
        self.state
            .borrow_mut()
            .scheme_listeners
            .push(Rc::new(RefCell::new(callback)));
    }

    fn asset_url(&self, path: &str) -> Option<String> {
        let state = self.state.borrow();
        state.asset_base.as_ref().map(|base| format!("{base}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<(usize, usize)>>, MutationCallback) {
        let seen = Rc::new(Cell::new((0, 0)));
        let sink = seen.clone();
        let callback: MutationCallback = Box::new(move |added, removed| {
            let (a, r) = sink.get();
            sink.set((a + added, r + removed));
        });
        (seen, callback)
    }

    #[test]
    fn test_skeleton() {
        let doc = MemoryDocument::with_skeleton();
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.pending_mutations(), 0);
        assert_eq!(doc.style_container(), doc.head());
    }

    #[test]
    fn test_style_container_falls_back_to_root() {
        let doc = MemoryDocument::new();
        assert_eq!(doc.style_container(), Some(doc.root()));
        assert_eq!(doc.attachment_point(), None);
    }

    #[test]
    fn test_children_watch_ignores_grandchildren() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        let (seen, callback) = counter();
        let _watch = doc.observe(&body, WatchScope::Children, callback).unwrap();

        let wrapper = doc.create_element("div");
        doc.append(body, wrapper);
        doc.flush_mutations();
        assert_eq!(seen.get(), (1, 0));

        let inner = doc.create_element("span");
        doc.append(wrapper, inner);
        assert_eq!(doc.flush_mutations(), 0);
        assert_eq!(seen.get(), (1, 0));
    }

    #[test]
    fn test_subtree_watch_sees_descendants() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let (seen, callback) = counter();
        let _watch = doc.observe(&root, WatchScope::Subtree, callback).unwrap();

        let body = doc.add_body();
        let div = doc.create_element("div");
        doc.append(body, div);
        assert_eq!(doc.flush_mutations(), 1);
        assert_eq!(seen.get(), (2, 0));
    }

    #[test]
    fn test_disarm_and_drop_stop_delivery() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        let (seen, callback) = counter();
        let mut watch = doc.observe(&body, WatchScope::Children, callback).unwrap();
        watch.disarm();
        watch.disarm();
        doc.append(body, doc.create_element("div"));
        assert_eq!(doc.flush_mutations(), 0);
        assert_eq!(seen.get(), (0, 0));

        let (_, callback) = counter();
        let watch = doc.observe(&body, WatchScope::Children, callback).unwrap();
        assert_eq!(doc.armed_observers(), 1);
        drop(watch);
        assert_eq!(doc.armed_observers(), 0);
    }

    #[test]
    fn test_contains_and_reparenting() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append(body, a);
        doc.append(a, b);
        assert!(doc.contains(&body, &b));
        assert!(doc.is_connected(&b));
        doc.remove(a);
        assert!(!doc.contains(&body, &b));
        assert!(!doc.is_connected(&b));
        assert!(doc.contains(&a, &b));
    }

    #[test]
    fn test_overlay_markup_tree() {
        let doc = MemoryDocument::with_skeleton();
        let markup = crate::style::overlay_markup();
        let overlay = doc.create_overlay(&markup).unwrap();
        assert_eq!(doc.attr(overlay, "id").as_deref(), Some(OVERLAY_ID));
        assert_eq!(doc.children(overlay).len(), markup.children.len());
        assert!(doc.parent(overlay).is_none());
    }

    #[test]
    fn test_force_transparent_skips_overlay() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        let app = doc.create_element("div");
        doc.set_attr(app, "class", "app-wrapper");
        doc.append(body, app);
        let side = doc.create_element("nav");
        doc.set_attr(side, "class", "left-sidebar dark");
        doc.append(app, side);

        assert_eq!(doc.force_transparent(&InlineTarget::FirstContentWrapper), 1);
        assert_eq!(doc.inline_background(app).as_deref(), Some("transparent"));

        let sidebar = Matcher::AttrContains {
            attr: "class",
            needle: "sidebar",
        };
        assert_eq!(doc.force_transparent(&InlineTarget::Matching(sidebar)), 1);
        assert_eq!(doc.inline_background(side).as_deref(), Some("transparent"));

        // Only the overlay in body: nothing to neutralize
        let empty = MemoryDocument::with_skeleton();
        let overlay = empty.create_overlay(&crate::style::overlay_markup()).unwrap();
        empty.append(empty.body().unwrap(), overlay);
        assert_eq!(empty.force_transparent(&InlineTarget::FirstContentWrapper), 0);
    }

    #[test]
    fn test_scheme_listeners() {
        let doc = MemoryDocument::with_skeleton();
        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();
        doc.on_color_scheme_change(Box::new(move |dark| sink.set(Some(dark))));
        doc.set_prefers_dark(true);
        assert_eq!(seen.get(), None);
        doc.set_prefers_dark(false);
        assert_eq!(seen.get(), Some(false));
        assert!(!doc.prefers_dark());
    }

    #[test]
    fn test_watch_ignores_mutations_before_observe() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        doc.append(body, doc.create_element("div"));
        let (seen, callback) = counter();
        let _watch = doc.observe(&body, WatchScope::Children, callback).unwrap();
        assert_eq!(doc.flush_mutations(), 0);
        assert_eq!(seen.get(), (0, 0));

        doc.append(body, doc.create_element("div"));
        assert_eq!(doc.flush_mutations(), 1);
        assert_eq!(seen.get(), (1, 0));
    }

    #[test]
    fn test_link_refuses_cycles() {
        let doc = MemoryDocument::with_skeleton();
        let body = doc.body().unwrap();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        assert!(doc.append(body, outer));
        assert!(doc.append(outer, inner));

        assert!(!doc.append(inner, outer));
        assert!(!doc.prepend(outer, outer));
        assert!(!doc.append_child(&inner, &body));
        assert_eq!(doc.parent(outer), Some(body));
        assert_eq!(doc.parent(inner), Some(outer));
        assert!(doc.is_connected(&inner));
    }

    #[test]
    fn test_find_by_id_only_connected() {
        let doc = MemoryDocument::with_skeleton();
        let sheet = doc.create_stylesheet("s", "a{}").unwrap();
        assert!(doc.find_by_id("s").is_empty());
        doc.append(doc.head().unwrap(), sheet);
        assert_eq!(doc.find_by_id("s"), vec![sheet]);
        assert_eq!(doc.text(sheet), "a{}");
    }
}
