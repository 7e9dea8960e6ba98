//! In-process store used natively and in tests
//!
//! Notifications are delivered synchronously after the write, outside any
//! internal borrow, so listeners may read or write the store again.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ChangeCallback, ConfigStore, LoadCallback, SaveCallback, StoreError, decode, encode};
use crate::settings::{Settings, StoredSettings};

#[derive(Default)]
struct StoreState {
    json: Option<String>,
    unavailable: bool,
    listeners: Vec<Rc<RefCell<ChangeCallback>>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RefCell<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw record
    pub fn with_json(json: &str) -> Self {
        let store = Self::new();
        store.state.borrow_mut().json = Some(json.to_string());
        store
    }

    /// Simulate a permission or quota failure on every call
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.borrow_mut().unavailable = unavailable;
    }

    pub fn raw_json(&self) -> Option<String> {
        self.state.borrow().json.clone()
    }

    /// Write a raw record, as another surface (or another version) might
    pub fn write_raw(&self, json: &str) {
        self.replace(Some(json.to_string()));
    }

    fn replace(&self, json: Option<String>) {
        let (old, listeners) = {
            let mut state = self.state.borrow_mut();
            let old = std::mem::replace(&mut state.json, json.clone());
            (old, state.listeners.clone())
        };
        let old = old.and_then(|j| decode(&j).ok());
        let new = json.and_then(|j| decode(&j).ok());
        for listener in listeners {
            (listener.borrow_mut())(old.clone(), new.clone());
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.state.borrow().unavailable {
            Err(StoreError::Unavailable("memory store disabled".into()))
        } else {
            Ok(())
        }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, done: LoadCallback) {
        let result = self.check_available().and_then(|()| {
            let json = self.raw_json();
            json.map(|j| decode(&j)).transpose()
        });
        done(result);
    }

    fn save(&self, settings: &Settings, done: SaveCallback) {
        let result = self.check_available().and_then(|()| encode(settings));
        match result {
            Ok(json) => {
                self.replace(Some(json));
                done(Ok(()));
            }
            Err(e) => done(Err(e)),
        }
    }

    fn subscribe(&self, on_change: ChangeCallback) {
        self.state
            .borrow_mut()
            .listeners
            .push(Rc::new(RefCell::new(on_change)));
    }
}

/// Convenience for synchronous stores: load and hand back the result
pub fn load_now(store: &dyn ConfigStore) -> Option<Result<Option<StoredSettings>, StoreError>> {
    let slot = Rc::new(RefCell::new(None));
    let sink = slot.clone();
    store.load(Box::new(move |result| *sink.borrow_mut() = Some(result)));
    slot.borrow_mut().take()
}
