//! `chrome.storage.sync` adapter
//!
//! Values are exchanged as JSON text so the Rust side owns all decoding.

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

use super::{ChangeCallback, ConfigStore, LoadCallback, SaveCallback, StoreError, decode, encode};
use crate::settings::Settings;

#[wasm_bindgen(inline_js = "
    export function storage_get(key) {
        return chrome.storage.sync.get([key]).then((result) =>
            result[key] === undefined ? null : JSON.stringify(result[key]));
    }

    export function storage_set(key, json) {
        return chrome.storage.sync.set({ [key]: JSON.parse(json) });
    }

    export function storage_on_changed(key, callback) {
        chrome.storage.onChanged.addListener((changes, area) => {
            if (area !== 'sync' || !changes[key]) {
                return;
            }
            const change = changes[key];
            callback(
                change.oldValue === undefined ? null : JSON.stringify(change.oldValue),
                change.newValue === undefined ? null : JSON.stringify(change.newValue),
            );
        });
    }
")]
extern "C" {
    #[wasm_bindgen(catch)]
    fn storage_get(key: &str) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch)]
    fn storage_set(key: &str, json: &str) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch)]
    fn storage_on_changed(
        key: &str,
        callback: &Closure<dyn FnMut(Option<String>, Option<String>)>,
    ) -> Result<(), JsValue>;
}

fn unavailable(e: JsValue) -> StoreError {
    StoreError::Unavailable(format!("{:?}", e))
}

/// Settings store backed by the extension's synced storage area
#[derive(Debug, Default)]
pub struct ChromeStore;

impl ChromeStore {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigStore for ChromeStore {
    fn load(&self, done: LoadCallback) {
        spawn_local(async move {
            let result = match storage_get(Settings::STORAGE_KEY) {
                Ok(promise) => match JsFuture::from(promise).await {
                    Ok(value) => value.as_string().map(|json| decode(&json)).transpose(),
                    Err(e) => Err(unavailable(e)),
                },
                Err(e) => Err(unavailable(e)),
            };
            done(result);
        });
    }

    fn save(&self, settings: &Settings, done: SaveCallback) {
        let json = match encode(settings) {
            Ok(json) => json,
            Err(e) => return done(Err(e)),
        };
        spawn_local(async move {
            let result = match storage_set(Settings::STORAGE_KEY, &json) {
                Ok(promise) => JsFuture::from(promise).await.map(|_| ()).map_err(unavailable),
                Err(e) => Err(unavailable(e)),
            };
            done(result);
        });
    }

    fn subscribe(&self, mut on_change: ChangeCallback) {
        let closure = Closure::<dyn FnMut(Option<String>, Option<String>)>::new(
            move |old: Option<String>, new: Option<String>| {
                let old = old.and_then(|j| decode(&j).ok());
                let new = new.and_then(|j| decode(&j).ok());
                on_change(old, new);
            },
        );
        match storage_on_changed(Settings::STORAGE_KEY, &closure) {
            // Listener lives as long as the page
            Ok(()) => closure.forget(),
            Err(e) => log::warn!("Cannot watch settings: {:?}", e),
        }
    }
}
