//! Browser scheduler: `requestAnimationFrame` and `setTimeout`

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use super::{Scheduler, Task};

pub struct WebScheduler {
    window: web_sys::Window,
}

impl WebScheduler {
    pub fn new() -> Option<Self> {
        Some(Self {
            window: web_sys::window()?,
        })
    }
}

impl Scheduler for WebScheduler {
    fn next_frame(&self, task: Task) -> bool {
        let callback = Closure::once_into_js(move |_time: f64| task());
        match self.window.request_animation_frame(callback.unchecked_ref()) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("requestAnimationFrame failed: {:?}", e);
                false
            }
        }
    }

    fn after(&self, delay_ms: u32, task: Task) {
        let callback = Closure::once_into_js(move || task());
        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
        {
            log::warn!("setTimeout failed: {:?}", e);
        }
    }
}
