//! Aurora Dream entry point
//!
//! In the browser this is the content script: it wires the web adapters into
//! a lifecycle coordinator and starts it. Natively it prints the stylesheet
//! for a settings file, or runs the overlay against a simulated hostile host.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_content {
    use std::rc::Rc;

    use aurora_dream::LifecycleCoordinator;
    use aurora_dream::dom::web::WebDocument;
    use aurora_dream::persistence::ConfigStore;
    use aurora_dream::persistence::chrome::ChromeStore;
    use aurora_dream::platform::Scheduler;
    use aurora_dream::platform::web::WebScheduler;

    pub async fn run() {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            // Another module of the page already installed a logger
            log::debug!("Logger already initialised");
        }

        let (Some(document), Some(scheduler)) = (WebDocument::new(), WebScheduler::new()) else {
            log::warn!("No window or document; Aurora Dream not started");
            return;
        };
        let scheduler: Rc<dyn Scheduler> = Rc::new(scheduler);
        let store: Rc<dyn ConfigStore> = Rc::new(ChromeStore::new());

        let coordinator = LifecycleCoordinator::new(Rc::new(document), scheduler, store);
        coordinator.start();

        // Lives as long as the page
        std::mem::forget(coordinator);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_content::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();

    let mut simulate = false;
    let mut light = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--simulate" => simulate = true,
            "--light" => light = true,
            "-h" | "--help" => {
                println!("usage: aurora-dream [--simulate] [--light] [settings.json]");
                return;
            }
            _ => path = Some(arg),
        }
    }

    let json = match path.as_deref().map(std::fs::read_to_string).transpose() {
        Ok(json) => json,
        Err(e) => {
            log::error!("Cannot read settings file: {e}");
            std::process::exit(1);
        }
    };

    if simulate {
        native::simulate(json.as_deref(), light);
    } else {
        native::print_css(json.as_deref(), light);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::rc::Rc;

    use aurora_dream::dom::memory::MemoryDocument;
    use aurora_dream::persistence::{ConfigStore, MemoryStore};
    use aurora_dream::platform::{ManualScheduler, Scheduler};
    use aurora_dream::style::{ColorScheme, OVERLAY_ID, STYLESHEET_ID, StyleContext};
    use aurora_dream::{LifecycleCoordinator, Settings, synthesize};

    /// Host churn rounds in the simulation
    const ROUNDS: usize = 25;

    pub fn print_css(json: Option<&str>, light: bool) {
        let settings = match json.map(Settings::from_json).transpose() {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                log::error!("Invalid settings: {e}");
                std::process::exit(1);
            }
        };
        let ctx = StyleContext {
            scheme: ColorScheme::from_prefers_dark(!light),
            image_url: None,
        };
        print!("{}", synthesize(&settings, &ctx).css());
    }

    /// Start the overlay on an in-memory page, then let the "host" evict it,
    /// swap its body, and rewrite settings, reporting what survived
    pub fn simulate(json: Option<&str>, light: bool) {
        let dom = Rc::new(MemoryDocument::new());
        dom.set_prefers_dark(!light);
        let scheduler = Rc::new(ManualScheduler::new());
        let memory = Rc::new(json.map(MemoryStore::with_json).unwrap_or_default());

        let sched: Rc<dyn Scheduler> = scheduler.clone();
        let store: Rc<dyn ConfigStore> = memory.clone();
        let coordinator = LifecycleCoordinator::new(dom.clone(), sched, store);
        coordinator.start();

        // The app shell streams in
        dom.add_head();
        let body = dom.add_body();
        let app = dom.create_element("div");
        dom.set_attr(app, "id", "__next");
        dom.append(body, app);
        dom.flush_mutations();
        scheduler.run_until_idle(1000);
        log::info!(
            "Started after {} ms in phase {:?}",
            scheduler.now_ms(),
            coordinator.phase()
        );

        let presence = coordinator.presence();
        for round in 0..ROUNDS {
            match round % 5 {
                // Framework re-render wipes foreign children
                0 => {
                    if let Some(overlay) = presence.overlay() {
                        dom.remove(overlay);
                    }
                }
                // Client-side navigation swaps the body
                1 => {
                    let body = dom.replace_body();
                    let page = dom.create_element("main");
                    dom.append(body, page);
                }
                // Portal prepended to body
                2 => {
                    if let Some(body) = dom.body() {
                        dom.prepend(body, dom.create_element("div"));
                    }
                }
                // Another surface saves a preset
                3 => memory.write_raw(r#"{"animationSpeed":1.5,"blur":100,"starsEnabled":true}"#),
                _ => dom.set_prefers_dark(round % 2 == 0),
            }
            dom.flush_mutations();
            scheduler.run_until_idle(1000);
        }

        let stats = presence.stats();
        println!("overlays attached: {}", dom.find_by_id(OVERLAY_ID).len());
        println!("stylesheets attached: {}", dom.find_by_id(STYLESHEET_ID).len());
        println!(
            "insertions: {}, watchdog repairs: {}, restyles: {}, abandoned: {}",
            stats.insertions, stats.repairs, stats.restyles, stats.abandoned
        );
    }
}
