//! Service Marketplace Web Frontend
//!
//! Leptos-based WASM frontend: plan selection, hosted checkout hand-off and
//! the dashboard that handles the checkout return.

mod api;
mod app;
mod components;
mod pages;
mod storage;

pub use app::App;

use wasm_bindgen::prelude::*;

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    leptos::mount::mount_to_body(App);
}
