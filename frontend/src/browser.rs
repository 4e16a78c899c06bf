use std::fmt;

use web_sys::{window, Storage};

use crate::gate::codec::{MemorySlot, SlotStorage};
use crate::gate::controller::{Clock, ExternalNavigator};

fn local_storage() -> Option<Storage> {
    window().and_then(|w| w.local_storage().ok()).flatten()
}

/// Logs a failed browser call. Returns whether it went through.
fn reported<E: fmt::Debug>(result: Result<(), E>, action: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{} failed: {:?}", action, e);
            false
        }
    }
}

/// `localStorage`, or an in-memory map when the browser refuses it
/// (private mode, disabled cookies).
#[derive(Default)]
pub struct BrowserSlot {
    fallback: MemorySlot,
}

impl SlotStorage for BrowserSlot {
    fn get(&self, key: &str) -> Option<String> {
        match local_storage() {
            Some(storage) => storage.get_item(key).ok().flatten(),
            None => self.fallback.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) {
        match local_storage() {
            Some(storage) => {
                if !reported(storage.set_item(key, value), "Saving progress to localStorage") {
                    self.fallback.set(key, value);
                }
            }
            None => self.fallback.set(key, value),
        }
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = local_storage() {
            reported(storage.remove_item(key), "Clearing progress from localStorage");
        }
        self.fallback.remove(key);
    }
}

pub struct BrowserNavigator;

impl ExternalNavigator for BrowserNavigator {
    fn open_external(&self, url: &str) -> bool {
        let Some(window) = window() else {
            return false;
        };
        match window.open_with_url_and_target(url, "_blank") {
            Ok(Some(opened)) => !opened.closed().unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                gloo_console::error!("Failed to open window:", e);
                false
            }
        }
    }

    fn redirect(&self, url: &str) {
        if let Some(window) = window() {
            reported(window.location().set_href(url), "Redirecting to the destination");
        }
    }
}

pub struct BrowserClock;

impl Clock for BrowserClock {
    fn wall_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn monotonic_ms(&self) -> u64 {
        window()
            .and_then(|w| w.performance())
            .map(|p| p.now() as u64)
            .unwrap_or_else(|| self.wall_ms().max(0) as u64)
    }
}
