//! Deferred release of decoded audio
//!
//! A loaded source can hold minutes of stereo frames. The render thread keeps
//! a `basedrop::Shared` snapshot of the deck's current slot for the length of
//! one pull; when a load or eject retires that slot, the last reference may be
//! dropped on the render thread. `Shared` turns that drop into a queue push and
//! the actual free happens on the collector thread below.
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::engine::gc::gc_handle;
//!
//! let slot = Shared::new(&gc_handle(), DeckSlot::empty());
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims retired allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // Collector is !Sync, so it is created on and never leaves this thread
    let spawned = thread::Builder::new()
        .name("deck-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("Deck GC thread started");
            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Without a collector thread, allocations are still valid; they
            // are just never reclaimed. Leak one collector to keep handles alive.
            log::error!("Failed to start deck GC thread, retired sources will leak");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Handle for wrapping values in `basedrop::Shared`
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
