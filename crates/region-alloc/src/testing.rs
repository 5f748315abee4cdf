//! Scratch blocks and log capture for unit tests.

use std::{
    alloc::{self, Layout},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, Layer, SubscriberExt as _},
    registry,
};

/// Runs `test_fn` over a fresh heap block of `len` bytes aligned to 64.
///
/// The block is filled with `0x11` so stale reads stand out.
pub(crate) fn with_test_block<F, R>(len: usize, test_fn: F) -> R
where
    F: FnOnce(&mut [u8]) -> R,
{
    let layout = Layout::from_size_align(len.max(1), 64).unwrap();
    unsafe {
        let base = alloc::alloc(layout);
        assert!(!base.is_null(), "test block allocation failed");
        base.write_bytes(0x11, len);
        let result = test_fn(std::slice::from_raw_parts_mut(base, len));
        alloc::dealloc(base, layout);
        result
    }
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S> Layer<S> for WarnCounter
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Runs `f` on the current thread and counts the `WARN` events it emits.
pub(crate) fn count_warnings<F, R>(f: F) -> (R, usize)
where
    F: FnOnce() -> R,
{
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = registry().with(WarnCounter(Arc::clone(&warnings)));
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, warnings.load(Ordering::Relaxed))
}
