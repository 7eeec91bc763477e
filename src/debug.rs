// Debug configuration sink.
//
// The only process-wide state in the crate: an enable flag, a verbosity
// level, and a walker trace depth, all plain atomics so first use needs no
// initialization and disabling needs no teardown.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);
static VERBOSITY: AtomicU8 = AtomicU8::new(0);
static TRACE_DEPTH: AtomicUsize = AtomicUsize::new(usize::MAX);

/// Turn debug tracing on.
pub fn enable(verbosity: u8, trace_depth: usize) {
    VERBOSITY.store(verbosity, Ordering::Relaxed);
    TRACE_DEPTH.store(trace_depth, Ordering::Relaxed);
    ENABLED.store(true, Ordering::Relaxed);
}

/// Turn debug tracing off.
pub fn disable() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

/// Maximum ancestor depth at which the walker still traces dispatches.
pub fn trace_depth() -> usize {
    TRACE_DEPTH.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_disable_cycle() {
        enable(2, 5);
        assert!(is_enabled());
        assert_eq!(verbosity(), 2);
        assert_eq!(trace_depth(), 5);
        disable();
        assert!(!is_enabled());
    }
}
