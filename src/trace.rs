//! Per-pass debug tracing. The pass manager enables tracing right before a
//! pass listed in `--debug` runs and disables it again for everything else,
//! so trace output is scoped to the passes being investigated.

use std::cell::Cell;

thread_local! {
    static TRACE_ENABLED: Cell<bool> = const { Cell::new(false) };
}

pub fn enable() {
    TRACE_ENABLED.with(|t| t.set(true));
}

pub fn disable() {
    TRACE_ENABLED.with(|t| t.set(false));
}

pub fn enabled() -> bool {
    TRACE_ENABLED.with(|t| t.get())
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if $crate::trace::enabled() {
            eprintln!("[trace] {}", format_args!($($arg)*));
        }
    };
}
