//! Fatal error reporting. Everything that goes wrong inside the middle-end
//! is a configuration or programming error and aborts the compilation on the
//! spot; there is no recovery path at this layer.

/// Aborts the compilation with a formatted message. Passes signal their own
/// recoverable failures before returning; by the time an error reaches this
/// macro the pipeline state is not worth saving.
#[macro_export]
macro_rules! fatal_error {
    ($($arg:tt)*) => {
        panic!("{}: {}", ::colored::Colorize::red("error"), format_args!($($arg)*))
    };
}
