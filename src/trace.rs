//! Feature-gated tracing macros for zero-overhead instrumentation.
//!
//! With the `tracing` feature the real `tracing` macros are re-exported;
//! without it every macro compiles to a no-op.

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, info, trace, trace_span, warn, Level, Span};

#[cfg(not(feature = "tracing"))]
mod noop {
    /// No-op span.
    pub struct Span;

    impl Span {
        pub fn none() -> Self {
            Span
        }

        pub fn entered(self) -> SpanGuard {
            SpanGuard
        }
    }

    /// No-op guard.
    pub struct SpanGuard;

    impl Drop for SpanGuard {
        fn drop(&mut self) {}
    }

    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! warn {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! trace_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    #[macro_export]
    macro_rules! debug_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    pub use crate::{debug, debug_span, info, trace, trace_span, warn};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;

/// Install a stderr subscriber honoring `RUST_LOG`. Call once from the
/// driver or a test when tracing is compiled in.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}

/// Folded-stack tracing for flamegraphs; the guard flushes on drop.
#[cfg(feature = "tracing")]
pub fn init_flamegraph(path: &str) -> impl Drop {
    use tracing_flame::FlameLayer;
    use tracing_subscriber::{prelude::*, registry::Registry};

    let (flame_layer, guard) = FlameLayer::with_file(path).expect("failed to create flame layer");
    Registry::default().with(flame_layer).init();
    guard
}

#[cfg(not(feature = "tracing"))]
pub fn init_flamegraph(_path: &str) -> impl Drop {
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {}
    }
    Guard
}
