use std::time::Duration;

mod future_ext;
mod init;

pub use init::{init_logging, LoggingTask};

pub(crate) mod prelude {
    pub(crate) use super::{tracing_duration, tracing_err};
    pub(crate) use super::future_ext::FutureExt as _;

    // We don't care if some of the imports here are not used. They may be used
    // at some point. It's just convenient not to import them manually all the
    // time a new logging macro is needed.
    #[allow(unused_imports)]
    pub(crate) use tracing::{
        debug, debug_span, error, error_span, info, info_span, instrument, trace, trace_span, warn,
        warn_span, Instrument as _,
    };
}

/// Records an error as a `dyn Error` so that subscribers render its sources.
#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(err: &'a E) -> impl tracing::Value + 'a {
    err as &dyn std::error::Error
}

/// Durations are logged with two decimal places, e.g. `1.25s`.
pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(format!("{duration:.2?}"))
}

