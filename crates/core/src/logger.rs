//! Logger contract consumed by the worker service.
//!
//! Hosting applications may plug in their own sink; `TracingLogger` forwards
//! everything to `tracing`.

/// Diagnostic output sink.
///
/// Implementations must never fail; logging is best-effort.
pub trait Logger: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);

    /// An error worth surfacing to operators.
    fn error(&self, error: &(dyn std::error::Error + 'static));

    /// Free-form console output (progress lines from long-running commands).
    fn console(&self, message: &str);
}

/// `Logger` backed by the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(error = %error, "{error:?}");
    }

    fn console(&self, message: &str) {
        tracing::info!(target: "console", "{message}");
    }
}

impl<L> Logger for std::sync::Arc<L>
where
    L: Logger + ?Sized,
{
    fn info(&self, message: &str) {
        (**self).info(message)
    }

    fn error(&self, error: &(dyn std::error::Error + 'static)) {
        (**self).error(error)
    }

    fn console(&self, message: &str) {
        (**self).console(message)
    }
}
