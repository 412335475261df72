use crate::Error;

/// Fire-and-forget sink for unexpected faults.
///
/// Implementations must not block the caller; anything slow (network delivery)
/// belongs in a spawned task.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &Error, context: &[(&str, String)]);
}

/// Reporter that only writes faults to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &Error, context: &[(&str, String)]) {
        let context = format_context(context);
        tracing::error!(%context, "{error}");
    }
}

/// Render `key=value` pairs on one line.
pub fn format_context(context: &[(&str, String)]) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}
