use serde_json::Value;
use tracing::debug;

/// Best-effort observability sink keyed by interaction id.
///
/// Implementations must never fail the caller: the request path treats every
/// trace interaction as fire-and-forget. The wire protocol of the hosted
/// tracing product is out of scope; this contract is what the routers and the
/// eval processor program against.
pub trait TraceSink: Send + Sync {
    fn start(&self, trace_id: &str, name: &str, metadata: Value);
    fn update(&self, trace_id: &str, metadata: Value);
    fn score(&self, trace_id: &str, name: &str, value: f64, comment: &str);
}

/// Default sink that mirrors trace activity into the structured log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn start(&self, trace_id: &str, name: &str, metadata: Value) {
        debug!(trace_id, name, %metadata, "trace start");
    }

    fn update(&self, trace_id: &str, metadata: Value) {
        debug!(trace_id, %metadata, "trace update");
    }

    fn score(&self, trace_id: &str, name: &str, value: f64, comment: &str) {
        debug!(trace_id, name, value, comment, "trace score");
    }
}
