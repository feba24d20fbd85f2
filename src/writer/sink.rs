use async_trait::async_trait;

/// Destination for encoded lines.
///
/// Implementations absorb their own failures: the return value only says
/// whether the lines were accepted.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Deliver one line.
    async fn write_single(&self, line: String) -> bool;

    /// Deliver several lines in one request. An empty batch succeeds.
    async fn write_batch(&self, lines: Vec<String>) -> bool;

    /// Release any held connections. Safe to call repeatedly.
    async fn close(&self);
}
