use anyhow::Result;
use std::future::Future;

/// Read/write access to a subject's remote `total_active_seconds`.
///
/// There is no increment operation: a flush reads the current value and
/// writes back the sum, so two writers for the same subject can lose an update.
pub trait ProfileStore: Send + Sync + 'static {
    /// Returns `None` when the record or the field is missing.
    fn fetch_total(&self, subject_id: &str) -> impl Future<Output = Result<Option<i64>>> + Send;

    fn write_total(&self, subject_id: &str, total: i64) -> impl Future<Output = Result<()>> + Send;
}
