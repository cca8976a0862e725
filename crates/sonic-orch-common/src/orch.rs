//! The Orch trait implemented by every manager.

use async_trait::async_trait;

/// A reconciler that owns one or more [`Consumer`](crate::Consumer) queues.
///
/// The daemon loop calls [`Orch::do_task`] after each batch of table changes
/// and on every select timeout, so deferred records get another pass even
/// when nothing new arrives.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Runs one pass over every queue. Records that cannot be applied yet
    /// are handed back to their consumer.
    async fn do_task(&mut self);

    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// One line per queued record, for debug logging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
