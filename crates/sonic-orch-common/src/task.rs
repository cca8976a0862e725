//! Task processing status.

/// Result of processing a single change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Record applied; consume it.
    Success,
    /// Record was malformed; consume it without action.
    InvalidEntry,
    /// A dependency is not visible yet; keep the record queued.
    NeedRetry,
    /// Nothing to do (already applied, untracked delete, ...); consume it.
    Ignore,
}

impl TaskStatus {
    /// Returns true if the record should be consumed.
    pub fn is_consumed(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns true if the record should stay queued for the next pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }

    /// Returns the lowercase label used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::InvalidEntry => "invalid_entry",
            TaskStatus::NeedRetry => "need_retry",
            TaskStatus::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
