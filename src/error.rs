use thiserror::Error;

/// Failures of the synchronization layer.
///
/// None of these cross into rendering code: every one is logged and degrades
/// to missing or stale data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Subscribe attempted before the bus connection exists.
    #[error("bus connection not ready")]
    ConnectionNotReady,

    /// Event payload did not parse as the shape its topic promises.
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },

    /// Event references an entity the view has not seen created yet.
    #[error("view '{view}' has no entity '{entity_id}'")]
    UnknownEntity { view: String, entity_id: String },

    /// REST seed call failed; the view keeps its stale or empty snapshot.
    #[error("seed fetch for {what} failed: {source}")]
    SeedFetchFailure {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    /// Tearing down a subscription failed.
    #[error("unsubscribe from '{topic}' failed: {reason}")]
    UnsubscribeFailure { topic: String, reason: String },

    /// Topic or pattern string is not well formed.
    #[error("invalid topic '{0}'")]
    InvalidTopic(String),
}

impl SyncError {
    pub fn malformed(topic: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::MalformedPayload {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}
