use std::time::Duration;

use thiserror::Error;

use crate::messaging::{BrokerError, PublishError};
use crate::model::JobError;

/// Everything that can end a `/synth` request early.
///
/// Variants are ordered by the stage that produces them. Only the first
/// error of a request is ever reported; teardown problems are logged where
/// they happen and never surface here.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed job: {0}")]
    MalformedJob(String),

    #[error("text quota exceeded: {chars} characters, limit {max}")]
    QuotaExceeded { chars: usize, max: usize },

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(#[source] BrokerError),

    #[error("job not published: {0}")]
    PublishFailed(#[source] PublishError),

    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    #[error("reply stream failed: {0}")]
    ReplyStream(#[source] BrokerError),

    #[error("reply stream closed before the job completed")]
    ReplyStreamClosed,
}

impl From<JobError> for BridgeError {
    fn from(e: JobError) -> Self {
        Self::MalformedJob(e.to_string())
    }
}

impl BridgeError {
    /// `true` when the request was turned away before any broker work.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::MalformedJob(_) | Self::QuotaExceeded { .. })
    }
}
