//! Error taxonomy for the dispatch pipeline.
//!
//! Authentication and classification failures always occur before any
//! cluster mutation, so a rejected request never leaves partial state
//! behind. The one exception is the bundle/job submission pair, which is
//! compensated in the handler (see `lib.rs`).

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::jobspec::SpecError;

/// Terminal failure of a single webhook dispatch attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or invalid webhook signature. Maps to HTTP 401.
    #[error("signature verification failed: {0}")]
    Authentication(String),

    /// Malformed or incomplete webhook payload. Maps to HTTP 400.
    #[error("invalid webhook payload: {0}")]
    Validation(String),

    /// Internal serialization failure while assembling the bundle.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job descriptor failed builder validation. Maps to HTTP 500.
    #[error("invalid job spec: {0}")]
    Spec(#[from] SpecError),

    /// Resource-API create failed. Maps to HTTP 500; recovery is the
    /// webhook sender's own redelivery.
    #[error("cluster submission failed: {0}")]
    Cluster(#[from] ClusterError),
}

impl DispatchError {
    /// HTTP status code this error surfaces as.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::Authentication(_) => 401,
            DispatchError::Validation(_) => 400,
            DispatchError::Serialization(_)
            | DispatchError::Spec(_)
            | DispatchError::Cluster(_) => 500,
        }
    }
}
