//! Deterministic resource-name derivation.
//!
//! Job and bundle names share one short digest suffix so operators can
//! correlate the pair later. Hashing the inputs keeps the output within the
//! cluster's resource-name constraints (<= 63 chars, lowercase alphanumeric
//! plus hyphen) regardless of input size.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const JOB_PREFIX: &str = "agent-run-";
const CONFIG_PREFIX: &str = "agent-cfg-";

/// Number of hex characters kept from the digest.
const SUFFIX_LEN: usize = 8;

/// Names for one dispatch attempt's job and configuration bundle.
///
/// Deterministic for identical inputs. Because the dispatch timestamp is an
/// input, redelivered or concurrently duplicated webhooks produce distinct,
/// non-conflicting identities rather than being deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    pub job_name: String,
    pub config_name: String,
}

impl JobIdentity {
    pub fn derive(comment_id: u64, dispatched_at: DateTime<Utc>) -> Self {
        let input = format!("{}:{}", comment_id, dispatched_at.timestamp_micros());
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let hash = hasher.finalize();

        // 4 bytes -> 8 hex chars; plenty for per-attempt uniqueness.
        let suffix = hex::encode(&hash[..SUFFIX_LEN / 2]);

        Self {
            job_name: format!("{}{}", JOB_PREFIX, suffix),
            config_name: format!("{}{}", CONFIG_PREFIX, suffix),
        }
    }

    /// The shared digest suffix.
    pub fn suffix(&self) -> &str {
        &self.job_name[JOB_PREFIX.len()..]
    }
}
