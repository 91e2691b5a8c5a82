use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply sent to a worker as soon as its message is received.
pub const ACK_TOKEN: &[u8; 4] = b"_ok_";

/// Objective reported by workers whose job failed.
pub const FAILED_OBJECTIVE: f64 = -1.0;

/// Identifier of a genome, unique within one optimizer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenomeId(pub u64);

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Batch identifier handed back by the cluster on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result message sent from a worker to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub results: ResultRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultRecord {
    pub id: GenomeId,
    pub objective: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn success(id: GenomeId, objective: f64, compute_host: impl Into<String>) -> Self {
        Self {
            id,
            objective,
            compute_host: Some(compute_host.into()),
            error: None,
        }
    }

    pub fn failure(id: GenomeId, error: impl Into<String>, compute_host: Option<String>) -> Self {
        Self {
            id,
            objective: FAILED_OBJECTIVE,
            compute_host,
            error: Some(error.into()),
        }
    }
}

/// Job description transferred to the worker alongside its inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub config: JobDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobDescription {
    pub execute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_obj_value: Option<String>,
    pub server: String,
    pub genome_id: GenomeId,
}

/// What happened to one inbound result message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Matched an in-flight genome, which is now in the cache.
    Merged(GenomeId),
    /// Nothing with this id was dispatched in the current batch.
    UnknownId(GenomeId),
    /// The id was dispatched but its result already arrived.
    AlreadyComplete(GenomeId),
    /// Payload could not be parsed as a result document.
    Malformed,
}
