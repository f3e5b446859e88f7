//! Check results and the per-run report

use crate::error::{Error, FailureKind};
use crate::secret::{scrub, scrub_value};
use crate::target::TargetSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Detail text of a check that never started because the run deadline
/// had already passed.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// What a check hands back to the engine.
///
/// A check reports faults by returning `Err`; the engine turns that into
/// a failed outcome. Building a failed `Outcome` directly is for checks
/// that want to attach structured data to the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub detail: String,
    pub data: Option<Value>,
    pub failure: Option<FailureKind>,
}

impl Outcome {
    #[must_use]
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            detail: detail.into(),
            data: None,
            failure: None,
        }
    }

    #[must_use]
    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Skipped,
            detail: detail.into(),
            data: None,
            failure: None,
        }
    }

    #[must_use]
    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            detail: detail.into(),
            data: None,
            failure: Some(kind),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&Error> for Outcome {
    fn from(err: &Error) -> Self {
        Self::failed(err.kind(), err.to_string())
    }
}

/// Outcome of one check, as stored in a [`ProbeReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub target: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis", deserialize_with = "from_millis")]
    pub duration: Duration,
}

impl CheckResult {
    pub(crate) fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        outcome: Outcome,
        duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            status: outcome.status,
            error: outcome.failure,
            detail: outcome.detail,
            data: outcome.data,
            duration,
        }
    }

    /// Remove every literal occurrence of `secrets` from detail and data.
    #[must_use]
    pub(crate) fn scrubbed(mut self, secrets: &[&str]) -> Self {
        self.detail = scrub(&self.detail, secrets);
        if let Some(data) = self.data.as_mut() {
            scrub_value(data, secrets);
        }
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn from_millis<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

/// Everything one run of the engine produced, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis", deserialize_with = "from_millis")]
    pub elapsed: Duration,
    pub targets: Vec<TargetSummary>,
    pub results: Vec<CheckResult>,
}

impl ProbeReport {
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    /// True when no check failed. Skipped checks do not count against it.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed().next().is_none()
    }

    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
