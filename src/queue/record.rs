//! Persisted mutation records.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of offline-capable write.
///
/// Adding a variant (and registering a handler for it) is how a new write
/// becomes replayable. Types written by a newer client that this build does
/// not know are kept as `Other` so they still hold their place in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MutationType {
  CreateComment,
  SetGroupProgress,
  Other(String),
}

impl MutationType {
  pub fn as_str(&self) -> &str {
    match self {
      Self::CreateComment => "createComment",
      Self::SetGroupProgress => "setGroupProgress",
      Self::Other(s) => s,
    }
  }
}

impl From<String> for MutationType {
  fn from(s: String) -> Self {
    match s.as_str() {
      "createComment" => Self::CreateComment,
      "setGroupProgress" => Self::SetGroupProgress,
      _ => Self::Other(s),
    }
  }
}

impl From<&str> for MutationType {
  fn from(s: &str) -> Self {
    Self::from(s.to_string())
  }
}

impl From<MutationType> for String {
  fn from(kind: MutationType) -> Self {
    kind.as_str().to_string()
  }
}

impl fmt::Display for MutationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A recorded write not yet confirmed by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: MutationType,
  /// Arguments sufficient to replay the call with no other context
  pub payload: Value,
  pub created_at: i64,
}

impl MutationRecord {
  pub fn new(kind: MutationType, payload: Value, now_ms: i64) -> Self {
    Self {
      id: generate_id(now_ms),
      kind,
      payload,
      created_at: now_ms,
    }
  }
}

/// Timestamp plus a random suffix, so two enqueues in the same millisecond
/// still get distinct ids.
fn generate_id(now_ms: i64) -> String {
  let suffix: u64 = rand::thread_rng().gen();
  format!("{}-{:016x}", now_ms, suffix)
}
