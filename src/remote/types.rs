//! Wire types for the content service.

use serde::{Deserialize, Serialize};

/// Surah summary for the Quran index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surah {
  pub number: u32,
  pub name: String,
  pub english_name: String,
  pub ayah_count: u32,
  pub revelation_type: String, // "meccan" or "medinan"
}

/// A single hadith
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hadith {
  pub id: String,
  pub collection: String,
  pub number: String,
  pub text: String,
  #[serde(default)]
  pub grade: Option<String>,
}

/// Question and answer entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaItem {
  pub id: String,
  pub question: String,
  #[serde(default)]
  pub answer: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  pub created_at: String,
}

/// Supplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dua {
  pub id: String,
  pub title: String,
  pub arabic: String,
  pub translation: String,
  #[serde(default)]
  pub reference: Option<String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items: Vec<T>,
  pub page: u32,
  pub total: u32,
}

/// Body of a create-comment call; also the queued replay payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
  /// What is being commented on, e.g. "qa" or "hadith"
  pub target_type: String,
  pub target_id: String,
  pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: String,
  pub target_type: String,
  pub target_id: String,
  pub body: String,
  pub created_at: String,
}

/// Body of a set-progress call; also the queued replay payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProgressUpdate {
  pub group_id: String,
  /// Current position in the group's reading plan (page or juz)
  pub position: u32,
}

/// Reading group progress as the server reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProgress {
  pub group_id: String,
  pub position: u32,
  pub updated_at: String,
}
