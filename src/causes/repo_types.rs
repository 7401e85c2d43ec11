use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const CAUSES: &str = "causes";
pub const COMMENTS: &str = "comments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CauseStatus {
    Active,
    Completed,
    Cancelled,
}

impl CauseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: String,
    #[serde(default)]
    pub creator_name: String,
    #[serde(default)]
    pub image_key: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub goal: f64,
    #[serde(default)]
    pub current_amount: f64,
    /// Distinct supporter ids.
    #[serde(default)]
    pub supporters: BTreeSet<String>,
    pub status: CauseStatus,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub updates: Vec<CauseUpdate>,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "crate::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Progress post written by the cause owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseUpdate {
    pub id: String,
    pub content: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
}

/// Stored under `causes/{causeId}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub content: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
}
