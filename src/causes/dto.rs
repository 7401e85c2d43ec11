use serde::{Deserialize, Serialize};

use super::{
    ledger::Applied,
    repo::CauseFilter,
    repo_types::{Cause, CauseStatus},
};
use crate::store::Stored;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCause {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub goal: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub goal: Option<f64>,
    pub status: Option<CauseStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseListParams {
    pub status: Option<CauseStatus>,
    pub tag: Option<String>,
    pub creator: Option<String>,
    pub supporter: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl CauseListParams {
    pub fn filter(&self) -> CauseFilter {
        CauseFilter {
            status: self.status,
            tag: self.tag.as_ref().map(|t| t.trim().to_lowercase()),
            creator_id: self.creator.clone(),
            supporter_id: self.supporter.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResponse {
    pub cause: Stored<Cause>,
    #[serde(flatten)]
    pub applied: Applied,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub content: String,
}
