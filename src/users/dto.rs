use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::User;
use crate::store::Stored;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub tags: Option<Vec<String>>,
    pub whats_app: Option<String>,
    pub instagram: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileListParams {
    #[serde(default)]
    pub entrepreneur: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Profile as shown to other users: no email address.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    pub bio: String,
    pub email_verified: bool,
    pub is_entrepreneur: bool,
    pub points: i64,
    pub tags: Vec<String>,
    pub causes_created: i64,
    pub causes_supported: i64,
    pub products_created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whats_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
}

impl From<Stored<User>> for PublicProfile {
    fn from(s: Stored<User>) -> Self {
        let u = s.record;
        Self {
            id: s.id,
            name: u.name,
            bio: u.bio,
            email_verified: u.email_verified,
            is_entrepreneur: u.is_entrepreneur,
            points: u.points,
            tags: u.tags,
            causes_created: u.causes_created,
            causes_supported: u.causes_supported,
            products_created: u.products_created,
            whats_app: u.whats_app,
            instagram: u.instagram,
            created_at: u.created_at,
        }
    }
}
