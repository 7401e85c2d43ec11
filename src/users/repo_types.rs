use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const USERS: &str = "users";

/// Profile document, keyed by the identity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub is_entrepreneur: bool,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub causes_created: i64,
    #[serde(default)]
    pub causes_supported: i64,
    #[serde(default)]
    pub products_created: i64,
    #[serde(default)]
    pub whats_app: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "crate::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Per-user activity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    CausesCreated,
    CausesSupported,
    ProductsCreated,
}

impl User {
    pub fn counter_mut(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::CausesCreated => &mut self.causes_created,
            Counter::CausesSupported => &mut self.causes_supported,
            Counter::ProductsCreated => &mut self.products_created,
        }
    }
}
