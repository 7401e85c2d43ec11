use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const PRODUCTS: &str = "products";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Available,
    Sold,
    Unavailable,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Sold => "sold",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: String,
    #[serde(default)]
    pub creator_name: String,
    #[serde(default)]
    pub image_key: Option<String>,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cause that receives part of the sale.
    #[serde(default)]
    pub cause_id: Option<String>,
    #[serde(default)]
    pub donation_percentage: Option<u8>,
    pub status: ProductStatus,
    #[serde(with = "crate::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "crate::timestamp")]
    pub updated_at: OffsetDateTime,
}
