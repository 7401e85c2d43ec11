use serde::Deserialize;

use super::{repo::ProductFilter, repo_types::ProductStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cause_id: Option<String>,
    pub donation_percentage: Option<u8>,
}

/// Absent fields are left alone. `causeId: ""` detaches the product from
/// its cause.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cause_id: Option<String>,
    pub donation_percentage: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ProductStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListParams {
    pub status: Option<ProductStatus>,
    pub category: Option<String>,
    pub cause: Option<String>,
    pub creator: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ProductListParams {
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            status: self.status,
            category: self.category.as_ref().map(|c| c.trim().to_lowercase()),
            cause_id: self.cause.clone(),
            creator_id: self.creator.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
