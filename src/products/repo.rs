use serde_json::json;

use super::repo_types::{Product, ProductStatus, PRODUCTS};
use crate::{
    db::Db,
    store::{versioned::Change, Direction, Query, StoreError, Stored},
    timestamp,
};

#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    pub status: Option<ProductStatus>,
    pub category: Option<String>,
    pub cause_id: Option<String>,
    pub creator_id: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

pub async fn find(db: &Db, id: &str) -> Result<Stored<Product>, StoreError> {
    db.find(PRODUCTS, id).await
}

pub async fn insert(db: &Db, product: &Product) -> Result<String, StoreError> {
    db.insert(PRODUCTS, product).await
}

/// Newest first.
pub async fn list(
    db: &Db,
    filter: &ProductFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Stored<Product>>, StoreError> {
    let mut q = Query::new();
    if let Some(s) = filter.status {
        q = q.eq("status", s.as_str());
    }
    if let Some(c) = &filter.category {
        q = q.eq("category", c.as_str());
    }
    if let Some(c) = &filter.cause_id {
        q = q.eq("causeId", c.as_str());
    }
    if let Some(c) = &filter.creator_id {
        q = q.eq("creatorId", c.as_str());
    }
    if let Some(p) = filter.min_price {
        q = q.gte("price", p);
    }
    if let Some(p) = filter.max_price {
        q = q.lte("price", p);
    }
    let q = q
        .order_by("createdAt", Direction::Desc)
        .limit(limit)
        .offset(offset);
    db.list(PRODUCTS, &q).await
}

pub async fn modify<R, F>(db: &Db, id: &str, mutate: F) -> Result<(Stored<Product>, R), StoreError>
where
    R: Send,
    F: FnMut(&mut Product) -> Change<R> + Send,
{
    db.modify(PRODUCTS, id, mutate).await
}

/// Last writer wins on the status field.
pub async fn overwrite_status(db: &Db, id: &str, status: ProductStatus) -> Result<(), StoreError> {
    let updated_at = timestamp::format(timestamp::now())
        .map_err(|e| StoreError::Invalid(format!("timestamp: {e}")))?;
    db.patch(
        PRODUCTS,
        id,
        json!({ "status": status.as_str(), "updatedAt": updated_at }),
    )
    .await?;
    Ok(())
}

pub async fn delete(db: &Db, id: &str) -> Result<(), StoreError> {
    db.remove(PRODUCTS, id).await
}
