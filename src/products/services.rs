use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument};

use super::{
    dto::{NewProduct, ProductPatch},
    repo::{self, ProductFilter},
    repo_types::{Product, ProductStatus},
};
use crate::{
    causes::repo as causes_repo,
    db::Db,
    error::{AppError, AppResult},
    media::{services as media, ObjectStorage},
    store::{versioned::Change, Stored},
    timestamp,
    users::{repo_types::Counter, services as users},
    validate,
};

const MAX_CATEGORY_LEN: usize = 60;

fn owned_by(product: &Product, caller: &str) -> AppResult<()> {
    if product.creator_id == caller {
        Ok(())
    } else {
        Err(AppError::forbidden("only the product owner can do this"))
    }
}

fn price(value: f64) -> AppResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AppError::validation("price must be a non-negative number"))
    }
}

fn donation(pct: Option<u8>) -> AppResult<Option<u8>> {
    match pct {
        Some(p) if !(1..=100).contains(&p) => {
            Err(AppError::validation("donationPercentage must be between 1 and 100"))
        }
        other => Ok(other),
    }
}

fn category(raw: &str) -> AppResult<String> {
    Ok(validate::required_text("category", raw, MAX_CATEGORY_LEN)?.to_lowercase())
}

fn unlinked_donation() -> AppError {
    AppError::validation("donationPercentage needs a linked cause")
}

async fn ensure_cause(db: &Db, cause_id: &str) -> AppResult<()> {
    causes_repo::find(db, cause_id).await?;
    Ok(())
}

#[instrument(name = "products.service.create", skip(db, new), fields(creator_id = %creator_id))]
pub async fn create_product(db: &Db, creator_id: &str, new: NewProduct) -> AppResult<Stored<Product>> {
    let title = validate::required_text("title", &new.title, validate::MAX_TITLE_LEN)?;
    let description = validate::optional_text("description", &new.description, validate::MAX_TEXT_LEN)?;
    let price = price(new.price)?;
    let category = category(&new.category)?;
    let tags = validate::tags(&new.tags)?;
    let donation_percentage = donation(new.donation_percentage)?;
    let cause_id = new.cause_id.filter(|c| !c.trim().is_empty());
    if donation_percentage.is_some() && cause_id.is_none() {
        return Err(unlinked_donation());
    }

    let creator = users::get_profile(db, creator_id).await?;
    users::require_entrepreneur(&creator.record)?;
    if let Some(c) = &cause_id {
        ensure_cause(db, c).await?;
    }

    let now = timestamp::now();
    let product = Product {
        title,
        description,
        creator_id: creator.id.clone(),
        creator_name: creator.record.name,
        image_key: None,
        price,
        category,
        tags,
        cause_id,
        donation_percentage,
        status: ProductStatus::Available,
        created_at: now,
        updated_at: now,
    };
    let id = repo::insert(db, &product).await?;
    users::bump_counter_best_effort(db, creator_id, Counter::ProductsCreated).await;
    info!(product_id = %id, "product created");
    Ok(Stored {
        id,
        version: 1,
        record: product,
    })
}

pub async fn get_product(db: &Db, id: &str) -> AppResult<Stored<Product>> {
    Ok(repo::find(db, id).await?)
}

pub async fn list_products(
    db: &Db,
    filter: &ProductFilter,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Stored<Product>>> {
    if let (Some(lo), Some(hi)) = (filter.min_price, filter.max_price) {
        if lo > hi {
            return Err(AppError::validation("minPrice is greater than maxPrice"));
        }
    }
    let (limit, offset) = validate::page(limit, offset);
    Ok(repo::list(db, filter, limit, offset).await?)
}

#[instrument(name = "products.service.update", skip(db, patch), fields(product_id = %id))]
pub async fn update_product(db: &Db, caller: &str, id: &str, patch: ProductPatch) -> AppResult<Stored<Product>> {
    let title = patch
        .title
        .map(|t| validate::required_text("title", &t, validate::MAX_TITLE_LEN))
        .transpose()?;
    let description = patch
        .description
        .map(|d| validate::optional_text("description", &d, validate::MAX_TEXT_LEN))
        .transpose()?;
    let new_price = patch.price.map(price).transpose()?;
    let new_category = patch.category.as_deref().map(category).transpose()?;
    let tags = patch.tags.map(|t| validate::tags(&t)).transpose()?;
    let donation_percentage = donation(patch.donation_percentage)?;
    let cause_id = patch.cause_id.map(|c| {
        let c = c.trim().to_string();
        if c.is_empty() {
            None
        } else {
            Some(c)
        }
    });
    if let Some(Some(c)) = &cause_id {
        ensure_cause(db, c).await?;
    }

    let (product, outcome) = repo::modify(db, id, |p| {
        if let Err(e) = owned_by(p, caller) {
            return Change::Keep(Err(e));
        }
        if let Some(t) = &title {
            p.title = t.clone();
        }
        if let Some(d) = &description {
            p.description = d.clone();
        }
        if let Some(v) = new_price {
            p.price = v;
        }
        if let Some(c) = &new_category {
            p.category = c.clone();
        }
        if let Some(t) = &tags {
            p.tags = t.clone();
        }
        if let Some(c) = &cause_id {
            p.cause_id = c.clone();
            if c.is_none() {
                p.donation_percentage = None;
            }
        }
        if donation_percentage.is_some() {
            if p.cause_id.is_none() {
                return Change::Keep(Err(unlinked_donation()));
            }
            p.donation_percentage = donation_percentage;
        }
        p.updated_at = timestamp::now();
        Change::Write(Ok(()))
    })
    .await?;
    outcome?;
    Ok(product)
}

/// Overwrite the product status. Any transition is accepted and repeating
/// the same status is harmless.
#[instrument(name = "products.service.set_status", skip(db))]
pub async fn set_product_status(db: &Db, id: &str, status: ProductStatus) -> AppResult<()> {
    repo::overwrite_status(db, id, status).await?;
    info!(product_id = id, status = status.as_str(), "product status set");
    Ok(())
}

/// Owner-checked status change used by the HTTP layer.
pub async fn change_status(db: &Db, caller: &str, id: &str, status: ProductStatus) -> AppResult<Stored<Product>> {
    let product = repo::find(db, id).await?;
    owned_by(&product.record, caller)?;
    set_product_status(db, id, status).await?;
    Ok(repo::find(db, id).await?)
}

#[instrument(name = "products.service.delete", skip(db, storage))]
pub async fn delete_product(db: &Db, storage: &dyn ObjectStorage, caller: &str, id: &str) -> AppResult<()> {
    let product = repo::find(db, id).await?;
    owned_by(&product.record, caller)?;
    repo::delete(db, id).await?;
    if let Some(key) = product.record.image_key {
        media::discard_image(storage, &key).await;
    }
    info!(product_id = id, "product deleted");
    Ok(())
}

#[instrument(name = "products.service.set_image", skip(db, storage, body))]
pub async fn set_image(
    db: &Db,
    storage: &dyn ObjectStorage,
    caller: &str,
    id: &str,
    body: Bytes,
    content_type: &str,
) -> AppResult<Stored<Product>> {
    let current = repo::find(db, id).await?;
    owned_by(&current.record, caller)?;
    let key = media::upload_image(storage, "products", id, body, content_type).await?;
    let written = repo::modify(db, id, |p| {
        if let Err(e) = owned_by(p, caller) {
            return Change::Keep(Err(e));
        }
        let previous = p.image_key.replace(key.clone());
        p.updated_at = timestamp::now();
        Change::Write(Ok(previous))
    })
    .await
    .map_err(AppError::from)
    .and_then(|(product, outcome)| outcome.map(|previous| (product, previous)));

    let (product, previous) = match written {
        Ok(done) => done,
        Err(e) => {
            media::discard_image(storage, &key).await;
            return Err(e);
        }
    };
    if let Some(old) = previous {
        media::discard_image(storage, &old).await;
    }
    Ok(product)
}

pub async fn image_url(db: &Db, storage: &dyn ObjectStorage, id: &str, ttl: Duration) -> AppResult<String> {
    let product = repo::find(db, id).await?;
    let key = product
        .record
        .image_key
        .ok_or_else(|| AppError::NotFound(format!("product {id} has no image")))?;
    media::image_url(storage, &key, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        causes::{dto::NewCause, services::create_cause},
        media::MemoryObjectStorage,
        users::services::{create_profile, get_profile, NewProfile},
    };

    async fn user(db: &Db, id: &str, entrepreneur: bool) {
        create_profile(
            db,
            id,
            NewProfile {
                email: format!("{id}@example.com"),
                name: id.into(),
                bio: String::new(),
                tags: vec![],
                is_entrepreneur: entrepreneur,
            },
        )
        .await
        .unwrap();
    }

    fn new_product(price: f64) -> NewProduct {
        NewProduct {
            title: "Handmade mug".into(),
            description: String::new(),
            price,
            category: "Crafts".into(),
            tags: vec![],
            cause_id: None,
            donation_percentage: None,
        }
    }

    #[tokio::test]
    async fn only_entrepreneurs_can_list_products() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        user(&db, "fan", false).await;

        let p = create_product(&db, "shop", new_product(12.5)).await.unwrap();
        assert_eq!(p.record.status, ProductStatus::Available);
        assert_eq!(p.record.category, "crafts");
        assert_eq!(get_profile(&db, "shop").await.unwrap().record.products_created, 1);

        let err = create_product(&db, "fan", new_product(1.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn linked_cause_must_exist() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        let mut np = new_product(10.0);
        np.cause_id = Some("missing".into());
        let err = create_product(&db, "shop", np).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let cause = create_cause(
            &db,
            "shop",
            NewCause {
                title: "Trees".into(),
                description: String::new(),
                tags: vec![],
                goal: 100.0,
            },
        )
        .await
        .unwrap();
        let mut np = new_product(10.0);
        np.cause_id = Some(cause.id.clone());
        np.donation_percentage = Some(101);
        assert!(matches!(
            create_product(&db, "shop", np).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let mut np = new_product(10.0);
        np.cause_id = Some(cause.id.clone());
        np.donation_percentage = Some(20);
        let p = create_product(&db, "shop", np).await.unwrap();
        let filter = ProductFilter {
            cause_id: Some(cause.id),
            ..Default::default()
        };
        assert_eq!(list_products(&db, &filter, None, None).await.unwrap()[0].id, p.id);
    }

    #[tokio::test]
    async fn status_overwrite_is_unconditional_and_idempotent() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        let p = create_product(&db, "shop", new_product(5.0)).await.unwrap();

        set_product_status(&db, &p.id, ProductStatus::Sold).await.unwrap();
        set_product_status(&db, &p.id, ProductStatus::Sold).await.unwrap();
        let once = get_product(&db, &p.id).await.unwrap();
        assert_eq!(once.record.status, ProductStatus::Sold);

        // sold -> available is allowed.
        set_product_status(&db, &p.id, ProductStatus::Available).await.unwrap();
        assert_eq!(get_product(&db, &p.id).await.unwrap().record.status, ProductStatus::Available);

        let err = set_product_status(&db, "ghost", ProductStatus::Sold).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = change_status(&db, "someone", &p.id, ProductStatus::Sold).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn price_filters_and_validation() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        for price in [5.0, 15.0, 25.0] {
            create_product(&db, "shop", new_product(price)).await.unwrap();
        }
        let filter = ProductFilter {
            min_price: Some(10.0),
            max_price: Some(20.0),
            ..Default::default()
        };
        let found = list_products(&db, &filter, None, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record.price, 15.0);

        let inverted = ProductFilter {
            min_price: Some(20.0),
            max_price: Some(10.0),
            ..Default::default()
        };
        assert!(list_products(&db, &inverted, None, None).await.is_err());
        assert!(create_product(&db, "shop", new_product(-1.0)).await.is_err());
    }

    #[tokio::test]
    async fn owner_updates_and_detaches_cause() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        let cause = create_cause(
            &db,
            "shop",
            NewCause {
                title: "Trees".into(),
                description: String::new(),
                tags: vec![],
                goal: 100.0,
            },
        )
        .await
        .unwrap();
        let mut np = new_product(10.0);
        np.cause_id = Some(cause.id);
        np.donation_percentage = Some(10);
        let p = create_product(&db, "shop", np).await.unwrap();

        let err = update_product(&db, "other", &p.id, ProductPatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let p = update_product(
            &db,
            "shop",
            &p.id,
            ProductPatch {
                price: Some(12.0),
                cause_id: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(p.record.price, 12.0);
        let stored = get_product(&db, &p.id).await.unwrap();
        assert_eq!(stored.record.cause_id, None);
        assert_eq!(stored.record.donation_percentage, None);

        let err = update_product(
            &db,
            "shop",
            &p.id,
            ProductPatch {
                donation_percentage: Some(15),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn donation_requires_a_linked_cause() {
        let db = Db::in_memory();
        user(&db, "shop", true).await;
        let mut np = new_product(10.0);
        np.donation_percentage = Some(10);
        let err = create_product(&db, "shop", np).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let cause = create_cause(
            &db,
            "shop",
            NewCause {
                title: "Trees".into(),
                description: String::new(),
                tags: vec![],
                goal: 100.0,
            },
        )
        .await
        .unwrap();
        let mut np = new_product(10.0);
        np.cause_id = Some(cause.id);
        np.donation_percentage = Some(10);
        let p = create_product(&db, "shop", np).await.unwrap();

        // Detaching and setting a percentage in one edit leaves nothing to donate to.
        let err = update_product(
            &db,
            "shop",
            &p.id,
            ProductPatch {
                cause_id: Some(String::new()),
                donation_percentage: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let stored = get_product(&db, &p.id).await.unwrap();
        assert_eq!(stored.version, p.version);
        assert_eq!(stored.record.donation_percentage, Some(10));
    }

    #[tokio::test]
    async fn delete_removes_image() {
        let db = Db::in_memory();
        let storage = MemoryObjectStorage::new();
        user(&db, "shop", true).await;
        let p = create_product(&db, "shop", new_product(1.0)).await.unwrap();
        let p = set_image(&db, &storage, "shop", &p.id, Bytes::from_static(b"img"), "image/webp")
            .await
            .unwrap();
        let first = p.record.image_key.clone().unwrap();
        let p = set_image(&db, &storage, "shop", &p.id, Bytes::from_static(b"img2"), "image/png")
            .await
            .unwrap();
        let key = p.record.image_key.clone().unwrap();
        assert!(storage.object(&first).await.is_none());
        assert_eq!(storage.keys_under(&format!("products/{}/", p.id)).await, vec![key.clone()]);
        assert!(image_url(&db, &storage, &p.id, Duration::from_secs(5)).await.is_ok());

        let err = delete_product(&db, &storage, "other", &p.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        delete_product(&db, &storage, "shop", &p.id).await.unwrap();
        assert!(storage.object(&key).await.is_none());
    }
}
