//! Postgres-backed document store: one JSONB row per document.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{ensure_object, Direction, Document, DocumentStore, FilterOp, Precondition, Query, StoreError};

#[derive(Clone)]
pub struct PgDocumentStore {
    db: PgPool,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    version: i64,
    data: Json<Value>,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Self {
            id: r.id,
            version: r.version,
            data: r.data.0,
        }
    }
}

impl PgDocumentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    async fn current_version(&self, collection: &str, id: &str) -> Result<Option<i64>, StoreError> {
        let v = sqlx::query_scalar::<_, i64>(
            r#"SELECT version FROM documents WHERE collection = $1 AND id = $2"#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(v)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, version, data
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Document::from)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.create_document_with_id(collection, &id, fields).await?;
        Ok(id)
    }

    async fn create_document_with_id(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        ensure_object(&fields)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(fields))
        .execute(&self.db)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(StoreError::already_exists(collection, id));
        }
        debug!(collection, id, "document created");
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        precondition: Precondition,
    ) -> Result<i64, StoreError> {
        if !fields.is_object() {
            return Err(StoreError::Invalid("update must be a JSON object".into()));
        }
        let expected = match precondition {
            Precondition::None => None,
            Precondition::Version(v) => Some(v),
        };

        // `||` on jsonb objects is a top-level merge; the version guard makes
        // the whole read-compare-write a single statement.
        let new_version = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE documents
               SET data = data || $3,
                   version = version + 1,
                   updated_at = now()
             WHERE collection = $1
               AND id = $2
               AND ($4::BIGINT IS NULL OR version = $4)
            RETURNING version
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(fields))
        .bind(expected)
        .fetch_optional(&self.db)
        .await?;

        match (new_version, expected) {
            (Some(v), _) => Ok(v),
            (None, Some(expected)) => match self.current_version(collection, id).await? {
                Some(actual) => Err(StoreError::version_conflict(collection, id, expected, actual)),
                None => Err(StoreError::not_found(collection, id)),
            },
            (None, None) => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let deleted = sqlx::query(r#"DELETE FROM documents WHERE collection = $1 AND id = $2"#)
            .bind(collection)
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let mut qb = build_select(collection, query);
        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

fn build_select<'a>(collection: &'a str, query: &'a Query) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT id, version, data FROM documents WHERE collection = ");
    qb.push_bind(collection);

    for f in &query.filters {
        // jsonb comparison orders numbers numerically and strings lexically.
        qb.push(" AND data -> ");
        qb.push_bind(f.field.as_str());
        match f.op {
            FilterOp::Eq => {
                qb.push(" = ");
                qb.push_bind(Json(f.value.clone()));
            }
            FilterOp::Gte => {
                qb.push(" >= ");
                qb.push_bind(Json(f.value.clone()));
            }
            FilterOp::Lte => {
                qb.push(" <= ");
                qb.push_bind(Json(f.value.clone()));
            }
            FilterOp::ArrayContains => {
                qb.push(" @> ");
                qb.push_bind(Json(Value::Array(vec![f.value.clone()])));
            }
        }
    }

    match &query.order {
        Some(order) => {
            qb.push(" ORDER BY data -> ");
            qb.push_bind(order.field.as_str());
            qb.push(match order.direction {
                Direction::Asc => " ASC NULLS LAST, id ASC",
                Direction::Desc => " DESC NULLS LAST, id ASC",
            });
        }
        None => {
            qb.push(" ORDER BY id ASC");
        }
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit);
    }
    if query.offset > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(query.offset);
    }
    qb
}
