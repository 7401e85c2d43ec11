use thiserror::Error;

/// Failures surfaced by a [`DocumentStore`](super::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("malformed document {collection}/{id}: {source}")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid document: {0}")]
    Invalid(String),

    #[error("document store unavailable: {0}")]
    Remote(#[source] anyhow::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(collection: &str, id: &str) -> Self {
        Self::AlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn version_conflict(collection: &str, id: &str, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
            expected,
            actual,
        }
    }

    pub fn remote(err: impl Into<anyhow::Error>) -> Self {
        Self::Remote(err.into())
    }

    /// Only remote failures may succeed when repeated unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Remote(anyhow::Error::new(e).context("postgres"))
    }
}
