//! The uniform document-collection interface external callers (the
//! shutdown manager's fallback-family lookups, an operator console's
//! `environment show <id>`) go through rather than touching Postgres
//! directly.
//!
//! Grounded on the teacher's `Schema`/`Hydrate` split between "what a
//! table is" and "how to load one back": `Schema` there paired a
//! `&'static str` table name with DDL and `Hydrate` loaded a typed row
//! back out. Here a `Collection<T>` pairs a table name with a typed
//! `document(id)` lookup, generalized from fixed SQL columns to an
//! opaque JSONB blob, since documents (social/environment data) have no
//! column shape the registry needs to know about.
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
    #[error("document {0} is not valid {1}")]
    Malformed(String, &'static str),
}

/// A named collection of JSON documents, each addressed by a string id.
#[async_trait]
pub trait Collection<T>: Send + Sync {
    /// Fetches and decodes the document at `id`, or `None` if absent.
    async fn document(&self, id: &str) -> Result<Option<T>, DocError>;
    /// Upserts `value` at `id`.
    async fn put(&self, id: &str, value: &T) -> Result<(), DocError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal in-memory `Collection` used only to exercise the trait's
    /// shape; the real implementation is [`crate::PostgresCollection`].
    #[derive(Default)]
    struct MemCollection<T> {
        rows: Mutex<HashMap<String, T>>,
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> Collection<T> for MemCollection<T> {
        async fn document(&self, id: &str) -> Result<Option<T>, DocError> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }
        async fn put(&self, id: &str, value: &T) -> Result<(), DocError> {
            self.rows.lock().unwrap().insert(id.to_string(), value.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn put_then_document_round_trips() {
        let collection: MemCollection<String> = MemCollection::default();
        collection.put("p1", &"hello".to_string()).await.unwrap();
        assert_eq!(collection.document("p1").await.unwrap().as_deref(), Some("hello"));
        assert!(collection.document("missing").await.unwrap().is_none());
    }
}
