use std::sync::Arc;

use thiserror::Error;

use crate::store::{
    BlobStore, CodedError, DocumentStore, ErrorCode, Fields, Query, RawDocument, SetOptions,
    StoreResult,
};

#[derive(Debug, Error)]
pub enum GuardedStoreError<E> {
    #[error("{0}")]
    Store(E),

    #[error("{code}: access to {path} denied")]
    Denied { path: String, code: ErrorCode },
}

impl<E: CodedError> CodedError for GuardedStoreError<E> {
    fn code(&self) -> ErrorCode {
        match self {
            GuardedStoreError::Store(e) => e.code(),
            GuardedStoreError::Denied { code, .. } => *code,
        }
    }
}

impl<E> From<E> for GuardedStoreError<E> {
    fn from(value: E) -> Self {
        Self::Store(value)
    }
}

/// Wrap this over a store to refuse access to some paths, the way security
/// rules of a hosted database would.
///
/// Every call on a path for which `deny` holds fails with `code`; queries are
/// checked against the collection path.
///
/// ```
/// use firestash::store::{CodedError, DocumentStore, ErrorCode};
/// use firestash::stores::memory::MemoryStore;
/// use firestash::wrappers::guard::GuardedStore;
///
/// # tokio_test::block_on(async {
/// let store = GuardedStore::new(MemoryStore::new(), ErrorCode::PermissionDenied, |path: &str| {
///     path.starts_with("secrets/")
/// });
///
/// assert_eq!(store.get("public/doc").await.unwrap(), None);
///
/// let err = store.get("secrets/doc").await.unwrap_err();
/// assert_eq!(err.code(), ErrorCode::PermissionDenied);
/// # })
/// ```
pub struct GuardedStore<S: DocumentStore, F: Fn(&str) -> bool> {
    underlying: S,
    code: ErrorCode,
    deny: Arc<F>,
}

impl<S: DocumentStore, F: Fn(&str) -> bool> Clone for GuardedStore<S, F> {
    fn clone(&self) -> Self {
        Self {
            underlying: self.underlying.clone(),
            code: self.code,
            deny: self.deny.clone(),
        }
    }
}

impl<S: DocumentStore, F: Fn(&str) -> bool> GuardedStore<S, F> {
    pub fn new(underlying: S, code: ErrorCode, deny: F) -> Self {
        GuardedStore {
            underlying,
            code,
            deny: Arc::new(deny),
        }
    }

    pub fn underlying(&self) -> &S {
        &self.underlying
    }

    pub fn destruct(self) -> S {
        self.underlying
    }

    fn check(&self, path: &str) -> StoreResult<(), Self> {
        if (self.deny)(path) {
            Err(GuardedStoreError::Denied {
                path: path.to_owned(),
                code: self.code,
            })
        } else {
            Ok(())
        }
    }
}

impl<S: DocumentStore, F: Fn(&str) -> bool> DocumentStore for GuardedStore<S, F> {
    type Error = GuardedStoreError<S::Error>;

    async fn get(&self, path: &str) -> StoreResult<Option<Fields>, Self> {
        self.check(path)?;
        Ok(self.underlying.get(path).await?)
    }

    async fn set(&self, path: &str, fields: &Fields, options: SetOptions) -> StoreResult<(), Self> {
        self.check(path)?;
        Ok(self.underlying.set(path, fields, options).await?)
    }

    async fn update(&self, path: &str, fields: &Fields) -> StoreResult<(), Self> {
        self.check(path)?;
        Ok(self.underlying.update(path, fields).await?)
    }

    async fn delete(&self, path: &str) -> StoreResult<(), Self> {
        self.check(path)?;
        Ok(self.underlying.delete(path).await?)
    }

    async fn query(
        &self,
        collection_path: &str,
        query: &Query,
    ) -> StoreResult<Vec<RawDocument>, Self> {
        self.check(collection_path)?;
        Ok(self.underlying.query(collection_path, query).await?)
    }

    fn new_id(&self, collection_path: &str) -> String {
        self.underlying.new_id(collection_path)
    }

    fn server_timestamp(&self) -> serde_json::Value {
        self.underlying.server_timestamp()
    }
}

impl<S: BlobStore, F: Fn(&str) -> bool> BlobStore for GuardedStore<S, F> {
    async fn delete_blob(&self, path: &str) -> StoreResult<(), Self> {
        self.check(path)?;
        Ok(self.underlying.delete_blob(path).await?)
    }
}

#[cfg(all(test, feature = "memory"))]
mod test {
    use serde_json::json;

    use crate::{
        store::{CodedError, DocumentStore, ErrorCode, Query, SetOptions},
        stores::memory::MemoryStore,
    };

    use super::GuardedStore;

    #[tokio::test]
    async fn test() -> Result<(), anyhow::Error> {
        let store = GuardedStore::new(MemoryStore::new(), ErrorCode::Unavailable, |p: &str| {
            p.ends_with("/locked")
        });

        let fields = json!({"a": 1}).as_object().cloned().unwrap_or_default();

        store.set("docs/open", &fields, SetOptions::default()).await?;
        assert_eq!(store.get("docs/open").await?, Some(fields.clone()));

        let err = store
            .set("docs/locked", &fields, SetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unavailable);
        assert_eq!(store.underlying().document_paths().await, vec!["docs/open"]);

        // underlying errors keep their code
        let err = store.update("docs/missing", &fields).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        assert_eq!(store.query("docs", &Query::default()).await?.len(), 1);

        Ok(())
    }
}
