//! In-memory document and blob store.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    address::{split_path, SEPARATOR},
    store::{
        BlobStore, CodedError, Direction, DocumentStore, ErrorCode, Fields, Filter, FilterOp,
        Offset, Query, RawDocument, SetOptions, Timestamp,
    },
};

pub mod field_path;

use field_path::{merge_fields, FieldPath, FieldPathError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("no document at {0}")]
    NotFound(String),

    #[error("no blob at {0}")]
    BlobNotFound(String),

    #[error("invalid path `{0}`")]
    InvalidPath(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    FieldPath(#[from] FieldPathError),
}

impl CodedError for MemoryStoreError {
    fn code(&self) -> ErrorCode {
        match self {
            MemoryStoreError::NotFound(_) | MemoryStoreError::BlobNotFound(_) => {
                ErrorCode::NotFound
            }
            MemoryStoreError::InvalidPath(_)
            | MemoryStoreError::InvalidQuery(_)
            | MemoryStoreError::FieldPath(_) => ErrorCode::InvalidArgument,
        }
    }
}

/// Documents and blobs kept in shared maps; clones see the same data.
///
/// ```
/// use firestash::store::{DocumentStore, SetOptions};
/// use firestash::stores::memory::MemoryStore;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let fields = json!({"name": "bob"}).as_object().cloned().unwrap_or_default();
///
/// store.set("users/bob", &fields, SetOptions::default()).await?;
/// assert_eq!(store.get("users/bob").await?, Some(fields));
/// assert_eq!(store.get("users/alice").await?, None);
///
/// Ok::<(), firestash::stores::memory::MemoryStoreError>(())
/// # }).unwrap()
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<String, Fields>>>,
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths of every stored document, sorted.
    pub async fn document_paths(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    pub async fn put_blob(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.blobs.write().await.insert(path.to_owned(), data.into());
    }

    pub async fn has_blob(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }
}

fn document_key(path: &str) -> Result<String, MemoryStoreError> {
    let parts = split_path(path);

    if parts.len() % 2 != 0 || parts.iter().any(|p| p.is_empty()) {
        return Err(MemoryStoreError::InvalidPath(path.to_owned()));
    }

    Ok(parts.join(&SEPARATOR.to_string()))
}

fn collection_key(path: &str) -> Result<String, MemoryStoreError> {
    let parts = split_path(path);

    if parts.len() % 2 != 1 || parts.iter().any(|p| p.is_empty()) {
        return Err(MemoryStoreError::InvalidPath(path.to_owned()));
    }

    Ok(parts.join(&SEPARATOR.to_string()))
}

impl DocumentStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn get(&self, path: &str) -> Result<Option<Fields>, Self::Error> {
        let key = document_key(path)?;
        Ok(self.documents.read().await.get(&key).cloned())
    }

    async fn set(&self, path: &str, fields: &Fields, options: SetOptions) -> Result<(), Self::Error> {
        let key = document_key(path)?;
        let mut documents = self.documents.write().await;

        if options.merge {
            if let Some(existing) = documents.get_mut(&key) {
                merge_fields(existing, fields);
                return Ok(());
            }
        }

        documents.insert(key, fields.clone());
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Fields) -> Result<(), Self::Error> {
        let key = document_key(path)?;
        let mut documents = self.documents.write().await;

        let existing = documents
            .get_mut(&key)
            .ok_or_else(|| MemoryStoreError::NotFound(key.clone()))?;

        // dotted keys address nested fields
        for (field, value) in fields {
            FieldPath::parse(field)?.set(existing, value.clone())?;
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), Self::Error> {
        let key = document_key(path)?;
        self.documents.write().await.remove(&key);
        Ok(())
    }

    async fn query(
        &self,
        collection_path: &str,
        query: &Query,
    ) -> Result<Vec<RawDocument>, Self::Error> {
        let collection = collection_key(collection_path)?;
        let prefix = format!("{collection}{SEPARATOR}");

        let filters = query
            .filters
            .iter()
            .map(|f| -> Result<_, MemoryStoreError> { Ok((FieldPath::parse(&f.field)?, f)) })
            .collect::<Result<Vec<_>, _>>()?;

        let mut found = self
            .documents
            .read()
            .await
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains(SEPARATOR))
            .filter(|(_, fields)| filters.iter().all(|(path, f)| matches(path.get(fields), f)))
            .map(|(key, fields)| RawDocument {
                id: key[prefix.len()..].to_owned(),
                collection_path: collection.clone(),
                fields: fields.clone(),
            })
            .collect::<Vec<_>>();

        if let Some(order) = &query.order_by {
            let path = FieldPath::parse(&order.field)?;

            // documents without the field are left out, like ordered queries do
            found.retain(|doc| path.get(&doc.fields).is_some());
            found.sort_by(|a, b| {
                let ord = compare(path.get(&a.fields), path.get(&b.fields))
                    .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(offset) = &query.offset {
            found = apply_offset(found, offset)?;
        }

        if let Some(limit) = query.limit {
            found.truncate(limit);
        }

        Ok(found)
    }

    fn new_id(&self, _collection_path: &str) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

impl BlobStore for MemoryStore {
    async fn delete_blob(&self, path: &str) -> Result<(), Self::Error> {
        match self.blobs.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(MemoryStoreError::BlobNotFound(path.to_owned())),
        }
    }
}

fn apply_offset(
    mut docs: Vec<RawDocument>,
    offset: &Offset,
) -> Result<Vec<RawDocument>, MemoryStoreError> {
    let id = match offset {
        Offset::StartAt(id)
        | Offset::StartAfter(id)
        | Offset::EndAt(id)
        | Offset::EndBefore(id) => id,
    };

    let ix = docs
        .iter()
        .position(|doc| &doc.id == id)
        .ok_or_else(|| MemoryStoreError::InvalidQuery(format!("cursor document {id} not in results")))?;

    Ok(match offset {
        Offset::StartAt(_) => docs.split_off(ix),
        Offset::StartAfter(_) => docs.split_off(ix + 1),
        Offset::EndAt(_) => {
            docs.truncate(ix + 1);
            docs
        }
        Offset::EndBefore(_) => {
            docs.truncate(ix);
            docs
        }
    })
}

/// Total order over stored values: null, booleans, numbers, strings, then
/// everything else by its JSON text. Timestamps order by time.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Object(_), Value::Object(_)) => {
                match (Timestamp::from_value(a), Timestamp::from_value(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => a.to_string().cmp(&b.to_string()),
                }
            }
            _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(Some(a), Some(b)) == Ordering::Equal,
        _ => a == b,
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Object(_), Value::Object(_)) => {
            Timestamp::from_value(a).is_some() && Timestamp::from_value(b).is_some()
        }
        _ => false,
    }
}

fn matches(value: Option<&Value>, filter: &Filter) -> bool {
    let Some(value) = value else {
        return false;
    };
    let expected = &filter.value;

    match filter.op {
        FilterOp::Eq => same(value, expected),
        FilterOp::NotEq => !same(value, expected),
        FilterOp::Lt => comparable(value, expected) && compare(Some(value), Some(expected)).is_lt(),
        FilterOp::Lte => comparable(value, expected) && compare(Some(value), Some(expected)).is_le(),
        FilterOp::Gt => comparable(value, expected) && compare(Some(value), Some(expected)).is_gt(),
        FilterOp::Gte => comparable(value, expected) && compare(Some(value), Some(expected)).is_ge(),
        FilterOp::ArrayContains => match value {
            Value::Array(items) => items.iter().any(|item| same(item, expected)),
            _ => false,
        },
        FilterOp::In => match expected {
            Value::Array(options) => options.iter().any(|option| same(value, option)),
            _ => false,
        },
    }
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value};

    use crate::store::{Direction, DocumentStore, ErrorCode, Filter, FilterOp, Offset, Query};

    use super::*;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(f) => f,
            _ => unreachable!(),
        }
    }

    async fn seeded() -> Result<MemoryStore, MemoryStoreError> {
        let store = MemoryStore::new();

        for (id, age, tags) in [
            ("ann", 31, json!(["admin"])),
            ("bob", 25, json!([])),
            ("cid", 40, json!(["admin", "ops"])),
            ("dan", 25, json!(["ops"])),
        ] {
            store
                .set(
                    &format!("users/{id}"),
                    &fields(json!({"age": age, "tags": tags, "profile": {"name": id}})),
                    SetOptions::default(),
                )
                .await?;
        }

        store
            .set("users/ann/posts/p1", &fields(json!({"age": 1})), SetOptions::default())
            .await?;

        Ok(store)
    }

    fn ids(docs: &[RawDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn set_merge_and_update() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();

        store
            .set("a/1", &fields(json!({"x": {"y": 1}, "z": 1})), SetOptions::default())
            .await?;
        store
            .set("a/1", &fields(json!({"x": {"w": 2}})), SetOptions { merge: true })
            .await?;
        assert_eq!(
            store.get("a/1").await?,
            Some(fields(json!({"x": {"y": 1, "w": 2}, "z": 1})))
        );

        store.update("a/1", &fields(json!({"x.y": 5, "z": 2}))).await?;
        assert_eq!(
            store.get("a/1").await?,
            Some(fields(json!({"x": {"y": 5, "w": 2}, "z": 2})))
        );

        store
            .set("a/1", &fields(json!({"q": 1})), SetOptions { merge: false })
            .await?;
        assert_eq!(store.get("a/1").await?, Some(fields(json!({"q": 1}))));

        let err = store.update("a/2", &fields(json!({"q": 1}))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = store.get("a").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        store.delete("a/1").await?;
        assert_eq!(store.get("a/1").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn query_filters() -> Result<(), anyhow::Error> {
        let store = seeded().await?;

        let all = store.query("users", &Query::default()).await?;
        assert_eq!(ids(&all), vec!["ann", "bob", "cid", "dan"]);
        assert_eq!(all[0].collection_path, "users");

        let q = Query::default().filter(Filter::new("age", FilterOp::Eq, 25));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["bob", "dan"]);

        let q = Query::default().filter(Filter::new("age", FilterOp::Gt, 30));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["ann", "cid"]);

        let q = Query::default().filter(Filter::new("tags", FilterOp::ArrayContains, "ops"));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["cid", "dan"]);

        let q = Query::default().filter(Filter::new("profile.name", FilterOp::In, json!(["bob", "cid"])));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["bob", "cid"]);

        let q = Query::default()
            .filter(Filter::new("age", FilterOp::Lte, 31))
            .filter(Filter::new("age", FilterOp::NotEq, 25));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["ann"]);

        let posts = store.query("users/ann/posts", &Query::default()).await?;
        assert_eq!(ids(&posts), vec!["p1"]);

        Ok(())
    }

    #[tokio::test]
    async fn query_order_cursor_limit() -> Result<(), anyhow::Error> {
        let store = seeded().await?;

        let q = Query::default().order_by("age", Direction::Desc);
        assert_eq!(ids(&store.query("users", &q).await?), vec!["cid", "ann", "dan", "bob"]);

        let q = Query::default()
            .order_by("age", Direction::Asc)
            .offset(Offset::StartAfter("dan".to_owned()))
            .limit(1);
        assert_eq!(ids(&store.query("users", &q).await?), vec!["ann"]);

        let q = Query::default()
            .order_by("age", Direction::Asc)
            .offset(Offset::EndBefore("ann".to_owned()));
        assert_eq!(ids(&store.query("users", &q).await?), vec!["bob", "dan"]);

        let q = Query::default().offset(Offset::StartAt("nobody".to_owned()));
        assert!(store.query("users", &q).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn timestamps_order_and_filter_by_time() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();

        for (id, seconds, nanos) in [("a", 100, 0), ("b", 10, 5), ("c", 9, 900), ("d", 10, 40)] {
            let created = Timestamp { seconds, nanos }.to_value();
            store
                .set(
                    &format!("events/{id}"),
                    &fields(json!({"creationDate": created})),
                    SetOptions::default(),
                )
                .await?;
        }

        let q = Query::default().order_by("creationDate", Direction::Asc);
        assert_eq!(ids(&store.query("events", &q).await?), vec!["c", "b", "d", "a"]);

        let q = Query::default()
            .order_by("creationDate", Direction::Desc)
            .offset(Offset::StartAfter("a".to_owned()))
            .limit(2);
        assert_eq!(ids(&store.query("events", &q).await?), vec!["d", "b"]);

        let after = Timestamp { seconds: 10, nanos: 0 }.to_value();
        let q = Query::default().filter(Filter::new("creationDate", FilterOp::Gt, after.clone()));
        assert_eq!(ids(&store.query("events", &q).await?), vec!["a", "b", "d"]);

        let q = Query::default().filter(Filter::new("creationDate", FilterOp::Lt, after));
        assert_eq!(ids(&store.query("events", &q).await?), vec!["c"]);

        // a plain object is not a point in time
        let q = Query::default().filter(Filter::new("creationDate", FilterOp::Gt, json!({"seconds": 1})));
        assert!(store.query("events", &q).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn blobs() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.put_blob("avatars/bob.png", b"png".to_vec()).await;

        assert!(store.has_blob("avatars/bob.png").await);
        store.delete_blob("avatars/bob.png").await?;
        assert!(!store.has_blob("avatars/bob.png").await);

        let err = store.delete_blob("avatars/bob.png").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        Ok(())
    }
}
