use std::fmt::{Debug, Display};

use chrono::{DateTime, TimeZone, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Raw field map of a stored document.
pub type Fields = Map<String, Value>;

/// Discriminates failures coming back from a store client.
///
/// The DAO layer only ever branches on `PermissionDenied` (optional sub-document
/// reads) and `NotFound` (blob deletion); every other code is passed through.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[display(fmt = "permission-denied")]
    PermissionDenied,
    #[display(fmt = "not-found")]
    NotFound,
    #[display(fmt = "already-exists")]
    AlreadyExists,
    #[display(fmt = "invalid-argument")]
    InvalidArgument,
    #[display(fmt = "unavailable")]
    Unavailable,
    #[display(fmt = "internal")]
    Internal,
}

pub trait CodedError: std::error::Error + Send + Sync + 'static {
    fn code(&self) -> ErrorCode;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge into an existing document instead of replacing it.
    pub merge: bool,
}

/// A document as returned by the store: its id, the path of the collection it
/// lives in, and its raw fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub collection_path: String,
    pub fields: Fields,
}

impl RawDocument {
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection_path, self.id)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    #[display(fmt = "==")]
    Eq,
    #[display(fmt = "!=")]
    NotEq,
    #[display(fmt = "<")]
    Lt,
    #[display(fmt = "<=")]
    Lte,
    #[display(fmt = ">")]
    Gt,
    #[display(fmt = ">=")]
    Gte,
    #[display(fmt = "array-contains")]
    ArrayContains,
    #[display(fmt = "in")]
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Dotted path into the document, e.g. `address.city`.
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Cursor for paginated queries, anchored on a document id of the queried
/// collection. Only one cursor can be used per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offset {
    StartAt(String),
    StartAfter(String),
    EndAt(String),
    EndBefore(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub offset: Option<Offset>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Store-native timestamp. Persisted as `{"$timestamp": {"seconds", "nanos"}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const KEY: &'static str = "$timestamp";

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn to_value(self) -> Value {
        json!({ "$timestamp": { "seconds": self.seconds, "nanos": self.nanos } })
    }

    /// Recognizes the store-native timestamp shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }

        serde_json::from_value(obj.get(Self::KEY)?.clone()).ok()
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp {
            seconds: value.timestamp(),
            nanos: value.timestamp_subsec_nanos(),
        }
    }
}

/// Document database driver.
///
/// This is what you need to implement to put the DAOs on top of another
/// database. Paths are `/`-separated, alternating collection and document
/// segments, without leading or trailing separator.
pub trait DocumentStore: Clone {
    type Error: CodedError + Debug + Display;

    /// `None` means the document doesn't exist.
    async fn get(&self, path: &str) -> StoreResult<Option<Fields>, Self>;

    async fn set(&self, path: &str, fields: &Fields, options: SetOptions) -> StoreResult<(), Self>;

    /// Merges `fields` into an existing document. Fails with
    /// [`ErrorCode::NotFound`] if there is none.
    async fn update(&self, path: &str, fields: &Fields) -> StoreResult<(), Self>;

    async fn delete(&self, path: &str) -> StoreResult<(), Self>;

    async fn query(&self, collection_path: &str, query: &Query)
        -> StoreResult<Vec<RawDocument>, Self>;

    /// Allocates a fresh document id in a collection without writing anything.
    fn new_id(&self, collection_path: &str) -> String;

    /// Value written for creation/update stamps.
    fn server_timestamp(&self) -> Value {
        Timestamp::now().to_value()
    }
}

/// Blob storage, for models with file properties.
pub trait BlobStore: DocumentStore {
    /// Fails with [`ErrorCode::NotFound`] if nothing is stored at `path`.
    async fn delete_blob(&self, path: &str) -> StoreResult<(), Self>;
}

pub type StoreResult<V, S> = Result<V, <S as DocumentStore>::Error>;
