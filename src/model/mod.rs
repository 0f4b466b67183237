//! Models and their stored representation.
//!
//! A [`Model`] is a plain serde record. Everything the DAOs know about where
//! it comes from lives in the [`Document`] envelope around it, never in the
//! record itself, so the record is always safe to persist as is.

use chrono::{DateTime, Utc};
use derive_more::Deref;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::location::{Origin, Target};

pub mod mapper;
pub mod notifier;
pub mod schema;

pub use mapper::*;
pub use notifier::*;
pub use schema::*;

/// Field holding the creation stamp in stored documents.
pub const CREATION_DATE: &str = "creationDate";
/// Field holding the last-update stamp in stored documents.
pub const UPDATE_DATE: &str = "updateDate";

/// A type that can be stored through a DAO.
///
/// `Default` plays the role of the reference model: the fields of the
/// serialized default value are the fields the model declares, and any other
/// key is refused on writes.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use firestash::model::{Model, Schema};
///
/// #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
/// struct Member {
///     name: String,
///     salary: u32,
/// }
///
/// impl Model for Member {
///     const NAME: &'static str = "Member";
///
///     fn schema() -> Schema {
///         Schema::new().sub_document("salary", "private", "hr")
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default {
    const NAME: &'static str;

    fn schema() -> Schema {
        Schema::default()
    }
}

/// A model together with its identity.
///
/// Dereferences to the model.
#[derive(Debug, Clone, PartialEq, Deref)]
pub struct Document<M> {
    id: String,
    path: String,
    creation_date: Option<DateTime<Utc>>,
    update_date: Option<DateTime<Utc>>,

    #[deref]
    data: M,
}

impl<M> Document<M> {
    pub(crate) fn new(id: String, path: String, stamps: Stamps, data: M) -> Self {
        Document {
            id,
            path,
            creation_date: stamps.creation_date,
            update_date: stamps.update_date,
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the collection the document was read from or written to.
    pub fn collection_path(&self) -> &str {
        &self.path
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.path, self.id)
    }

    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_date
    }

    pub fn update_date(&self) -> Option<DateTime<Utc>> {
        self.update_date
    }

    pub fn data(&self) -> &M {
        &self.data
    }

    pub fn into_data(self) -> M {
        self.data
    }

    pub fn origin(&self) -> Origin {
        Origin {
            id: self.id.clone(),
            path: self.path.clone(),
        }
    }
}

impl<M> From<&Document<M>> for Target {
    fn from(value: &Document<M>) -> Self {
        Target::Model(value.origin())
    }
}

/// Value of a file field: where the blob lives in the blob store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub storage_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl StoredFile {
    pub const STORAGE_PATH: &'static str = "storagePath";
}

/// Creation and update stamps lifted out of stored fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stamps {
    pub creation_date: Option<DateTime<Utc>>,
    pub update_date: Option<DateTime<Utc>>,
}
