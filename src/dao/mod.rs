//! Data access objects: typed reads and writes of models stored at the
//! paths of a [`Template`].

use std::{marker::PhantomData, sync::Arc};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    address::{path_kind, split_path, PathKind, Template, SEPARATOR},
    location::{Location, Target},
    model::{
        model_fields, Document, MissingFieldNotifier, Model, ModelMapper, Schema, StoredFile,
    },
    store::{BlobStore, CodedError, DocumentStore, ErrorCode, Fields, Query, RawDocument},
};

pub mod error;
pub mod flattable;
pub mod options;
pub mod sub_dao;
mod untyped;

pub(crate) use untyped::DaoCore;
pub use untyped::PreSave;
pub use error::*;
pub use flattable::*;
pub use options::*;
pub use sub_dao::*;

/// Reads and writes models of type `M` in the collections described by a
/// template.
///
/// ```
/// use firestash::{dao::{Dao, SaveOptions}, location::Location, model::Model};
/// use firestash::stores::memory::MemoryStore;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
/// struct Post {
///     title: String,
/// }
///
/// impl Model for Post {
///     const NAME: &'static str = "Post";
/// }
///
/// # tokio_test::block_on(async {
/// let dao = Dao::<Post, _>::new(MemoryStore::new(), "users/{userId}/posts")?;
///
/// let location = Location::new().at("userId", "ann").id("hello");
/// let post = Post { title: "Hello".to_owned() };
/// dao.create(&post, Some(location.clone().into()), SaveOptions::default()).await?;
///
/// let stored = dao.get(location).await?.unwrap();
/// assert_eq!(stored.path(), "users/ann/posts/hello");
/// assert_eq!(stored.title, "Hello");
///
/// Ok::<(), firestash::dao::DaoError<_>>(())
/// # }).unwrap()
/// ```
pub struct Dao<M, S: DocumentStore> {
    pub(crate) core: DaoCore<S>,
    pub(crate) schema: Schema,
    phantom_model: PhantomData<fn() -> M>,
}

impl<M, S: DocumentStore> Clone for Dao<M, S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            schema: self.schema.clone(),
            phantom_model: PhantomData,
        }
    }
}

impl<M: Model, S: DocumentStore> Dao<M, S> {
    pub fn new(store: S, template: &str) -> DaoResult<Self, S> {
        Self::with_template(store, Template::parse(template)?)
    }

    pub fn with_template(store: S, template: Template) -> DaoResult<Self, S> {
        Ok(Dao {
            core: DaoCore {
                store,
                template,
                mapper: ModelMapper::for_model::<M>(MissingFieldNotifier::new())?,
                pre_save: None,
            },
            schema: M::schema(),
            phantom_model: PhantomData,
        })
    }

    /// Transform applied to the data of every write (including the writes of
    /// sub-documents of a [`FlattableDao`] built from this DAO).
    pub fn with_pre_save(
        mut self,
        pre_save: impl Fn(Fields, &Location) -> Fields + Send + Sync + 'static,
    ) -> Self {
        self.core.pre_save = Some(Arc::new(pre_save));
        self
    }

    pub fn with_notifier(mut self, notifier: MissingFieldNotifier) -> Self {
        self.core.mapper = self.core.mapper.with_notifier(notifier);
        self
    }

    /// Overrides the field tags of `M::schema()`.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

impl<M, S: DocumentStore> Dao<M, S> {
    pub fn template(&self) -> &Template {
        &self.core.template
    }

    pub fn store(&self) -> &S {
        &self.core.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn notifier(&self) -> &MissingFieldNotifier {
        self.core.mapper.notifier()
    }

    /// Fails with [`DaoError::IncompatibleReference`] for a model that was not
    /// read through a template of this shape.
    pub fn location(&self, target: Option<&Target>) -> DaoResult<Location, S> {
        self.core.location(target)
    }

    /// Document path when the target carries an id, collection path otherwise.
    pub fn path(&self, target: Option<&Target>) -> DaoResult<String, S> {
        let location = self.location(target)?;

        Ok(match location.id {
            Some(_) => self.core.template.resolve(&location)?,
            None => self.core.template.collection_path(&location)?,
        })
    }

    pub fn is_compatible(&self, path: &str) -> bool {
        crate::address::is_compatible(&self.core.template, path)
    }

    /// Whether `path` points at a collection or a document of this DAO.
    pub fn path_kind(&self, path: &str) -> DaoResult<PathKind, S> {
        path_kind(&self.core.template, path)
            .ok_or_else(|| DaoError::IncompatibleReference(path.to_owned()))
    }
}

impl<M: Model, S: DocumentStore> Dao<M, S> {
    pub async fn get(&self, target: impl Into<Target>) -> DaoResult<Option<Document<M>>, S> {
        let location = self.location(Some(&target.into()))?;

        match self.core.read(&location).await? {
            Some(raw) => Ok(Some(self.document(raw)?)),
            None => Ok(None),
        }
    }

    /// Reads the document at a concrete path, which must be a document path
    /// compatible with the template.
    pub async fn get_by_path(&self, path: &str) -> DaoResult<Option<Document<M>>, S> {
        let (path, collection_path) = self.split_document_path(path)?;

        match self.core.read_path(&path, collection_path).await? {
            Some(raw) => Ok(Some(self.document(raw)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self, location: &Location, query: &Query) -> DaoResult<Vec<Document<M>>, S> {
        self.core
            .query(location, query)
            .await?
            .into_iter()
            .map(|raw| self.document(raw))
            .collect()
    }

    /// Stores a new document. Without an id in `target`, the store allocates
    /// one. Fails with [`DaoError::Conflict`] if a document already exists at
    /// the given id, unless `options.overwrite` is set.
    pub async fn create(
        &self,
        data: &M,
        target: Option<Target>,
        options: SaveOptions,
    ) -> DaoResult<Document<M>, S> {
        let location = self.location(target.as_ref())?;
        let raw = self
            .core
            .write_new(model_fields(data)?, location, options)
            .await?;

        self.document(raw)
    }

    /// Partial update; every key of `data` must be declared by `M`. Returns
    /// the fields written.
    pub async fn update(&self, data: Fields, target: impl Into<Target>) -> DaoResult<Fields, S> {
        let location = self.location(Some(&target.into()))?;
        self.core.write_update(data, &location).await
    }

    /// Deletes the document. Blobs of file fields are kept; see
    /// [`Dao::delete_with_files`].
    pub async fn delete(&self, target: impl Into<Target>) -> DaoResult<(), S> {
        let location = self.location(Some(&target.into()))?;
        self.warn_kept_files(&location);
        self.core.remove(&location).await
    }

    pub(crate) fn document(&self, raw: RawDocument) -> DaoResult<Document<M>, S> {
        Ok(self
            .core
            .mapper
            .from_stored_document(raw.fields, &raw.collection_path, &raw.id)?)
    }

    pub(crate) fn split_document_path(&self, path: &str) -> DaoResult<(String, String), S> {
        if self.path_kind(path)? != PathKind::Document {
            return Err(DaoError::IncompatibleReference(path.to_owned()));
        }

        let parts = split_path(path);
        let separator = SEPARATOR.to_string();
        let collection_path = parts[..parts.len() - 1].join(&separator);

        Ok((parts.join(&separator), collection_path))
    }

    pub(crate) fn warn_kept_files(&self, location: &Location) {
        let fields = self
            .schema
            .file_fields()
            .filter(|(_, options)| options.delete_on_delete)
            .map(|(field, _)| field)
            .collect::<Vec<_>>();

        if !fields.is_empty() {
            warn!(
                model = self.core.mapper.name(),
                id = location.id.as_deref().unwrap_or_default(),
                ?fields,
                "deleting a document without deleting its files"
            );
        }
    }
}

impl<M: Model, S: BlobStore> Dao<M, S> {
    /// Deletes the blobs of the file fields (those marked delete-on-delete,
    /// unless overridden in `options`), then the document. Blobs that are
    /// already gone are not an error.
    pub async fn delete_with_files(
        &self,
        target: impl Into<Target>,
        options: &DeleteOptions,
    ) -> DaoResult<(), S> {
        let location = self.location(Some(&target.into()))?;

        let Some(raw) = self.core.read(&location).await? else {
            return self.core.remove(&location).await;
        };

        let blobs = self
            .schema
            .file_fields()
            .filter(|(field, file)| {
                options
                    .delete_files
                    .get(*field)
                    .copied()
                    .unwrap_or(file.delete_on_delete)
            })
            .filter_map(|(field, _)| {
                raw.fields
                    .get(field)?
                    .get(StoredFile::STORAGE_PATH)?
                    .as_str()
                    .map(str::to_owned)
            })
            .collect::<Vec<_>>();

        let results = join_all(blobs.iter().map(|blob| self.core.store.delete_blob(blob))).await;

        for (blob, result) in blobs.iter().zip(results) {
            match result {
                Ok(()) => debug!(blob = %blob, "deleted blob"),
                Err(e) if e.code() == ErrorCode::NotFound => {
                    debug!(blob = %blob, "blob already gone")
                }
                Err(e) => return Err(DaoError::Store(e)),
            }
        }

        self.core.remove(&location).await
    }
}
