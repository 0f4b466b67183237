use std::sync::Arc;

use tracing::debug;

use crate::{
    address::{path_kind, PathKind, Template},
    location::{get_location, Location, Target},
    model::{savable_fields, ModelMapper, CREATION_DATE, UPDATE_DATE},
    store::{DocumentStore, Fields, Query, RawDocument, SetOptions},
};

use super::{DaoError, DaoResult, SaveOptions};

/// Transform applied to the data of every write, right before it is stored.
pub type PreSave = Arc<dyn Fn(Fields, &Location) -> Fields + Send + Sync>;

/// Untyped single-collection plumbing shared by [`Dao`](super::Dao) and
/// [`SubDao`](super::SubDao).
#[derive(Clone)]
pub(crate) struct DaoCore<S> {
    pub(crate) store: S,
    pub(crate) template: Template,
    pub(crate) mapper: ModelMapper,
    pub(crate) pre_save: Option<PreSave>,
}

impl<S: DocumentStore> DaoCore<S> {
    /// Like [`get_location`], but refuses a model read from a collection this
    /// template cannot have produced.
    pub(crate) fn location(&self, target: Option<&Target>) -> DaoResult<Location, S> {
        if let Some(Target::Model(origin)) = target {
            if path_kind(&self.template, &origin.path) != Some(PathKind::Collection) {
                return Err(DaoError::IncompatibleReference(origin.path.clone()));
            }
        }

        Ok(get_location(target, &self.template))
    }

    pub(crate) fn document_path(&self, location: &Location) -> DaoResult<String, S> {
        if location.id.is_none() {
            return Err(DaoError::MissingParameter("id"));
        }

        Ok(self.template.resolve(location)?)
    }

    pub(crate) fn check_shape(&self, data: &Fields) -> DaoResult<(), S> {
        match self.mapper.unknown_field(data) {
            Some(field) => {
                tracing::error!(
                    model = self.mapper.name(),
                    field,
                    "refusing to write a field that is not declared in the model"
                );
                Err(DaoError::UnknownField {
                    model: self.mapper.name().to_owned(),
                    field: field.to_owned(),
                })
            }
            None => Ok(()),
        }
    }

    pub(crate) async fn read(&self, location: &Location) -> DaoResult<Option<RawDocument>, S> {
        let path = self.document_path(location)?;
        let collection_path = self.template.collection_path(location)?;

        self.read_path(&path, collection_path).await
    }

    pub(crate) async fn read_path(
        &self,
        path: &str,
        collection_path: String,
    ) -> DaoResult<Option<RawDocument>, S> {
        debug!(path = %path, "get document");

        let Some(fields) = self.store.get(path).await.map_err(DaoError::Store)? else {
            return Ok(None);
        };

        let id = path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();

        Ok(Some(RawDocument {
            id,
            collection_path,
            fields,
        }))
    }

    /// Creates a document. Without an id in `location`, one is allocated by the
    /// store. Returns what was stored.
    pub(crate) async fn write_new(
        &self,
        data: Fields,
        mut location: Location,
        options: SaveOptions,
    ) -> DaoResult<RawDocument, S> {
        self.check_shape(&data)?;
        let collection_path = self.template.collection_path(&location)?;

        if let (Some(id), false) = (&location.id, options.overwrite) {
            if self.read(&location).await?.is_some() {
                return Err(DaoError::Conflict { id: id.clone() });
            }
        }

        let id = match location.id.clone() {
            Some(id) => id,
            None => {
                let id = self.store.new_id(&collection_path);
                location.id = Some(id.clone());
                id
            }
        };

        let mut data = data;
        let now = self.store.server_timestamp();
        data.insert(CREATION_DATE.to_owned(), now.clone());
        data.insert(UPDATE_DATE.to_owned(), now);

        let fields = savable_fields(self.apply_pre_save(data, &location));
        let path = self.template.resolve(&location)?;

        debug!(path = %path, overwrite = options.overwrite, "set document");
        self.store
            .set(
                &path,
                &fields,
                SetOptions {
                    merge: !options.overwrite,
                },
            )
            .await
            .map_err(DaoError::Store)?;

        Ok(RawDocument {
            id,
            collection_path,
            fields,
        })
    }

    /// Returns what was written.
    pub(crate) async fn write_update(
        &self,
        data: Fields,
        location: &Location,
    ) -> DaoResult<Fields, S> {
        self.check_shape(&data)?;
        let path = self.document_path(location)?;

        let mut data = data;
        data.insert(UPDATE_DATE.to_owned(), self.store.server_timestamp());
        let fields = savable_fields(self.apply_pre_save(data, location));

        debug!(path = %path, "update document");
        self.store
            .update(&path, &fields)
            .await
            .map_err(DaoError::Store)?;

        Ok(fields)
    }

    pub(crate) async fn remove(&self, location: &Location) -> DaoResult<(), S> {
        let path = self.document_path(location)?;

        debug!(path = %path, "delete document");
        self.store.delete(&path).await.map_err(DaoError::Store)
    }

    pub(crate) async fn query(
        &self,
        location: &Location,
        query: &Query,
    ) -> DaoResult<Vec<RawDocument>, S> {
        let collection_path = self.template.collection_path(location)?;

        debug!(path = %collection_path, "query collection");
        self.store
            .query(&collection_path, query)
            .await
            .map_err(DaoError::Store)
    }

    fn apply_pre_save(&self, data: Fields, location: &Location) -> Fields {
        match &self.pre_save {
            Some(pre_save) => pre_save(data, location),
            None => data,
        }
    }
}
