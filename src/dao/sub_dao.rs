use std::collections::{BTreeMap, BTreeSet};

use crate::{
    address::Template,
    location::Location,
    model::Schema,
    store::{DocumentStore, Fields},
};

use super::{DaoCore, DaoResult, SaveOptions};

/// DAO bound to one sub-collection of a flattened model, like `private` for
/// fields stored at `<parent>/{parentId}/private/<docId>`.
///
/// Works on raw fields. Its reference model is the parent's, pruned to the
/// fields tagged for this sub-collection.
#[derive(Clone)]
pub struct SubDao<S: DocumentStore> {
    core: DaoCore<S>,
    sub_path: String,
    /// Tagged field name to the id of the sub-document holding it.
    fields: BTreeMap<String, String>,
}

impl<S: DocumentStore> SubDao<S> {
    pub(crate) fn new(parent: &DaoCore<S>, sub_path: &str, schema: &Schema) -> DaoResult<Self, S> {
        let fields = schema
            .sub_document_fields()
            .filter(|(_, key)| key.path == sub_path)
            .map(|(field, key)| (field.to_owned(), key.doc_id.clone()))
            .collect::<BTreeMap<_, _>>();

        Ok(SubDao {
            core: DaoCore {
                store: parent.store.clone(),
                template: parent.template.concat(sub_path)?,
                mapper: parent.mapper.pruned(|field| fields.contains_key(field)),
                pre_save: parent.pre_save.clone(),
            },
            sub_path: sub_path.to_owned(),
            fields,
        })
    }

    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    pub fn template(&self) -> &Template {
        &self.core.template
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn doc_ids(&self) -> BTreeSet<String> {
        self.fields.values().cloned().collect()
    }

    /// Does `data` hold any field stored in this sub-collection?
    pub fn contains_some_values_for_me(&self, data: &Fields) -> bool {
        data.keys().any(|key| self.fields.contains_key(key))
    }

    /// Groups the fields of `data` tagged for this sub-collection by
    /// sub-document id. Every known sub-document gets an entry, possibly
    /// empty.
    pub fn split_data_by_doc_id(&self, data: &Fields) -> BTreeMap<String, Fields> {
        let mut split = self
            .fields
            .values()
            .map(|doc_id| (doc_id.clone(), Fields::new()))
            .collect::<BTreeMap<_, _>>();

        for (field, doc_id) in &self.fields {
            if let (Some(value), Some(group)) = (data.get(field), split.get_mut(doc_id)) {
                group.insert(field.clone(), value.clone());
            }
        }

        split
    }

    /// Declared fields of the sub-document at `location`, `None` if it
    /// doesn't exist.
    pub async fn get(&self, location: &Location) -> DaoResult<Option<Fields>, S> {
        Ok(self
            .core
            .read(location)
            .await?
            .map(|raw| self.core.mapper.hydrate(raw.fields).fields))
    }

    /// Returns the fields stored.
    pub async fn create(
        &self,
        data: Fields,
        location: Location,
        options: SaveOptions,
    ) -> DaoResult<Fields, S> {
        Ok(self.core.write_new(data, location, options).await?.fields)
    }

    pub async fn update(&self, data: Fields, location: &Location) -> DaoResult<Fields, S> {
        self.core.write_update(data, location).await
    }

    pub async fn delete(&self, location: &Location) -> DaoResult<(), S> {
        self.core.remove(location).await
    }
}

/// Registry entry of a flattened model: the DAO of one sub-collection and the
/// ids of the sub-documents it holds.
#[derive(Clone)]
pub struct SubDaoEntry<S: DocumentStore> {
    pub dao: SubDao<S>,
    pub ids: BTreeSet<String>,
}
