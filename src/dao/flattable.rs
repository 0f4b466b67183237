//! Flattened models: one logical model spread over a base document and
//! sub-documents in sub-collections of it.
//!
//! Fields tagged with [`Schema::sub_document`] are stored in
//! `<collection>/<id>/<sub path>/<doc id>`; every other field stays in the
//! base document. Sub-documents can then be protected with their own access
//! rules, and reads treat the ones the caller isn't allowed to see as absent.
//!
//! Writes touching several documents are not transactional: every branch
//! runs to completion and the first failure is reported, with no rollback of
//! the branches that succeeded.

use std::collections::BTreeMap;

use futures::{future::join_all, join};
use tracing::{debug, error};

use crate::{
    location::{Location, Target},
    model::{model_fields, Document, Model, Schema, SubDocKey},
    store::{DocumentStore, ErrorCode, Fields, Query, RawDocument},
};

use super::{Dao, DaoResult, SaveOptions, SubDao, SubDaoEntry};

/// A [`Dao`] for models with fields stored in sub-documents.
///
/// ```
/// use firestash::{dao::{Dao, FlattableDao, SaveOptions}, model::{Model, Schema}};
/// use firestash::stores::memory::MemoryStore;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
/// struct Employee {
///     name: String,
///     salary: u32,
/// }
///
/// impl Model for Employee {
///     const NAME: &'static str = "Employee";
///
///     fn schema() -> Schema {
///         Schema::new().sub_document("salary", "private", "pay")
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let dao = FlattableDao::new(Dao::<Employee, _>::new(store.clone(), "employees")?)?;
///
/// let bob = Employee { name: "bob".to_owned(), salary: 100 };
/// dao.create(&bob, Some("bob".into()), SaveOptions::default()).await?;
///
/// assert_eq!(
///     store.document_paths().await,
///     vec!["employees/bob", "employees/bob/private/pay"]
/// );
/// assert_eq!(dao.get("bob").await?.map(|e| e.into_data()), Some(bob));
///
/// Ok::<(), firestash::dao::DaoError<_>>(())
/// # }).unwrap()
/// ```
pub struct FlattableDao<M, S: DocumentStore> {
    base: Dao<M, S>,
    sub_daos: BTreeMap<String, SubDaoEntry<S>>,
}

impl<M, S: DocumentStore> Clone for FlattableDao<M, S> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            sub_daos: self.sub_daos.clone(),
        }
    }
}

impl<M: Model, S: DocumentStore> FlattableDao<M, S> {
    /// Builds the sub-DAO registry from the schema of `base`. Sub-DAOs share
    /// its store, pre-save hook and notifier.
    pub fn new(base: Dao<M, S>) -> DaoResult<Self, S> {
        let sub_daos = base
            .schema
            .sub_paths()
            .map(|sub_path| -> DaoResult<_, S> {
                let dao = SubDao::new(&base.core, sub_path, &base.schema)?;
                let ids = dao.doc_ids();
                Ok((sub_path.to_owned(), SubDaoEntry { dao, ids }))
            })
            .collect::<DaoResult<BTreeMap<_, _>, S>>()?;

        if sub_daos.is_empty() {
            error!(
                model = M::NAME,
                "flattable dao for a model without sub-document fields"
            );
        }

        Ok(FlattableDao { base, sub_daos })
    }

    pub fn base(&self) -> &Dao<M, S> {
        &self.base
    }

    /// Sub-collection path to its DAO and sub-document ids.
    pub fn registry(&self) -> &BTreeMap<String, SubDaoEntry<S>> {
        &self.sub_daos
    }

    pub fn sub_dao(&self, sub_path: &str) -> Option<&SubDao<S>> {
        self.sub_daos.get(sub_path).map(|entry| &entry.dao)
    }

    pub async fn get(&self, target: impl Into<Target>) -> DaoResult<Option<Document<M>>, S> {
        let location = self.base.location(Some(&target.into()))?;

        match self.base.core.read(&location).await? {
            Some(raw) => Ok(Some(self.assemble(raw).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_path(&self, path: &str) -> DaoResult<Option<Document<M>>, S> {
        let (path, collection_path) = self.base.split_document_path(path)?;

        match self.base.core.read_path(&path, collection_path).await? {
            Some(raw) => Ok(Some(self.assemble(raw).await?)),
            None => Ok(None),
        }
    }

    /// Queries base documents, then completes every result with its
    /// sub-documents. Filters and ordering only apply to base fields.
    pub async fn list(&self, location: &Location, query: &Query) -> DaoResult<Vec<Document<M>>, S> {
        let found = self.base.core.query(location, query).await?;

        join_all(found.into_iter().map(|raw| self.assemble(raw)))
            .await
            .into_iter()
            .collect()
    }

    /// Creates the base document and every sub-document, including the ones
    /// for which `data` holds nothing but defaults.
    pub async fn create(
        &self,
        data: &M,
        target: Option<Target>,
        options: SaveOptions,
    ) -> DaoResult<Document<M>, S> {
        let core = &self.base.core;
        let mut location = self.base.location(target.as_ref())?;

        let fields = model_fields(data)?;
        core.check_shape(&fields)?;

        // sub-documents need the parent id up front
        if location.id.is_none() {
            let collection_path = core.template.collection_path(&location)?;
            location.id = Some(core.store.new_id(&collection_path));
        }

        let parent = &location;
        let all_fields = &fields;
        let sub_creates = self.sub_daos.values().flat_map(|entry| {
            entry
                .dao
                .split_data_by_doc_id(all_fields)
                .into_iter()
                .map(move |(doc_id, data)| {
                    let key = SubDocKey::new(entry.dao.sub_path(), doc_id.clone());
                    let child = parent.child(doc_id);
                    async move { (key, entry.dao.create(data, child, options).await) }
                })
        });

        let base_data = extract_my_data(&fields, &self.base.schema);
        let (base, subs) = join!(
            core.write_new(base_data, location.clone(), options),
            join_all(sub_creates)
        );

        let base = base?;
        let sub_docs = subs
            .into_iter()
            .map(|(key, result)| Ok((key, result?)))
            .collect::<DaoResult<Vec<_>, S>>()?;

        let fields = merge_sub_documents(&self.base.schema, base.fields, sub_docs);
        self.base.document(RawDocument { fields, ..base })
    }

    /// Partial update. The base document is only written when `data` holds
    /// base fields, and only the sub-documents `data` has fields for are
    /// written. Returns the fields written, across all documents.
    pub async fn update(&self, data: Fields, target: impl Into<Target>) -> DaoResult<Fields, S> {
        let core = &self.base.core;
        let location = self.base.location(Some(&target.into()))?;

        core.check_shape(&data)?;
        core.document_path(&location)?;

        let base_data = extract_my_data(&data, &self.base.schema);
        let base_update = async {
            if base_data.is_empty() {
                Ok(Fields::new())
            } else {
                core.write_update(base_data, &location).await
            }
        };

        let parent = &location;
        let all_fields = &data;
        let sub_updates = self
            .sub_daos
            .values()
            .filter(|entry| entry.dao.contains_some_values_for_me(all_fields))
            .flat_map(|entry| {
                entry
                    .dao
                    .split_data_by_doc_id(all_fields)
                    .into_iter()
                    .filter(|(_, group)| !group.is_empty())
                    .map(move |(doc_id, group)| {
                        let child = parent.child(doc_id);
                        async move { entry.dao.update(group, &child).await }
                    })
            });

        let (base, subs) = join!(base_update, join_all(sub_updates));

        let mut written = base?;
        for result in subs {
            written.extend(result?);
        }

        Ok(written)
    }

    /// Deletes the base document and every sub-document.
    pub async fn delete(&self, target: impl Into<Target>) -> DaoResult<(), S> {
        let core = &self.base.core;
        let location = self.base.location(Some(&target.into()))?;

        core.document_path(&location)?;
        self.base.warn_kept_files(&location);

        let parent = &location;
        let sub_deletes = self.sub_daos.values().flat_map(|entry| {
            entry.ids.iter().map(move |id| {
                let child = parent.child(id.clone());
                async move { entry.dao.delete(&child).await }
            })
        });

        let (base, subs) = join!(core.remove(&location), join_all(sub_deletes));

        base?;
        subs.into_iter().collect::<DaoResult<Vec<()>, S>>()?;

        Ok(())
    }

    /// Reads every known sub-document of the document at `location`,
    /// concurrently. Sub-documents that don't exist or that the store refuses
    /// with [`ErrorCode::PermissionDenied`] are left out; any other failure
    /// fails the whole read once every read has settled.
    pub async fn get_sub_docs(&self, location: &Location) -> DaoResult<Vec<(SubDocKey, Fields)>, S> {
        let reads = self.sub_daos.values().flat_map(|entry| {
            entry.ids.iter().map(move |id| {
                let key = SubDocKey::new(entry.dao.sub_path(), id.clone());
                let child = location.child(id.clone());
                async move { (key, entry.dao.get(&child).await) }
            })
        });

        let mut found = Vec::new();
        for (key, result) in join_all(reads).await {
            match result {
                Ok(Some(fields)) => found.push((key, fields)),
                Ok(None) => {}
                Err(e) if e.code() == Some(ErrorCode::PermissionDenied) => {
                    debug!(sub_path = %key.path, doc_id = %key.doc_id, "sub-document not readable")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(found)
    }

    async fn assemble(&self, raw: RawDocument) -> DaoResult<Document<M>, S> {
        let location = self
            .base
            .core
            .template
            .extract_location(&raw.collection_path, Some(&raw.id))
            .unwrap_or_else(|| Location::with_id(raw.id.clone()));

        let sub_docs = self.get_sub_docs(&location).await?;
        let fields = merge_sub_documents(&self.base.schema, raw.fields, sub_docs);

        self.base.document(RawDocument { fields, ..raw })
    }
}

/// Adds the values of sub-document fields to base fields. Each tagged field
/// is taken from the sub-document its tag names, whatever the order of
/// `sub_docs`.
pub fn merge_sub_documents(
    schema: &Schema,
    mut base: Fields,
    sub_docs: impl IntoIterator<Item = (SubDocKey, Fields)>,
) -> Fields {
    let sub_docs = sub_docs.into_iter().collect::<BTreeMap<_, _>>();

    for (field, key) in schema.sub_document_fields() {
        if let Some(value) = sub_docs.get(key).and_then(|doc| doc.get(field)) {
            base.insert(field.to_owned(), value.clone());
        }
    }

    base
}

/// Fields of `data` stored in the base document: the ones without a
/// sub-document tag.
pub fn extract_my_data(data: &Fields, schema: &Schema) -> Fields {
    data.iter()
        .filter(|(field, _)| schema.sub_document_key(field).is_none())
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

#[cfg(all(test, feature = "memory"))]
mod test {
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use crate::{
        dao::{Dao, DaoError},
        location::{Location, Origin, Target},
        model::{Model, Schema, SubDocKey, CREATION_DATE, UPDATE_DATE},
        store::{DocumentStore, ErrorCode, Fields, Query},
        stores::memory::MemoryStore,
        wrappers::guard::GuardedStore,
    };

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Thing {
        a: i64,
        b: i64,
        c: i64,
    }

    impl Model for Thing {
        const NAME: &'static str = "Thing";

        fn schema() -> Schema {
            Schema::new()
                .sub_document("b", "p1", "d1")
                .sub_document("c", "p1", "d2")
        }
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Plain {
        a: i64,
    }

    impl Model for Plain {
        const NAME: &'static str = "Plain";
    }

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(f) => f,
            _ => unreachable!(),
        }
    }

    fn thing(a: i64, b: i64, c: i64) -> Thing {
        Thing { a, b, c }
    }

    async fn business_fields(store: &MemoryStore, path: &str) -> Result<Value, anyhow::Error> {
        let mut raw = store.get(path).await?.unwrap_or_default();
        raw.remove(CREATION_DATE);
        raw.remove(UPDATE_DATE);
        Ok(Value::Object(raw))
    }

    fn flattable<S: DocumentStore>(store: S) -> Result<FlattableDao<Thing, S>, DaoError<S::Error>> {
        FlattableDao::new(Dao::new(store, "things")?)
    }

    #[tokio::test]
    async fn splits_on_create_and_merges_on_read() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let dao = flattable(store.clone())?;

        assert_eq!(dao.registry().keys().collect::<Vec<_>>(), vec!["p1"]);
        assert_eq!(
            dao.registry()["p1"].ids.iter().collect::<Vec<_>>(),
            vec!["d1", "d2"]
        );

        let created = dao
            .create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;
        assert_eq!(*created, thing(1, 2, 3));

        assert_eq!(
            store.document_paths().await,
            vec!["things/x", "things/x/p1/d1", "things/x/p1/d2"]
        );
        assert_eq!(business_fields(&store, "things/x").await?, json!({"a": 1}));
        assert_eq!(business_fields(&store, "things/x/p1/d1").await?, json!({"b": 2}));
        assert_eq!(business_fields(&store, "things/x/p1/d2").await?, json!({"c": 3}));

        let read = dao.get("x").await?.unwrap();
        assert_eq!(*read, thing(1, 2, 3));
        assert_eq!(read.path(), "things/x");

        let by_path = dao.get_by_path("things/x").await?.unwrap();
        assert_eq!(by_path, read);

        Ok(())
    }

    #[test]
    fn merge_ignores_fetch_order() {
        let schema = Thing::schema();
        let base = fields(json!({"a": 1}));
        let d1 = (SubDocKey::new("p1", "d1"), fields(json!({"b": 2})));
        let d2 = (SubDocKey::new("p1", "d2"), fields(json!({"c": 3})));

        let forward = merge_sub_documents(&schema, base.clone(), vec![d1.clone(), d2.clone()]);
        let reverse = merge_sub_documents(&schema, base, vec![d2, d1]);

        assert_eq!(forward, reverse);
        assert_eq!(Value::Object(forward), json!({"a": 1, "b": 2, "c": 3}));

        let data = fields(json!({"a": 1, "b": 2}));
        assert_eq!(Value::Object(extract_my_data(&data, &schema)), json!({"a": 1}));
    }

    #[tokio::test]
    async fn generated_id_is_shared_by_sub_documents() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let dao = flattable(store.clone())?;

        let created = dao
            .create(&thing(1, 2, 3), None, SaveOptions::default())
            .await?;

        let id = created.id();
        assert_eq!(
            store.document_paths().await,
            vec![
                format!("things/{id}"),
                format!("things/{id}/p1/d1"),
                format!("things/{id}/p1/d2"),
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn failed_sub_document_is_not_rolled_back() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let guarded = GuardedStore::new(store.clone(), ErrorCode::Internal, |path: &str| {
            path.ends_with("p1/d2")
        });
        let dao = flattable(guarded)?;

        let err = dao
            .create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Internal));

        assert_eq!(
            store.document_paths().await,
            vec!["things/x", "things/x/p1/d1"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn unreadable_sub_documents_are_absent() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        flattable(store.clone())?
            .create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;

        let denied = GuardedStore::new(store.clone(), ErrorCode::PermissionDenied, |path: &str| {
            path.ends_with("p1/d2")
        });
        let read = flattable(denied)?.get("x").await?.unwrap();
        assert_eq!(*read, thing(1, 2, 0));

        let unavailable = GuardedStore::new(store.clone(), ErrorCode::Unavailable, |path: &str| {
            path.ends_with("p1/d2")
        });
        let err = flattable(unavailable)?.get("x").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unavailable));

        Ok(())
    }

    #[tokio::test]
    async fn update_only_touches_documents_with_data() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let counting = GuardedStore::new(store.clone(), ErrorCode::Internal, move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        let dao = flattable(counting)?;

        dao.create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;
        calls.store(0, Ordering::SeqCst);

        let err = dao
            .update(fields(json!({"b": 5, "foo": 1})), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DaoError::UnknownField { ref field, .. } if field == "foo"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let written = dao.update(fields(json!({"b": 5})), "x").await?;
        assert_eq!(written["b"], json!(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dao.update(fields(json!({"a": 7, "c": 9})), "x").await?;
        assert_eq!(*dao.get("x").await?.unwrap(), thing(7, 5, 9));

        Ok(())
    }

    #[tokio::test]
    async fn list_and_delete() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let dao = flattable(store.clone())?;

        dao.create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;
        dao.create(&thing(4, 5, 6), Some("y".into()), SaveOptions::default())
            .await?;

        let all = dao.list(&Location::new(), &Query::default()).await?;
        let things = all.iter().map(|d| d.data().clone()).collect::<Vec<_>>();
        assert_eq!(things, vec![thing(1, 2, 3), thing(4, 5, 6)]);

        dao.delete("x").await?;
        assert_eq!(
            store.document_paths().await,
            vec!["things/y", "things/y/p1/d1", "things/y/p1/d2"]
        );
        assert_eq!(dao.get("x").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn pre_save_runs_for_every_document() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let base = Dao::<Thing, _>::new(store.clone(), "things")?.with_pre_save(move |data, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            data
        });
        let dao = FlattableDao::new(base)?;

        dao.create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        Ok(())
    }

    /// Log output of a test, shared with the subscriber writing it.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn model_without_sub_documents() -> Result<(), anyhow::Error> {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let dao = tracing::subscriber::with_default(subscriber, || {
            FlattableDao::new(Dao::<Plain, _>::new(MemoryStore::new(), "plain")?)
        })?;
        assert!(dao.registry().is_empty());
        assert!(dao.sub_dao("p1").is_none());

        let logs = captured.text();
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("without sub-document fields"), "{logs}");
        assert!(logs.contains("model=\"Plain\""), "{logs}");

        // a model with split fields is not flagged
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || flattable(MemoryStore::new()))?;
        assert!(!captured.text().contains("ERROR"));

        Ok(())
    }

    #[tokio::test]
    async fn models_from_other_collections_are_refused() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let dao = flattable(store.clone())?;

        dao.create(&thing(1, 2, 3), Some("x".into()), SaveOptions::default())
            .await?;

        let foreign = Target::Model(Origin {
            id: "x".to_owned(),
            path: "others".to_owned(),
        });
        assert!(matches!(
            dao.get(foreign.clone()).await,
            Err(DaoError::IncompatibleReference(_))
        ));
        assert!(matches!(
            dao.update(fields(json!({"b": 9})), foreign.clone()).await,
            Err(DaoError::IncompatibleReference(_))
        ));
        assert!(matches!(
            dao.delete(foreign).await,
            Err(DaoError::IncompatibleReference(_))
        ));

        assert_eq!(business_fields(&store, "things/x/p1/d1").await?, json!({"b": 2}));

        Ok(())
    }
}
