use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::store::{Fields, Timestamp};

use super::{Document, Model, MissingFieldNotifier, Stamps, CREATION_DATE, UPDATE_DATE};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("model {0} doesn't serialize to an object")]
    NotAnObject(String),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Declared fields of `M`: the fields of its serialized default value.
pub fn reference_fields<M: Model>() -> Result<Fields, MappingError> {
    model_fields(&M::default())
}

/// Fields of a model value, as they would be stored.
pub fn model_fields<M: Model>(data: &M) -> Result<Fields, MappingError> {
    match serde_json::to_value(data)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(MappingError::NotAnObject(M::NAME.to_owned())),
    }
}

/// Stored fields sorted out against a reference model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hydrated {
    /// Declared fields present in the stored data, with store timestamps turned
    /// into RFC 3339 strings.
    pub fields: Fields,
    pub stamps: Stamps,
}

/// Turns raw stored fields into model data, for one model type.
///
/// Owns the reference field set and the notifier used to report stored fields
/// the model doesn't declare.
#[derive(Debug, Clone)]
pub struct ModelMapper {
    name: String,
    reference: Fields,
    notifier: MissingFieldNotifier,
}

impl ModelMapper {
    pub fn for_model<M: Model>(notifier: MissingFieldNotifier) -> Result<Self, MappingError> {
        Ok(ModelMapper {
            name: M::NAME.to_owned(),
            reference: reference_fields::<M>()?,
            notifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> &Fields {
        &self.reference
    }

    pub fn notifier(&self) -> &MissingFieldNotifier {
        &self.notifier
    }

    /// Same mapper, restricted to the declared fields for which `keep` holds.
    pub fn pruned(&self, keep: impl Fn(&str) -> bool) -> Self {
        ModelMapper {
            name: self.name.clone(),
            reference: self
                .reference
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn with_notifier(mut self, notifier: MissingFieldNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn hydrate(&self, raw: Fields) -> Hydrated {
        let mut hydrated = Hydrated::default();

        for (key, value) in raw {
            if key.starts_with('_') || key.starts_with('$') {
                continue;
            }

            match key.as_str() {
                CREATION_DATE => hydrated.stamps.creation_date = as_datetime(&value),
                UPDATE_DATE => hydrated.stamps.update_date = as_datetime(&value),
                _ => {}
            }

            if self.reference.contains_key(&key) {
                hydrated.fields.insert(key, native_dates(value));
            } else if key != CREATION_DATE && key != UPDATE_DATE {
                self.notifier.notify(&self.name, &key);
            }
        }

        hydrated
    }

    /// Builds a document from raw stored fields. Declared fields missing from
    /// the stored data keep their default values; undeclared ones are reported
    /// and dropped.
    pub fn from_stored_document<M: DeserializeOwned>(
        &self,
        raw: Fields,
        path: &str,
        id: &str,
    ) -> Result<Document<M>, MappingError> {
        let Hydrated { fields, stamps } = self.hydrate(raw);

        let mut data = self.reference.clone();
        data.extend(fields.clone());

        let model = match serde_json::from_value(Value::Object(data)) {
            Ok(model) => model,
            Err(_) => self.without_drifted_fields(fields)?,
        };

        Ok(Document::new(id.to_owned(), path.to_owned(), stamps, model))
    }

    /// Stored values that no longer fit their declared field are replaced by
    /// the field's default.
    fn without_drifted_fields<M: DeserializeOwned>(&self, fields: Fields) -> Result<M, MappingError> {
        let mut data = self.reference.clone();

        for (key, value) in fields {
            let mut single = self.reference.clone();
            single.insert(key.clone(), value.clone());

            if serde_json::from_value::<M>(Value::Object(single)).is_ok() {
                data.insert(key, value);
            } else {
                warn!(
                    model = %self.name,
                    field = %key,
                    "stored value of {key} doesn't fit model {}, using the default",
                    self.name
                );
            }
        }

        Ok(serde_json::from_value(Value::Object(data))?)
    }

    /// First key of `data` that the model doesn't declare.
    pub fn unknown_field<'a>(&self, data: &'a Fields) -> Option<&'a str> {
        data.keys()
            .find(|key| !self.reference.contains_key(*key))
            .map(String::as_str)
    }
}

/// Builds a document of `M` from raw stored fields; see
/// [`ModelMapper::from_stored_document`].
pub fn from_stored_document<M: Model>(
    raw: Fields,
    path: &str,
    id: &str,
    notifier: &MissingFieldNotifier,
) -> Result<Document<M>, MappingError> {
    ModelMapper::for_model::<M>(notifier.clone())?.from_stored_document(raw, path, id)
}

/// Strips bookkeeping from data about to be stored: every `_`-prefixed key,
/// recursively through nested objects. Arrays and scalars are left untouched.
pub fn to_savable_data(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(savable_fields(fields)),
        other => other,
    }
}

pub fn savable_fields(fields: Fields) -> Fields {
    fields
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, value)| (key, to_savable_data(value)))
        .collect()
}

/// Does every key of `data` exist on the reference model?
pub fn validate_shape(data: &Fields, reference: &Fields) -> bool {
    data.keys().all(|key| reference.contains_key(key))
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        other => Timestamp::from_value(other)?.to_datetime(),
    }
}

fn native_dates(value: Value) -> Value {
    match Timestamp::from_value(&value).and_then(Timestamp::to_datetime) {
        Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => value,
    }
}
