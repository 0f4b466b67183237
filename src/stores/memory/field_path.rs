use derive_more::{Display, From};
use serde_json::Value;
use thiserror::Error;

use crate::store::Fields;

#[derive(From, Display, Debug, Error, Clone, PartialEq, Eq)]
pub struct FieldPathError(String);

/// A dotted path into the fields of a document, like `address.city`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, FieldPathError> {
        let keys = path
            .split('.')
            .map(|key| {
                if key.is_empty() {
                    Err(FieldPathError(format!("empty key in field path `{path}`")))
                } else {
                    Ok(key.to_owned())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FieldPath(keys))
    }

    /// Value at this path, `None` if any key on the way is missing or isn't an
    /// object.
    pub fn get<'a>(&self, fields: &'a Fields) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut cur = fields.get(first)?;

        for key in rest {
            cur = match cur {
                Value::Object(map) => map.get(key)?,
                _ => return None,
            };
        }

        Some(cur)
    }

    /// Sets the value at this path, creating intermediate objects on the way.
    pub fn set(&self, fields: &mut Fields, value: Value) -> Result<(), FieldPathError> {
        let Some((last, init)) = self.0.split_last() else {
            return Err(FieldPathError("empty field path".to_owned()));
        };

        let mut cur = fields;
        for key in init {
            let next = cur
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Fields::new()));

            if next.is_null() {
                *next = Value::Object(Fields::new());
            }

            cur = match next {
                Value::Object(map) => map,
                other => {
                    return Err(FieldPathError(format!(
                        "incompatible value at key {key}: {other}"
                    )))
                }
            };
        }

        cur.insert(last.clone(), value);
        Ok(())
    }
}

/// Deep merge of `patch` into `target`: nested objects are merged key by key,
/// anything else is replaced.
pub fn merge_fields(target: &mut Fields, patch: &Fields) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_fields(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
