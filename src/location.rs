use std::collections::BTreeMap;

use derive_more::From;

use crate::address::{Template, PARENT_ID};

/// Where a document lives: values for the placeholders of a template, plus
/// optionally the document id.
///
/// `parentId` is an ordinary placeholder value, used by sub-collection
/// templates (see [`Template::concat`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub id: Option<String>,
    values: BTreeMap<String, String>,
}

impl Location {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Location {
            id: Some(id.into()),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style placeholder value.
    pub fn at(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style document id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.get(PARENT_ID)
    }

    /// Location of a document in a sub-collection of this document: same
    /// placeholder values, `parentId` set to this id, and `id` set to `child_id`.
    pub fn child(&self, child_id: impl Into<String>) -> Self {
        let mut child = self.clone();
        if let Some(id) = &self.id {
            child.set(PARENT_ID, id.clone());
        }
        child.id = Some(child_id.into());
        child
    }

    /// Same location, without the document id (the collection).
    pub fn collection(&self) -> Self {
        Location {
            id: None,
            values: self.values.clone(),
        }
    }
}

/// Identity of a document read through a DAO: its id and the concrete path of
/// the collection it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub id: String,
    pub path: String,
}

/// The ways a caller can point at a document (or a collection).
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum Target {
    /// A bare document id; the template must not need any other value.
    Id(String),
    Location(Location),
    /// A document previously read or written through a DAO.
    Model(Origin),
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Id(value.to_owned())
    }
}

impl From<&String> for Target {
    fn from(value: &String) -> Self {
        Target::Id(value.clone())
    }
}

impl Target {
    /// Normalizes into a [`Location`]. No I/O.
    pub fn resolve(&self, template: &Template) -> Location {
        match self {
            Target::Id(id) => Location::with_id(id.clone()),
            Target::Location(location) => location.clone(),
            Target::Model(origin) => template
                .extract_location(&origin.path, Some(&origin.id))
                .unwrap_or_else(|| Location::with_id(origin.id.clone())),
        }
    }
}

/// Normalizes an optional target into a [`Location`]; nothing means the empty
/// location.
pub fn get_location(target: Option<&Target>, template: &Template) -> Location {
    target
        .map(|target| target.resolve(template))
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatches_every_target_shape() {
        let t = Template::parse("orgs/{orgId}/members").unwrap();

        assert_eq!(get_location(None, &t), Location::new());
        assert_eq!(
            get_location(Some(&"bob".into()), &t),
            Location::with_id("bob")
        );

        let explicit = Location::new().at("orgId", "acme").id("bob");
        assert_eq!(
            get_location(Some(&Target::from(explicit.clone())), &t),
            explicit
        );

        let origin = Origin {
            id: "bob".to_owned(),
            path: "orgs/acme/members".to_owned(),
        };
        assert_eq!(get_location(Some(&origin.into()), &t), explicit);
    }

    #[test]
    fn child_location_carries_parent() {
        let parent = Location::new().at("orgId", "acme").id("bob");
        let child = parent.child("d1");

        assert_eq!(child.parent_id(), Some("bob"));
        assert_eq!(child.get("orgId"), Some("acme"));
        assert_eq!(child.id.as_deref(), Some("d1"));
        assert_eq!(parent.collection().id, None);
    }
}
