use std::collections::BTreeMap;

/// Which sub-document a flattened field is stored in: the sub-collection path
/// (relative to the parent document) and the document id inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubDocKey {
    pub path: String,
    pub doc_id: String,
}

impl SubDocKey {
    pub fn new(path: impl Into<String>, doc_id: impl Into<String>) -> Self {
        SubDocKey {
            path: path.into(),
            doc_id: doc_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOptions {
    /// Delete the stored blob when the owning document is deleted.
    pub delete_on_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTag {
    SubDocument(SubDocKey),
    /// The field holds a file object (with a `storagePath`) stored in a blob store.
    File(FileOptions),
    /// The field mirrors a property of the authentication provider's user.
    AuthUser,
}

/// Per-model field tags, looked up by field name. A field carries at most one tag.
///
/// ```
/// use firestash::model::{FileOptions, Schema};
///
/// let schema = Schema::new()
///     .sub_document("salary", "private", "hr")
///     .file("avatar", FileOptions { delete_on_delete: true })
///     .auth_user("email");
///
/// assert!(schema.has_tag("salary"));
/// assert_eq!(schema.sub_paths().collect::<Vec<_>>(), vec!["private"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tags: BTreeMap<String, FieldTag>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_field(mut self, field: impl Into<String>, tag: FieldTag) -> Self {
        self.tags.insert(field.into(), tag);
        self
    }

    pub fn sub_document(
        self,
        field: impl Into<String>,
        path: impl Into<String>,
        doc_id: impl Into<String>,
    ) -> Self {
        self.tag_field(field, FieldTag::SubDocument(SubDocKey::new(path, doc_id)))
    }

    pub fn file(self, field: impl Into<String>, options: FileOptions) -> Self {
        self.tag_field(field, FieldTag::File(options))
    }

    pub fn auth_user(self, field: impl Into<String>) -> Self {
        self.tag_field(field, FieldTag::AuthUser)
    }

    pub fn has_tag(&self, field: &str) -> bool {
        self.tags.contains_key(field)
    }

    pub fn tag(&self, field: &str) -> Option<&FieldTag> {
        self.tags.get(field)
    }

    pub fn sub_document_key(&self, field: &str) -> Option<&SubDocKey> {
        match self.tags.get(field) {
            Some(FieldTag::SubDocument(key)) => Some(key),
            _ => None,
        }
    }

    /// `(field, key)` for every field stored in a sub-document.
    pub fn sub_document_fields(&self) -> impl Iterator<Item = (&str, &SubDocKey)> {
        self.tags.iter().filter_map(|(field, tag)| match tag {
            FieldTag::SubDocument(key) => Some((field.as_str(), key)),
            _ => None,
        })
    }

    /// Distinct sub-collection paths, sorted.
    pub fn sub_paths(&self) -> impl Iterator<Item = &str> {
        let mut paths: Vec<&str> = self
            .sub_document_fields()
            .map(|(_, key)| key.path.as_str())
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths.into_iter()
    }

    pub fn file_fields(&self) -> impl Iterator<Item = (&str, &FileOptions)> {
        self.tags.iter().filter_map(|(field, tag)| match tag {
            FieldTag::File(options) => Some((field.as_str(), options)),
            _ => None,
        })
    }

    pub fn auth_user_fields(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|(_, tag)| matches!(tag, FieldTag::AuthUser))
            .map(|(field, _)| field.as_str())
    }
}
