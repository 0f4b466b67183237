use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Replace an existing document instead of failing with a conflict.
    pub overwrite: bool,
}

impl SaveOptions {
    pub fn overwrite() -> Self {
        SaveOptions { overwrite: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Per-field override of [`FileOptions::delete_on_delete`](crate::model::FileOptions).
    pub delete_files: BTreeMap<String, bool>,
}

impl DeleteOptions {
    pub fn delete_file(mut self, field: impl Into<String>, delete: bool) -> Self {
        self.delete_files.insert(field.into(), delete);
        self
    }
}
