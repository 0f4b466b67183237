use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

/// Warns about stored fields that the model doesn't declare, once per
/// `(model, field)` pair for the lifetime of the notifier.
///
/// Clones share the same record, so one notifier can be handed to several DAOs.
#[derive(Debug, Clone, Default)]
pub struct MissingFieldNotifier {
    notified: Arc<Mutex<BTreeSet<(String, String)>>>,
}

impl MissingFieldNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a warning was emitted by this call.
    pub fn notify(&self, model: &str, field: &str) -> bool {
        let first = self
            .notified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((model.to_owned(), field.to_owned()));

        if first {
            tracing::warn!(
                model,
                field,
                "property {field} does not exist in model {model}, consider adding it"
            );
        }

        first
    }

    pub fn was_notified(&self, model: &str, field: &str) -> bool {
        self.notified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(model.to_owned(), field.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.notified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.notified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
