//! Module service: inventory replacement and listing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{Module, ModuleCategory, ModuleDraft};
use crate::error::LedgerError;
use crate::persistence::ModuleStore;

/// Owns the caller's module inventory.
#[derive(Debug, Clone)]
pub struct ModuleService {
    store: Arc<dyn ModuleStore>,
}

impl ModuleService {
    /// Creates a new `ModuleService`.
    #[must_use]
    pub fn new(store: Arc<dyn ModuleStore>) -> Self {
        Self { store }
    }

    /// Replaces every module of `user_id` with `drafts`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if a draft is malformed, a uuid
    /// repeats, or a uuid belongs to another user, and
    /// [`LedgerError::Storage`] on write failure.
    pub async fn replace(&self, user_id: i64, drafts: &[ModuleDraft]) -> Result<usize, LedgerError> {
        let mut seen = HashSet::with_capacity(drafts.len());
        for draft in drafts {
            draft.validate()?;
            if !seen.insert(draft.uuid) {
                return Err(LedgerError::Validation(format!(
                    "module {} appears more than once",
                    draft.uuid
                )));
            }
        }
        let stored = self.store.replace_modules(user_id, drafts).await?;
        tracing::info!(user_id, stored, "module inventory replaced");
        Ok(stored)
    }

    /// The caller's modules in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on read failure.
    pub async fn list(
        &self,
        user_id: i64,
        category: Option<ModuleCategory>,
    ) -> Result<Vec<Module>, LedgerError> {
        self.store.list_modules(user_id, category).await
    }
}
