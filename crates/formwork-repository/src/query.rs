//! Composable read queries over the template store

use std::sync::Arc;

use formwork::Template;

use crate::error::{RepositoryError, Result};
use crate::storage::{TemplateFilter, TemplateStore};

/// A filter specification over the template store.
///
/// Narrowing calls compose and never touch the store; only [`list`]
/// executes, and every execution re-reads current store state, so two
/// calls may differ if the store changed in between.
///
/// [`list`]: TemplateQuery::list
#[derive(Clone)]
pub struct TemplateQuery {
    store: Arc<dyn TemplateStore>,
    filter: TemplateFilter,
}

impl TemplateQuery {
    pub(crate) fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            filter: TemplateFilter::default(),
        }
    }

    /// Narrow to an exact language code. An unmatched code yields an empty
    /// result, not an error.
    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.filter.language = Some(code.into());
        self
    }

    /// Narrow to an exact document name.
    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.filter.document_name = Some(name.into());
        self
    }

    /// Execute the composed filter, ordered by document name, then
    /// language.
    pub async fn list(&self) -> Result<Vec<Template>> {
        let records = self
            .store
            .list(&self.filter)
            .await
            .map_err(RepositoryError::from_store)?;
        Ok(records.into_iter().map(Template::new).collect())
    }
}
