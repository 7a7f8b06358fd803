//! Template storage backends.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from a template store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("template not found: {name}")]
    NotFound { name: String },

    #[error("invalid template name: {name:?}")]
    InvalidName { name: String },

    #[error("failed to write template {name}: {message}")]
    Write { name: String, message: String },
}

/// Where template text comes from.
///
/// Names are logical (`button`, `layouts/main`); categories group templates
/// for listing and are not part of the name.
pub trait TemplateStore: Send {
    fn read(&self, name: &str) -> Result<String, StoreError>;

    fn write(&mut self, name: &str, content: &str, category: &str) -> Result<(), StoreError>;

    fn remove(&mut self, name: &str) -> Result<(), StoreError>;

    /// Every stored name, sorted.
    fn names(&self) -> Vec<String>;

    fn category(&self, name: &str) -> Option<String> {
        let _ = name;
        None
    }
}

/// Category used when none is given.
pub const DEFAULT_CATEGORY: &str = "components";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stored {
    content: String,
    category: String,
}

/// In-memory [`TemplateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: BTreeMap<String, Stored>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template in the default category (builder).
    pub fn with_template(self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.with_categorized(name, content, DEFAULT_CATEGORY)
    }

    /// Add a template in `category` (builder).
    pub fn with_categorized(
        mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        self.templates.insert(
            name.into(),
            Stored {
                content: content.into(),
                category: category.into(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() || name.split('/').any(|part| part == "..") {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl TemplateStore for MemoryTemplateStore {
    fn read(&self, name: &str) -> Result<String, StoreError> {
        self.templates
            .get(name)
            .map(|t| t.content.clone())
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    fn write(&mut self, name: &str, content: &str, category: &str) -> Result<(), StoreError> {
        check_name(name)?;
        let category = if category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            category
        };
        self.templates.insert(
            name.to_string(),
            Stored {
                content: content.to_string(),
                category: category.to_string(),
            },
        );
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        self.templates
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    fn category(&self, name: &str) -> Option<String> {
        self.templates.get(name).map(|t| t.category.clone())
    }
}
