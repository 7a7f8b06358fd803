//! Template loading: pluggable stores and the preprocessing loader.

pub mod loader;
pub mod store;

pub use loader::{TemplateInfo, TemplateLoader};
pub use store::{MemoryTemplateStore, StoreError, TemplateStore, DEFAULT_CATEGORY};
