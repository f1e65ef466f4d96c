//! Merged tool catalog.
//!
//! Tools from every live connection are flattened under `provider__tool`
//! names. The catalog is rebuilt every turn and never persisted.

pub mod schema;
pub mod types;

pub use schema::translate_input_schema;
pub use types::{QualifiedToolName, ToolCatalog, ToolCatalogEntry, NAMESPACE_SEPARATOR};
