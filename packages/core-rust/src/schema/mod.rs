//! API description documents: loading, dereferencing and operation listing.

pub mod document;
pub mod error;
pub mod loader;
pub mod resolver;

pub use document::{
    count_references, ApiDescription, DeclaredOperation, DeclaredParameter, ParameterLocation,
    RawDocument, HTTP_METHODS,
};
pub use error::SchemaError;
pub use loader::{parse_yaml, DocumentLoader, FileLoader, MemoryLoader};
pub use resolver::SchemaResolver;
