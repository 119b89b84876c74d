//! Errors raised while loading or dereferencing API documents.

/// Failure to produce a fully dereferenced API description.
///
/// Resolution is all-or-nothing: any of these aborts the whole document.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read document {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse document {location}: {message}")]
    Parse { location: String, message: String },
    #[error("document not found: {location}")]
    NotFound { location: String },
    #[error("unresolved reference {reference} in {location}")]
    UnresolvedReference { reference: String, location: String },
    #[error("circular reference {reference} in {location}")]
    CircularReference { reference: String, location: String },
    #[error("unsupported reference {reference}: only local documents can be dereferenced")]
    UnsupportedReference { reference: String },
    #[error("reference {reference} has sibling keys but does not resolve to an object")]
    InvalidSiblings { reference: String },
}
