//! Full `$ref` dereferencing for API description documents.
//!
//! Every internal (`#/components/...`) and external (`other.yaml#/...`)
//! pointer is replaced by the content it points at. The result is a single
//! self-contained document, or an error; partially resolved documents are
//! never returned.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::document::{count_references, ApiDescription, RawDocument};
use super::error::SchemaError;
use super::loader::{join_location, DocumentLoader};

/// Dereferences raw documents into [`ApiDescription`]s.
///
/// External documents are fetched through the configured
/// [`DocumentLoader`], at most once per `resolve` call.
pub struct SchemaResolver {
    loader: Arc<dyn DocumentLoader>,
}

impl SchemaResolver {
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self { loader }
    }

    /// Resolves every reference in `raw`.
    ///
    /// Idempotent: resolving an already resolved document yields an equal
    /// document.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered; see its variants.
    pub fn resolve(&self, raw: RawDocument) -> Result<ApiDescription, SchemaError> {
        let (location, content) = raw.into_parts();
        let references = count_references(&content);
        let root = Arc::new(content);

        let mut run = Resolution {
            loader: self.loader.as_ref(),
            documents: HashMap::from([(location.clone(), Arc::clone(&root))]),
            in_progress: Vec::new(),
        };
        let resolved = run.walk(&location, &root)?;

        debug!(
            location = %location,
            references,
            documents = run.documents.len(),
            "dereferenced API document"
        );
        Ok(ApiDescription::new(resolved))
    }
}

/// State for a single `resolve` call.
struct Resolution<'a> {
    loader: &'a dyn DocumentLoader,
    documents: HashMap<String, Arc<Value>>,
    /// `location#pointer` keys currently being expanded; a repeat is a cycle.
    in_progress: Vec<String>,
}

impl Resolution<'_> {
    fn walk(&mut self, location: &str, value: &Value) -> Result<Value, SchemaError> {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    return self.expand(location, reference, map);
                }
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.walk(location, child)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(location, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Replaces a `$ref` object with its target, merging any sibling keys.
    fn expand(
        &mut self,
        location: &str,
        reference: &str,
        object: &Map<String, Value>,
    ) -> Result<Value, SchemaError> {
        let target = self.dereference(location, reference)?;
        if object.len() == 1 {
            return Ok(target);
        }

        let Value::Object(mut merged) = target else {
            return Err(SchemaError::InvalidSiblings {
                reference: reference.to_string(),
            });
        };
        for (key, child) in object {
            if key != "$ref" {
                merged.insert(key.clone(), self.walk(location, child)?);
            }
        }
        Ok(Value::Object(merged))
    }

    fn dereference(&mut self, location: &str, reference: &str) -> Result<Value, SchemaError> {
        let (document_part, pointer) = reference.split_once('#').unwrap_or((reference, ""));
        if document_part.contains("://") {
            return Err(SchemaError::UnsupportedReference {
                reference: reference.to_string(),
            });
        }

        let target_location = if document_part.is_empty() {
            location.to_string()
        } else {
            join_location(location, document_part)
        };

        let key = format!("{target_location}#{pointer}");
        if self.in_progress.contains(&key) {
            return Err(SchemaError::CircularReference {
                reference: reference.to_string(),
                location: location.to_string(),
            });
        }

        let document = self.document(&target_location)?;
        let target = document
            .pointer(pointer)
            .ok_or_else(|| SchemaError::UnresolvedReference {
                reference: reference.to_string(),
                location: location.to_string(),
            })?;

        self.in_progress.push(key);
        let resolved = self.walk(&target_location, target);
        self.in_progress.pop();
        resolved
    }

    fn document(&mut self, location: &str) -> Result<Arc<Value>, SchemaError> {
        if let Some(document) = self.documents.get(location) {
            return Ok(Arc::clone(document));
        }
        debug!(location, "loading referenced document");
        let (_, content) = self.loader.load(location)?.into_parts();
        let document = Arc::new(content);
        self.documents
            .insert(location.to_string(), Arc::clone(&document));
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryLoader;
    use proptest::prelude::*;
    use serde_json::json;

    fn resolver(loader: MemoryLoader) -> SchemaResolver {
        SchemaResolver::new(Arc::new(loader))
    }

    fn raw(content: Value) -> RawDocument {
        RawDocument::new("api/ak-api.yaml", content)
    }

    #[test]
    fn resolves_internal_references() {
        let doc = raw(json!({
            "paths": {
                "/status": {
                    "get": {
                        "operationId": "get_service_status",
                        "responses": {"200": {"$ref": "#/components/responses/Ok"}}
                    }
                }
            },
            "components": {
                "responses": {"Ok": {"description": "ok", "content": {"$ref": "#/components/content/Json"}}},
                "content": {"Json": {"application/json": {}}}
            }
        }));

        let resolved = resolver(MemoryLoader::new()).resolve(doc).unwrap();
        let response = &resolved.document()["paths"]["/status"]["get"]["responses"]["200"];
        assert_eq!(response["description"], "ok");
        assert_eq!(response["content"], json!({"application/json": {}}));
        assert_eq!(count_references(resolved.document()), 0);
    }

    #[test]
    fn resolves_external_references_relative_to_referrer() {
        let loader = MemoryLoader::new()
            .with(
                "api/schemas/common.yaml",
                json!({"Info": {"type": "object", "properties": {"v": {"$ref": "#/Version"}}},
                       "Version": {"type": "string"}}),
            );
        let doc = raw(json!({
            "components": {"schemas": {"Info": {"$ref": "schemas/common.yaml#/Info"}}}
        }));

        let resolved = resolver(loader).resolve(doc).unwrap();
        assert_eq!(
            resolved.document()["components"]["schemas"]["Info"]["properties"]["v"],
            json!({"type": "string"})
        );
    }

    #[test]
    fn whole_document_reference() {
        let loader = MemoryLoader::new().with("api/info.yaml", json!({"version": "3.1.4"}));
        let doc = raw(json!({"info": {"$ref": "info.yaml"}}));

        let resolved = resolver(loader).resolve(doc).unwrap();
        assert_eq!(resolved.version(), Some("3.1.4"));
    }

    #[test]
    fn sibling_keys_override_target() {
        let doc = raw(json!({
            "a": {"$ref": "#/b", "description": "override"},
            "b": {"type": "string", "description": "base"}
        }));

        let resolved = resolver(MemoryLoader::new()).resolve(doc).unwrap();
        assert_eq!(
            resolved.document()["a"],
            json!({"type": "string", "description": "override"})
        );
    }

    #[test]
    fn siblings_on_scalar_target_fail() {
        let doc = raw(json!({"a": {"$ref": "#/b", "x": 1}, "b": 5}));
        let err = resolver(MemoryLoader::new()).resolve(doc).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSiblings { .. }));
    }

    #[test]
    fn missing_pointer_fails_loudly() {
        let doc = raw(json!({"a": {"$ref": "#/components/schemas/Nope"}}));
        let err = resolver(MemoryLoader::new()).resolve(doc).unwrap_err();
        assert!(
            matches!(err, SchemaError::UnresolvedReference { ref reference, .. } if reference == "#/components/schemas/Nope")
        );
    }

    #[test]
    fn missing_external_document_fails() {
        let doc = raw(json!({"a": {"$ref": "missing.yaml#/x"}}));
        let err = resolver(MemoryLoader::new()).resolve(doc).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { ref location } if location == "api/missing.yaml"));
    }

    #[test]
    fn remote_references_are_rejected() {
        let doc = raw(json!({"a": {"$ref": "https://example.com/s.yaml#/x"}}));
        let err = resolver(MemoryLoader::new()).resolve(doc).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedReference { .. }));
    }

    #[test]
    fn cycles_are_detected() {
        let doc = raw(json!({
            "Node": {"type": "object", "properties": {"next": {"$ref": "#/Node"}}},
            "root": {"$ref": "#/Node"}
        }));
        let err = resolver(MemoryLoader::new()).resolve(doc).unwrap_err();
        assert!(matches!(err, SchemaError::CircularReference { .. }));
    }

    #[test]
    fn shared_targets_are_not_cycles() {
        let doc = raw(json!({
            "S": {"type": "string"},
            "pair": [{"$ref": "#/S"}, {"$ref": "#/S"}]
        }));
        let resolved = resolver(MemoryLoader::new()).resolve(doc).unwrap();
        assert_eq!(
            resolved.document()["pair"],
            json!([{"type": "string"}, {"type": "string"}])
        );
    }

    #[test]
    fn escaped_pointer_segments() {
        let doc = raw(json!({
            "paths": {"/status": {"get": {"operationId": "s"}}},
            "alias": {"$ref": "#/paths/~1status/get"}
        }));
        let resolved = resolver(MemoryLoader::new()).resolve(doc).unwrap();
        assert_eq!(resolved.document()["alias"]["operationId"], "s");
    }

    fn document_with_refs(targets: &[usize], schemas: usize) -> Value {
        let mut components = Map::new();
        for i in 0..schemas {
            components.insert(format!("S{i}"), json!({"type": "string", "description": format!("schema {i}")}));
        }
        let refs: Vec<Value> = targets
            .iter()
            .map(|t| json!({"$ref": format!("#/components/schemas/S{}", t % schemas)}))
            .collect();
        json!({"components": {"schemas": components}, "uses": refs})
    }

    proptest! {
        #[test]
        fn resolution_removes_all_refs_and_is_idempotent(
            schemas in 1usize..8,
            targets in proptest::collection::vec(0usize..64, 0..32),
        ) {
            let content = document_with_refs(&targets, schemas);
            prop_assert_eq!(count_references(&content), targets.len());

            let resolver = resolver(MemoryLoader::new());
            let once = resolver.resolve(raw(content)).unwrap();
            prop_assert_eq!(count_references(once.document()), 0);

            let twice = resolver.resolve(once.clone().into_raw("api/ak-api.yaml")).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
