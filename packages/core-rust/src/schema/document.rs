//! API description documents before and after dereferencing.

use serde_json::Value;

/// HTTP method keys recognised under a path item.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "patch", "head", "options", "trace",
];

/// A parsed document as read from disk, possibly containing `$ref` pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    location: String,
    content: Value,
}

impl RawDocument {
    /// Wraps parsed content read from `location`.
    ///
    /// The location is used to resolve relative external references.
    #[must_use]
    pub fn new(location: impl Into<String>, content: Value) -> Self {
        Self {
            location: location.into(),
            content,
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// The `info` section, if the document has one.
    #[must_use]
    pub fn info(&self) -> Option<&Value> {
        self.content.get("info")
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.location, self.content)
    }
}

/// A fully dereferenced, self-contained API description.
///
/// Only [`SchemaResolver`](super::SchemaResolver) constructs this type, so a
/// value of it never contains a `$ref` pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiDescription {
    document: Value,
}

/// An operation declared under `paths`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredOperation {
    /// Lower-case HTTP method key (`get`, `post`, ...).
    pub method: String,
    pub path: String,
    pub operation_id: Option<String>,
    /// Path-item parameters merged with the operation's own; the operation
    /// wins on a matching `(name, in)` pair.
    pub parameters: Vec<DeclaredParameter>,
    pub request_body_required: bool,
}

/// Where a parameter is carried in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// A parameter entry of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredParameter {
    pub name: String,
    pub location: ParameterLocation,
    /// Path parameters are always required.
    pub required: bool,
}

impl DeclaredParameter {
    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let location = ParameterLocation::parse(value.get("in")?.as_str()?)?;
        let required = location == ParameterLocation::Path
            || value.get("required").and_then(Value::as_bool).unwrap_or(false);
        Some(Self {
            name,
            location,
            required,
        })
    }
}

fn declared_parameters(value: Option<&Value>) -> Vec<DeclaredParameter> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(DeclaredParameter::from_value).collect())
        .unwrap_or_default()
}

fn merge_parameters(
    shared: &[DeclaredParameter],
    own: Vec<DeclaredParameter>,
) -> Vec<DeclaredParameter> {
    let mut merged: Vec<DeclaredParameter> = shared
        .iter()
        .filter(|p| !own.iter().any(|o| o.name == p.name && o.location == p.location))
        .cloned()
        .collect();
    merged.extend(own);
    merged
}

impl ApiDescription {
    pub(crate) fn new(document: Value) -> Self {
        Self { document }
    }

    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    #[must_use]
    pub fn info(&self) -> Option<&Value> {
        self.document.get("info")
    }

    /// The `info.version` string, if declared.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.info()
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
    }

    /// Lists every operation under `paths`, ordered by path then method key.
    #[must_use]
    pub fn operations(&self) -> Vec<DeclaredOperation> {
        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut operations = Vec::new();
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            let shared = declared_parameters(item.get("parameters"));
            for (method, operation) in item {
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                operations.push(DeclaredOperation {
                    method: method.clone(),
                    path: path.clone(),
                    operation_id: operation
                        .get("operationId")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    parameters: merge_parameters(
                        &shared,
                        declared_parameters(operation.get("parameters")),
                    ),
                    request_body_required: operation
                        .pointer("/requestBody/required")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
        }
        operations
    }

    /// Turns the description back into a raw document at `location`.
    #[must_use]
    pub fn into_raw(self, location: impl Into<String>) -> RawDocument {
        RawDocument::new(location, self.document)
    }
}

/// Counts `$ref` pointers (string-valued `$ref` keys) anywhere in `value`.
#[must_use]
pub fn count_references(value: &Value) -> usize {
    match value {
        Value::Object(map) => {
            let own = usize::from(matches!(map.get("$ref"), Some(Value::String(_))));
            own + map.values().map(count_references).sum::<usize>()
        }
        Value::Array(items) => items.iter().map(count_references).sum(),
        _ => 0,
    }
}
