//! Static service metadata served by the info endpoint.

use serde::{Deserialize, Serialize};

/// Largest request body the service accepts, in bytes (2 MiB).
pub const MAX_QUERY_SIZE: usize = 2 * 1024 * 1024;

/// Service metadata returned verbatim by `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub title: String,
    pub description: String,
    pub version: String,
    pub contact: Contact,
    pub license: License,
    /// The `info` section of the API description document.
    pub api: serde_json::Value,
    pub max_query_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub url: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            name: "AIRR Knowledge".to_string(),
            url: "http://airr-knowledge.org/".to_string(),
            email: "airr-knowledge@utsouthwestern.edu".to_string(),
        }
    }
}
