//! Declarative API documentation
//!
//! Endpoint descriptions are kept in a JSON array, one object per endpoint:
//!
//! ```json
//! [{ "endpoint": "/api2/json/nodes/{node}/qemu", "method": "get",
//!    "summary": "List virtual machines on a node", "parameters": [...] }]
//! ```
//!
//! The whole array becomes the `{api_docs}` text of a docs-backed chain; each
//! entry becomes one document for the retriever.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid API documentation: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("entry {index} has no \"endpoint\"")]
    MissingEndpoint { index: usize },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MethodField {
    One(String),
    Many(Vec<String>),
}

/// The fields used to title an entry. Everything else is kept as raw JSON.
#[derive(Debug, Clone, Deserialize)]
struct EndpointHeader {
    endpoint: Option<String>,
    #[serde(alias = "methods")]
    method: Option<MethodField>,
    summary: Option<String>,
}

/// One documented endpoint
#[derive(Debug, Clone)]
pub struct ApiEndpointDoc {
    pub endpoint: String,
    pub methods: Vec<String>,
    pub summary: String,
    raw: Value,
}

impl ApiEndpointDoc {
    /// Retrieval document: a title line followed by the entry's JSON.
    pub fn to_document(&self) -> String {
        let methods = self
            .methods
            .iter()
            .map(|m| m.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        let body = serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string());
        format!("{methods} {} - {}\n{body}", self.endpoint, self.summary.trim())
    }
}

/// A loaded documentation set
#[derive(Debug, Clone)]
pub struct ApiDocs {
    entries: Vec<ApiEndpointDoc>,
    combined: String,
}

impl ApiDocs {
    pub fn from_json(text: &str) -> Result<Self, DocsError> {
        let values: Vec<Value> = serde_json::from_str(text)?;
        let combined = serde_json::to_string_pretty(&values)?;

        let mut entries = Vec::with_capacity(values.len());
        for (index, raw) in values.into_iter().enumerate() {
            let header: EndpointHeader = serde_json::from_value(raw.clone())?;
            let endpoint = header.endpoint.ok_or(DocsError::MissingEndpoint { index })?;
            let methods = match header.method {
                Some(MethodField::One(m)) => vec![m],
                Some(MethodField::Many(ms)) => ms,
                None => Vec::new(),
            };
            entries.push(ApiEndpointDoc {
                endpoint,
                methods,
                summary: header.summary.unwrap_or_default(),
                raw,
            });
        }

        Ok(Self { entries, combined })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DocsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn entries(&self) -> &[ApiEndpointDoc] {
        &self.entries
    }

    /// The full documentation as one pretty-printed JSON text.
    pub fn combined(&self) -> &str {
        &self.combined
    }

    /// One retrieval document per endpoint.
    pub fn documents(&self) -> Vec<String> {
        self.entries.iter().map(ApiEndpointDoc::to_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"endpoint": "/api2/json/nodes/{node}/qemu", "method": "get",
         "summary": "List Virtual machines (VMs) on a Node",
         "parameters": [{"name": "node", "in": "path", "required": true}]},
        {"endpoint": "/api2/json/nodes/{node}/lxc", "methods": ["get", "post"],
         "summary": "LXC containers"}
    ]"#;

    #[test]
    fn test_parse_entries() {
        let docs = ApiDocs::from_json(SAMPLE).unwrap();
        assert_eq!(docs.entries().len(), 2);
        assert_eq!(docs.entries()[0].methods, vec!["get"]);
        assert_eq!(docs.entries()[1].methods, vec!["get", "post"]);
        assert!(docs.combined().contains("\"required\": true"));
    }

    #[test]
    fn test_documents_have_title_line() {
        let docs = ApiDocs::from_json(SAMPLE).unwrap();
        let documents = docs.documents();
        assert!(documents[0]
            .starts_with("GET /api2/json/nodes/{node}/qemu - List Virtual machines (VMs) on a Node\n"));
        assert!(documents[1].starts_with("GET,POST /api2/json/nodes/{node}/lxc"));
    }

    #[test]
    fn test_missing_endpoint() {
        let err = ApiDocs::from_json(r#"[{"method": "get"}]"#).unwrap_err();
        assert!(matches!(err, DocsError::MissingEndpoint { index: 0 }));
    }

    #[test]
    fn test_bundled_docs_parse() {
        let docs = ApiDocs::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/proxmox_api.json")).unwrap();
        assert_eq!(docs.entries().len(), 10);
        assert!(docs.entries().iter().all(|e| !e.methods.is_empty()));
    }
}
