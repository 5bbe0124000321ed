//! Context sources for the synthesizers
//!
//! A chain is given either literal API documentation or a [`Retriever`]. With
//! a retriever, the top-K documents (by score, descending, ties kept in
//! retrieval order) are concatenated into the `{api_docs}` prompt variable.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[error("retrieval failed: {0}")]
pub struct RetrievalError(pub String);

/// A retrieved document and its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub content: String,
    pub score: f64,
}

/// Capability to fetch documents relevant to a query
pub trait Retriever: Send + Sync {
    fn fetch(&self, query: &str) -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// Where a chain gets its `{api_docs}` from
#[derive(Clone)]
pub enum ContextSource {
    Docs(String),
    Retriever(Arc<dyn Retriever>),
}

impl fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextSource::Docs(docs) => f.debug_tuple("Docs").field(&docs.len()).finish(),
            ContextSource::Retriever(_) => f.write_str("Retriever"),
        }
    }
}

impl ContextSource {
    /// Resolve the context text for `question`.
    pub fn resolve(&self, question: &str, top_k: usize) -> Result<String, RetrievalError> {
        match self {
            ContextSource::Docs(docs) => Ok(docs.clone()),
            ContextSource::Retriever(retriever) => {
                let docs = retriever.fetch(question)?;
                debug!(retrieved = docs.len(), top_k, "Retrieved context documents");
                Ok(assemble(docs, top_k))
            }
        }
    }
}

/// Keep the `top_k` best documents and join them with blank lines.
pub fn assemble(mut docs: Vec<ScoredDocument>, top_k: usize) -> String {
    // sort_by is stable, so equal scores keep retrieval order
    docs.sort_by(|a, b| b.score.total_cmp(&a.score));
    docs.truncate(top_k);

    if docs.is_empty() {
        warn!("Retriever returned no documents, continuing with empty context");
        return String::new();
    }

    docs.into_iter()
        .map(|doc| doc.content)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Scores documents by the fraction of query terms they contain.
///
/// Good enough for a few hundred endpoint descriptions; no index is built.
#[derive(Debug, Clone, Default)]
pub struct KeywordRetriever {
    documents: Vec<String>,
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

impl KeywordRetriever {
    pub fn new(documents: Vec<String>) -> Self {
        Self { documents }
    }
}

impl Retriever for KeywordRetriever {
    fn fetch(&self, query: &str) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let query = terms(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(doc);
                let hits = query.iter().filter(|t| doc_terms.contains(*t)).count();
                (hits > 0).then(|| ScoredDocument {
                    content: doc.clone(),
                    score: hits as f64 / query.len() as f64,
                })
            })
            .collect())
    }
}
