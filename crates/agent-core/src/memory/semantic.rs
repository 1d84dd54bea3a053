//! Durable cross-run document store with lexical retrieval

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A stored piece of knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Reserved for vector retrieval; never consulted
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Append-only document store shared by every run.
///
/// Each `add` rewrites the backing file while holding the lock, so
/// concurrent writers never lose each other's documents.
#[derive(Debug)]
pub struct SemanticMemory {
    path: Option<PathBuf>,
    documents: Mutex<Vec<Document>>,
}

impl SemanticMemory {
    /// Open the store at `path`. A missing file starts empty; an unreadable
    /// or corrupt one is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let documents = match load_documents(&path) {
            Ok(docs) => docs,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "Failed to load memory store, starting empty");
                Vec::new()
            }
        };
        debug!(path = %path.display(), count = documents.len(), "Opened memory store");

        Self {
            path: Some(path),
            documents: Mutex::new(documents),
        }
    }

    /// Store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a document and flush the store
    pub fn add(&self, content: impl Into<String>, metadata: Map<String, Value>) -> Result<Document> {
        let mut documents = self.documents.lock();

        let doc = Document {
            id: format!("doc_{}_{}", documents.len() + 1, Utc::now().timestamp()),
            content: content.into(),
            metadata,
            embedding: None,
        };
        documents.push(doc.clone());

        if let Some(path) = &self.path {
            if let Err(e) = save_documents(path, &documents) {
                documents.pop();
                return Err(e);
            }
        }

        debug!(id = %doc.id, "Added document to memory");
        Ok(doc)
    }

    /// Top `limit` documents by query-word overlap, best first.
    /// Ties keep insertion order; zero-score documents are never returned.
    pub fn retrieve(&self, query: &str, limit: usize) -> Vec<Document> {
        let query_words = words(query);
        if query_words.is_empty() || limit == 0 {
            return Vec::new();
        }

        let documents = self.documents.lock();
        let mut scored: Vec<(f64, &Document)> = documents
            .iter()
            .map(|doc| {
                let doc_words = words(&doc.content);
                let overlap = query_words.intersection(&doc_words).count();
                (overlap as f64 / query_words.len() as f64, doc)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let results: Vec<Document> = scored
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect();
        debug!(query, matches = results.len(), "Retrieved from memory");
        results
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    /// Snapshot of every document in insertion order
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn load_documents(path: &Path) -> Result<Vec<Document>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path).context("Failed to read memory store")?;
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&json).context("Failed to parse memory store")
}

fn save_documents(path: &Path, documents: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create memory directory")?;
        }
    }

    let json = serde_json::to_string_pretty(documents).context("Failed to serialize memory store")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).context("Failed to write memory store")?;
    fs::rename(&tmp, path).context("Failed to replace memory store")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn meta(source: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("source".to_string(), json!(source));
        m
    }

    #[test]
    fn test_retrieve_ranks_relevant_first() {
        let memory = SemanticMemory::in_memory();
        memory.add("Python 3.12 release notes", Map::new()).unwrap();
        memory.add("Cooking recipes", Map::new()).unwrap();

        let results = memory.retrieve("python features", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "Python 3.12 release notes");
    }

    #[test]
    fn test_retrieve_excludes_zero_scores_and_keeps_tie_order() {
        let memory = SemanticMemory::in_memory();
        memory.add("rust async runtime", Map::new()).unwrap();
        memory.add("gardening tips", Map::new()).unwrap();
        memory.add("RUST borrow checker", Map::new()).unwrap();
        memory.add("rust async tokio", Map::new()).unwrap();

        let results = memory.retrieve("rust async", 10);
        let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["rust async runtime", "rust async tokio", "RUST borrow checker"]
        );
    }

    #[test]
    fn test_retrieve_empty_query_or_store() {
        let memory = SemanticMemory::in_memory();
        assert!(memory.retrieve("anything", 3).is_empty());
        memory.add("something", Map::new()).unwrap();
        assert!(memory.retrieve("   ", 3).is_empty());
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let memory = SemanticMemory::open(&path);
        let doc = memory.add("Tokio is an async runtime", meta("web_search")).unwrap();
        assert!(doc.id.starts_with("doc_1_"));
        assert!(doc.embedding.is_none());
        drop(memory);

        let reopened = SemanticMemory::open(&path);
        assert_eq!(reopened.len(), 1);
        let docs = reopened.documents();
        assert_eq!(docs[0].content, "Tokio is an async runtime");
        assert_eq!(docs[0].metadata["source"], "web_search");
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        fs::write(&path, "{ not valid json").unwrap();

        let memory = SemanticMemory::open(&path);
        assert!(memory.is_empty());

        memory.add("fresh start", Map::new()).unwrap();
        assert_eq!(SemanticMemory::open(&path).len(), 1);
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        let memory = Arc::new(SemanticMemory::open(&path));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let memory = Arc::clone(&memory);
                std::thread::spawn(move || {
                    memory.add(format!("note {}", i), Map::new()).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(memory.len(), 8);
        assert_eq!(SemanticMemory::open(&path).len(), 8);
    }
}
