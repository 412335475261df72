//! Document-store persistence port and its in-process implementations.
//!
//! The core issues exactly four verb shapes: filter-by-field query, insert
//! returning a generated id, update-by-document and delete-by-filter.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{errors::Error, Result};

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// A stored record. Every persisted document carries a string `id` field.
pub type Document = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";

/// Conjunction of field equalities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &str) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, want)| doc.get(field) == Some(want))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    /// Store a new document and return its generated id.
    async fn insert(&self, collection: &str, doc: Document) -> Result<String>;

    /// Replace the stored document with the same `id`.
    async fn update(&self, collection: &str, doc: Document) -> Result<()>;

    /// Remove every matching document, returning how many were removed.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize>;
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Store(format!(
            "expected an object document, got {other}"
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Collections held in memory; shared by the memory and JSON-file stores.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Collections {
    #[serde(default)]
    collections: HashMap<String, Vec<Document>>,
    #[serde(default)]
    seq: u64,
}

impl Collections {
    fn find(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&mut self, collection: &str, mut doc: Document) -> String {
        self.seq += 1;
        let id = generate_id(self.seq);
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        id
    }

    fn update(&mut self, collection: &str, doc: Document) -> Result<()> {
        let Some(id) = doc.get(ID_FIELD).and_then(Value::as_str) else {
            return Err(Error::Store("update requires a document id".to_string()));
        };
        let slot = self
            .collections
            .get_mut(collection)
            .and_then(|docs| {
                docs.iter_mut()
                    .find(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| Error::Store(format!("no document {id} in {collection}")))?;
        *slot = doc;
        Ok(())
    }

    fn delete(&mut self, collection: &str, filter: &Filter) -> usize {
        let Some(docs) = self.collections.get_mut(collection) else {
            return 0;
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        before - docs.len()
    }
}

fn generate_id(seq: u64) -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{ms:x}-{seq:06x}")
}
