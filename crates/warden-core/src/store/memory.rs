use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    errors::Error,
    store::{Collections, Document, DocumentStore, Filter},
    Result,
};

/// Process-local document store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Collections) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.with(|c| Ok(c.find(collection, filter)))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        self.with(|c| Ok(c.insert(collection, doc)))
    }

    async fn update(&self, collection: &str, doc: Document) -> Result<()> {
        self.with(|c| c.update(collection, doc))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.with(|c| Ok(c.delete(collection, filter)))
    }
}
