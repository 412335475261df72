use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    errors::Error,
    store::{Collections, Document, DocumentStore, Filter},
    Result,
};

/// Document store persisted to a single JSON file.
///
/// Every write rewrites the whole file via a temp file + rename so a crash never
/// leaves a half-written store behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<Collections>,
}

impl JsonFileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let collections = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Collections::default(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            inner: Mutex::new(collections),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, collections: &Collections) -> Result<()> {
        let Some(file_name) = self.path.file_name() else {
            return Err(Error::InvalidPath {
                path: self.path.clone(),
                reason: "store path has no file name".to_string(),
            });
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let body = serde_json::to_vec_pretty(collections)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl JsonFileStore {
    /// Apply `change` to a copy, persist the copy, then publish it.
    ///
    /// A failed write leaves both memory and disk at the previous state.
    /// `change` returns whether anything changed; unchanged copies are not written.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut Collections) -> Result<(T, bool)>,
    ) -> Result<T> {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        let (out, changed) = change(&mut next)?;
        if changed {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self.inner.lock().await.find(collection, filter))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        self.commit(|c| Ok((c.insert(collection, doc), true))).await
    }

    async fn update(&self, collection: &str, doc: Document) -> Result<()> {
        self.commit(|c| c.update(collection, doc).map(|()| ((), true)))
            .await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.commit(|c| {
            let removed = c.delete(collection, filter);
            Ok((removed, removed > 0))
        })
        .await
    }
}
