//! Directory-backed chunk reference store.
//!
//! One JSON file per document, named by a hash of the document id, written
//! atomically (temp file + rename) so a crash mid-write leaves either the
//! old file or the new one, never a torn half. All chunks live in memory
//! after [`ChunkIndex::open`]; the directory is the durability layer, not
//! the query path.
//!
//! Writers to the *same* document serialize on a per-document advisory
//! lock; writers to different documents proceed in parallel. The store is
//! strict about corruption: an unreadable document file fails `open`
//! outright rather than silently dropping the document's references.

use crate::error::Pdf2RefError;
use crate::model::{ChunkReference, ResolvedAnswer};
use crate::resolve;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// On-disk shape of one document's file.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DocumentFile {
    document_id: String,
    chunks: Vec<ChunkReference>,
}

#[derive(Default)]
struct IndexState {
    /// Every chunk across every document, keyed by chunk id.
    chunks: HashMap<String, ChunkReference>,
    /// Chunk ids per document, for whole-document replacement and deletion.
    documents: HashMap<String, BTreeSet<String>>,
}

/// A persistent index of chunk references, shared across tasks via `Clone`.
#[derive(Clone)]
pub struct ChunkIndex {
    dir: PathBuf,
    state: Arc<RwLock<IndexState>>,
    /// Advisory per-document write locks. Guards the read-modify-write of a
    /// document's file; lookups never take it.
    doc_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex").field("dir", &self.dir).finish()
    }
}

impl ChunkIndex {
    /// Open (or create) a store rooted at `dir` and load every document
    /// file into memory.
    ///
    /// # Errors
    /// [`Pdf2RefError::StoreIo`] if the directory cannot be created or read;
    /// [`Pdf2RefError::IndexCorrupt`] if any document file fails to parse.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, Pdf2RefError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| Pdf2RefError::StoreIo {
            path: dir.clone(),
            source: e,
        })?;

        let mut state = IndexState::default();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| Pdf2RefError::StoreIo {
            path: dir.clone(),
            source: e,
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Pdf2RefError::StoreIo {
            path: dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(|e| Pdf2RefError::StoreIo {
                path: path.clone(),
                source: e,
            })?;
            let file: DocumentFile =
                serde_json::from_slice(&bytes).map_err(|e| Pdf2RefError::IndexCorrupt {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            let ids = state.documents.entry(file.document_id.clone()).or_default();
            for chunk in file.chunks {
                ids.insert(chunk.chunk_id.clone());
                state.chunks.insert(chunk.chunk_id.clone(), chunk);
            }
        }

        info!(
            dir = %dir.display(),
            documents = state.documents.len(),
            chunks = state.chunks.len(),
            "opened chunk store"
        );
        Ok(Self {
            dir,
            state: Arc::new(RwLock::new(state)),
            doc_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Look up a single chunk by id.
    pub async fn get(&self, chunk_id: &str) -> Option<ChunkReference> {
        self.state.read().await.chunks.get(chunk_id).cloned()
    }

    /// Upsert one chunk, rewriting its document's file.
    ///
    /// Re-putting an identical chunk is a no-op on disk content; the store
    /// converges rather than accumulating.
    pub async fn put(&self, chunk: ChunkReference) -> Result<(), Pdf2RefError> {
        let document_id = chunk.document_id.clone();
        let lock = self.doc_lock(&document_id).await;
        let _guard = lock.lock().await;

        let doc_chunks = {
            let mut state = self.state.write().await;
            state
                .documents
                .entry(document_id.clone())
                .or_default()
                .insert(chunk.chunk_id.clone());
            state.chunks.insert(chunk.chunk_id.clone(), chunk);
            self.collect_document(&state, &document_id)
        };
        self.write_document(&document_id, doc_chunks).await
    }

    /// Replace a document's chunks wholesale.
    ///
    /// The common path after processing: chunk ids are derived from page and
    /// reading order, so re-indexing the same document is idempotent, and
    /// re-indexing a changed document drops chunks that no longer exist.
    pub async fn put_document(
        &self,
        document_id: &str,
        chunks: Vec<ChunkReference>,
    ) -> Result<(), Pdf2RefError> {
        for chunk in &chunks {
            if chunk.document_id != document_id {
                return Err(Pdf2RefError::Internal(format!(
                    "chunk '{}' belongs to document '{}', not '{document_id}'",
                    chunk.chunk_id, chunk.document_id
                )));
            }
        }

        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let doc_chunks = {
            let mut state = self.state.write().await;
            if let Some(old_ids) = state.documents.remove(document_id) {
                for id in old_ids {
                    state.chunks.remove(&id);
                }
            }
            let mut ids = BTreeSet::new();
            for chunk in chunks {
                ids.insert(chunk.chunk_id.clone());
                state.chunks.insert(chunk.chunk_id.clone(), chunk);
            }
            state.documents.insert(document_id.to_string(), ids);
            self.collect_document(&state, document_id)
        };
        debug!(document_id, chunks = doc_chunks.len(), "replaced document chunks");
        self.write_document(document_id, doc_chunks).await
    }

    /// Remove a document and its file. Returns whether it existed.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, Pdf2RefError> {
        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let existed = {
            let mut state = self.state.write().await;
            match state.documents.remove(document_id) {
                Some(ids) => {
                    for id in ids {
                        state.chunks.remove(&id);
                    }
                    true
                }
                None => false,
            }
        };
        if existed {
            let path = self.document_path(document_id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                // In-memory state already dropped it; a missing file is the
                // desired end state.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(document_id, "document had no file to delete");
                }
                Err(e) => return Err(Pdf2RefError::StoreIo { path, source: e }),
            }
        }
        // The advisory lock exists to serialize writers of a live document;
        // a deleted document gets a fresh one if it ever comes back, so the
        // map does not grow across document lifecycles. Waiters already
        // holding the Arc still serialize on it.
        self.doc_locks.lock().await.remove(document_id);
        Ok(existed)
    }

    /// Ids of every indexed document, sorted.
    pub async fn document_ids(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state.documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Total chunk count across all documents.
    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.chunks.is_empty()
    }

    /// Resolve citation markers in `answer_text` against this store.
    ///
    /// `ordinal_map` maps the 1-based marker ordinals to chunk ids, in the
    /// order the chunks were presented to whatever produced the text.
    pub async fn resolve_answer(
        &self,
        answer_text: &str,
        ordinal_map: &HashMap<u32, String>,
    ) -> ResolvedAnswer {
        let chunks = {
            let state = self.state.read().await;
            ordinal_map
                .values()
                .filter_map(|id| state.chunks.get(id).map(|c| (id.clone(), c.clone())))
                .collect::<HashMap<String, ChunkReference>>()
        };
        resolve::resolve(answer_text, ordinal_map, &chunks)
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn doc_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.doc_locks.lock().await;
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn collect_document(&self, state: &IndexState, document_id: &str) -> Vec<ChunkReference> {
        state
            .documents
            .get(document_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.chunks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn document_path(&self, document_id: &str) -> PathBuf {
        let digest = Sha256::digest(document_id.as_bytes());
        let mut name = String::with_capacity(16 + 5);
        for byte in &digest[..8] {
            name.push_str(&format!("{byte:02x}"));
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    /// Write one document's file atomically. File writes block; they run on
    /// the blocking pool.
    async fn write_document(
        &self,
        document_id: &str,
        chunks: Vec<ChunkReference>,
    ) -> Result<(), Pdf2RefError> {
        let path = self.document_path(document_id);
        let dir = self.dir.clone();
        let file = DocumentFile {
            document_id: document_id.to_string(),
            chunks,
        };
        tokio::task::spawn_blocking(move || -> Result<(), Pdf2RefError> {
            let bytes = serde_json::to_vec_pretty(&file)
                .map_err(|e| Pdf2RefError::Internal(format!("serializing document file: {e}")))?;
            let mut tmp =
                tempfile::NamedTempFile::new_in(&dir).map_err(|e| Pdf2RefError::StoreIo {
                    path: dir.clone(),
                    source: e,
                })?;
            tmp.write_all(&bytes).map_err(|e| Pdf2RefError::StoreIo {
                path: tmp.path().to_path_buf(),
                source: e,
            })?;
            tmp.persist(&path).map_err(|e| Pdf2RefError::StoreIo {
                path: path.clone(),
                source: e.error,
            })?;
            Ok(())
        })
        .await
        .map_err(|e| Pdf2RefError::Internal(format!("store writer task failed: {e}")))?
    }
}
