//! Content-addressed chunk store.
//!
//! A [`ChunkStore`] is the in-memory aggregate of a store file: a schema
//! version, the root directory, the registered [`Document`]s, and every
//! [`Chunk`] derived from them. Chunks are identified by
//! `(document, hash)`; re-deriving a chunk with identical text finds the
//! existing entry instead of creating a new one, so refreshing an unchanged
//! document costs no embedding calls.
//!
//! # Lifecycle
//!
//! 1. [`refresh_document`](ChunkStore::refresh_document) marks every chunk
//!    of the document stale, re-chunks the live text, and
//!    [`upsert`](ChunkStore::upsert)s each piece. Known pieces are
//!    resurrected; new ones are embedded in one batched provider call.
//! 2. [`forget_document`](ChunkStore::forget_document) only unregisters the
//!    document. Its chunks stay until the next GC, so a file that is absent
//!    for a while (another branch checked out) keeps its derived data until
//!    the caller decides to collect.
//! 3. [`gc`](ChunkStore::gc) is the only deletion path.
//!
//! Chunk text is never persisted. [`chunk_text`](ChunkStore::chunk_text)
//! re-reads the document at the stored byte range every time, and resolves
//! to an empty string when the document is missing from disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunk::{header_text, snap_to_char_boundary, Chunker};
use crate::embedding::Provider;
use crate::error::StoreError;
use crate::models::{Chunk, Document};
use crate::STORE_VERSION;

/// Rendering options for [`ChunkStore::chunk_text`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOptions {
    /// Prefix the text with a `from <path>:` header.
    pub with_header: bool,
    /// Prefix every line with its 1-based line number in the document.
    pub with_line_numbers: bool,
}

/// Persisted shape of a store.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoreData {
    #[serde(default)]
    version: String,
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    chunks: Vec<Chunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StoreDataRef<'a> {
    version: &'a str,
    root: &'a Path,
    documents: &'a [Document],
    chunks: &'a [Chunk],
}

/// In-memory store of documents and their chunks.
pub struct ChunkStore {
    version: String,
    root: PathBuf,
    documents: Vec<Document>,
    chunks: Vec<Chunk>,
    /// `(document, hash)` → position in `chunks`.
    index: HashMap<(String, String), usize>,
    chunker: Chunker,
    embedding_token_limit: usize,
}

impl ChunkStore {
    /// Empty store at the current schema version.
    pub fn new(root: impl Into<PathBuf>, chunker: Chunker, embedding_token_limit: usize) -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            root: normalize(&root.into()),
            documents: Vec::new(),
            chunks: Vec::new(),
            index: HashMap::new(),
            chunker,
            embedding_token_limit,
        }
    }

    /// Deserialize a store. The serialized root is ignored in favour of
    /// `root`, since the store file may have moved.
    pub fn from_json(
        bytes: &[u8],
        root: impl Into<PathBuf>,
        chunker: Chunker,
        embedding_token_limit: usize,
    ) -> Result<Self> {
        let data: StoreData = serde_json::from_slice(bytes).map_err(StoreError::MalformedStore)?;
        let mut store = Self::new(root, chunker, embedding_token_limit);
        store.version = data.version;
        store.documents = data.documents;
        store.chunks = data.chunks;
        store.rebuild_index();
        Ok(store)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let data = StoreDataRef {
            version: &self.version,
            root: &self.root,
            documents: &self.documents,
            chunks: &self.chunks,
        };
        Ok(serde_json::to_vec(&data)?)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn embedding_token_limit(&self) -> usize {
        self.embedding_token_limit
    }

    pub(crate) fn documents_mut(&mut self) -> &mut Vec<Document> {
        &mut self.documents
    }

    /// Mutable chunk access for the migrator. Callers that rewrite
    /// document keys must call [`rebuild_index`](Self::rebuild_index).
    pub(crate) fn chunks_mut(&mut self) -> &mut Vec<Chunk> {
        &mut self.chunks
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ((c.document.clone(), c.hash.clone()), i))
            .collect();
    }

    pub fn abs_path(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Canonical root-relative key for a path given either absolute or
    /// relative to the current directory.
    pub fn rel_path(&self, path: &Path) -> Result<String> {
        let abs = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&std::env::current_dir()?.join(path))
        };
        match abs.strip_prefix(&self.root) {
            Ok(rel) => Ok(rel.to_string_lossy().into_owned()),
            Err(_) => Err(StoreError::DocumentOutsideRoot {
                path: abs,
                root: self.root.clone(),
            }
            .into()),
        }
    }

    pub fn has_document(&self, rel_path: &str) -> bool {
        self.documents.iter().any(|d| d.rel_path == rel_path)
    }

    /// Register a document key. Returns `false` if it was already present.
    pub fn register_document(&mut self, rel_path: &str) -> bool {
        if self.has_document(rel_path) {
            return false;
        }
        self.documents.push(Document::new(rel_path));
        true
    }

    /// Register a document and bring its chunks up to date.
    ///
    /// A path that does not exist is skipped with a warning and reported as
    /// unchanged.
    pub async fn add_document(&mut self, provider: &dyn Provider, path: &Path) -> Result<bool> {
        let rel = self.rel_path(path)?;
        if !self.abs_path(&rel).exists() {
            warn!(path = %path.display(), "document not found, not adding");
            return Ok(false);
        }
        if self.register_document(&rel) {
            info!(document = %rel, "added document");
        }
        self.refresh_document(provider, &rel).await
    }

    /// Unregister a document, matching either its key or its absolute path.
    ///
    /// Chunks are left in place for [`gc`](Self::gc).
    pub fn forget_document(&mut self, path: &str) -> bool {
        let abs = if Path::new(path).is_absolute() {
            Some(normalize(Path::new(path)))
        } else {
            std::env::current_dir().ok().map(|cwd| normalize(&cwd.join(path)))
        };
        let pos = self.documents.iter().position(|d| {
            d.rel_path == path || abs.as_deref() == Some(self.abs_path(&d.rel_path).as_path())
        });
        match pos {
            Some(i) => {
                let doc = self.documents.remove(i);
                debug!(document = %doc.rel_path, "forgot document");
                true
            }
            None => false,
        }
    }

    /// Insert a candidate chunk or refresh the existing chunk with the same
    /// `(document, hash)`.
    ///
    /// An existing chunk takes the candidate's byte range and is no longer
    /// stale; `None` is returned since it already has an embedding. A new
    /// chunk is appended and its index returned so the caller can embed it.
    pub fn upsert(&mut self, mut candidate: Chunk) -> Option<usize> {
        let key = (candidate.document.clone(), candidate.hash.clone());
        if let Some(&i) = self.index.get(&key) {
            let existing = &mut self.chunks[i];
            existing.offset = candidate.offset;
            existing.length = candidate.length;
            existing.stale = false;
            if existing.token_count.is_none() {
                existing.token_count = candidate.token_count;
            }
            return None;
        }
        candidate.stale = false;
        self.chunks.push(candidate);
        let i = self.chunks.len() - 1;
        self.index.insert(key, i);
        Some(i)
    }

    /// Re-derive a document's chunks from its current content.
    ///
    /// Returns whether anything changed: a chunk was added, or a previous
    /// chunk was not re-derived and is left stale for GC. I/O errors
    /// reading the document abort the refresh.
    pub async fn refresh_document(&mut self, provider: &dyn Provider, rel_path: &str) -> Result<bool> {
        debug!(document = %rel_path, "refreshing document");
        for chunk in self.chunks.iter_mut().filter(|c| c.document == rel_path) {
            chunk.stale = true;
        }

        let text = self
            .read_document(rel_path)?
            .with_context(|| format!("document {} not found under {}", rel_path, self.root.display()))?;

        let candidates =
            self.chunker
                .chunks_from_text(Some(rel_path), &text, self.embedding_token_limit);
        let fresh: Vec<usize> = candidates
            .into_iter()
            .filter_map(|c| self.upsert(c))
            .collect();

        let still_stale = self
            .chunks
            .iter()
            .filter(|c| c.document == rel_path && c.stale)
            .count();
        debug!(
            document = %rel_path,
            new = fresh.len(),
            stale = still_stale,
            "chunks reconciled"
        );

        if !fresh.is_empty() {
            let texts: Vec<String> = fresh
                .iter()
                .map(|&i| header_text(rel_path, self.chunks[i].text.as_deref().unwrap_or_default()))
                .collect();
            let embeddings = provider.embed(&texts).await?;
            if embeddings.len() != texts.len() {
                bail!(
                    "provider returned {} embeddings for {} chunks",
                    embeddings.len(),
                    texts.len()
                );
            }
            for (&i, embedding) in fresh.iter().zip(embeddings) {
                let chunk = &mut self.chunks[i];
                chunk.embedding = embedding;
                chunk.text = None;
            }
        }

        Ok(!fresh.is_empty() || still_stale > 0)
    }

    /// Refresh every document. Documents missing from disk are forgotten
    /// first; GC runs at the end.
    pub async fn refresh_all(&mut self, provider: &dyn Provider) -> Result<bool> {
        let missing: Vec<String> = self
            .documents
            .iter()
            .filter(|d| !self.abs_path(&d.rel_path).exists())
            .map(|d| d.rel_path.clone())
            .collect();
        for rel in &missing {
            warn!(document = %rel, "document missing from disk, forgetting");
            self.forget_document(rel);
        }

        let mut changed = !missing.is_empty();
        let keys: Vec<String> = self.documents.iter().map(|d| d.rel_path.clone()).collect();
        for rel in keys {
            info!(document = %rel, "refreshing embeddings");
            changed |= self.refresh_document(provider, &rel).await?;
        }
        changed |= self.gc() > 0;
        Ok(changed)
    }

    /// Refresh documents modified after `since`. Missing documents are
    /// skipped and kept registered; GC runs at the end.
    pub async fn refresh_changed(&mut self, provider: &dyn Provider, since: SystemTime) -> Result<bool> {
        let keys: Vec<String> = self.documents.iter().map(|d| d.rel_path.clone()).collect();
        let mut changed = false;
        for rel in keys {
            let modified = match fs::metadata(self.abs_path(&rel)) {
                Ok(meta) => meta.modified()?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("stat {}", rel)),
            };
            if modified > since {
                changed |= self.refresh_document(provider, &rel).await?;
            }
        }
        changed |= self.gc() > 0;
        Ok(changed)
    }

    /// Drop every chunk that is stale or whose document is no longer
    /// registered. Returns the number of chunks removed.
    pub fn gc(&mut self) -> usize {
        let registered: HashSet<&str> = self.documents.iter().map(|d| d.rel_path.as_str()).collect();
        let before = self.chunks.len();
        let kept: Vec<Chunk> = std::mem::take(&mut self.chunks)
            .into_iter()
            .filter(|c| !c.stale && registered.contains(c.document.as_str()))
            .collect();
        self.chunks = kept;
        self.rebuild_index();
        let removed = before - self.chunks.len();
        if removed > 0 {
            debug!(removed, remaining = self.chunks.len(), "garbage collected chunks");
        }
        removed
    }

    /// Read a document's current content. `Ok(None)` if it does not exist.
    ///
    /// Invalid UTF-8 is replaced, and both chunking and text reads go
    /// through this function, so byte offsets stay consistent.
    pub fn read_document(&self, rel_path: &str) -> Result<Option<String>> {
        let path = self.abs_path(rel_path);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Text of a chunk, read from the live document.
    ///
    /// A missing document yields an empty string. The byte range is clamped
    /// to the current content.
    pub fn chunk_text(&self, chunk: &Chunk, opts: TextOptions) -> Result<String> {
        let Some(doc) = self.read_document(&chunk.document)? else {
            debug!(document = %chunk.document, "document not found, chunk text is empty");
            return Ok(String::new());
        };
        let start = snap_to_char_boundary(&doc, chunk.offset.min(doc.len()));
        let stop = snap_to_char_boundary(&doc, chunk.end().min(doc.len())).max(start);
        let raw = &doc[start..stop];

        let text = if opts.with_line_numbers {
            let first_line = doc[..start].split('\n').count();
            raw.split('\n')
                .enumerate()
                .map(|(i, line)| format!("{}: {}\n", first_line + i, line))
                .collect()
        } else {
            raw.to_string()
        };

        if opts.with_header {
            Ok(header_text(&chunk.document, &text))
        } else {
            Ok(text)
        }
    }

    /// Token count of the chunk at `index`, cached after the first call.
    /// `None` if there is no such chunk.
    pub fn token_count(&mut self, index: usize) -> Result<Option<usize>> {
        let Some(chunk) = self.chunks.get(index) else {
            return Ok(None);
        };
        if let Some(count) = chunk.token_count {
            return Ok(Some(count));
        }
        let text = self.chunk_text(chunk, TextOptions::default())?;
        let count = self.chunker.tokenizer().count_tokens(&text);
        self.chunks[index].token_count = Some(count);
        Ok(Some(count))
    }
}

/// Lexically normalize a path: drop `.` components and resolve `..`
/// against preceding components. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, WhitespaceTokenizer};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, limit: usize) -> ChunkStore {
        let chunker = Chunker::new(Arc::new(WhitespaceTokenizer));
        ChunkStore::new(dir.path(), chunker, limit)
    }

    fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_add_document_creates_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "a.md", "alpha beta\n\ngamma delta\n\nepsilon");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();

        assert!(store.add_document(&provider, &path).await.unwrap());
        assert_eq!(store.documents().len(), 1);
        assert_eq!(store.documents()[0].rel_path, "a.md");
        assert_eq!(store.chunks().len(), 3);
        assert!(store.chunks().iter().all(|c| c.embedding.is_some()));
        assert!(store.chunks().iter().all(|c| c.text.is_none()));
        assert_eq!(provider.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_token_count_is_cached_and_bounds_checked() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "a.md", "alpha beta\n\ngamma delta");
        let mut store = store_in(&tmp, 100);
        store.add_document(&MockProvider::new(), &path).await.unwrap();

        let count = store.token_count(0).unwrap().expect("first chunk");
        assert!(count > 0);
        assert_eq!(store.chunks()[0].token_count, Some(count));
        assert_eq!(store.token_count(0).unwrap(), Some(count));
        assert_eq!(store.token_count(store.chunks().len()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_unchanged_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "a.md", "one two\n\nthree four\n\nfive");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();
        store.add_document(&provider, &path).await.unwrap();
        let before = store.chunks().len();
        let calls = provider.embed_calls();

        let changed = store.refresh_document(&provider, "a.md").await.unwrap();
        assert!(!changed);
        assert_eq!(store.chunks().len(), before);
        assert_eq!(provider.embed_calls(), calls);
        assert!(store.chunks().iter().all(|c| !c.stale));
    }

    #[tokio::test]
    async fn test_refresh_edited_document_embeds_only_new_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "a.md", "keep this\n\nold paragraph");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();
        store.add_document(&provider, &path).await.unwrap();

        write(&tmp, "a.md", "inserted first\n\nkeep this\n\nnew paragraph");
        let embedded_before = provider.embedded_texts().len();
        assert!(store.refresh_document(&provider, "a.md").await.unwrap());
        let embedded: Vec<String> = provider.embedded_texts()[embedded_before..].to_vec();
        assert_eq!(embedded.len(), 2);
        assert!(embedded.iter().all(|t| !t.contains("keep this")));

        let kept = store
            .chunks()
            .iter()
            .find(|c| store.chunk_text(c, TextOptions::default()).unwrap() == "keep this\n\n")
            .expect("resurrected chunk");
        assert_eq!(kept.offset, "inserted first\n\n".len());

        assert_eq!(store.gc(), 1);
        assert_eq!(store.chunks().len(), 3);
    }

    #[tokio::test]
    async fn test_forget_then_gc_removes_orphans() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "apple\n\nbanana");
        let b = write(&tmp, "b.md", "cherry");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();
        store.add_document(&provider, &a).await.unwrap();
        store.add_document(&provider, &b).await.unwrap();

        assert!(store.forget_document("a.md"));
        assert!(!store.forget_document("a.md"));
        // soft orphaning: chunks survive until GC
        assert_eq!(store.chunks().len(), 3);
        assert_eq!(store.gc(), 2);
        for chunk in store.chunks() {
            assert!(store.has_document(&chunk.document));
        }
    }

    #[tokio::test]
    async fn test_forget_by_absolute_path() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "apple");
        let mut store = store_in(&tmp, 100);
        store.add_document(&MockProvider::new(), &a).await.unwrap();
        assert!(store.forget_document(a.to_str().unwrap()));
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_text_is_empty() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "some text here");
        let mut store = store_in(&tmp, 100);
        store.add_document(&MockProvider::new(), &a).await.unwrap();
        fs::remove_file(&a).unwrap();

        let chunk = store.chunks()[0].clone();
        assert_eq!(store.chunk_text(&chunk, TextOptions::default()).unwrap(), "");
        assert_eq!(store.chunks().len(), 1);
    }

    #[tokio::test]
    async fn test_add_missing_document_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp, 100);
        let changed = store
            .add_document(&MockProvider::new(), &tmp.path().join("nope.md"))
            .await
            .unwrap();
        assert!(!changed);
        assert!(store.documents().is_empty());
    }

    #[test]
    fn test_document_outside_root() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp, 100);
        let err = store.rel_path(Path::new("/definitely/elsewhere.md")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DocumentOutsideRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_chunk_text_header_and_line_numbers() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "l1\nl2\n\nl4\nl5");
        let mut store = store_in(&tmp, 100);
        store.add_document(&MockProvider::new(), &a).await.unwrap();
        let second = store.chunks()[1].clone();

        let numbered = store
            .chunk_text(
                &second,
                TextOptions {
                    with_header: true,
                    with_line_numbers: true,
                },
            )
            .unwrap();
        assert_eq!(numbered, "from a.md:\n4: l4\n5: l5\n\n");
    }

    #[tokio::test]
    async fn test_json_roundtrip_recomputes_root() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "x y z\n\nw");
        let mut store = store_in(&tmp, 100);
        store.add_document(&MockProvider::new(), &a).await.unwrap();

        let json = store.to_json().unwrap();
        let moved = TempDir::new().unwrap();
        let loaded = ChunkStore::from_json(
            &json,
            moved.path(),
            Chunker::new(Arc::new(WhitespaceTokenizer)),
            100,
        )
        .unwrap();
        assert_eq!(loaded.root(), normalize(moved.path()));
        assert_eq!(loaded.version(), STORE_VERSION);
        assert_eq!(loaded.documents(), store.documents());
        assert_eq!(loaded.chunks().len(), store.chunks().len());
        for (a, b) in loaded.chunks().iter().zip(store.chunks()) {
            assert_eq!(a.document, b.document);
            assert_eq!(a.offset, b.offset);
            assert_eq!(a.length, b.length);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.embedding, b.embedding);
        }
    }

    #[test]
    fn test_malformed_store() {
        let tmp = TempDir::new().unwrap();
        let err = ChunkStore::from_json(
            b"{not json",
            tmp.path(),
            Chunker::new(Arc::new(WhitespaceTokenizer)),
            10,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MalformedStore(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_all_forgets_missing_documents() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "first doc");
        let b = write(&tmp, "b.md", "second doc");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();
        store.add_document(&provider, &a).await.unwrap();
        store.add_document(&provider, &b).await.unwrap();
        fs::remove_file(&b).unwrap();

        assert!(store.refresh_all(&provider).await.unwrap());
        assert_eq!(store.documents().len(), 1);
        assert!(store.chunks().iter().all(|c| c.document == "a.md"));
    }

    #[tokio::test]
    async fn test_refresh_changed_skips_old_and_missing() {
        let tmp = TempDir::new().unwrap();
        let a = write(&tmp, "a.md", "stable");
        let mut store = store_in(&tmp, 100);
        let provider = MockProvider::new();
        store.add_document(&provider, &a).await.unwrap();
        store.register_document("gone.md");
        let calls = provider.embed_calls();

        let future = SystemTime::now() + std::time::Duration::from_secs(3600);
        assert!(!store.refresh_changed(&provider, future).await.unwrap());
        assert_eq!(provider.embed_calls(), calls);
        assert!(store.has_document("gone.md"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
