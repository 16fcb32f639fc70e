//! Vector index lifecycle: load, staleness, rebuilds, search.
//!
//! Searches read an immutable `Arc` snapshot and never block each
//! other. Rebuilds are the only mutation of persisted state and are
//! serialized on a dedicated mutex (single-flight); a trigger that
//! arrives while a rebuild runs waits for the lock, re-checks
//! freshness, and usually becomes a no-op. A corrupted or
//! model-mismatched file on disk is absorbed by rebuilding from
//! scratch, never surfaced to callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::flat::{FlatL2Index, SearchHit};
use crate::index::storage::{IndexStorage, IndexStorageError};
use crate::store::{Post, Store};

#[derive(Debug, thiserror::Error)]
pub enum IndexManagerError {
    /// Recoverable: the engine degrades to an empty candidate set.
    #[error("embedding backend failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("failed to persist index: {0}")]
    Storage(#[from] IndexStorageError),

    #[error("document store failed: {0}")]
    Store(#[from] anyhow::Error),

    #[error("query dimension mismatch: {0}")]
    Query(#[from] crate::index::flat::IndexError),

    #[error("rebuild cancelled")]
    Cancelled,
}

/// Cooperative cancellation for rebuilds; checked between embedding
/// batches since embedding dominates rebuild cost.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Immutable index state shared read-only across concurrent searches.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub index: FlatL2Index,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RebuildOutcome {
    /// Full rebuild replaced the whole index.
    Rebuilt { posts: usize },
    /// Incremental append added vectors for new posts.
    Extended { added: usize },
    /// Nothing to do.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub exists: bool,
    pub post_count: Option<usize>,
    pub created_at: Option<DateTime<Utc>>,
    pub stale: Option<bool>,
}

pub struct IndexManager {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn Store>,
    storage: IndexStorage,

    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuild_lock: Mutex<()>,

    staleness: Duration,
    max_posts: usize,
    batch_size: usize,
}

impl IndexManager {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn Store>,
        storage: IndexStorage,
        config: &IndexConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            storage,
            snapshot: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            staleness: Duration::days(config.staleness_days),
            max_posts: config.max_posts,
            batch_size: config.rebuild_batch.max(1),
        }
    }

    fn is_fresh(&self, created_at: DateTime<Utc>) -> bool {
        Utc::now() - created_at <= self.staleness
    }

    fn install(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let shared = Arc::new(snapshot);
        *self.snapshot.write().unwrap() = Some(shared.clone());
        shared
    }

    pub fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Make sure a usable snapshot exists: load the persisted index, or
    /// rebuild in full when it is missing, corrupted, built by another
    /// model, or older than the staleness window.
    pub fn ensure_fresh(&self, cancel: &CancelFlag) -> Result<Arc<IndexSnapshot>, IndexManagerError> {
        if let Some(snapshot) = self.current() {
            if self.is_fresh(snapshot.created_at) {
                return Ok(snapshot);
            }
        }

        let _guard = self.rebuild_lock.lock().unwrap();

        // another caller may have finished a rebuild while we waited
        if let Some(snapshot) = self.current() {
            if self.is_fresh(snapshot.created_at) {
                return Ok(snapshot);
            }
        }

        if self.storage.exists() {
            match self.storage.load(&self.embedder.model_id_hash()) {
                Ok(persisted) if self.is_fresh(persisted.created_at) => {
                    log::info!(
                        "loaded vector index: {} posts, built {}",
                        persisted.index.len(),
                        persisted.created_at
                    );
                    return Ok(self.install(IndexSnapshot {
                        index: persisted.index,
                        created_at: persisted.created_at,
                    }));
                }
                Ok(persisted) => {
                    log::info!(
                        "vector index built {} exceeds the staleness window, rebuilding",
                        persisted.created_at
                    );
                }
                Err(e) => {
                    log::warn!("persisted vector index unusable ({e}), rebuilding from scratch");
                }
            }
        }

        self.rebuild_full_locked(cancel).map(|(snapshot, _)| snapshot)
    }

    /// Rebuild the whole index from the current post corpus.
    pub fn rebuild_full(&self, cancel: &CancelFlag) -> Result<RebuildOutcome, IndexManagerError> {
        let _guard = self.rebuild_lock.lock().unwrap();
        self.rebuild_full_locked(cancel).map(|(_, outcome)| outcome)
    }

    fn rebuild_full_locked(
        &self,
        cancel: &CancelFlag,
    ) -> Result<(Arc<IndexSnapshot>, RebuildOutcome), IndexManagerError> {
        let mut posts: Vec<Post> = self
            .store
            .posts()?
            .into_iter()
            .filter(|p| !p.text.trim().is_empty())
            .collect();
        posts.truncate(self.max_posts);

        log::info!("rebuilding vector index over {} posts", posts.len());

        let vectors = self.embed_posts(&posts, cancel)?;

        let dimensions = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut index = FlatL2Index::with_capacity(dimensions, posts.len());
        for (post, vector) in posts.iter().zip(vectors) {
            index.push(post.id.clone(), &vector)?;
        }

        let created_at = Utc::now();
        self.storage
            .save(&index, &self.embedder.model_id_hash(), created_at)?;

        let count = index.len();
        let snapshot = self.install(IndexSnapshot { index, created_at });
        Ok((snapshot, RebuildOutcome::Rebuilt { posts: count }))
    }

    /// Append vectors for posts created since the last build. Cheaper
    /// than a full rebuild for steady content inflow, but never
    /// re-embeds edited or removed posts; the staleness window bounds
    /// that drift.
    pub fn rebuild_incremental(
        &self,
        cancel: &CancelFlag,
    ) -> Result<RebuildOutcome, IndexManagerError> {
        let _guard = self.rebuild_lock.lock().unwrap();

        let Some(current) = self.current() else {
            return self.rebuild_full_locked(cancel).map(|(_, outcome)| outcome);
        };

        // an empty structure has no dimensionality to append into;
        // building from scratch is the same amount of work anyway
        if current.index.is_empty() {
            return self.rebuild_full_locked(cancel).map(|(_, outcome)| outcome);
        }

        let capacity_left = self.max_posts.saturating_sub(current.index.len());
        let mut new_posts: Vec<Post> = self
            .store
            .posts_created_after(current.created_at)?
            .into_iter()
            .filter(|p| !p.text.trim().is_empty())
            .collect();
        new_posts.truncate(capacity_left);

        if new_posts.is_empty() {
            return Ok(RebuildOutcome::Unchanged);
        }

        let vectors = self.embed_posts(&new_posts, cancel)?;

        let mut index = current.index.clone();
        for (post, vector) in new_posts.iter().zip(vectors) {
            index.push(post.id.clone(), &vector)?;
        }

        let created_at = Utc::now();
        self.storage
            .save(&index, &self.embedder.model_id_hash(), created_at)?;

        let added = new_posts.len();
        log::info!("extended vector index with {added} posts");
        self.install(IndexSnapshot { index, created_at });
        Ok(RebuildOutcome::Extended { added })
    }

    /// Search the current snapshot. Returns an empty result when no
    /// snapshot is loaded yet; callers that need one go through
    /// `ensure_fresh` first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexManagerError> {
        match self.current() {
            Some(snapshot) => Ok(snapshot.index.search(query, k)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn status(&self) -> IndexStatus {
        if let Some(snapshot) = self.current() {
            return IndexStatus {
                exists: true,
                post_count: Some(snapshot.index.len()),
                created_at: Some(snapshot.created_at),
                stale: Some(!self.is_fresh(snapshot.created_at)),
            };
        }

        if !self.storage.exists() {
            return IndexStatus {
                exists: false,
                post_count: None,
                created_at: None,
                stale: None,
            };
        }

        match self.storage.load(&self.embedder.model_id_hash()) {
            Ok(persisted) => IndexStatus {
                exists: true,
                post_count: Some(persisted.index.len()),
                created_at: Some(persisted.created_at),
                stale: Some(!self.is_fresh(persisted.created_at)),
            },
            Err(_) => IndexStatus {
                exists: true,
                post_count: None,
                created_at: None,
                stale: None,
            },
        }
    }

    fn embed_posts(
        &self,
        posts: &[Post],
        cancel: &CancelFlag,
    ) -> Result<Vec<Vec<f32>>, IndexManagerError> {
        let mut vectors = Vec::with_capacity(posts.len());

        for batch in posts.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexManagerError::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            vectors.extend(self.embedder.embed_batch(&texts)?);

            log::debug!("embedded {}/{} posts", vectors.len(), posts.len());
        }

        Ok(vectors)
    }
}
