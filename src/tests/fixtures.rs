//! Shared fixtures: deterministic embedder, disk-backed stores, and
//! record builders used across the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::config::IndexConfig;
use crate::eid::Eid;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexManager, IndexStorage, INDEX_FILE};
use crate::storage::BackendLocal;
use crate::store::{
    Connection, Engagement, JsonStore, Post, ProfileSnapshot, User,
};

/// Deterministic embedding provider. Texts can be pinned to exact
/// vectors; anything unpinned gets a stable hash-derived vector.
pub struct StubEmbedder {
    dimensions: usize,
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    pub fail: AtomicBool,
    pub batch_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            pinned: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn pin(&self, text: &str, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dimensions);
        self.pinned.lock().unwrap().insert(text.to_string(), vector);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(pinned) = self.pinned.lock().unwrap().get(text) {
            return pinned.clone();
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (position, byte) in text.bytes().enumerate() {
            vector[position % self.dimensions] += byte as f32 / 255.0;
        }
        vector
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn model_id_hash(&self) -> [u8; 32] {
        let mut hash = [0u8; 32];
        hash[0] = 0x57;
        hash
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(EmbeddingError::EmbeddingFailed("stub outage".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(EmbeddingError::EmbeddingFailed("stub outage".to_string()));
        }
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

pub fn empty_store() -> (tempfile::TempDir, Arc<JsonStore>) {
    let dir = tempfile::tempdir().unwrap();
    let backend = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();
    let store = Arc::new(JsonStore::load(backend).unwrap());
    (dir, store)
}

pub fn index_manager(
    store: Arc<JsonStore>,
    embedder: Arc<StubEmbedder>,
    dir: &tempfile::TempDir,
    staleness_days: i64,
) -> IndexManager {
    let config = IndexConfig {
        staleness_days,
        max_posts: 20_000,
        rebuild_batch: 2,
    };
    IndexManager::new(
        embedder,
        store,
        IndexStorage::new(dir.path().join(INDEX_FILE)),
        &config,
    )
}

pub fn user(name: &str) -> User {
    User {
        id: Eid::new(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        full_name: name.to_string(),
        ..Default::default()
    }
}

pub fn connect(user: &mut User, peer: &User, strength: Option<f64>) {
    user.connections.push(Connection {
        peer_id: peer.id.clone(),
        strength,
        kind: None,
        last_interaction: None,
        profile: ProfileSnapshot {
            full_name: peer.full_name.clone(),
        },
    });
}

pub fn post(author: &User, text: &str, age_days: i64) -> Post {
    Post {
        id: Eid::new(),
        author_id: author.id.clone(),
        text: text.to_string(),
        created_at: Utc::now() - Duration::days(age_days),
        ..Default::default()
    }
}

pub fn engagement(actor: &User, age_days: i64) -> Engagement {
    Engagement {
        actor_id: actor.id.clone(),
        created_at: Utc::now() - Duration::days(age_days),
        text: None,
    }
}
