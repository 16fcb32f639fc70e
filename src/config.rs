use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

/// Default embedding model (bge-base offers +13% accuracy vs MiniLM)
const DEFAULT_EMBEDDING_MODEL: &str = "bge-base-en-v1.5";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Maximum age of the persisted vector index before a full rebuild is forced.
const DEFAULT_STALENESS_DAYS: i64 = 7;
/// Hard cap on posts embedded per rebuild, keeps worst-case latency predictable.
const DEFAULT_MAX_POSTS: usize = 20_000;
/// Posts embedded per batch during rebuilds.
const DEFAULT_REBUILD_BATCH: usize = 64;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Configuration for the embedding backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the vector index lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Staleness window in days; an older persisted index is rebuilt in full
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,

    /// Maximum posts embedded per full rebuild
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    /// Embedding batch size during rebuilds
    #[serde(default = "default_rebuild_batch")]
    pub rebuild_batch: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            staleness_days: DEFAULT_STALENESS_DAYS,
            max_posts: DEFAULT_MAX_POSTS,
            rebuild_batch: DEFAULT_REBUILD_BATCH,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_staleness_days() -> i64 {
    DEFAULT_STALENESS_DAYS
}

fn default_max_posts() -> usize {
    DEFAULT_MAX_POSTS
}

fn default_rebuild_batch() -> usize {
    DEFAULT_REBUILD_BATCH
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Config {
    fn validate(&mut self) {
        if self.index.staleness_days <= 0 {
            panic!(
                "index.staleness_days must be positive, got {}",
                self.index.staleness_days
            );
        }

        if self.index.max_posts == 0 {
            panic!("index.max_posts must be greater than 0");
        }

        if self.index.rebuild_batch == 0 {
            self.index.rebuild_batch = 1;
        }

        if self.embedding.download_timeout_secs == 0 {
            panic!("embedding.download_timeout_secs must be greater than 0");
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            panic!("server.bind is not a valid socket address: {}", self.server.bind);
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("cannot create data directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("cannot write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("cannot read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("cannot create data directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("cannot write config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path().to_str().unwrap());

        assert_eq!(config.index.staleness_days, 7);
        assert_eq!(config.index.max_posts, 20_000);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "index:\n  staleness_days: 3\n").unwrap();

        let config = Config::load_with(dir.path().to_str().unwrap());
        assert_eq!(config.index.staleness_days, 3);
        assert_eq!(config.index.max_posts, 20_000);
    }

    #[test]
    #[should_panic(expected = "index.staleness_days must be positive")]
    fn test_invalid_staleness_panics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "index:\n  staleness_days: 0\n").unwrap();

        Config::load_with(dir.path().to_str().unwrap());
    }
}
