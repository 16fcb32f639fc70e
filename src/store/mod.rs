//! Document store boundary.
//!
//! The core never talks to a database directly; it goes through the
//! `Store` trait, constructed and injected at startup. `JsonStore` is
//! the file-backed implementation: whole-file JSON arrays behind an
//! in-memory cache, persisted atomically through the storage backend.

pub mod types;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::eid::Eid;
use crate::storage::{BackendLocal, StorageManager};
pub use types::{
    Connection, Education, Engagement, InteractionStrengthRecord, Location, Post,
    ProfileSnapshot, User, WorkExperience,
};

const USERS_FILE: &str = "users.json";
const POSTS_FILE: &str = "posts.json";
const INTERACTIONS_FILE: &str = "interactions.json";

pub trait Store: Send + Sync {
    fn users(&self) -> anyhow::Result<Vec<User>>;
    fn user_by_id(&self, id: &Eid) -> anyhow::Result<Option<User>>;
    fn user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// All posts in stable insertion order. Candidate enumeration and
    /// ranking tie-breaks depend on this order being deterministic.
    fn posts(&self) -> anyhow::Result<Vec<Post>>;
    fn post_by_id(&self, id: &Eid) -> anyhow::Result<Option<Post>>;
    fn posts_by_author(&self, author: &Eid) -> anyhow::Result<Vec<Post>>;
    fn posts_created_after(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Post>>;

    fn interaction(&self, source: &Eid, target: &Eid)
        -> anyhow::Result<Option<InteractionStrengthRecord>>;
    fn upsert_interaction(&self, record: InteractionStrengthRecord) -> anyhow::Result<()>;
}

pub struct JsonStore {
    backend: BackendLocal,
    users: RwLock<Vec<User>>,
    posts: RwLock<Vec<Post>>,
    interactions: RwLock<HashMap<(Eid, Eid), InteractionStrengthRecord>>,
}

impl JsonStore {
    pub fn load(backend: BackendLocal) -> anyhow::Result<Self> {
        let users: Vec<User> = read_json_or_default(&backend, USERS_FILE)?;
        let posts: Vec<Post> = read_json_or_default(&backend, POSTS_FILE)?;
        let interaction_rows: Vec<InteractionStrengthRecord> =
            read_json_or_default(&backend, INTERACTIONS_FILE)?;

        let interactions = interaction_rows
            .into_iter()
            .map(|rec| ((rec.source_id.clone(), rec.target_id.clone()), rec))
            .collect();

        Ok(Self {
            backend,
            users: RwLock::new(users),
            posts: RwLock::new(posts),
            interactions: RwLock::new(interactions),
        })
    }

    /// Insert or replace a user document and persist the file.
    pub fn put_user(&self, user: User) -> anyhow::Result<()> {
        {
            let mut users = self.users.write().unwrap();
            match users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user,
                None => users.push(user),
            }
        }
        self.persist_users()
    }

    /// Insert or replace a post document and persist the file.
    pub fn put_post(&self, post: Post) -> anyhow::Result<()> {
        {
            let mut posts = self.posts.write().unwrap();
            match posts.iter_mut().find(|p| p.id == post.id) {
                Some(existing) => *existing = post,
                None => posts.push(post),
            }
        }
        self.persist_posts()
    }

    fn persist_users(&self) -> anyhow::Result<()> {
        let users = self.users.read().unwrap();
        let data = serde_json::to_vec_pretty(&*users)?;
        self.backend.write(USERS_FILE, &data)?;
        Ok(())
    }

    fn persist_posts(&self) -> anyhow::Result<()> {
        let posts = self.posts.read().unwrap();
        let data = serde_json::to_vec_pretty(&*posts)?;
        self.backend.write(POSTS_FILE, &data)?;
        Ok(())
    }

    fn persist_interactions(&self) -> anyhow::Result<()> {
        let interactions = self.interactions.read().unwrap();
        let mut rows: Vec<&InteractionStrengthRecord> = interactions.values().collect();
        // key order for a reproducible file
        rows.sort_by(|a, b| (&a.source_id, &a.target_id).cmp(&(&b.source_id, &b.target_id)));
        let data = serde_json::to_vec_pretty(&rows)?;
        self.backend.write(INTERACTIONS_FILE, &data)?;
        Ok(())
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(
    backend: &BackendLocal,
    ident: &str,
) -> anyhow::Result<T> {
    if !backend.exists(ident) {
        return Ok(T::default());
    }
    let data = backend.read(ident)?;
    Ok(serde_json::from_slice(&data)?)
}

impl Store for JsonStore {
    fn users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.read().unwrap().clone())
    }

    fn user_by_id(&self, id: &Eid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().unwrap().iter().find(|u| &u.id == id).cloned())
    }

    fn user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn posts(&self) -> anyhow::Result<Vec<Post>> {
        Ok(self.posts.read().unwrap().clone())
    }

    fn post_by_id(&self, id: &Eid) -> anyhow::Result<Option<Post>> {
        Ok(self.posts.read().unwrap().iter().find(|p| &p.id == id).cloned())
    }

    fn posts_by_author(&self, author: &Eid) -> anyhow::Result<Vec<Post>> {
        Ok(self
            .posts
            .read()
            .unwrap()
            .iter()
            .filter(|p| &p.author_id == author)
            .cloned()
            .collect())
    }

    fn posts_created_after(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Post>> {
        Ok(self
            .posts
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.created_at > cutoff)
            .cloned()
            .collect())
    }

    fn interaction(
        &self,
        source: &Eid,
        target: &Eid,
    ) -> anyhow::Result<Option<InteractionStrengthRecord>> {
        Ok(self
            .interactions
            .read()
            .unwrap()
            .get(&(source.clone(), target.clone()))
            .cloned())
    }

    fn upsert_interaction(&self, record: InteractionStrengthRecord) -> anyhow::Result<()> {
        {
            let mut interactions = self.interactions.write().unwrap();
            let key = (record.source_id.clone(), record.target_id.clone());
            match interactions.get_mut(&key) {
                // last-write-wins by last_updated; a stale writer never
                // clobbers a fresher score
                Some(existing) if existing.last_updated > record.last_updated => {}
                Some(existing) => {
                    existing.score = record.score;
                    existing.last_updated = record.last_updated;
                }
                None => {
                    interactions.insert(key, record);
                }
            }
        }
        self.persist_interactions()
    }
}
