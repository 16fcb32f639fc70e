//! Strict record schema for the document store.
//!
//! Raw documents in the wild carry variant key spellings
//! (`lat`/`latitude`, `companyName`/`employer`, `userId`/`actor_id`).
//! serde aliases normalize them here, at the adapter boundary, so the
//! core only ever sees one schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eid::Eid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default, alias = "yearOfGraduation")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    #[serde(alias = "companyName", alias = "company")]
    pub employer: String,
    pub role: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Cached view of a peer held inside a connection entry, enough to
/// render connection listings without a second lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(alias = "fullName", alias = "name")]
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(alias = "peerId", alias = "_id")]
    pub peer_id: Eid,

    /// Cached interaction strength in [0, 100], written by whatever
    /// maintains the connection lists. May lag the stored records.
    #[serde(default, alias = "interaction_strength", alias = "cachedStrength")]
    pub strength: Option<f64>,

    #[serde(default, alias = "type")]
    pub kind: Option<String>,

    #[serde(default, alias = "lastInteraction")]
    pub last_interaction: Option<DateTime<Utc>>,

    #[serde(default, alias = "profileSnapshot")]
    pub profile: ProfileSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Eid,
    pub email: String,
    #[serde(alias = "fullName")]
    pub full_name: String,

    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default, alias = "workExperience")]
    pub work_experience: Vec<WorkExperience>,

    #[serde(default)]
    pub location: Option<Location>,

    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl User {
    pub fn is_connected_to(&self, peer: &Eid) -> bool {
        self.connections.iter().any(|c| &c.peer_id == peer)
    }

    pub fn connection(&self, peer: &Eid) -> Option<&Connection> {
        self.connections.iter().find(|c| &c.peer_id == peer)
    }
}

/// A single like/comment/reaction/share on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(alias = "userId", alias = "actorId")]
    pub actor_id: Eid,
    #[serde(alias = "createdAt", alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Eid,
    #[serde(alias = "userId", alias = "authorId")]
    pub author_id: Eid,
    #[serde(default)]
    pub text: String,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub likes: Vec<Engagement>,
    #[serde(default)]
    pub comments: Vec<Engagement>,
    #[serde(default)]
    pub reactions: Vec<Engagement>,
    #[serde(default)]
    pub shares: Vec<Engagement>,
}

impl Default for Post {
    fn default() -> Self {
        Self {
            id: Eid::new(),
            author_id: Eid::new(),
            text: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            likes: Vec::new(),
            comments: Vec::new(),
            reactions: Vec::new(),
            shares: Vec::new(),
        }
    }
}

impl Post {
    pub fn liked_by(&self, actor: &Eid) -> bool {
        self.likes.iter().any(|e| &e.actor_id == actor)
    }

    pub fn commented_by(&self, actor: &Eid) -> bool {
        self.comments.iter().any(|e| &e.actor_id == actor)
    }
}

/// Directional affinity record for an ordered (source, target) pair.
/// At most one row exists per pair; upserts are last-write-wins by
/// `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStrengthRecord {
    #[serde(alias = "source_user_id")]
    pub source_id: Eid,
    #[serde(alias = "target_user_id")]
    pub target_id: Eid,
    /// Affinity score in [0, 100]
    #[serde(alias = "interaction_strength")]
    pub score: f64,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}
