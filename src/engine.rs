//! Recommendation scorer and ranking engine.
//!
//! Merges three signals per candidate post: semantic similarity of the
//! post text to the requesting user's own writing, engagement priority
//! weighted toward the user's network, and whether the author is a
//! direct connection. The ranking key is strictly lexicographic —
//! connection-authored content always outranks non-connection content
//! regardless of score magnitude, which is a deliberate choice to
//! prioritize known-network content over purely topical relevance.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::eid::Eid;
use crate::embedding::EmbeddingProvider;
use crate::graph::SocialGraph;
use crate::index::{CancelFlag, IndexManager};
use crate::store::{Post, Store, User};

/// Engagement weights; doubled when the actor is a direct connection.
const LIKE_WEIGHT: f64 = 1.0;
const COMMENT_WEIGHT: f64 = 1.5;
const SHARE_WEIGHT: f64 = 2.0;

/// Exponential age decay applied to interaction priority.
const PRIORITY_DECAY_PER_DAY: f64 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorInfo {
    pub id: Eid,
    pub name: String,
    pub email: String,
}

/// One engagement actor, annotated relative to the viewing user and
/// sorted by `(is_connection desc, interaction_strength desc)`.
#[derive(Debug, Clone, Serialize)]
pub struct ActorAnnotation {
    pub actor_id: Eid,
    pub name: String,
    pub is_connection: bool,
    pub interaction_strength: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngagementBreakdown {
    pub likes: Vec<ActorAnnotation>,
    pub comments: Vec<ActorAnnotation>,
    pub reactions: Vec<ActorAnnotation>,
    pub shares: Vec<ActorAnnotation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationItem {
    pub post_id: Eid,
    pub text: String,
    pub author_id: Eid,
    pub semantic_score: f64,
    pub interaction_priority: f64,
    pub is_connection_authored: bool,
    pub author: AuthorInfo,
    pub engagement: EngagementBreakdown,
}

pub struct RecommendationEngine<'a> {
    store: &'a dyn Store,
    index: &'a IndexManager,
    embedder: &'a dyn EmbeddingProvider,
}

struct ScoredCandidate {
    post: Post,
    author: User,
    is_connection_authored: bool,
    interaction_priority: f64,
    semantic_score: f64,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(
        store: &'a dyn Store,
        index: &'a IndexManager,
        embedder: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// Rank the candidate pool for `user`. A single bad candidate is
    /// dropped with a warning; an unavailable index or embedding
    /// backend degrades to an empty result instead of failing the
    /// request.
    pub fn recommend(
        &self,
        user: &User,
        limit: usize,
    ) -> anyhow::Result<Vec<RecommendationItem>> {
        let connection_ids: HashSet<&Eid> =
            user.connections.iter().map(|c| &c.peer_id).collect();

        let all_posts = self.store.posts()?;

        let own_posts: Vec<&Post> = all_posts
            .iter()
            .filter(|p| p.author_id == user.id)
            .collect();

        let semantic_scores = match self.semantic_scores(&own_posts) {
            Ok(scores) => scores,
            Err(e) => {
                log::warn!("semantic scoring unavailable ({e}), returning empty recommendations");
                return Ok(Vec::new());
            }
        };

        // connection-authored candidates first, then the rest, both in
        // store order; first-seen position is the final tie-break
        let candidates = all_posts
            .iter()
            .filter(|p| p.author_id != user.id && connection_ids.contains(&p.author_id))
            .chain(
                all_posts
                    .iter()
                    .filter(|p| p.author_id != user.id && !connection_ids.contains(&p.author_id)),
            );

        let now = Utc::now();
        let mut seen: HashSet<Eid> = HashSet::new();
        let mut author_cache: HashMap<Eid, Option<User>> = HashMap::new();
        let mut scored: Vec<ScoredCandidate> = Vec::new();

        for post in candidates {
            if !seen.insert(post.id.clone()) {
                continue;
            }

            let author = match self.cached_author(&mut author_cache, &post.author_id) {
                Some(author) => author,
                None => {
                    log::warn!(
                        "dropping candidate {}: author {} could not be resolved",
                        post.id,
                        post.author_id
                    );
                    continue;
                }
            };

            scored.push(ScoredCandidate {
                is_connection_authored: connection_ids.contains(&post.author_id),
                interaction_priority: interaction_priority(post, &connection_ids, now),
                semantic_score: semantic_scores.get(&post.id).copied().unwrap_or(0.0),
                post: post.clone(),
                author,
            });
        }

        if scored.len() < 2 {
            // score-based ranking is infeasible; order by author
            // centrality, keeping original order if it does not converge
            self.centrality_order(&mut scored);
        } else {
            scored.sort_by(|a, b| {
                b.is_connection_authored
                    .cmp(&a.is_connection_authored)
                    .then_with(|| b.interaction_priority.total_cmp(&a.interaction_priority))
                    .then_with(|| b.semantic_score.total_cmp(&a.semantic_score))
            });
        }

        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|candidate| RecommendationItem {
                post_id: candidate.post.id.clone(),
                text: candidate.post.text.clone(),
                author_id: candidate.post.author_id.clone(),
                semantic_score: candidate.semantic_score,
                interaction_priority: candidate.interaction_priority,
                is_connection_authored: candidate.is_connection_authored,
                author: AuthorInfo {
                    id: candidate.author.id.clone(),
                    name: candidate.author.full_name.clone(),
                    email: candidate.author.email.clone(),
                },
                engagement: self.annotate_engagement(user, &candidate.post),
            })
            .collect())
    }

    /// L2 distances from the user's aggregated text to every indexed
    /// post, converted to `1 / (1 + distance)`. Empty when the user has
    /// no posts to aggregate.
    fn semantic_scores(
        &self,
        own_posts: &[&Post],
    ) -> Result<HashMap<Eid, f64>, crate::index::IndexManagerError> {
        let query_text = own_posts
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if query_text.is_empty() {
            return Ok(HashMap::new());
        }

        self.index.ensure_fresh(&CancelFlag::new())?;
        let query = self.embedder.embed(&query_text)?;

        let hits = self.index.search(&query, usize::MAX)?;
        Ok(hits
            .into_iter()
            .map(|hit| (hit.post_id, 1.0 / (1.0 + hit.distance as f64)))
            .collect())
    }

    fn cached_author(
        &self,
        cache: &mut HashMap<Eid, Option<User>>,
        author_id: &Eid,
    ) -> Option<User> {
        if let Some(cached) = cache.get(author_id) {
            return cached.clone();
        }

        let author = match self.store.user_by_id(author_id) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("author lookup failed for {author_id}: {e}");
                None
            }
        };
        cache.insert(author_id.clone(), author.clone());
        author
    }

    fn centrality_order(&self, scored: &mut [ScoredCandidate]) {
        let users = match self.store.users() {
            Ok(users) => users,
            Err(e) => {
                log::warn!("centrality fallback unavailable ({e}), keeping candidate order");
                return;
            }
        };

        let centrality = SocialGraph::build(&users)
            .centrality(crate::graph::CENTRALITY_MAX_ITER, crate::graph::CENTRALITY_TOLERANCE);
        match centrality {
            Ok(centrality) => {
                scored.sort_by(|a, b| {
                    let ca = centrality.get(&a.post.author_id).copied().unwrap_or(0.0);
                    let cb = centrality.get(&b.post.author_id).copied().unwrap_or(0.0);
                    cb.total_cmp(&ca)
                });
            }
            Err(e) => {
                log::debug!("centrality did not converge ({e}), keeping candidate order");
            }
        }
    }

    /// Annotate a post's engagement lists relative to `viewer`: each
    /// actor carries connection membership and interaction strength
    /// (cached connection strength, else the stored directional record
    /// viewer→actor, else 0), sorted connections-first then by
    /// strength.
    pub fn annotate_engagement(&self, viewer: &User, post: &Post) -> EngagementBreakdown {
        let mut name_cache: HashMap<Eid, Option<User>> = HashMap::new();

        let mut annotate = |entries: &[crate::store::Engagement]| -> Vec<ActorAnnotation> {
            let mut annotated: Vec<ActorAnnotation> = entries
                .iter()
                .map(|entry| {
                    let actor = self.cached_author(&mut name_cache, &entry.actor_id);
                    let name = actor
                        .map(|u| u.full_name)
                        .or_else(|| {
                            viewer
                                .connection(&entry.actor_id)
                                .map(|c| c.profile.full_name.clone())
                        })
                        .unwrap_or_else(|| "Unknown".to_string());

                    ActorAnnotation {
                        is_connection: viewer.is_connected_to(&entry.actor_id),
                        interaction_strength: self.annotation_strength(viewer, &entry.actor_id),
                        name,
                        actor_id: entry.actor_id.clone(),
                        created_at: entry.created_at,
                        text: entry.text.clone(),
                    }
                })
                .collect();

            annotated.sort_by(|a, b| {
                b.is_connection
                    .cmp(&a.is_connection)
                    .then_with(|| b.interaction_strength.total_cmp(&a.interaction_strength))
            });
            annotated
        };

        EngagementBreakdown {
            likes: annotate(&post.likes),
            comments: annotate(&post.comments),
            reactions: annotate(&post.reactions),
            shares: annotate(&post.shares),
        }
    }

    fn annotation_strength(&self, viewer: &User, actor: &Eid) -> f64 {
        if let Some(strength) = viewer.connection(actor).and_then(|c| c.strength) {
            return strength;
        }

        match self.store.interaction(&viewer.id, actor) {
            Ok(Some(record)) => record.score,
            Ok(None) => 0.0,
            Err(e) => {
                log::warn!("interaction lookup failed for {actor}: {e}");
                0.0
            }
        }
    }
}

/// Engagement-priority score for a post: weighted count of recent
/// like/comment/share actors (doubled for the viewer's connections),
/// decayed exponentially by post age.
pub fn interaction_priority(
    post: &Post,
    connections: &HashSet<&Eid>,
    now: DateTime<Utc>,
) -> f64 {
    let weigh = |actors: &[crate::store::Engagement], base: f64| -> f64 {
        actors
            .iter()
            .map(|entry| {
                if connections.contains(&entry.actor_id) {
                    base * 2.0
                } else {
                    base
                }
            })
            .sum::<f64>()
    };

    let raw = weigh(&post.likes, LIKE_WEIGHT)
        + weigh(&post.comments, COMMENT_WEIGHT)
        + weigh(&post.shares, SHARE_WEIGHT);

    let age_days = ((now - post.created_at).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);

    raw * (-PRIORITY_DECAY_PER_DAY * age_days).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Engagement;
    use chrono::Duration;

    fn engagement(actor: &Eid, at: DateTime<Utc>) -> Engagement {
        Engagement {
            actor_id: actor.clone(),
            created_at: at,
            text: None,
        }
    }

    #[test]
    fn test_priority_weights_and_doubling() {
        let connection = Eid::new();
        let stranger = Eid::new();
        let connections: HashSet<&Eid> = [&connection].into_iter().collect();
        let now = Utc::now();

        let post = Post {
            created_at: now,
            likes: vec![engagement(&connection, now), engagement(&stranger, now)],
            comments: vec![engagement(&connection, now)],
            shares: vec![engagement(&stranger, now)],
            ..Default::default()
        };

        // likes: 2 + 1, comments: 3, shares: 2, age 0 -> no decay
        let priority = interaction_priority(&post, &connections, now);
        assert!((priority - 8.0).abs() < 1e-6, "got {priority}");
    }

    #[test]
    fn test_priority_decays_with_age() {
        let actor = Eid::new();
        let connections = HashSet::new();
        let now = Utc::now();

        let fresh = Post {
            created_at: now,
            likes: vec![engagement(&actor, now)],
            ..Default::default()
        };
        let aged = Post {
            created_at: now - Duration::days(10),
            likes: vec![engagement(&actor, now)],
            ..Default::default()
        };

        let fresh_priority = interaction_priority(&fresh, &connections, now);
        let aged_priority = interaction_priority(&aged, &connections, now);

        assert!(aged_priority < fresh_priority);
        assert!((aged_priority - (-1.0f64).exp()).abs() < 1e-3);
    }

    #[test]
    fn test_priority_ignores_reactions() {
        let actor = Eid::new();
        let now = Utc::now();
        let post = Post {
            created_at: now,
            reactions: vec![engagement(&actor, now)],
            ..Default::default()
        };

        assert_eq!(interaction_priority(&post, &HashSet::new(), now), 0.0);
    }
}
