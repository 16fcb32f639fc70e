//! Application service: owns the injected components and exposes one
//! method per external operation. The error enum is the single place
//! where failures get classified into the 400/404/500 buckets the
//! transport layer maps from.

use std::sync::Arc;

use serde::Serialize;

use crate::eid::{Eid, InvalidEid};
use crate::embedding::EmbeddingProvider;
use crate::engine::{ActorAnnotation, AuthorInfo, RecommendationEngine, RecommendationItem};
use crate::index::{CancelFlag, IndexManager, IndexManagerError, IndexStatus, RebuildOutcome};
use crate::interaction::InteractionCalculator;
use crate::randomness::RandomSource;
use crate::store::{Store, User};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("user not found")]
    UserNotFound,

    #[error("post not found")]
    PostNotFound,

    #[error("index failure: {0}")]
    Index(#[from] IndexManagerError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<InvalidEid> for AppError {
    fn from(err: InvalidEid) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<RecommendationItem>,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub interaction_strength: f64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionSummary {
    pub name: String,
    pub interaction_strength: f64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub total_connections: usize,
    pub connections: Vec<ConnectionSummary>,
}

#[derive(Debug, Serialize)]
pub struct PostDetailsResponse {
    pub owner: AuthorInfo,
    pub likes: Vec<ActorAnnotation>,
    pub comments: Vec<ActorAnnotation>,
    pub reactions: Vec<ActorAnnotation>,
    pub shares: Vec<ActorAnnotation>,
}

pub struct AppService {
    store: Arc<dyn Store>,
    index: Arc<IndexManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    random: Arc<dyn RandomSource>,
}

impl AppService {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<IndexManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            random,
        }
    }

    pub fn recommend(
        &self,
        email: &str,
        limit: Option<usize>,
    ) -> Result<RecommendResponse, AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("email is required".to_string()));
        }

        let user = self
            .store
            .user_by_email(email)?
            .ok_or(AppError::UserNotFound)?;

        let engine =
            RecommendationEngine::new(self.store.as_ref(), &self.index, self.embedder.as_ref());
        let recommendations = engine.recommend(&user, limit.unwrap_or(usize::MAX))?;

        Ok(RecommendResponse { recommendations })
    }

    pub fn rebuild_index(
        &self,
        incremental: bool,
        cancel: &CancelFlag,
    ) -> Result<RebuildOutcome, AppError> {
        let outcome = if incremental {
            self.index.rebuild_incremental(cancel)?
        } else {
            self.index.rebuild_full(cancel)?
        };
        Ok(outcome)
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index.status()
    }

    /// Calculate and persist the directional strength for the pair.
    pub fn compute_interaction(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<InteractionResponse, AppError> {
        let (source, target) = self.resolve_pair(source_id, target_id)?;

        let calculator = InteractionCalculator::new(self.store.as_ref(), self.random.as_ref());
        let breakdown = calculator.calculate(&source, &target)?;
        log::debug!(
            "interaction {} -> {}: {}",
            source.id,
            target.id,
            serde_json::to_string(&breakdown).unwrap_or_default()
        );

        calculator.store_strength(&source.id, &target.id, breakdown.score)?;

        Ok(InteractionResponse {
            interaction_strength: breakdown.score,
        })
    }

    /// Read back the stored strength for the ordered pair; 0 when no
    /// record exists yet.
    pub fn stored_interaction(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<InteractionResponse, AppError> {
        let source = Eid::parse(source_id)?;
        let target = Eid::parse(target_id)?;

        let interaction_strength = self
            .store
            .interaction(&source, &target)?
            .map(|record| record.score)
            .unwrap_or(0.0);

        Ok(InteractionResponse {
            interaction_strength,
        })
    }

    pub fn connections(&self, user_id: &str) -> Result<ConnectionsResponse, AppError> {
        let id = Eid::parse(user_id)?;
        let user = self.store.user_by_id(&id)?.ok_or(AppError::UserNotFound)?;

        let connections = user
            .connections
            .iter()
            .map(|connection| {
                let name = if connection.profile.full_name.is_empty() {
                    self.store
                        .user_by_id(&connection.peer_id)
                        .ok()
                        .flatten()
                        .map(|peer| peer.full_name)
                        .unwrap_or_else(|| "Unknown".to_string())
                } else {
                    connection.profile.full_name.clone()
                };

                let interaction_strength = match connection.strength {
                    Some(cached) => cached,
                    None => self
                        .store
                        .interaction(&user.id, &connection.peer_id)
                        .ok()
                        .flatten()
                        .map(|record| record.score)
                        .unwrap_or(0.0),
                };

                ConnectionSummary {
                    name,
                    interaction_strength,
                }
            })
            .collect();

        Ok(ConnectionsResponse {
            total_connections: user.connections.len(),
            connections,
        })
    }

    pub fn post_details(&self, post_id: &str) -> Result<PostDetailsResponse, AppError> {
        let id = Eid::parse(post_id)?;
        let post = self.store.post_by_id(&id)?.ok_or(AppError::PostNotFound)?;

        // annotations are relative to the post owner; a missing owner
        // document degrades to an anonymous placeholder rather than
        // failing the whole request
        let owner = match self.store.user_by_id(&post.author_id)? {
            Some(user) => user,
            None => {
                log::warn!("post {} has unresolvable author {}", post.id, post.author_id);
                User {
                    id: post.author_id.clone(),
                    full_name: "Unknown".to_string(),
                    ..Default::default()
                }
            }
        };

        let engine =
            RecommendationEngine::new(self.store.as_ref(), &self.index, self.embedder.as_ref());
        let engagement = engine.annotate_engagement(&owner, &post);

        Ok(PostDetailsResponse {
            owner: AuthorInfo {
                id: owner.id.clone(),
                name: owner.full_name.clone(),
                email: owner.email.clone(),
            },
            likes: engagement.likes,
            comments: engagement.comments,
            reactions: engagement.reactions,
            shares: engagement.shares,
        })
    }

    fn resolve_pair(&self, source_id: &str, target_id: &str) -> Result<(User, User), AppError> {
        if source_id.trim().is_empty() || target_id.trim().is_empty() {
            return Err(AppError::Validation(
                "source and target user ids are required".to_string(),
            ));
        }

        let source_id = Eid::parse(source_id)?;
        let target_id = Eid::parse(target_id)?;

        let source = self
            .store
            .user_by_id(&source_id)?
            .ok_or(AppError::UserNotFound)?;
        let target = self
            .store
            .user_by_id(&target_id)?
            .ok_or(AppError::UserNotFound)?;

        Ok((source, target))
    }
}
