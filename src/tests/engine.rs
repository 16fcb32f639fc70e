//! Ranking engine tests: lexicographic precedence, tie-breaks, dedup,
//! per-candidate failure isolation, and engagement annotation.

use std::sync::Arc;

use crate::engine::RecommendationEngine;
use crate::index::IndexManager;
use crate::storage::BackendLocal;
use crate::store::{JsonStore, Post, Store, User};
use crate::tests::fixtures::{
    connect, empty_store, engagement, index_manager, post, user, StubEmbedder,
};

const DIM: usize = 4;

struct Setup {
    _dir: tempfile::TempDir,
    store: Arc<JsonStore>,
    embedder: Arc<StubEmbedder>,
    manager: IndexManager,
}

fn setup() -> Setup {
    let (dir, store) = empty_store();
    let embedder = Arc::new(StubEmbedder::new(DIM));
    let manager = index_manager(store.clone(), embedder.clone(), &dir, 7);
    Setup {
        _dir: dir,
        store,
        embedder,
        manager,
    }
}

impl Setup {
    fn engine(&self) -> RecommendationEngine<'_> {
        RecommendationEngine::new(
            self.store.as_ref(),
            &self.manager,
            self.embedder.as_ref(),
        )
    }
}

#[test]
fn test_connection_authored_outranks_high_scores() {
    let s = setup();

    let mut viewer = user("Viewer");
    let connection = user("Connection");
    let stranger = user("Stranger");
    connect(&mut viewer, &connection, None);

    // viewer's own writing defines the semantic query
    let own = post(&viewer, "rust systems programming", 1);
    s.embedder.pin("rust systems programming", vec![1.0, 0.0, 0.0, 0.0]);

    // connection post: stale, unengaged, semantically distant
    let weak = post(&connection, "sourdough starters", 40);
    s.embedder.pin("sourdough starters", vec![0.0, 9.0, 0.0, 0.0]);

    // stranger post: identical vector (semantic 1.0) and heavy engagement
    let mut strong = post(&stranger, "rust systems programming today", 0);
    s.embedder
        .pin("rust systems programming today", vec![1.0, 0.0, 0.0, 0.0]);
    for _ in 0..10 {
        strong.shares.push(engagement(&connection, 0));
    }

    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(connection).unwrap();
    s.store.put_user(stranger).unwrap();
    s.store.put_post(own).unwrap();
    s.store.put_post(weak.clone()).unwrap();
    s.store.put_post(strong.clone()).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].post_id, weak.id);
    assert!(items[0].is_connection_authored);
    assert!(!items[1].is_connection_authored);
    // the outranked post really did have the better scores
    assert!(items[1].interaction_priority > items[0].interaction_priority);
    assert!(items[1].semantic_score > items[0].semantic_score);
}

#[test]
fn test_priority_orders_within_tier_then_semantic() {
    let s = setup();

    let mut viewer = user("Viewer");
    let friend = user("Friend");
    connect(&mut viewer, &friend, None);
    let a = user("Author A");
    let b = user("Author B");
    let c = user("Author C");

    let own = post(&viewer, "graph databases", 1);
    s.embedder.pin("graph databases", vec![1.0, 0.0, 0.0, 0.0]);

    // engaged post wins its tier on priority
    let mut engaged = post(&a, "engaged", 0);
    engaged.likes.push(engagement(&friend, 0));

    // among unengaged posts semantic similarity decides
    let near = post(&b, "near text", 0);
    let far = post(&c, "far text", 0);
    s.embedder.pin("near text", vec![1.0, 0.1, 0.0, 0.0]);
    s.embedder.pin("far text", vec![0.0, 5.0, 0.0, 0.0]);
    s.embedder.pin("engaged", vec![0.0, 6.0, 0.0, 0.0]);

    for u in [&viewer, &friend, &a, &b, &c] {
        s.store.put_user(u.clone()).unwrap();
    }
    s.store.put_post(own).unwrap();
    s.store.put_post(far.clone()).unwrap();
    s.store.put_post(engaged.clone()).unwrap();
    s.store.put_post(near.clone()).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    let order: Vec<_> = items.iter().map(|i| i.post_id.clone()).collect();

    assert_eq!(order, vec![engaged.id, near.id, far.id]);
}

#[test]
fn test_ties_keep_first_seen_order() {
    let s = setup();

    let mut viewer = user("Viewer");
    let friend = user("Friend");
    connect(&mut viewer, &friend, None);

    // no own posts: semantic 0 everywhere; no engagement: priority 0
    let first = post(&friend, "first in store order", 50);
    let second = post(&friend, "second in store order", 50);

    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(friend).unwrap();
    s.store.put_post(first.clone()).unwrap();
    s.store.put_post(second.clone()).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    assert_eq!(items[0].post_id, first.id);
    assert_eq!(items[1].post_id, second.id);
}

#[test]
fn test_duplicate_store_rows_deduplicated() {
    let dir = tempfile::tempdir().unwrap();

    let viewer = user("Viewer");
    let author = user("Author");
    let duplicated = post(&author, "listed twice", 1);

    let users: Vec<User> = vec![viewer.clone(), author.clone()];
    let posts: Vec<Post> = vec![duplicated.clone(), duplicated.clone()];
    std::fs::write(
        dir.path().join("users.json"),
        serde_json::to_vec(&users).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("posts.json"),
        serde_json::to_vec(&posts).unwrap(),
    )
    .unwrap();

    let backend = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();
    let store = Arc::new(JsonStore::load(backend).unwrap());
    assert_eq!(store.posts().unwrap().len(), 2);

    let embedder = Arc::new(StubEmbedder::new(DIM));
    let manager = index_manager(store.clone(), embedder.clone(), &dir, 7);
    let engine = RecommendationEngine::new(store.as_ref(), &manager, embedder.as_ref());

    let items = engine.recommend(&viewer, usize::MAX).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].post_id, duplicated.id);
}

#[test]
fn test_unresolvable_author_dropped_not_fatal() {
    let s = setup();

    let viewer = user("Viewer");
    let known = user("Known");
    let ghost = user("Ghost"); // never written to the store

    let good = post(&known, "resolvable", 1);
    let orphan = post(&ghost, "orphaned", 1);

    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(known).unwrap();
    s.store.put_post(orphan).unwrap();
    s.store.put_post(good.clone()).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].post_id, good.id);
}

#[test]
fn test_embedding_outage_degrades_to_empty() {
    let s = setup();

    let viewer = user("Viewer");
    let author = user("Author");

    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(author.clone()).unwrap();
    s.store.put_post(post(&viewer, "my own words", 1)).unwrap();
    s.store.put_post(post(&author, "candidate", 1)).unwrap();

    s.embedder.set_failing(true);

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    assert!(items.is_empty());
}

#[test]
fn test_viewer_without_posts_scores_semantic_zero() {
    let s = setup();

    let viewer = user("Viewer");
    let author = user("Author");

    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(author.clone()).unwrap();
    s.store.put_post(post(&author, "some candidate", 1)).unwrap();
    s.store.put_post(post(&author, "another candidate", 1)).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.semantic_score == 0.0));
}

#[test]
fn test_own_posts_excluded_from_candidates() {
    let s = setup();

    let viewer = user("Viewer");
    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_post(post(&viewer, "talking to myself", 1)).unwrap();

    let items = s.engine().recommend(&viewer, usize::MAX).unwrap();
    assert!(items.is_empty());
}

#[test]
fn test_limit_truncates_after_ranking() {
    let s = setup();

    let viewer = user("Viewer");
    let author = user("Author");
    s.store.put_user(viewer.clone()).unwrap();
    s.store.put_user(author.clone()).unwrap();
    for i in 0..5 {
        s.store.put_post(post(&author, &format!("post {i}"), 1)).unwrap();
    }

    let items = s.engine().recommend(&viewer, 2).unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn test_engagement_annotation_connection_first_then_strength() {
    let s = setup();

    let mut viewer = user("Viewer");
    let weak_friend = user("Weak Friend");
    let strong_friend = user("Strong Friend");
    let stranger = user("Stranger");
    let author = user("Author");
    connect(&mut viewer, &weak_friend, Some(10.0));
    connect(&mut viewer, &strong_friend, Some(60.0));

    for u in [&viewer, &weak_friend, &strong_friend, &stranger, &author] {
        s.store.put_user(u.clone()).unwrap();
    }

    // stored directional record gives the stranger a nonzero strength
    s.store
        .upsert_interaction(crate::store::InteractionStrengthRecord {
            source_id: viewer.id.clone(),
            target_id: stranger.id.clone(),
            score: 30.0,
            created_at: chrono::Utc::now(),
            last_updated: chrono::Utc::now(),
        })
        .unwrap();

    let mut p = post(&author, "engaged post", 1);
    p.likes.push(engagement(&stranger, 0));
    p.likes.push(engagement(&weak_friend, 0));
    p.likes.push(engagement(&strong_friend, 0));

    let breakdown = s.engine().annotate_engagement(&viewer, &p);

    let likes = &breakdown.likes;
    assert_eq!(likes.len(), 3);
    // connections first, ordered by strength, stranger last
    assert_eq!(likes[0].actor_id, strong_friend.id);
    assert!((likes[0].interaction_strength - 60.0).abs() < 1e-9);
    assert!(likes[0].is_connection);
    assert_eq!(likes[1].actor_id, weak_friend.id);
    assert_eq!(likes[2].actor_id, stranger.id);
    assert!(!likes[2].is_connection);
    assert!((likes[2].interaction_strength - 30.0).abs() < 1e-9);
}
