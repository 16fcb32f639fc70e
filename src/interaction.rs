//! Multi-factor interaction strength between two users.
//!
//! Directional: `calculate(a, b)` scores how strongly `a` relates to
//! `b` and is not required to equal `calculate(b, a)` (content and
//! temporal factors look at the target's activity on the source's
//! posts). Seven bounded sub-scores, each clamped to [0, 1], combine
//! through a fixed weight table; the result is scaled into [0, 100].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::eid::Eid;
use crate::randomness::RandomSource;
use crate::store::{InteractionStrengthRecord, Location, Post, Store, User};

const W_PROFESSIONAL: f64 = 0.25;
const W_SKILLS: f64 = 0.20;
const W_SOCIAL: f64 = 0.15;
const W_CONTENT: f64 = 0.15;
const W_GEOGRAPHIC: f64 = 0.10;
const W_TEMPORAL: f64 = 0.10;
const W_SERENDIPITY: f64 = 0.05;

/// Pairs of skills that complement each other across a collaboration.
const COMPLEMENTARY_SKILLS: [(&str, &str); 4] = [
    ("python", "data science"),
    ("frontend", "backend"),
    ("design", "marketing"),
    ("machine learning", "software engineering"),
];

/// Keywords that mark two role titles as similar.
const ROLE_KEYWORDS: [&str; 8] = [
    "manager", "developer", "engineer", "lead", "senior", "junior", "director", "analyst",
];

/// Geographic proximity fades to zero at this range.
const MAX_RELEVANT_KM: f64 = 10_000.0;

/// Temporal engagement fades to zero after a year.
const ENGAGEMENT_HORIZON_DAYS: f64 = 365.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Every factor next to the final score, for logging and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct StrengthBreakdown {
    pub professional_proximity: f64,
    pub skill_resonance: f64,
    pub social_connectivity: f64,
    pub content_interaction: f64,
    pub geographic_proximity: f64,
    pub temporal_engagement: f64,
    pub serendipity: f64,
    /// Final directional score in [0, 100].
    pub score: f64,
}

pub struct InteractionCalculator<'a> {
    store: &'a dyn Store,
    random: &'a dyn RandomSource,
}

impl<'a> InteractionCalculator<'a> {
    pub fn new(store: &'a dyn Store, random: &'a dyn RandomSource) -> Self {
        Self { store, random }
    }

    pub fn calculate(&self, source: &User, target: &User) -> anyhow::Result<StrengthBreakdown> {
        let source_posts = self.store.posts_by_author(&source.id)?;
        let now = Utc::now();

        let professional_proximity = professional_proximity(source, target);
        let skill_resonance = skill_resonance(&source.skills, &target.skills);
        let social_connectivity = social_connectivity(source, target);
        let content_interaction = content_interaction(&source_posts, &target.id);
        let geographic_proximity = geographic_proximity(source.location, target.location);
        let temporal_engagement = temporal_engagement(&source_posts, &target.id, now);
        let serendipity = self.random.right_skewed().clamp(0.0, 1.0);

        let weighted_sum = W_PROFESSIONAL * professional_proximity
            + W_SKILLS * skill_resonance
            + W_SOCIAL * social_connectivity
            + W_CONTENT * content_interaction
            + W_GEOGRAPHIC * geographic_proximity
            + W_TEMPORAL * temporal_engagement
            + W_SERENDIPITY * serendipity;

        let score = (weighted_sum * 10.0).clamp(0.0, 100.0);

        Ok(StrengthBreakdown {
            professional_proximity,
            skill_resonance,
            social_connectivity,
            content_interaction,
            geographic_proximity,
            temporal_engagement,
            serendipity,
            score,
        })
    }

    /// Upsert the record for the ordered pair; `created_at` of an
    /// existing row is preserved, `last_updated` advances.
    pub fn store_strength(
        &self,
        source: &Eid,
        target: &Eid,
        score: f64,
    ) -> anyhow::Result<InteractionStrengthRecord> {
        let now = Utc::now();
        let created_at = self
            .store
            .interaction(source, target)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let record = InteractionStrengthRecord {
            source_id: source.clone(),
            target_id: target.clone(),
            score,
            created_at,
            last_updated: now,
        };
        self.store.upsert_interaction(record.clone())?;
        Ok(record)
    }
}

/// +0.5 per work-experience pair with a shared employer or a similar
/// role, +0.3 per education pair with a shared institution or degree;
/// capped at 1.0.
fn professional_proximity(source: &User, target: &User) -> f64 {
    let mut score: f64 = 0.0;

    for source_work in &source.work_experience {
        for target_work in &target.work_experience {
            let same_employer = !source_work.employer.is_empty()
                && source_work.employer == target_work.employer;
            if same_employer || roles_similar(&source_work.role, &target_work.role) {
                score += 0.5;
            }
        }
    }

    for source_edu in &source.education {
        for target_edu in &target.education {
            let same_institution = !source_edu.institution.is_empty()
                && source_edu.institution == target_edu.institution;
            let same_degree =
                !source_edu.degree.is_empty() && source_edu.degree == target_edu.degree;
            if same_institution || same_degree {
                score += 0.3;
            }
        }
    }

    score.min(1.0)
}

/// Jaccard similarity of the two skill sets, +0.2 when any cross pair
/// is on the complementary list; capped at 1.0.
fn skill_resonance(source_skills: &[String], target_skills: &[String]) -> f64 {
    use std::collections::HashSet;

    let source: HashSet<&str> = source_skills.iter().map(String::as_str).collect();
    let target: HashSet<&str> = target_skills.iter().map(String::as_str).collect();

    let intersection = source.intersection(&target).count();
    let union = source.union(&target).count();

    let similarity = if union > 0 {
        intersection as f64 / union as f64
    } else {
        0.0
    };

    let complementary = source
        .iter()
        .any(|s| target.iter().any(|t| skills_complementary(s, t)));
    let bonus = if complementary { 0.2 } else { 0.0 };

    (similarity + bonus).min(1.0)
}

/// `|shared connections| / (|union of connections| + 1)`, capped at 1.0.
fn social_connectivity(source: &User, target: &User) -> f64 {
    use std::collections::HashSet;

    let source_peers: HashSet<&Eid> = source.connections.iter().map(|c| &c.peer_id).collect();
    let target_peers: HashSet<&Eid> = target.connections.iter().map(|c| &c.peer_id).collect();

    let shared = source_peers.intersection(&target_peers).count();
    let union = source_peers.union(&target_peers).count();

    (shared as f64 / (union as f64 + 1.0)).min(1.0)
}

/// +0.3 for each source post the target liked, +0.5 for each the
/// target commented on; capped at 1.0.
fn content_interaction(source_posts: &[Post], target: &Eid) -> f64 {
    let mut score: f64 = 0.0;

    for post in source_posts {
        if post.liked_by(target) {
            score += 0.3;
        }
        if post.commented_by(target) {
            score += 0.5;
        }
    }

    score.min(1.0)
}

/// `max(1 - distance_km / 10000, 0)`; 0 when either location is
/// missing.
fn geographic_proximity(source: Option<Location>, target: Option<Location>) -> f64 {
    match (source, target) {
        (Some(a), Some(b)) => (1.0 - haversine_km(&a, &b) / MAX_RELEVANT_KM).max(0.0),
        _ => 0.0,
    }
}

/// Mean recency weight over the target's likes and comments on the
/// source's posts: each interaction contributes
/// `max(1 - days_since / 365, 0)`. 0 when there are none.
fn temporal_engagement(source_posts: &[Post], target: &Eid, now: DateTime<Utc>) -> f64 {
    let mut weights = Vec::new();

    for post in source_posts {
        for engagement in post.likes.iter().chain(post.comments.iter()) {
            if &engagement.actor_id != target {
                continue;
            }
            let days = (now - engagement.created_at).num_seconds() as f64 / SECONDS_PER_DAY;
            weights.push((1.0 - days / ENGAGEMENT_HORIZON_DAYS).max(0.0));
        }
    }

    if weights.is_empty() {
        return 0.0;
    }

    weights.iter().sum::<f64>() / weights.len() as f64
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

fn roles_similar(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();

    ROLE_KEYWORDS
        .iter()
        .any(|keyword| a.contains(keyword) && b.contains(keyword))
}

fn skills_complementary(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    COMPLEMENTARY_SKILLS.iter().any(|(first, second)| {
        (first.contains(&a) && second.contains(&b)) || (second.contains(&a) && first.contains(&b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Education, Engagement, WorkExperience};
    use chrono::Duration;

    fn skills(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_haversine_mumbai_delhi() {
        let mumbai = Location {
            latitude: 19.0760,
            longitude: 72.8777,
        };
        let delhi = Location {
            latitude: 28.6139,
            longitude: 77.2090,
        };

        let distance = haversine_km(&mumbai, &delhi);
        assert!((distance - 1150.0).abs() < 20.0, "got {distance}");

        let proximity = geographic_proximity(Some(mumbai), Some(delhi));
        assert!((proximity - 0.885).abs() < 0.005, "got {proximity}");
    }

    #[test]
    fn test_geographic_proximity_missing_location() {
        let here = Location {
            latitude: 0.0,
            longitude: 0.0,
        };
        assert_eq!(geographic_proximity(None, Some(here)), 0.0);
        assert_eq!(geographic_proximity(Some(here), None), 0.0);
        assert_eq!(geographic_proximity(None, None), 0.0);
    }

    #[test]
    fn test_skill_resonance_jaccard() {
        // intersection 1 ({Python}), union 3 -> 1/3, no complementary pair
        let score = skill_resonance(&skills(&["Python", "SQL"]), &skills(&["Python", "React"]));
        assert!((score - 1.0 / 3.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_skill_resonance_complementary_bonus() {
        let score = skill_resonance(&skills(&["frontend"]), &skills(&["backend"]));
        // Jaccard 0, bonus 0.2
        assert!((score - 0.2).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_skill_resonance_caps_at_one() {
        let score = skill_resonance(
            &skills(&["python", "frontend"]),
            &skills(&["python", "frontend", "backend"]),
        );
        assert!(score <= 1.0);
    }

    #[test]
    fn test_skill_resonance_empty_sets() {
        assert_eq!(skill_resonance(&[], &[]), 0.0);
    }

    #[test]
    fn test_roles_similar_keyword_match() {
        assert!(roles_similar("Senior Backend Engineer", "Platform Engineer"));
        assert!(roles_similar("Engineering Manager", "Product Manager"));
        assert!(!roles_similar("Designer", "Accountant"));
        assert!(!roles_similar("", "Engineer"));
    }

    #[test]
    fn test_professional_proximity_caps_at_one() {
        let work = |employer: &str, role: &str| WorkExperience {
            employer: employer.to_string(),
            role: role.to_string(),
            start: None,
            end: None,
        };
        let edu = |institution: &str, degree: &str| Education {
            institution: institution.to_string(),
            degree: degree.to_string(),
            year: None,
        };

        let source = User {
            work_experience: vec![work("Acme", "Engineer"), work("Globex", "Lead Engineer")],
            education: vec![edu("MIT", "BSc")],
            ..Default::default()
        };
        let target = User {
            work_experience: vec![work("Acme", "Engineer"), work("Initech", "Engineer")],
            education: vec![edu("MIT", "MSc")],
            ..Default::default()
        };

        // work pairs matching: far more than enough to exceed 1.0
        assert_eq!(professional_proximity(&source, &target), 1.0);
    }

    #[test]
    fn test_professional_proximity_education_only() {
        let source = User {
            education: vec![Education {
                institution: "IIT Bombay".into(),
                degree: "BTech".into(),
                year: Some(2018),
            }],
            ..Default::default()
        };
        let target = User {
            education: vec![Education {
                institution: "IIT Bombay".into(),
                degree: "MTech".into(),
                year: Some(2020),
            }],
            ..Default::default()
        };

        assert!((professional_proximity(&source, &target) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_content_interaction_weights() {
        let target = Eid::new();
        let now = Utc::now();
        let engagement = |actor: &Eid| Engagement {
            actor_id: actor.clone(),
            created_at: now,
            text: None,
        };

        let liked = Post {
            likes: vec![engagement(&target)],
            ..Default::default()
        };
        let commented = Post {
            comments: vec![engagement(&target)],
            ..Default::default()
        };

        assert!((content_interaction(&[liked.clone()], &target) - 0.3).abs() < 1e-9);
        assert!((content_interaction(&[commented.clone()], &target) - 0.5).abs() < 1e-9);
        // two liked+commented posts would be 1.6, capped at 1.0
        let both = Post {
            likes: vec![engagement(&target)],
            comments: vec![engagement(&target)],
            ..Default::default()
        };
        assert_eq!(content_interaction(&[both.clone(), both], &target), 1.0);
    }

    #[test]
    fn test_temporal_engagement_mean_decay() {
        let target = Eid::new();
        let now = Utc::now();

        let post = Post {
            likes: vec![
                Engagement {
                    actor_id: target.clone(),
                    created_at: now, // weight 1.0
                    text: None,
                },
                Engagement {
                    actor_id: target.clone(),
                    created_at: now - Duration::days(730), // beyond horizon, weight 0.0
                    text: None,
                },
            ],
            ..Default::default()
        };

        let score = temporal_engagement(&[post], &target, now);
        assert!((score - 0.5).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn test_temporal_engagement_no_interactions() {
        let target = Eid::new();
        let post = Post::default();
        assert_eq!(temporal_engagement(&[post], &target, Utc::now()), 0.0);
    }

    #[test]
    fn test_social_connectivity_shared_over_union() {
        use crate::store::{Connection, ProfileSnapshot};

        let shared_peer = Eid::new();
        let connection = |peer: &Eid| Connection {
            peer_id: peer.clone(),
            strength: None,
            kind: None,
            last_interaction: None,
            profile: ProfileSnapshot::default(),
        };

        let source = User {
            connections: vec![connection(&shared_peer), connection(&Eid::new())],
            ..Default::default()
        };
        let target = User {
            connections: vec![connection(&shared_peer)],
            ..Default::default()
        };

        // shared 1, union 2 -> 1/3
        let score = social_connectivity(&source, &target);
        assert!((score - 1.0 / 3.0).abs() < 1e-9, "got {score}");
    }
}
