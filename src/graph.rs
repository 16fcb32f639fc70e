//! Social graph over user connection data.
//!
//! Ephemeral, rebuilt per computation: nodes are user ids, directed
//! edges carry the cached interaction strength as weight. Distance is
//! BFS hop count with the node count as a maximum-distance sentinel so
//! downstream arithmetic never sees infinity or an error. Eigenvector
//! centrality uses power iteration and reports non-convergence instead
//! of failing the caller.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::eid::Eid;
use crate::store::User;

/// Default weight for connections with no cached strength.
const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Defaults for the centrality power iteration.
pub const CENTRALITY_MAX_ITER: usize = 100;
pub const CENTRALITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("power iteration did not converge after {0} iterations")]
    NotConverged(usize),
}

#[derive(Debug, Clone)]
pub struct EdgeMeta {
    pub weight: f64,
    pub kind: Option<String>,
    pub last_interaction: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct SocialGraph {
    ids: Vec<Eid>,
    positions: HashMap<Eid, usize>,
    /// adjacency[i] = outgoing edges of ids[i]
    adjacency: Vec<Vec<(usize, EdgeMeta)>>,
}

impl SocialGraph {
    /// Build the directed graph from user connection lists. Edges to
    /// peers not present among `users` are skipped so the graph never
    /// holds dangling nodes; self-edges are rejected.
    pub fn build(users: &[User]) -> Self {
        let mut graph = SocialGraph::default();

        for user in users {
            graph.add_node(user.id.clone());
        }

        for user in users {
            let from = graph.positions[&user.id];
            for connection in &user.connections {
                if connection.peer_id == user.id {
                    log::debug!("skipping self-edge for {}", user.id);
                    continue;
                }
                let Some(&to) = graph.positions.get(&connection.peer_id) else {
                    continue;
                };
                graph.adjacency[from].push((
                    to,
                    EdgeMeta {
                        weight: connection.strength.unwrap_or(DEFAULT_EDGE_WEIGHT),
                        kind: connection.kind.clone(),
                        last_interaction: connection.last_interaction,
                    },
                ));
            }
        }

        graph
    }

    fn add_node(&mut self, id: Eid) {
        if self.positions.contains_key(&id) {
            return;
        }
        self.positions.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.adjacency.push(Vec::new());
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, id: &Eid) -> bool {
        self.positions.contains_key(id)
    }

    pub fn edges_from(&self, id: &Eid) -> &[(usize, EdgeMeta)] {
        self.positions
            .get(id)
            .map(|&pos| self.adjacency[pos].as_slice())
            .unwrap_or(&[])
    }

    /// Shortest path length in hops. When either endpoint is missing
    /// or no path exists, returns `node_count()` as the
    /// maximum-distance sentinel.
    pub fn distance(&self, from: &Eid, to: &Eid) -> usize {
        let sentinel = self.node_count();

        let (Some(&start), Some(&goal)) = (self.positions.get(from), self.positions.get(to))
        else {
            return sentinel;
        };

        if start == goal {
            return 0;
        }

        let mut visited = vec![false; self.node_count()];
        let mut queue = VecDeque::new();
        visited[start] = true;
        queue.push_back((start, 0usize));

        while let Some((node, hops)) = queue.pop_front() {
            for (next, _) in &self.adjacency[node] {
                if *next == goal {
                    return hops + 1;
                }
                if !visited[*next] {
                    visited[*next] = true;
                    queue.push_back((*next, hops + 1));
                }
            }
        }

        sentinel
    }

    /// Eigenvector centrality over incoming edge weights, by shifted
    /// power iteration (`x' = x + A^T x`; the identity shift keeps
    /// bipartite-style graphs from oscillating between two states
    /// forever). Callers must fall back to a stable order on
    /// `NotConverged` rather than fail.
    pub fn centrality(
        &self,
        max_iter: usize,
        tolerance: f64,
    ) -> Result<HashMap<Eid, f64>, GraphError> {
        let n = self.node_count();
        if n == 0 {
            return Ok(HashMap::new());
        }

        let mut scores = vec![1.0 / n as f64; n];

        for _ in 0..max_iter {
            let mut next = scores.clone();
            for (from, edges) in self.adjacency.iter().enumerate() {
                for (to, meta) in edges {
                    next[*to] += meta.weight * scores[from];
                }
            }

            let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                return Err(GraphError::NotConverged(max_iter));
            }
            for value in &mut next {
                *value /= norm;
            }

            let diff: f64 = next
                .iter()
                .zip(scores.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();

            scores = next;

            if diff < tolerance {
                return Ok(self.ids.iter().cloned().zip(scores).collect());
            }
        }

        Err(GraphError::NotConverged(max_iter))
    }
}
