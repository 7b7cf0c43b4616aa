//! Random walks over weighted edges.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use tracing::debug;

use crate::core::graph::{GraphError, StoryGraph};
use crate::core::node::PROBABILITY_EPSILON;

/// Default bound on storyline length.
pub const DEFAULT_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorylineGenerator {
    pub max_len: usize,
}

impl Default for StorylineGenerator {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl StorylineGenerator {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Walk from `start` following weighted edges. The walk stops when a
    /// node has no weighted edges or the draw lands on a self-loop.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        graph: &StoryGraph,
        start: &str,
        rng: &mut R,
    ) -> Result<Vec<String>, GraphError> {
        if !graph.contains(start) {
            return Err(GraphError::UnknownNode(start.to_string()));
        }

        let mut line = vec![start.to_string()];
        let mut current = start.to_string();
        loop {
            let edges = graph.weighted_edges(&current);
            if edges.is_empty() {
                break;
            }
            let next = pick_next(&current, &edges, rng)?;
            if next == current {
                break;
            }
            if line.len() >= self.max_len {
                return Err(GraphError::StorylineTooLong { max: self.max_len });
            }
            line.push(next.clone());
            current = next;
        }
        debug!(start, len = line.len(), "generated storyline");
        Ok(line)
    }
}

fn pick_next<R: Rng + ?Sized>(
    from: &str,
    edges: &[(&str, f64)],
    rng: &mut R,
) -> Result<String, GraphError> {
    let total: f64 = edges.iter().map(|(_, w)| w).sum();
    let invalid = |to: &str, weight: f64| GraphError::InvalidWeight {
        from: from.to_string(),
        to: to.to_string(),
        weight,
    };
    if (total - 1.0).abs() > PROBABILITY_EPSILON {
        return Err(invalid("*", total));
    }
    let weights: Vec<f64> = edges.iter().map(|(_, w)| *w).collect();
    let dist = WeightedIndex::new(&weights).map_err(|_| invalid("*", total))?;
    Ok(edges[dist.sample(rng)].0.to_string())
}
