//! Static checks run before a story starts.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::core::action::Action;
use crate::core::graph::StoryGraph;
use crate::core::node::PROBABILITY_EPSILON;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerificationError {
    #[error("no start node")]
    NoStartNode,
    #[error("more than one start node: {}", .0.join(", "))]
    MultipleStartNodes(Vec<String>),
    #[error("node '{node}' reads context key '{key}', which is not in the context")]
    MissingContextKey { node: String, key: String },
    #[error("{referenced_by} refers to unknown node '{node}'")]
    UnknownNode { referenced_by: String, node: String },
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("node '{node}' has invalid probability {probability} for '{destination}'")]
    InvalidProbability {
        node: String,
        destination: String,
        probability: f64,
    },
    #[error("dynamic events of '{node}' sum to {total}, more than 1")]
    DynamicEventOverflow { node: String, total: f64 },
    #[error("weighted edges out of '{node}' sum to {total}, not 1")]
    WeightsNotNormalized { node: String, total: f64 },
    #[error("an intent classifier is required: {0}")]
    ClassifierRequired(String),
}

impl StoryGraph {
    /// Every problem found, in a stable order.
    pub fn problems(&self) -> Vec<VerificationError> {
        let mut problems = Vec::new();

        if let Err(e) = self.start_node() {
            problems.push(e);
        }

        for node in self.nodes() {
            let mut keys: Vec<&str> = node.bindings().iter().map(|b| b.key.as_str()).collect();
            for action in node.actions() {
                keys.extend(action.referenced_keys().into_iter().map(|k| node.resolve(k)));
            }
            keys.extend(
                node.run_conditions()
                    .iter()
                    .filter_map(|c| c.context_key())
                    .map(|k| node.resolve(k)),
            );
            let mut seen = FxHashSet::default();
            keys.retain(|k| seen.insert(*k));
            for key in keys {
                if self.context().lookup(key).is_none() {
                    problems.push(VerificationError::MissingContextKey {
                        node: node.name().to_string(),
                        key: key.to_string(),
                    });
                }
            }

            for target in node.run_conditions().iter().filter_map(|c| c.node_ref()) {
                if !self.contains(target) {
                    problems.push(VerificationError::UnknownNode {
                        referenced_by: format!("run condition of '{}'", node.name()),
                        node: target.to_string(),
                    });
                }
            }

            for (destination, &probability) in node.dynamic_events() {
                if !self.contains(destination) {
                    problems.push(VerificationError::UnknownNode {
                        referenced_by: format!("dynamic event of '{}'", node.name()),
                        node: destination.clone(),
                    });
                }
                if !(0.0..=1.0).contains(&probability) {
                    problems.push(VerificationError::InvalidProbability {
                        node: node.name().to_string(),
                        destination: destination.clone(),
                        probability,
                    });
                }
            }
            let total = node.dynamic_mass();
            if total > 1.0 + PROBABILITY_EPSILON {
                problems.push(VerificationError::DynamicEventOverflow {
                    node: node.name().to_string(),
                    total,
                });
            }

            let weighted = self.weighted_edges(node.name());
            if !weighted.is_empty() {
                let total: f64 = weighted.iter().map(|(_, w)| w).sum();
                if (total - 1.0).abs() > PROBABILITY_EPSILON {
                    problems.push(VerificationError::WeightsNotNormalized {
                        node: node.name().to_string(),
                        total,
                    });
                }
            }
        }

        let mut referenced: Vec<String> = self.dependencies().keys().into_iter().collect();
        referenced.sort();
        for name in referenced {
            if !self.contains(&name) {
                problems.push(VerificationError::UnknownNode {
                    referenced_by: "dependencies".to_string(),
                    node: name,
                });
            }
        }
        if let Some(cycle) = self.dependencies().find_cycle() {
            problems.push(VerificationError::DependencyCycle(cycle));
        }

        problems
    }

    /// Fail with the first problem, if any.
    pub fn verify(&self) -> Result<(), VerificationError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Whether any node listens for an intent.
    pub fn listens(&self) -> bool {
        self.nodes()
            .flat_map(|n| n.actions())
            .any(|a| matches!(a, Action::Listen { .. }))
    }
}
