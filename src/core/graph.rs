//! The story graph: nodes, directed edges, dependencies, the shared context
//! and the current position.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::core::context::StoryContext;
use crate::core::dependency::DependencyTree;
use crate::core::node::{ConditionScope, StoryNode};
use crate::core::verify::VerificationError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),
    #[error("node '{0}' already exists")]
    DuplicateNode(String),
    #[error("'{to}' is not reachable from '{from}'")]
    NotNeighbor { from: String, to: String },
    #[error("cannot enter '{node}' before visiting: {}", .missing.join(", "))]
    UnmetDependencies { node: String, missing: Vec<String> },
    #[error("cannot remove '{0}' while the story is there")]
    RemoveActive(String),
    #[error("edge {from} -> {to} has invalid weight {weight}")]
    InvalidWeight { from: String, to: String, weight: f64 },
    #[error("storyline exceeded {max} nodes")]
    StorylineTooLong { max: usize },
}

/// A directed edge. Unweighted ("free") edges are the moves a user can
/// choose; weighted edges drive storyline generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub target: String,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StoryGraph {
    nodes: BTreeMap<String, StoryNode>,
    edges: BTreeMap<String, Vec<Edge>>,
    dependencies: DependencyTree,
    context: StoryContext,
    scenario_id: Option<String>,
    current: Option<String>,
    visited: FxHashSet<String>,
}

impl StoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: StoryContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    // --- nodes ---

    /// Get or create the node called `name`.
    pub fn add_node(&mut self, name: &str) -> &mut StoryNode {
        self.nodes
            .entry(name.to_string())
            .or_insert_with(|| StoryNode::new(name))
    }

    pub fn insert_node(&mut self, node: StoryNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(node.name()) {
            return Err(GraphError::DuplicateNode(node.name().to_string()));
        }
        self.nodes.insert(node.name().to_string(), node);
        Ok(())
    }

    /// Remove a node and every edge touching it. The current node cannot be
    /// removed.
    pub fn remove_node(&mut self, name: &str) -> Result<StoryNode, GraphError> {
        if self.current.as_deref() == Some(name) {
            return Err(GraphError::RemoveActive(name.to_string()));
        }
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
        self.edges.remove(name);
        for out in self.edges.values_mut() {
            out.retain(|e| e.target != name);
        }
        Ok(node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&StoryNode> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut StoryNode, GraphError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // --- edges ---

    fn require(&self, name: &str) -> Result<(), GraphError> {
        if self.nodes.contains_key(name) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(name.to_string()))
        }
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        self.require(from)?;
        self.require(to)?;
        let out = self.edges.entry(from.to_string()).or_default();
        if !out.iter().any(|e| e.target == to && e.weight.is_none()) {
            out.push(Edge {
                target: to.to_string(),
                weight: None,
            });
        }
        Ok(())
    }

    pub fn add_edges_from<'a, I>(&mut self, edges: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (from, to) in edges {
            self.add_edge(from, to)?;
        }
        Ok(())
    }

    /// Free edges in both directions.
    pub fn add_undirected_edge(&mut self, a: &str, b: &str) -> Result<(), GraphError> {
        self.add_edge(a, b)?;
        self.add_edge(b, a)
    }

    /// Set the weight of the probabilistic edge `from -> to`.
    pub fn add_weighted_edge(&mut self, from: &str, to: &str, weight: f64) -> Result<(), GraphError> {
        self.require(from)?;
        self.require(to)?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidWeight {
                from: from.to_string(),
                to: to.to_string(),
                weight,
            });
        }
        let out = self.edges.entry(from.to_string()).or_default();
        match out.iter_mut().find(|e| e.target == to && e.weight.is_some()) {
            Some(edge) => edge.weight = Some(weight),
            None => out.push(Edge {
                target: to.to_string(),
                weight: Some(weight),
            }),
        }
        Ok(())
    }

    /// Nodes reachable from `name` through a free edge.
    pub fn neighbors(&self, name: &str) -> Vec<&str> {
        self.edges
            .get(name)
            .map(|out| {
                out.iter()
                    .filter(|e| e.weight.is_none())
                    .map(|e| e.target.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn weighted_edges(&self, name: &str) -> Vec<(&str, f64)> {
        self.edges
            .get(name)
            .map(|out| {
                out.iter()
                    .filter_map(|e| e.weight.map(|w| (e.target.as_str(), w)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every edge as `(source, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &Edge)> {
        self.edges
            .iter()
            .flat_map(|(from, out)| out.iter().map(move |e| (from.as_str(), e)))
    }

    // --- dependencies ---

    pub fn add_dependency(&mut self, node: &str, requirement: &str) {
        self.dependencies.add(node, requirement);
    }

    pub fn add_dependencies(&mut self, tree: DependencyTree) {
        self.dependencies.merge(tree);
    }

    pub fn dependencies(&self) -> &DependencyTree {
        &self.dependencies
    }

    /// Requirements of `name` not yet visited, sorted.
    pub fn unmet_dependencies(&self, name: &str) -> Vec<String> {
        let mut missing: Vec<String> = self
            .dependencies
            .requirements(name)
            .into_iter()
            .filter(|r| !self.visited.contains(r))
            .collect();
        missing.sort();
        missing
    }

    // --- context and position ---

    pub fn context(&self) -> &StoryContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut StoryContext {
        &mut self.context
    }

    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }

    pub fn set_scenario_id(&mut self, id: &str) {
        self.scenario_id = Some(id.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn visited(&self) -> &FxHashSet<String> {
        &self.visited
    }

    pub fn has_visited(&self, name: &str) -> bool {
        self.visited.contains(name)
    }

    pub fn scope(&self) -> ConditionScope<'_> {
        ConditionScope {
            context: &self.context,
            visited: &self.visited,
        }
    }

    /// The node flagged as start. Exactly one must exist.
    pub fn start_node(&self) -> Result<&str, VerificationError> {
        let mut starts = self.nodes.values().filter(|n| n.is_start());
        match (starts.next(), starts.next()) {
            (Some(node), None) => Ok(node.name()),
            (None, _) => Err(VerificationError::NoStartNode),
            (Some(first), Some(second)) => {
                let mut names = vec![first.name().to_string(), second.name().to_string()];
                names.extend(starts.map(|n| n.name().to_string()));
                Err(VerificationError::MultipleStartNodes(names))
            }
        }
    }

    /// Move to `name`. Before the story has a position any node is allowed;
    /// afterwards `name` must be a free neighbor of the current node and
    /// every dependency of `name` must have been visited.
    pub fn set_current(&mut self, name: &str) -> Result<(), GraphError> {
        self.require(name)?;
        if let Some(current) = self.current.as_deref() {
            if !self.neighbors(current).contains(&name) {
                return Err(GraphError::NotNeighbor {
                    from: current.to_string(),
                    to: name.to_string(),
                });
            }
        }
        let missing = self.unmet_dependencies(name);
        if !missing.is_empty() {
            return Err(GraphError::UnmetDependencies {
                node: name.to_string(),
                missing,
            });
        }
        self.enter(name);
        Ok(())
    }

    /// Why `name` cannot be entered right now, as readable reasons. Empty
    /// when it can.
    pub fn blockers(&self, name: &str) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .unmet_dependencies(name)
            .into_iter()
            .map(|n| format!("visit the {} first", n.replace('_', " ")))
            .collect();
        if let Some(node) = self.nodes.get(name) {
            reasons.extend(node.unmet_conditions(&self.scope()));
        }
        reasons
    }

    /// Position the story on `name` without adjacency checks. Used for the
    /// start node and dynamic-event redirects.
    pub(crate) fn enter(&mut self, name: &str) {
        debug!(node = name, "entering node");
        self.current = Some(name.to_string());
        self.visited.insert(name.to_string());
    }

    /// Split borrow for running a node's actions against the context.
    pub(crate) fn node_and_context(&mut self, name: &str) -> Option<(&StoryNode, &mut StoryContext)> {
        let context = &mut self.context;
        self.nodes.get(name).map(|node| (node, context))
    }

    /// True once the story sits on a node with no way out.
    pub fn is_finished(&self) -> bool {
        self.current
            .as_deref()
            .is_some_and(|current| self.neighbors(current).is_empty())
    }
}
