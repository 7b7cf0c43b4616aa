//! Declarative story content and its conversion to and from a graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::action::Action;
use crate::core::context::StoryContext;
use crate::core::dependency::DependencyTree;
use crate::core::graph::{GraphError, StoryGraph};
use crate::core::node::{Binding, RunCondition, StoryNode};
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub run_conditions: Vec<RunCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// A whole scenario as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryContent {
    /// Classifier workspace for this story.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Initial context.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Each pair becomes a free edge in both directions.
    #[serde(default)]
    pub undirected_edges: Vec<(String, String)>,
    #[serde(default)]
    pub dependencies: DependencyTree,
    /// Node → destination → probability.
    #[serde(default)]
    pub dynamic_events: BTreeMap<String, BTreeMap<String, f64>>,
}

impl StoryContent {
    pub fn load_from_ron(path: &Path) -> Result<StoryContent, ContentError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<StoryContent, ContentError> {
        Ok(ron::from_str(input)?)
    }

    pub fn to_ron_string(&self) -> Result<String, ContentError> {
        let pretty = ron::ser::PrettyConfig::new().struct_names(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    pub fn save_ron(&self, path: &Path) -> Result<(), ContentError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}

impl StoryGraph {
    /// Build a graph from content. Node names must be unique and every edge
    /// and dynamic event must name declared nodes.
    pub fn from_content(content: StoryContent) -> Result<StoryGraph, ContentError> {
        let mut graph = StoryGraph::with_context(StoryContext::from_seed(content.context));
        if let Some(ref id) = content.scenario {
            graph.set_scenario_id(id);
        }

        for spec in content.nodes {
            let mut node = StoryNode::new(&spec.name);
            node.set_start(spec.start);
            for binding in &spec.bindings {
                node.bind(&binding.param, &binding.key);
            }
            for action in spec.actions {
                node.push_action(action);
            }
            for condition in spec.run_conditions {
                node.add_run_condition(condition);
            }
            graph.insert_node(node)?;
        }

        for edge in &content.edges {
            match edge.weight {
                Some(weight) => graph.add_weighted_edge(&edge.from, &edge.to, weight)?,
                None => graph.add_edge(&edge.from, &edge.to)?,
            }
        }
        for (a, b) in &content.undirected_edges {
            graph.add_undirected_edge(a, b)?;
        }

        graph.add_dependencies(content.dependencies);

        for (name, events) in &content.dynamic_events {
            let node = graph.node_mut(name)?;
            for (destination, &probability) in events {
                node.add_dynamic_event(destination, probability);
            }
        }

        Ok(graph)
    }

    /// Describe the graph as content. Position, visited set and custom
    /// conditions are not part of content.
    pub fn to_content(&self) -> StoryContent {
        let nodes = self
            .nodes()
            .map(|node| NodeSpec {
                name: node.name().to_string(),
                start: node.is_start(),
                bindings: node.bindings().to_vec(),
                actions: node.actions().to_vec(),
                run_conditions: node
                    .run_conditions()
                    .iter()
                    .filter(|c| {
                        let keep = !matches!(c, RunCondition::Custom(_));
                        if !keep {
                            warn!(node = node.name(), condition = %c, "custom condition not saved");
                        }
                        keep
                    })
                    .cloned()
                    .collect(),
            })
            .collect();

        let edges = self
            .edges()
            .map(|(from, edge)| EdgeSpec {
                from: from.to_string(),
                to: edge.target.clone(),
                weight: edge.weight,
            })
            .collect();

        let dynamic_events = self
            .nodes()
            .filter(|n| !n.dynamic_events().is_empty())
            .map(|n| (n.name().to_string(), n.dynamic_events().clone()))
            .collect();

        StoryContent {
            scenario: self.scenario_id().map(str::to_string),
            context: self.context().snapshot(),
            nodes,
            edges,
            undirected_edges: Vec::new(),
            dependencies: self.dependencies().clone(),
            dynamic_events,
        }
    }
}
