//! The story engine: runs the current node, resolves the user's choice,
//! applies dynamic events and advances the graph.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::action::{ActionError, ActionExecutor};
use crate::core::config::{EngineConfig, MatchMode};
use crate::core::context::StoryContext;
use crate::core::graph::{GraphError, StoryGraph};
use crate::core::template::TemplateError;
use crate::core::verify::VerificationError;
use crate::io::console::{StdinInput, StdoutSink};
use crate::io::{Collaborators, InputProvider, IntentClassifier, OutputSink, ServiceError};
use crate::schema::content::{ContentError, StoryContent};

/// Scenario id used when neither the config nor the content names one.
pub const DEFAULT_SCENARIO: &str = "default";

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("malformed action: {0}")]
    MalformedAction(#[from] ActionError),
}

/// What a single [`StoryEngine::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The story moved on. `redirected` is set when a dynamic event sent it
    /// somewhere other than the node the user chose.
    Advanced {
        from: String,
        to: String,
        redirected: bool,
    },
    /// The current node has no way out; the story is over.
    Finished { at: String },
}

pub struct StoryEngine {
    graph: StoryGraph,
    io: Collaborators,
    config: EngineConfig,
    scenario_id: String,
    rng: StdRng,
    /// The current node's actions have not run yet.
    pending: bool,
}

impl StoryEngine {
    pub fn builder(graph: StoryGraph) -> StoryEngineBuilder {
        StoryEngineBuilder {
            graph,
            input: None,
            output: None,
            classifier: None,
            config: EngineConfig::default(),
            seed: None,
        }
    }

    /// Run one tick: execute the current node, then move to the next one.
    pub fn step(&mut self) -> Result<StepOutcome, StoryError> {
        let current = self
            .graph
            .current()
            .map(str::to_string)
            .ok_or(VerificationError::NoStartNode)?;
        self.run_node(&current)?;

        if self.graph.is_finished() {
            info!(node = %current, "story finished");
            return Ok(StepOutcome::Finished { at: current });
        }

        let chosen = self.choose_next(&current)?;
        let destination = match self.graph.node(&chosen) {
            Some(node) => node.select_destination(&chosen, &mut self.rng),
            None => return Err(GraphError::UnknownNode(chosen).into()),
        };
        if !self.graph.contains(&destination) {
            return Err(GraphError::UnknownNode(destination).into());
        }
        let redirected = destination != chosen;
        if redirected {
            info!(chosen = %chosen, destination = %destination, "dynamic event redirected story");
        }

        self.graph.enter(&destination);
        self.pending = true;
        info!(from = %current, to = %destination, "advanced");
        Ok(StepOutcome::Advanced {
            from: current,
            to: destination,
            redirected,
        })
    }

    /// Step until the story finishes.
    pub fn run(&mut self) -> Result<(), StoryError> {
        loop {
            if let StepOutcome::Finished { .. } = self.step()? {
                return Ok(());
            }
        }
    }

    /// True once the final node has run.
    pub fn is_finished(&self) -> bool {
        !self.pending && self.graph.is_finished()
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn context(&self) -> &StoryContext {
        self.graph.context()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn into_graph(self) -> StoryGraph {
        self.graph
    }

    fn run_node(&mut self, name: &str) -> Result<(), StoryError> {
        if !self.pending {
            return Ok(());
        }
        let (node, context) = self
            .graph
            .node_and_context(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
        debug!(node = name, actions = node.actions().len(), "running node");
        ActionExecutor::new(&mut self.io, &self.config, &self.scenario_id).run_node(node, context)?;
        self.pending = false;
        Ok(())
    }

    /// Ask until the user names a reachable node whose gates are open.
    fn choose_next(&mut self, current: &str) -> Result<String, StoryError> {
        loop {
            let utterance = self.io.input.get_utterance()?;
            let candidate = match self.config.match_mode {
                MatchMode::Direct => Some(utterance.trim().to_string()),
                MatchMode::Classified => self
                    .io
                    .classify(&utterance, &self.scenario_id)?
                    .accepted_intent(self.config.intent_confidence_threshold)
                    .map(str::to_string),
            };

            let neighbors = self.graph.neighbors(current);
            let target = match candidate {
                Some(c) if neighbors.contains(&c.as_str()) => c,
                _ => {
                    debug!(utterance = %utterance, "no reachable node matched");
                    self.io.output.emit(&self.config.misunderstood_message, None)?;
                    continue;
                }
            };

            let reasons = self.graph.blockers(&target);
            if !reasons.is_empty() {
                debug!(target = %target, reasons = ?reasons, "transition blocked");
                let message = self.config.blocked(&target, &reasons);
                self.io.output.emit(&message, None)?;
                continue;
            }
            return Ok(target);
        }
    }
}

pub struct StoryEngineBuilder {
    graph: StoryGraph,
    input: Option<Box<dyn InputProvider>>,
    output: Option<Box<dyn OutputSink>>,
    classifier: Option<Box<dyn IntentClassifier>>,
    config: EngineConfig,
    seed: Option<u64>,
}

impl StoryEngineBuilder {
    pub fn input(mut self, input: impl InputProvider + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn output(mut self, output: impl OutputSink + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Boxed classifier, for callers that choose the implementation at
    /// runtime.
    pub fn boxed_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the config from a RON file.
    pub fn config_file(mut self, path: &Path) -> Result<Self, StoryError> {
        self.config = EngineConfig::load_from_ron(path)?;
        Ok(self)
    }

    /// Overrides `config.seed`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Verify the graph and place it on its start node.
    pub fn build(self) -> Result<StoryEngine, StoryError> {
        let mut graph = self.graph;
        graph.verify()?;

        if self.classifier.is_none() {
            if self.config.match_mode == MatchMode::Classified {
                return Err(VerificationError::ClassifierRequired(
                    "classified match mode".to_string(),
                )
                .into());
            }
            if graph.listens() {
                return Err(VerificationError::ClassifierRequired(
                    "the story has listen actions".to_string(),
                )
                .into());
            }
        }

        if graph.current().is_none() {
            let start = graph.start_node()?.to_string();
            graph.enter(&start);
        }

        let scenario_id = self
            .config
            .scenario_id
            .clone()
            .or_else(|| graph.scenario_id().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());

        let rng = match self.seed.or(self.config.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut io = Collaborators::new(
            self.input.unwrap_or_else(|| Box::new(StdinInput::new())),
            self.output.unwrap_or_else(|| Box::new(StdoutSink)),
        );
        if let Some(classifier) = self.classifier {
            io = io.with_classifier(classifier);
        }

        info!(
            scenario = %scenario_id,
            nodes = graph.len(),
            start = ?graph.current(),
            "story engine ready"
        );
        Ok(StoryEngine {
            graph,
            io,
            config: self.config,
            scenario_id,
            rng,
            pending: true,
        })
    }
}

impl StoryEngine {
    /// Build a graph from story content and wrap it in a builder.
    pub fn from_content(content: StoryContent) -> Result<StoryEngineBuilder, StoryError> {
        Ok(Self::builder(StoryGraph::from_content(content)?))
    }
}
