//! Node actions (say, listen, play) and the executor that performs them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::context::StoryContext;
use crate::core::engine::StoryError;
use crate::core::node::StoryNode;
use crate::core::template::{Template, TemplateError};
use crate::io::Collaborators;
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action kind '{0}' (expected say, listen or play)")]
    UnknownKind(String),
    #[error("{kind} action is missing required parameter '{param}'")]
    MissingParam { kind: ActionKind, param: &'static str },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Say,
    Listen,
    Play,
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "say" => Ok(Self::Say),
            "listen" => Ok(Self::Listen),
            "play" => Ok(Self::Play),
            _ => Err(ActionError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Say => "say",
            Self::Listen => "listen",
            Self::Play => "play",
        })
    }
}

/// Skip the action unless `context[key] == equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub key: String,
    pub equals: Value,
}

impl Guard {
    pub fn new(key: impl Into<String>, equals: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            equals: equals.into(),
        }
    }
}

/// One scripted step of a story node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Say {
        message: Template,
        #[serde(default)]
        style: Option<String>,
        #[serde(default)]
        only_if: Option<Guard>,
    },
    Listen {
        intent: String,
        #[serde(default)]
        entity_type: String,
        /// Zero keeps every entity.
        #[serde(default)]
        max_entities: usize,
        /// Context list every heard entity must belong to.
        #[serde(default)]
        verify_against: String,
        #[serde(default)]
        context_key: String,
        #[serde(default)]
        failure_message: String,
        /// When set, keep listening and accumulating entities until this
        /// intent is heard.
        #[serde(default)]
        done_intent: Option<String>,
        /// Said after each accepted round while waiting for `done_intent`.
        #[serde(default)]
        repeat_prompt: String,
        #[serde(default)]
        only_if: Option<Guard>,
    },
    Play {
        source: String,
        #[serde(default)]
        only_if: Option<Guard>,
    },
}

/// Loosely typed action parameters, validated by [`Action::from_params`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionParams {
    pub message: Option<String>,
    pub style: Option<String>,
    pub source: Option<String>,
    pub intent: Option<String>,
    pub entity_type: String,
    pub max_entities: usize,
    pub verify_against: String,
    pub context_key: String,
    pub failure_message: String,
    pub done_intent: Option<String>,
    pub repeat_prompt: String,
    pub only_if: Option<Guard>,
}

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn intent(mut self, intent: &str) -> Self {
        self.intent = Some(intent.to_string());
        self
    }

    pub fn entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = entity_type.to_string();
        self
    }

    pub fn max_entities(mut self, max: usize) -> Self {
        self.max_entities = max;
        self
    }

    pub fn verify_against(mut self, key: &str) -> Self {
        self.verify_against = key.to_string();
        self
    }

    pub fn context_key(mut self, key: &str) -> Self {
        self.context_key = key.to_string();
        self
    }

    pub fn failure_message(mut self, message: &str) -> Self {
        self.failure_message = message.to_string();
        self
    }

    pub fn done_intent(mut self, intent: &str) -> Self {
        self.done_intent = Some(intent.to_string());
        self
    }

    pub fn repeat_prompt(mut self, prompt: &str) -> Self {
        self.repeat_prompt = prompt.to_string();
        self
    }

    pub fn only_if(mut self, key: &str, equals: impl Into<Value>) -> Self {
        self.only_if = Some(Guard::new(key, equals));
        self
    }
}

impl Action {
    /// Build an action of the named kind, checking required parameters.
    pub fn from_params(kind: &str, params: ActionParams) -> Result<Action, ActionError> {
        let kind: ActionKind = kind.parse()?;
        let missing = |param| ActionError::MissingParam { kind, param };
        Ok(match kind {
            ActionKind::Say => Action::Say {
                message: Template::parse(&params.message.ok_or_else(|| missing("message"))?)?,
                style: params.style,
                only_if: params.only_if,
            },
            ActionKind::Listen => Action::Listen {
                intent: params.intent.ok_or_else(|| missing("intent"))?,
                entity_type: params.entity_type,
                max_entities: params.max_entities,
                verify_against: params.verify_against,
                context_key: params.context_key,
                failure_message: params.failure_message,
                done_intent: params.done_intent,
                repeat_prompt: params.repeat_prompt,
                only_if: params.only_if,
            },
            ActionKind::Play => Action::Play {
                source: params.source.ok_or_else(|| missing("source"))?,
                only_if: params.only_if,
            },
        })
    }

    pub fn say(message: &str) -> Result<Action, ActionError> {
        Self::from_params("say", ActionParams::new().message(message))
    }

    pub fn play(source: &str) -> Action {
        Action::Play {
            source: source.to_string(),
            only_if: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Say { .. } => ActionKind::Say,
            Self::Listen { .. } => ActionKind::Listen,
            Self::Play { .. } => ActionKind::Play,
        }
    }

    pub fn guard(&self) -> Option<&Guard> {
        match self {
            Self::Say { only_if, .. } | Self::Listen { only_if, .. } | Self::Play { only_if, .. } => {
                only_if.as_ref()
            }
        }
    }

    /// Names this action reads from the context, before binding resolution.
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.guard().map(|g| g.key.as_str()).into_iter().collect();
        match self {
            Self::Say { message, .. } => keys.extend(message.keys()),
            Self::Listen { verify_against, .. } if !verify_against.is_empty() => {
                keys.push(verify_against)
            }
            _ => {}
        }
        keys
    }
}

/// Performs node actions against the context and the collaborators.
/// Context updates land immediately, so later actions in the same node
/// see them.
pub struct ActionExecutor<'a> {
    io: &'a mut Collaborators,
    config: &'a EngineConfig,
    scenario_id: &'a str,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(io: &'a mut Collaborators, config: &'a EngineConfig, scenario_id: &'a str) -> Self {
        Self {
            io,
            config,
            scenario_id,
        }
    }

    /// Run every action of `node` in declaration order.
    pub fn run_node(&mut self, node: &StoryNode, context: &mut StoryContext) -> Result<(), StoryError> {
        for action in node.actions() {
            self.perform(action, node, context)?;
        }
        Ok(())
    }

    pub fn perform(
        &mut self,
        action: &Action,
        node: &StoryNode,
        context: &mut StoryContext,
    ) -> Result<(), StoryError> {
        if let Some(guard) = action.guard() {
            if context.lookup(node.resolve(&guard.key)) != Some(&guard.equals) {
                debug!(node = node.name(), kind = %action.kind(), key = %guard.key, "guard not met, skipping");
                return Ok(());
            }
        }

        match action {
            Action::Say { message, style, .. } => {
                let text = message.render(context, |k| node.resolve(k))?;
                self.io.output.emit(&text, style.as_deref())?;
            }
            Action::Play { source, .. } => {
                info!(node = node.name(), source = %source, "playing media");
                self.io.output.play(source)?;
            }
            Action::Listen {
                intent,
                entity_type,
                max_entities,
                verify_against,
                context_key,
                failure_message,
                done_intent,
                repeat_prompt,
                ..
            } => {
                let config = self.config;
                let spec = ListenSpec {
                    intent,
                    entity_type,
                    max_entities: *max_entities,
                    verify_against: (!verify_against.is_empty()).then(|| node.resolve(verify_against)),
                    failure_message: if failure_message.is_empty() {
                        &config.listen_failure_message
                    } else {
                        failure_message
                    },
                    done_intent: done_intent.as_deref(),
                    repeat_prompt,
                };
                let heard = self.listen(&spec, context)?;
                if context_key.is_empty() {
                    return Ok(());
                }
                if let Some(value) = heard {
                    info!(node = node.name(), key = %context_key, value = %value, "listen stored");
                    context.set_many([(node.resolve(context_key), value)]);
                }
            }
        }
        Ok(())
    }

    /// The conversation loop of a listen action. Returns the heard value,
    /// or `None` when a `done_intent` listen ended without collecting
    /// anything.
    fn listen(&mut self, spec: &ListenSpec<'_>, context: &StoryContext) -> Result<Option<Value>, StoryError> {
        let threshold = self.config.intent_confidence_threshold;
        let mut collected: Vec<String> = Vec::new();

        loop {
            let utterance = self.io.input.get_utterance()?;
            let classification = self.io.classify(&utterance, self.scenario_id)?;
            let heard_intent = classification.accepted_intent(threshold);

            if spec.done_intent.is_some() && heard_intent == spec.done_intent {
                debug!(collected = collected.len(), "listen finished");
                return Ok((!collected.is_empty()).then(|| into_value(collected)));
            }

            if heard_intent != Some(spec.intent) {
                debug!(utterance = %utterance, expected = spec.intent, heard = ?heard_intent, "intent mismatch");
                self.io.output.emit(&self.config.listen_retry_message, None)?;
                continue;
            }

            let mut entities: Vec<String> = classification
                .entities
                .into_iter()
                .filter(|e| spec.entity_type.is_empty() || e.kind == spec.entity_type)
                .map(|e| e.value)
                .collect();
            if spec.max_entities > 0 {
                entities.truncate(spec.max_entities);
            }

            let needs_entities = !spec.entity_type.is_empty() || spec.verify_against.is_some();
            let rejected = match spec.verify_against {
                Some(key) => {
                    let allowed = context.lookup(key);
                    entities
                        .iter()
                        .any(|e| !allowed.is_some_and(|list| list.includes(e)))
                }
                None => false,
            };
            if rejected || (needs_entities && entities.is_empty()) {
                debug!(utterance = %utterance, entities = ?entities, "entities rejected");
                self.io.output.emit(spec.failure_message, None)?;
                continue;
            }

            match spec.done_intent {
                None => return Ok(Some(into_value(entities))),
                Some(_) => {
                    for entity in entities {
                        if !collected.contains(&entity) {
                            collected.push(entity);
                        }
                    }
                    if !spec.repeat_prompt.is_empty() {
                        self.io.output.emit(spec.repeat_prompt, None)?;
                    }
                }
            }
        }
    }
}

struct ListenSpec<'s> {
    intent: &'s str,
    entity_type: &'s str,
    max_entities: usize,
    verify_against: Option<&'s str>,
    failure_message: &'s str,
    done_intent: Option<&'s str>,
    repeat_prompt: &'s str,
}

/// A single entity is stored as a plain string, anything else (none
/// included) as a list.
fn into_value(mut entities: Vec<String>) -> Value {
    match entities.len() {
        1 => Value::String(entities.remove(0)),
        _ => Value::List(entities),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scripted::{RecordingSink, ScriptedClassifier, ScriptedInput};
    use crate::io::Classification;

    fn concessions_node() -> StoryNode {
        let mut node = StoryNode::new("concessions");
        node.add_action("say", ActionParams::new().message("What can I get for you? We have {menu}."))
            .unwrap();
        node.add_action(
            "listen",
            ActionParams::new()
                .intent("order_food")
                .entity_type("snacks")
                .verify_against("menu")
                .context_key("bought")
                .failure_message("Sorry we don't have that on our menu.")
                .done_intent("done_ordering")
                .repeat_prompt("Can I get anything else for you?"),
        )
        .unwrap();
        node.add_action("say", ActionParams::new().message("Thank you. Here's your {bought}."))
            .unwrap();
        node
    }

    fn menu_context() -> StoryContext {
        let mut ctx = StoryContext::new();
        ctx.insert("menu", Value::from(&["soda", "popcorn", "candy"][..]));
        ctx.insert("bought", Value::List(vec![]));
        ctx
    }

    fn collaborators(
        lines: &[&str],
        responses: Vec<Classification>,
        sink: &RecordingSink,
    ) -> Collaborators {
        Collaborators::new(
            Box::new(ScriptedInput::new(lines.iter().copied())),
            Box::new(sink.clone()),
        )
        .with_classifier(Box::new(ScriptedClassifier::new(responses)))
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Action::from_params("dance", ActionParams::new()).unwrap_err();
        assert!(matches!(err, ActionError::UnknownKind(k) if k == "dance"));
    }

    #[test]
    fn missing_parameters_are_rejected() {
        assert!(matches!(
            Action::from_params("say", ActionParams::new()),
            Err(ActionError::MissingParam { kind: ActionKind::Say, param: "message" })
        ));
        assert!(matches!(
            Action::from_params("listen", ActionParams::new().context_key("x")),
            Err(ActionError::MissingParam { kind: ActionKind::Listen, param: "intent" })
        ));
        assert!(matches!(
            Action::from_params("play", ActionParams::new()),
            Err(ActionError::MissingParam { kind: ActionKind::Play, param: "source" })
        ));
        assert!(matches!(
            Action::from_params("say", ActionParams::new().message("Bad {")),
            Err(ActionError::Template(_))
        ));
    }

    #[test]
    fn referenced_keys_cover_guards_and_lists() {
        let say = Action::from_params(
            "say",
            ActionParams::new().message("Hi {name}").only_if("mood", "happy"),
        )
        .unwrap();
        assert_eq!(say.referenced_keys(), vec!["mood", "name"]);

        let listen = Action::from_params(
            "listen",
            ActionParams::new().intent("buy_ticket").verify_against("movie_names"),
        )
        .unwrap();
        assert_eq!(listen.referenced_keys(), vec!["movie_names"]);
        assert!(Action::play("intro.mp4").referenced_keys().is_empty());
    }

    #[test]
    fn concessions_order_until_done() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["I'd like soda and popcorn", "that's all"],
            vec![
                Classification::new("order_food", 0.93)
                    .with_entity("snacks", "soda")
                    .with_entity("snacks", "popcorn"),
                Classification::new("done_ordering", 0.88),
            ],
            &sink,
        );
        let config = EngineConfig::default();
        let node = concessions_node();
        let mut ctx = menu_context();

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();

        assert_eq!(
            ctx.get("bought"),
            Some(&Value::List(vec!["soda".to_string(), "popcorn".to_string()]))
        );
        assert_eq!(
            sink.texts(),
            vec![
                "What can I get for you? We have soda, popcorn, and candy.",
                "Can I get anything else for you?",
                "Thank you. Here's your soda and popcorn.",
            ]
        );
    }

    #[test]
    fn single_entity_is_stored_as_string() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["a ticket for home please"],
            vec![Classification::new("buy_ticket", 0.9).with_entity("movies", "home")],
            &sink,
        );
        let config = EngineConfig::default();
        let mut node = StoryNode::new("box_office");
        node.add_action(
            "listen",
            ActionParams::new()
                .intent("buy_ticket")
                .entity_type("movies")
                .max_entities(1)
                .verify_against("movie_names")
                .context_key("movie_choice"),
        )
        .unwrap();
        let mut ctx = StoryContext::new();
        ctx.insert("movie_names", Value::from(&["home", "minions"][..]));
        ctx.insert("movie_choice", Value::Null);

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("movie_choice"), Some(&Value::from("home")));
        assert!(sink.texts().is_empty());
    }

    #[test]
    fn wrong_intent_and_unknown_entity_are_repaired() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["hello", "nachos please", "popcorn please"],
            vec![
                Classification::new("greeting", 0.99),
                Classification::new("order_food", 0.9).with_entity("snacks", "nachos"),
                Classification::new("order_food", 0.9).with_entity("snacks", "popcorn"),
            ],
            &sink,
        );
        let config = EngineConfig::default();
        let mut node = StoryNode::new("concessions");
        node.add_action(
            "listen",
            ActionParams::new()
                .intent("order_food")
                .entity_type("snacks")
                .verify_against("menu")
                .context_key("bought")
                .failure_message("Sorry we don't have that on our menu."),
        )
        .unwrap();
        let mut ctx = menu_context();

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("bought"), Some(&Value::from("popcorn")));
        assert_eq!(
            sink.texts(),
            vec![
                config.listen_retry_message.as_str(),
                "Sorry we don't have that on our menu.",
            ]
        );
    }

    #[test]
    fn low_confidence_counts_as_misunderstood() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["mumble", "soda"],
            vec![
                Classification::new("order_food", 0.2).with_entity("snacks", "soda"),
                Classification::new("order_food", 0.7).with_entity("snacks", "soda"),
            ],
            &sink,
        );
        let config = EngineConfig::default();
        let mut node = StoryNode::new("concessions");
        node.add_action(
            "listen",
            ActionParams::new().intent("order_food").context_key("bought"),
        )
        .unwrap();
        let mut ctx = menu_context();

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("bought"), Some(&Value::from("soda")));
        assert_eq!(sink.texts().len(), 1);
    }

    #[test]
    fn guarded_play_only_runs_when_matching() {
        let sink = RecordingSink::new();
        let mut io = collaborators(&[], vec![], &sink);
        let config = EngineConfig::default();
        let mut node = StoryNode::new("auditorium");
        node.add_action(
            "play",
            ActionParams::new().source("inside_out.mp4").only_if("movie_choice", "inside out"),
        )
        .unwrap();
        node.add_action(
            "play",
            ActionParams::new().source("home.mp4").only_if("movie_choice", "home"),
        )
        .unwrap();
        let mut ctx = StoryContext::new();
        ctx.insert("movie_choice", "home");

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(sink.media(), vec!["home.mp4"]);
    }

    #[test]
    fn later_actions_see_earlier_updates() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["popcorn"],
            vec![Classification::new("order_food", 0.9).with_entity("snacks", "popcorn")],
            &sink,
        );
        let config = EngineConfig::default();
        let mut node = StoryNode::new("concessions");
        node.add_action("listen", ActionParams::new().intent("order_food").context_key("bought"))
            .unwrap();
        node.add_action("say", ActionParams::new().message("One {bought}, coming up.").style("GoodNews"))
            .unwrap();
        let mut ctx = menu_context();

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(
            sink.outputs(),
            vec![crate::io::scripted::Output::Text {
                text: "One popcorn, coming up.".to_string(),
                style: Some("GoodNews".to_string()),
            }]
        );
    }

    #[test]
    fn listen_without_entities_stores_empty_list() {
        let sink = RecordingSink::new();
        let mut io = collaborators(&["yes"], vec![Classification::new("affirm", 0.9)], &sink);
        let config = EngineConfig::default();
        let mut node = StoryNode::new("gate");
        node.add_action("listen", ActionParams::new().intent("affirm").context_key("answer"))
            .unwrap();
        let mut ctx = StoryContext::new();
        ctx.insert("answer", "stale");

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("answer"), Some(&Value::List(vec![])));
    }

    #[test]
    fn done_intent_with_nothing_collected_keeps_context() {
        let sink = RecordingSink::new();
        let mut io = collaborators(
            &["nothing, thanks"],
            vec![Classification::new("done_ordering", 0.9)],
            &sink,
        );
        let config = EngineConfig::default();
        let node = concessions_node();
        let mut ctx = menu_context();
        ctx.insert("bought", "water");

        ActionExecutor::new(&mut io, &config, "movie")
            .run_node(&node, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("bought"), Some(&Value::from("water")));
    }

    #[test]
    fn exhausted_input_surfaces_as_error() {
        let sink = RecordingSink::new();
        let mut io = collaborators(&[], vec![], &sink);
        let config = EngineConfig::default();
        let mut node = StoryNode::new("concessions");
        node.add_action("listen", ActionParams::new().intent("order_food").context_key("bought"))
            .unwrap();
        let mut ctx = menu_context();

        let result = ActionExecutor::new(&mut io, &config, "movie").run_node(&node, &mut ctx);
        assert!(matches!(result, Err(StoryError::Service(_))));
    }
}
