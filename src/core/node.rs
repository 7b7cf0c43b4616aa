//! Story nodes: ordered actions, run conditions and dynamic events.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::action::{Action, ActionError, ActionParams};
use crate::core::context::StoryContext;
use crate::schema::value::Value;

/// Probability mass below this is treated as zero.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// What a run condition gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ConditionScope<'a> {
    pub context: &'a StoryContext,
    pub visited: &'a FxHashSet<String>,
}

pub type PredicateFn = dyn Fn(&ConditionScope<'_>) -> bool + Send + Sync;

/// A labelled closure condition for cases the declarative kinds don't cover.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    check: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new<F>(label: &str, check: F) -> Self
    where
        F: Fn(&ConditionScope<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.to_string(),
            check: Arc::new(check),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("label", &self.label).finish()
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && Arc::ptr_eq(&self.check, &other.check)
    }
}

/// Gate on entering a node. All of a node's conditions must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunCondition {
    Visited(String),
    NotVisited(String),
    Equals { key: String, value: Value },
    Contains { key: String, item: String },
    /// The key exists and is not null.
    IsSet(String),
    #[serde(skip)]
    Custom(Predicate),
}

impl RunCondition {
    pub fn custom<F>(label: &str, check: F) -> Self
    where
        F: Fn(&ConditionScope<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Predicate::new(label, check))
    }

    pub fn holds(&self, scope: &ConditionScope<'_>) -> bool {
        self.holds_bound(scope, &[])
    }

    /// Like [`holds`](Self::holds), with context keys read through
    /// `bindings` first.
    pub fn holds_bound(&self, scope: &ConditionScope<'_>, bindings: &[Binding]) -> bool {
        let lookup = |key: &str| scope.context.lookup(resolve_binding(bindings, key));
        match self {
            Self::Visited(node) => scope.visited.contains(node),
            Self::NotVisited(node) => !scope.visited.contains(node),
            Self::Equals { key, value } => lookup(key) == Some(value),
            Self::Contains { key, item } => lookup(key).is_some_and(|v| v.includes(item)),
            Self::IsSet(key) => lookup(key).is_some_and(|v| !v.is_null()),
            Self::Custom(predicate) => (predicate.check)(scope),
        }
    }

    /// The context key this condition reads, if any.
    pub fn context_key(&self) -> Option<&str> {
        match self {
            Self::Equals { key, .. } | Self::Contains { key, .. } | Self::IsSet(key) => Some(key),
            _ => None,
        }
    }

    /// The node this condition refers to, if any.
    pub fn node_ref(&self) -> Option<&str> {
        match self {
            Self::Visited(node) | Self::NotVisited(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visited(node) => write!(f, "visit the {} first", node.replace('_', " ")),
            Self::NotVisited(node) => write!(f, "not after the {}", node.replace('_', " ")),
            Self::Equals { key, value } => write!(f, "{} must be {}", key.replace('_', " "), value),
            Self::Contains { key, item } => write!(f, "you need {} in {}", item, key.replace('_', " ")),
            Self::IsSet(key) => write!(f, "{} is not decided yet", key.replace('_', " ")),
            Self::Custom(predicate) => f.write_str(predicate.label()),
        }
    }
}

/// Maps a placeholder name used by a node to a context key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub param: String,
    pub key: String,
}

fn resolve_binding<'s>(bindings: &'s [Binding], param: &'s str) -> &'s str {
    bindings
        .iter()
        .find(|b| b.param == param)
        .map_or(param, |b| b.key.as_str())
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoryNode {
    name: String,
    start: bool,
    actions: Vec<Action>,
    run_conditions: Vec<RunCondition>,
    /// Destination node → probability of being redirected there when the
    /// user picks this node. The residual mass keeps the user's choice.
    dynamic_events: BTreeMap<String, f64>,
    bindings: Vec<Binding>,
}

impl StoryNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_start(&self) -> bool {
        self.start
    }

    pub fn set_start(&mut self, start: bool) -> &mut Self {
        self.start = start;
        self
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn run_conditions(&self) -> &[RunCondition] {
        &self.run_conditions
    }

    pub fn dynamic_events(&self) -> &BTreeMap<String, f64> {
        &self.dynamic_events
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Append an action of the named kind.
    pub fn add_action(&mut self, kind: &str, params: ActionParams) -> Result<&mut Self, ActionError> {
        let action = Action::from_params(kind, params)?;
        self.actions.push(action);
        Ok(self)
    }

    pub fn push_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn add_run_condition(&mut self, condition: RunCondition) -> &mut Self {
        self.run_conditions.push(condition);
        self
    }

    /// Register a probabilistic redirect. A later call for the same
    /// destination replaces the earlier probability.
    pub fn add_dynamic_event(&mut self, destination: &str, probability: f64) -> &mut Self {
        self.dynamic_events.insert(destination.to_string(), probability);
        self
    }

    /// Let templates and guards in this node say `{param}` for `key`.
    pub fn bind(&mut self, param: &str, key: &str) -> &mut Self {
        self.bindings.retain(|b| b.param != param);
        self.bindings.push(Binding {
            param: param.to_string(),
            key: key.to_string(),
        });
        self
    }

    /// The context key a placeholder name reads in this node.
    pub fn resolve<'s>(&'s self, param: &'s str) -> &'s str {
        resolve_binding(&self.bindings, param)
    }

    pub fn is_runnable(&self, scope: &ConditionScope<'_>) -> bool {
        self.run_conditions
            .iter()
            .all(|c| c.holds_bound(scope, &self.bindings))
    }

    /// Human-readable reasons for every condition that does not hold.
    pub fn unmet_conditions(&self, scope: &ConditionScope<'_>) -> Vec<String> {
        self.run_conditions
            .iter()
            .filter(|c| !c.holds_bound(scope, &self.bindings))
            .map(|c| c.to_string())
            .collect()
    }

    /// Sum of the explicit dynamic-event probabilities.
    pub fn dynamic_mass(&self) -> f64 {
        self.dynamic_events.values().sum()
    }

    /// Draw the node the story actually enters once this one was chosen.
    /// `default` receives whatever probability the dynamic events leave.
    pub fn select_destination<R: Rng + ?Sized>(&self, default: &str, rng: &mut R) -> String {
        if self.dynamic_events.is_empty() {
            return default.to_string();
        }

        let mut outcomes: Vec<&str> = Vec::with_capacity(self.dynamic_events.len() + 1);
        let mut weights: Vec<f64> = Vec::with_capacity(self.dynamic_events.len() + 1);
        for (destination, &p) in &self.dynamic_events {
            outcomes.push(destination);
            weights.push(p.max(0.0));
        }
        let residual = 1.0 - weights.iter().sum::<f64>();
        outcomes.push(default);
        weights.push(if residual > PROBABILITY_EPSILON { residual } else { 0.0 });

        match WeightedIndex::new(&weights) {
            Ok(dist) => outcomes[dist.sample(rng)].to_string(),
            Err(_) => default.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scope_parts() -> (StoryContext, FxHashSet<String>) {
        let mut ctx = StoryContext::new();
        ctx.insert("movie_choice", "home");
        ctx.insert("bought", Value::from(&["soda"][..]));
        ctx.insert("ticket", Value::Null);
        let mut visited = FxHashSet::default();
        visited.insert("box_office".to_string());
        (ctx, visited)
    }

    #[test]
    fn declarative_conditions() {
        let (ctx, visited) = scope_parts();
        let scope = ConditionScope {
            context: &ctx,
            visited: &visited,
        };
        assert!(RunCondition::Visited("box_office".into()).holds(&scope));
        assert!(!RunCondition::Visited("concessions".into()).holds(&scope));
        assert!(RunCondition::NotVisited("concessions".into()).holds(&scope));
        assert!(RunCondition::Equals {
            key: "movie_choice".into(),
            value: Value::from("home"),
        }
        .holds(&scope));
        assert!(RunCondition::Contains {
            key: "bought".into(),
            item: "Soda".into(),
        }
        .holds(&scope));
        assert!(!RunCondition::IsSet("ticket".into()).holds(&scope));
        assert!(!RunCondition::IsSet("nothing".into()).holds(&scope));
    }

    #[test]
    fn custom_condition_and_reasons() {
        let (ctx, visited) = scope_parts();
        let scope = ConditionScope {
            context: &ctx,
            visited: &visited,
        };
        let mut node = StoryNode::new("auditorium");
        node.add_run_condition(RunCondition::custom("buy a ticket first", |s| {
            s.context.lookup("ticket").is_some_and(|v| !v.is_null())
        }));
        node.add_run_condition(RunCondition::Visited("box_office".into()));
        assert!(!node.is_runnable(&scope));
        assert_eq!(node.unmet_conditions(&scope), vec!["buy a ticket first"]);

        node.add_run_condition(RunCondition::Visited("concessions".into()));
        assert_eq!(
            node.unmet_conditions(&scope),
            vec!["buy a ticket first", "visit the concessions first"]
        );
    }

    #[test]
    fn no_conditions_is_runnable() {
        let (ctx, visited) = scope_parts();
        let scope = ConditionScope {
            context: &ctx,
            visited: &visited,
        };
        assert!(StoryNode::new("lobby").is_runnable(&scope));
    }

    #[test]
    fn conditions_round_trip_through_ron() {
        let conditions = vec![
            RunCondition::Visited("box_office".into()),
            RunCondition::Equals {
                key: "movie_choice".into(),
                value: Value::from("home"),
            },
        ];
        let text = ron::to_string(&conditions).unwrap();
        let back: Vec<RunCondition> = ron::from_str(&text).unwrap();
        assert_eq!(back, conditions);
    }

    #[test]
    fn bindings_resolve_params() {
        let mut node = StoryNode::new("greeting");
        node.bind("guest", "name");
        node.bind("guest", "nickname");
        assert_eq!(node.resolve("guest"), "nickname");
        assert_eq!(node.resolve("menu"), "menu");
        assert_eq!(node.bindings().len(), 1);
    }

    #[test]
    fn conditions_read_through_bindings() {
        let (ctx, visited) = scope_parts();
        let scope = ConditionScope {
            context: &ctx,
            visited: &visited,
        };
        let mut node = StoryNode::new("auditorium");
        node.bind("film", "movie_choice");
        node.add_run_condition(RunCondition::Equals {
            key: "film".into(),
            value: Value::from("home"),
        });
        node.add_run_condition(RunCondition::IsSet("film".into()));
        assert!(node.is_runnable(&scope));
        assert!(node.unmet_conditions(&scope).is_empty());

        node.bind("film", "ticket");
        assert!(!node.is_runnable(&scope));
        assert_eq!(node.unmet_conditions(&scope).len(), 2);
    }

    #[test]
    fn no_dynamic_events_keeps_choice() {
        let node = StoryNode::new("exhibits");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(node.select_destination("parking_lot", &mut rng), "parking_lot");
    }

    #[test]
    fn certain_redirect_always_fires() {
        let mut node = StoryNode::new("exhibits");
        node.add_dynamic_event("gift_shop", 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(node.select_destination("parking_lot", &mut rng), "gift_shop");
        }
    }

    #[test]
    fn redirect_frequency_matches_probability() {
        let mut node = StoryNode::new("exhibits");
        node.add_dynamic_event("wallet", 0.3);
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 10_000;
        let redirected = (0..draws)
            .filter(|_| node.select_destination("parking_lot", &mut rng) == "wallet")
            .count();
        let freq = redirected as f64 / draws as f64;
        assert!((freq - 0.3).abs() < 0.03, "frequency {freq}");
    }

    #[test]
    fn add_dynamic_event_replaces() {
        let mut node = StoryNode::new("exhibits");
        node.add_dynamic_event("wallet", 0.2);
        node.add_dynamic_event("wallet", 0.05);
        assert_eq!(node.dynamic_events().len(), 1);
        assert!((node.dynamic_mass() - 0.05).abs() < 1e-12);
    }
}
