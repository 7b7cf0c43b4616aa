//! Engine configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::schema::content::ContentError;

/// How a raw utterance is turned into a destination node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// The trimmed utterance must equal a neighbor's name.
    #[default]
    Direct,
    /// The utterance is classified and the intent must equal a neighbor's name.
    Classified,
}

/// Outbound service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: 5,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub match_mode: MatchMode,
    /// Intents at or below this confidence are treated as not understood.
    pub intent_confidence_threshold: f64,
    /// Overrides the scenario id declared by the story content.
    pub scenario_id: Option<String>,
    /// Said when an utterance matches no reachable node.
    pub misunderstood_message: String,
    /// Said when a reachable node is blocked. `{place}` is the node name
    /// and `{reasons}` the unmet conditions.
    pub blocked_message: String,
    /// Said when a listen action hears the wrong intent.
    pub listen_retry_message: String,
    /// Said when a listen action hears an entity that fails verification
    /// and the action has no failure message of its own.
    pub listen_failure_message: String,
    /// RNG seed for dynamic events. Unseeded engines draw from entropy.
    pub seed: Option<u64>,
    pub service: ServiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::Direct,
            intent_confidence_threshold: 0.5,
            scenario_id: None,
            misunderstood_message:
                "I'm sorry, I don't understand what you mean. Could you rephrase?".to_string(),
            blocked_message: "You can't go to the {place} yet: {reasons}.".to_string(),
            listen_retry_message: "Sorry, I didn't catch that. Could you say it again?".to_string(),
            listen_failure_message: "Sorry, that isn't one of the options.".to_string(),
            seed: None,
            service: ServiceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ContentError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ContentError> {
        Ok(ron::from_str(input)?)
    }

    pub fn blocked(&self, place: &str, reasons: &[String]) -> String {
        self.blocked_message
            .replace("{place}", &place.replace('_', " "))
            .replace("{reasons}", &reasons.join("; "))
    }
}
