//! HTTP intent classifier for a Watson-style conversation service.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Classification, ClassifiedEntity, IntentClassifier, RetryPolicy, ServiceError};
use crate::core::config::ServiceConfig;

#[derive(Serialize)]
struct MessageRequest<'a> {
    input: MessageInput<'a>,
}

#[derive(Serialize)]
struct MessageInput<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    intents: Vec<IntentScore>,
    #[serde(default)]
    entities: Vec<EntityMatch>,
}

#[derive(Deserialize)]
struct IntentScore {
    intent: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct EntityMatch {
    entity: String,
    value: String,
}

impl From<MessageResponse> for Classification {
    fn from(resp: MessageResponse) -> Self {
        let top = resp
            .intents
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        let (intent, confidence) = match top {
            Some(score) => (Some(score.intent), score.confidence),
            None => (None, 0.0),
        };
        Classification {
            intent,
            confidence,
            entities: resp
                .entities
                .into_iter()
                .map(|e| ClassifiedEntity::new(e.entity, e.value.to_lowercase()))
                .collect(),
        }
    }
}

/// Blocking client. Each request has a fixed timeout and failed requests
/// are retried up to the configured attempt budget.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpClassifier {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| ServiceError::Unavailable {
            operation: "classify".to_string(),
            reason: "no classifier endpoint configured".to_string(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
            },
        })
    }

    fn message_url(&self, scenario_id: &str) -> String {
        format!("{}/workspaces/{}/message", self.endpoint, scenario_id)
    }
}

impl IntentClassifier for HttpClassifier {
    fn classify(&mut self, utterance: &str, scenario_id: &str) -> Result<Classification, ServiceError> {
        let url = self.message_url(scenario_id);
        let body = MessageRequest {
            input: MessageInput { text: utterance },
        };

        let resp: MessageResponse = self.retry.run("classify", || {
            let mut req = self.client.post(&url).json(&body);
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }
            Ok(req.send()?.error_for_status()?.json()?)
        })?;

        let classification = Classification::from(resp);
        debug!(
            intent = ?classification.intent,
            confidence = classification.confidence,
            entities = classification.entities.len(),
            "classified utterance"
        );
        Ok(classification)
    }
}
