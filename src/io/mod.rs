//! Collaborator interfaces: where utterances come from, how they are
//! classified, and where messages and media go.

pub mod classifier;
pub mod console;
pub mod scripted;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
    #[error("{operation} failed: {reason}")]
    Unavailable { operation: String, reason: String },
    #[error("input closed")]
    InputClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ServiceError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Http(e) => {
                !e.is_decode()
                    && e
                        .status()
                        .map_or(true, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }
}

/// One entity extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntity {
    /// Entity type label, e.g. `snacks` or `movies`.
    pub kind: String,
    pub value: String,
}

impl ClassifiedEntity {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// The classifier's reading of an utterance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Option<String>,
    pub confidence: f64,
    pub entities: Vec<ClassifiedEntity>,
}

impl Classification {
    pub fn new(intent: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent: Some(intent.into()),
            confidence,
            entities: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.push(ClassifiedEntity::new(kind, value));
        self
    }

    /// The intent label, if the classifier was confident enough.
    pub fn accepted_intent(&self, threshold: f64) -> Option<&str> {
        match &self.intent {
            Some(intent) if self.confidence > threshold => Some(intent.as_str()),
            _ => None,
        }
    }
}

/// Source of user utterances (speech-to-text, a terminal, a script).
pub trait InputProvider {
    /// Block until the user says something.
    fn get_utterance(&mut self) -> Result<String, ServiceError>;
}

/// Maps an utterance to an intent and its entities.
pub trait IntentClassifier {
    fn classify(&mut self, utterance: &str, scenario_id: &str) -> Result<Classification, ServiceError>;
}

/// Destination for spoken text and media.
pub trait OutputSink {
    /// Render `text`. `style` is an opaque tone tag passed through to
    /// speech synthesis.
    fn emit(&mut self, text: &str, style: Option<&str>) -> Result<(), ServiceError>;

    fn play(&mut self, source: &str) -> Result<(), ServiceError>;
}

/// The collaborators an engine talks to, owned together so the executor
/// can borrow them as one.
pub struct Collaborators {
    pub input: Box<dyn InputProvider>,
    pub output: Box<dyn OutputSink>,
    pub classifier: Option<Box<dyn IntentClassifier>>,
}

impl Collaborators {
    pub fn new(input: Box<dyn InputProvider>, output: Box<dyn OutputSink>) -> Self {
        Self {
            input,
            output,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn classify(&mut self, utterance: &str, scenario_id: &str) -> Result<Classification, ServiceError> {
        match self.classifier.as_mut() {
            Some(classifier) => classifier.classify(utterance, scenario_id),
            None => Err(ServiceError::Unavailable {
                operation: "classify".to_string(),
                reason: "no intent classifier configured".to_string(),
            }),
        }
    }
}

/// Bounded retry for outbound service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Run `call` until it succeeds, fails with a non-transient error, or
    /// the attempt budget is spent.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Result<T, ServiceError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(operation, attempt, error = %e, "service call failed");
                    last = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Err(ServiceError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flaky(reason: &str) -> ServiceError {
        ServiceError::Unavailable {
            operation: "synthesize".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn retry_succeeds_on_third_attempt() {
        let mut calls = 0;
        let result = RetryPolicy::default().run("synthesize", || {
            calls += 1;
            if calls < 3 {
                Err(flaky("timeout"))
            } else {
                Ok("audio")
            }
        });
        assert_eq!(result.unwrap(), "audio");
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::default().run("synthesize", || {
            calls += 1;
            Err(flaky("timeout"))
        });
        assert_eq!(calls, 3);
        match result {
            Err(ServiceError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("timeout"));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[test]
    fn retry_stops_on_permanent_error() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::default().run("listen", || {
            calls += 1;
            Err(ServiceError::InputClosed)
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(ServiceError::InputClosed)));
    }

    #[test]
    fn accepted_intent_respects_threshold() {
        let c = Classification::new("order_food", 0.9);
        assert_eq!(c.accepted_intent(0.5), Some("order_food"));
        assert_eq!(c.accepted_intent(0.9), None);
        assert_eq!(Classification::unknown().accepted_intent(0.0), None);
    }
}
