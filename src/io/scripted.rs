//! Deterministic collaborators for tests, demos and offline runs.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use super::{
    Classification, ClassifiedEntity, InputProvider, IntentClassifier, OutputSink, ServiceError,
};
use crate::schema::content::ContentError;

/// Replays a fixed list of utterances, then reports the input as closed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl InputProvider for ScriptedInput {
    fn get_utterance(&mut self) -> Result<String, ServiceError> {
        self.lines.pop_front().ok_or(ServiceError::InputClosed)
    }
}

/// Returns canned classifications in order, ignoring the utterance.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    responses: VecDeque<Classification>,
}

impl ScriptedClassifier {
    pub fn new(responses: impl IntoIterator<Item = Classification>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
        }
    }
}

impl IntentClassifier for ScriptedClassifier {
    fn classify(&mut self, _utterance: &str, _scenario_id: &str) -> Result<Classification, ServiceError> {
        self.responses.pop_front().ok_or(ServiceError::InputClosed)
    }
}

/// Something the story said or played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text { text: String, style: Option<String> },
    Media(String),
}

/// Records everything emitted, in order. Clones share the same record, so
/// a test can keep one handle and give the other to an engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    outputs: Rc<RefCell<Vec<Output>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<Output> {
        self.outputs.borrow().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.outputs
            .borrow()
            .iter()
            .filter_map(|o| match o {
                Output::Text { text, .. } => Some(text.clone()),
                Output::Media(_) => None,
            })
            .collect()
    }

    pub fn media(&self) -> Vec<String> {
        self.outputs
            .borrow()
            .iter()
            .filter_map(|o| match o {
                Output::Media(source) => Some(source.clone()),
                Output::Text { .. } => None,
            })
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn emit(&mut self, text: &str, style: Option<&str>) -> Result<(), ServiceError> {
        self.outputs.borrow_mut().push(Output::Text {
            text: text.to_string(),
            style: style.map(str::to_string),
        });
        Ok(())
    }

    fn play(&mut self, source: &str) -> Result<(), ServiceError> {
        self.outputs
            .borrow_mut()
            .push(Output::Media(source.to_string()));
        Ok(())
    }
}

/// Offline classifier. Intents are recognized by keyword (first declared
/// match wins) and entities by vocabulary, both case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordClassifier {
    #[serde(default)]
    intents: Vec<(String, Vec<String>)>,
    #[serde(default)]
    vocabulary: Vec<ClassifiedEntity>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(mut self, intent: &str, keywords: &[&str]) -> Self {
        self.intents.push((
            intent.to_string(),
            keywords.iter().map(|k| k.to_lowercase()).collect(),
        ));
        self
    }

    pub fn entities(mut self, kind: &str, values: &[&str]) -> Self {
        self.vocabulary
            .extend(values.iter().map(|v| ClassifiedEntity::new(kind, v.to_lowercase())));
        self
    }

    pub fn load_from_ron(path: &Path) -> Result<KeywordClassifier, ContentError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a keyword table. Keywords and vocabulary are lowercased.
    pub fn parse_ron(input: &str) -> Result<KeywordClassifier, ContentError> {
        let mut classifier: KeywordClassifier = ron::from_str(input)?;
        for (_, keywords) in &mut classifier.intents {
            for keyword in keywords.iter_mut() {
                *keyword = keyword.to_lowercase();
            }
        }
        for entity in &mut classifier.vocabulary {
            entity.value = entity.value.to_lowercase();
        }
        Ok(classifier)
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&mut self, utterance: &str, _scenario_id: &str) -> Result<Classification, ServiceError> {
        let text = utterance.to_lowercase();

        let intent = self
            .intents
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| contains_phrase(&text, k)))
            .map(|(intent, _)| intent.clone());

        let mut found: Vec<(usize, &ClassifiedEntity)> = self
            .vocabulary
            .iter()
            .filter_map(|e| find_phrase(&text, &e.value).map(|pos| (pos, e)))
            .collect();
        found.sort_by_key(|(pos, _)| *pos);

        Ok(Classification {
            confidence: if intent.is_some() { 1.0 } else { 0.0 },
            intent,
            entities: found.into_iter().map(|(_, e)| e.clone()).collect(),
        })
    }
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    find_phrase(text, phrase).is_some()
}

/// Byte offset of `phrase` in `text` where it starts and ends on word
/// boundaries.
fn find_phrase(text: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '\'';
    text.match_indices(phrase).map(|(pos, _)| pos).find(|&pos| {
        let before = text[..pos].chars().next_back();
        let after = text[pos + phrase.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}
