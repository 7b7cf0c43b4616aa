//! Story Engine: an interactive, voice-driven branching-narrative runtime.
//!
//! A story is a directed graph of nodes. Each node speaks, listens and plays
//! media against a shared context; the user's reply picks the next node,
//! subject to dependencies, run conditions and probabilistic dynamic events.
//! Speech, intent classification and playback sit behind the traits in
//! [`io`].

pub mod core;
pub mod io;
pub mod schema;

pub use crate::core::config::{EngineConfig, MatchMode};
pub use crate::core::engine::{StepOutcome, StoryEngine, StoryError};
pub use crate::core::graph::StoryGraph;
pub use crate::schema::content::StoryContent;
