pub mod action;
pub mod config;
pub mod context;
pub mod dependency;
pub mod engine;
pub mod graph;
pub mod node;
pub mod storyline;
pub mod template;
pub mod verify;
