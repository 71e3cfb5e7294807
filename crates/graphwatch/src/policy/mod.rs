//! Consumers that act on connection notifications.

pub mod default_nodes;

pub use default_nodes::{DefaultNodes, StateError, StateStore, DEFAULT_KEYS};
