//! ConceptGraph: a prerequisite knowledge graph.
//!
//! Concepts are nodes; a directed edge `A -> B` says A must be learned before
//! B. The core operation is [`graph::NeighborhoodEngine::neighborhood`],
//! which returns every concept within a depth bound of a root concept in
//! either direction, plus the edges among them. The crate also ships a
//! SQLite-backed store, a CRUD service, and an HTTP API.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod observability;
pub mod server;
pub mod store;
pub mod types;

pub use error::{ConceptGraphError, Result};
pub use types::{Concept, Link};
