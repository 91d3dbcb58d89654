//! SQLite persistence for the concept graph.

pub mod schema;
