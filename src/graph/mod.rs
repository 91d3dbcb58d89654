//! Graph layer: record decoding, neighborhood traversal, and concept CRUD.

pub mod decode;
pub mod service;
pub mod traversal;

pub use service::ConceptService;
pub use traversal::{Neighborhood, NeighborhoodEngine, TraversalStrategy};
