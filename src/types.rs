//! Core domain types for ConceptGraph.
//!
//! Field names serialize to the wire format the frontend already speaks:
//! concepts carry `uuid` / `prerequisites`, links carry `start_id` / `end_id`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Concept
// ---------------------------------------------------------------------------

/// A single learnable unit in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Stable identifier assigned at creation. Never reused.
    #[serde(rename = "uuid")]
    pub id: String,
    pub title: String,
    pub content: String,
    /// Ids of concepts with a direct edge into this one. Computed from the
    /// graph on read, never stored on the node itself.
    #[serde(rename = "prerequisites", default)]
    pub prerequisite_ids: BTreeSet<String>,
}

impl Concept {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            prerequisite_ids: BTreeSet::new(),
        }
    }

    /// Builder-style helper for attaching the one-hop prerequisite view.
    pub fn with_prerequisites<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisite_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// A directed "is prerequisite of" edge: `from_id` must be learned before
/// `to_id`.
///
/// Equality and ordering are by `(from_id, to_id)`, so two links observed
/// through different traversal paths collapse into one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "start_id")]
    pub from_id: String,
    #[serde(rename = "end_id")]
    pub to_id: String,
}

impl Link {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
