//! Typed decoding of store records into domain values.
//!
//! Every function here fails closed: a missing column, a missing property,
//! or a value of the wrong shape is a [`ConceptGraphError::Decode`], never a
//! panic and never a silently skipped row.

use std::collections::{BTreeSet, HashMap};

use crate::error::{ConceptGraphError, Result};
use crate::store::{Identity, Node, Record, Relationship, Value, CONCEPT_LABEL, PREREQ_OF};
use crate::types::{Concept, Link};

fn decode_err(msg: impl Into<String>) -> ConceptGraphError {
    ConceptGraphError::Decode(msg.into())
}

fn column<'r>(record: &'r Record, name: &str) -> Result<&'r Value> {
    record
        .get(name)
        .ok_or_else(|| decode_err(format!("record has no column '{name}'")))
}

/// The node held in column `name`.
pub fn node_column<'r>(record: &'r Record, name: &str) -> Result<&'r Node> {
    match column(record, name)? {
        Value::Node(node) => Ok(node),
        other => Err(decode_err(format!(
            "column '{name}' should be a node, got {}",
            other.type_name()
        ))),
    }
}

/// The list of relationships held in column `name`.
pub fn relationships_column<'r>(record: &'r Record, name: &str) -> Result<Vec<&'r Relationship>> {
    match column(record, name)? {
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Relationship(rel) => Ok(rel),
                other => Err(decode_err(format!(
                    "column '{name}' should hold relationships, found {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(decode_err(format!(
            "column '{name}' should be a list, got {}",
            other.type_name()
        ))),
    }
}

/// The list of strings held in column `name`, as a set.
pub fn string_set_column(record: &Record, name: &str) -> Result<BTreeSet<String>> {
    match column(record, name)? {
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(decode_err(format!(
                    "column '{name}' should hold strings, found {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(decode_err(format!(
            "column '{name}' should be a list, got {}",
            other.type_name()
        ))),
    }
}

fn string_prop(node: &Node, key: &str) -> Result<String> {
    match node.props.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(decode_err(format!(
            "node {} property '{key}' should be a string, got {}",
            node.id,
            other.type_name()
        ))),
        None => Err(decode_err(format!(
            "node {} is missing property '{key}'",
            node.id
        ))),
    }
}

/// Convert a `Concept` node into a [`Concept`] with no prerequisite view.
pub fn concept_from_node(node: &Node) -> Result<Concept> {
    if !node.labels.iter().any(|l| l == CONCEPT_LABEL) {
        return Err(decode_err(format!(
            "node {} is not labelled {CONCEPT_LABEL} (labels: {:?})",
            node.id, node.labels
        )));
    }
    let id = string_prop(node, "uuid")?;
    if id.is_empty() {
        return Err(decode_err(format!("node {} has an empty uuid", node.id)));
    }
    Ok(Concept::new(
        id,
        string_prop(node, "title")?,
        string_prop(node, "content")?,
    ))
}

/// Decode a fully resolved concept: the node in `node_col` plus the one-hop
/// prerequisite ids in `prereq_col`.
pub fn resolved_concept(record: &Record, node_col: &str, prereq_col: &str) -> Result<Concept> {
    let mut concept = concept_from_node(node_column(record, node_col)?)?;
    concept.prerequisite_ids = string_set_column(record, prereq_col)?;
    Ok(concept)
}

/// Convert a relationship into a [`Link`], mapping its store-internal
/// endpoints back to domain ids through `identities`.
///
/// Returns `Ok(None)` when an endpoint is not in the table: the edge points
/// outside the nodes seen so far and is dropped rather than reported with an
/// empty id.
pub fn link_from_relationship(
    rel: &Relationship,
    identities: &HashMap<Identity, String>,
) -> Result<Option<Link>> {
    if rel.rel_type != PREREQ_OF {
        return Err(decode_err(format!(
            "relationship {} has type '{}', expected {PREREQ_OF}",
            rel.id, rel.rel_type
        )));
    }
    match (identities.get(&rel.start_id), identities.get(&rel.end_id)) {
        (Some(from), Some(to)) => Ok(Some(Link::new(from.as_str(), to.as_str()))),
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
