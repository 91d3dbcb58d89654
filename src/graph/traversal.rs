//! Neighborhood traversal over the prerequisite graph.
//!
//! Given a root concept and a depth bound, collects every concept reachable
//! within that many hops along prerequisite edges in either direction
//! (ancestors through incoming edges, descendants through outgoing ones,
//! never mixing the two on one path), plus the direct edges among them.
//!
//! Two strategies produce the same logical result:
//! - [`TraversalStrategy::Iterative`] expands level by level with one
//!   `Predecessors` / `Successors` query per visited concept.
//! - [`TraversalStrategy::Bulk`] issues a single `NeighborhoodPaths` query
//!   and rebuilds the subgraph from the returned rows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConceptGraphError, Result, TraversalStep};
use crate::graph::decode::{
    concept_from_node, link_from_relationship, node_column, relationships_column,
    resolved_concept, string_set_column,
};
use crate::store::{
    AccessMode, Deadline, GraphStore, Identity, Params, Query, Record, Relationship, Session,
    Statement,
};
use crate::types::{Concept, Link};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The subgraph around a root concept.
///
/// `nodes` holds each concept exactly once, root first. `edges` holds exactly
/// the direct prerequisite edges whose endpoints are both in `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighborhood {
    #[serde(rename = "concepts")]
    pub nodes: Vec<Concept>,
    #[serde(rename = "links")]
    pub edges: Vec<Link>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalStrategy {
    #[default]
    Iterative,
    Bulk,
}

impl TraversalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iterative => "iterative",
            Self::Bulk => "bulk",
        }
    }

    /// Case-insensitive parse. Returns `None` for unknown names.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iterative" => Some(Self::Iterative),
            "bulk" => Some(Self::Bulk),
            _ => None,
        }
    }
}

impl fmt::Display for TraversalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraversalStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_loose(s)
            .ok_or_else(|| format!("unknown traversal strategy '{s}' (expected iterative or bulk)"))
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Direction {
    Ancestors,
    Descendants,
}

impl Direction {
    fn statement(self) -> Statement {
        match self {
            Self::Ancestors => Statement::Predecessors,
            Self::Descendants => Statement::Successors,
        }
    }

    fn step(self) -> TraversalStep {
        match self {
            Self::Ancestors => TraversalStep::Ancestors,
            Self::Descendants => TraversalStep::Descendants,
        }
    }

    /// The edge between the concept being expanded and a neighbor found from it.
    fn link(self, current: &str, neighbor: &str) -> Link {
        match self {
            Self::Ancestors => Link::new(neighbor, current),
            Self::Descendants => Link::new(current, neighbor),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Ancestors => "ancestors",
            Self::Descendants => "descendants",
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Accumulates nodes and candidate edges, then applies the dedup and
/// both-endpoints-present rules.
#[derive(Debug, Default)]
struct Assembly {
    nodes: Vec<Concept>,
    seen: HashSet<String>,
    links: BTreeSet<Link>,
}

impl Assembly {
    /// Keep `concept` unless one with the same id is already kept. Its
    /// one-hop prerequisites become candidate edges either way.
    fn add_node(&mut self, concept: Concept) {
        for prereq in &concept.prerequisite_ids {
            self.links.insert(Link::new(prereq.as_str(), concept.id.as_str()));
        }
        if self.seen.insert(concept.id.clone()) {
            self.nodes.push(concept);
        }
    }

    fn add_link(&mut self, link: Link) {
        self.links.insert(link);
    }

    fn finish(self) -> Neighborhood {
        let seen = self.seen;
        let edges = self
            .links
            .into_iter()
            .filter(|l| seen.contains(&l.from_id) && seen.contains(&l.to_id))
            .collect();
        Neighborhood {
            nodes: self.nodes,
            edges,
        }
    }
}

// ---------------------------------------------------------------------------
// NeighborhoodEngine
// ---------------------------------------------------------------------------

/// Stateless, re-entrant traversal engine over a shared store.
///
/// Each call opens exactly one read session and releases it on return.
#[derive(Clone)]
pub struct NeighborhoodEngine {
    store: Arc<dyn GraphStore>,
    strategy: TraversalStrategy,
}

impl fmt::Debug for NeighborhoodEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeighborhoodEngine")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl NeighborhoodEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            strategy: TraversalStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: TraversalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Collect the neighborhood of `root_id` up to `depth` hops, with no
    /// deadline.
    pub fn neighborhood(&self, root_id: &str, depth: i64) -> Result<Neighborhood> {
        self.neighborhood_with_deadline(root_id, depth, Deadline::none())
    }

    /// Collect the neighborhood of `root_id` up to `depth` hops.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty id or a negative depth, before the
    ///   store is touched.
    /// - `ConceptNotFound` if the root does not exist.
    /// - Any store or decode failure, wrapped in `Traversal` with the step
    ///   it happened in. No partial result is ever returned.
    pub fn neighborhood_with_deadline(
        &self,
        root_id: &str,
        depth: i64,
        deadline: Deadline,
    ) -> Result<Neighborhood> {
        validate(root_id, depth)?;

        let mut session = self
            .store
            .session(AccessMode::Read)
            .map_err(|e| e.during(TraversalStep::Root))?;

        let result = match self.strategy {
            TraversalStrategy::Iterative => iterative(session.as_mut(), root_id, depth, deadline),
            TraversalStrategy::Bulk => bulk(session.as_mut(), root_id, depth, deadline),
        };

        match &result {
            Ok(hood) => tracing::debug!(
                root = root_id,
                depth,
                strategy = self.strategy.as_str(),
                nodes = hood.nodes.len(),
                edges = hood.edges.len(),
                "neighborhood assembled"
            ),
            Err(e) => tracing::debug!(
                root = root_id,
                depth,
                strategy = self.strategy.as_str(),
                error = %e,
                "neighborhood failed"
            ),
        }
        result
    }
}

fn validate(root_id: &str, depth: i64) -> Result<()> {
    if root_id.trim().is_empty() {
        return Err(ConceptGraphError::InvalidArgument(
            "root id must not be empty".into(),
        ));
    }
    if depth < 0 {
        return Err(ConceptGraphError::InvalidArgument(format!(
            "depth must be non-negative, got {depth}"
        )));
    }
    Ok(())
}

/// Fetch the root fully resolved. A missing root is `ConceptNotFound`.
fn fetch_root(session: &mut dyn Session, root_id: &str, deadline: Deadline) -> Result<Concept> {
    let records = session
        .query_read(&Query::by_uuid(Statement::ConceptById, root_id), deadline)
        .map_err(|e| e.during(TraversalStep::Root))?;
    match records.first() {
        Some(record) => {
            resolved_concept(record, "concept", "prerequisites").map_err(|e| e.during(TraversalStep::Root))
        }
        None => Err(ConceptGraphError::ConceptNotFound(root_id.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Iterative strategy
// ---------------------------------------------------------------------------

fn iterative(
    session: &mut dyn Session,
    root_id: &str,
    depth: i64,
    deadline: Deadline,
) -> Result<Neighborhood> {
    let mut assembly = Assembly::default();
    assembly.add_node(fetch_root(session, root_id, deadline)?);

    for direction in [Direction::Ancestors, Direction::Descendants] {
        expand(session, root_id, depth, direction, deadline, &mut assembly)
            .map_err(|e| e.during(direction.step()))?;
    }
    Ok(assembly.finish())
}

/// Breadth-first expansion in one direction. A concept is kept and queued
/// the first time it is seen, so each one is fetched at most once and at its
/// shortest distance from the root. Concepts at distance `depth` are kept
/// but not expanded.
fn expand(
    session: &mut dyn Session,
    root_id: &str,
    depth: i64,
    direction: Direction,
    deadline: Deadline,
    assembly: &mut Assembly,
) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::from([root_id.to_string()]);
    let mut frontier = vec![root_id.to_string()];

    for level in 1..=depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for current in &frontier {
            let records =
                session.query_read(&Query::by_uuid(direction.statement(), current), deadline)?;
            for record in &records {
                let concept = resolved_concept(record, "concept", "prerequisites")?;
                assembly.add_link(direction.link(current, &concept.id));
                if visited.insert(concept.id.clone()) {
                    next.push(concept.id.clone());
                    assembly.add_node(concept);
                }
            }
        }
        tracing::debug!(
            direction = direction.as_str(),
            level,
            expanded = frontier.len(),
            found = next.len(),
            "expanded level"
        );
        frontier = next;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bulk strategy
// ---------------------------------------------------------------------------

fn bulk(
    session: &mut dyn Session,
    root_id: &str,
    depth: i64,
    deadline: Deadline,
) -> Result<Neighborhood> {
    let mut assembly = Assembly::default();
    assembly.add_node(fetch_root(session, root_id, deadline)?);

    let query = Query::new(
        Statement::NeighborhoodPaths,
        Params::new().with("uuid", root_id).with("depth", depth),
    );
    let records = session
        .query_read(&query, deadline)
        .map_err(|e| e.during(TraversalStep::Paths))?;
    tracing::debug!(rows = records.len(), "fetched neighborhood rows");

    assemble_rows(&records, &mut assembly).map_err(|e| e.during(TraversalStep::Paths))?;
    Ok(assembly.finish())
}

/// Fold neighborhood rows into `assembly`. Nodes are deduplicated by store
/// identity and relationships by relationship identity; relationship
/// endpoints are mapped back to concept ids only once every record has been
/// read, so the mapping does not depend on record order.
fn assemble_rows(records: &[Record], assembly: &mut Assembly) -> Result<()> {
    let mut identities: HashMap<Identity, String> = HashMap::new();
    let mut rel_ids: HashSet<Identity> = HashSet::new();
    let mut rels: Vec<&Relationship> = Vec::new();

    for record in records {
        let start = node_column(record, "start")?;
        if !identities.contains_key(&start.id) {
            identities.insert(start.id, concept_from_node(start)?.id);
        }

        let end = node_column(record, "end")?;
        if !identities.contains_key(&end.id) {
            let mut concept = concept_from_node(end)?;
            concept.prerequisite_ids = string_set_column(record, "prerequisites")?;
            identities.insert(end.id, concept.id.clone());
            assembly.add_node(concept);
        }

        for rel in relationships_column(record, "rels")? {
            if rel_ids.insert(rel.id) {
                rels.push(rel);
            }
        }
    }

    for rel in rels {
        if let Some(link) = link_from_relationship(rel, &identities)? {
            assembly.add_link(link);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
