//! In-memory graph store.
//!
//! Mirrors the statement semantics of [`super::SqliteStore`] over plain
//! collections. Used as the fake store in unit tests, and handy for seeding
//! graph shapes the SQLite schema would refuse (dangling edges).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{
    concept_node, not_a_read_statement, not_a_write_statement, write_in_read_session,
    AccessMode, Deadline, GraphStore, Identity, Node, Params, Query, Record, Relationship,
    Session, Statement, Value, PREREQ_OF,
};
use crate::error::{ConceptGraphError, Result};

#[derive(Debug, Clone)]
struct StoredConcept {
    uuid: String,
    title: String,
    content: String,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    from: String,
    to: String,
}

#[derive(Debug, Clone, Default)]
struct MemoryGraph {
    next_node_id: Identity,
    next_edge_id: Identity,
    concepts: BTreeMap<Identity, StoredConcept>,
    by_uuid: HashMap<String, Identity>,
    edges: BTreeMap<Identity, StoredEdge>,
}

impl MemoryGraph {
    fn insert_concept(&mut self, uuid: &str, title: &str, content: &str) -> Result<()> {
        if self.by_uuid.contains_key(uuid) {
            return Err(ConceptGraphError::ConstraintViolation(format!(
                "concept '{uuid}' already exists"
            )));
        }
        self.next_node_id += 1;
        let id = self.next_node_id;
        self.concepts.insert(
            id,
            StoredConcept {
                uuid: uuid.to_string(),
                title: title.to_string(),
                content: content.to_string(),
            },
        );
        self.by_uuid.insert(uuid.to_string(), id);
        Ok(())
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.values().any(|e| e.from == from && e.to == to)
    }

    fn insert_edge(&mut self, from: &str, to: &str) {
        if self.has_edge(from, to) {
            return;
        }
        self.next_edge_id += 1;
        self.edges.insert(
            self.next_edge_id,
            StoredEdge {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }

    fn node(&self, uuid: &str) -> Option<Node> {
        let id = *self.by_uuid.get(uuid)?;
        let stored = self.concepts.get(&id)?;
        Some(concept_node(id, &stored.uuid, &stored.title, &stored.content))
    }

    /// Direct prerequisite ids of `uuid`, skipping edges from missing concepts.
    fn prerequisites(&self, uuid: &str) -> Vec<String> {
        self.edges
            .values()
            .filter(|e| e.to == uuid && self.by_uuid.contains_key(&e.from))
            .map(|e| e.from.clone())
            .collect()
    }

    fn record(&self, uuid: &str) -> Option<Record> {
        let node = self.node(uuid)?;
        Some(
            Record::new()
                .with("concept", node)
                .with("prerequisites", self.prerequisites(uuid)),
        )
    }

    /// Records for `uuids`, ordered by (title, uuid) like the SQL backend.
    fn sorted_records<'a>(&self, uuids: impl Iterator<Item = &'a str>) -> Vec<Record> {
        let mut keyed: Vec<(&str, &str)> = uuids
            .filter_map(|uuid| {
                let id = self.by_uuid.get(uuid)?;
                let stored = self.concepts.get(id)?;
                Some((stored.title.as_str(), stored.uuid.as_str()))
            })
            .collect();
        keyed.sort();
        keyed
            .into_iter()
            .filter_map(|(_, uuid)| self.record(uuid))
            .collect()
    }

    fn relationship(&self, edge_id: Identity, edge: &StoredEdge) -> Option<Relationship> {
        Some(Relationship {
            id: edge_id,
            start_id: *self.by_uuid.get(&edge.from)?,
            end_id: *self.by_uuid.get(&edge.to)?,
            rel_type: PREREQ_OF.to_string(),
            props: Default::default(),
        })
    }

    /// Concepts within `depth` hops of `root`, following edges forward when
    /// `outgoing` and backward otherwise, in breadth-first order. The root
    /// is not included.
    fn reach(
        &self,
        root: &str,
        depth: i64,
        outgoing: bool,
        deadline: Deadline,
    ) -> Result<Vec<String>> {
        let mut seen: HashSet<&str> = HashSet::from([root]);
        let mut frontier: HashSet<&str> = HashSet::from([root]);
        let mut found = Vec::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            deadline.check()?;
            let mut next = HashSet::new();
            for edge in self.edges.values() {
                let (near, far) = if outgoing {
                    (edge.from.as_str(), edge.to.as_str())
                } else {
                    (edge.to.as_str(), edge.from.as_str())
                };
                if frontier.contains(near) && seen.insert(far) {
                    next.insert(far);
                    found.push(far.to_string());
                }
            }
            frontier = next;
        }
        Ok(found)
    }

    fn neighborhood_paths(&self, params: &Params, deadline: Deadline) -> Result<Vec<Record>> {
        let uuid = params.str("uuid")?;
        let depth = params.int("depth")?;
        if depth < 0 {
            return Err(ConceptGraphError::QuerySyntax(format!(
                "parameter $depth must be non-negative, got {depth}"
            )));
        }
        let Some(start) = self.node(uuid) else {
            return Ok(Vec::new());
        };

        let mut reached = vec![uuid.to_string()];
        reached.extend(self.reach(uuid, depth, true, deadline)?);
        reached.extend(self.reach(uuid, depth, false, deadline)?);
        let mut seen = HashSet::new();
        reached.retain(|u| seen.insert(u.clone()));

        let mut records = Vec::with_capacity(reached.len());
        for end_uuid in &reached {
            let Some(end) = self.node(end_uuid) else {
                continue;
            };
            let rels: Vec<Value> = self
                .edges
                .iter()
                .filter(|(_, e)| e.to == *end_uuid && seen.contains(&e.from))
                .filter_map(|(id, e)| self.relationship(*id, e))
                .map(Value::Relationship)
                .collect();
            records.push(
                Record::new()
                    .with("start", start.clone())
                    .with("end", end)
                    .with("rels", Value::List(rels))
                    .with("prerequisites", self.prerequisites(end_uuid)),
            );
        }
        Ok(records)
    }

    fn read(&self, query: &Query, deadline: Deadline) -> Result<Vec<Record>> {
        let params = &query.params;
        match query.statement {
            Statement::ConceptById => Ok(self.record(params.str("uuid")?).into_iter().collect()),
            Statement::Predecessors => {
                let uuid = params.str("uuid")?;
                let sources: HashSet<&str> = self
                    .edges
                    .values()
                    .filter(|e| e.to == uuid)
                    .map(|e| e.from.as_str())
                    .collect();
                Ok(self.sorted_records(sources.into_iter()))
            }
            Statement::Successors => {
                let uuid = params.str("uuid")?;
                let targets: HashSet<&str> = self
                    .edges
                    .values()
                    .filter(|e| e.from == uuid)
                    .map(|e| e.to.as_str())
                    .collect();
                Ok(self.sorted_records(targets.into_iter()))
            }
            Statement::NeighborhoodPaths => self.neighborhood_paths(params, deadline),
            Statement::AllConcepts => Ok(self.sorted_records(self.by_uuid.keys().map(String::as_str))),
            Statement::SearchTitles => {
                let needle = params.str("query")?.to_lowercase();
                let hits = self
                    .concepts
                    .values()
                    .filter(|c| c.title.to_lowercase().contains(&needle))
                    .map(|c| c.uuid.as_str());
                Ok(self.sorted_records(hits))
            }
            other => Err(not_a_read_statement(other)),
        }
    }

    fn write(&mut self, query: &Query) -> Result<()> {
        let params = &query.params;
        match query.statement {
            Statement::CreateConcept => self.insert_concept(
                params.str("uuid")?,
                params.str("title")?,
                params.str("content")?,
            ),
            Statement::MergePrerequisite => {
                let from = params.str("from")?;
                let to = params.str("to")?;
                if self.by_uuid.contains_key(from) && self.by_uuid.contains_key(to) {
                    self.insert_edge(from, to);
                }
                Ok(())
            }
            Statement::SetContent => {
                let uuid = params.str("uuid")?;
                let content = params.str("content")?;
                if let Some(id) = self.by_uuid.get(uuid) {
                    if let Some(stored) = self.concepts.get_mut(id) {
                        stored.content = content.to_string();
                    }
                }
                Ok(())
            }
            Statement::DeleteConcept => {
                let uuid = params.str("uuid")?;
                self.edges.retain(|_, e| e.from != uuid && e.to != uuid);
                if let Some(id) = self.by_uuid.remove(uuid) {
                    self.concepts.remove(&id);
                }
                Ok(())
            }
            other => Err(not_a_write_statement(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Graph store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGraph> {
        self.graph.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a concept directly, bypassing sessions.
    pub fn insert_concept(&self, uuid: &str, title: &str, content: &str) -> Result<()> {
        self.lock().insert_concept(uuid, title, content)
    }

    /// Seed an edge directly. Unlike `MergePrerequisite`, endpoints are not
    /// checked, so tests can build graphs with dangling ids.
    pub fn insert_edge(&self, from: &str, to: &str) {
        self.lock().insert_edge(from, to);
    }

    pub fn concept_count(&self) -> usize {
        self.lock().concepts.len()
    }

    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }
}

impl GraphStore for MemoryStore {
    fn session(&self, mode: AccessMode) -> Result<Box<dyn Session + '_>> {
        Ok(Box::new(MemorySession {
            graph: self.lock(),
            mode,
        }))
    }
}

struct MemorySession<'a> {
    graph: MutexGuard<'a, MemoryGraph>,
    mode: AccessMode,
}

impl Session for MemorySession<'_> {
    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn query_read(&mut self, query: &Query, deadline: Deadline) -> Result<Vec<Record>> {
        deadline.check()?;
        self.graph.read(query, deadline)
    }

    fn query_write(&mut self, queries: &[Query], deadline: Deadline) -> Result<()> {
        if self.mode == AccessMode::Read {
            if let Some(first) = queries.first() {
                return Err(write_in_read_session(first.statement));
            }
        }
        deadline.check()?;

        // Apply to a copy and swap it in only if every statement succeeds.
        let mut staged = MemoryGraph::clone(&self.graph);
        for query in queries {
            staged.write(query)?;
        }
        *self.graph = staged;
        Ok(())
    }
}
