//! Graph store client: the seam between ConceptGraph and its backing store.
//!
//! The traversal engine and the concept service only ever talk to a
//! [`GraphStore`]: they open a scoped [`Session`], run parameterized
//! [`Statement`]s through it, and get back store-native [`Record`]s.
//!
//! Two backends implement the interface:
//! - [`sqlite::SqliteStore`]: the persistent store used by the server
//! - [`memory::MemoryStore`]: an in-process store for tests and fakes

pub mod memory;
pub mod record;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{ConceptGraphError, Result};

pub use memory::MemoryStore;
pub use record::{Identity, Node, Properties, Record, Relationship, Value};
pub use sqlite::SqliteStore;

/// Node label carried by every concept.
pub const CONCEPT_LABEL: &str = "Concept";

/// Relationship type of a prerequisite edge.
pub const PREREQ_OF: &str = "PREREQ_OF";

// ---------------------------------------------------------------------------
// AccessMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Point in time after which store calls fail fast with
/// [`ConceptGraphError::DeadlineExceeded`].
///
/// Threaded into every session call so a long traversal stops issuing
/// queries once the caller has given up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Whether this deadline can expire at all.
    pub fn is_bounded(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if Instant::now() >= at)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(ConceptGraphError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

/// The statements a graph store understands.
///
/// Read statements return concept rows as a `concept` node column plus a
/// `prerequisites` list of the node's direct prerequisite ids.
/// `NeighborhoodPaths` instead returns `start` / `end` nodes and a `rels`
/// list of relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    /// `uuid` → at most one row.
    ConceptById,
    /// `uuid` → one row per concept with an edge into `uuid`.
    Predecessors,
    /// `uuid` → one row per concept with an edge out of `uuid`.
    Successors,
    /// `uuid`, `depth` → one row per concept within `depth` hops of `uuid`
    /// in either direction (never mixing directions), the root included.
    /// `start` is the root, `end` the reached concept, and `rels` the edges
    /// into `end` from other reached concepts, so each edge shows up once.
    NeighborhoodPaths,
    AllConcepts,
    /// `query` → concepts whose title contains `query`, case-insensitively.
    SearchTitles,
    /// `uuid`, `title`, `content`.
    CreateConcept,
    /// `from`, `to`. No-op when either endpoint is missing or the edge
    /// already exists.
    MergePrerequisite,
    /// `uuid`, `content`.
    SetContent,
    /// `uuid`. Removes the concept and every edge touching it.
    DeleteConcept,
}

impl Statement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConceptById => "concept_by_id",
            Self::Predecessors => "predecessors",
            Self::Successors => "successors",
            Self::NeighborhoodPaths => "neighborhood_paths",
            Self::AllConcepts => "all_concepts",
            Self::SearchTitles => "search_titles",
            Self::CreateConcept => "create_concept",
            Self::MergePrerequisite => "merge_prerequisite",
            Self::SetContent => "set_content",
            Self::DeleteConcept => "delete_concept",
        }
    }

}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Params / Query
// ---------------------------------------------------------------------------

/// Named statement parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Required string parameter. Missing or mistyped is a query error.
    pub fn str(&self, name: &str) -> Result<&str> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ConceptGraphError::QuerySyntax(format!(
                "parameter ${name} must be a string, got {}",
                other.type_name()
            ))),
            None => Err(ConceptGraphError::QuerySyntax(format!(
                "missing parameter ${name}"
            ))),
        }
    }

    /// Required integer parameter.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.0.get(name) {
            Some(Value::Integer(i)) => Ok(*i),
            Some(other) => Err(ConceptGraphError::QuerySyntax(format!(
                "parameter ${name} must be an integer, got {}",
                other.type_name()
            ))),
            None => Err(ConceptGraphError::QuerySyntax(format!(
                "missing parameter ${name}"
            ))),
        }
    }
}

/// A statement bound to its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub statement: Statement,
    pub params: Params,
}

impl Query {
    pub fn new(statement: Statement, params: Params) -> Self {
        Self { statement, params }
    }

    /// Shorthand for the many statements keyed by a single concept id.
    pub fn by_uuid(statement: Statement, uuid: &str) -> Self {
        Self::new(statement, Params::new().with("uuid", uuid))
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A scoped, exclusive handle on the store.
///
/// A session is owned by exactly one caller for the duration of one
/// top-level operation and released on drop.
pub trait Session {
    fn mode(&self) -> AccessMode;

    /// Run a read statement and collect its records.
    fn query_read(&mut self, query: &Query, deadline: Deadline) -> Result<Vec<Record>>;

    /// Run write statements in one transaction: all commit or none do.
    fn query_write(&mut self, queries: &[Query], deadline: Deadline) -> Result<()>;
}

/// A backing store that hands out sessions.
pub trait GraphStore: Send + Sync {
    fn session(&self, mode: AccessMode) -> Result<Box<dyn Session + '_>>;
}

/// Build the store-native node for a concept row. Shared by both backends so
/// they produce identical shapes.
pub(crate) fn concept_node(id: Identity, uuid: &str, title: &str, content: &str) -> Node {
    let mut props = Properties::new();
    props.insert("uuid".to_string(), Value::from(uuid));
    props.insert("title".to_string(), Value::from(title));
    props.insert("content".to_string(), Value::from(content));
    Node {
        id,
        labels: vec![CONCEPT_LABEL.to_string()],
        props,
    }
}

pub(crate) fn write_in_read_session(statement: Statement) -> ConceptGraphError {
    ConceptGraphError::Transaction(format!(
        "cannot execute write statement {statement} in a read session"
    ))
}

pub(crate) fn not_a_read_statement(statement: Statement) -> ConceptGraphError {
    ConceptGraphError::QuerySyntax(format!("{statement} is not a read statement"))
}

pub(crate) fn not_a_write_statement(statement: Statement) -> ConceptGraphError {
    ConceptGraphError::QuerySyntax(format!("{statement} is not a write statement"))
}
