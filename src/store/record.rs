//! Store-native result values.
//!
//! A [`Record`] is one result row: an ordered list of named columns, each
//! holding a [`Value`]. Values are loosely shaped (the store decides what a
//! column contains); the decoder in [`crate::graph::decode`] is the only place
//! that turns them into domain types.

use std::collections::BTreeMap;

/// Store-internal identity of a node or relationship. Distinct from the
/// domain `uuid` property and only meaningful within one store.
pub type Identity = i64;

/// Property map carried by nodes and relationships.
pub type Properties = BTreeMap<String, Value>;

/// A node as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Identity,
    pub labels: Vec<String>,
    pub props: Properties,
}

/// A directed relationship as returned by the store. Endpoints are store
/// identities, not domain ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: Identity,
    pub start_id: Identity,
    pub end_id: Identity,
    pub rel_type: String,
    pub props: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Node(Node),
    Relationship(Relationship),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Node(_) => "node",
            Self::Relationship(_) => "relationship",
            Self::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Self::Node(n)
    }
}

impl From<Relationship> for Value {
    fn from(r: Relationship) -> Self {
        Self::Relationship(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Builder-style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }
}
