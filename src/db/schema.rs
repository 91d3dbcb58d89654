//! SQLite schema initialization for ConceptGraph.
//!
//! Concepts are rows in `concepts`; prerequisite edges are rows in
//! `prereq_edges` keyed by the concepts' `uuid`. The integer primary keys of
//! both tables serve as the store-internal node and relationship identities.

use rusqlite::Connection;

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_CONCEPTS: &str = "\
CREATE TABLE IF NOT EXISTS concepts (
  id INTEGER PRIMARY KEY,
  uuid TEXT NOT NULL UNIQUE,
  title TEXT NOT NULL,
  content TEXT NOT NULL DEFAULT ''
)";

const CREATE_PREREQ_EDGES: &str = "\
CREATE TABLE IF NOT EXISTS prereq_edges (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  from_uuid TEXT NOT NULL,
  to_uuid TEXT NOT NULL,
  FOREIGN KEY (from_uuid) REFERENCES concepts(uuid) ON DELETE CASCADE,
  FOREIGN KEY (to_uuid) REFERENCES concepts(uuid) ON DELETE CASCADE
)";

// Indexes ----------------------------------------------------------------

const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_prereq_edges_pair ON prereq_edges(from_uuid, to_uuid)",
    "CREATE INDEX IF NOT EXISTS idx_prereq_edges_to ON prereq_edges(to_uuid)",
    "CREATE INDEX IF NOT EXISTS idx_concepts_title ON concepts(title)",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Open (or create) the SQLite database at `db_path` and apply the
/// ConceptGraph schema.
///
/// The returned connection has WAL mode, foreign keys, and synchronous
/// NORMAL already configured. Foreign keys are ON so deleting a concept
/// cascades to its edges and an edge can never name a missing concept.
///
/// # Errors
///
/// Returns a `rusqlite::Error` if the database cannot be opened or any DDL
/// statement fails.
pub fn initialize_database(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;

    // -- Pragmas ----------------------------------------------------------
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    // -- Tables -----------------------------------------------------------
    conn.execute_batch(CREATE_CONCEPTS)?;
    conn.execute_batch(CREATE_PREREQ_EDGES)?;

    // -- Indexes ----------------------------------------------------------
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }

    Ok(conn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
