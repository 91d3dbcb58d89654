//! SQLite-backed graph store.
//!
//! Each [`Statement`] maps to one or two prepared SQL statements, cached via
//! [`Connection::prepare_cached`]. Result rows are lifted into store-native
//! [`Record`]s so the engine sees the same shapes it would get from any
//! other property-graph backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    concept_node, not_a_read_statement, not_a_write_statement, write_in_read_session,
    AccessMode, Deadline, GraphStore, Identity, Node, Params, Query, Record, Relationship,
    Session, Statement, Value, PREREQ_OF,
};
use crate::db::schema::initialize_database;
use crate::error::{ConceptGraphError, Result};

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

// Every concept-returning query selects the same five leading columns:
// rowid, uuid, title, content, and the JSON array of direct prerequisite ids.
// The join on `concepts` inside the subquery skips edges whose source row is
// gone, so a dangling id never surfaces.

const CONCEPT_BY_ID_SQL: &str = "\
SELECT c.id, c.uuid, c.title, c.content,
       (SELECT json_group_array(e.from_uuid)
          FROM prereq_edges e JOIN concepts p ON p.uuid = e.from_uuid
         WHERE e.to_uuid = c.uuid) AS prerequisites
FROM concepts c
WHERE c.uuid = ?1";

const PREDECESSORS_SQL: &str = "\
SELECT p.id, p.uuid, p.title, p.content,
       (SELECT json_group_array(e2.from_uuid)
          FROM prereq_edges e2 JOIN concepts q ON q.uuid = e2.from_uuid
         WHERE e2.to_uuid = p.uuid) AS prerequisites
FROM prereq_edges e
JOIN concepts p ON p.uuid = e.from_uuid
WHERE e.to_uuid = ?1
ORDER BY p.title ASC, p.uuid ASC";

const SUCCESSORS_SQL: &str = "\
SELECT s.id, s.uuid, s.title, s.content,
       (SELECT json_group_array(e2.from_uuid)
          FROM prereq_edges e2 JOIN concepts q ON q.uuid = e2.from_uuid
         WHERE e2.to_uuid = s.uuid) AS prerequisites
FROM prereq_edges e
JOIN concepts s ON s.uuid = e.to_uuid
WHERE e.from_uuid = ?1
ORDER BY s.title ASC, s.uuid ASC";

const ALL_CONCEPTS_SQL: &str = "\
SELECT c.id, c.uuid, c.title, c.content,
       (SELECT json_group_array(e.from_uuid)
          FROM prereq_edges e JOIN concepts p ON p.uuid = e.from_uuid
         WHERE e.to_uuid = c.uuid) AS prerequisites
FROM concepts c
ORDER BY c.title ASC, c.uuid ASC";

const SEARCH_TITLES_SQL: &str = "\
SELECT c.id, c.uuid, c.title, c.content,
       (SELECT json_group_array(e.from_uuid)
          FROM prereq_edges e JOIN concepts p ON p.uuid = e.from_uuid
         WHERE e.to_uuid = c.uuid) AS prerequisites
FROM concepts c
WHERE c.title LIKE ?1 ESCAPE '\\'
ORDER BY c.title ASC, c.uuid ASC";

/// Direction-split, depth-bounded reachability.
///
/// Each recursive CTE keeps one row per `(uuid, depth)` pair, so the working
/// set is bounded by concepts times depth however many distinct paths reach
/// a concept. `reached` keeps the shortest distance per concept across both
/// directions. Every reached concept comes back once, together with the edges
/// into it from other reached concepts, so each induced edge appears in
/// exactly one row as a `[edge id, from rowid, to rowid]` triple.
const NEIGHBORHOOD_PATHS_SQL: &str = "\
WITH RECURSIVE
    outgoing(uuid, depth) AS (
        SELECT ?1, 0
        UNION
        SELECT e.to_uuid, o.depth + 1
        FROM outgoing o
        JOIN prereq_edges e ON e.from_uuid = o.uuid
        WHERE o.depth < ?2
    ),
    incoming(uuid, depth) AS (
        SELECT ?1, 0
        UNION
        SELECT e.from_uuid, i.depth + 1
        FROM incoming i
        JOIN prereq_edges e ON e.to_uuid = i.uuid
        WHERE i.depth < ?2
    ),
    reached(uuid, depth) AS (
        SELECT uuid, MIN(depth)
        FROM (SELECT uuid, depth FROM outgoing
              UNION ALL
              SELECT uuid, depth FROM incoming)
        GROUP BY uuid
    )
SELECT n.id, n.uuid, n.title, n.content,
       (SELECT json_group_array(e.from_uuid)
          FROM prereq_edges e JOIN concepts p ON p.uuid = e.from_uuid
         WHERE e.to_uuid = n.uuid) AS prerequisites,
       (SELECT json_group_array(json_array(e.id, p.id, n.id))
          FROM prereq_edges e
          JOIN reached r ON r.uuid = e.from_uuid
          JOIN concepts p ON p.uuid = e.from_uuid
         WHERE e.to_uuid = n.uuid) AS rels
FROM reached
JOIN concepts n ON n.uuid = reached.uuid
ORDER BY reached.depth ASC, n.title ASC, n.uuid ASC";

const CREATE_CONCEPT_SQL: &str = "\
INSERT INTO concepts (uuid, title, content) VALUES (?1, ?2, ?3)";

const MERGE_PREREQUISITE_SQL: &str = "\
INSERT OR IGNORE INTO prereq_edges (from_uuid, to_uuid)
SELECT a.uuid, b.uuid
FROM concepts a
JOIN concepts b ON b.uuid = ?2
WHERE a.uuid = ?1";

const SET_CONTENT_SQL: &str = "\
UPDATE concepts SET content = ?2 WHERE uuid = ?1";

const DELETE_EDGES_OF_SQL: &str = "\
DELETE FROM prereq_edges WHERE from_uuid = ?1 OR to_uuid = ?1";

const DELETE_CONCEPT_SQL: &str = "\
DELETE FROM concepts WHERE uuid = ?1";

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a rusqlite error onto the store error taxonomy.
fn classify(err: rusqlite::Error, mode: AccessMode) -> ConceptGraphError {
    let message = err.to_string();
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::DiskFull
            | ErrorCode::PermissionDenied
            | ErrorCode::FileLockingProtocolFailed => ConceptGraphError::StoreUnavailable(message),
            // Only raised by the progress handler installed for a deadline.
            ErrorCode::OperationInterrupted => ConceptGraphError::DeadlineExceeded,
            ErrorCode::ConstraintViolation => ConceptGraphError::ConstraintViolation(message),
            ErrorCode::Unknown | ErrorCode::ApiMisuse | ErrorCode::ParameterOutOfRange => {
                ConceptGraphError::QuerySyntax(message)
            }
            _ => match mode {
                AccessMode::Read => ConceptGraphError::StoreUnavailable(message),
                AccessMode::Write => ConceptGraphError::Transaction(message),
            },
        },
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnName(_)
        | rusqlite::Error::InvalidColumnIndex(_) => ConceptGraphError::Decode(message),
        rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::InvalidQuery
        | rusqlite::Error::MultipleStatement
        | rusqlite::Error::ExecuteReturnedResults => ConceptGraphError::QuerySyntax(message),
        _ => match mode {
            AccessMode::Read => ConceptGraphError::QuerySyntax(message),
            AccessMode::Write => ConceptGraphError::Transaction(message),
        },
    }
}

fn read_err(err: rusqlite::Error) -> ConceptGraphError {
    classify(err, AccessMode::Read)
}

fn write_err(err: rusqlite::Error) -> ConceptGraphError {
    classify(err, AccessMode::Write)
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Lift the five leading concept columns of a row into a node plus its
/// prerequisite id list.
fn concept_row(row: &Row<'_>) -> rusqlite::Result<(Node, Vec<String>)> {
    let id: i64 = row.get(0)?;
    let uuid: String = row.get(1)?;
    let title: String = row.get(2)?;
    let content: String = row.get(3)?;
    let raw_prereqs: String = row.get(4)?;
    let prerequisites: Vec<String> = serde_json::from_str(&raw_prereqs).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok((concept_node(id, &uuid, &title, &content), prerequisites))
}

fn concept_record((node, prerequisites): (Node, Vec<String>)) -> Record {
    Record::new()
        .with("concept", node)
        .with("prerequisites", prerequisites)
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`
/// pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn concept_by_id(conn: &Connection, uuid: &str) -> Result<Option<(Node, Vec<String>)>> {
    let mut stmt = conn.prepare_cached(CONCEPT_BY_ID_SQL).map_err(read_err)?;
    stmt.query_row(params![uuid], concept_row)
        .optional()
        .map_err(read_err)
}

fn concept_rows(conn: &Connection, sql: &str, arg: &str) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare_cached(sql).map_err(read_err)?;
    let rows = stmt.query_map(params![arg], concept_row).map_err(read_err)?;
    rows.map(|row| row.map(concept_record))
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_err)
}

fn all_concepts(conn: &Connection) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare_cached(ALL_CONCEPTS_SQL).map_err(read_err)?;
    let rows = stmt.query_map([], concept_row).map_err(read_err)?;
    rows.map(|row| row.map(concept_record))
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_err)
}

fn neighborhood_paths(conn: &Connection, params: &Params) -> Result<Vec<Record>> {
    let uuid = params.str("uuid")?;
    let depth = params.int("depth")?;
    if depth < 0 {
        return Err(ConceptGraphError::QuerySyntax(format!(
            "parameter $depth must be non-negative, got {depth}"
        )));
    }

    let Some((start, _)) = concept_by_id(conn, uuid)? else {
        return Ok(Vec::new());
    };

    let mut stmt = conn
        .prepare_cached(NEIGHBORHOOD_PATHS_SQL)
        .map_err(read_err)?;
    let rows = stmt
        .query_map(params![uuid, depth], |row| {
            let concept = concept_row(row)?;
            let raw_rels: String = row.get(5)?;
            let rels: Vec<(Identity, Identity, Identity)> = serde_json::from_str(&raw_rels)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok((concept, rels))
        })
        .map_err(read_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_err)?;

    Ok(rows
        .into_iter()
        .map(|((end, prerequisites), rels)| {
            let rels = rels
                .into_iter()
                .map(|(id, start_id, end_id)| {
                    Value::Relationship(Relationship {
                        id,
                        start_id,
                        end_id,
                        rel_type: PREREQ_OF.to_string(),
                        props: Default::default(),
                    })
                })
                .collect();
            Record::new()
                .with("start", start.clone())
                .with("end", end)
                .with("rels", Value::List(rels))
                .with("prerequisites", prerequisites)
        })
        .collect())
}

fn execute_read(conn: &Connection, query: &Query) -> Result<Vec<Record>> {
    let params = &query.params;
    match query.statement {
        Statement::ConceptById => {
            Ok(concept_by_id(conn, params.str("uuid")?)?
                .map(concept_record)
                .into_iter()
                .collect())
        }
        Statement::Predecessors => concept_rows(conn, PREDECESSORS_SQL, params.str("uuid")?),
        Statement::Successors => concept_rows(conn, SUCCESSORS_SQL, params.str("uuid")?),
        Statement::NeighborhoodPaths => neighborhood_paths(conn, params),
        Statement::AllConcepts => all_concepts(conn),
        Statement::SearchTitles => {
            let pattern = format!("%{}%", escape_like(params.str("query")?));
            concept_rows(conn, SEARCH_TITLES_SQL, &pattern)
        }
        other => Err(not_a_read_statement(other)),
    }
}

fn execute_write(conn: &Connection, query: &Query) -> Result<()> {
    let params = &query.params;
    match query.statement {
        Statement::CreateConcept => {
            let mut stmt = conn.prepare_cached(CREATE_CONCEPT_SQL).map_err(write_err)?;
            stmt.execute(params![
                params.str("uuid")?,
                params.str("title")?,
                params.str("content")?
            ])
            .map_err(write_err)?;
        }
        Statement::MergePrerequisite => {
            let mut stmt = conn
                .prepare_cached(MERGE_PREREQUISITE_SQL)
                .map_err(write_err)?;
            stmt.execute(params![params.str("from")?, params.str("to")?])
                .map_err(write_err)?;
        }
        Statement::SetContent => {
            let mut stmt = conn.prepare_cached(SET_CONTENT_SQL).map_err(write_err)?;
            stmt.execute(params![params.str("uuid")?, params.str("content")?])
                .map_err(write_err)?;
        }
        Statement::DeleteConcept => {
            let uuid = params.str("uuid")?;
            let mut del_edges = conn
                .prepare_cached(DELETE_EDGES_OF_SQL)
                .map_err(write_err)?;
            del_edges.execute(params![uuid]).map_err(write_err)?;

            let mut del_concept = conn
                .prepare_cached(DELETE_CONCEPT_SQL)
                .map_err(write_err)?;
            del_concept.execute(params![uuid]).map_err(write_err)?;
        }
        other => return Err(not_a_write_statement(other)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Graph store over a single SQLite connection.
///
/// Sessions take the connection mutex for their whole lifetime, so a session
/// is never shared between concurrent callers. Read sessions also open a
/// deferred transaction, giving each traversal a point-in-time snapshot even
/// when another process writes to the same file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = initialize_database(&path.to_string_lossy()).map_err(|e| {
            ConceptGraphError::StoreUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "opened concept store");
        Ok(Self::from_connection(conn))
    }

    /// A fresh, private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = initialize_database(":memory:").map_err(read_err)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-initialized connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl GraphStore for SqliteStore {
    fn session(&self, mode: AccessMode) -> Result<Box<dyn Session + '_>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = mode == AccessMode::Read;
        if snapshot {
            conn.execute_batch("BEGIN DEFERRED").map_err(read_err)?;
        }
        Ok(Box::new(SqliteSession {
            conn,
            mode,
            snapshot,
        }))
    }
}

/// Virtual machine instructions between deadline polls.
const DEADLINE_POLL_OPS: i32 = 1_000;

/// Aborts the statement running on `conn` once `deadline` passes, which
/// surfaces as `SQLITE_INTERRUPT`. The handler is removed on drop.
struct DeadlineInterrupt<'c> {
    conn: &'c Connection,
    installed: bool,
}

impl<'c> DeadlineInterrupt<'c> {
    fn install(conn: &'c Connection, deadline: Deadline) -> Self {
        let installed = deadline.is_bounded();
        if installed {
            conn.progress_handler(DEADLINE_POLL_OPS, Some(move || deadline.is_expired()));
        }
        Self { conn, installed }
    }
}

impl Drop for DeadlineInterrupt<'_> {
    fn drop(&mut self) {
        if self.installed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

struct SqliteSession<'a> {
    conn: MutexGuard<'a, Connection>,
    mode: AccessMode,
    snapshot: bool,
}

impl Session for SqliteSession<'_> {
    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn query_read(&mut self, query: &Query, deadline: Deadline) -> Result<Vec<Record>> {
        deadline.check()?;
        let _interrupt = DeadlineInterrupt::install(&self.conn, deadline);
        execute_read(&self.conn, query)
    }

    fn query_write(&mut self, queries: &[Query], deadline: Deadline) -> Result<()> {
        if self.mode == AccessMode::Read {
            if let Some(first) = queries.first() {
                return Err(write_in_read_session(first.statement));
            }
        }
        deadline.check()?;

        let tx = self.conn.unchecked_transaction().map_err(write_err)?;
        for query in queries {
            execute_write(&tx, query)?;
        }
        tx.commit().map_err(write_err)?;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.snapshot {
            if let Err(e) = self.conn.execute_batch("COMMIT") {
                tracing::warn!("failed to close read snapshot: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
