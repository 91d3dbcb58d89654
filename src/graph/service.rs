//! CRUD operations on concepts and prerequisite edges.
//!
//! Every operation opens one session. Writes that depend on a prior
//! existence check do the check inside the same write session, so the check
//! and the write see the same state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{ConceptGraphError, Result};
use crate::graph::decode::resolved_concept;
use crate::store::{AccessMode, Deadline, GraphStore, Params, Query, Session, Statement};
use crate::types::{Concept, Link};

#[derive(Clone)]
pub struct ConceptService {
    store: Arc<dyn GraphStore>,
    timeout: Option<Duration>,
}

impl fmt::Debug for ConceptService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConceptService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConceptGraphError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

/// Read one concept by id inside an already-open session.
fn lookup(session: &mut dyn Session, id: &str, deadline: Deadline) -> Result<Option<Concept>> {
    let records = session.query_read(&Query::by_uuid(Statement::ConceptById, id), deadline)?;
    records
        .first()
        .map(|r| resolved_concept(r, "concept", "prerequisites"))
        .transpose()
}

fn lookup_existing(session: &mut dyn Session, id: &str, deadline: Deadline) -> Result<Concept> {
    lookup(session, id, deadline)?.ok_or_else(|| ConceptGraphError::ConceptNotFound(id.to_string()))
}

fn concepts_of(records: &[crate::store::Record]) -> Result<Vec<Concept>> {
    records
        .iter()
        .map(|r| resolved_concept(r, "concept", "prerequisites"))
        .collect()
}

impl ConceptService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound every call to `timeout` from its start.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn deadline(&self) -> Deadline {
        self.timeout.map(Deadline::after).unwrap_or_default()
    }

    /// Create a concept with a fresh id and link each existing prerequisite
    /// to it. Unknown prerequisite ids are skipped.
    pub fn create(&self, title: &str, content: &str, prerequisites: &[String]) -> Result<Concept> {
        require(title, "title")?;
        let deadline = self.deadline();
        let id = Uuid::new_v4().to_string();

        let mut queries = vec![Query::new(
            Statement::CreateConcept,
            Params::new()
                .with("uuid", id.as_str())
                .with("title", title)
                .with("content", content),
        )];
        queries.extend(
            prerequisites
                .iter()
                .filter(|p| !p.trim().is_empty() && p.as_str() != id)
                .map(|p| {
                    Query::new(
                        Statement::MergePrerequisite,
                        Params::new().with("from", p.as_str()).with("to", id.as_str()),
                    )
                }),
        );

        let mut session = self.store.session(AccessMode::Write)?;
        session.query_write(&queries, deadline)?;
        let concept = lookup_existing(session.as_mut(), &id, deadline)?;
        tracing::info!(
            id = %concept.id,
            prerequisites = concept.prerequisite_ids.len(),
            "created concept"
        );
        Ok(concept)
    }

    /// Replace a concept's content.
    pub fn update_content(&self, id: &str, content: &str) -> Result<Concept> {
        require(id, "concept id")?;
        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Write)?;
        lookup_existing(session.as_mut(), id, deadline)?;

        session.query_write(
            &[Query::new(
                Statement::SetContent,
                Params::new().with("uuid", id).with("content", content),
            )],
            deadline,
        )?;
        tracing::debug!(id, "updated concept content");
        lookup_existing(session.as_mut(), id, deadline)
    }

    /// Add the edge `from_id -> to_id`. Linking twice is a no-op.
    pub fn link(&self, from_id: &str, to_id: &str) -> Result<Link> {
        require(from_id, "start id")?;
        require(to_id, "end id")?;
        if from_id == to_id {
            return Err(ConceptGraphError::InvalidArgument(format!(
                "concept '{from_id}' cannot be its own prerequisite"
            )));
        }

        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Write)?;
        lookup_existing(session.as_mut(), from_id, deadline)?;
        lookup_existing(session.as_mut(), to_id, deadline)?;

        session.query_write(
            &[Query::new(
                Statement::MergePrerequisite,
                Params::new().with("from", from_id).with("to", to_id),
            )],
            deadline,
        )?;
        tracing::debug!(from = from_id, to = to_id, "linked concepts");
        Ok(Link::new(from_id, to_id))
    }

    /// Remove a concept together with every edge touching it.
    pub fn delete(&self, id: &str) -> Result<()> {
        require(id, "concept id")?;
        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Write)?;
        lookup_existing(session.as_mut(), id, deadline)?;
        session.query_write(&[Query::by_uuid(Statement::DeleteConcept, id)], deadline)?;
        tracing::info!(id, "deleted concept");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Concept> {
        require(id, "concept id")?;
        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Read)?;
        lookup_existing(session.as_mut(), id, deadline)
    }

    /// Every concept, ordered by title.
    pub fn all(&self) -> Result<Vec<Concept>> {
        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Read)?;
        let records = session.query_read(
            &Query::new(Statement::AllConcepts, Params::new()),
            deadline,
        )?;
        concepts_of(&records)
    }

    /// Concepts whose title contains `query`, case-insensitively, ordered by
    /// title.
    pub fn search(&self, query: &str) -> Result<Vec<Concept>> {
        require(query, "search query")?;
        let deadline = self.deadline();
        let mut session = self.store.session(AccessMode::Read)?;
        let records = session.query_read(
            &Query::new(Statement::SearchTitles, Params::new().with("query", query.trim())),
            deadline,
        )?;
        concepts_of(&records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn memory() -> (Arc<MemoryStore>, ConceptService) {
        let store = Arc::new(MemoryStore::new());
        let service = ConceptService::new(store.clone());
        (store, service)
    }

    #[test]
    fn create_assigns_uuid_and_links_prerequisites() {
        let (_, service) = memory();
        let sets = service.create("Sets", "collections", &[]).unwrap();
        let functions = service
            .create("Functions", "maps", &[sets.id.clone(), "missing".into()])
            .unwrap();

        assert!(Uuid::parse_str(&functions.id).is_ok());
        assert_ne!(sets.id, functions.id);
        assert_eq!(functions.prerequisite_ids, BTreeSet::from([sets.id.clone()]));
        assert_eq!(functions.content, "maps");
    }

    #[test]
    fn create_rejects_empty_title() {
        let (store, service) = memory();
        let err = service.create("  ", "", &[]).unwrap_err();
        assert!(matches!(err, ConceptGraphError::InvalidArgument(_)));
        assert_eq!(store.concept_count(), 0);
    }

    #[test]
    fn update_content_changes_only_content() {
        let (_, service) = memory();
        let c = service.create("Limits", "old", &[]).unwrap();
        let updated = service.update_content(&c.id, "new").unwrap();
        assert_eq!(updated.content, "new");
        assert_eq!(updated.title, "Limits");
    }

    #[test]
    fn update_unknown_is_not_found() {
        let (_, service) = memory();
        assert!(matches!(
            service.update_content("ghost", "x"),
            Err(ConceptGraphError::ConceptNotFound(_))
        ));
    }

    #[test]
    fn link_checks_endpoints() {
        let (store, service) = memory();
        let a = service.create("A", "", &[]).unwrap();
        let b = service.create("B", "", &[]).unwrap();

        assert_eq!(service.link(&a.id, &b.id).unwrap(), Link::new(&a.id, &b.id));
        service.link(&a.id, &b.id).unwrap();
        assert_eq!(store.edge_count(), 1, "linking twice is a no-op");

        assert!(matches!(
            service.link(&a.id, &a.id),
            Err(ConceptGraphError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.link(&a.id, "ghost"),
            Err(ConceptGraphError::ConceptNotFound(ref id)) if id == "ghost"
        ));
    }

    #[test]
    fn delete_removes_concept_and_edges() {
        let (store, service) = memory();
        let a = service.create("A", "", &[]).unwrap();
        let b = service.create("B", "", &[a.id.clone()]).unwrap();

        service.delete(&a.id).unwrap();
        assert_eq!(store.concept_count(), 1);
        assert_eq!(store.edge_count(), 0);
        assert!(service.get(&b.id).unwrap().prerequisite_ids.is_empty());
        assert!(matches!(
            service.delete(&a.id),
            Err(ConceptGraphError::ConceptNotFound(_))
        ));
    }

    #[test]
    fn all_and_search_are_ordered_by_title() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let service = ConceptService::new(store);
        for title in ["Linear algebra", "Calculus", "Abstract algebra"] {
            service.create(title, "", &[]).unwrap();
        }

        let titles = |cs: Vec<Concept>| cs.into_iter().map(|c| c.title).collect::<Vec<_>>();
        assert_eq!(
            titles(service.all().unwrap()),
            vec!["Abstract algebra", "Calculus", "Linear algebra"]
        );
        assert_eq!(
            titles(service.search("ALGEBRA").unwrap()),
            vec!["Abstract algebra", "Linear algebra"]
        );
        assert!(service.search("").is_err());
    }

    #[test]
    fn zero_timeout_fails_fast() {
        let (_, service) = memory();
        let service = service.with_timeout(Duration::ZERO);
        assert!(matches!(
            service.all(),
            Err(ConceptGraphError::DeadlineExceeded)
        ));
    }
}
