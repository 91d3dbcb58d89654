//! Request handlers.
//!
//! Handlers validate their input, then hand the store work to the blocking
//! pool. Extractor rejections are turned into the same `{"error": ...}` body
//! as domain errors.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::graph::Neighborhood;
use crate::store::Deadline;
use crate::types::{Concept, Link};

// ---------------------------------------------------------------------------
// Request bodies and query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: i64,
}

#[derive(Debug, Deserialize)]
pub struct AroundRequest {
    pub root_id: String,
    pub depth: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateConceptRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConceptRequest {
    pub content: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run store work on the blocking pool and map its error.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

fn check_depth(depth: i64, max_depth: i64) -> Result<(), ApiError> {
    if depth < 0 {
        return Err(ApiError::bad_request(format!(
            "depth must be non-negative, got {depth}"
        )));
    }
    if depth > max_depth {
        return Err(ApiError::bad_request(format!(
            "depth {depth} exceeds the maximum of {max_depth}"
        )));
    }
    Ok(())
}

async fn neighborhood(
    state: &AppState,
    root_id: String,
    depth: i64,
) -> Result<Json<Neighborhood>, ApiError> {
    check_depth(depth, state.max_depth)?;
    if root_id.trim().is_empty() {
        return Err(ApiError::bad_request("root_id must not be empty"));
    }

    let engine = state.engine.clone();
    let deadline = Deadline::after(state.request_timeout);
    let hood =
        blocking(move || engine.neighborhood_with_deadline(&root_id, depth, deadline)).await?;
    Ok(Json(hood))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn index() -> &'static str {
    "conceptgraph\n"
}

/// `GET /concept/around/{id}?depth=N`
pub async fn concepts_around(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<DepthQuery>, QueryRejection>,
) -> Result<Json<Neighborhood>, ApiError> {
    let Query(DepthQuery { depth }) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    neighborhood(&state, id, depth).await
}

/// `POST /concept/around` with `{root_id, depth}`.
pub async fn concepts_around_body(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AroundRequest>, JsonRejection>,
) -> Result<Json<Neighborhood>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    neighborhood(&state, req.root_id, req.depth).await
}

pub async fn create_concept(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateConceptRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Concept>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let concepts = state.concepts.clone();
    let concept =
        blocking(move || concepts.create(&req.title, &req.content, &req.prerequisites)).await?;
    Ok((StatusCode::CREATED, Json(concept)))
}

pub async fn update_concept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateConceptRequest>, JsonRejection>,
) -> Result<Json<Concept>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let concepts = state.concepts.clone();
    let concept = blocking(move || concepts.update_content(&id, &req.content)).await?;
    Ok(Json(concept))
}

pub async fn link_concepts(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Link>, JsonRejection>,
) -> Result<Json<Link>, ApiError> {
    let Json(link) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let concepts = state.concepts.clone();
    let link = blocking(move || concepts.link(&link.from_id, &link.to_id)).await?;
    Ok(Json(link))
}

pub async fn delete_concept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let concepts = state.concepts.clone();
    blocking(move || concepts.delete(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_concept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Concept>, ApiError> {
    let concepts = state.concepts.clone();
    Ok(Json(blocking(move || concepts.get(&id)).await?))
}

pub async fn all_concepts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Concept>>, ApiError> {
    let concepts = state.concepts.clone();
    Ok(Json(blocking(move || concepts.all()).await?))
}

pub async fn search_concepts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<Concept>>, ApiError> {
    let Query(SearchQuery { query }) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let concepts = state.concepts.clone();
    Ok(Json(blocking(move || concepts.search(&query)).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConceptGraphConfig;
    use crate::graph::TraversalStrategy;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn test_state(strategy: TraversalStrategy) -> Arc<AppState> {
        let store = MemoryStore::new();
        for (id, title) in [("a", "Arithmetic"), ("b", "Algebra"), ("c", "Calculus")] {
            store.insert_concept(id, title, "").unwrap();
        }
        store.insert_edge("a", "b");
        store.insert_edge("b", "c");

        let mut config = ConceptGraphConfig::default();
        config.traversal.strategy = strategy;
        config.traversal.max_depth = 3;
        Arc::new(AppState::new(Arc::new(store), &config))
    }

    fn depth(depth: i64) -> Result<Query<DepthQuery>, QueryRejection> {
        Ok(Query(DepthQuery { depth }))
    }

    #[tokio::test]
    async fn around_returns_neighborhood() {
        for strategy in [TraversalStrategy::Iterative, TraversalStrategy::Bulk] {
            let state = test_state(strategy);
            let Json(hood) = concepts_around(State(state), Path("b".into()), depth(1))
                .await
                .unwrap();
            assert_eq!(hood.nodes.len(), 3, "{strategy}");
            assert_eq!(hood.edges, vec![Link::new("a", "b"), Link::new("b", "c")]);
        }
    }

    #[tokio::test]
    async fn around_body_matches_path_variant() {
        let state = test_state(TraversalStrategy::Iterative);
        let Json(from_path) = concepts_around(State(state.clone()), Path("c".into()), depth(2))
            .await
            .unwrap();
        let Json(from_body) = concepts_around_body(
            State(state),
            Ok(Json(AroundRequest {
                root_id: "c".into(),
                depth: 2,
            })),
        )
        .await
        .unwrap();
        assert_eq!(from_path, from_body);
    }

    #[tokio::test]
    async fn around_rejects_depth_out_of_range() {
        let state = test_state(TraversalStrategy::Iterative);
        let err = concepts_around(State(state.clone()), Path("b".into()), depth(4))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = concepts_around(State(state), Path("b".into()), depth(-1))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn around_unknown_root_is_404() {
        let state = test_state(TraversalStrategy::Bulk);
        let err = concepts_around(State(state), Path("zzz".into()), depth(1))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_then_get_and_link() {
        let state = test_state(TraversalStrategy::Iterative);
        let (status, Json(created)) = create_concept(
            State(state.clone()),
            Ok(Json(CreateConceptRequest {
                title: "Topology".into(),
                content: "open sets".into(),
                prerequisites: vec!["c".into()],
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.prerequisite_ids.contains("c"));

        let Json(fetched) = get_concept(State(state.clone()), Path(created.id.clone()))
            .await
            .unwrap();
        assert_eq!(fetched, created);

        let Json(link) = link_concepts(State(state.clone()), Ok(Json(Link::new("a", &created.id))))
            .await
            .unwrap();
        assert_eq!(link.from_id, "a");

        let Json(fetched) = get_concept(State(state), Path(created.id.clone()))
            .await
            .unwrap();
        assert_eq!(fetched.prerequisite_ids.len(), 2);
    }

    #[tokio::test]
    async fn create_with_empty_title_is_400() {
        let state = test_state(TraversalStrategy::Iterative);
        let err = create_concept(
            State(state),
            Ok(Json(CreateConceptRequest {
                title: String::new(),
                content: String::new(),
                prerequisites: Vec::new(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let state = test_state(TraversalStrategy::Iterative);
        let Json(updated) = update_concept(
            State(state.clone()),
            Path("a".into()),
            Ok(Json(UpdateConceptRequest {
                content: "counting".into(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated.content, "counting");

        let status = delete_concept(State(state.clone()), Path("a".into()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_concept(State(state), Path("a".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn all_and_search() {
        let state = test_state(TraversalStrategy::Iterative);
        let Json(all) = all_concepts(State(state.clone())).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Algebra", "Arithmetic", "Calculus"]);

        let Json(found) = search_concepts(
            State(state),
            Ok(Query(SearchQuery {
                query: "calc".into(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c");
    }

    #[tokio::test]
    async fn index_is_alive() {
        assert!(index().await.contains("conceptgraph"));
    }
}
