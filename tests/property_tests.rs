//! Property-based tests for neighborhood traversal using proptest.
//!
//! Random small graphs (cycles allowed) are loaded into both store backends
//! and every traversal result is checked against a reference breadth-first
//! search computed directly from the edge list.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use conceptgraph::graph::{Neighborhood, NeighborhoodEngine, TraversalStrategy};
use conceptgraph::store::{
    AccessMode, Deadline, GraphStore, MemoryStore, Params, Query, SqliteStore, Statement,
};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Graph {
    nodes: usize,
    edges: BTreeSet<(usize, usize)>,
}

fn id(n: usize) -> String {
    format!("c{n}")
}

/// Up to 9 concepts with arbitrary directed edges between distinct nodes.
fn arb_graph() -> impl Strategy<Value = Graph> {
    (1usize..10).prop_flat_map(|nodes| {
        prop::collection::vec((0..nodes, 0..nodes), 0..nodes * 2)
            .prop_map(move |pairs| Graph {
                nodes,
                edges: pairs.into_iter().filter(|(a, b)| a != b).collect(),
            })
    })
}

fn arb_case() -> impl Strategy<Value = (Graph, usize, i64)> {
    arb_graph().prop_flat_map(|g| {
        let n = g.nodes;
        (Just(g), 0..n, 0i64..6)
    })
}

// ---------------------------------------------------------------------------
// Store seeding
// ---------------------------------------------------------------------------

fn seed(store: &dyn GraphStore, graph: &Graph) {
    let mut queries = Vec::new();
    for n in 0..graph.nodes {
        queries.push(Query::new(
            Statement::CreateConcept,
            Params::new()
                .with("uuid", id(n))
                .with("title", format!("Concept {n}"))
                .with("content", ""),
        ));
    }
    for (a, b) in &graph.edges {
        queries.push(Query::new(
            Statement::MergePrerequisite,
            Params::new().with("from", id(*a)).with("to", id(*b)),
        ));
    }
    let mut session = store.session(AccessMode::Write).unwrap();
    session.query_write(&queries, Deadline::none()).unwrap();
}

fn sqlite(graph: &Graph) -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, graph);
    Arc::new(store)
}

fn memory(graph: &Graph) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    seed(&store, graph);
    Arc::new(store)
}

// ---------------------------------------------------------------------------
// Reference model
// ---------------------------------------------------------------------------

/// Nodes within `depth` hops of `root` following edges in one direction.
fn reachable(graph: &Graph, root: usize, depth: i64, forward: bool) -> BTreeSet<usize> {
    let mut dist: HashMap<usize, i64> = HashMap::from([(root, 0)]);
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        let d = dist[&current];
        if d == depth {
            continue;
        }
        for (a, b) in &graph.edges {
            let (near, far) = if forward { (*a, *b) } else { (*b, *a) };
            if near == current && !dist.contains_key(&far) {
                dist.insert(far, d + 1);
                queue.push_back(far);
            }
        }
    }
    dist.into_keys().collect()
}

fn expected(graph: &Graph, root: usize, depth: i64) -> (BTreeSet<String>, BTreeSet<(String, String)>) {
    let mut nodes = reachable(graph, root, depth, true);
    nodes.extend(reachable(graph, root, depth, false));
    let edges = graph
        .edges
        .iter()
        .filter(|(a, b)| nodes.contains(a) && nodes.contains(b))
        .map(|(a, b)| (id(*a), id(*b)))
        .collect();
    (nodes.into_iter().map(id).collect(), edges)
}

fn observed(hood: &Neighborhood) -> (BTreeSet<String>, BTreeSet<(String, String)>) {
    (
        hood.nodes.iter().map(|c| c.id.clone()).collect(),
        hood.edges
            .iter()
            .map(|l| (l.from_id.clone(), l.to_id.clone()))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn iterative_matches_reference((graph, root, depth) in arb_case()) {
        let hood = NeighborhoodEngine::new(sqlite(&graph))
            .neighborhood(&id(root), depth)
            .unwrap();
        prop_assert_eq!(observed(&hood), expected(&graph, root, depth));
    }

    #[test]
    fn bulk_matches_reference((graph, root, depth) in arb_case()) {
        let hood = NeighborhoodEngine::new(sqlite(&graph))
            .with_strategy(TraversalStrategy::Bulk)
            .neighborhood(&id(root), depth)
            .unwrap();
        prop_assert_eq!(observed(&hood), expected(&graph, root, depth));
    }

    #[test]
    fn backends_agree((graph, root, depth) in arb_case()) {
        for strategy in [TraversalStrategy::Iterative, TraversalStrategy::Bulk] {
            let from_sqlite = NeighborhoodEngine::new(sqlite(&graph))
                .with_strategy(strategy)
                .neighborhood(&id(root), depth)
                .unwrap();
            let from_memory = NeighborhoodEngine::new(memory(&graph))
                .with_strategy(strategy)
                .neighborhood(&id(root), depth)
                .unwrap();
            prop_assert_eq!(observed(&from_sqlite), observed(&from_memory));
        }
    }

    #[test]
    fn nodes_unique_and_root_first((graph, root, depth) in arb_case()) {
        let hood = NeighborhoodEngine::new(memory(&graph))
            .neighborhood(&id(root), depth)
            .unwrap();
        let unique: BTreeSet<&str> = hood.nodes.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(unique.len(), hood.nodes.len());
        prop_assert_eq!(hood.nodes[0].id.clone(), id(root));
        let edges: BTreeSet<_> = hood.edges.iter().collect();
        prop_assert_eq!(edges.len(), hood.edges.len());
    }

    #[test]
    fn prerequisites_are_direct_predecessors((graph, root, depth) in arb_case()) {
        let hood = NeighborhoodEngine::new(sqlite(&graph))
            .neighborhood(&id(root), depth)
            .unwrap();
        for concept in &hood.nodes {
            let want: BTreeSet<String> = graph
                .edges
                .iter()
                .filter(|(_, b)| id(*b) == concept.id)
                .map(|(a, _)| id(*a))
                .collect();
            prop_assert_eq!(&concept.prerequisite_ids, &want);
        }
    }

    #[test]
    fn depth_zero_is_root_only((graph, root, _depth) in arb_case()) {
        let hood = NeighborhoodEngine::new(sqlite(&graph))
            .neighborhood(&id(root), 0)
            .unwrap();
        prop_assert_eq!(hood.nodes.len(), 1);
        prop_assert!(hood.edges.is_empty());
    }

    #[test]
    fn repeated_calls_are_idempotent((graph, root, depth) in arb_case()) {
        let engine = NeighborhoodEngine::new(sqlite(&graph))
            .with_strategy(TraversalStrategy::Bulk);
        let first = engine.neighborhood(&id(root), depth).unwrap();
        let second = engine.neighborhood(&id(root), depth).unwrap();
        prop_assert_eq!(first, second);
    }
}
