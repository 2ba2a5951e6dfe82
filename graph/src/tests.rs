// Licensed under the Apache License, Version 2.0 (see LICENSE).

use super::*;

type TestGraph = Graph<String, u32, u32, String>;

fn linear_chain() -> TestGraph {
    // a depends on b, b depends on c.
    let g = TestGraph::new();
    g.add_child(&"a".to_owned(), &"b".to_owned()).unwrap();
    g.add_child(&"b".to_owned(), &"c".to_owned()).unwrap();
    g
}

#[test]
fn add_child_creates_missing_endpoints_as_uninitialized() {
    let g = TestGraph::new();
    g.add_child(&"a".to_owned(), &"b".to_owned()).unwrap();
    assert!(g.contains(&"a".to_owned()));
    assert!(g.contains(&"b".to_owned()));
    assert!(g.node(&"b".to_owned()).unwrap().is_uninitialized());
}

#[test]
fn add_child_rejects_cycles() {
    let _ = env_logger::try_init();
    let g = linear_chain();
    let err = g.add_child(&"c".to_owned(), &"a".to_owned()).unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
}

#[test]
fn add_child_rejects_self_loop() {
    let g = TestGraph::new();
    let err = g.add_child(&"a".to_owned(), &"a".to_owned()).unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
}

#[test]
fn reverse_topological_sort_builds_dependencies_first() {
    let g = linear_chain();
    let order = g.reverse_topological_sort();
    assert_eq!(order, vec!["c".to_owned(), "b".to_owned(), "a".to_owned()]);
}

#[test]
fn topological_sort_closes_dependents_first() {
    let g = linear_chain();
    let order = g.topological_sort();
    assert_eq!(order, vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
}

#[test]
fn topological_sort_breaks_ties_alphabetically() {
    let g = TestGraph::new();
    // x and y both depend on nothing and on each other's sibling z; ensure ties go alphabetical.
    g.add_child(&"z".to_owned(), &"m".to_owned()).unwrap();
    g.add_node("a".to_owned()).unwrap();
    let order = g.topological_sort();
    // "a" and "z" both have in-degree 0 (before "m" is unblocked); alphabetical picks "a" first.
    assert_eq!(order[0], "a".to_owned());
}

#[test]
fn mark_for_removal_propagates_to_dependents() {
    let g = linear_chain();
    // Removing c should also sweep b and a, since they transitively depend on it.
    let subgraph = g.sub_graph_from(&"c".to_owned());
    assert_eq!(
        subgraph.into_iter().collect::<std::collections::BTreeSet<_>>(),
        vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
            .into_iter()
            .collect()
    );
}

#[test]
fn remove_marked_closes_leaves_first() {
    let g = linear_chain();
    for name in ["a", "b", "c"] {
        g.with_entry_mut(&name.to_owned(), |e| e.swap_resource(1));
    }
    g.mark_for_removal(&["a".to_owned(), "b".to_owned(), "c".to_owned()]);
    let removed = g.remove_marked();
    let order: Vec<_> = removed.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(order, vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
    assert!(removed.iter().all(|(_, h)| h.is_some()));
    assert_eq!(g.len(), 0);
}

#[test]
fn resource_unavailable_after_failure_but_unsafe_resource_still_returns_it() {
    let g = TestGraph::new();
    g.with_entry_mut(&"a".to_owned(), |e| {
        e.swap_resource(42);
        e.record_error("boom".to_owned());
    });
    let entry = g.node(&"a".to_owned()).unwrap();
    assert_eq!(entry.resource(), None);
    assert_eq!(entry.unsafe_resource(), Some(&42));
    assert_eq!(entry.last_error(), Some(&"boom".to_owned()));
}

#[test]
fn set_needs_update_only_applies_to_initialized_nodes() {
    let g = TestGraph::new();
    g.add_node("a".to_owned()).unwrap();
    g.with_entry_mut(&"a".to_owned(), |e| e.set_needs_update());
    assert!(!g.node(&"a".to_owned()).unwrap().needs_update());

    g.with_entry_mut(&"a".to_owned(), |e| e.set_new_config(1, vec![]));
    g.with_entry_mut(&"a".to_owned(), |e| e.swap_resource(1));
    g.with_entry_mut(&"a".to_owned(), |e| e.set_needs_update());
    assert!(g.node(&"a".to_owned()).unwrap().needs_update());
}

#[test]
fn resolve_dependencies_links_edges_and_skips_unknown() {
    let _ = env_logger::try_init();
    let g = TestGraph::new();
    g.with_entry_mut(&"a".to_owned(), |e| {
        e.set_new_config(1, vec!["b".to_owned(), "missing".to_owned()])
    });
    g.add_node("b".to_owned()).unwrap();

    g.resolve_dependencies(|dep| if dep == "b" { Some("b".to_owned()) } else { None });

    assert_eq!(g.direct_parents_of(&"a".to_owned()), vec!["b".to_owned()]);
}

#[test]
fn duplicate_add_node_is_an_error() {
    let g = TestGraph::new();
    g.add_node("a".to_owned()).unwrap();
    assert!(matches!(
        g.add_node("a".to_owned()),
        Err(GraphError::DuplicateNode(_))
    ));
}

#[test]
fn clone_structure_is_independent_of_original() {
    let g = linear_chain();
    let snapshot = g.clone_structure();
    g.mark_for_removal(&["a".to_owned()]);
    g.remove_marked();
    assert!(!g.contains(&"a".to_owned()));
    assert!(snapshot.contains(&"a".to_owned()));
}
