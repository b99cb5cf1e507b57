//! Stateless path algorithms over a graph reference.
//!
//! Simple-path enumeration, path-induced subgraph extraction and McCabe
//! cyclomatic complexity. All functions borrow the graph; nothing here
//! mutates the model.

use crate::model::{Graph, StateId};
use crate::result::SenderoResult;

/// True when a directed path exists from `start` to `end`
#[must_use]
pub fn has_path(graph: &Graph, start: StateId, end: StateId) -> bool {
    let mut seen = vec![false; graph.state_count()];
    let mut queue = std::collections::VecDeque::from([start]);
    seen[start.index()] = true;
    while let Some(id) = queue.pop_front() {
        if id == end {
            return true;
        }
        for next in graph.destinations(id) {
            if !seen[next.index()] {
                seen[next.index()] = true;
                queue.push_back(next);
            }
        }
    }
    false
}

/// Every simple path (no repeated state) from `start` to `end`.
///
/// DFS with a per-path visited set: the graph may still contain cycles
/// (retry loops survive flattening), and those must terminate enumeration
/// rather than hang it. `start == end` yields the single-node path.
#[must_use]
pub fn simple_paths(graph: &Graph, start: StateId, end: StateId) -> Vec<Vec<StateId>> {
    let mut paths = Vec::new();
    let mut current = Vec::new();
    walk(graph, start, end, &mut current, &mut paths);
    paths
}

fn walk(
    graph: &Graph,
    at: StateId,
    end: StateId,
    current: &mut Vec<StateId>,
    paths: &mut Vec<Vec<StateId>>,
) {
    current.push(at);
    if at == end {
        paths.push(current.clone());
    } else {
        for next in graph.destinations(at) {
            if !current.contains(&next) {
                walk(graph, next, end, current, paths);
            }
        }
    }
    current.pop();
}

/// Consecutive (source, dest) pairs of a topologically ordered path
#[must_use]
pub fn edges_in_path(path: &[StateId]) -> Vec<(StateId, StateId)> {
    path.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Induce a deep-copied subgraph containing exactly the path's states and
/// only the transitions consecutive in the path.
///
/// States and transitions are independent copies; their attribute lists
/// carry the original shared attribute handles, so guards are neither lost
/// nor duplicated.
pub fn subgraph(graph: &Graph, path: &[StateId]) -> SenderoResult<Graph> {
    let mut sub = Graph::new(graph.name());
    let mut remap = std::collections::HashMap::new();
    for &id in path {
        remap.insert(id, sub.add_state(graph.state(id).clone())?);
    }
    for (u, v) in edges_in_path(path) {
        for t in graph.transitions_between(u, v) {
            sub.push_transition(t.remapped(remap[&u], remap[&v]));
        }
    }
    Ok(sub)
}

/// McCabe (1976) cyclomatic complexity: `E − N + P` with `P` the number of
/// weakly connected components. Diagnostic/coverage metric only; never used
/// for control flow.
#[must_use]
pub fn cyclomatic_complexity(graph: &Graph) -> i64 {
    let edges = graph.transition_count() as i64;
    let nodes = graph.state_count() as i64;
    edges - nodes + weak_components(graph) as i64
}

/// Number of weakly connected components (edge direction ignored)
fn weak_components(graph: &Graph) -> usize {
    let n = graph.state_count();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for t in graph.transitions() {
        let a = find(&mut parent, t.source().index());
        let b = find(&mut parent, t.dest().index());
        if a != b {
            parent[a] = b;
        }
    }
    (0..n).filter(|&i| find(&mut parent, i) == i).count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::attribute::{shared, DummyAttribute};
    use crate::model::State;
    use std::sync::Arc;

    /// A -> B -> C plus a retry loop C -> B and a branch A -> C
    fn branchy() -> (Graph, StateId, StateId, StateId) {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![]);
        g.connect(b, c, vec![]);
        g.connect(c, b, vec![]);
        g.connect(a, c, vec![]);
        (g, a, b, c)
    }

    #[test]
    fn test_has_path() {
        let (g, a, _b, c) = branchy();
        assert!(has_path(&g, a, c));
        assert!(!has_path(&g, c, a));
        assert!(has_path(&g, a, a));
    }

    #[test]
    fn test_simple_paths_terminate_despite_cycle() {
        let (g, a, _b, c) = branchy();
        let mut paths = simple_paths(&g, a, c);
        paths.sort();
        assert_eq!(paths.len(), 2);
        // A-B-C and A-C; the C->B retry loop never repeats a node
        assert!(paths.iter().all(|p| p.first() == Some(&a)));
        assert!(paths.iter().all(|p| p.last() == Some(&c)));
    }

    #[test]
    fn test_simple_path_to_self_is_single_node() {
        let (g, a, _, _) = branchy();
        assert_eq!(simple_paths(&g, a, a), vec![vec![a]]);
    }

    #[test]
    fn test_edges_in_path() {
        let (_, a, b, c) = branchy();
        assert_eq!(edges_in_path(&[a, b, c]), vec![(a, b), (b, c)]);
        assert!(edges_in_path(&[a]).is_empty());
    }

    #[test]
    fn test_subgraph_has_path_shape() {
        let (g, a, b, c) = branchy();
        let sub = subgraph(&g, &[a, b, c]).unwrap();
        // N nodes, N-1 edges: the C->B loop and the A->C shortcut are gone
        assert_eq!(sub.state_count(), 3);
        assert_eq!(sub.transition_count(), 2);
        let sa = sub.state_id("A").unwrap();
        let sc = sub.state_id("C").unwrap();
        assert_eq!(sub.local_start_states(), vec![sa]);
        assert_eq!(sub.local_end_states(), vec![sc]);
    }

    #[test]
    fn test_subgraph_carries_guard_attributes() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let guard = shared(DummyAttribute::new("GUARD"));
        g.connect(a, b, vec![Arc::clone(&guard)]);

        let sub = subgraph(&g, &[a, b]).unwrap();
        let sa = sub.state_id("A").unwrap();
        let sb = sub.state_id("B").unwrap();
        let edge: Vec<_> = sub.transitions_between(sa, sb).collect();
        assert_eq!(edge.len(), 1);
        assert!(Arc::ptr_eq(&edge[0].attributes()[0], &guard));
    }

    #[test]
    fn test_complexity_of_chain_is_zero() {
        // A -> B -> C: E=2, N=3, P=1
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![]);
        g.connect(b, c, vec![]);
        assert_eq!(cyclomatic_complexity(&g), 0);
    }

    #[test]
    fn test_complexity_of_diamond_is_one() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        let d = g.add_state(State::new("D")).unwrap();
        g.connect(a, b, vec![]);
        g.connect(a, c, vec![]);
        g.connect(b, d, vec![]);
        g.connect(c, d, vec![]);
        assert_eq!(cyclomatic_complexity(&g), 1);
    }

    #[test]
    fn test_complexity_counts_isolated_components() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        g.add_state(State::new("LONER")).unwrap();
        g.connect(a, b, vec![]);
        // E=1, N=3, P=2
        assert_eq!(cyclomatic_complexity(&g), 0);
    }
}
