//! Hierarchical state/transition graph model.
//!
//! States and transitions live in per-graph arenas addressed by [`StateId`]
//! indices, so the recursive model (a state may own a nested subgraph of
//! substates) stays single-directional in ownership: a superstate owns its
//! subgraph, and scope checks recurse top-down instead of following parent
//! back-pointers.
//!
//! Attribute instances attached to states and transitions are shared by
//! reference ([`SharedAttribute`]); copying a graph copies structure, not
//! attributes, which is exactly the sharing contract test cases rely on.

use crate::attribute::SharedAttribute;
use crate::result::{SenderoError, SenderoResult};
use std::collections::HashMap;

/// Stable index of a state within its owning [`Graph`]'s arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Raw arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A system state: named, carrying continuously-evaluated attributes and an
/// optional nested subgraph of substates
#[derive(Debug, Clone)]
pub struct State {
    name: String,
    attrs: Vec<SharedAttribute>,
    subgraph: Option<Graph>,
}

impl State {
    /// Create a leaf state
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            subgraph: None,
        }
    }

    /// State name, unique within its owning graph
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an attribute evaluated while this state is current
    pub fn add_attribute(&mut self, attr: SharedAttribute) {
        self.attrs.push(attr);
    }

    /// Builder-style attribute append
    #[must_use]
    pub fn with_attribute(mut self, attr: SharedAttribute) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Ordered attribute list
    #[must_use]
    pub fn attributes(&self) -> &[SharedAttribute] {
        &self.attrs
    }

    /// Give this state a nested subgraph, making it a superstate
    #[must_use]
    pub fn with_subgraph(mut self, subgraph: Graph) -> Self {
        self.subgraph = Some(subgraph);
        self
    }

    /// Nested subgraph, if any
    #[must_use]
    pub fn subgraph(&self) -> Option<&Graph> {
        self.subgraph.as_ref()
    }

    /// True when this state owns a non-empty subgraph
    #[must_use]
    pub fn is_superstate(&self) -> bool {
        self.subgraph.as_ref().is_some_and(|g| !g.is_empty())
    }
}

/// A directed transition between two states of one graph.
///
/// Identity is the ordered (source, destination) pair plus the guard
/// attribute list; several transitions may exist between the same pair and
/// are kept as distinct entries, never merged into one edge label.
#[derive(Debug, Clone)]
pub struct Transition {
    source: StateId,
    dest: StateId,
    attrs: Vec<SharedAttribute>,
    is_branch: bool,
}

impl Transition {
    /// Create a transition with no guard attributes
    #[must_use]
    pub fn new(source: StateId, dest: StateId) -> Self {
        Self {
            source,
            dest,
            attrs: Vec::new(),
            is_branch: false,
        }
    }

    /// Builder-style guard attribute list
    #[must_use]
    pub fn with_attributes(mut self, attrs: Vec<SharedAttribute>) -> Self {
        self.attrs = attrs;
        self
    }

    /// Source state
    #[must_use]
    pub const fn source(&self) -> StateId {
        self.source
    }

    /// Destination state
    #[must_use]
    pub const fn dest(&self) -> StateId {
        self.dest
    }

    /// Guard/action attributes evaluated when this transition is polled
    #[must_use]
    pub fn attributes(&self) -> &[SharedAttribute] {
        &self.attrs
    }

    /// True iff the source state has more than one distinct destination.
    /// Derived; set by `flatten::set_branch_flags`.
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        self.is_branch
    }

    pub(crate) fn set_branch(&mut self, is_branch: bool) {
        self.is_branch = is_branch;
    }

    pub(crate) fn remapped(&self, source: StateId, dest: StateId) -> Self {
        Self {
            source,
            dest,
            attrs: self.attrs.clone(),
            is_branch: self.is_branch,
        }
    }
}

/// A directed graph of states and transitions.
///
/// The graph is the uniqueness authority for state names and owns a flat
/// transition list parallel to the adjacency structure.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    states: Vec<State>,
    by_name: HashMap<String, StateId>,
    transitions: Vec<Transition>,
}

impl Graph {
    /// Create an empty graph
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            by_name: HashMap::new(),
            transitions: Vec::new(),
        }
    }

    /// Graph name, used for log correlation and DOT export
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a state; its name must be unique within this graph
    pub fn add_state(&mut self, state: State) -> SenderoResult<StateId> {
        if self.by_name.contains_key(state.name()) {
            return Err(SenderoError::DuplicateState {
                name: state.name().to_string(),
            });
        }
        let id = StateId(self.states.len());
        self.by_name.insert(state.name().to_string(), id);
        self.states.push(state);
        Ok(id)
    }

    /// Add a transition between two existing states
    pub fn connect(&mut self, source: StateId, dest: StateId, attrs: Vec<SharedAttribute>) {
        self.transitions
            .push(Transition::new(source, dest).with_attributes(attrs));
    }

    pub(crate) fn push_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Look up a state id by name
    pub fn state_id(&self, name: &str) -> SenderoResult<StateId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SenderoError::UnknownState {
                name: name.to_string(),
            })
    }

    /// Look up a state id by name, `None` when absent
    #[must_use]
    pub fn try_state_id(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    /// State by id
    #[must_use]
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    /// Mutable state by id
    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0]
    }

    /// Number of states
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of transitions
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// True when the graph holds no states
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All state ids in arena order
    pub fn state_ids(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.states.len()).map(StateId)
    }

    /// All states in arena order
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    /// Flat transition list
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub(crate) fn transitions_mut(&mut self) -> &mut [Transition] {
        &mut self.transitions
    }

    /// Every transition whose (source, dest) matches the given pair
    pub fn transitions_between(
        &self,
        source: StateId,
        dest: StateId,
    ) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.source == source && t.dest == dest)
    }

    /// Distinct destination states reachable from `id`, in first-seen order
    #[must_use]
    pub fn destinations(&self, id: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        for t in &self.transitions {
            if t.source == id && !out.contains(&t.dest) {
                out.push(t.dest);
            }
        }
        out
    }

    /// Distinct source states with a transition into `id`, in first-seen order
    #[must_use]
    pub fn sources(&self, id: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        for t in &self.transitions {
            if t.dest == id && !out.contains(&t.source) {
                out.push(t.source);
            }
        }
        out
    }

    /// Local start states: no incoming transition within this graph
    #[must_use]
    pub fn local_start_states(&self) -> Vec<StateId> {
        self.state_ids()
            .filter(|&id| self.sources(id).is_empty())
            .collect()
    }

    /// Local end states: no outgoing transition within this graph
    #[must_use]
    pub fn local_end_states(&self) -> Vec<StateId> {
        self.state_ids()
            .filter(|&id| self.destinations(id).is_empty())
            .collect()
    }

    /// Names of global start states, at any nesting depth.
    ///
    /// A state is a global start iff it is a local start and its enclosing
    /// superstate, if any, is itself a global start: entry points must not
    /// be reachable from any enclosing superstate's predecessor.
    #[must_use]
    pub fn global_start_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for id in self.local_start_states() {
            let state = self.state(id);
            out.push(state.name().to_string());
            if let Some(sub) = state.subgraph() {
                if !sub.is_empty() {
                    out.extend(sub.global_start_names());
                }
            }
        }
        out
    }

    /// Names of global end states, symmetric to [`Graph::global_start_names`]
    #[must_use]
    pub fn global_end_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for id in self.local_end_states() {
            let state = self.state(id);
            out.push(state.name().to_string());
            if let Some(sub) = state.subgraph() {
                if !sub.is_empty() {
                    out.extend(sub.global_end_names());
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::attribute::{shared, DummyAttribute};
    use std::sync::Arc;

    fn chain() -> (Graph, StateId, StateId, StateId) {
        let mut g = Graph::new("chain");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![]);
        g.connect(b, c, vec![]);
        (g, a, b, c)
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let mut g = Graph::new("g");
        g.add_state(State::new("A")).unwrap();
        let err = g.add_state(State::new("A")).unwrap_err();
        assert!(matches!(
            err,
            SenderoError::DuplicateState { name } if name == "A"
        ));
    }

    #[test]
    fn test_unknown_state_lookup() {
        let g = Graph::new("g");
        assert!(g.state_id("missing").is_err());
        assert!(g.try_state_id("missing").is_none());
    }

    #[test]
    fn test_start_end_derivation() {
        let (g, a, b, c) = chain();
        assert_eq!(g.local_start_states(), vec![a]);
        assert_eq!(g.local_end_states(), vec![c]);
        assert_eq!(g.sources(b), vec![a]);
        assert_eq!(g.destinations(b), vec![c]);
    }

    #[test]
    fn test_parallel_edges_kept_but_destinations_dedup() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        g.connect(a, b, vec![shared(DummyAttribute::new("T1"))]);
        g.connect(a, b, vec![shared(DummyAttribute::new("T2"))]);
        assert_eq!(g.transition_count(), 2);
        assert_eq!(g.transitions_between(a, b).count(), 2);
        assert_eq!(g.destinations(a), vec![b]);
    }

    #[test]
    fn test_superstate_detection() {
        let mut sub = Graph::new("sub");
        sub.add_state(State::new("X")).unwrap();
        let sup = State::new("S").with_subgraph(sub);
        assert!(sup.is_superstate());

        let leaf_with_empty = State::new("L").with_subgraph(Graph::new("empty"));
        assert!(!leaf_with_empty.is_superstate());
        assert!(!State::new("L2").is_superstate());
    }

    #[test]
    fn test_global_starts_recurse_into_start_superstates() {
        // P -> S(X -> Y) -> Q : only P is a global start, only Q a global end
        let mut sub = Graph::new("sub");
        let x = sub.add_state(State::new("X")).unwrap();
        let y = sub.add_state(State::new("Y")).unwrap();
        sub.connect(x, y, vec![]);

        let mut outer = Graph::new("outer");
        let p = outer.add_state(State::new("P")).unwrap();
        let s = outer.add_state(State::new("S").with_subgraph(sub)).unwrap();
        let q = outer.add_state(State::new("Q")).unwrap();
        outer.connect(p, s, vec![]);
        outer.connect(s, q, vec![]);

        assert_eq!(outer.global_start_names(), vec!["P"]);
        assert_eq!(outer.global_end_names(), vec!["Q"]);

        // A start superstate exposes its own start substates globally
        let mut sub2 = Graph::new("sub2");
        let x2 = sub2.add_state(State::new("X2")).unwrap();
        let y2 = sub2.add_state(State::new("Y2")).unwrap();
        sub2.connect(x2, y2, vec![]);

        let mut outer2 = Graph::new("outer2");
        let s2 = outer2
            .add_state(State::new("S2").with_subgraph(sub2))
            .unwrap();
        let q2 = outer2.add_state(State::new("Q2")).unwrap();
        outer2.connect(s2, q2, vec![]);

        assert_eq!(outer2.global_start_names(), vec!["S2", "X2"]);
    }

    #[test]
    fn test_clone_shares_attributes() {
        let mut g = Graph::new("g");
        let attr = shared(DummyAttribute::new("UNIT1/PV"));
        g.add_state(State::new("A").with_attribute(Arc::clone(&attr)))
            .unwrap();
        let copy = g.clone();
        let a = copy.state_id("A").unwrap();
        assert!(Arc::ptr_eq(&attr, &copy.state(a).attributes()[0]));
    }
}
