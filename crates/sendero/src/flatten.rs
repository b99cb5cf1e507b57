//! Superstate flattening and branch-flag derivation.
//!
//! Flattening collapses every superstate into its substates by post-order
//! recursion, splicing the substates' local start/end states onto the
//! superstate's original edges. The rewired edges carry the original
//! transition's guard attributes, so each guard still executes exactly once
//! at the correct edge. The result is a single flat directed graph with the
//! same transition semantics as the nested original, ready for path
//! enumeration.

use crate::model::{Graph, State, StateId};
use crate::result::{SenderoError, SenderoResult};
use std::sync::Arc;
use tracing::debug;

/// Where a top-level state of the original graph landed in the flat graph
enum Rewired {
    /// Leaf state, copied one-to-one
    Leaf(StateId),
    /// Superstate, replaced by its flattened subgraph
    Super {
        /// Local start states of the flattened subgraph: inbound edges splice here
        starts: Vec<StateId>,
        /// Local end states of the flattened subgraph: outbound edges splice here
        ends: Vec<StateId>,
    },
}

/// Collapse all superstates into one flat graph.
///
/// A superstate whose subgraph has no local start or no local end cannot be
/// rewired without dangling edges; this is a model-authoring error and is
/// reported as [`SenderoError::MalformedSuperstate`].
pub fn flatten(graph: &Graph) -> SenderoResult<Graph> {
    let mut flat = Graph::new(graph.name());
    let mut rewired: Vec<Rewired> = Vec::with_capacity(graph.state_count());

    for id in graph.state_ids() {
        let state = graph.state(id);
        match state.subgraph() {
            Some(sub) if !sub.is_empty() => {
                let sub_flat = flatten(sub)?;
                if sub_flat.local_start_states().is_empty() {
                    return Err(SenderoError::MalformedSuperstate {
                        name: state.name().to_string(),
                        missing: "start",
                    });
                }
                if sub_flat.local_end_states().is_empty() {
                    return Err(SenderoError::MalformedSuperstate {
                        name: state.name().to_string(),
                        missing: "end",
                    });
                }
                debug!(
                    superstate = state.name(),
                    substates = sub_flat.state_count(),
                    "flattening superstate"
                );
                // Splice the flattened subgraph into the flat arena,
                // remapping its ids. Name collisions across levels surface
                // as DuplicateState.
                let mut remap = Vec::with_capacity(sub_flat.state_count());
                for sid in sub_flat.state_ids() {
                    remap.push(flat.add_state(leaf_copy(sub_flat.state(sid)))?);
                }
                for t in sub_flat.transitions() {
                    flat.push_transition(
                        t.remapped(remap[t.source().index()], remap[t.dest().index()]),
                    );
                }
                rewired.push(Rewired::Super {
                    starts: sub_flat
                        .local_start_states()
                        .iter()
                        .map(|s| remap[s.index()])
                        .collect(),
                    ends: sub_flat
                        .local_end_states()
                        .iter()
                        .map(|s| remap[s.index()])
                        .collect(),
                });
            }
            _ => {
                let new_id = flat.add_state(leaf_copy(state))?;
                rewired.push(Rewired::Leaf(new_id));
            }
        }
    }

    // Rewire the original top-level transitions. An edge into a superstate
    // now points at every local start of its subgraph; an edge out of a
    // superstate now originates from every local end.
    for t in graph.transitions() {
        let sources: &[StateId] = match &rewired[t.source().index()] {
            Rewired::Leaf(id) => std::slice::from_ref(id),
            Rewired::Super { ends, .. } => ends,
        };
        let dests: &[StateId] = match &rewired[t.dest().index()] {
            Rewired::Leaf(id) => std::slice::from_ref(id),
            Rewired::Super { starts, .. } => starts,
        };
        for &s in sources {
            for &d in dests {
                flat.push_transition(t.remapped(s, d));
            }
        }
    }

    Ok(flat)
}

/// Copy a state without its subgraph, sharing its attributes by reference
fn leaf_copy(state: &State) -> State {
    let mut leaf = State::new(state.name());
    for attr in state.attributes() {
        leaf.add_attribute(Arc::clone(attr));
    }
    leaf
}

/// Derive `is_branch` on every transition in one pass: true iff the source
/// state has more than one distinct outgoing destination
pub fn set_branch_flags(graph: &mut Graph) {
    let fanout: Vec<usize> = graph
        .state_ids()
        .map(|id| graph.destinations(id).len())
        .collect();
    for t in graph.transitions_mut() {
        t.set_branch(fanout[t.source().index()] > 1);
    }
}
