//! Graphviz DOT rendering of a diagram.
//!
//! Diagnostic output only: paste into `dot -Tsvg` to inspect what the
//! flattener and path solver produced. Start states render as double
//! circles, end states as double octagons, branch edges dashed.

use crate::model::Graph;
use std::fmt::Write;

/// Render a graph as a Graphviz `digraph`.
///
/// Node labels are state names; edge labels list the guard attribute tags
/// of each transition.
#[must_use]
pub fn to_dot(graph: &Graph) -> String {
    let starts = graph.local_start_states();
    let ends = graph.local_end_states();
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(graph.name()));
    let _ = writeln!(out, "    rankdir=LR;");

    for id in graph.state_ids() {
        let state = graph.state(id);
        let shape = if starts.contains(&id) {
            "doublecircle"
        } else if ends.contains(&id) {
            "doubleoctagon"
        } else {
            "box"
        };
        let _ = writeln!(
            out,
            "    \"{}\" [shape={shape}];",
            escape(state.name())
        );
    }

    for t in graph.transitions() {
        let tags: Vec<String> = t
            .attributes()
            .iter()
            .map(|a| crate::attribute::lock_attr(a).tag().to_string())
            .collect();
        let style = if t.is_branch() { ", style=dashed" } else { "" };
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\" [label=\"{}\"{style}];",
            escape(graph.state(t.source()).name()),
            escape(graph.state(t.dest()).name()),
            escape(&tags.join(", ")),
        );
    }

    out.push_str("}\n");
    out
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
