//! Test case synthesis: one linear path through the flattened model,
//! expressed as a private subgraph with forcing directives injected at
//! branch points.
//!
//! A generated path is only a design artifact until the live system is
//! steered down it: branch outcomes depend on live values the test cannot
//! otherwise control. `add_path_directives` closes that gap by cloning each
//! branch guard's attributes, switching the clones to force mode and
//! anchoring them at the most downstream state still before the branch (or
//! earlier, when an upstream state already writes the same tag).

use crate::attribute::{lock_attr, Attribute, ExecuteMode};
use crate::flatten::{flatten, set_branch_flags};
use crate::model::{Graph, StateId};
use crate::result::{SenderoError, SenderoResult};
use crate::solver::{cyclomatic_complexity, has_path, simple_paths, subgraph};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Pass/pending/fail tri-state of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Not yet administered
    Pending,
    /// Administered to completion
    Passed,
    /// Timed out or otherwise failed during administration
    Failed,
}

impl Verdict {
    /// Short lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serializable summary of one test case's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    /// Baseline numeric identifier
    pub case_no: u32,
    /// Case name, `<start>-<end>_<n>`
    pub name: String,
    /// Current verdict
    pub verdict: Verdict,
    /// Generation timestamp
    pub created: DateTime<Utc>,
    /// Most recent activity timestamp
    pub updated: DateTime<Utc>,
}

impl CaseReport {
    /// Render as JSON
    pub fn to_json(&self) -> SenderoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A single linear path through the state model, verifiable as pass/fail.
///
/// The path diagram is a private deep copy: its states and transitions are
/// independent objects, but their attributes are shared by reference with
/// the live model, except attributes injected purely for forcing, which
/// are private clones owned only by this case. After generation only the
/// verdict and timestamps mutate, and only under the test administrator.
#[derive(Debug)]
pub struct TestCase {
    case_no: u32,
    name: String,
    diagram: Graph,
    verdict: Verdict,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl TestCase {
    /// Create a pending case over a private path diagram
    #[must_use]
    pub fn new(case_no: u32, name: impl Into<String>, diagram: Graph) -> Self {
        let now = Utc::now();
        Self {
            case_no,
            name: name.into(),
            diagram,
            verdict: Verdict::Pending,
            created: now,
            updated: now,
        }
    }

    /// Baseline numeric identifier
    #[must_use]
    pub const fn case_no(&self) -> u32 {
        self.case_no
    }

    /// Case name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The private path diagram
    #[must_use]
    pub fn diagram(&self) -> &Graph {
        &self.diagram
    }

    /// Current verdict
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// True until a pass or fail is recorded
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.verdict, Verdict::Pending)
    }

    /// `Some(true)` when passed, `Some(false)` when failed, `None` pending
    #[must_use]
    pub const fn has_passed(&self) -> Option<bool> {
        match self.verdict {
            Verdict::Pending => None,
            Verdict::Passed => Some(true),
            Verdict::Failed => Some(false),
        }
    }

    /// Record a pass, stamping the activity time
    pub fn set_passed(&mut self) {
        self.verdict = Verdict::Passed;
        self.updated = Utc::now();
    }

    /// Record a failure, stamping the activity time
    pub fn set_failed(&mut self) {
        self.verdict = Verdict::Failed;
        self.updated = Utc::now();
    }

    /// Outcome summary
    #[must_use]
    pub fn report(&self) -> CaseReport {
        CaseReport {
            case_no: self.case_no,
            name: self.name.clone(),
            verdict: self.verdict,
            created: self.created,
            updated: self.updated,
        }
    }

    /// The path states in forward order, start to end
    pub fn path_order(&self) -> SenderoResult<Vec<StateId>> {
        path_order(&self.diagram)
    }

    /// Inject forcing directives so the live system actually takes this path.
    ///
    /// Walks the path in reverse topological order keeping a working map of
    /// attributes that must be guaranteed before their consuming branch:
    ///
    /// 1. at each state, entries whose tag an earlier state already writes
    ///    are reanchored onto that earlier writer (matched by tag, not
    ///    instance, so nothing is forced twice);
    /// 2. when the transition immediately downstream is a branch, its guard
    ///    attributes are cloned into the map, anchored at the current state;
    /// 3. at the end every surviving clone is switched to force mode and
    ///    appended to its anchor state's private attribute list.
    ///
    /// Shared attributes are never mutated or removed; only private clones
    /// are added. Returns the number of forced attributes injected.
    pub fn add_path_directives(&mut self) -> SenderoResult<usize> {
        let order = path_order(&self.diagram)?;
        let mut force_at: Vec<(StateId, Vec<Box<dyn Attribute>>)> = Vec::new();

        for (pos, &sid) in order.iter().enumerate().rev() {
            // Reanchor forced values onto the earliest state that already
            // writes them on the way down the path.
            let state_attrs = self.diagram.state(sid).attributes();
            for entry in &mut force_at {
                if entry.0 == sid {
                    continue;
                }
                let writes_here = entry.1.iter().any(|forced| {
                    state_attrs
                        .iter()
                        .any(|a| lock_attr(a).tag() == forced.tag())
                });
                if writes_here {
                    debug!(
                        case = %self.name,
                        state = self.diagram.state(sid).name(),
                        "reanchoring forced attributes onto earlier writer"
                    );
                    entry.0 = sid;
                }
            }

            // A branch immediately downstream needs its guards guaranteed
            // no later than here.
            if let Some(&next) = order.get(pos + 1) {
                let mut clones: Vec<Box<dyn Attribute>> = Vec::new();
                for t in self.diagram.transitions_between(sid, next) {
                    if t.is_branch() {
                        for attr in t.attributes() {
                            clones.push(lock_attr(attr).boxed_clone());
                        }
                    }
                }
                if !clones.is_empty() {
                    force_at.push((sid, clones));
                }
            }
        }

        let mut added = 0;
        for (anchor, attrs) in force_at {
            for mut attr in attrs {
                attr.set_mode(ExecuteMode::Force);
                debug!(
                    case = %self.name,
                    state = self.diagram.state(anchor).name(),
                    tag = attr.tag(),
                    "injecting forcing directive"
                );
                self.diagram
                    .state_mut(anchor)
                    .add_attribute(Arc::new(Mutex::new(attr)));
                added += 1;
            }
        }
        Ok(added)
    }
}

/// Forward topological order of a linear path graph
fn path_order(graph: &Graph) -> SenderoResult<Vec<StateId>> {
    let starts = graph.local_start_states();
    if starts.len() != 1 {
        return Err(SenderoError::NotExactlyOneStart {
            found: starts.len(),
        });
    }
    let mut order = vec![starts[0]];
    let mut current = starts[0];
    while let Some(&next) = graph.destinations(current).first() {
        if order.contains(&next) {
            // a path diagram is acyclic by construction; stop defensively
            break;
        }
        order.push(next);
        current = next;
    }
    Ok(order)
}

/// Generates the full series of [`TestCase`]s for a state diagram: flatten,
/// flag branches, then one case per simple path between every global
/// start/end pair.
#[derive(Debug)]
pub struct TestCaseGenerator {
    diagram: Graph,
    cases: Vec<TestCase>,
}

impl TestCaseGenerator {
    /// Create a generator over a fully built (possibly nested) diagram
    #[must_use]
    pub fn new(diagram: Graph) -> Self {
        Self {
            diagram,
            cases: Vec::new(),
        }
    }

    /// The source diagram
    #[must_use]
    pub fn diagram(&self) -> &Graph {
        &self.diagram
    }

    /// Generate test cases for all linear paths through the diagram
    pub fn generate(&mut self) -> SenderoResult<&[TestCase]> {
        let mut flat = flatten(&self.diagram)?;
        set_branch_flags(&mut flat);

        let mut case_no = self.cases.len() as u32 + 1;
        // On a flat graph the global and local start/end scopes coincide.
        for &start in &flat.local_start_states() {
            for &end in &flat.local_end_states() {
                if !has_path(&flat, start, end) {
                    continue;
                }
                for path in simple_paths(&flat, start, end) {
                    let name = format!(
                        "{}-{}_{}",
                        flat.state(start).name(),
                        flat.state(end).name(),
                        case_no
                    );
                    debug!(case = %name, states = path.len(), "adding test case");
                    let mut case = TestCase::new(case_no, name, subgraph(&flat, &path)?);
                    case.add_path_directives()?;
                    self.cases.push(case);
                    case_no += 1;
                }
            }
        }
        Ok(&self.cases)
    }

    /// Cyclomatic complexity of the flattened diagram
    pub fn complexity(&self) -> SenderoResult<i64> {
        Ok(cyclomatic_complexity(&flatten(&self.diagram)?))
    }

    /// Generated cases
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Generated cases, mutable for administration
    pub fn cases_mut(&mut self) -> &mut [TestCase] {
        &mut self.cases
    }

    /// Consume the generator, keeping the cases
    #[must_use]
    pub fn into_cases(self) -> Vec<TestCase> {
        self.cases
    }

    /// Names of cases not yet administered
    #[must_use]
    pub fn pending_cases(&self) -> Vec<&str> {
        self.filtered(Verdict::Pending)
    }

    /// Names of passed cases
    #[must_use]
    pub fn passed_cases(&self) -> Vec<&str> {
        self.filtered(Verdict::Passed)
    }

    /// Names of failed cases
    #[must_use]
    pub fn failed_cases(&self) -> Vec<&str> {
        self.filtered(Verdict::Failed)
    }

    /// Outcome summaries for every generated case
    #[must_use]
    pub fn reports(&self) -> Vec<CaseReport> {
        self.cases.iter().map(TestCase::report).collect()
    }

    fn filtered(&self, verdict: Verdict) -> Vec<&str> {
        self.cases
            .iter()
            .filter(|c| c.verdict() == verdict)
            .map(TestCase::name)
            .collect()
    }
}
