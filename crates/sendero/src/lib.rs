//! Sendero derives executable test sequences from hierarchical
//! state-machine models and administers them against live tag-addressable
//! control systems.
//!
//! The pipeline:
//!
//! ```text
//! Graph Model ──> Flattener ──> Path Solver ──> Case Generator ──> Administrator
//!  (model)        (flatten)      (solver)        (testcase)          (admin)
//! ```
//!
//! A model is a directed graph of named states whose attributes describe
//! tag reads and writes; superstates nest whole subgraphs. Flattening
//! collapses the hierarchy, the solver enumerates every simple start-to-end
//! path, and the generator turns each path into a [`TestCase`] whose
//! diagram carries forced steering directives at branch points. The
//! administrator then polls each case's states and transition guards over a
//! [`Connection`] until the case passes or fails.
//!
//! # Example
//!
//! ```
//! use sendero::{
//!     shared, DummyAttribute, Graph, LoopbackConnection, State, TestAdmin,
//!     TestCaseGenerator, Verdict,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> sendero::SenderoResult<()> {
//! let mut model = Graph::new("valve");
//! let closed = model.add_state(State::new("Closed"))?;
//! let open = model.add_state(State::new("Open"))?;
//! model.connect(closed, open, vec![shared(DummyAttribute::new("VALVE/OPEN"))]);
//!
//! let mut generator = TestCaseGenerator::new(model);
//! generator.generate()?;
//!
//! let admin = TestAdmin::new(Arc::new(LoopbackConnection::new()));
//! for case in generator.cases_mut() {
//!     assert_eq!(admin.run(case)?, Verdict::Passed);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod attribute;
pub mod connection;
pub mod export;
pub mod flatten;
pub mod model;
pub mod result;
pub mod solver;
pub mod testcase;

pub use admin::{AdminConfig, BranchPolicy, TestAdmin};
pub use attribute::{
    shared, Attribute, Completion, DummyAttribute, ExecuteMode, ReadHook, SharedAttribute,
    WriteHook,
};
pub use connection::{Connection, LoopbackConnection, ReadValue, Value};
pub use export::to_dot;
pub use flatten::{flatten, set_branch_flags};
pub use model::{Graph, State, StateId, Transition};
pub use result::{SenderoError, SenderoResult};
pub use solver::{cyclomatic_complexity, has_path, simple_paths, subgraph};
pub use testcase::{CaseReport, TestCase, TestCaseGenerator, Verdict};
