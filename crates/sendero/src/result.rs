//! Result and error types for Sendero.

use thiserror::Error;

/// Result type for Sendero operations
pub type SenderoResult<T> = Result<T, SenderoError>;

/// Errors that can occur in Sendero
#[derive(Debug, Error)]
pub enum SenderoError {
    /// A state name was inserted twice into one graph
    #[error("duplicate state name: {name}")]
    DuplicateState {
        /// Offending state name
        name: String,
    },

    /// A state name was not found in the graph
    #[error("state not found in graph: {name}")]
    UnknownState {
        /// Requested state name
        name: String,
    },

    /// A superstate cannot be flattened because its subgraph has no local
    /// start or no local end state, which would leave rewired edges dangling
    #[error("superstate {name} has no local {missing} state")]
    MalformedSuperstate {
        /// Superstate name
        name: String,
        /// Which anchor is missing: "start" or "end"
        missing: &'static str,
    },

    /// A test case path must have exactly one start state
    #[error("path requires exactly one start state, found {found}")]
    NotExactlyOneStart {
        /// Number of start states found
        found: usize,
    },

    /// A test case path must have exactly one end state
    #[error("path requires exactly one end state, found {found}")]
    NotExactlyOneEnd {
        /// Number of end states found
        found: usize,
    },

    /// An attribute's execute/force raised unexpectedly
    #[error("attribute {tag} failed: {message}")]
    AttributeExecution {
        /// Attribute tag
        tag: String,
        /// Error message
        message: String,
    },

    /// A live read/write against the connection failed
    #[error("connection error on {path}: {message}")]
    Connection {
        /// Tag path that failed
        path: String,
        /// Error message
        message: String,
    },

    /// State or transition polling exceeded the global timeout
    #[error("polling timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        /// Elapsed milliseconds when the deadline was declared missed
        elapsed_ms: u64,
        /// Configured limit in milliseconds
        limit_ms: u64,
    },

    /// A non-end state has no outgoing transition
    #[error("no outgoing transition from non-end state {state}")]
    MissingTransition {
        /// Stalled state name
        state: String,
    },

    /// More than one branch candidate completed in the same poll tick
    #[error("ambiguous branch from {state}: {candidates} candidates completed simultaneously")]
    AmbiguousBranch {
        /// Branching state name
        state: String,
        /// Number of simultaneously complete candidates
        candidates: usize,
    },

    /// A test worker thread panicked
    #[error("test worker panicked: {message}")]
    Worker {
        /// Panic payload rendered as text
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
