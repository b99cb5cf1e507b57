//! Polling test administrator.
//!
//! Drives one [`TestCase`] to pass/fail against a live connection:
//! bind read/write hooks onto the current state's attributes, poll
//! `execute()` until every attribute completes, then poll the outgoing
//! transition guards to advance. Polling is cooperative busy-wait against a
//! deadline; there is no cancellation primitive beyond the global timeout.
//!
//! Many administrators may run concurrently over one shared connection.
//! Ordering guarantees hold only within a single case's sequential
//! recur/transit calls; overlapping tag access across concurrent cases is
//! deliberately not serialized (see `run_all`).

use crate::attribute::{lock_attr, ReadHook, SharedAttribute, WriteHook};
use crate::connection::Connection;
use crate::model::{Graph, StateId};
use crate::result::{SenderoError, SenderoResult};
use crate::testcase::{TestCase, Verdict};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default re-check period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default maximum wait before a state or transition evaluation fails
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(600);

/// Tie-break policy when more than one branch candidate completes in the
/// same poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchPolicy {
    /// Take the first complete candidate in transition list order
    #[default]
    FirstMatch,
    /// Fail the case when candidates complete simultaneously
    ErrorOnAmbiguity,
}

/// Administrator configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Fixed re-check period between poll ticks
    pub poll_interval: Duration,
    /// Maximum wait per state/transition evaluation
    pub global_timeout: Duration,
    /// Identifier correlating log events of one administration run
    pub run_id: Uuid,
    /// Simultaneous-completion tie-break
    pub branch_policy: BranchPolicy,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
            run_id: Uuid::new_v4(),
            branch_policy: BranchPolicy::default(),
        }
    }
}

impl AdminConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the global timeout
    #[must_use]
    pub const fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    /// Set the branch tie-break policy
    #[must_use]
    pub const fn with_branch_policy(mut self, policy: BranchPolicy) -> Self {
        self.branch_policy = policy;
        self
    }

    /// Set the run correlation id
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }
}

/// Polling state-machine executor for test cases
pub struct TestAdmin {
    connection: Arc<dyn Connection>,
    config: AdminConfig,
}

impl std::fmt::Debug for TestAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestAdmin")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TestAdmin {
    /// Create an administrator with default configuration
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_config(connection, AdminConfig::default())
    }

    /// Create an administrator with explicit configuration
    #[must_use]
    pub fn with_config(connection: Arc<dyn Connection>, config: AdminConfig) -> Self {
        Self { connection, config }
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// Bind the live read/write functions onto a set of attributes
    fn bind_hooks(&self, attrs: &[SharedAttribute]) {
        let conn = Arc::clone(&self.connection);
        let read: ReadHook = Arc::new(move |path| conn.read(path));
        let conn = Arc::clone(&self.connection);
        let write: WriteHook = Arc::new(move |path, value| conn.write(path, value));
        for attr in attrs {
            let mut guard = lock_attr(attr);
            guard.set_read_hook(Arc::clone(&read));
            guard.set_write_hook(Arc::clone(&write));
        }
    }

    /// One poll tick: execute every not-yet-complete attribute and return
    /// the complete count. Attribute errors are isolated partial failures:
    /// logged, treated as incomplete, retried next tick.
    fn tick(&self, attrs: &[SharedAttribute]) -> usize {
        let mut complete = 0;
        for attr in attrs {
            let mut guard = lock_attr(attr);
            if !guard.completion().is_complete() {
                if let Err(e) = guard.execute() {
                    warn!(
                        run_id = %self.config.run_id,
                        tag = guard.tag(),
                        error = %e,
                        "attribute execution failed; retrying next poll"
                    );
                }
            }
            if guard.completion().is_complete() {
                complete += 1;
            }
        }
        complete
    }

    fn timeout_error(&self, start: Instant) -> SenderoError {
        SenderoError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
            limit_ms: self.config.global_timeout.as_millis() as u64,
        }
    }

    /// Evaluate a state: poll all of its attributes to completion.
    ///
    /// A state with no attributes completes immediately. Fails with
    /// [`SenderoError::Timeout`] when the global timeout elapses first.
    pub fn recur(&self, diagram: &Graph, state: StateId) -> SenderoResult<()> {
        let st = diagram.state(state);
        debug!(run_id = %self.config.run_id, state = st.name(), "evaluating state");
        self.bind_hooks(st.attributes());

        let start = Instant::now();
        loop {
            if self.tick(st.attributes()) == st.attributes().len() {
                debug!(run_id = %self.config.run_id, state = st.name(), "state complete");
                return Ok(());
            }
            if start.elapsed() >= self.config.global_timeout {
                return Err(self.timeout_error(start));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Advance from `source` by polling the transition guards toward each
    /// candidate destination.
    ///
    /// Candidates are evaluated in transition list order each tick; a
    /// transition with zero attributes auto-passes. The first complete
    /// candidate wins under [`BranchPolicy::FirstMatch`]; simultaneous
    /// completions fail under [`BranchPolicy::ErrorOnAmbiguity`].
    pub fn transit(
        &self,
        diagram: &Graph,
        source: StateId,
        candidates: &[StateId],
    ) -> SenderoResult<StateId> {
        let guards: Vec<(StateId, Vec<SharedAttribute>)> = candidates
            .iter()
            .map(|&dest| {
                let attrs: Vec<SharedAttribute> = diagram
                    .transitions_between(source, dest)
                    .flat_map(|t| t.attributes().iter().cloned())
                    .collect();
                (dest, attrs)
            })
            .collect();
        for (_, attrs) in &guards {
            self.bind_hooks(attrs);
        }

        let start = Instant::now();
        loop {
            let mut complete: Vec<StateId> = Vec::new();
            for (dest, attrs) in &guards {
                if self.tick(attrs) == attrs.len() {
                    complete.push(*dest);
                }
            }
            if let Some(&winner) = complete.first() {
                if complete.len() > 1 && self.config.branch_policy == BranchPolicy::ErrorOnAmbiguity
                {
                    return Err(SenderoError::AmbiguousBranch {
                        state: diagram.state(source).name().to_string(),
                        candidates: complete.len(),
                    });
                }
                debug!(
                    run_id = %self.config.run_id,
                    from = diagram.state(source).name(),
                    to = diagram.state(winner).name(),
                    "transition complete"
                );
                return Ok(winner);
            }
            if start.elapsed() >= self.config.global_timeout {
                return Err(self.timeout_error(start));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Administer one test case to a pass/fail verdict.
    ///
    /// Runtime trouble (timeout, missing transition, ambiguous branch,
    /// irrecoverable I/O) marks the case failed and returns
    /// `Ok(Verdict::Failed)`; model-authoring errors (not exactly one
    /// start/end state) propagate as `Err` without touching the verdict.
    pub fn run(&self, case: &mut TestCase) -> SenderoResult<Verdict> {
        info!(run_id = %self.config.run_id, case = case.name(), "test case starting");
        match self.drive(case) {
            Ok(()) => {
                case.set_passed();
                info!(run_id = %self.config.run_id, case = case.name(), "test case passed");
                Ok(Verdict::Passed)
            }
            Err(
                e @ (SenderoError::Timeout { .. }
                | SenderoError::MissingTransition { .. }
                | SenderoError::AmbiguousBranch { .. }
                | SenderoError::AttributeExecution { .. }
                | SenderoError::Connection { .. }),
            ) => {
                warn!(
                    run_id = %self.config.run_id,
                    case = case.name(),
                    error = %e,
                    "test case failed"
                );
                case.set_failed();
                Ok(Verdict::Failed)
            }
            Err(e) => Err(e),
        }
    }

    fn drive(&self, case: &TestCase) -> SenderoResult<()> {
        let diagram = case.diagram();
        let starts = diagram.local_start_states();
        if starts.len() != 1 {
            return Err(SenderoError::NotExactlyOneStart {
                found: starts.len(),
            });
        }
        let ends = diagram.local_end_states();
        if ends.len() != 1 {
            return Err(SenderoError::NotExactlyOneEnd { found: ends.len() });
        }
        let end = ends[0];
        let mut current = starts[0];

        loop {
            self.recur(diagram, current)?;
            let next_states = diagram.destinations(current);
            if next_states.is_empty() {
                if current == end {
                    return Ok(());
                }
                // Authoring-error signal: the path dead-ends short of its
                // end state. Surfaced rather than left stalling the thread.
                warn!(
                    run_id = %self.config.run_id,
                    case = case.name(),
                    state = diagram.state(current).name(),
                    "no outgoing transition from non-end state"
                );
                return Err(SenderoError::MissingTransition {
                    state: diagram.state(current).name().to_string(),
                });
            }
            current = self.transit(diagram, current, &next_states)?;
        }
    }

    /// Administer many cases concurrently, one thread per case, all sharing
    /// this administrator's connection.
    ///
    /// Access to overlapping live tags across cases is **not** serialized;
    /// a warning is emitted when more than one case runs. Results are
    /// returned in case order.
    pub fn run_all(&self, cases: &mut [TestCase]) -> Vec<SenderoResult<Verdict>> {
        if cases.len() > 1 {
            warn!(
                run_id = %self.config.run_id,
                cases = cases.len(),
                "concurrent test cases share one live connection; overlapping tag access is not serialized"
            );
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = cases
                .iter_mut()
                .map(|case| scope.spawn(move || self.run(case)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        Err(SenderoError::Worker {
                            message: panic_message(&payload),
                        })
                    })
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "unknown panic".to_string())
        },
        |s| (*s).to_string(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::attribute::{
        shared, Attribute, Completion, DummyAttribute, ExecuteMode, ReadHook, WriteHook,
    };
    use crate::connection::LoopbackConnection;
    use crate::model::State;
    use crate::testcase::TestCaseGenerator;

    /// Attribute that errors for its first `fails` executions, then completes
    #[derive(Debug, Clone)]
    struct FlakyAttribute {
        tag: String,
        fails_left: u32,
        complete: Completion,
        mode: ExecuteMode,
    }

    impl FlakyAttribute {
        fn new(tag: &str, fails: u32) -> Self {
            Self {
                tag: tag.to_string(),
                fails_left: fails,
                complete: Completion::Unknown,
                mode: ExecuteMode::Check,
            }
        }
    }

    impl Attribute for FlakyAttribute {
        fn tag(&self) -> &str {
            &self.tag
        }
        fn execute(&mut self) -> SenderoResult<bool> {
            if self.fails_left > 0 {
                self.fails_left -= 1;
                return Err(SenderoError::AttributeExecution {
                    tag: self.tag.clone(),
                    message: "transient fault".to_string(),
                });
            }
            self.complete = Completion::Complete;
            Ok(true)
        }
        fn force(&mut self) -> SenderoResult<()> {
            self.complete = Completion::Complete;
            Ok(())
        }
        fn completion(&self) -> Completion {
            self.complete
        }
        fn set_read_hook(&mut self, _hook: ReadHook) {}
        fn set_write_hook(&mut self, _hook: WriteHook) {}
        fn set_mode(&mut self, mode: ExecuteMode) {
            self.mode = mode;
        }
        fn mode(&self) -> ExecuteMode {
            self.mode
        }
        fn boxed_clone(&self) -> Box<dyn Attribute> {
            Box::new(self.clone())
        }
    }

    fn fast_admin() -> TestAdmin {
        TestAdmin::with_config(
            Arc::new(LoopbackConnection::new()),
            AdminConfig::new()
                .with_poll_interval(Duration::from_millis(5))
                .with_global_timeout(Duration::from_millis(250)),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = AdminConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.global_timeout, Duration::from_secs(600));
        assert_eq!(config.branch_policy, BranchPolicy::FirstMatch);
    }

    #[test]
    fn test_recur_completes_immediately() {
        let mut g = Graph::new("g");
        let a = g
            .add_state(State::new("A").with_attribute(shared(DummyAttribute::new("X"))))
            .unwrap();
        let admin = fast_admin();
        admin.recur(&g, a).unwrap();
    }

    #[test]
    fn test_recur_empty_state_auto_passes() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        fast_admin().recur(&g, a).unwrap();
    }

    #[test]
    fn test_recur_times_out_without_hanging() {
        let mut g = Graph::new("g");
        let a = g
            .add_state(
                State::new("A").with_attribute(shared(DummyAttribute::new("X").completes_after(0))),
            )
            .unwrap();
        let admin = fast_admin();
        let begun = Instant::now();
        let err = admin.recur(&g, a).unwrap_err();
        assert!(matches!(err, SenderoError::Timeout { .. }));
        assert!(begun.elapsed() >= Duration::from_millis(250));
        assert!(begun.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_recur_recovers_from_attribute_errors() {
        let mut g = Graph::new("g");
        let a = g
            .add_state(State::new("A").with_attribute(shared(FlakyAttribute::new("X", 3))))
            .unwrap();
        fast_admin().recur(&g, a).unwrap();
    }

    #[test]
    fn test_transit_zero_attributes_auto_passes() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        g.connect(a, b, vec![]);
        let next = fast_admin().transit(&g, a, &[b]).unwrap();
        assert_eq!(next, b);
    }

    #[test]
    fn test_transit_first_match_in_list_order() {
        // both guards complete on their first poll; list order wins
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![shared(DummyAttribute::new("TO_B"))]);
        g.connect(a, c, vec![shared(DummyAttribute::new("TO_C"))]);
        let next = fast_admin().transit(&g, a, &[b, c]).unwrap();
        assert_eq!(next, b);
    }

    #[test]
    fn test_transit_waits_for_slow_guard() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        // the B guard never completes; the C guard needs several polls
        g.connect(a, b, vec![shared(DummyAttribute::new("TO_B").completes_after(0))]);
        g.connect(a, c, vec![shared(DummyAttribute::new("TO_C").completes_after(3))]);
        let next = fast_admin().transit(&g, a, &[b, c]).unwrap();
        assert_eq!(next, c);
    }

    #[test]
    fn test_transit_ambiguity_policy() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        // two attribute-free transitions complete in the same tick
        g.connect(a, b, vec![]);
        g.connect(a, c, vec![]);

        let admin = TestAdmin::with_config(
            Arc::new(LoopbackConnection::new()),
            AdminConfig::new()
                .with_poll_interval(Duration::from_millis(5))
                .with_global_timeout(Duration::from_millis(250))
                .with_branch_policy(BranchPolicy::ErrorOnAmbiguity),
        );
        let err = admin.transit(&g, a, &[b, c]).unwrap_err();
        assert!(matches!(
            err,
            SenderoError::AmbiguousBranch { candidates: 2, .. }
        ));
    }

    #[test]
    fn test_run_chain_passes() {
        let mut g = Graph::new("chain");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g
            .add_state(State::new("B").with_attribute(shared(DummyAttribute::new("B/PV"))))
            .unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![shared(DummyAttribute::new("T/AB"))]);
        g.connect(b, c, vec![shared(DummyAttribute::new("T/BC"))]);

        let mut generator = TestCaseGenerator::new(g);
        generator.generate().unwrap();
        let admin = fast_admin();
        let case = &mut generator.cases_mut()[0];
        let verdict = admin.run(case).unwrap();
        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(case.has_passed(), Some(true));
    }

    #[test]
    fn test_run_timeout_marks_failed() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g
            .add_state(
                State::new("B").with_attribute(shared(DummyAttribute::new("X").completes_after(0))),
            )
            .unwrap();
        g.connect(a, b, vec![]);

        let mut generator = TestCaseGenerator::new(g);
        generator.generate().unwrap();
        let admin = fast_admin();
        let case = &mut generator.cases_mut()[0];
        assert_eq!(admin.run(case).unwrap(), Verdict::Failed);
        assert_eq!(case.has_passed(), Some(false));
        assert_eq!(generator.failed_cases().len(), 1);
    }

    #[test]
    fn test_run_rejects_multi_start_diagram() {
        let mut g = Graph::new("g");
        g.add_state(State::new("A")).unwrap();
        g.add_state(State::new("B")).unwrap();
        let mut case = TestCase::new(1, "bad", g);
        let err = fast_admin().run(&mut case).unwrap_err();
        assert!(matches!(err, SenderoError::NotExactlyOneStart { found: 2 }));
        assert!(case.is_pending());
    }

    #[test]
    fn test_run_all_concurrent_cases() {
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(a, b, vec![shared(DummyAttribute::new("TO_B"))]);
        g.connect(a, c, vec![shared(DummyAttribute::new("TO_C"))]);

        let mut generator = TestCaseGenerator::new(g);
        generator.generate().unwrap();
        assert_eq!(generator.cases().len(), 2);

        let admin = fast_admin();
        let results = admin.run_all(generator.cases_mut());
        assert_eq!(results.len(), 2);
        for r in results {
            assert_eq!(r.unwrap(), Verdict::Passed);
        }
        assert_eq!(generator.passed_cases().len(), 2);
        assert!(generator.pending_cases().is_empty());
    }

    #[test]
    fn test_forced_attribute_writes_through_bound_hook() {
        // a forced directive injected by the generator must reach the
        // connection when its anchor state is evaluated
        let conn = Arc::new(LoopbackConnection::new());
        let mut g = Graph::new("g");
        let a = g.add_state(State::new("A")).unwrap();
        let b = g.add_state(State::new("B")).unwrap();
        let c = g.add_state(State::new("C")).unwrap();
        g.connect(
            a,
            b,
            vec![shared(
                DummyAttribute::new("STEER/B").with_target(crate::connection::Value::Float(1.0)),
            )],
        );
        g.connect(a, c, vec![shared(DummyAttribute::new("STEER/C"))]);

        let mut generator = TestCaseGenerator::new(g);
        generator.generate().unwrap();
        let admin = TestAdmin::with_config(
            Arc::clone(&conn) as Arc<dyn Connection>,
            AdminConfig::new()
                .with_poll_interval(Duration::from_millis(5))
                .with_global_timeout(Duration::from_millis(250)),
        );
        let case = &mut generator.cases_mut()[0];
        assert!(case.name().starts_with("A-B"));
        admin.run(case).unwrap();
        assert_eq!(
            conn.get("STEER/B"),
            Some(crate::connection::Value::Float(1.0))
        );
    }
}
