//! Attribute capability contract.
//!
//! Concrete attribute kinds (named sets, analog comparisons, mode writes,
//! operator prompts) are built outside this crate; the engine depends only
//! on the capability seam defined here and never inspects concrete kinds.
//! [`DummyAttribute`] ships as a stand-in for tests and examples.

use crate::connection::{ReadValue, Value};
use crate::result::{SenderoError, SenderoResult};
use std::sync::{Arc, Mutex, PoisonError};

/// Hook used by attributes to read a live tag path
pub type ReadHook = Arc<dyn Fn(&str) -> SenderoResult<ReadValue> + Send + Sync>;

/// Hook used by attributes to write a live tag path
pub type WriteHook = Arc<dyn Fn(&str, Value) -> SenderoResult<()> + Send + Sync>;

/// Tri-state evaluation status of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Not yet evaluated
    Unknown,
    /// Evaluated and satisfied
    Complete,
    /// Evaluated and not yet satisfied
    Incomplete,
}

impl Completion {
    /// True only for [`Completion::Complete`]
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// How an attribute behaves when executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
    /// Evaluate the attribute's own condition against live reads
    Check,
    /// Directly write the attribute's target so the condition holds
    Force,
}

/// Capability contract every attribute kind must satisfy.
///
/// `execute` is called once per poll tick by the administrator; errors are
/// recovered locally there (logged, retried next tick), so implementations
/// should surface transient trouble as `Err` rather than panicking.
pub trait Attribute: Send + std::fmt::Debug {
    /// Identity of the live value this attribute observes or writes.
    /// Forcing dedup matches attributes by tag, never by instance.
    fn tag(&self) -> &str;

    /// Evaluate (or force, depending on mode) once; returns completion
    fn execute(&mut self) -> SenderoResult<bool>;

    /// Directly write the attribute's target value
    fn force(&mut self) -> SenderoResult<()>;

    /// Current evaluation status
    fn completion(&self) -> Completion;

    /// Bind the live read function
    fn set_read_hook(&mut self, hook: ReadHook);

    /// Bind the live write function
    fn set_write_hook(&mut self, hook: WriteHook);

    /// Switch between check and force execution
    fn set_mode(&mut self, mode: ExecuteMode);

    /// Current execution mode
    fn mode(&self) -> ExecuteMode;

    /// Independent copy, used for per-test-case forced attributes
    fn boxed_clone(&self) -> Box<dyn Attribute>;
}

/// Attribute instance shared by reference between the live model and every
/// test case traversing it
pub type SharedAttribute = Arc<Mutex<Box<dyn Attribute>>>;

/// Wrap an attribute for shared use
pub fn shared(attr: impl Attribute + 'static) -> SharedAttribute {
    Arc::new(Mutex::new(Box::new(attr)))
}

/// Lock a shared attribute, recovering from poisoning.
///
/// A poisoned lock means another test thread panicked mid-execute; the
/// attribute state is still the best available information.
pub(crate) fn lock_attr(attr: &SharedAttribute) -> std::sync::MutexGuard<'_, Box<dyn Attribute>> {
    attr.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Placeholder attribute for testing and type-deferred model building.
///
/// In check mode it completes after a configurable number of `execute`
/// calls, reading its tag through the bound hook when one is present. In
/// force mode it writes its target through the write hook and completes.
#[derive(Clone)]
pub struct DummyAttribute {
    tag: String,
    target: Value,
    completes_after: u32,
    fail_always: bool,
    exe_count: u32,
    complete: Completion,
    mode: ExecuteMode,
    read_hook: Option<ReadHook>,
    write_hook: Option<WriteHook>,
}

impl std::fmt::Debug for DummyAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyAttribute")
            .field("tag", &self.tag)
            .field("target", &self.target)
            .field("completes_after", &self.completes_after)
            .field("exe_count", &self.exe_count)
            .field("complete", &self.complete)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl DummyAttribute {
    /// Create a dummy that completes on its first execution
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            target: Value::Float(1.0),
            completes_after: 1,
            fail_always: false,
            exe_count: 0,
            complete: Completion::Unknown,
            mode: ExecuteMode::Check,
            read_hook: None,
            write_hook: None,
        }
    }

    /// Require `n` execute calls before reporting complete (0 = never)
    #[must_use]
    pub const fn completes_after(mut self, n: u32) -> Self {
        self.completes_after = n;
        self
    }

    /// Make every execute call return an error
    #[must_use]
    pub const fn always_failing(mut self) -> Self {
        self.fail_always = true;
        self
    }

    /// Set the target value written when forced
    #[must_use]
    pub fn with_target(mut self, target: Value) -> Self {
        self.target = target;
        self
    }

    /// Number of times `execute` has been called
    #[must_use]
    pub const fn execute_count(&self) -> u32 {
        self.exe_count
    }
}

impl Attribute for DummyAttribute {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn execute(&mut self) -> SenderoResult<bool> {
        if self.fail_always {
            return Err(SenderoError::AttributeExecution {
                tag: self.tag.clone(),
                message: "dummy attribute configured to fail".to_string(),
            });
        }
        self.exe_count += 1;

        if self.mode == ExecuteMode::Force {
            self.force()?;
            return Ok(true);
        }

        // Exercise the read seam when bound; read failures count as a
        // failed execution and are retried by the administrator.
        if let Some(hook) = &self.read_hook {
            let _ = hook(&self.tag)?;
        }

        let done = self.completes_after > 0 && self.exe_count >= self.completes_after;
        self.complete = if done {
            Completion::Complete
        } else {
            Completion::Incomplete
        };
        Ok(done)
    }

    fn force(&mut self) -> SenderoResult<()> {
        if let Some(hook) = &self.write_hook {
            hook(&self.tag, self.target.clone())?;
        }
        self.complete = Completion::Complete;
        Ok(())
    }

    fn completion(&self) -> Completion {
        self.complete
    }

    fn set_read_hook(&mut self, hook: ReadHook) {
        self.read_hook = Some(hook);
    }

    fn set_write_hook(&mut self, hook: WriteHook) {
        self.write_hook = Some(hook);
    }

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
