//! Per-call request context threaded through pipeline steps.

use std::{any::Any, collections::HashMap, fmt, marker::PhantomData, time::Duration};

use tokio_util::sync::CancellationToken;

/// Compile-time token naming a scratch slot and fixing its value type.
///
/// Declare keys as constants next to the steps that produce them:
///
/// ```
/// use execstream_core::context::ScratchKey;
///
/// const SESSION_ID: ScratchKey<String> = ScratchKey::new("session_id");
/// ```
pub struct ScratchKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScratchKey<T> {
    /// Create a key. Names must be unique within a pipeline.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Slot name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ScratchKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ScratchKey<T> {}

impl<T> fmt::Debug for ScratchKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScratchKey").field(&self.name).finish()
    }
}

/// Heterogeneous values one step produces and a later step consumes.
#[derive(Default)]
pub struct Scratch {
    values: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl Scratch {
    /// Store a value, returning the previous one.
    pub fn insert<T: Send + 'static>(&mut self, key: ScratchKey<T>, value: T) -> Option<T> {
        self.values
            .insert(key.name, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow a value.
    #[must_use]
    pub fn get<T: 'static>(&self, key: ScratchKey<T>) -> Option<&T> {
        self.values.get(key.name)?.downcast_ref::<T>()
    }

    /// Mutably borrow a value.
    pub fn get_mut<T: 'static>(&mut self, key: ScratchKey<T>) -> Option<&mut T> {
        self.values.get_mut(key.name)?.downcast_mut::<T>()
    }

    /// Remove and return a value.
    pub fn remove<T: 'static>(&mut self, key: ScratchKey<T>) -> Option<T> {
        let boxed = self.values.remove(key.name)?;
        boxed.downcast::<T>().ok().map(|v| *v)
    }

    /// Whether a slot is filled.
    #[must_use]
    pub fn contains<T>(&self, key: ScratchKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    /// Number of filled slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no slot is filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Timing of a step that completed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub step: &'static str,
    pub elapsed: Duration,
}

/// State carried through one pipeline run.
///
/// One context is created per inbound call and dropped when the call ends;
/// it is never shared between calls.
///
/// - `input`: the original request, never mutated
/// - `result`: the entity being built or mutated
/// - `ext`: pipeline-specific fields, one concrete type per pipeline
/// - `scratch`: typed slots for values that do not belong in `ext`
pub struct RequestContext<I, R, X = ()> {
    input: I,
    result: Option<R>,
    ext: X,
    scratch: Scratch,
    cancel: CancellationToken,
    reports: Vec<StepReport>,
}

impl<I, R, X: Default> RequestContext<I, R, X> {
    /// Create a context with default pipeline state.
    #[must_use]
    pub fn new(input: I, cancel: CancellationToken) -> Self {
        Self::with_ext(input, X::default(), cancel)
    }
}

impl<I, R, X> RequestContext<I, R, X> {
    /// Create a context with explicit pipeline state.
    #[must_use]
    pub fn with_ext(input: I, ext: X, cancel: CancellationToken) -> Self {
        Self {
            input,
            result: None,
            ext,
            scratch: Scratch::default(),
            cancel,
            reports: Vec::new(),
        }
    }

    /// The original request.
    #[must_use]
    pub const fn input(&self) -> &I {
        &self.input
    }

    /// The entity built so far, if any.
    #[must_use]
    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    /// Mutable access to the entity built so far.
    pub fn result_mut(&mut self) -> Option<&mut R> {
        self.result.as_mut()
    }

    /// Replace the entity.
    pub fn set_result(&mut self, result: R) {
        self.result = Some(result);
    }

    /// Take the entity out, leaving the slot empty.
    pub fn take_result(&mut self) -> Option<R> {
        self.result.take()
    }

    /// Pipeline-specific state.
    #[must_use]
    pub const fn ext(&self) -> &X {
        &self.ext
    }

    /// Mutable pipeline-specific state.
    pub fn ext_mut(&mut self) -> &mut X {
        &mut self.ext
    }

    /// Scratch slots.
    #[must_use]
    pub const fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Mutable scratch slots.
    pub fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }

    /// Cancellation token of the caller.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the caller went away.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reports of the steps that completed, in order.
    #[must_use]
    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// Consume the context, returning the result and pipeline state.
    pub fn into_parts(self) -> (Option<R>, X) {
        (self.result, self.ext)
    }

    pub(crate) fn record(&mut self, report: StepReport) {
        self.reports.push(report);
    }
}

impl<I: fmt::Debug, R: fmt::Debug, X: fmt::Debug> fmt::Debug for RequestContext<I, R, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("input", &self.input)
            .field("result", &self.result)
            .field("ext", &self.ext)
            .field("scratch", &self.scratch)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
