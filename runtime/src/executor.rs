use alloc::{string::String, vec::Vec};
use core::ops::Range;

use arrayflow_core::{ExtensionId, Instruction, View};

// EXECUTOR ERROR
// ================================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor does not expose raw data access")]
    DataAccessUnsupported,
    #[error("executor failed: {reason}")]
    Failed { reason: String },
    #[error("executor ran out of memory allocating base storage")]
    OutOfMemory,
    #[error("executor does not support extension function '{name}'")]
    UnsupportedExtension { name: String },
}

// BATCH
// ================================================================================================

/// A prepared instruction batch, ready for execution.
///
/// Instructions appear grouped by sub-DAG: `segments` delimits one contiguous run per sub-DAG,
/// and within a segment instructions are in recording order, which respects the flow invariant.
/// Segments share no data, so the executor may run them in any order (or on distinct devices)
/// without observing a data race.
///
/// A batch may be annotated for repetition: the executor runs it `repeats` times, re-evaluating
/// `condition` (a boolean scalar view) before each iteration and stopping early once it reads
/// false. Sliding-view modifiers on the instructions advance their operands between iterations.
#[derive(Clone, Debug)]
pub struct Batch {
    instructions: Vec<Instruction>,
    segments: Vec<Range<usize>>,
    repeats: u64,
    condition: Option<View>,
}

impl Batch {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a new batch over pre-grouped instructions.
    pub(crate) fn new(
        instructions: Vec<Instruction>,
        segments: Vec<Range<usize>>,
        repeats: u64,
        condition: Option<View>,
    ) -> Self {
        Self { instructions, segments, repeats, condition }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns all instructions in emission order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the instruction runs of the independent sub-DAGs.
    pub fn segments(&self) -> impl Iterator<Item = &[Instruction]> {
        self.segments.iter().map(|range| &self.instructions[range.clone()])
    }

    /// Returns the number of independent sub-DAGs in this batch.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns how many times the executor should run this batch.
    pub const fn repeats(&self) -> u64 {
        self.repeats
    }

    /// Returns the loop condition view, if this is a conditioned repeat.
    pub const fn condition(&self) -> Option<&View> {
        self.condition.as_ref()
    }

    /// Returns true if this batch carries no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

// EXECUTOR
// ================================================================================================

/// A downstream execution engine the recorder drains into.
///
/// Implementations range from a naive CPU interpreter to a GPU dispatcher or a cluster
/// front-end; the runtime core only requires that a batch executes respecting the order within
/// each of its segments, and that failures surface through the returned status.
pub trait Executor {
    // REQUIRED METHODS
    // --------------------------------------------------------------------------------------------

    /// Runs a prepared batch to completion.
    ///
    /// # Errors
    /// Returns an error if any instruction of the batch fails; the whole batch is then
    /// considered failed.
    fn execute(&mut self, batch: &Batch) -> Result<(), ExecutorError>;

    // PROVIDED METHODS
    // --------------------------------------------------------------------------------------------

    /// Prepares the executor for its first batch.
    fn init(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Flushes and tears down the executor.
    fn shutdown(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Registers a user-defined extension function and returns its id.
    fn register_user_function(&mut self, name: &str) -> Result<ExtensionId, ExecutorError> {
        Err(ExecutorError::UnsupportedExtension { name: name.into() })
    }

    /// Sends an opaque message through the executor stack and returns its reply.
    fn message(&mut self, _msg: &str) -> String {
        String::new()
    }

    /// Returns a raw pointer to the data selected by `view`.
    ///
    /// With `copy_to_host` the data is copied to main memory first; `force_alloc` allocates
    /// storage if the base is still unallocated; `nullify` detaches the pointer from the base so
    /// the caller assumes ownership.
    fn data_get(
        &mut self,
        _view: &View,
        _copy_to_host: bool,
        _force_alloc: bool,
        _nullify: bool,
    ) -> Result<*mut u8, ExecutorError> {
        Err(ExecutorError::DataAccessUnsupported)
    }

    /// Hands a caller-allocated buffer to the executor as the backing store of `view`'s base.
    ///
    /// `host_ptr` marks the pointer as host memory as opposed to device memory. The executor
    /// deallocates the buffer when the base is discarded.
    fn data_set(
        &mut self,
        _view: &View,
        _host_ptr: bool,
        _ptr: *mut u8,
    ) -> Result<(), ExecutorError> {
        Err(ExecutorError::DataAccessUnsupported)
    }
}

// NULL EXECUTOR
// ================================================================================================

/// An executor that accepts every batch and holds no data.
///
/// Useful for tests and for measuring the recording overhead in isolation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullExecutor;

impl Executor for NullExecutor {
    fn execute(&mut self, _batch: &Batch) -> Result<(), ExecutorError> {
        Ok(())
    }
}
