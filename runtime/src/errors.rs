use arrayflow_core::{
    BaseId, ExtensionId, Opcode,
    errors::{InstructionError, ViewError},
};

use crate::{executor::ExecutorError, recorder::ViewId};

// RECORD ERROR
// ================================================================================================

/// Errors raised while recording a single operation.
///
/// A record-time error rejects that operation only; the recorder state is left unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("flush triggered by the batch threshold failed")]
    Flush(#[from] FlushError),
    #[error(transparent)]
    InvalidInstruction(#[from] InstructionError),
    #[error(transparent)]
    InvalidView(#[from] ViewError),
    #[error("modifier dimension {dim} is out of range for a rank-{rank} view")]
    ModifierDimOutOfRange { dim: usize, rank: usize },
    #[error("reduction axis {axis} is out of range for a rank-{rank} input")]
    ReductionAxisOutOfRange { axis: i64, rank: usize },
    #[error("operand shape {actual:?} does not match the output shape {expected:?}")]
    ShapeMismatch { expected: alloc::vec::Vec<u64>, actual: alloc::vec::Vec<u64> },
    #[error("extension function {0} has not been registered with the executor")]
    UnsupportedExtensionFunction(ExtensionId),
    #[error("opcode {0} cannot be recorded directly; use the dedicated lifecycle call")]
    UnsupportedOpcode(Opcode),
    #[error("unknown base handle {0}")]
    UnknownBase(BaseId),
    #[error("unknown view handle {0}")]
    UnknownView(ViewId),
    #[error(
        "view spans offsets {lowest}..={highest} of base {base}, which holds {num_elements} elements"
    )]
    ViewOutOfBounds { base: BaseId, lowest: i128, highest: i128, num_elements: u64 },
}

// FLUSH ERROR
// ================================================================================================

/// Errors raised while draining the recorder into the executor.
///
/// A flush-time error aborts the current batch: no speculative ownership update persists, the
/// recorded instructions stay buffered, and the error propagates to the caller. The core performs
/// no retries.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("condition view {0} must reference a boolean base")]
    ConditionNotBoolean(ViewId),
    #[error("executor failed to run the prepared batch")]
    ExecutorFailure(#[source] ExecutorError),
    #[error("out of memory while growing flow-graph tables")]
    OutOfMemory,
    #[error("view handle {0} is not known to the recorder")]
    UnknownView(ViewId),
}

// OPTIONS ERROR
// ================================================================================================

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("vcache size must be greater than zero")]
    InvalidVcacheSize,
}
