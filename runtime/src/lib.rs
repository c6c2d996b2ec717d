#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod alias;
mod config;
mod errors;
mod executor;
mod lifecycle;
mod recorder;

pub mod flow;

#[cfg(test)]
mod test_utils;

// RE-EXPORTS
// ================================================================================================

pub use alias::{AliasOracle, ConservativeOracle, PreciseOracle};
pub use arrayflow_core::{
    AllocState, Base, BaseId, Constant, ElementType, ExtensionId, Instruction, MAX_RANK, Opcode,
    Operand, Owner, View, ViewModifier,
};
pub use config::RuntimeOptions;
pub use errors::{FlushError, OptionsError, RecordError};
pub use executor::{Batch, Executor, ExecutorError, NullExecutor};
pub use recorder::{OperandRef, Recorder, ViewId};
