#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod errors;

mod base;
pub use base::{AllocState, Base, BaseId, Owner};

mod element;
pub use element::{Constant, ElementType};

mod instruction;
pub use instruction::{ExtensionId, Instruction, Opcode, Operand, ViewModifier};

mod view;
pub use view::{MAX_RANK, View};
