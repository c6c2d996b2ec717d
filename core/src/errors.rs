use crate::{ElementType, MAX_RANK, Opcode};

// VIEW ERROR
// ================================================================================================

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("view rank cannot exceed {MAX_RANK} but was {rank}")]
    RankTooLarge { rank: usize },
    #[error("shape and stride must have equal lengths, but were {shape} and {stride}")]
    ShapeStrideMismatch { shape: usize, stride: usize },
}

// INSTRUCTION ERROR
// ================================================================================================

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InstructionError {
    #[error("output operand of {opcode} cannot be a constant")]
    ConstantOutput { opcode: Opcode },
    #[error("operand slot {slot} of {opcode} must be an inlined constant")]
    ConstantRequired { opcode: Opcode, slot: usize },
    #[error("{opcode} requires integer operands but was applied to {actual}")]
    IntegerRequired { opcode: Opcode, actual: ElementType },
    #[error("{opcode} requires an output operand")]
    MissingOutput { opcode: Opcode },
    #[error("{opcode} takes {expected} operands, received {actual}")]
    OperandCount { opcode: Opcode, expected: usize, actual: usize },
    #[error("operand of {opcode} should have type {expected}, but had type {actual}")]
    TypeMismatch { opcode: Opcode, expected: ElementType, actual: ElementType },
}
