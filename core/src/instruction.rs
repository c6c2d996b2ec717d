use core::fmt;

use smallvec::SmallVec;

use crate::{Constant, ElementType, View, errors::InstructionError};

// EXTENSION ID
// ================================================================================================

/// Identifier of a user-defined extension function registered with the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionId(u32);

impl ExtensionId {
    /// Returns a new extension id wrapping the provided raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer backing this id.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ExtensionId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// OPCODE
// ================================================================================================

/// The closed set of operations the runtime records and emits.
///
/// Element-wise and reduction opcodes carry their operands as views and inlined constants;
/// lifecycle opcodes (`Free`, `Discard`, `Release`, `Sync`) are rewritten during flush
/// preparation according to base ownership, and `None` marks an instruction suppressed by that
/// rewrite. `Extension` opcodes dispatch to functions previously registered with the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // element-wise arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
    Minimum,
    Maximum,
    // element-wise comparison; writes bool
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    // element-wise logical; bool in, bool out
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    LogicalNot,
    // element-wise bitwise; integer types only
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    // reductions along one axis
    AddReduce,
    MultiplyReduce,
    MinimumReduce,
    MaximumReduce,
    LogicalAndReduce,
    LogicalOrReduce,
    // data movement and generation
    Identity,
    Random,
    // lifecycle
    Free,
    Discard,
    Release,
    Sync,
    None,
    // user-defined extension function
    Extension(ExtensionId),
}

impl Opcode {
    /// Returns the number of operand slots this opcode requires, or `Option::None` when the
    /// count is not fixed (extension functions).
    pub const fn num_operands(&self) -> Option<usize> {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Remainder
            | Self::Power
            | Self::Minimum
            | Self::Maximum
            | Self::Equal
            | Self::NotEqual
            | Self::Less
            | Self::LessEqual
            | Self::Greater
            | Self::GreaterEqual
            | Self::LogicalAnd
            | Self::LogicalOr
            | Self::LogicalXor
            | Self::BitwiseAnd
            | Self::BitwiseOr
            | Self::BitwiseXor => Some(3),
            Self::LogicalNot | Self::Identity => Some(2),
            Self::AddReduce
            | Self::MultiplyReduce
            | Self::MinimumReduce
            | Self::MaximumReduce
            | Self::LogicalAndReduce
            | Self::LogicalOrReduce => Some(3),
            Self::Random => Some(3),
            Self::Free | Self::Discard | Self::Release | Self::Sync => Some(1),
            Self::None => Some(0),
            Self::Extension(_) => Option::None,
        }
    }

    /// Returns true if this opcode maps its inputs element by element onto the output, so all
    /// view operands share the output's shape.
    pub const fn is_elementwise(&self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Subtract
                | Self::Multiply
                | Self::Divide
                | Self::Remainder
                | Self::Power
                | Self::Minimum
                | Self::Maximum
                | Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
                | Self::LogicalAnd
                | Self::LogicalOr
                | Self::LogicalXor
                | Self::LogicalNot
                | Self::BitwiseAnd
                | Self::BitwiseOr
                | Self::BitwiseXor
                | Self::Identity
        )
    }

    /// Returns true if this opcode reduces its input along an axis.
    pub const fn is_reduction(&self) -> bool {
        matches!(
            self,
            Self::AddReduce
                | Self::MultiplyReduce
                | Self::MinimumReduce
                | Self::MaximumReduce
                | Self::LogicalAndReduce
                | Self::LogicalOrReduce
        )
    }

    /// Returns true if this opcode compares its inputs element-wise.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    /// Returns true if this opcode operates on and produces booleans.
    pub const fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::LogicalAnd
                | Self::LogicalOr
                | Self::LogicalXor
                | Self::LogicalNot
                | Self::LogicalAndReduce
                | Self::LogicalOrReduce
        )
    }

    /// Returns true if this opcode requires integer operands.
    pub const fn is_bitwise(&self) -> bool {
        matches!(self, Self::BitwiseAnd | Self::BitwiseOr | Self::BitwiseXor)
    }

    /// Returns true if this opcode manages a handle's lifecycle rather than computing.
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Free | Self::Discard | Self::Release | Self::Sync | Self::None)
    }

    /// Returns true if this opcode writes boolean results regardless of its input type.
    pub const fn writes_bool(&self) -> bool {
        self.is_comparison() || self.is_logical()
    }

    /// Returns the string representation of this opcode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Remainder => "remainder",
            Self::Power => "power",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Greater => "greater",
            Self::GreaterEqual => "greater_equal",
            Self::LogicalAnd => "logical_and",
            Self::LogicalOr => "logical_or",
            Self::LogicalXor => "logical_xor",
            Self::LogicalNot => "logical_not",
            Self::BitwiseAnd => "bitwise_and",
            Self::BitwiseOr => "bitwise_or",
            Self::BitwiseXor => "bitwise_xor",
            Self::AddReduce => "add_reduce",
            Self::MultiplyReduce => "multiply_reduce",
            Self::MinimumReduce => "minimum_reduce",
            Self::MaximumReduce => "maximum_reduce",
            Self::LogicalAndReduce => "logical_and_reduce",
            Self::LogicalOrReduce => "logical_or_reduce",
            Self::Identity => "identity",
            Self::Random => "random",
            Self::Free => "free",
            Self::Discard => "discard",
            Self::Release => "release",
            Self::Sync => "sync",
            Self::None => "none",
            Self::Extension(_) => "extension",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension(id) => write!(f, "extension({id})"),
            _ => f.write_str(self.as_str()),
        }
    }
}

// OPERAND
// ================================================================================================

/// A single instruction operand slot: a strided view or an inlined constant.
#[derive(Clone, Debug, PartialEq, derive_more::From)]
pub enum Operand {
    View(View),
    Constant(Constant),
}

impl Operand {
    /// Returns the view in this slot, if any.
    pub fn as_view(&self) -> Option<&View> {
        match self {
            Self::View(view) => Some(view),
            Self::Constant(_) => None,
        }
    }

    /// Returns the constant in this slot, if any.
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Self::View(_) => None,
            Self::Constant(constant) => Some(constant),
        }
    }

    /// Returns true if this slot holds an inlined constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    fn element_type(&self) -> ElementType {
        match self {
            Self::View(view) => view.element_type(),
            Self::Constant(constant) => constant.element_type(),
        }
    }
}

// VIEW MODIFIER
// ================================================================================================

/// A sliding-iterator adjustment attached to an instruction operand.
///
/// Modifiers are opaque to the flow layer: the executor applies them to the operand in `slot`
/// between iterations of a repeated batch. The flow-graph builder treats a modified view as
/// conflicting with every view of the same base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewModifier {
    /// Advance the operand's start offset by `step` elements along `dim` on every iteration.
    Slide { slot: usize, dim: usize, step: i64 },
    /// Reset the sliding offset along `dim` once it has advanced `max` times.
    Reset { slot: usize, dim: usize, max: u64 },
}

// INSTRUCTION
// ================================================================================================

/// An opcode plus an ordered tuple of operand slots.
///
/// Slot 0 is the write (output) operand and is always a view; slots 1..k are read operands and
/// may be views or inlined constants. Operand views are copied in at record time and immutable
/// afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    operands: SmallVec<[Operand; 3]>,
    modifiers: SmallVec<[ViewModifier; 1]>,
}

impl Instruction {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Returns a new validated instruction.
    ///
    /// # Errors
    /// Returns an error if the operand count does not match the opcode, if the output slot holds
    /// a constant, or if the operand types violate the opcode's homogeneity rules.
    pub fn new(
        opcode: Opcode,
        operands: impl IntoIterator<Item = Operand>,
    ) -> Result<Self, InstructionError> {
        let operands: SmallVec<[Operand; 3]> = operands.into_iter().collect();
        if let Some(expected) = opcode.num_operands()
            && operands.len() != expected
        {
            return Err(InstructionError::OperandCount {
                opcode,
                expected,
                actual: operands.len(),
            });
        }
        match operands.first() {
            Some(Operand::Constant(_)) => {
                return Err(InstructionError::ConstantOutput { opcode });
            },
            Option::None if opcode != Opcode::None => {
                return Err(InstructionError::MissingOutput { opcode });
            },
            _ => {},
        }
        let instruction = Self {
            opcode,
            operands,
            modifiers: SmallVec::new(),
        };
        instruction.check_types()?;
        Ok(instruction)
    }

    /// Returns a suppressed instruction carrying no operands.
    pub fn nop() -> Self {
        Self {
            opcode: Opcode::None,
            operands: SmallVec::new(),
            modifiers: SmallVec::new(),
        }
    }

    /// Returns a lifecycle instruction over a single view, bypassing type checks.
    ///
    /// Used by flush preparation when rewriting handle lifecycle instructions onto whole bases.
    pub fn lifecycle(opcode: Opcode, view: View) -> Self {
        debug_assert!(opcode.is_lifecycle());
        Self {
            opcode,
            operands: smallvec::smallvec![Operand::View(view)],
            modifiers: SmallVec::new(),
        }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the opcode of this instruction.
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns all operand slots in order, the output slot first.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Returns the write (output) view, if this instruction has operands.
    pub fn output(&self) -> Option<&View> {
        self.operands.first().and_then(Operand::as_view)
    }

    /// Returns the read operand slots (slots 1..k).
    pub fn reads(&self) -> &[Operand] {
        self.operands.get(1..).unwrap_or(&[])
    }

    /// Returns the sliding-iterator modifiers attached to this instruction.
    pub fn modifiers(&self) -> &[ViewModifier] {
        &self.modifiers
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Attaches a sliding-iterator modifier to this instruction.
    pub fn attach_modifier(&mut self, modifier: ViewModifier) {
        self.modifiers.push(modifier);
    }

    // TYPE CHECKS
    // --------------------------------------------------------------------------------------------

    /// Verifies the opcode's type-homogeneity rules over the operand slots.
    ///
    /// Instructions are type-homogeneous except where the opcode explicitly permits mixed types:
    /// comparisons and logical ops write `Bool`, `Identity` is a casting copy, reductions take an
    /// `Int64` axis immediate, `Random` takes `UInt64` seed/key immediates, and extension
    /// functions are opaque.
    fn check_types(&self) -> Result<(), InstructionError> {
        let opcode = self.opcode;
        if opcode.is_lifecycle() || matches!(opcode, Opcode::Identity | Opcode::Extension(_)) {
            return Ok(());
        }
        let out_type = match self.output() {
            Some(view) => view.element_type(),
            Option::None => return Ok(()),
        };

        if opcode == Opcode::Random {
            expect_type(opcode, ElementType::UInt64, out_type)?;
            for (slot, operand) in self.reads().iter().enumerate() {
                let constant = operand
                    .as_constant()
                    .ok_or(InstructionError::ConstantRequired { opcode, slot: slot + 1 })?;
                expect_type(opcode, ElementType::UInt64, constant.element_type())?;
            }
            return Ok(());
        }

        if opcode.is_reduction() {
            let input = self.operands[1].element_type();
            let axis = self.operands[2]
                .as_constant()
                .ok_or(InstructionError::ConstantRequired { opcode, slot: 2 })?;
            expect_type(opcode, ElementType::Int64, axis.element_type())?;
            if opcode.is_logical() {
                expect_type(opcode, ElementType::Bool, out_type)?;
                expect_type(opcode, ElementType::Bool, input)?;
            } else {
                expect_type(opcode, input, out_type)?;
            }
            return Ok(());
        }

        if opcode.writes_bool() {
            expect_type(opcode, ElementType::Bool, out_type)?;
            let mut inputs = self.reads().iter().map(Operand::element_type);
            if let Some(first) = inputs.next() {
                if opcode.is_logical() {
                    expect_type(opcode, ElementType::Bool, first)?;
                }
                for etype in inputs {
                    expect_type(opcode, first, etype)?;
                }
            }
            return Ok(());
        }

        if opcode.is_bitwise() && !out_type.is_integer() {
            return Err(InstructionError::IntegerRequired { opcode, actual: out_type });
        }
        for operand in self.reads() {
            expect_type(opcode, out_type, operand.element_type())?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.opcode)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match operand {
                Operand::View(view) => write!(f, "b{}+{}", view.base(), view.start())?,
                Operand::Constant(constant) => write!(f, "{constant}")?,
            }
        }
        write!(f, ")")
    }
}

// HELPER FUNCTIONS
// ================================================================================================

fn expect_type(
    opcode: Opcode,
    expected: ElementType,
    actual: ElementType,
) -> Result<(), InstructionError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InstructionError::TypeMismatch { opcode, expected, actual })
    }
}

// TESTS
// ================================================================================================
