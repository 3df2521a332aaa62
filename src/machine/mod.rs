//! Compiler and abstract machine.
//!
//! Rules are compiled once into instruction sequences held by a
//! [`Program`]. Each derivation attempt runs on its own [`Machine`] with a
//! private heap, trail, frame arena and choice-point stack.

pub mod builtin;
pub mod choice;
pub mod compiler;
pub mod executor;
pub mod instruction;
pub mod program;

pub use builtin::Builtin;
pub use choice::{Alternative, ChoicePoint, Continuation, Frame};
pub use compiler::{CompiledRule, Compiler, Signatures};
pub use executor::{Machine, Solution, State};
pub use instruction::{
    Constant, Instruction, InstructionSequence, Reg, Slot, Target, Var,
};
pub use program::Program;
