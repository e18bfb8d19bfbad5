//! A register-based bytecode virtual machine for routing/dispatch rules (§3, §4.6).
//!
//! A [`builder::ProgramBuilder`] assembles a [`program::Program`] (constant pool plus named
//! handler code blocks). [`runtime::Runtime`] links a program against a set of registered native
//! functions/handlers, producing a [`runtime::LinkedProgram`]. A [`runner::Runner`] then executes
//! one handler of a linked program to completion or suspension.

pub mod builder;
pub mod error;
pub mod instr;
pub mod match_table;
pub mod program;
pub mod runner;
pub mod runtime;
pub mod value;

pub use builder::{HandlerBuilder, ProgramBuilder};
pub use error::{RunError, VmError};
pub use instr::{Instruction, Opcode};
pub use match_table::{MatchCase, MatchTable};
pub use program::{CodeBlock, MatchKind, NativeRef, Program};
pub use runner::{ResumeToken, RunOutcome, RunState, Runner};
pub use runtime::{LinkedProgram, NativeFn, NativeOutcome, Runtime};
pub use value::{FlowString, Value, ValueType};
