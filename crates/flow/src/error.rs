//! Link-time and run-time error kinds (§7 "VM errors").

use crate::value::ValueType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("native function {name:?} is not registered with this runtime")]
    UnknownNative { name: String },

    #[error("native handler {name:?} is not registered with this runtime")]
    UnknownHandler { name: String },

    #[error("native {name:?} signature mismatch: expected {expected:?}, call site declares {actual:?}")]
    NativeSignatureMismatch { name: String, expected: Vec<ValueType>, actual: Vec<ValueType> },

    #[error("regex compile failure for pattern {pattern:?}: {source}")]
    RegexCompile { pattern: String, #[source] source: regex::Error },

    #[error("handler {handler:?} divides by a constant zero at pc {pc}")]
    ConstantDivisionByZero { handler: String, pc: u64 },

    #[error("runtime type error: {context}")]
    TypeMismatch { context: String },

    #[error("handler {handler:?} referenced but not defined in this program")]
    UnknownHandlerRef { handler: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("program counter {pc} is out of bounds for handler {handler:?} ({len} instructions)")]
    PcOutOfBounds { handler: String, pc: u64, len: usize },

    #[error("register {reg} is out of bounds (stack size {stack_size})")]
    RegisterOutOfBounds { reg: u16, stack_size: u32 },

    #[error("{context}")]
    Type { context: String },

    #[error("integer division by zero at runtime")]
    DivisionByZero,

    #[error("resuming a runner that is not suspended")]
    NotSuspended,
}
