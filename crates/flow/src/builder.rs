//! Assembles a [`Program`] by hand: intern constants, emit instructions, define handlers. This
//! stands in for a textual Flow front end (§6.4 notes that the concrete syntax is unspecified and
//! out of scope); tests and embedding callers target this builder directly.

use crate::instr::{Instruction, Opcode};
use crate::match_table::MatchCase;
use crate::program::{CodeBlock, MatchKind, MatchTableDef, NativeRef, Program, compute_stack_size};
use crate::value::ValueType;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_int(&mut self, value: i64) -> u16 {
        intern(&mut self.program.ints, value)
    }

    pub fn intern_string(&mut self, value: impl Into<Arc<str>>) -> u16 {
        intern(&mut self.program.strings, value.into())
    }

    pub fn intern_ip(&mut self, value: IpAddr) -> u16 {
        intern(&mut self.program.ips, value)
    }

    pub fn intern_cidr(&mut self, value: IpNet) -> u16 {
        intern(&mut self.program.cidrs, value)
    }

    /// Interns a regex *pattern*; compilation (and thus failure) is deferred to link time
    /// (§7 "VM errors ... regex compile failure at link").
    pub fn intern_regex(&mut self, pattern: impl Into<String>) -> u16 {
        intern(&mut self.program.regex_patterns, pattern.into())
    }

    pub fn intern_native(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>) -> u16 {
        self.program.natives.push(NativeRef { name: name.into(), arg_types, is_handler: false });
        (self.program.natives.len() - 1) as u16
    }

    pub fn intern_native_handler(&mut self, name: impl Into<String>, arg_types: Vec<ValueType>) -> u16 {
        self.program.natives.push(NativeRef { name: name.into(), arg_types, is_handler: true });
        (self.program.natives.len() - 1) as u16
    }

    pub fn intern_match_table(&mut self, kind: MatchKind, cases: Vec<MatchCase>, else_pc: u64) -> u16 {
        self.program.match_tables.push(MatchTableDef { kind, cases, else_pc });
        (self.program.match_tables.len() - 1) as u16
    }

    pub fn handler(&mut self, name: impl Into<String>) -> HandlerBuilder<'_> {
        HandlerBuilder { program: &mut self.program, name: name.into(), code: Vec::new() }
    }

    pub fn build(self) -> Program {
        self.program
    }
}

fn intern<T: PartialEq>(pool: &mut Vec<T>, value: T) -> u16 {
    if let Some(pos) = pool.iter().position(|v| v == &value) {
        return pos as u16;
    }
    pool.push(value);
    (pool.len() - 1) as u16
}

/// Builds one handler's instruction stream. `emit` returns the index of the just-emitted
/// instruction so callers can compute branch targets (e.g. `let fixup = hb.emit(...); ... ;
/// hb.patch(fixup, hb.here())`).
pub struct HandlerBuilder<'p> {
    program: &'p mut Program,
    name: String,
    code: Vec<Instruction>,
}

impl HandlerBuilder<'_> {
    pub fn here(&self) -> u64 {
        self.code.len() as u64
    }

    pub fn emit(&mut self, opcode: Opcode, a: u16, b: u16, c: u16) -> u64 {
        self.code.push(Instruction::new(opcode, a, b, c));
        self.here() - 1
    }

    /// Rewrites a previously emitted branch instruction's target operand (A).
    pub fn patch(&mut self, at: u64, target: u64) {
        let ins = self.code[at as usize];
        self.code[at as usize] = Instruction::new(ins.opcode(), target as u16, ins.b(), ins.c());
    }

    /// Finalizes this handler: computes its stack size and appends it to the owning program.
    pub fn finish(self) -> usize {
        let stack_size = compute_stack_size(&self.code, &self.program.natives);
        self.program.handlers.push(CodeBlock { name: self.name, code: self.code, stack_size });
        self.program.handlers.len() - 1
    }
}
