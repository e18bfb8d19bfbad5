//! The per-invocation interpreter (§4.6.6 "Runner", §3 "Flow Runner").
//!
//! A [`Runner`] owns a register array sized to its handler's statically computed stack need
//! (§4.6.3), a program counter, and a garbage list of runtime-produced strings. `step` decodes
//! and executes exactly one instruction; `run` loops `step` until the handler exits or a native
//! call suspends execution (§9: "model the interpreter loop as a function that returns either
//! finished or suspended"). There is only one dispatch strategy — a `match` over `Opcode` — since
//! direct-threaded computed-goto dispatch has no stable Rust analog (see `DESIGN.md`).

use crate::error::RunError;
use crate::instr::Opcode;
use crate::runtime::{LinkedProgram, NativeOutcome};
use crate::value::{FlowString, Value};
use std::sync::Arc;

/// What the runner is doing right now (§3: "inactive/running/suspended").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Inactive,
    Running,
    Suspended,
}

/// Result of running (or resuming) a handler to either completion or the next suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The handler reached an `Exit` instruction with this verdict ("handled the request").
    Finished(bool),
    /// A native call suspended the runner; resume with [`Runner::resume`] once the awaited value
    /// is ready, passing the token back so the runner can validate it matches its current wait.
    Suspended(ResumeToken),
}

/// Opaque handle identifying exactly which suspended call a later `resume` completes. Holding a
/// stale or foreign token and calling `resume` is rejected rather than silently corrupting a
/// register (§9: "the resume-token is held by whichever native call suspended").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeToken {
    pc: u64,
    dest_reg: u16,
}

/// A single handler invocation's execution context.
pub struct Runner<'p> {
    program: &'p LinkedProgram,
    handler_index: usize,
    registers: Vec<Value>,
    pc: u64,
    garbage: Vec<Arc<str>>,
    state: RunState,
    pending: Option<ResumeToken>,
}

impl<'p> Runner<'p> {
    /// Creates a fresh runner for `program`'s handler named `handler`, with a register array
    /// sized to its computed stack need and all registers initialized to `Value::Void`.
    pub fn new(program: &'p LinkedProgram, handler: &str) -> Option<Self> {
        let handler_index = program.handler_index(handler)?;
        let stack_size = program.handlers[handler_index].stack_size as usize;
        Some(Self {
            program,
            handler_index,
            registers: vec![Value::Void; stack_size],
            pc: 0,
            garbage: Vec::new(),
            state: RunState::Inactive,
            pending: None,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Seeds an input register before the handler starts running (§3 "opaque user-data pointer
    /// (the Request, typically)" — the host embedding the VM binds whatever request fields a
    /// handler's entry-point convention expects into low registers this way, then calls [`run`](Runner::run)).
    /// Must be called before the first `run()`; the handler's own code decides which registers it
    /// expects populated this way (there is no separate calling convention beyond "the caller and
    /// the compiled handler agree on register numbers").
    pub fn set_arg(&mut self, reg: u16, value: Value) -> Result<(), RunError> {
        self.set_reg(reg, value)
    }

    /// Runs from the current PC until the handler exits or a native call suspends.
    pub fn run(&mut self) -> Result<RunOutcome, RunError> {
        self.state = RunState::Running;
        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Resumes a suspended runner, writing `value` into the register the suspending call was
    /// destined for, then continues execution.
    pub fn resume(&mut self, token: ResumeToken, value: Value) -> Result<RunOutcome, RunError> {
        if self.state != RunState::Suspended || self.pending != Some(token) {
            return Err(RunError::NotSuspended);
        }
        self.set_reg(token.dest_reg, value)?;
        self.pc = token.pc + 1;
        self.pending = None;
        self.run()
    }

    fn reg(&self, idx: u16) -> Result<&Value, RunError> {
        self.registers.get(idx as usize).ok_or(RunError::RegisterOutOfBounds { reg: idx, stack_size: self.registers.len() as u32 })
    }

    fn set_reg(&mut self, idx: u16, value: Value) -> Result<(), RunError> {
        let slot = self
            .registers
            .get_mut(idx as usize)
            .ok_or(RunError::RegisterOutOfBounds { reg: idx, stack_size: self.registers.len() as u32 })?;
        *slot = value;
        Ok(())
    }

    fn reg_int(&self, idx: u16) -> Result<i64, RunError> {
        self.reg(idx)?.as_int().ok_or_else(|| RunError::Type { context: format!("register {idx} is not an int") })
    }

    fn reg_bool(&self, idx: u16) -> Result<bool, RunError> {
        self.reg(idx)?.as_bool().ok_or_else(|| RunError::Type { context: format!("register {idx} is not a bool") })
    }

    fn reg_str(&self, idx: u16) -> Result<&str, RunError> {
        self.reg(idx)?.as_str().ok_or_else(|| RunError::Type { context: format!("register {idx} is not a string") })
    }

    /// Executes exactly one instruction. Returns `Some(outcome)` when the handler has finished or
    /// suspended, `None` to keep looping.
    fn step(&mut self) -> Result<Option<RunOutcome>, RunError> {
        let code = &self.program.handlers[self.handler_index].code;
        let ins = *code.get(self.pc as usize).ok_or_else(|| RunError::PcOutOfBounds {
            handler: self.program.handlers[self.handler_index].name.clone(),
            pc: self.pc,
            len: code.len(),
        })?;

        let mut next_pc = self.pc + 1;

        match ins.opcode() {
            Opcode::LoadConstInt => self.set_reg(ins.a(), Value::Int(self.program.ints[ins.b() as usize]))?,
            Opcode::LoadConstString => {
                self.set_reg(ins.a(), Value::Str(FlowString::Interned(self.program.strings[ins.b() as usize].clone())))?
            }
            Opcode::LoadConstIp => self.set_reg(ins.a(), Value::Ip(self.program.ips[ins.b() as usize]))?,
            Opcode::LoadConstCidr => self.set_reg(ins.a(), Value::Cidr(self.program.cidrs[ins.b() as usize]))?,
            Opcode::LoadRegex => self.set_reg(ins.a(), Value::Regex(ins.b()))?,
            Opcode::LoadHandlerRef => self.set_reg(ins.a(), Value::Handler(ins.b()))?,
            Opcode::Move => {
                let v = self.reg(ins.b())?.clone();
                self.set_reg(ins.a(), v)?;
            }

            Opcode::Add => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_add(self.reg_int(ins.c())?)))?,
            Opcode::Sub => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_sub(self.reg_int(ins.c())?)))?,
            Opcode::Mul => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_mul(self.reg_int(ins.c())?)))?,
            Opcode::Div => {
                let divisor = self.reg_int(ins.c())?;
                if divisor == 0 {
                    return Err(RunError::DivisionByZero);
                }
                self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_div(divisor)))?;
            }
            Opcode::Mod => {
                let divisor = self.reg_int(ins.c())?;
                if divisor == 0 {
                    return Err(RunError::DivisionByZero);
                }
                self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_rem(divisor)))?;
            }
            Opcode::Neg => self.set_reg(ins.a(), Value::Int(-self.reg_int(ins.b())?))?,
            Opcode::BitAnd => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())? & self.reg_int(ins.c())?))?,
            Opcode::BitOr => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())? | self.reg_int(ins.c())?))?,
            Opcode::BitXor => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())? ^ self.reg_int(ins.c())?))?,
            Opcode::BitNot => self.set_reg(ins.a(), Value::Int(!self.reg_int(ins.b())?))?,
            Opcode::Shl => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_shl(self.reg_int(ins.c())? as u32)))?,
            Opcode::Shr => self.set_reg(ins.a(), Value::Int(self.reg_int(ins.b())?.wrapping_shr(self.reg_int(ins.c())? as u32)))?,

            Opcode::Eq => self.set_reg(ins.a(), Value::Bool(self.values_eq(ins.b(), ins.c())?))?,
            Opcode::Ne => self.set_reg(ins.a(), Value::Bool(!self.values_eq(ins.b(), ins.c())?))?,
            Opcode::Lt => self.set_reg(ins.a(), Value::Bool(self.reg_int(ins.b())? < self.reg_int(ins.c())?))?,
            Opcode::Le => self.set_reg(ins.a(), Value::Bool(self.reg_int(ins.b())? <= self.reg_int(ins.c())?))?,
            Opcode::Gt => self.set_reg(ins.a(), Value::Bool(self.reg_int(ins.b())? > self.reg_int(ins.c())?))?,
            Opcode::Ge => self.set_reg(ins.a(), Value::Bool(self.reg_int(ins.b())? >= self.reg_int(ins.c())?))?,
            Opcode::Contains => {
                self.set_reg(ins.a(), Value::Bool(self.reg_str(ins.b())?.contains(self.reg_str(ins.c())?)))?
            }
            Opcode::PrefixMatch => {
                self.set_reg(ins.a(), Value::Bool(self.reg_str(ins.b())?.starts_with(self.reg_str(ins.c())?)))?
            }
            Opcode::SuffixMatch => {
                self.set_reg(ins.a(), Value::Bool(self.reg_str(ins.b())?.ends_with(self.reg_str(ins.c())?)))?
            }
            Opcode::RegexMatch => {
                let subject = self.reg_str(ins.b())?;
                let regex = &self.program.regexes[ins.c() as usize];
                self.set_reg(ins.a(), Value::Bool(regex.is_match(subject)))?;
            }

            Opcode::IpEqual => {
                let lhs = self.reg(ins.b())?.as_ip().ok_or_else(|| RunError::Type { context: "IpEqual lhs not an ip".into() })?;
                let rhs = self.reg(ins.c())?.as_ip().ok_or_else(|| RunError::Type { context: "IpEqual rhs not an ip".into() })?;
                self.set_reg(ins.a(), Value::Bool(lhs == rhs))?;
            }
            Opcode::IpInCidr => {
                let ip = self.reg(ins.b())?.as_ip().ok_or_else(|| RunError::Type { context: "IpInCidr lhs not an ip".into() })?;
                let cidr =
                    self.reg(ins.c())?.as_cidr().ok_or_else(|| RunError::Type { context: "IpInCidr rhs not a cidr".into() })?;
                self.set_reg(ins.a(), Value::Bool(cidr.contains(&ip)))?;
            }
            Opcode::CidrEqual => {
                let lhs = self.reg(ins.b())?.as_cidr().ok_or_else(|| RunError::Type { context: "CidrEqual lhs not a cidr".into() })?;
                let rhs = self.reg(ins.c())?.as_cidr().ok_or_else(|| RunError::Type { context: "CidrEqual rhs not a cidr".into() })?;
                self.set_reg(ins.a(), Value::Bool(lhs == rhs))?;
            }

            Opcode::Jump => next_pc = ins.target(),
            Opcode::JumpIfTrue => {
                if self.reg_bool(ins.b())? {
                    next_pc = ins.target();
                }
            }
            Opcode::JumpIfFalse => {
                if !self.reg_bool(ins.b())? {
                    next_pc = ins.target();
                }
            }
            Opcode::Exit => {
                let verdict = self.reg_bool(ins.a())?;
                return Ok(Some(RunOutcome::Finished(verdict)));
            }

            Opcode::NativeFunctionCall | Opcode::NativeHandlerCall => {
                let native_idx = ins.a() as usize;
                let dest_reg = ins.b();
                let arg_base = ins.c();
                let argc = self.program.native_arg_counts[native_idx];
                let args: Vec<Value> = (0..argc as u16).map(|i| self.reg(arg_base + i).cloned()).collect::<Result<_, _>>()?;

                match (self.program.natives[native_idx])(&args) {
                    NativeOutcome::Ready(value) => {
                        if let Value::Str(FlowString::Owned(s)) = &value {
                            self.garbage.push(s.clone());
                        }
                        self.set_reg(dest_reg, value)?;
                    }
                    NativeOutcome::Suspend => {
                        let token = ResumeToken { pc: self.pc, dest_reg };
                        self.pending = Some(token);
                        self.state = RunState::Suspended;
                        return Ok(Some(RunOutcome::Suspended(token)));
                    }
                }
            }

            Opcode::MatchSame | Opcode::MatchHead | Opcode::MatchTail | Opcode::MatchRegex => {
                let table_idx = ins.a() as usize;
                let subject = self.reg_str(ins.b())?;
                next_pc = self.program.match_tables[table_idx].evaluate(subject);
            }
        }

        self.pc = next_pc;
        Ok(None)
    }

    fn values_eq(&self, b: u16, c: u16) -> Result<bool, RunError> {
        let lhs = self.reg(b)?;
        let rhs = self.reg(c)?;
        match (lhs, rhs) {
            (Value::Int(x), Value::Int(y)) => Ok(x == y),
            (Value::Str(x), Value::Str(y)) => Ok(x.as_str() == y.as_str()),
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            _ => Err(RunError::Type { context: "Eq/Ne operands are not comparable types".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::match_table::MatchCase;
    use crate::program::MatchKind;
    use crate::runtime::Runtime;
    use crate::value::ValueType;

    #[test]
    fn runs_arithmetic_to_exit() {
        let mut b = ProgramBuilder::new();
        let two = b.intern_int(2);
        let three = b.intern_int(3);
        let mut h = b.handler("main");
        h.emit(Opcode::LoadConstInt, 0, two, 0);
        h.emit(Opcode::LoadConstInt, 1, three, 0);
        h.emit(Opcode::Add, 2, 0, 1);
        h.emit(Opcode::Eq, 3, 2, 2);
        h.emit(Opcode::Exit, 3, 0, 0);
        h.finish();
        let program = b.build();
        let linked = Runtime::new().link(program).unwrap();

        let mut runner = Runner::new(&linked, "main").unwrap();
        assert_eq!(runner.run().unwrap(), RunOutcome::Finished(true));
    }

    /// Drives the exact `/api/v1/x`, `/index`, ``, `/apx` scenarios `match_table`'s own tests
    /// check, but through the full interpreter: load the subject, run a `MatchHead` table, land in
    /// one of two tiny blocks that set the verdict and exit.
    #[test]
    fn prefix_routing_matches_spec_scenario() {
        for (input, expect_handled) in [("/api/v1/x", true), ("/index", false), ("", false), ("/apx", false)] {
            let mut b = ProgramBuilder::new();
            let subject = b.intern_string(input);
            let handled = b.intern_int(1);
            let not_handled = b.intern_int(0);
            // the handled/not-handled blocks start right after the match instruction, at pc 2 and
            // pc 4 respectively; the table is interned against those fixed offsets up front.
            let table = b.intern_match_table(
                MatchKind::Head,
                vec![MatchCase { label: "/api/".into(), pc: 2 }, MatchCase { label: "/".into(), pc: 2 }],
                4,
            );
            let mut h = b.handler("main");
            h.emit(Opcode::LoadConstString, 0, subject, 0); // pc 0: load subject
            h.emit(Opcode::MatchHead, table, 0, 0); // pc 1: dispatch
            h.emit(Opcode::LoadConstInt, 1, handled, 0); // pc 2: handled block
            h.emit(Opcode::Exit, 1, 0, 0); // pc 3
            h.emit(Opcode::LoadConstInt, 1, not_handled, 0); // pc 4: not-handled block
            h.emit(Opcode::Exit, 1, 0, 0); // pc 5
            h.finish();

            let linked = Runtime::new().link(b.build()).unwrap();
            let mut runner = Runner::new(&linked, "main").unwrap();
            assert_eq!(runner.run().unwrap(), RunOutcome::Finished(expect_handled), "input {input:?}");
        }
    }

    #[test]
    fn suspends_and_resumes_native_call() {
        let mut b = ProgramBuilder::new();
        let native = b.intern_native("lookup", vec![ValueType::Int]);
        let one = b.intern_int(1);
        let mut h = b.handler("main");
        h.emit(Opcode::LoadConstInt, 0, one, 0);
        h.emit(Opcode::NativeFunctionCall, native, 1, 0);
        h.emit(Opcode::Exit, 1, 0, 0);
        h.finish();
        let program = b.build();

        let mut runtime = Runtime::new();
        runtime.register_native("lookup", vec![ValueType::Int], Arc::new(|_args| NativeOutcome::Suspend));
        let linked = runtime.link(program).unwrap();

        let mut runner = Runner::new(&linked, "main").unwrap();
        let token = match runner.run().unwrap() {
            RunOutcome::Suspended(token) => token,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert_eq!(runner.state(), RunState::Suspended);

        let outcome = runner.resume(token, Value::Bool(true)).unwrap();
        assert_eq!(outcome, RunOutcome::Finished(true));
    }

    #[test]
    fn resume_rejects_foreign_token() {
        let mut b = ProgramBuilder::new();
        let native = b.intern_native("lookup", vec![]);
        let mut h = b.handler("main");
        h.emit(Opcode::NativeFunctionCall, native, 0, 0);
        h.emit(Opcode::Exit, 0, 0, 0);
        h.finish();
        let mut runtime = Runtime::new();
        runtime.register_native("lookup", vec![], Arc::new(|_| NativeOutcome::Suspend));
        let linked = runtime.link(b.build()).unwrap();

        let mut runner = Runner::new(&linked, "main").unwrap();
        runner.run().unwrap();
        let bogus = ResumeToken { pc: 99, dest_reg: 0 };
        assert!(matches!(runner.resume(bogus, Value::Bool(true)), Err(RunError::NotSuspended)));
    }

    #[test]
    fn set_arg_seeds_a_register_before_run() {
        // register 0 is bound by the caller before run(); the handler checks it against a prefix.
        let mut b = ProgramBuilder::new();
        let needle = b.intern_string("/api/");
        let mut h = b.handler("main");
        h.emit(Opcode::LoadConstString, 1, needle, 0);
        h.emit(Opcode::PrefixMatch, 2, 0, 1);
        h.emit(Opcode::Exit, 2, 0, 0);
        h.finish();
        let linked = Runtime::new().link(b.build()).unwrap();

        let mut runner = Runner::new(&linked, "main").unwrap();
        runner.set_arg(0, Value::Str(FlowString::Owned("/api/v1/x".into()))).unwrap();
        assert_eq!(runner.run().unwrap(), RunOutcome::Finished(true));

        let mut runner = Runner::new(&linked, "main").unwrap();
        runner.set_arg(0, Value::Str(FlowString::Owned("/index".into()))).unwrap();
        assert_eq!(runner.run().unwrap(), RunOutcome::Finished(false));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut b = ProgramBuilder::new();
        let ten = b.intern_int(10);
        let zero = b.intern_int(0);
        let mut h = b.handler("main");
        h.emit(Opcode::LoadConstInt, 0, ten, 0);
        h.emit(Opcode::LoadConstInt, 1, zero, 0);
        h.emit(Opcode::Div, 2, 0, 1);
        h.emit(Opcode::Exit, 2, 0, 0);
        h.finish();
        let linked = Runtime::new().link(b.build()).unwrap();
        let mut runner = Runner::new(&linked, "main").unwrap();
        assert!(matches!(runner.run(), Err(RunError::DivisionByZero)));
    }
}
