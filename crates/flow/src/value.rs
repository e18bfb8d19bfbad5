//! The uniform value model every Flow register holds.
//!
//! A register is conceptually a tagged 64-bit word; in this implementation it is a small
//! enum rather than a raw bit-pattern, trading the original's pointer-packing tricks for
//! a representation `rustc` can check. See [`crate::instr`] for how operands select among
//! constants, registers and immediates that eventually resolve to a `Value`.

use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// A string value: either borrowed from the program's constant pool (lives as long as the
/// program) or produced at run time and owned by the runner's garbage list (§3 "Flow Runner").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowString {
    Interned(Arc<str>),
    Owned(Arc<str>),
}

impl FlowString {
    pub fn as_str(&self) -> &str {
        match self {
            FlowString::Interned(s) | FlowString::Owned(s) => s,
        }
    }
}

impl std::fmt::Display for FlowString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One Flow register value. `Array` variants are homogeneous per §4.6.1.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(FlowString),
    Ip(IpAddr),
    Cidr(IpNet),
    /// Index into the program's compiled-regex table; the regex itself is not `PartialEq`.
    Regex(u16),
    /// Index into the program's handler table.
    Handler(u16),
    IntArray(Arc<[i64]>),
    StrArray(Arc<[FlowString]>),
    IpArray(Arc<[IpAddr]>),
    CidrArray(Arc<[IpNet]>),
    /// Absence of a meaningful value (registers start here).
    Void,
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Value::Ip(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_cidr(&self) -> Option<IpNet> {
        match self {
            Value::Cidr(c) => Some(*c),
            _ => None,
        }
    }

    /// Coarse type tag used by native-call signature verification at link time.
    pub fn type_tag(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
            Value::Str(_) => ValueType::Str,
            Value::Ip(_) => ValueType::Ip,
            Value::Cidr(_) => ValueType::Cidr,
            Value::Regex(_) => ValueType::Regex,
            Value::Handler(_) => ValueType::Handler,
            Value::IntArray(_) => ValueType::IntArray,
            Value::StrArray(_) => ValueType::StrArray,
            Value::IpArray(_) => ValueType::IpArray,
            Value::CidrArray(_) => ValueType::CidrArray,
            Value::Void => ValueType::Void,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Bool,
    Str,
    Ip,
    Cidr,
    Regex,
    Handler,
    IntArray,
    StrArray,
    IpArray,
    CidrArray,
    Void,
}
