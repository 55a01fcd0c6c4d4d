//! # client-classification
//!
//! Parses and evaluates client class `test` expressions, e.g.
//!
//! ```text
//! not member('reserved_class')
//! substring(pkt.mac, 0, 3) == 0x001122 and pkt.iface == 'eth0'
//! ```
//!
//! Expressions are evaluated against [`Args`], the facts known about a client
//! for the current request plus the classes it is already a member of.
use std::collections::HashSet;

use thiserror::Error;

pub mod ast;

pub use ast::{Val, eval, parse};

/// every client is a member of this class
pub const ALL_CLASS: &str = "ALL";
/// client has a host reservation
pub const KNOWN_CLASS: &str = "KNOWN";
/// client has no host reservation
pub const UNKNOWN_CLASS: &str = "UNKNOWN";

/// true for classes the evaluator defines itself
pub fn is_builtin(name: &str) -> bool {
    matches!(name, ALL_CLASS | KNOWN_CLASS | UNKNOWN_CLASS)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    String(String),
    Hex(Vec<u8>),
    Int(u32),
    Bool(bool),
    Member(String),
    Field(Field),
    // operation
    Substring(Box<Expr>, usize, Option<usize>),
    // prefix
    Not(Box<Expr>),
    // infix
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    NEqual(Box<Expr>, Box<Expr>),
}

/// client facts an expression can read
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Mac,
    ClientId,
    Duid,
    Iface,
    CircuitId,
}

/// Values available to an expression. `member` holds every class already
/// matched, evaluation order makes sure dependencies are present.
#[derive(Debug, Clone, Default)]
pub struct Args<'a> {
    pub mac: Option<&'a [u8]>,
    pub client_id: Option<&'a [u8]>,
    pub duid: Option<&'a [u8]>,
    pub circuit_id: Option<&'a [u8]>,
    pub iface: Option<&'a str>,
    pub member: HashSet<String>,
}

/// names of all classes referenced by `member(...)` in the expression
pub fn get_class_dependencies(expr: &Expr) -> Vec<String> {
    fn walk(expr: &Expr, deps: &mut Vec<String>) {
        match expr {
            Expr::Member(name) => {
                if !deps.contains(name) {
                    deps.push(name.clone());
                }
            }
            Expr::Substring(e, _, _) | Expr::Not(e) => walk(e, deps),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Equal(a, b) | Expr::NEqual(a, b) => {
                walk(a, deps);
                walk(b, deps);
            }
            Expr::String(_)
            | Expr::Hex(_)
            | Expr::Int(_)
            | Expr::Bool(_)
            | Expr::Field(_) => {}
        }
    }
    let mut deps = Vec::new();
    walk(expr, &mut deps);
    deps
}

pub type ParseResult<T> = Result<T, ParseErr>;

#[derive(Error, Debug)]
pub enum ParseErr {
    #[error("int parse error")]
    Int(#[from] std::num::ParseIntError),
    #[error("hex parse error")]
    Hex(#[from] hex::FromHexError),
    #[error("bool parse error with: {0}")]
    Bool(String),
    #[error("undefined with: {0:?}")]
    Undefined(ast::Rule),
    #[error("malformed expression near: {0}")]
    Malformed(String),
    #[error("pest error {0}")]
    PestErr(#[from] Box<pest::error::Error<ast::Rule>>),
}

pub type EvalResult<T> = Result<T, EvalErr>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EvalErr {
    #[error("expected bool: got {0}")]
    ExpectedBool(Val),
    #[error("expected bytes: got {0}")]
    ExpectedBytes(Val),
    #[error("cannot compare {0} with {1}")]
    Incomparable(Val, Val),
}
