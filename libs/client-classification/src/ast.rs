use crate::{Args, EvalErr, EvalResult, Expr, Field, ParseErr, ParseResult};

pub use pest::{
    Parser,
    iterators::{Pair, Pairs},
    pratt_parser::{Assoc, Op, PrattParser},
};
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct PredicateParser;

/// parse a class test expression into an `Expr`
#[allow(clippy::result_large_err)]
pub fn parse<S: AsRef<str>>(expr: S) -> ParseResult<Expr> {
    let mut pairs = PredicateParser::parse(Rule::program, expr.as_ref()).map_err(Box::new)?;
    let expr = pairs
        .next()
        .ok_or_else(|| ParseErr::Malformed(expr.as_ref().to_owned()))?;
    build_ast(expr.into_inner())
}

#[allow(clippy::result_large_err)]
pub fn build_ast(pairs: Pairs<'_, Rule>) -> ParseResult<Expr> {
    let pratt = PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::equal, Assoc::Right) | Op::infix(Rule::neq, Assoc::Right))
        .op(Op::prefix(Rule::not));

    parse_expr(pairs, &pratt)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    Empty,
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Int(u32),
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Val {
    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Val::String(s) => Some(s.as_bytes()),
            Val::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn is_bool(val: Val) -> EvalResult<bool> {
    match val {
        Val::Bool(b) => Ok(b),
        err => Err(EvalErr::ExpectedBool(err)),
    }
}

fn opt_bytes(val: Option<&[u8]>) -> Val {
    match val {
        Some(b) => Val::Bytes(b.to_vec()),
        None => Val::Empty,
    }
}

/// evaluate the expression with the facts in `args`
pub fn eval(expr: &Expr, args: &Args<'_>) -> EvalResult<Val> {
    use Expr::*;
    Ok(match expr {
        Bool(b) => Val::Bool(*b),
        String(s) => Val::String(s.clone()),
        Hex(h) => Val::Bytes(h.clone()),
        Int(i) => Val::Int(*i),
        Member(name) => Val::Bool(args.member.contains(name)),
        Field(field) => match field {
            crate::Field::Mac => opt_bytes(args.mac),
            crate::Field::ClientId => opt_bytes(args.client_id),
            crate::Field::Duid => opt_bytes(args.duid),
            crate::Field::CircuitId => opt_bytes(args.circuit_id),
            crate::Field::Iface => match args.iface {
                Some(iface) => Val::String(iface.to_owned()),
                None => Val::Empty,
            },
        },
        Substring(lhs, start, len) => {
            let val = eval(lhs, args)?;
            let bytes = match &val {
                Val::Empty => return Ok(Val::Empty),
                other => other
                    .as_bytes()
                    .ok_or_else(|| EvalErr::ExpectedBytes(val.clone()))?,
            };
            let start = (*start).min(bytes.len());
            let end = match len {
                Some(len) => start.saturating_add(*len).min(bytes.len()),
                None => bytes.len(),
            };
            Val::Bytes(bytes[start..end].to_vec())
        }
        // prefix
        Not(rhs) => Val::Bool(!is_bool(eval(rhs, args)?)?),
        // infix
        And(lhs, rhs) => Val::Bool(is_bool(eval(lhs, args)?)? && is_bool(eval(rhs, args)?)?),
        Or(lhs, rhs) => Val::Bool(is_bool(eval(lhs, args)?)? || is_bool(eval(rhs, args)?)?),
        Equal(lhs, rhs) => Val::Bool(eval_eq(eval(lhs, args)?, eval(rhs, args)?)?),
        NEqual(lhs, rhs) => Val::Bool(!eval_eq(eval(lhs, args)?, eval(rhs, args)?)?),
    })
}

fn eval_eq(lhs: Val, rhs: Val) -> EvalResult<bool> {
    Ok(match (&lhs, &rhs) {
        (Val::Empty, Val::Empty) => true,
        // a missing field never equals a value
        (Val::Empty, _) | (_, Val::Empty) => false,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Int(a), Val::Int(b)) => a == b,
        // strings compare case-insensitively, bytes exactly
        (Val::String(a), Val::String(b)) => a.eq_ignore_ascii_case(b),
        _ => match (lhs.as_bytes(), rhs.as_bytes()) {
            (Some(a), Some(b)) => a == b,
            _ => return Err(EvalErr::Incomparable(lhs, rhs)),
        },
    })
}

fn unquote(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|inner| inner.as_str().to_owned())
        .unwrap_or_default()
}

#[allow(clippy::result_large_err)]
fn parse_expr(pairs: Pairs<'_, Rule>, pratt: &PrattParser<Rule>) -> ParseResult<Expr> {
    pratt
        .map_primary(|primary| {
            Ok(match primary.as_rule() {
                Rule::integer => Expr::Int(primary.as_str().parse()?),
                Rule::boolean => Expr::Bool(match primary.as_str() {
                    "true" => true,
                    "false" => false,
                    err => return Err(ParseErr::Bool(err.to_string())),
                }),
                Rule::pkt_mac => Expr::Field(Field::Mac),
                Rule::pkt_client_id => Expr::Field(Field::ClientId),
                Rule::pkt_duid => Expr::Field(Field::Duid),
                Rule::pkt_iface => Expr::Field(Field::Iface),
                Rule::relay_circuit_id => Expr::Field(Field::CircuitId),
                Rule::string => Expr::String(unquote(primary)),
                // trim off '0x'
                Rule::hex => Expr::Hex(hex::decode(&primary.as_str()[2..])?),
                Rule::member => {
                    let name = primary
                        .into_inner()
                        .next()
                        .map(unquote)
                        .ok_or_else(|| ParseErr::Malformed("member()".to_owned()))?;
                    Expr::Member(name)
                }
                Rule::substring => {
                    let text = primary.as_str().to_owned();
                    let mut inner = primary.into_inner();
                    let (Some(lhs), Some(start), Some(len)) =
                        (inner.next(), inner.next(), inner.next())
                    else {
                        return Err(ParseErr::Malformed(text));
                    };
                    let len = match len.as_rule() {
                        Rule::all => None,
                        _ => Some(len.as_str().parse()?),
                    };
                    Expr::Substring(
                        Box::new(parse_expr(lhs.into_inner(), pratt)?),
                        start.as_str().parse()?,
                        len,
                    )
                }
                Rule::expr => parse_expr(primary.into_inner(), pratt)?, // from "(" ~ expr ~ ")"
                rule => return Err(ParseErr::Undefined(rule)),
            })
        })
        .map_prefix(|op, rhs| {
            Ok(match op.as_rule() {
                Rule::not => Expr::Not(Box::new(rhs?)),
                rule => return Err(ParseErr::Undefined(rule)),
            })
        })
        .map_infix(|lhs, op, rhs| {
            Ok(match op.as_rule() {
                Rule::and => Expr::And(Box::new(lhs?), Box::new(rhs?)),
                Rule::or => Expr::Or(Box::new(lhs?), Box::new(rhs?)),
                Rule::equal => Expr::Equal(Box::new(lhs?), Box::new(rhs?)),
                Rule::neq => Expr::NEqual(Box::new(lhs?), Box::new(rhs?)),
                rule => return Err(ParseErr::Undefined(rule)),
            })
        })
        .parse(pairs)
}
