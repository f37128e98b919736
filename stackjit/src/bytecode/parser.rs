//! Bytecode Text Parser
//!
//! Parses the text form of a bytecode function using a pest PEG grammar.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::{Constant, Function, Instruction, Opcode};
use crate::error::{CompileError, Result};

#[derive(Parser)]
#[grammar = "../grammar/bytecode.pest"]
struct BytecodeParser;

/// Parse the text form of a bytecode function
pub fn parse(source: &str) -> Result<Function> {
    let mut pairs = BytecodeParser::parse(Rule::file, source).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        CompileError::Parse {
            line,
            column,
            message: e.variant.message().to_string(),
        }
    })?;

    let file = next_pair(&mut pairs, "file")?;
    let mut inner = file.into_inner();
    parse_function(next_pair(&mut inner, "function")?)
}

fn parse_function(pair: Pair<Rule>) -> Result<Function> {
    let mut inner = pair.into_inner();

    let functions = next_pair(&mut inner, "functions")?
        .into_inner()
        .map(parse_function)
        .collect::<Result<Vec<_>>>()?;
    let constants = next_pair(&mut inner, "constants")?
        .into_inner()
        .map(parse_constant)
        .collect::<Result<Vec<_>>>()?;
    let parameter_count = parse_number::<usize>(next_pair(&mut inner, "parameter_count")?)?;
    let local_vars = parse_idents(next_pair(&mut inner, "local_vars")?);
    let local_ref_vars = parse_idents(next_pair(&mut inner, "local_ref_vars")?);
    let free_vars = parse_idents(next_pair(&mut inner, "free_vars")?);
    let names = parse_idents(next_pair(&mut inner, "names")?);
    let instructions = next_pair(&mut inner, "instructions")?
        .into_inner()
        .map(parse_instruction)
        .collect::<Result<Vec<_>>>()?;

    Ok(Function {
        functions,
        constants,
        parameter_count,
        local_vars,
        local_ref_vars,
        free_vars,
        names,
        instructions,
    })
}

fn parse_constant(pair: Pair<Rule>) -> Result<Constant> {
    match pair.as_rule() {
        Rule::none => Ok(Constant::None),
        Rule::boolean => Ok(Constant::Boolean(pair.as_str() == "true")),
        Rule::integer => Ok(Constant::Integer(parse_number::<i64>(pair)?)),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Constant::String(unescape(raw)))
        }
        _ => Err(parse_error(&pair, "expected a constant")),
    }
}

fn parse_instruction(pair: Pair<Rule>) -> Result<Instruction> {
    let span = pair.clone();
    let mut inner = pair.into_inner();
    let mnemonic = next_pair(&mut inner, "mnemonic")?;
    let op: Opcode = mnemonic.as_str().parse()?;
    let operand = match inner.next() {
        Some(n) => Some(parse_number::<i32>(n)?),
        None => None,
    };
    if op.takes_operand() != operand.is_some() {
        let expectation = if op.takes_operand() {
            "expects an operand"
        } else {
            "takes no operand"
        };
        return Err(parse_error(&span, &format!("`{}` {}", op, expectation)));
    }
    Ok(Instruction { op, operand })
}

fn parse_idents(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner().map(|p| p.as_str().to_string()).collect()
}

fn parse_number<T: std::str::FromStr>(pair: Pair<Rule>) -> Result<T> {
    pair.as_str()
        .parse::<T>()
        .map_err(|_| parse_error(&pair, "number out of range"))
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>> {
    pairs.next().ok_or_else(|| CompileError::Parse {
        line: 0,
        column: 0,
        message: format!("missing {}", what),
    })
}

fn parse_error(pair: &Pair<Rule>, message: &str) -> CompileError {
    let (line, column) = pair.as_span().start_pos().line_col();
    CompileError::Parse {
        line,
        column,
        message: message.to_string(),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
