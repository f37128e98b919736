//! Stack bytecode consumed by the backend.
//!
//! A [`Function`] is what the front-end's bytecode compiler produces for one
//! function: its instructions, constants, slot tables and nested functions.
//! It can be read from the text format ([`parser`]) or from JSON.

pub mod parser;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

pub use parser::parse;

/// Literal constant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Constant {
    None,
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Integer(n) => write!(f, "{}", n),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Boolean(b) => write!(f, "{}", b),
        }
    }
}

macro_rules! opcodes {
    ($($variant:ident => $mnemonic:literal,)*) => {
        /// Bytecode operation
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }
        }

        impl FromStr for Opcode {
            type Err = CompileError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($mnemonic => Ok(Opcode::$variant),)*
                    other => Err(CompileError::invalid_operation(format!(
                        "unrecognized opcode `{}`",
                        other
                    ))),
                }
            }
        }
    };
}

opcodes! {
    LoadConst => "load_const",
    LoadFunc => "load_func",
    LoadLocal => "load_local",
    StoreLocal => "store_local",
    LoadGlobal => "load_global",
    StoreGlobal => "store_global",
    PushReference => "push_ref",
    LoadReference => "load_ref",
    StoreReference => "store_ref",
    AllocRecord => "alloc_record",
    FieldLoad => "field_load",
    FieldStore => "field_store",
    IndexLoad => "index_load",
    IndexStore => "index_store",
    AllocClosure => "alloc_closure",
    Call => "call",
    Return => "return",
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    Div => "div",
    Neg => "neg",
    Gt => "gt",
    Geq => "geq",
    Eq => "eq",
    And => "and",
    Or => "or",
    Not => "not",
    Label => "label",
    Goto => "goto",
    If => "if",
    Dup => "dup",
    Swap => "swap",
    Pop => "pop",
    GarbageCollect => "gc",
    ThrowUninitialized => "throw_uninitialized",
}

impl Opcode {
    /// Whether the opcode carries an integer operand
    pub fn takes_operand(self) -> bool {
        matches!(
            self,
            Opcode::LoadConst
                | Opcode::LoadFunc
                | Opcode::LoadLocal
                | Opcode::StoreLocal
                | Opcode::LoadGlobal
                | Opcode::StoreGlobal
                | Opcode::PushReference
                | Opcode::LoadReference
                | Opcode::StoreReference
                | Opcode::FieldLoad
                | Opcode::FieldStore
                | Opcode::AllocClosure
                | Opcode::Call
                | Opcode::Label
                | Opcode::Goto
                | Opcode::If
                | Opcode::ThrowUninitialized
        )
    }
}

impl TryFrom<String> for Opcode {
    type Error = CompileError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Opcode> for String {
    fn from(op: Opcode) -> Self {
        op.mnemonic().to_string()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// One bytecode instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<i32>,
}

impl Instruction {
    pub fn new(op: Opcode) -> Self {
        Self { op, operand: None }
    }

    pub fn with_operand(op: Opcode, operand: i32) -> Self {
        Self {
            op,
            operand: Some(operand),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(n) => write!(f, "{} {}", self.op, n),
            None => write!(f, "{}", self.op),
        }
    }
}

/// A bytecode function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    pub functions: Vec<Function>,
    pub constants: Vec<Constant>,
    pub parameter_count: usize,
    pub local_vars: Vec<String>,
    pub local_ref_vars: Vec<String>,
    pub free_vars: Vec<String>,
    pub names: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl Function {
    /// Parse a function from its JSON encoding
    pub fn from_json(text: &str) -> Result<Function> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Follow `path` down the nested-function tree
    pub fn select(&self, path: &[usize]) -> Result<&Function> {
        let mut current = self;
        for &index in path {
            current = current
                .functions
                .get(index)
                .ok_or_else(|| CompileError::BadFunctionPath {
                    path: path.to_vec(),
                })?;
        }
        Ok(current)
    }

    /// Number of closure-reference slots (local refs, then free variables)
    pub fn reference_count(&self) -> usize {
        self.local_ref_vars.len() + self.free_vars.len()
    }

    /// Name of reference slot `index`
    pub fn reference_name(&self, index: usize) -> Option<&str> {
        self.local_ref_vars
            .iter()
            .chain(self.free_vars.iter())
            .nth(index)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_mnemonics_round_trip() {
        for &op in Opcode::ALL {
            assert_eq!(op.mnemonic().parse::<Opcode>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_opcode_is_internal_error() {
        let err = "jump_table".parse::<Opcode>().unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_json_function() {
        let json = r#"{
            "constants": [{"type": "integer", "value": 3}, {"type": "none"}],
            "local_vars": ["x"],
            "instructions": [
                {"op": "load_const", "operand": 0},
                {"op": "return"}
            ]
        }"#;
        let func = Function::from_json(json).unwrap();
        assert_eq!(func.constants[0], Constant::Integer(3));
        assert_eq!(func.constants[1], Constant::None);
        assert_eq!(func.instructions[1], Instruction::new(Opcode::Return));
        assert_eq!(func.parameter_count, 0);
    }

    #[test]
    fn test_json_rejects_unknown_opcode() {
        let err = Function::from_json(r#"{"instructions": [{"op": "frobnicate"}]}"#).unwrap_err();
        assert!(matches!(err, CompileError::Json { .. }));
    }

    #[test]
    fn test_select_nested_function() {
        let inner = Function {
            parameter_count: 2,
            ..Function::default()
        };
        let outer = Function {
            functions: vec![Function::default(), inner],
            ..Function::default()
        };
        assert_eq!(outer.select(&[1]).unwrap().parameter_count, 2);
        assert!(outer.select(&[]).is_ok());
        assert!(matches!(
            outer.select(&[1, 0]),
            Err(CompileError::BadFunctionPath { .. })
        ));
    }

    #[test]
    fn test_reference_slots_span_local_and_free() {
        let func = Function {
            local_ref_vars: vec!["a".into()],
            free_vars: vec!["b".into(), "c".into()],
            ..Function::default()
        };
        assert_eq!(func.reference_count(), 3);
        assert_eq!(func.reference_name(0), Some("a"));
        assert_eq!(func.reference_name(2), Some("c"));
        assert_eq!(func.reference_name(3), None);
    }
}
