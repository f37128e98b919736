//! Compiler Error System
//!
//! One error type flows through every phase. Each variant belongs to one of
//! three classes:
//!
//! - **Internal**: a compiler defect (bad opcode, exhausted registers, an
//!   operand kind an instruction cannot take). Compilation stops.
//! - **User**: a statically provable illegal operation (cast or arithmetic),
//!   only raised when compile-time error reporting is enabled.
//! - **Input**: malformed bytecode text/JSON or a bad function path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compilation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("operand stack underflow at bytecode instruction {index} ({opcode})")]
    StackUnderflow { index: usize, opcode: String },

    #[error("{table} index {index} out of range")]
    BadIndex { table: &'static str, index: i64 },

    #[error("jump to undefined label {label}")]
    UnknownLabel { label: u32 },

    #[error("registers exhausted: {message}")]
    RegistersExhausted { message: String },

    #[error("helper call takes {count} arguments, at most {max} fit in registers")]
    InvalidNumArgs { count: usize, max: usize },

    #[error("unexpected operand {operand} in {context}")]
    UnexpectedOperand { operand: String, context: String },

    #[error("jump to {label} does not fit a {width}-bit displacement")]
    JumpOutOfRange { label: String, width: u8 },

    #[error("illegal cast: {message}")]
    IllegalCast { message: String },

    #[error("illegal arithmetic: {message}")]
    IllegalArithmetic { message: String },

    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid JSON bytecode: {message}")]
    Json { message: String },

    #[error("function path {path:?} does not name a nested function")]
    BadFunctionPath { path: Vec<usize> },

    #[error("invalid option: {message}")]
    InvalidOption { message: String },
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Error class, see the module docs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Internal,
    User,
    Input,
}

impl CompileError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        CompileError::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn unexpected_operand(operand: impl Into<String>, context: impl Into<String>) -> Self {
        CompileError::UnexpectedOperand {
            operand: operand.into(),
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::InvalidOperation { .. }
            | CompileError::StackUnderflow { .. }
            | CompileError::BadIndex { .. }
            | CompileError::UnknownLabel { .. }
            | CompileError::RegistersExhausted { .. }
            | CompileError::InvalidNumArgs { .. }
            | CompileError::UnexpectedOperand { .. }
            | CompileError::JumpOutOfRange { .. } => ErrorKind::Internal,
            CompileError::IllegalCast { .. } | CompileError::IllegalArithmetic { .. } => {
                ErrorKind::User
            }
            CompileError::Parse { .. }
            | CompileError::Json { .. }
            | CompileError::BadFunctionPath { .. }
            | CompileError::InvalidOption { .. } => ErrorKind::Input,
        }
    }

    /// Stable code string (e.g., "E100")
    pub fn code(&self) -> &'static str {
        match self {
            // Input errors
            CompileError::Parse { .. } => "E001",
            CompileError::Json { .. } => "E002",
            CompileError::BadFunctionPath { .. } => "E003",
            CompileError::InvalidOption { .. } => "E004",
            // Lowering
            CompileError::InvalidOperation { .. } => "E100",
            CompileError::StackUnderflow { .. } => "E101",
            CompileError::BadIndex { .. } => "E102",
            CompileError::UnknownLabel { .. } => "E103",
            // Allocation and code generation
            CompileError::RegistersExhausted { .. } => "E200",
            CompileError::InvalidNumArgs { .. } => "E201",
            CompileError::UnexpectedOperand { .. } => "E202",
            CompileError::JumpOutOfRange { .. } => "E203",
            // Static user errors
            CompileError::IllegalCast { .. } => "E300",
            CompileError::IllegalArithmetic { .. } => "E301",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.code().to_string(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for CompileError {
    fn from(e: serde_json::Error) -> Self {
        CompileError::Json {
            message: e.to_string(),
        }
    }
}

/// Machine-readable form of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl Diagnostic {
    /// Serialize to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            CompileError::invalid_operation("bad").kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            CompileError::IllegalArithmetic {
                message: "divide by zero".into()
            }
            .kind(),
            ErrorKind::User
        );
        assert_eq!(
            CompileError::BadFunctionPath { path: vec![3] }.kind(),
            ErrorKind::Input
        );
    }

    #[test]
    fn test_display_messages() {
        let err = CompileError::StackUnderflow {
            index: 4,
            opcode: "add".into(),
        };
        assert_eq!(
            err.to_string(),
            "operand stack underflow at bytecode instruction 4 (add)"
        );
        let err = CompileError::InvalidNumArgs { count: 5, max: 4 };
        assert!(err.to_string().contains("5 arguments"));
    }

    #[test]
    fn test_diagnostic_json() {
        let err = CompileError::IllegalCast {
            message: "value is not an int".into(),
        };
        let json = err.to_diagnostic().to_json();
        assert!(json.contains("\"code\":\"E300\""));
        assert!(json.contains("\"kind\":\"user\""));
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ErrorKind::User);
    }
}
