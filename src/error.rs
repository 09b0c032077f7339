//! Error types of every pipeline stage, and the crate-level [`Error`] they convert into.

use std::fmt;

/// Syntax errors in arithmetic/boolean expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    Empty,
    InvalidCharacter(char),
    UnmatchedParenthesis,
    /// Two operands or two binary operators with nothing between them.
    Adjacent(String),
    UnknownIdentifier(String),
    /// Integer literal outside of the 16-bit range.
    BadLiteral(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::Empty => write!(f, "empty expression"),
            ExprError::InvalidCharacter(c) => write!(f, "invalid character '{}'", c),
            ExprError::UnmatchedParenthesis => write!(f, "unmatched parenthesis"),
            ExprError::Adjacent(token) => write!(f, "missing operator or operand near '{}'", token),
            ExprError::UnknownIdentifier(name) => write!(f, "unknown identifier '{}'", name),
            ExprError::BadLiteral(text) => write!(f, "integer literal '{}' does not fit in 16 bits", text),
        }
    }
}

impl std::error::Error for ExprError {}

/// Failures while evaluating a postfix expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The variable has no concrete value in the binding.
    Unbound(String),
    DivisionByZero,
    StackUnderflow,
    TypeMismatch(String),
    /// The expression did not reduce to exactly one value.
    Leftover(usize),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Unbound(name) => write!(f, "variable '{}' has no concrete value", name),
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::StackUnderflow => write!(f, "not enough operands"),
            EvalError::TypeMismatch(op) => write!(f, "operand of wrong type for '{}'", op),
            EvalError::Leftover(n) => write!(f, "expression reduced to {} values", n),
        }
    }
}

impl std::error::Error for EvalError {}

/// Errors in the program text and in its control-flow structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    ForbiddenName(String),
    DuplicateVariable(String),
    UnexpectedOpenBrace,
    UnexpectedCloseBrace,
    ElseWithoutIf,
    /// `if`, `else` or `while` not followed by `{`.
    MissingBrace(String),
    /// The block opened after the given header is never closed.
    UnclosedBlock(String),
    MalformedStatement(String),
    UndeclaredVariable(String),
    /// The expression or condition references something that is neither a variable nor a literal.
    UnknownIdentifier(String),
    Expr { text: String, source: ExprError },
    /// The program counter is 8 bits wide.
    TooManyStatements(usize),
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::ForbiddenName(name) => write!(f, "forbidden variable name '{}'", name),
            ProgramError::DuplicateVariable(name) => write!(f, "variable '{}' declared twice", name),
            ProgramError::UnexpectedOpenBrace => write!(f, "unsuitable open bracket ({{)"),
            ProgramError::UnexpectedCloseBrace => write!(f, "unsuitable close bracket (}})"),
            ProgramError::ElseWithoutIf => write!(f, "else without if"),
            ProgramError::MissingBrace(header) => write!(f, "there is no '{{' after '{}'", header),
            ProgramError::UnclosedBlock(header) => write!(f, "block after '{}' is never closed", header),
            ProgramError::MalformedStatement(text) => write!(f, "malformed statement '{}'", text),
            ProgramError::UndeclaredVariable(name) => write!(f, "there is no '{}' variable", name),
            ProgramError::UnknownIdentifier(text) => write!(f, "unknown identifier in '{}'", text),
            ProgramError::Expr { text, source } => write!(f, "in '{}': {}", text, source),
            ProgramError::TooManyStatements(n) => {
                write!(f, "{} program locations do not fit in the 8-bit program counter", n)
            }
        }
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProgramError::Expr { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures of the Kripke-structure translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// The first program location is not a statement.
    EmptyProgram,
    /// An assignment or a branch condition could not be evaluated.
    Unresolved { pc: usize, text: String, source: EvalError },
    /// A condition evaluated to an integer.
    NotBoolean { text: String },
    /// An assignment evaluated to a boolean.
    NotInteger { pc: usize, text: String },
    Predicate { text: String, source: ExprError },
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::EmptyProgram => write!(f, "empty program"),
            TranslateError::Unresolved { pc, text, source } => {
                write!(f, "cannot evaluate '{}' at pc {}: {}", text, pc, source)
            }
            TranslateError::NotBoolean { text } => write!(f, "'{}' is not a condition", text),
            TranslateError::NotInteger { pc, text } => {
                write!(f, "'{}' at pc {} is not an integer expression", text, pc)
            }
            TranslateError::Predicate { text, source } => {
                write!(f, "bad atomic predicate '{}': {}", text, source)
            }
        }
    }
}

impl std::error::Error for TranslateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TranslateError::Unresolved { source, .. } => Some(source),
            TranslateError::Predicate { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// CTL formula syntax and evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtlError {
    Empty,
    InvalidCharacter(char),
    /// Tokens that cannot follow each other, e.g. `)(` or `1A`.
    Syntax(String),
    UnmatchedParenthesis,
    UnknownKeyword(String),
    StackUnderflow(String),
    OperandOutOfRange { index: usize, count: usize },
    /// The formula did not reduce to exactly one set of states.
    Leftover(usize),
}

impl fmt::Display for CtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtlError::Empty => write!(f, "empty formula"),
            CtlError::InvalidCharacter(c) => write!(f, "invalid character '{}' in formula", c),
            CtlError::Syntax(near) => write!(f, "malformed formula near '{}'", near),
            CtlError::UnmatchedParenthesis => write!(f, "unmatched parenthesis in formula"),
            CtlError::UnknownKeyword(word) => write!(f, "unknown keyword '{}'", word),
            CtlError::StackUnderflow(op) => write!(f, "missing operand for {}", op),
            CtlError::OperandOutOfRange { index, count } => {
                write!(f, "atomic predicate {} does not exist (have {})", index, count)
            }
            CtlError::Leftover(n) => write!(f, "formula reduced to {} values", n),
        }
    }
}

impl std::error::Error for CtlError {}

/// Usage errors of the verifier and malformed counterexample serializations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Counterexamples were requested before a verdict was computed.
    NoVerdict,
    InvalidExampleCount(i32),
    Decode(String),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::NoVerdict => {
                write!(f, "there was no verification, but counterexamples have been requested")
            }
            VerifyError::InvalidExampleCount(n) => {
                write!(f, "invalid number of examples {} (expected -1 or 1..=1000)", n)
            }
            VerifyError::Decode(msg) => write!(f, "malformed cube serialization: {}", msg),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Any failure of a verification session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Program(ProgramError),
    Translate(TranslateError),
    Ctl(CtlError),
    Verify(VerifyError),
}

impl From<ProgramError> for Error {
    fn from(e: ProgramError) -> Self {
        Error::Program(e)
    }
}

impl From<TranslateError> for Error {
    fn from(e: TranslateError) -> Self {
        Error::Translate(e)
    }
}

impl From<CtlError> for Error {
    fn from(e: CtlError) -> Self {
        Error::Ctl(e)
    }
}

impl From<VerifyError> for Error {
    fn from(e: VerifyError) -> Self {
        Error::Verify(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Program(e) => write!(f, "Program error: {}", e),
            Error::Translate(e) => write!(f, "Translation error: {}", e),
            Error::Ctl(e) => write!(f, "Formula error: {}", e),
            Error::Verify(e) => write!(f, "Verification error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Program(e) => Some(e),
            Error::Translate(e) => Some(e),
            Error::Ctl(e) => Some(e),
            Error::Verify(e) => Some(e),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
