//! Program text normalization: variable declarations and the flat statement list.

use std::fmt;

use log::debug;

use crate::error::ProgramError;

/// Names that cannot be declared as variables.
pub const RESERVED: [&str; 5] = ["if", "else", "while", "read", "int"];

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VarKind {
    /// 16-bit signed, two's complement.
    Integer,
    /// 8-bit unsigned statement address.
    ProgramCounter,
}

impl VarKind {
    pub const fn width(self) -> usize {
        match self {
            VarKind::Integer => 16,
            VarKind::ProgramCounter => 8,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Variable {
    name: String,
    kind: VarKind,
}

impl Variable {
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Integer,
        }
    }

    pub fn program_counter() -> Self {
        Self {
            name: "pc".to_string(),
            kind: VarKind::ProgramCounter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.kind.width()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Whether `s` is `[a-zA-Z][a-zA-Z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Declared variables and the statements of a program, in source order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Program {
    pub variables: Vec<Variable>,
    pub statements: Vec<String>,
}

impl Program {
    /// Split raw program text into declarations and statements.
    ///
    /// Braces become statements of their own, `//` comments are dropped,
    /// and whitespace other than plain spaces is removed from each statement.
    pub fn parse(text: &str) -> Result<Self, ProgramError> {
        let source = text
            .lines()
            .map(|line| match line.find("//") {
                Some(i) => &line[..i],
                None => line,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let source = source.replace('{', ";{;").replace('}', ";};");

        let mut pieces: Vec<&str> = source.split(';').collect();
        while pieces.last().is_some_and(|p| p.is_empty()) {
            pieces.pop();
        }

        let mut program = Program::default();
        for piece in pieces {
            let piece = piece.trim();
            if let Some(name) = declared_name(piece) {
                if RESERVED.contains(&name) {
                    return Err(ProgramError::ForbiddenName(name.to_string()));
                }
                if program.variables.iter().any(|v| v.name() == name) {
                    return Err(ProgramError::DuplicateVariable(name.to_string()));
                }
                program.variables.push(Variable::integer(name));
            } else {
                let statement: String = piece.chars().filter(|&c| c == ' ' || !c.is_whitespace()).collect();
                program.statements.push(statement.trim().to_string());
            }
        }

        debug!(
            "Parsed program: {} variables, {} statements",
            program.variables.len(),
            program.statements.len()
        );
        Ok(program)
    }
}

/// The name in `int <name>`, if `piece` is a declaration.
fn declared_name(piece: &str) -> Option<&str> {
    let rest = piece.strip_prefix("int ")?;
    let name = rest.trim_start_matches(' ');
    is_identifier(name).then_some(name)
}
