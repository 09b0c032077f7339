//! Control-flow table: the program linearized into statements addressed by a program counter.
//!
//! Every entry records, per variable, what is known about it when the statement
//! is entered and when it is left. Structured statements reserve extra entries:
//!
//! ```text
//! if (c) { T } else { E }      while (c) { B }
//!
//! p      IF c; ELSE q          p      WHILE c; ELSE r+1
//! ...    T                     ...    B
//! q-1    IF p ENDS  -> r+1     r      WHILE p ENDS  -> p
//! q      ELSE p
//! ...    E
//! r      ELSE p ENDS
//! ```
//!
//! Any program counter outside of the table is the end of the program.

use std::fmt;

use log::{debug, error, trace};

use crate::error::{ExprError, ProgramError};
use crate::expr::Expr;
use crate::program::{is_identifier, Variable};

/// The largest number of table entries; one more address is kept for the end of the program.
pub const MAX_ENTRIES: usize = 255;

/// What the table knows about a variable at some point of the program.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum VariableState {
    Undefined,
    /// Read from the input.
    Defined,
    /// Different along the paths that join here.
    Fixed,
    /// Last assigned from this expression.
    Expr(String),
}

impl fmt::Display for VariableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableState::Undefined => write!(f, "UNDEFINED"),
            VariableState::Defined => write!(f, "DEFINED"),
            VariableState::Fixed => write!(f, "FIXED"),
            VariableState::Expr(text) => write!(f, "{}", text),
        }
    }
}

/// Which block an end-of-group entry closes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Group {
    Then,
    Else,
    While,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Kind {
    Read(usize),
    Assign(usize, Expr),
    If { cond: Expr, then_pc: usize, else_pc: usize },
    While { cond: Expr, body_pc: usize, exit_pc: usize },
    /// Start of the else block of the `if` at `header`.
    Else { header: usize },
    EndOfGroup { header: usize, group: Group },
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Read(var) => write!(f, "READ {}", var),
            Kind::Assign(var, _) => write!(f, "ASSIGN {}", var),
            Kind::If { cond, else_pc, .. } => write!(f, "IF {}; ELSE {}", cond, else_pc),
            Kind::While { cond, exit_pc, .. } => write!(f, "WHILE {}; ELSE {}", cond, exit_pc),
            Kind::Else { header } => write!(f, "ELSE {}", header),
            Kind::EndOfGroup { header, group } => {
                let name = match group {
                    Group::Then => "IF",
                    Group::Else => "ELSE",
                    Group::While => "WHILE",
                };
                write!(f, "{} {} ENDS", name, header)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableEntry {
    pub pc: usize,
    pub entering: Vec<VariableState>,
    pub leaving: Vec<VariableState>,
    /// Successor; for `if` and `while` headers this is the branch taken when the condition holds.
    pub next: usize,
    pub kind: Kind,
}

impl fmt::Display for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |states: &[VariableState]| {
            states.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "{} | {} | {} -> {} | {}",
            join(&self.entering),
            join(&self.leaving),
            self.pc,
            self.next,
            self.kind
        )
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ControlFlowTable {
    entries: Vec<TableEntry>,
}

impl ControlFlowTable {
    /// Build the table for normalized `statements` over the declared `variables`.
    pub fn build(statements: &[String], variables: &[Variable]) -> Result<Self, ProgramError> {
        let mut builder = Builder {
            statements,
            variables,
            entries: Vec::new(),
        };
        if let Err(e) = builder.block(0, statements.len()) {
            error!("Control-flow table construction failed: {}", e);
            return Err(e);
        }
        if builder.entries.len() > MAX_ENTRIES {
            return Err(ProgramError::TooManyStatements(builder.entries.len()));
        }
        debug!("Built control-flow table with {} entries", builder.entries.len());
        Ok(Self {
            entries: builder.entries,
        })
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn get(&self, pc: usize) -> Option<&TableEntry> {
        self.entries.get(pc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ControlFlowTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Statement<'a> {
    If(&'a str),
    While(&'a str),
    Else,
    Open,
    Close,
    Assign(&'a str, &'a str),
    Read(&'a str),
    Ignored,
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_expression_char(c: char) -> bool {
    is_word(c) || c.is_whitespace() || "()+-*/".contains(c)
}

fn is_condition_char(c: char) -> bool {
    is_expression_char(c) || "><!=|&".contains(c)
}

/// The parenthesized part of `keyword (...)`, without the outer parentheses.
fn header_condition<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    (!inner.is_empty() && inner.chars().all(is_condition_char)).then(|| inner.trim())
}

fn classify(s: &str) -> Result<Statement<'_>, ProgramError> {
    if let Some(cond) = header_condition(s, "if") {
        return Ok(Statement::If(cond));
    }
    if let Some(cond) = header_condition(s, "while") {
        return Ok(Statement::While(cond));
    }
    match s {
        "else" => return Ok(Statement::Else),
        "{" => return Ok(Statement::Open),
        "}" => return Ok(Statement::Close),
        _ => {}
    }
    if let Some((lhs, rhs)) = s.split_once('=') {
        let name = lhs.trim_end();
        if is_identifier(name) && !rhs.is_empty() && rhs.chars().all(is_expression_char) {
            return Ok(Statement::Assign(name, rhs.trim()));
        }
    }
    if let Some(rest) = s.strip_prefix("read") {
        let inner = rest.trim_start().strip_prefix('(').and_then(|r| r.strip_suffix(')'));
        if let Some(name) = inner.map(str::trim).filter(|name| is_identifier(name)) {
            return Ok(Statement::Read(name));
        }
    }
    if s.chars().all(is_expression_char) {
        return Ok(Statement::Ignored);
    }
    Err(ProgramError::MalformedStatement(s.to_string()))
}

struct Builder<'a> {
    statements: &'a [String],
    variables: &'a [Variable],
    entries: Vec<TableEntry>,
}

impl Builder<'_> {
    fn pc(&self) -> usize {
        self.entries.len()
    }

    /// Leaving descriptors of the last entry, or all `Undefined` at the start.
    fn current_states(&self) -> Vec<VariableState> {
        match self.entries.last() {
            Some(entry) => entry.leaving.clone(),
            None => vec![VariableState::Undefined; self.variables.len()],
        }
    }

    fn push(&mut self, entering: Vec<VariableState>, leaving: Vec<VariableState>, next: usize, kind: Kind) -> usize {
        let pc = self.pc();
        let entry = TableEntry {
            pc,
            entering,
            leaving,
            next,
            kind,
        };
        trace!("{}", entry);
        self.entries.push(entry);
        pc
    }

    /// Push an entry that leaves every variable as it entered.
    fn push_passing(&mut self, next: usize, kind: Kind) -> usize {
        let states = self.current_states();
        self.push(states.clone(), states, next, kind)
    }

    fn variable(&self, name: &str) -> Result<usize, ProgramError> {
        self.variables
            .iter()
            .position(|v| v.name() == name)
            .ok_or_else(|| ProgramError::UndeclaredVariable(name.to_string()))
    }

    fn compile(&self, text: &str) -> Result<Expr, ProgramError> {
        Expr::compile(text, self.variables).map_err(|e| match e {
            ExprError::UnknownIdentifier(_) => ProgramError::UnknownIdentifier(text.to_string()),
            source => ProgramError::Expr {
                text: text.to_string(),
                source,
            },
        })
    }

    /// Translate `statements[start..end]`.
    fn block(&mut self, start: usize, end: usize) -> Result<(), ProgramError> {
        let mut i = start;
        while i < end {
            match classify(&self.statements[i])? {
                Statement::Read(name) => self.read(name)?,
                Statement::Assign(name, rhs) => self.assign(name, rhs)?,
                Statement::If(cond) => {
                    i = self.if_else(i, cond)?;
                    continue;
                }
                Statement::While(cond) => {
                    i = self.while_loop(i, cond)?;
                    continue;
                }
                Statement::Open => return Err(ProgramError::UnexpectedOpenBrace),
                Statement::Close => return Err(ProgramError::UnexpectedCloseBrace),
                Statement::Else => return Err(ProgramError::ElseWithoutIf),
                Statement::Ignored => {}
            }
            i += 1;
        }
        Ok(())
    }

    fn read(&mut self, name: &str) -> Result<(), ProgramError> {
        let var = self.variable(name)?;
        let entering = self.current_states();
        let mut leaving = entering.clone();
        leaving[var] = VariableState::Defined;
        let next = self.pc() + 1;
        self.push(entering, leaving, next, Kind::Read(var));
        Ok(())
    }

    fn assign(&mut self, name: &str, rhs: &str) -> Result<(), ProgramError> {
        let var = self.variable(name)?;
        let expr = self.compile(rhs)?;
        let entering = self.current_states();
        let mut leaving = entering.clone();
        leaving[var] = VariableState::Expr(rhs.to_string());
        let next = self.pc() + 1;
        self.push(entering, leaving, next, Kind::Assign(var, expr));
        Ok(())
    }

    /// Find the braces of the block following the header at `header`.
    ///
    /// Returns the indices of the opening and the matching closing brace.
    fn find_block(&self, header: usize) -> Result<(usize, usize), ProgramError> {
        let header_text = &self.statements[header];
        let mut i = header + 1;
        while i < self.statements.len() && self.statements[i].is_empty() {
            i += 1;
        }
        if self.statements.get(i).map(String::as_str) != Some("{") {
            return Err(ProgramError::MissingBrace(header_text.clone()));
        }
        let open = i;
        let mut depth = 0usize;
        for (j, statement) in self.statements.iter().enumerate().skip(open) {
            match statement.as_str() {
                "{" => depth += 1,
                "}" => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((open, j));
                    }
                }
                _ => {}
            }
        }
        Err(ProgramError::UnclosedBlock(header_text.clone()))
    }

    fn if_else(&mut self, header: usize, cond: &str) -> Result<usize, ProgramError> {
        let cond = self.compile(cond)?;
        let (open, close) = self.find_block(header)?;

        let then_pc = self.pc() + 1;
        let header_pc = self.push_passing(
            then_pc,
            Kind::If {
                cond,
                then_pc,
                else_pc: 0,
            },
        );
        let header_states = self.entries[header_pc].leaving.clone();

        let mut after = close + 1;
        while after < self.statements.len() && self.statements[after].is_empty() {
            after += 1;
        }
        let has_else = self.statements.get(after).map(String::as_str) == Some("else");

        if has_else {
            let (else_open, else_close) = self.find_block(after)?;

            self.block(open + 1, close)?;
            let then_end = self.push_passing(0, Kind::EndOfGroup {
                header: header_pc,
                group: Group::Then,
            });

            let else_pc = self.pc();
            self.push(
                header_states.clone(),
                header_states,
                else_pc + 1,
                Kind::Else { header: header_pc },
            );
            self.set_else_pc(header_pc, else_pc);

            self.block(else_open + 1, else_close)?;
            let else_end = self.push_passing(self.pc() + 1, Kind::EndOfGroup {
                header: header_pc,
                group: Group::Else,
            });
            self.entries[then_end].next = else_end + 1;
            self.fix_both(then_end, else_end);

            Ok(else_close + 1)
        } else {
            self.block(open + 1, close)?;
            let then_end = self.push_passing(self.pc() + 1, Kind::EndOfGroup {
                header: header_pc,
                group: Group::Then,
            });
            self.set_else_pc(header_pc, then_end + 1);
            self.fix_last(header_pc, then_end);

            Ok(close + 1)
        }
    }

    fn while_loop(&mut self, header: usize, cond: &str) -> Result<usize, ProgramError> {
        let cond = self.compile(cond)?;
        let (open, close) = self.find_block(header)?;

        let body_pc = self.pc() + 1;
        let header_pc = self.push_passing(
            body_pc,
            Kind::While {
                cond,
                body_pc,
                exit_pc: 0,
            },
        );

        self.block(open + 1, close)?;
        let end = self.push_passing(header_pc, Kind::EndOfGroup {
            header: header_pc,
            group: Group::While,
        });
        if let Kind::While { exit_pc, .. } = &mut self.entries[header_pc].kind {
            *exit_pc = end + 1;
        }
        self.fix_last(header_pc, end);

        Ok(close + 1)
    }

    fn set_else_pc(&mut self, header: usize, pc: usize) {
        if let Kind::If { else_pc, .. } = &mut self.entries[header].kind {
            *else_pc = pc;
        }
    }

    /// Mark variables whose leaving state differs from `early` as `Fixed` in `late`.
    fn fix_last(&mut self, early: usize, late: usize) {
        for i in 0..self.variables.len() {
            if self.entries[early].leaving[i] != self.entries[late].leaving[i] {
                self.entries[late].leaving[i] = VariableState::Fixed;
            }
        }
    }

    /// Mark variables whose leaving states differ as `Fixed` in both entries.
    fn fix_both(&mut self, a: usize, b: usize) {
        for i in 0..self.variables.len() {
            if self.entries[a].leaving[i] != self.entries[b].leaving[i] {
                self.entries[a].leaving[i] = VariableState::Fixed;
                self.entries[b].leaving[i] = VariableState::Fixed;
            }
        }
    }
}
