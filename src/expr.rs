//! Arithmetic and boolean expressions over program variables.
//!
//! [`Expr::compile`] turns infix text into a postfix token sequence with an
//! operator-precedence parser; [`Expr::evaluate`] runs that sequence against a
//! partial binding of variables to 16-bit values.
//!
//! Precedence, from lowest to highest:
//!
//! ```text
//! ||
//! &&
//! == != < <= > >=
//! + -
//! * /
//! unary - and !    (right-associative)
//! ```

use std::fmt;

use log::trace;

use crate::error::{EvalError, ExprError};
use crate::program::Variable;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Not,
    Neg,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => 3,
            Op::Add | Op::Sub => 4,
            Op::Mul | Op::Div => 5,
            Op::Not | Op::Neg => 6,
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, Op::Not | Op::Neg)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Or => "||",
            Op::And => "&&",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Not => "!",
            Op::Neg => "U-",
        }
    }
}

/// Element of a compiled postfix expression.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Token {
    Num(i16),
    /// Declared variable: position in the declaration list and its name.
    Var(usize, String),
    Op(Op),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", n),
            Token::Var(_, name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op.symbol()),
        }
    }
}

/// Result of an evaluation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Value {
    Int(i16),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Lexical class of the previously read token, used to classify `-`/`!`
/// and to reject missing operands or operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Prev {
    Start,
    Operand,
    Binary,
    Unary,
    Open,
    Close,
}

impl Prev {
    fn expects_operand(self) -> bool {
        matches!(self, Prev::Start | Prev::Binary | Prev::Unary | Prev::Open)
    }
}

enum StackItem {
    Op(Op),
    Open,
}

/// A compiled expression: the source text and its postfix form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Expr {
    text: String,
    postfix: Vec<Token>,
}

impl Expr {
    /// Compile `text`, resolving identifiers against `variables`.
    pub fn compile(text: &str, variables: &[Variable]) -> Result<Self, ExprError> {
        let postfix = to_postfix(text, variables)?;
        trace!("compiled '{}' into {:?}", text, postfix);
        Ok(Self {
            text: text.to_string(),
            postfix,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn postfix(&self) -> &[Token] {
        &self.postfix
    }

    /// Postfix tokens rendered as strings, e.g. `["a", "U-", "3", "+"]`.
    pub fn postfix_strings(&self) -> Vec<String> {
        self.postfix.iter().map(|t| t.to_string()).collect()
    }

    /// Evaluate against `binding`, indexed by declaration position; `None` is an unknown value.
    pub fn evaluate(&self, binding: &[Option<i16>]) -> Result<Value, EvalError> {
        let mut stack: Vec<Value> = Vec::with_capacity(self.postfix.len());
        for token in &self.postfix {
            let value = match token {
                Token::Num(n) => Value::Int(*n),
                Token::Var(index, name) => match binding.get(*index).copied().flatten() {
                    Some(n) => Value::Int(n),
                    None => return Err(EvalError::Unbound(name.clone())),
                },
                Token::Op(op) if op.is_unary() => {
                    let operand = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    apply_unary(*op, operand)?
                }
                Token::Op(op) => {
                    let right = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    let left = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    apply_binary(*op, left, right)?
                }
            };
            stack.push(value);
        }
        match stack.as_slice() {
            [value] => Ok(*value),
            _ => Err(EvalError::Leftover(stack.len())),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

fn apply_unary(op: Op, operand: Value) -> Result<Value, EvalError> {
    match (op, operand) {
        (Op::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (Op::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(EvalError::TypeMismatch(op.symbol().to_string())),
    }
}

fn apply_binary(op: Op, left: Value, right: Value) -> Result<Value, EvalError> {
    use Value::{Bool, Int};

    let value = match (op, left, right) {
        (Op::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (Op::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (Op::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (Op::Div, Int(_), Int(0)) => return Err(EvalError::DivisionByZero),
        (Op::Div, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (Op::Eq, Int(a), Int(b)) => Bool(a == b),
        (Op::Ne, Int(a), Int(b)) => Bool(a != b),
        (Op::Lt, Int(a), Int(b)) => Bool(a < b),
        (Op::Le, Int(a), Int(b)) => Bool(a <= b),
        (Op::Gt, Int(a), Int(b)) => Bool(a > b),
        (Op::Ge, Int(a), Int(b)) => Bool(a >= b),
        (Op::And, Bool(a), Bool(b)) => Bool(a && b),
        (Op::Or, Bool(a), Bool(b)) => Bool(a || b),
        _ => return Err(EvalError::TypeMismatch(op.symbol().to_string())),
    };
    Ok(value)
}

fn to_postfix(text: &str, variables: &[Variable]) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = text.chars().collect();
    let mut output = Vec::new();
    let mut stack: Vec<StackItem> = Vec::new();
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if !prev.expects_operand() {
                return Err(ExprError::Adjacent(word));
            }
            let token = if c.is_ascii_digit() {
                if !word.chars().all(|ch| ch.is_ascii_digit()) {
                    return Err(ExprError::UnknownIdentifier(word));
                }
                Token::Num(word.parse::<i16>().map_err(|_| ExprError::BadLiteral(word.clone()))?)
            } else {
                match variables.iter().position(|v| v.name() == word) {
                    Some(index) => Token::Var(index, word),
                    None => return Err(ExprError::UnknownIdentifier(word)),
                }
            };
            output.push(token);
            prev = Prev::Operand;
            continue;
        }

        match c {
            '(' => {
                if !prev.expects_operand() {
                    return Err(ExprError::Adjacent("(".to_string()));
                }
                stack.push(StackItem::Open);
                prev = Prev::Open;
                i += 1;
                continue;
            }
            ')' => {
                if prev.expects_operand() {
                    return Err(ExprError::Adjacent(")".to_string()));
                }
                loop {
                    match stack.pop() {
                        Some(StackItem::Op(op)) => output.push(Token::Op(op)),
                        Some(StackItem::Open) => break,
                        None => return Err(ExprError::UnmatchedParenthesis),
                    }
                }
                prev = Prev::Close;
                i += 1;
                continue;
            }
            _ => {}
        }

        let next = chars.get(i + 1).copied();
        let (op, len) = match (c, next) {
            ('=', Some('=')) => (Op::Eq, 2),
            ('!', Some('=')) => (Op::Ne, 2),
            ('<', Some('=')) => (Op::Le, 2),
            ('>', Some('=')) => (Op::Ge, 2),
            ('&', Some('&')) => (Op::And, 2),
            ('|', Some('|')) => (Op::Or, 2),
            ('<', _) => (Op::Lt, 1),
            ('>', _) => (Op::Gt, 1),
            ('+', _) => (Op::Add, 1),
            ('*', _) => (Op::Mul, 1),
            ('/', _) => (Op::Div, 1),
            ('-', _) if prev.expects_operand() => (Op::Neg, 1),
            ('-', _) => (Op::Sub, 1),
            ('!', _) => (Op::Not, 1),
            _ => return Err(ExprError::InvalidCharacter(c)),
        };
        i += len;

        if op.is_unary() {
            if !prev.expects_operand() {
                return Err(ExprError::Adjacent(op.symbol().to_string()));
            }
            stack.push(StackItem::Op(op));
            prev = Prev::Unary;
            continue;
        }

        if prev.expects_operand() {
            return Err(ExprError::Adjacent(op.symbol().to_string()));
        }
        while let Some(StackItem::Op(top)) = stack.last() {
            if top.precedence() < op.precedence() {
                break;
            }
            output.push(Token::Op(*top));
            stack.pop();
        }
        stack.push(StackItem::Op(op));
        prev = Prev::Binary;
    }

    match prev {
        Prev::Start => return Err(ExprError::Empty),
        Prev::Operand | Prev::Close => {}
        _ => return Err(ExprError::Adjacent("end of expression".to_string())),
    }

    while let Some(item) = stack.pop() {
        match item {
            StackItem::Op(op) => output.push(Token::Op(op)),
            StackItem::Open => return Err(ExprError::UnmatchedParenthesis),
        }
    }

    Ok(output)
}
