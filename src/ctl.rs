//! CTL formulas: infix text to postfix, and postfix to a set of states.
//!
//! Operands are atomic predicate numbers. Operators, from loosest to
//! tightest binding: `OR`/`XOR`, `AND`, `AU`/`EU`, and the prefix operators
//! `NOT`, `AX`, `EX`, `AF`, `EF`, `AG`, `EG`. Binary operators associate to
//! the left. Keywords are case-insensitive.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};

use crate::bdd::Bdd;
use crate::encoding::Half;
use crate::error::CtlError;
use crate::kripke::KripkeStructure;
use crate::reference::Ref;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CtlOp {
    Not,
    And,
    Or,
    Xor,
    AX,
    EX,
    AF,
    EF,
    AG,
    EG,
    AU,
    EU,
}

impl CtlOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let op = match word {
            "NOT" => CtlOp::Not,
            "AND" => CtlOp::And,
            "OR" => CtlOp::Or,
            "XOR" => CtlOp::Xor,
            "AX" => CtlOp::AX,
            "EX" => CtlOp::EX,
            "AF" => CtlOp::AF,
            "EF" => CtlOp::EF,
            "AG" => CtlOp::AG,
            "EG" => CtlOp::EG,
            "AU" => CtlOp::AU,
            "EU" => CtlOp::EU,
            _ => return None,
        };
        Some(op)
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            CtlOp::Not => "NOT",
            CtlOp::And => "AND",
            CtlOp::Or => "OR",
            CtlOp::Xor => "XOR",
            CtlOp::AX => "AX",
            CtlOp::EX => "EX",
            CtlOp::AF => "AF",
            CtlOp::EF => "EF",
            CtlOp::AG => "AG",
            CtlOp::EG => "EG",
            CtlOp::AU => "AU",
            CtlOp::EU => "EU",
        }
    }

    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            CtlOp::Not | CtlOp::AX | CtlOp::EX | CtlOp::AF | CtlOp::EF | CtlOp::AG | CtlOp::EG
        )
    }

    const fn precedence(self) -> u8 {
        match self {
            CtlOp::Or | CtlOp::Xor => 1,
            CtlOp::And => 2,
            CtlOp::AU | CtlOp::EU => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for CtlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CtlToken {
    /// Index of an atomic predicate.
    Operand(usize),
    Op(CtlOp),
}

impl fmt::Display for CtlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtlToken::Operand(i) => write!(f, "{}", i),
            CtlToken::Op(op) => write!(f, "{}", op),
        }
    }
}

/// A formula in postfix order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CtlFormula {
    text: String,
    postfix: Vec<CtlToken>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum CharClass {
    Letter,
    Digit,
    Space,
    Open,
    Close,
}

enum StackItem {
    Open,
    Op(CtlOp),
}

/// Shunting-yard state.
struct Converter {
    output: Vec<CtlToken>,
    stack: Vec<StackItem>,
}

impl Converter {
    fn flush(&mut self, word: &mut String) -> Result<(), CtlError> {
        if word.is_empty() {
            return Ok(());
        }
        let word = std::mem::take(word);
        if word.as_bytes()[0].is_ascii_digit() {
            let index = word.parse().map_err(|_| CtlError::Syntax(word.clone()))?;
            self.output.push(CtlToken::Operand(index));
            return Ok(());
        }
        let op = CtlOp::from_keyword(&word).ok_or(CtlError::UnknownKeyword(word))?;
        if !op.is_unary() {
            while let Some(StackItem::Op(top)) = self.stack.last() {
                if top.precedence() < op.precedence() {
                    break;
                }
                self.output.push(CtlToken::Op(*top));
                self.stack.pop();
            }
        }
        self.stack.push(StackItem::Op(op));
        Ok(())
    }

    fn close(&mut self) -> Result<(), CtlError> {
        loop {
            match self.stack.pop() {
                Some(StackItem::Op(op)) => self.output.push(CtlToken::Op(op)),
                Some(StackItem::Open) => break,
                None => return Err(CtlError::UnmatchedParenthesis),
            }
        }
        if let Some(StackItem::Op(op)) = self.stack.last() {
            if op.is_unary() {
                self.output.push(CtlToken::Op(*op));
                self.stack.pop();
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<CtlToken>, CtlError> {
        while let Some(item) = self.stack.pop() {
            match item {
                StackItem::Op(op) => self.output.push(CtlToken::Op(op)),
                StackItem::Open => return Err(CtlError::UnmatchedParenthesis),
            }
        }
        Ok(self.output)
    }
}

impl CtlFormula {
    /// Convert an infix formula to postfix.
    ///
    /// Only letters, digits, spaces and parentheses are accepted. A keyword
    /// may not directly follow a number or `)`, a number may not directly
    /// follow a keyword, `(` may not follow a number or `)`, and `)` may not
    /// follow `(` or a keyword.
    pub fn compile(text: &str) -> Result<Self, CtlError> {
        let upper = text.to_ascii_uppercase();
        let mut converter = Converter {
            output: Vec::new(),
            stack: Vec::new(),
        };
        let mut word = String::new();
        let mut prev: Option<CharClass> = None;

        for c in upper.chars() {
            let class = match c {
                'A'..='Z' => CharClass::Letter,
                '0'..='9' => CharClass::Digit,
                ' ' => CharClass::Space,
                '(' => CharClass::Open,
                ')' => CharClass::Close,
                _ => return Err(CtlError::InvalidCharacter(c)),
            };
            let adjacent = match class {
                CharClass::Letter => matches!(prev, Some(CharClass::Close | CharClass::Digit)),
                CharClass::Digit => prev == Some(CharClass::Letter),
                CharClass::Open => matches!(prev, Some(CharClass::Close | CharClass::Digit)),
                CharClass::Close => matches!(prev, Some(CharClass::Open | CharClass::Letter)),
                CharClass::Space => false,
            };
            if adjacent {
                let mut near = word.clone();
                near.push(c);
                return Err(CtlError::Syntax(near));
            }
            match class {
                CharClass::Letter | CharClass::Digit => word.push(c),
                CharClass::Space => converter.flush(&mut word)?,
                CharClass::Open => {
                    converter.flush(&mut word)?;
                    converter.stack.push(StackItem::Open);
                }
                CharClass::Close => {
                    converter.flush(&mut word)?;
                    converter.close()?;
                }
            }
            prev = Some(class);
        }
        converter.flush(&mut word)?;
        let postfix = converter.finish()?;

        if postfix.is_empty() {
            return Err(CtlError::Empty);
        }
        debug!("Compiled formula '{}' to {:?}", text, postfix);
        Ok(Self {
            text: text.to_string(),
            postfix,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn postfix(&self) -> &[CtlToken] {
        &self.postfix
    }

    pub fn postfix_strings(&self) -> Vec<String> {
        self.postfix.iter().map(|t| t.to_string()).collect()
    }
}

impl fmt::Display for CtlFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Fixpoint evaluation of formulas over a Kripke structure.
pub struct CtlEvaluator<'a> {
    bdd: &'a Bdd,
    model: &'a KripkeStructure,
    to_next: HashMap<u32, u32>,
    next_vars: Vec<u32>,
}

impl<'a> CtlEvaluator<'a> {
    pub fn new(bdd: &'a Bdd, model: &'a KripkeStructure) -> Self {
        Self {
            bdd,
            model,
            to_next: model.encoding.current_to_next(),
            next_vars: model.encoding.bdd_vars(Half::Next),
        }
    }

    /// States (over the current half) satisfying `formula`.
    pub fn evaluate(&self, formula: &CtlFormula) -> Result<Ref, CtlError> {
        let mut stack: Vec<Ref> = Vec::new();
        for token in formula.postfix() {
            let value = match *token {
                CtlToken::Operand(index) => {
                    let count = self.model.predicates.len();
                    let predicate = self
                        .model
                        .predicates
                        .get(index)
                        .ok_or(CtlError::OperandOutOfRange { index, count })?;
                    predicate.states()
                }
                CtlToken::Op(op) if op.is_unary() => {
                    let f = stack.pop().ok_or_else(|| CtlError::StackUnderflow(op.to_string()))?;
                    self.unary(op, f)
                }
                CtlToken::Op(op) => {
                    let right = stack.pop().ok_or_else(|| CtlError::StackUnderflow(op.to_string()))?;
                    let left = stack.pop().ok_or_else(|| CtlError::StackUnderflow(op.to_string()))?;
                    self.binary(op, left, right)
                }
            };
            trace!("{} -> {} nodes", token, self.bdd.size(value));
            stack.push(value);
        }
        match stack.as_slice() {
            [result] => Ok(*result),
            _ => Err(CtlError::Leftover(stack.len())),
        }
    }

    fn unary(&self, op: CtlOp, f: Ref) -> Ref {
        match op {
            CtlOp::Not => -f,
            CtlOp::EX => self.ex(f),
            CtlOp::AX => self.ax(f),
            CtlOp::EF => self.fixpoint(f, |z| self.bdd.apply_or(z, self.ex(z))),
            CtlOp::AF => self.fixpoint(f, |z| self.bdd.apply_or(z, self.ax(z))),
            CtlOp::EG => self.fixpoint(f, |z| self.bdd.apply_and(z, self.ex(z))),
            CtlOp::AG => self.fixpoint(f, |z| self.bdd.apply_and(z, self.ax(z))),
            _ => unreachable!("{} is not unary", op),
        }
    }

    fn binary(&self, op: CtlOp, left: Ref, right: Ref) -> Ref {
        match op {
            CtlOp::And => self.bdd.apply_and(left, right),
            CtlOp::Or => self.bdd.apply_or(left, right),
            CtlOp::Xor => self.bdd.apply_xor(left, right),
            CtlOp::EU => self.fixpoint(right, |z| {
                let step = self.bdd.apply_and(left, self.ex(z));
                self.bdd.apply_or(right, step)
            }),
            CtlOp::AU => self.fixpoint(right, |z| {
                let step = self.bdd.apply_and(left, self.ax(z));
                self.bdd.apply_or(right, step)
            }),
            _ => unreachable!("{} is not binary", op),
        }
    }

    /// States with some successor in `f`.
    pub fn ex(&self, f: Ref) -> Ref {
        if self.bdd.is_zero(f) {
            return f;
        }
        let shifted = self.bdd.rename_vars(f, &self.to_next);
        self.bdd.rel_product(self.model.transitions, shifted, &self.next_vars)
    }

    /// States whose every successor is in `f`.
    pub fn ax(&self, f: Ref) -> Ref {
        -self.ex(-f)
    }

    fn fixpoint(&self, init: Ref, step: impl Fn(Ref) -> Ref) -> Ref {
        let mut current = init;
        let mut iterations = 0usize;
        loop {
            let next = step(current);
            iterations += 1;
            if next == current {
                debug!("Fixpoint reached after {} iterations", iterations);
                return current;
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::encoding::StateEncoding;
    use crate::flow::ControlFlowTable;
    use crate::kripke::{AtomicPredicate, KripkeTranslator};
    use crate::program::Program;

    fn postfix(text: &str) -> Vec<String> {
        CtlFormula::compile(text).unwrap().postfix_strings()
    }

    #[test]
    fn test_simple_postfix() {
        assert_eq!(postfix("EX(1 AND 5)"), ["1", "5", "AND", "EX"]);
        assert_eq!(postfix("ex(1 and 5)"), ["1", "5", "AND", "EX"]);
        assert_eq!(postfix("NOT 0 OR 1"), ["0", "NOT", "1", "OR"]);
    }

    #[test]
    fn test_nested_postfix() {
        assert_eq!(
            postfix("AF EX(NOT 0 OR NOT 6 AND AG   ( EF 1 AND NOT EF 3) AND AF NOT 3)"),
            [
                "0", "NOT", "6", "NOT", "1", "EF", "3", "EF", "NOT", "AND", "AG", "AND", "3", "NOT", "AF", "AND", "OR",
                "EX", "AF"
            ]
        );
    }

    #[test]
    fn test_until_postfix() {
        assert_eq!(
            postfix("AX 0 AU AF EG (2 XOR 6 OR 3 AND 4) EU 6"),
            ["0", "AX", "2", "6", "XOR", "3", "4", "AND", "OR", "EG", "AF", "AU", "6", "EU"]
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(CtlFormula::compile(""), Err(CtlError::Empty));
        assert_eq!(CtlFormula::compile("   "), Err(CtlError::Empty));
        assert_eq!(CtlFormula::compile("EF 1 & 2"), Err(CtlError::InvalidCharacter('&')));
        assert_eq!(CtlFormula::compile("EF(1))"), Err(CtlError::UnmatchedParenthesis));
        assert_eq!(CtlFormula::compile("EF((1)"), Err(CtlError::UnmatchedParenthesis));
        assert_eq!(CtlFormula::compile("FOO 1"), Err(CtlError::UnknownKeyword("FOO".to_string())));
        assert!(matches!(CtlFormula::compile("EF1"), Err(CtlError::Syntax(_))));
        assert!(matches!(CtlFormula::compile("1EF"), Err(CtlError::Syntax(_))));
        assert!(matches!(CtlFormula::compile("(1)(2)"), Err(CtlError::Syntax(_))));
        assert!(matches!(CtlFormula::compile("EF()"), Err(CtlError::Syntax(_))));
        assert!(matches!(CtlFormula::compile("(EF)"), Err(CtlError::Syntax(_))));
        assert!(matches!(CtlFormula::compile("1(2)"), Err(CtlError::Syntax(_))));
    }

    struct Model {
        bdd: Bdd,
        model: KripkeStructure,
    }

    fn model(text: &str, conditions: &[&str]) -> Model {
        let program = Program::parse(text).unwrap();
        let table = ControlFlowTable::build(&program.statements, &program.variables).unwrap();
        let encoding = StateEncoding::new(&program.variables);
        let bdd = Bdd::new(encoding.num_bdd_vars(), 16);
        let predicates = conditions
            .iter()
            .enumerate()
            .map(|(id, text)| AtomicPredicate::new(id, text, &program.variables, &bdd).unwrap())
            .collect();
        let model = KripkeTranslator::new(&bdd, &table, &encoding, 1 << 20)
            .translate(predicates)
            .unwrap();
        Model { bdd, model }
    }

    impl Model {
        fn eval(&self, formula: &str) -> Result<Ref, CtlError> {
            let formula = CtlFormula::compile(formula)?;
            CtlEvaluator::new(&self.bdd, &self.model).evaluate(&formula)
        }

        fn holds_initially(&self, formula: &str) -> bool {
            let states = self.eval(formula).unwrap();
            self.bdd.apply_imply(self.model.start, states) == self.bdd.one()
        }

        fn state(&self, pc: usize, values: &[Option<i16>]) -> Ref {
            self.model.encoding.state(&self.bdd, pc, values, Half::Current)
        }
    }

    #[test]
    fn test_next_operators() {
        let m = model("int a; a = 5; a = a + 1;", &["a == 5", "a == 6"]);
        let ex = m.eval("EX 0").unwrap();
        assert_eq!(m.bdd.apply_and(ex, m.model.start), m.model.start);
        assert!(m.holds_initially("AX 0"));
        assert!(!m.holds_initially("EX 1"));
        assert!(m.holds_initially("EX EX 1"));
        assert!(m.bdd.is_zero(CtlEvaluator::new(&m.bdd, &m.model).ex(m.bdd.zero())));
    }

    #[test]
    fn test_future_and_global() {
        let m = model("int a; a = 0; while (a < 3) { a = a + 1 }", &["a == 3", "a < 4"]);
        assert!(m.holds_initially("AF 0"));
        assert!(m.holds_initially("EF 0"));
        assert!(!m.holds_initially("0"));
        assert!(m.holds_initially("AG EX 1"));
        assert!(m.holds_initially("EX AG 1"));
        assert!(!m.holds_initially("AG 0"));
        assert!(m.holds_initially("AF AG 0"));
    }

    #[test]
    fn test_until() {
        let m = model("int a; a = 0; while (a < 3) { a = a + 1 }", &["a < 3", "a == 3"]);
        assert!(m.holds_initially("EX (0 AU 1)"));
        assert!(m.holds_initially("EX (0 EU 1)"));
        assert!(!m.holds_initially("EX (1 EU 1)"));
        let terminal = m.state(4, &[Some(3)]);
        let au = m.eval("0 AU 1").unwrap();
        assert_eq!(m.bdd.apply_and(au, terminal), terminal);
    }

    #[test]
    fn test_boolean_connectives() {
        let m = model("int a; a = 1;", &["a == 1", "a > 0"]);
        let p = m.eval("0").unwrap();
        let q = m.eval("1").unwrap();
        assert_eq!(m.eval("0 AND 1").unwrap(), m.bdd.apply_and(p, q));
        assert_eq!(m.eval("0 OR 1").unwrap(), m.bdd.apply_or(p, q));
        assert!(m.bdd.is_zero(m.eval("0 XOR 1").unwrap()));
        assert_eq!(m.eval("NOT 0").unwrap(), -p);
    }

    #[test]
    fn test_evaluation_errors() {
        let m = model("int a; a = 1;", &["a == 1"]);
        assert_eq!(m.eval("1"), Err(CtlError::OperandOutOfRange { index: 1, count: 1 }));
        assert_eq!(m.eval("AND 0"), Err(CtlError::StackUnderflow("AND".to_string())));
        assert_eq!(m.eval("NOT"), Err(CtlError::StackUnderflow("NOT".to_string())));
        assert_eq!(m.eval("0 0"), Err(CtlError::Leftover(2)));
    }
}
