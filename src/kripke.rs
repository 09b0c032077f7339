//! Translation of a control-flow table into a Kripke structure.
//!
//! The program is executed over concrete values. A work-list holds
//! continuations `(pc, binding)`, where the binding has one slot per declared
//! variable that is either a known value or unknown. Each expanded
//! continuation contributes one transition (current state to next state) and
//! its current state to every atomic predicate that holds there.
//!
//! A `read` leaves the variable unconstrained in the next state and then
//! forks one continuation per 16-bit value. The end of the program loops on
//! itself so that every state has a successor.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info, trace, warn};

use crate::bdd::Bdd;
use crate::encoding::{Half, StateEncoding};
use crate::error::{EvalError, TranslateError};
use crate::expr::{Expr, Value};
use crate::flow::{ControlFlowTable, Kind};
use crate::program::Variable;
use crate::reference::Ref;

/// A named condition over program variables, and the set of states where it holds.
#[derive(Debug, Clone)]
pub struct AtomicPredicate {
    id: usize,
    expr: Expr,
    states: Ref,
}

impl AtomicPredicate {
    /// Compile `text`; the satisfying set starts empty.
    pub fn new(id: usize, text: &str, variables: &[Variable], bdd: &Bdd) -> Result<Self, TranslateError> {
        let expr = Expr::compile(text, variables).map_err(|source| TranslateError::Predicate {
            text: text.to_string(),
            source,
        })?;
        Ok(Self {
            id,
            expr,
            states: bdd.zero(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn text(&self) -> &str {
        self.expr.text()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// States (over the current half) where the condition holds.
    pub fn states(&self) -> Ref {
        self.states
    }
}

impl fmt::Display for AtomicPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.expr)
    }
}

/// Start states, transition relation, and labelling of a translated program.
#[derive(Debug, Clone)]
pub struct KripkeStructure {
    pub start: Ref,
    pub transitions: Ref,
    pub predicates: Vec<AtomicPredicate>,
    pub encoding: StateEncoding,
}

type Continuation = (usize, Vec<Option<i16>>);

pub struct KripkeTranslator<'a> {
    bdd: &'a Bdd,
    table: &'a ControlFlowTable,
    encoding: &'a StateEncoding,
    gc_threshold: usize,
}

impl<'a> KripkeTranslator<'a> {
    pub fn new(bdd: &'a Bdd, table: &'a ControlFlowTable, encoding: &'a StateEncoding, gc_threshold: usize) -> Self {
        debug_assert!(
            bdd.num_vars() >= encoding.num_bdd_vars(),
            "Manager has {} variables, encoding needs {}",
            bdd.num_vars(),
            encoding.num_bdd_vars()
        );
        Self {
            bdd,
            table,
            encoding,
            gc_threshold,
        }
    }

    /// Run the program and fill in `predicates`.
    pub fn translate(&self, mut predicates: Vec<AtomicPredicate>) -> Result<KripkeStructure, TranslateError> {
        match self.table.get(0).map(|e| &e.kind) {
            None | Some(Kind::Else { .. }) | Some(Kind::EndOfGroup { .. }) => {
                warn!("Nothing to translate: the program has no statements");
                return Err(TranslateError::EmptyProgram);
            }
            Some(_) => {}
        }

        let num_vars = self.encoding.variable_fields().len();
        let unknown = vec![None; num_vars];
        let start = self.encoding.state(self.bdd, 0, &unknown, Half::Current);
        let mut transitions = self.bdd.zero();

        let mut visited: HashSet<Continuation> = HashSet::new();
        let mut worklist: Vec<Continuation> = Vec::new();
        visited.insert((0, unknown.clone()));
        worklist.push((0, unknown));

        let mut threshold = self.gc_threshold;
        let mut steps = 0usize;

        while let Some((pc, binding)) = worklist.pop() {
            steps += 1;
            trace!("Expanding pc = {}, binding = {:?}", pc, binding);

            self.label(pc, &binding, &mut predicates);

            let (next_pc, next_binding) = self.step(pc, &binding)?;
            let edge = self.encoding.edge(self.bdd, pc, &binding, next_pc, &next_binding);
            transitions = self.bdd.apply_or(transitions, edge);

            match self.table.get(pc).map(|e| &e.kind) {
                None => {}
                Some(Kind::Read(var)) => {
                    let var = *var;
                    for value in i16::MIN..=i16::MAX {
                        let mut forked = next_binding.clone();
                        forked[var] = Some(value);
                        let continuation = (next_pc, forked);
                        if visited.insert(continuation.clone()) {
                            worklist.push(continuation);
                        }
                    }
                }
                Some(_) => {
                    let continuation = (next_pc, next_binding);
                    if visited.insert(continuation.clone()) {
                        worklist.push(continuation);
                    }
                }
            }

            if self.bdd.num_nodes() > threshold {
                let mut roots = vec![start, transitions];
                roots.extend(predicates.iter().map(|p| p.states));
                self.bdd.collect_garbage(&roots);
                if self.bdd.num_nodes() > threshold / 2 {
                    threshold *= 2;
                    debug!("Raising garbage collection threshold to {}", threshold);
                }
            }
        }

        info!(
            "Translated program: {} continuations expanded, {} nodes in transitions",
            steps,
            self.bdd.size(transitions)
        );

        Ok(KripkeStructure {
            start,
            transitions,
            predicates,
            encoding: self.encoding.clone(),
        })
    }

    /// Add the current state to every predicate that holds in it.
    ///
    /// A predicate that cannot be decided here is skipped for this state only.
    fn label(&self, pc: usize, binding: &[Option<i16>], predicates: &mut [AtomicPredicate]) {
        let mut state = None;
        for predicate in predicates.iter_mut() {
            match predicate.expr.evaluate(binding) {
                Ok(Value::Bool(true)) => {
                    let state = *state.get_or_insert_with(|| self.encoding.state(self.bdd, pc, binding, Half::Current));
                    predicate.states = self.bdd.apply_or(predicate.states, state);
                }
                Ok(Value::Bool(false)) => {}
                Ok(Value::Int(value)) => trace!(
                    "Predicate '{}' is not a condition at pc {}: got {}",
                    predicate.text(),
                    pc,
                    value
                ),
                Err(e) => trace!("Predicate '{}' unresolved at pc {}: {}", predicate.text(), pc, e),
            }
        }
    }

    /// The single successor of `(pc, binding)`; for `read`, the read variable is unknown.
    fn step(&self, pc: usize, binding: &[Option<i16>]) -> Result<Continuation, TranslateError> {
        let entry = match self.table.get(pc) {
            Some(entry) => entry,
            None => return Ok((pc, binding.to_vec())),
        };
        let mut next = binding.to_vec();
        let next_pc = match &entry.kind {
            Kind::Read(var) => {
                next[*var] = None;
                entry.next
            }
            Kind::Assign(var, expr) => {
                match expr.evaluate(binding).map_err(|e| unresolved(pc, expr, e))? {
                    Value::Int(value) => next[*var] = Some(value),
                    Value::Bool(_) => {
                        return Err(TranslateError::NotInteger {
                            pc,
                            text: expr.text().to_string(),
                        })
                    }
                }
                entry.next
            }
            Kind::If {
                cond,
                then_pc,
                else_pc,
            } => {
                if self.condition(pc, cond, binding)? {
                    *then_pc
                } else {
                    *else_pc
                }
            }
            Kind::While {
                cond,
                body_pc,
                exit_pc,
            } => {
                if self.condition(pc, cond, binding)? {
                    *body_pc
                } else {
                    *exit_pc
                }
            }
            Kind::Else { .. } | Kind::EndOfGroup { .. } => entry.next,
        };
        Ok((next_pc, next))
    }

    fn condition(&self, pc: usize, cond: &Expr, binding: &[Option<i16>]) -> Result<bool, TranslateError> {
        match cond.evaluate(binding).map_err(|e| unresolved(pc, cond, e))? {
            Value::Bool(b) => Ok(b),
            Value::Int(_) => Err(TranslateError::NotBoolean {
                text: cond.text().to_string(),
            }),
        }
    }
}

fn unresolved(pc: usize, expr: &Expr, source: EvalError) -> TranslateError {
    TranslateError::Unresolved {
        pc,
        text: expr.text().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::Program;

    struct Fixture {
        bdd: Bdd,
        table: ControlFlowTable,
        encoding: StateEncoding,
        variables: Vec<Variable>,
    }

    fn fixture(text: &str) -> Fixture {
        let program = Program::parse(text).unwrap();
        let table = ControlFlowTable::build(&program.statements, &program.variables).unwrap();
        let encoding = StateEncoding::new(&program.variables);
        let bdd = Bdd::new(encoding.num_bdd_vars(), 16);
        Fixture {
            bdd,
            table,
            encoding,
            variables: program.variables,
        }
    }

    impl Fixture {
        fn translate(&self, conditions: &[&str]) -> Result<KripkeStructure, TranslateError> {
            let predicates = conditions
                .iter()
                .enumerate()
                .map(|(id, text)| AtomicPredicate::new(id, text, &self.variables, &self.bdd))
                .collect::<Result<Vec<_>, _>>()?;
            KripkeTranslator::new(&self.bdd, &self.table, &self.encoding, 1 << 20).translate(predicates)
        }

        fn state(&self, pc: usize, values: &[Option<i16>]) -> Ref {
            self.encoding.state(&self.bdd, pc, values, Half::Current)
        }

        fn edge(&self, pc: usize, from: &[Option<i16>], next_pc: usize, to: &[Option<i16>]) -> Ref {
            self.encoding.edge(&self.bdd, pc, from, next_pc, to)
        }
    }

    #[test]
    fn test_straight_line_program() {
        let f = fixture("int a; a = 5; a = a + 1;");
        let model = f.translate(&["a == 6"]).unwrap();

        assert_eq!(model.start, f.state(0, &[None]));

        let expected = [
            f.edge(0, &[None], 1, &[Some(5)]),
            f.edge(1, &[Some(5)], 2, &[Some(6)]),
            f.edge(2, &[Some(6)], 2, &[Some(6)]),
        ]
        .into_iter()
        .fold(f.bdd.zero(), |acc, e| f.bdd.apply_or(acc, e));
        assert_eq!(model.transitions, expected);

        assert_eq!(model.predicates[0].states(), f.state(2, &[Some(6)]));
    }

    #[test]
    fn test_branch_follows_condition() {
        let f = fixture("int a; a = 1; if (a > 0) { a = 2 } else { a = 3 }");
        let model = f.translate(&["a == 3"]).unwrap();

        // 0: a = 1, 1: IF, 2: a = 2, 3: then-end, 4: ELSE, 5: a = 3, 6: else-end
        let taken = f.edge(1, &[Some(1)], 2, &[Some(1)]);
        let skipped = f.edge(1, &[Some(1)], 4, &[Some(1)]);
        assert_eq!(f.bdd.apply_and(model.transitions, taken), taken);
        assert!(f.bdd.is_zero(f.bdd.apply_and(model.transitions, skipped)));
        assert!(f.bdd.is_zero(model.predicates[0].states()));
    }

    #[test]
    fn test_loop_terminates_on_repeated_continuation() {
        let f = fixture("int a; a = 0; while (a < 3) { a = a + 1 }");
        let model = f.translate(&["a == 3"]).unwrap();

        // 0: a = 0, 1: WHILE, 2: a = a + 1, 3: while-end, 4: end
        let exit = f.edge(1, &[Some(3)], 4, &[Some(3)]);
        assert_eq!(f.bdd.apply_and(model.transitions, exit), exit);
        let back = f.edge(3, &[Some(2)], 1, &[Some(2)]);
        assert_eq!(f.bdd.apply_and(model.transitions, back), back);

        let holds = [1, 3, 4]
            .into_iter()
            .fold(f.bdd.zero(), |acc, pc| f.bdd.apply_or(acc, f.state(pc, &[Some(3)])));
        assert_eq!(model.predicates[0].states(), holds);
    }

    #[test]
    fn test_infinite_loop_is_finite_model() {
        let f = fixture("int a; a = 0; while (a == 0) { a = 0 }");
        let model = f.translate(&["a == 0"]).unwrap();
        assert!(!f.bdd.is_zero(model.transitions));
        assert!(f.bdd.is_zero(f.bdd.apply_and(model.transitions, f.state(4, &[Some(0)]))));
    }

    #[test]
    fn test_unknown_values_stay_unconstrained() {
        let f = fixture("int a; int b; b = 1;");
        let model = f.translate(&["b == 1", "a == 0"]).unwrap();

        let first = f.edge(0, &[None, None], 1, &[None, Some(1)]);
        assert_eq!(f.bdd.apply_and(model.transitions, first), first);
        assert_eq!(model.predicates[0].states(), f.state(1, &[None, Some(1)]));
        assert!(f.bdd.is_zero(model.predicates[1].states()));
    }

    #[test]
    fn test_read_forks_every_value() {
        let f = fixture("int a; int b; read(a); b = a");
        let model = f.translate(&["a != b"]).unwrap();

        let read = f.edge(0, &[None, None], 1, &[None, None]);
        assert_eq!(f.bdd.apply_and(model.transitions, read), read);
        for v in [i16::MIN, -1, 0, 7, i16::MAX] {
            let assign = f.edge(1, &[Some(v), None], 2, &[Some(v), Some(v)]);
            assert_eq!(f.bdd.apply_and(model.transitions, assign), assign);
        }
        assert!(f.bdd.is_zero(model.predicates[0].states()));
    }

    #[test]
    fn test_integer_predicate_is_skipped() {
        let f = fixture("int a; a = 1");
        let model = f.translate(&["a + 1", "a == 1"]).unwrap();
        assert!(f.bdd.is_zero(model.predicates[0].states()));
        assert_eq!(model.predicates[1].states(), f.state(1, &[Some(1)]));
    }

    #[test]
    fn test_translation_failures() {
        let f = fixture("int a; int b; b = a + 1");
        assert!(matches!(
            f.translate(&[]),
            Err(TranslateError::Unresolved { pc: 0, .. })
        ));

        let f = fixture("int a; a = 0; if (a + 1) { a = 1 }");
        assert!(matches!(f.translate(&[]), Err(TranslateError::NotBoolean { .. })));

        let f = fixture("int a; a = 1");
        assert!(matches!(f.translate(&["x > 1"]), Err(TranslateError::Predicate { .. })));

        let f = fixture("int a; int b; b = 0; a = 1 / b");
        assert_eq!(
            f.translate(&[]).err(),
            Some(TranslateError::Unresolved {
                pc: 1,
                text: "1 / b".to_string(),
                source: EvalError::DivisionByZero,
            })
        );

        let f = fixture("int a; a");
        assert_eq!(f.translate(&["a > 1"]).err(), Some(TranslateError::EmptyProgram));
    }
}
