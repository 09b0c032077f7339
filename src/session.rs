//! One verification context: the BDD manager, predicate ids, and the last verdict.
//!
//! Each call to [`Session::verify`] sizes a fresh manager for the program's
//! state encoding and runs the whole pipeline:
//! program text, control-flow table, Kripke structure, CTL property, verdict.

use std::rc::Rc;

use log::{debug, error, info};

use crate::bdd::Bdd;
use crate::config::Config;
use crate::ctl::{CtlEvaluator, CtlFormula};
use crate::encoding::StateEncoding;
use crate::error::{Result, TranslateError, VerifyError};
use crate::flow::ControlFlowTable;
use crate::kripke::{AtomicPredicate, KripkeTranslator};
use crate::program::Program;
use crate::verifier::{example_limit, Verdict, Verifier};

/// Hands out atomic predicate ids, increasing over the lifetime of a session.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: usize,
}

impl IdAllocator {
    pub fn allocate(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Debug)]
pub struct Session {
    config: Config,
    ids: IdAllocator,
    bdd: Option<Rc<Bdd>>,
    verifier: Verifier,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        let verifier = Verifier::new(config.max_examples);
        Self {
            config,
            ids: IdAllocator::default(),
            bdd: None,
            verifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Manager of the last run, if any.
    pub fn bdd(&self) -> Option<Rc<Bdd>> {
        self.bdd.clone()
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.verifier.verdict()
    }

    /// Check whether every start state of `program` satisfies `formula`.
    ///
    /// Operand `k` of the formula refers to the `k`-th entry of `conditions`.
    pub fn verify<S: AsRef<str>>(&mut self, program: &str, conditions: &[S], formula: &str) -> Result<Verdict> {
        self.run(program, conditions, formula).map_err(|e| {
            error!("{}", e);
            e
        })
    }

    fn run<S: AsRef<str>>(&mut self, program: &str, conditions: &[S], formula: &str) -> Result<Verdict> {
        self.verifier = Verifier::new(self.config.max_examples);

        let program = Program::parse(program)?;
        let formula = CtlFormula::compile(formula)?;
        if program.variables.is_empty() || conditions.is_empty() {
            return Ok(self.verifier.record_empty());
        }

        let table = ControlFlowTable::build(&program.statements, &program.variables)?;
        info!(
            "Control-flow table: {} rows for {} variables",
            table.len(),
            program.variables.len()
        );
        debug!("Control-flow table:\n{}", table);
        if table.is_empty() {
            return Ok(self.verifier.record_empty());
        }

        let encoding = StateEncoding::new(&program.variables);
        let bdd = Rc::new(Bdd::new(encoding.num_bdd_vars(), self.config.cache_bits));
        self.bdd = Some(Rc::clone(&bdd));

        let mut predicates = Vec::with_capacity(conditions.len());
        for text in conditions {
            let id = self.ids.allocate();
            predicates.push(AtomicPredicate::new(id, text.as_ref(), &program.variables, &bdd)?);
        }

        let translator = KripkeTranslator::new(&bdd, &table, &encoding, self.config.gc_threshold);
        let model = match translator.translate(predicates) {
            Ok(model) => model,
            Err(TranslateError::EmptyProgram) => return Ok(self.verifier.record_empty()),
            Err(e) => return Err(e.into()),
        };
        info!("Transitions: {} nodes", bdd.size(model.transitions));

        let property = CtlEvaluator::new(&bdd, &model).evaluate(&formula)?;
        let verdict = self.verifier.verify(&bdd, &model, property);
        if let Some(witness) = self.verifier.witness() {
            let violating = bdd.sat_count(witness, encoding.half_width() as u32);
            info!("Start states violating the property: {}", violating);
        }
        let (hits, misses) = bdd.cache_stats();
        debug!("Operation cache: {} hits, {} misses", hits, misses);
        Ok(verdict)
    }

    /// Up to `n` counterexamples of the last verdict; `-1` asks for as many as allowed.
    pub fn counterexamples(&self, n: i32) -> Result<Vec<String>> {
        match &self.bdd {
            Some(bdd) => Ok(self.verifier.counterexamples(bdd, n)?),
            None => {
                example_limit(n, self.config.max_examples)?;
                Err(VerifyError::NoVerdict.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::{Error, ProgramError};

    #[test]
    fn test_id_allocator() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate(), 0);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
    }

    #[test]
    fn test_empty_model_or_property() {
        let mut session = Session::default();
        assert_eq!(session.verify("a = 1", &["1 == 1"], "0"), Ok(Verdict::EmptyModelOrProperty));
        assert_eq!(session.verify("int a;", &["a == 1"], "0"), Ok(Verdict::EmptyModelOrProperty));
        let none: [&str; 0] = [];
        assert_eq!(session.verify("int a; a = 1", &none, "0"), Ok(Verdict::EmptyModelOrProperty));
        assert_eq!(session.counterexamples(1), Err(Error::Verify(VerifyError::NoVerdict)));
    }

    #[test]
    fn test_stage_errors_propagate() {
        let mut session = Session::default();
        assert_eq!(
            session.verify("int a; b = 1", &["a == 1"], "0"),
            Err(Error::Program(ProgramError::UndeclaredVariable("b".to_string())))
        );
        assert!(matches!(
            session.verify("int a; a = 1", &["a == 1"], "EF ("),
            Err(Error::Ctl(_))
        ));
        assert!(matches!(
            session.verify("int a; a = 1", &["a == 1"], "EF 3"),
            Err(Error::Ctl(_))
        ));
        assert_eq!(session.verdict(), None);
    }

    #[test]
    fn test_integer_predicate_is_skipped() {
        let mut session = Session::default();
        assert_eq!(session.verify("int a; a = 1", &["a + 1", "a == 1"], "AX 1"), Ok(Verdict::Holds));
        assert_eq!(session.verdict(), Some(Verdict::Holds));
    }

    #[test]
    fn test_holds_then_counterexamples_are_empty() {
        let mut session = Session::default();
        let verdict = session.verify("int a; a = 0; while (a < 3) { a = a + 1 }", &["a == 3"], "AF 0");
        assert_eq!(verdict, Ok(Verdict::Holds));
        assert_eq!(session.counterexamples(-1), Ok(vec![]));
        let bdd = session.bdd().unwrap();
        let (hits, misses) = bdd.cache_stats();
        assert!(hits + misses > 0);
    }

    #[test]
    fn test_not_holds_is_bounded() {
        let mut session = Session::default();
        let verdict = session.verify("int a; int b; read(a); b = a", &["a != b"], "EF 0");
        assert_eq!(verdict, Ok(Verdict::NotHolds));
        assert_eq!(session.counterexamples(5).unwrap().len(), 5);
        assert_eq!(
            session.counterexamples(0),
            Err(Error::Verify(VerifyError::InvalidExampleCount(0)))
        );
    }
}
