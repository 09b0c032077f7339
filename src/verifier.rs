//! Verdict on the start states, and the counterexamples behind it.

use std::fmt;

use log::{debug, info};

use crate::bdd::Bdd;
use crate::decoder;
use crate::encoding::StateEncoding;
use crate::error::VerifyError;
use crate::kripke::KripkeStructure;
use crate::reference::Ref;

/// Upper bound on the number of counterexamples returned at once.
pub const MAX_EXAMPLES: usize = 1000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Verdict {
    Holds,
    NotHolds,
    /// The program declares no variables or statements, or there are no atomic predicates.
    EmptyModelOrProperty,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Holds => write!(f, "Property holds"),
            Verdict::NotHolds => write!(f, "Property does not hold"),
            Verdict::EmptyModelOrProperty => write!(f, "The model or property is empty"),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Empty,
    Checked {
        verdict: Verdict,
        witness: Ref,
        encoding: StateEncoding,
    },
}

#[derive(Debug, Clone)]
pub struct Verifier {
    max_examples: usize,
    outcome: Option<Outcome>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(MAX_EXAMPLES)
    }
}

impl Verifier {
    pub fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            outcome: None,
        }
    }

    /// Decide whether every start state of `model` is in `property`.
    pub fn verify(&mut self, bdd: &Bdd, model: &KripkeStructure, property: Ref) -> Verdict {
        let union = bdd.apply_or(model.start, property);
        let witness = bdd.apply_xor(union, property);
        let verdict = if union == property {
            Verdict::Holds
        } else {
            Verdict::NotHolds
        };
        info!("{}", verdict);
        self.outcome = Some(Outcome::Checked {
            verdict,
            witness,
            encoding: model.encoding.clone(),
        });
        verdict
    }

    /// Record that there was nothing to verify.
    pub fn record_empty(&mut self) -> Verdict {
        info!("{}", Verdict::EmptyModelOrProperty);
        self.outcome = Some(Outcome::Empty);
        Verdict::EmptyModelOrProperty
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self.outcome.as_ref()? {
            Outcome::Empty => Some(Verdict::EmptyModelOrProperty),
            Outcome::Checked { verdict, .. } => Some(*verdict),
        }
    }

    /// Start states outside the property.
    pub fn witness(&self) -> Option<Ref> {
        match self.outcome.as_ref()? {
            Outcome::Empty => None,
            Outcome::Checked { witness, .. } => Some(*witness),
        }
    }

    /// Up to `n` start states violating the property; `-1` asks for as many as allowed.
    pub fn counterexamples(&self, bdd: &Bdd, n: i32) -> Result<Vec<String>, VerifyError> {
        let limit = example_limit(n, self.max_examples)?;
        let (witness, encoding) = match &self.outcome {
            Some(Outcome::Checked { witness, encoding, .. }) => (*witness, encoding),
            Some(Outcome::Empty) | None => return Err(VerifyError::NoVerdict),
        };
        if bdd.is_zero(witness) {
            return Ok(Vec::new());
        }
        // Every cube yields at least one example.
        let serialization = bdd.to_cube_string(witness, Some(limit));
        debug!("Witness cubes: {}", serialization);
        decoder::decode(encoding, &serialization, limit)
    }
}

/// Resolve a requested example count against `cap`.
///
/// `-1` means the cap, counts above the cap are clamped, and `0` or anything
/// below `-1` is rejected.
pub fn example_limit(n: i32, cap: usize) -> Result<usize, VerifyError> {
    match n {
        -1 => Ok(cap),
        n if n >= 1 => Ok((n as usize).min(cap)),
        n => Err(VerifyError::InvalidExampleCount(n)),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ctl::{CtlEvaluator, CtlFormula};
    use crate::flow::ControlFlowTable;
    use crate::kripke::{AtomicPredicate, KripkeTranslator};
    use crate::program::Program;

    fn check(text: &str, conditions: &[&str], formula: &str) -> (Bdd, Verifier) {
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
        let formula = CtlFormula::compile(formula).unwrap();
        let property = CtlEvaluator::new(&bdd, &model).evaluate(&formula).unwrap();
        let mut verifier = Verifier::default();
        verifier.verify(&bdd, &model, property);
        (bdd, verifier)
    }

    #[test]
    fn test_example_limit() {
        assert_eq!(example_limit(-1, 1000), Ok(1000));
        assert_eq!(example_limit(1, 1000), Ok(1));
        assert_eq!(example_limit(1000, 1000), Ok(1000));
        assert_eq!(example_limit(5000, 1000), Ok(1000));
        assert_eq!(example_limit(0, 1000), Err(VerifyError::InvalidExampleCount(0)));
        assert_eq!(example_limit(-2, 1000), Err(VerifyError::InvalidExampleCount(-2)));
    }

    #[test]
    fn test_holds_has_no_counterexamples() {
        let (bdd, verifier) = check("int a; a = 0; while (a < 3) { a = a + 1 }", &["a == 3"], "AF 0");
        assert_eq!(verifier.verdict(), Some(Verdict::Holds));
        assert_eq!(verifier.witness().map(|w| bdd.is_zero(w)), Some(true));
        assert_eq!(verifier.counterexamples(&bdd, -1), Ok(vec![]));
    }

    #[test]
    fn test_not_holds_lists_start_states() {
        let (bdd, verifier) = check("int a; a = 1;", &["a == 1"], "0");
        assert_eq!(verifier.verdict(), Some(Verdict::NotHolds));
        let examples = verifier.counterexamples(&bdd, 3).unwrap();
        assert_eq!(examples.len(), 3);
        assert!(examples.iter().all(|e| e.starts_with("a=")));
        assert_eq!(verifier.counterexamples(&bdd, -1).unwrap().len(), 1000);
    }

    #[test]
    fn test_usage_errors() {
        let bdd = Bdd::new(2, 8);
        let mut verifier = Verifier::default();
        assert_eq!(verifier.verdict(), None);
        assert_eq!(verifier.counterexamples(&bdd, 1), Err(VerifyError::NoVerdict));
        assert_eq!(verifier.record_empty(), Verdict::EmptyModelOrProperty);
        assert_eq!(verifier.counterexamples(&bdd, 1), Err(VerifyError::NoVerdict));
        assert_eq!(verifier.counterexamples(&bdd, 0), Err(VerifyError::InvalidExampleCount(0)));
    }
}
