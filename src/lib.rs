//! # ctl-bdd: symbolic CTL model checking over Binary Decision Diagrams
//!
//! **`ctl-bdd`** verifies temporal properties of programs written in a tiny imperative language.
//! A program declares 16-bit integer variables (`int a;`) and uses assignments, `read(x)`,
//! `if`/`else` and `while` over C-like expressions. Its behaviour is translated into a
//! Kripke structure whose state sets and transition relation are Boolean functions,
//! and a CTL formula over numbered atomic predicates is evaluated on it by fixpoint iteration.
//!
//! ## Pipeline
//!
//! 1. [`program`] splits the source text into declarations and statements.
//! 2. [`flow`] builds the control-flow table: one row per statement, with successor addresses.
//! 3. [`encoding`] lays out a state as bits: the program counter, then every variable.
//! 4. [`kripke`] runs the program over concrete values and produces start states,
//!    transitions and the states where each atomic predicate holds.
//! 5. [`ctl`] compiles the formula to postfix and evaluates it to a set of states.
//! 6. [`verifier`] compares that set against the start states; [`decoder`] turns the
//!    violating states into readable counterexamples.
//!
//! [`session`] ties the stages together.
//!
//! ## Basic Usage
//!
//! ```rust
//! use ctl_bdd::session::Session;
//! use ctl_bdd::verifier::Verdict;
//!
//! let mut session = Session::default();
//! let program = "int a; a = 0; while (a < 3) { a = a + 1 }";
//! let verdict = session.verify(program, &["a == 3"], "AF 0").unwrap();
//! assert_eq!(verdict, Verdict::Holds);
//! assert!(session.counterexamples(-1).unwrap().is_empty());
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: the [`Bdd`][crate::bdd::Bdd] manager: hash-consed nodes with complemented edges,
//!   Boolean operations, quantification, relational product and variable renaming.
//! - **[`paths`]**: enumeration of satisfying cubes and their textual serialization.
//! - **[`expr`]**: arithmetic and logical expressions compiled to postfix.

pub mod bdd;
pub mod cache;
pub mod config;
pub mod ctl;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod flow;
pub mod kripke;
pub mod paths;
pub mod program;
pub mod reference;
pub mod session;
pub mod table;
pub mod utils;
pub mod verifier;
