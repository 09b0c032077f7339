//! Bit layout of program states.
//!
//! A state is the program counter followed by every declared variable, each
//! field written most significant bit first. The layout is doubled: the
//! "current" half occupies BDD variables `1..=W` and the "next" half
//! `W+1..=2W`, with bit `i` of a half being BDD variable `i + 1` (plus `W`
//! for the next half).

use std::collections::HashMap;

use crate::bdd::Bdd;
use crate::program::{VarKind, Variable};
use crate::reference::Ref;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Half {
    Current,
    Next,
}

/// A named run of bits inside one half.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Field {
    pub variable: Variable,
    /// Zero-based position of the most significant bit.
    pub offset: usize,
}

impl Field {
    pub fn width(&self) -> usize {
        self.variable.width()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StateEncoding {
    /// The program counter first, then the declared variables.
    fields: Vec<Field>,
    half_width: usize,
}

impl StateEncoding {
    pub fn new(variables: &[Variable]) -> Self {
        let mut fields = Vec::with_capacity(variables.len() + 1);
        let mut offset = 0;
        for variable in std::iter::once(Variable::program_counter()).chain(variables.iter().cloned()) {
            let width = variable.width();
            fields.push(Field { variable, offset });
            offset += width;
        }
        Self {
            fields,
            half_width: offset,
        }
    }

    /// Number of bits in one half.
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Number of BDD variables covering both halves.
    pub fn num_bdd_vars(&self) -> u32 {
        2 * self.half_width as u32
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields of the declared variables, without the program counter.
    pub fn variable_fields(&self) -> &[Field] {
        &self.fields[1..]
    }

    fn base(&self, half: Half) -> u32 {
        match half {
            Half::Current => 1,
            Half::Next => 1 + self.half_width as u32,
        }
    }

    /// BDD variables of one half, in order.
    pub fn bdd_vars(&self, half: Half) -> Vec<u32> {
        let base = self.base(half);
        (0..self.half_width as u32).map(|i| base + i).collect()
    }

    /// Map from every current-half BDD variable to its next-half counterpart.
    pub fn current_to_next(&self) -> HashMap<u32, u32> {
        let shift = self.half_width as u32;
        self.bdd_vars(Half::Current).into_iter().map(|v| (v, v + shift)).collect()
    }

    fn push_field_literals(&self, field: &Field, value: u16, half: Half, out: &mut Vec<i32>) {
        let first = self.base(half) + field.offset as u32;
        let width = field.width();
        for bit in 0..width {
            let v = (first + bit as u32) as i32;
            let set = (value >> (width - 1 - bit)) & 1 == 1;
            out.push(if set { v } else { -v });
        }
    }

    /// Literals fixing the program counter and every known variable of `binding`.
    ///
    /// Variables bound to `None` contribute no literals and stay unconstrained.
    pub fn state_literals(&self, pc: usize, binding: &[Option<i16>], half: Half) -> Vec<i32> {
        debug_assert_eq!(binding.len(), self.fields.len() - 1);
        let mut literals = Vec::with_capacity(self.half_width);
        self.push_field_literals(&self.fields[0], pc as u16, half, &mut literals);
        for (field, value) in self.variable_fields().iter().zip(binding) {
            if let Some(value) = value {
                debug_assert_eq!(field.variable.kind(), VarKind::Integer);
                self.push_field_literals(field, *value as u16, half, &mut literals);
            }
        }
        literals
    }

    /// The set of states with this program counter and these known values.
    pub fn state(&self, bdd: &Bdd, pc: usize, binding: &[Option<i16>], half: Half) -> Ref {
        bdd.cube(self.state_literals(pc, binding, half))
    }

    /// A single transition from (`pc`, `from`) to (`next_pc`, `to`).
    pub fn edge(&self, bdd: &Bdd, pc: usize, from: &[Option<i16>], next_pc: usize, to: &[Option<i16>]) -> Ref {
        let mut literals = self.state_literals(pc, from, Half::Current);
        literals.extend(self.state_literals(next_pc, to, Half::Next));
        bdd.cube(literals)
    }
}
