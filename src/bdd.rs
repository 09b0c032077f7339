//! The [`Bdd`] manager: node storage, the operation cache, and every algorithm over [`Ref`]s.
//!
//! Variables are 1-indexed and the variable index is also its level:
//! smaller variables are closer to the root. Edges may be complemented
//! (see [`Ref`]), and the high edge of a stored node is never complemented.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;

use log::{debug, trace};
use num_bigint::BigUint;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{mix, pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        mix(pairing3(
            self.variable as u64,
            self.low.unsigned() as u64,
            self.high.unsigned() as u64,
        ))
    }
}

type Storage = Table<Node>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => mix(pairing3(
                f.unsigned() as u64,
                g.unsigned() as u64,
                h.unsigned() as u64,
            )),
        }
    }
}

pub struct Bdd {
    storage: RefCell<Storage>,
    cache: RefCell<Cache<OpKey, Ref>>,
    num_vars: u32,
    zero: Ref,
    one: Ref,
}

impl Bdd {
    /// Create a manager over variables `1..=num_vars` with an operation cache of `2^cache_bits` slots.
    pub fn new(num_vars: u32, cache_bits: usize) -> Self {
        debug!("Bdd::new(num_vars = {}, cache_bits = {})", num_vars, cache_bits);

        let mut storage = Storage::new(16);

        // Allocate the terminal node:
        let one = storage.alloc(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            num_vars,
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(64, 16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("num_vars", &self.num_vars)
            .field("size", &storage.size())
            .field("real_size", &storage.real_size())
            .finish()
    }
}

impl Bdd {
    pub fn zero(&self) -> Ref {
        self.zero
    }
    pub fn one(&self) -> Ref {
        self.one
    }
    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    /// Number of live nodes, including the terminal.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().real_size()
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        let cache = self.cache.borrow();
        (cache.hits(), cache.misses())
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).high
    }

    /// Low child of `node`, with the complement of the edge pushed down.
    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    /// High child of `node`, with the complement of the edge pushed down.
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == self.one.index()
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        trace!("mk(v = {}, low = {}, high = {})", v, low, high);
        assert_ne!(v, 0, "Variable index should not be zero");

        if low == high {
            return low;
        }

        // The high edge of a stored node is always regular.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        let index = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        Ref::positive(index)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert!(
            (1..=self.num_vars).contains(&v),
            "Variable {} is out of range 1..={}",
            v,
            self.num_vars
        );
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of literals: `v` stands for the variable, `-v` for its negation.
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&lit| std::cmp::Reverse(lit.unsigned_abs()));
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            let v = lit.unsigned_abs();
            current = if lit < 0 {
                self.mk_node(v, current, self.zero)
            } else {
                self.mk_node(v, self.zero, current)
            };
        }
        current
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        debug_assert_eq!(v, self.variable(node.index()));
        (self.low_node(node), self.high_node(node))
    }

    fn ite_trivial(&self, f: Ref, g: Ref, h: Ref) -> Option<Ref> {
        if self.is_one(f) {
            Some(g)
        } else if self.is_zero(f) {
            Some(h)
        } else if g == h {
            Some(g)
        } else if self.is_one(g) && self.is_zero(h) {
            Some(f)
        } else if self.is_zero(g) && self.is_one(h) {
            Some(-f)
        } else {
            None
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        trace!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        if let Some(res) = self.ite_trivial(f, g, h) {
            return res;
        }

        // ite(F,F,H) => ite(F,1,H), ite(F,~F,H) => ite(F,0,H), and symmetric for H
        let g = if g == f {
            self.one
        } else if g == -f {
            self.zero
        } else {
            g
        };
        let h = if h == f {
            self.zero
        } else if h == -f {
            self.one
        } else {
            h
        };
        if let Some(res) = self.ite_trivial(f, g, h) {
            return res;
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };
        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, negate) = if g.is_negated() {
            (-g, -h, true)
        } else {
            (g, h, false)
        };

        let key = OpKey::Ite(f, g, h);
        let cached = self.cache.borrow().get(&key);
        let res = match cached {
            Some(res) => res,
            None => {
                // Determine the top variable (F is never a constant here):
                let m = [g, h]
                    .into_iter()
                    .filter(|&x| !self.is_terminal(x))
                    .map(|x| self.variable(x.index()))
                    .fold(self.variable(f.index()), u32::min);

                let (f0, f1) = self.top_cofactors(f, m);
                let (g0, g1) = self.top_cofactors(g, m);
                let (h0, h1) = self.top_cofactors(h, m);

                let e = self.apply_ite(f0, g0, h0);
                let t = self.apply_ite(f1, g1, h1);

                let res = self.mk_node(m, e, t);
                self.cache.borrow_mut().insert(key, res);
                res
            }
        };

        if negate {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    fn quantified_mask(&self, vars: &[u32]) -> Vec<bool> {
        let mut mask = vec![false; self.num_vars as usize + 1];
        for &v in vars {
            assert!(
                (1..=self.num_vars).contains(&v),
                "Variable {} is out of range 1..={}",
                v,
                self.num_vars
            );
            mask[v as usize] = true;
        }
        mask
    }

    /// Existential quantification: `∃ vars. f`.
    pub fn exists(&self, f: Ref, vars: &[u32]) -> Ref {
        debug!("exists(f = {}, |vars| = {})", f, vars.len());
        let mask = self.quantified_mask(vars);
        let last = vars.iter().copied().max().unwrap_or(0);
        let mut memo = HashMap::new();
        self.exists_rec(f, &mask, last, &mut memo)
    }

    fn exists_rec(&self, f: Ref, mask: &[bool], last: u32, memo: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let v = self.variable(f.index());
        if v > last {
            return f;
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }

        let e = self.exists_rec(self.low_node(f), mask, last, memo);
        let res = if mask[v as usize] && self.is_one(e) {
            self.one
        } else {
            let t = self.exists_rec(self.high_node(f), mask, last, memo);
            if mask[v as usize] {
                self.apply_or(e, t)
            } else {
                self.mk_node(v, e, t)
            }
        };

        memo.insert(f, res);
        res
    }

    /// Relational product: `∃ vars. (f ∧ g)`, without building the conjunction first.
    pub fn rel_product(&self, f: Ref, g: Ref, vars: &[u32]) -> Ref {
        debug!("rel_product(f = {}, g = {}, |vars| = {})", f, g, vars.len());
        let mask = self.quantified_mask(vars);
        let last = vars.iter().copied().max().unwrap_or(0);
        let mut memo = HashMap::new();
        let mut exists_memo = HashMap::new();
        self.rel_product_rec(f, g, &mask, last, &mut memo, &mut exists_memo)
    }

    fn rel_product_rec(
        &self,
        f: Ref,
        g: Ref,
        mask: &[bool],
        last: u32,
        memo: &mut HashMap<(Ref, Ref), Ref>,
        exists_memo: &mut HashMap<Ref, Ref>,
    ) -> Ref {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return self.zero;
        }
        if self.is_one(f) || f == g {
            return self.exists_rec(g, mask, last, exists_memo);
        }
        if self.is_one(g) {
            return self.exists_rec(f, mask, last, exists_memo);
        }

        let key = if f <= g { (f, g) } else { (g, f) };
        if let Some(&res) = memo.get(&key) {
            return res;
        }

        let m = self
            .variable(f.index())
            .min(self.variable(g.index()));
        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);

        let res = if m > last {
            self.apply_and(f, g)
        } else if mask[m as usize] {
            let e = self.rel_product_rec(f0, g0, mask, last, memo, exists_memo);
            if self.is_one(e) {
                self.one
            } else {
                let t = self.rel_product_rec(f1, g1, mask, last, memo, exists_memo);
                self.apply_or(e, t)
            }
        } else {
            let e = self.rel_product_rec(f0, g0, mask, last, memo, exists_memo);
            let t = self.rel_product_rec(f1, g1, mask, last, memo, exists_memo);
            self.mk_node(m, e, t)
        };

        memo.insert(key, res);
        res
    }

    /// Rename variables of `f` according to `map`; variables absent from the map are kept.
    pub fn rename_vars(&self, f: Ref, map: &HashMap<u32, u32>) -> Ref {
        debug!("rename_vars(f = {}, |map| = {})", f, map.len());
        let mut memo = HashMap::new();
        self.rename_rec(f, map, &mut memo)
    }

    fn rename_rec(&self, f: Ref, map: &HashMap<u32, u32>, memo: &mut HashMap<u32, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.rename_rec(-f, map, memo);
        }
        if let Some(&res) = memo.get(&f.index()) {
            return res;
        }

        let v = self.variable(f.index());
        let e = self.rename_rec(self.low(f.index()), map, memo);
        let t = self.rename_rec(self.high(f.index()), map, memo);
        let w = map.get(&v).copied().unwrap_or(v);
        let res = self.apply_ite(self.mk_var(w), t, e);

        memo.insert(f.index(), res);
        res
    }

    /// Indices of all nodes reachable from `roots`, as a mask over storage indices.
    fn mark(&self, roots: impl IntoIterator<Item = Ref>) -> Vec<bool> {
        let storage = self.storage.borrow();
        let mut alive = vec![false; storage.size() + 1];
        alive[self.one.index() as usize] = true;
        let mut stack: Vec<u32> = roots.into_iter().map(|r| r.index()).collect();
        while let Some(i) = stack.pop() {
            if alive[i as usize] {
                continue;
            }
            alive[i as usize] = true;
            let node = storage.value(i);
            stack.push(node.low.index());
            stack.push(node.high.index());
        }
        alive
    }

    /// Number of nodes in `f`, including the terminal.
    pub fn size(&self, f: Ref) -> usize {
        self.mark([f]).into_iter().filter(|&x| x).count()
    }

    /// Drop every node not reachable from `roots`. Handles to dropped nodes become invalid.
    pub fn collect_garbage(&self, roots: &[Ref]) -> usize {
        let before = self.num_nodes();
        self.cache.borrow_mut().clear();
        let alive = self.mark(roots.iter().copied());
        let dropped = self
            .storage
            .borrow_mut()
            .retain(|i| alive.get(i as usize).copied().unwrap_or(false));
        debug!(
            "Garbage collection: {} -> {} nodes ({} dropped)",
            before,
            self.num_nodes(),
            dropped
        );
        dropped
    }

    /// Number of satisfying assignments of `f` over variables `1..=num_vars`.
    pub fn sat_count(&self, f: Ref, num_vars: u32) -> BigUint {
        let mut memo = HashMap::new();
        let level = self.level(f).min(num_vars + 1);
        let count = self.sat_count_rec(f, num_vars, &mut memo);
        count << (level - 1)
    }

    fn level(&self, f: Ref) -> u32 {
        if self.is_terminal(f) {
            self.num_vars + 1
        } else {
            self.variable(f.index())
        }
    }

    /// Satisfying assignments over variables `level(f)..=num_vars`.
    fn sat_count_rec(&self, f: Ref, num_vars: u32, memo: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(f) {
            return BigUint::from(0u32);
        }
        if self.is_one(f) {
            return BigUint::from(1u32);
        }
        if let Some(res) = memo.get(&f) {
            return res.clone();
        }

        let v = self.variable(f.index());
        assert!(v <= num_vars, "Variable {} is beyond {}", v, num_vars);
        let low = self.low_node(f);
        let high = self.high_node(f);
        let levels = |x: Ref| self.level(x).min(num_vars + 1) - v - 1;
        let res = (self.sat_count_rec(low, num_vars, memo) << levels(low))
            + (self.sat_count_rec(high, num_vars, memo) << levels(high));

        memo.insert(f, res.clone());
        res
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);

        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.high_node(x), bdd.one());
        assert_eq!(bdd.low_node(x), bdd.zero());
    }

    #[test]
    fn test_not_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let not_x = bdd.apply_not(x);

        assert_eq!(not_x, -x);
        assert_eq!(bdd.high_node(not_x), bdd.zero());
        assert_eq!(bdd.low_node(not_x), bdd.one());
    }

    #[test]
    fn test_hash_consing() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);
        let g = bdd.apply_and(y, x);

        assert_eq!(f, g);
        assert_eq!(bdd.mk_var(1), x);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = -bdd.apply_and(x, y);
        let g = bdd.apply_or(-x, -y);

        assert_eq!(f, g);
    }

    #[test]
    fn test_xor_eq() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let xor = bdd.apply_xor(x, y);
        let eq = bdd.apply_eq(x, y);

        assert_eq!(xor, -eq);
        assert!(bdd.is_zero(bdd.apply_xor(x, x)));
        assert!(bdd.is_one(bdd.apply_eq(y, y)));
    }

    #[test]
    fn test_cube() {
        let bdd = Bdd::default();

        let f = bdd.cube([3, -1, 2]);
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);
        let g = bdd.apply_and(bdd.apply_and(-x1, x2), x3);

        assert_eq!(f, g);
        assert_eq!(bdd.variable(f.index()), 1);
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_and(x, bdd.apply_or(y, z));

        assert_eq!(bdd.exists(f, &[2]), x);
        assert_eq!(bdd.exists(f, &[1]), bdd.apply_or(y, z));
        assert!(bdd.is_one(bdd.exists(f, &[1, 2, 3])));
        assert!(bdd.is_zero(bdd.exists(bdd.zero(), &[1])));
    }

    #[test]
    fn test_rel_product_matches_exists_of_and() {
        let bdd = Bdd::default();

        let x: Vec<Ref> = (1..=6).map(|v| bdd.mk_var(v)).collect();
        let f = bdd.apply_or(bdd.apply_and(x[0], x[3]), bdd.apply_xor(x[1], x[4]));
        let g = bdd.apply_and(bdd.apply_eq(x[3], x[2]), bdd.apply_or(x[4], x[5]));

        let vars = [4, 5, 6];
        let expected = bdd.exists(bdd.apply_and(f, g), &vars);
        assert_eq!(bdd.rel_product(f, g, &vars), expected);
    }

    #[test]
    fn test_rename_vars() {
        let bdd = Bdd::default();

        let f = bdd.apply_and(bdd.mk_var(1), -bdd.mk_var(2));
        let map = HashMap::from([(1, 3), (2, 4)]);
        let g = bdd.rename_vars(f, &map);

        assert_eq!(g, bdd.apply_and(bdd.mk_var(3), -bdd.mk_var(4)));
        assert_eq!(bdd.rename_vars(-f, &map), -g);
    }

    #[test]
    fn test_sat_count() {
        let bdd = Bdd::new(4, 10);

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(3);
        let f = bdd.apply_or(x, y);

        assert_eq!(bdd.sat_count(f, 4), BigUint::from(12u32));
        assert_eq!(bdd.sat_count(-f, 4), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(bdd.one(), 4), BigUint::from(16u32));
        assert_eq!(bdd.sat_count(bdd.zero(), 4), BigUint::from(0u32));
    }

    #[test]
    fn test_collect_garbage_keeps_roots() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let keep = bdd.apply_and(x, y);
        let _garbage = bdd.apply_xor(y, z);

        let dropped = bdd.collect_garbage(&[keep]);
        assert!(dropped > 0);
        assert_eq!(bdd.size(keep), 3);
        assert_eq!(bdd.apply_and(bdd.mk_var(1), bdd.mk_var(2)), keep);
    }
}
