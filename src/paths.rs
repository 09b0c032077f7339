//! Enumeration of satisfying paths, and the textual cube serialization built on it.
//!
//! Each path to TRUE is a cube: a conjunction of literals over the variables
//! on that path, in variable order. Variables absent from a path are "don't care".
//!
//! The serialization writes each cube as `<i:v, ...>`, where `i` is the
//! zero-based bit index (variable minus one) and `v` is `0` or `1`.
//! Cubes are concatenated; the constant TRUE is `<>` and FALSE is the empty string.

use std::fmt::Write;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns an iterator over all satisfying paths (paths to TRUE) of `f`.
    ///
    /// Literals are signed variables: `v` for true, `-v` for false.
    pub fn paths(&self, f: Ref) -> BddPaths<'_> {
        BddPaths::new(self, f)
    }

    /// Serialize at most `max_cubes` cubes of `f` (all of them when `None`).
    pub fn to_cube_string(&self, f: Ref, max_cubes: Option<usize>) -> String {
        let mut out = String::new();
        for path in self.paths(f).take(max_cubes.unwrap_or(usize::MAX)) {
            out.push('<');
            for (i, &lit) in path.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let bit = lit.unsigned_abs() - 1;
                // Writing into a String cannot fail.
                let _ = write!(out, "{}:{}", bit, u8::from(lit > 0));
            }
            out.push('>');
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Branch {
    High,
    Low,
    Done,
}

#[derive(Debug)]
struct StackFrame {
    node: Ref,
    next_branch: Branch,
}

/// An iterator over satisfying paths of a BDD, created by [`Bdd::paths()`].
///
/// Depth-first, high branch first. The current path is a single vector that
/// grows and shrinks with the stack.
pub struct BddPaths<'a> {
    bdd: &'a Bdd,
    stack: Vec<StackFrame>,
    current_path: Vec<i32>,
}

impl<'a> BddPaths<'a> {
    pub fn new(bdd: &'a Bdd, f: Ref) -> Self {
        BddPaths {
            bdd,
            stack: vec![StackFrame {
                node: f,
                next_branch: Branch::High,
            }],
            current_path: Vec::new(),
        }
    }

    fn backtrack(&mut self) {
        self.stack.pop();
        if !self.stack.is_empty() {
            self.current_path.pop();
        }
    }
}

impl Iterator for BddPaths<'_> {
    type Item = Vec<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let node = frame.node;

            if self.bdd.is_one(node) {
                let result = self.current_path.clone();
                self.backtrack();
                return Some(result);
            }
            if self.bdd.is_zero(node) {
                self.backtrack();
                continue;
            }

            let var = self.bdd.variable(node.index()) as i32;
            let branch = frame.next_branch;
            match branch {
                Branch::High => {
                    frame.next_branch = Branch::Low;
                    let child = self.bdd.high_node(node);
                    self.current_path.push(var);
                    self.stack.push(StackFrame {
                        node: child,
                        next_branch: Branch::High,
                    });
                }
                Branch::Low => {
                    frame.next_branch = Branch::Done;
                    let child = self.bdd.low_node(node);
                    self.current_path.push(-var);
                    self.stack.push(StackFrame {
                        node: child,
                        next_branch: Branch::High,
                    });
                }
                Branch::Done => self.backtrack(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_paths_of_constants() {
        let bdd = Bdd::default();
        assert_eq!(bdd.paths(bdd.one()).collect::<Vec<_>>(), vec![Vec::<i32>::new()]);
        assert_eq!(bdd.paths(bdd.zero()).count(), 0);
    }

    #[test]
    fn test_paths_of_xor() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_xor(x, y);

        let paths: Vec<_> = bdd.paths(f).collect();
        assert_eq!(paths, vec![vec![1, -2], vec![-1, 2]]);
    }

    #[test]
    fn test_cube_string() {
        let bdd = Bdd::default();
        let f = bdd.cube([1, -4]);
        assert_eq!(bdd.to_cube_string(f, None), "<0:1, 3:0>");

        let g = bdd.apply_or(f, -bdd.mk_var(1));
        assert_eq!(bdd.to_cube_string(g, None), "<0:1, 3:0><0:0>");
        assert_eq!(bdd.to_cube_string(g, Some(1)), "<0:1, 3:0>");

        assert_eq!(bdd.to_cube_string(bdd.one(), None), "<>");
        assert_eq!(bdd.to_cube_string(bdd.zero(), None), "");
    }
}
