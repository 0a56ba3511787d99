// SPDX-License-Identifier: Apache-2.0

//! Pseudo-Boolean to CNF lowering: `sum(w_i * x_i) >= rhs` over Boolean
//! `x_i` with integer weights.
//!
//! The encoding walks a decision diagram over the clamped slack: node
//! `(i, slack)` stands for "the suffix from literal `i` can still reach
//! `slack`".  Trivially-true and trivially-false nodes fold away; every
//! inner node becomes a fresh Tseitin literal with if-then-else clauses.
//! The root is asserted as a unit clause, so the appended clauses enforce
//! the constraint.

use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Node {
    True,
    False,
    Lit(i32),
}

struct Encoder<'a> {
    weights: &'a [i64],
    lits: &'a [i32],
    /// max/min achievable suffix sums.
    max_suffix: Vec<i64>,
    min_suffix: Vec<i64>,
    memo: HashMap<(usize, i64), Node>,
    clauses: &'a mut Vec<Vec<i32>>,
    next_fresh: i32,
}

impl Encoder<'_> {
    fn build(&mut self, i: usize, slack: i64) -> Node {
        if slack <= self.min_suffix[i] {
            return Node::True;
        }
        if slack > self.max_suffix[i] {
            return Node::False;
        }
        let key = (i, slack.clamp(self.min_suffix[i], self.max_suffix[i] + 1));
        if let Some(&n) = self.memo.get(&key) {
            return n;
        }

        let w = self.weights[i];
        let x = self.lits[i];
        let hi = self.build(i + 1, slack - w);
        let lo = self.build(i + 1, slack);

        let node = match (hi, lo) {
            (Node::True, Node::True) => Node::True,
            (Node::False, Node::False) => Node::False,
            _ => {
                let f = self.next_fresh;
                self.next_fresh += 1;
                // f <-> (x ? hi : lo), with constant branches folded.
                match hi {
                    Node::True => {}
                    Node::False => self.clauses.push(vec![-f, -x]),
                    Node::Lit(h) => self.clauses.push(vec![-f, -x, h]),
                }
                match lo {
                    Node::True => {}
                    Node::False => self.clauses.push(vec![-f, x]),
                    Node::Lit(l) => self.clauses.push(vec![-f, x, l]),
                }
                match hi {
                    Node::True => self.clauses.push(vec![f, -x]),
                    Node::False => {}
                    Node::Lit(h) => self.clauses.push(vec![f, -x, -h]),
                }
                match lo {
                    Node::True => self.clauses.push(vec![f, x]),
                    Node::False => {}
                    Node::Lit(l) => self.clauses.push(vec![f, x, -l]),
                }
                Node::Lit(f)
            }
        };
        self.memo.insert(key, node);
        node
    }
}

/// Appends clauses enforcing `sum(weights[i]*lits[i]) >= rhs` to `clauses`.
/// Fresh Tseitin variables are allocated from `first_fresh`; the next free
/// variable is returned.
pub fn encode_geq(
    weights: &[i64],
    lits: &[i32],
    rhs: i64,
    clauses: &mut Vec<Vec<i32>>,
    first_fresh: i32,
) -> i32 {
    assert_eq!(weights.len(), lits.len());
    let n = weights.len();

    let mut max_suffix = vec![0i64; n + 1];
    let mut min_suffix = vec![0i64; n + 1];
    for i in (0..n).rev() {
        max_suffix[i] = max_suffix[i + 1] + weights[i].max(0);
        min_suffix[i] = min_suffix[i + 1] + weights[i].min(0);
    }

    let mut enc = Encoder {
        weights,
        lits,
        max_suffix,
        min_suffix,
        memo: HashMap::new(),
        clauses,
        next_fresh: first_fresh,
    };
    let root = enc.build(0, rhs);
    let next = enc.next_fresh;
    match root {
        Node::True => {}
        Node::False => {
            // Unsatisfiable constraint: the empty clause.
            clauses.push(vec![]);
        }
        Node::Lit(f) => clauses.push(vec![f]),
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use varisat::{ExtendFormula, Lit, Solver};

    /// Checks the encoding by solving under each full input assignment: the
    /// clause set must be satisfiable exactly when the constraint holds.
    fn check_exhaustive(weights: &[i64], rhs: i64) {
        let n = weights.len();
        let lits: Vec<i32> = (1..=n as i32).collect();
        let mut clauses = Vec::new();
        let _ = encode_geq(weights, &lits, rhs, &mut clauses, n as i32 + 1);

        for mask in 0..(1u32 << n) {
            let mut solver = Solver::new();
            for clause in &clauses {
                let lits: Vec<Lit> = clause.iter().map(|&l| Lit::from_dimacs(l as isize)).collect();
                solver.add_clause(&lits);
            }
            let mut assumptions = Vec::new();
            let mut sum = 0i64;
            for (i, &w) in weights.iter().enumerate() {
                let bit = (mask >> i) & 1 == 1;
                if bit {
                    sum += w;
                }
                let l = Lit::from_dimacs((i + 1) as isize);
                assumptions.push(if bit { l } else { !l });
            }
            solver.assume(&assumptions);
            let sat = solver.solve().unwrap();
            assert_eq!(
                sat,
                sum >= rhs,
                "weights {:?} rhs {} mask {:b}",
                weights,
                rhs,
                mask
            );
        }
    }

    #[test]
    fn test_unit_weights() {
        check_exhaustive(&[1, 1, 1], 2);
        check_exhaustive(&[1, 1], 1);
    }

    #[test]
    fn test_mixed_weights() {
        check_exhaustive(&[2, -1, 1], 1);
        check_exhaustive(&[-2, 3, -1, 1], 0);
        check_exhaustive(&[3, -3, 2], -1);
    }

    #[test]
    fn test_trivial_bounds() {
        // Always true.
        check_exhaustive(&[1, 1], -5);
        // Never true.
        check_exhaustive(&[1, 1], 5);
    }
}
