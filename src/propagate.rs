// SPDX-License-Identifier: Apache-2.0

//! Propagation of trivially-shaped linear polynomials into all parents of a
//! gate: constant zero (`ax`), constant one (`ax - a`), equality
//! (`ax - ay`) and negated equality (`ax + ay - a`).
//!
//! Propagation rewrites parents in place and is therefore disabled under
//! proof logging -- it would break proof reconstruction.

use crate::engine::Engine;
use crate::poly::Polynomial;

impl Engine {
    fn rewrite_parents(&mut self, g: crate::gate::GateId, p: &Polynomial) {
        let parents = self.gates.g(g).parents.clone();
        for parent in parents {
            if self.gates.g(parent).gate_constraint.is_none() {
                continue;
            }
            let gc = {
                let gc = self.gates.g(parent).gate_constraint.as_ref().unwrap();
                self.alg.copy_poly(gc)
            };
            let flip = self.unflip_poly(&gc);
            self.alg.free_poly(gc);
            let tmp = self.reduce_by_one_poly(&flip, p, false);
            self.alg.free_poly(flip);
            let tmp_for_check = self.alg.copy_poly(&tmp);
            self.gates.update_gate_poly(&mut self.alg, parent, tmp);
            self.gates.g_mut(parent).children_remove(g);
            self.check_if_propagate(&tmp_for_check);
            self.alg.free_poly(tmp_for_check);
        }
    }

    fn try_propagate_constant_zero(&mut self, p: &Polynomial) -> bool {
        // p = ax
        debug_assert!(p.degree() == 1 && p.len() == 1);
        let g = self.gate_of_lt(p);
        log::debug!("found constant 0: {}", self.gate_name(g));
        self.rewrite_parents(g, p);
        true
    }

    fn try_propagate_constant_one(&mut self, p: &Polynomial) -> bool {
        // p = ax - a
        debug_assert!(p.degree() == 1 && p.len() == 2);
        debug_assert!(p.mon(1).term.is_none());
        if p.lm().coeff != -&p.mon(1).coeff {
            return false;
        }
        let g = self.gate_of_lt(p);
        log::debug!("found constant 1: {}", self.gate_name(g));
        self.rewrite_parents(g, p);
        true
    }

    fn try_propagate_equality(&mut self, p: &Polynomial) -> bool {
        // p = ax - ay
        debug_assert!(p.degree() == 1 && p.len() == 2);
        if p.lm().coeff != -&p.mon(1).coeff {
            return false;
        }
        let g = self.gate_of_lt(p);
        log::debug!("found equality: {}", self.gate_name(g));
        self.rewrite_parents(g, p);
        true
    }

    fn try_propagate_negated_equality(&mut self, p: &Polynomial) -> bool {
        // p = ax + ay - a
        debug_assert!(p.degree() == 1 && p.len() == 3);
        if p.mon(2).term.is_some() {
            return false;
        }
        if p.lm().coeff != p.mon(1).coeff {
            return false;
        }
        if p.mon(1).coeff != -&p.mon(2).coeff {
            return false;
        }
        let g = self.gate_of_lt(p);
        log::debug!("found negated equality: {}", self.gate_name(g));
        self.rewrite_parents(g, p);
        true
    }

    /// Checks whether `p` matches one of the propagation patterns and, if
    /// so, rewrites all parents of its leading gate.
    pub fn check_if_propagate(&mut self, p: &Polynomial) -> bool {
        if p.is_constant_zero() || p.degree() > 1 || p.len() > 3 {
            return false;
        }
        if p.lt().is_none() {
            return false;
        }
        match p.len() {
            1 => self.try_propagate_constant_zero(p),
            2 => {
                if p.tail_term().is_none() {
                    self.try_propagate_constant_one(p)
                } else {
                    self.try_propagate_equality(p)
                }
            }
            _ => self.try_propagate_negated_equality(p),
        }
    }
}
