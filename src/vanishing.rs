// SPDX-License-Identifier: Apache-2.0

//! Discovery of vanishing products between gates.
//!
//! Two relations are tracked on every gate: `van_twins` (`g*h == 0` in the
//! Boolean model) and `dual_twins` (`g*(1-h) == 0`, i.e. `g` implies `h`).
//! The light pass only pairs each XOR root with its sibling AND; the full
//! pass (enabled by the carry-lookahead probe) also derives the XOR-child
//! pairs, walks them upwards through positive parents, and closes triangles.
//!
//! Under proof logging each discovered product is derived as a polynomial
//! combination of circuit axioms and recorded in `van_poly` /
//! `dual_van_poly` so later cancellations can reference it.

use num_bigint::BigInt;
use num_traits::One;

use crate::engine::Engine;
use crate::gate::GateId;
use crate::poly::{Monomial, Polynomial};

impl Engine {
    fn copy_aig_poly(&mut self, id: GateId) -> Polynomial {
        let p = self
            .gates
            .g(id)
            .aig_poly
            .as_ref()
            .expect("aig polynomial present");
        self.alg.copy_poly(p)
    }

    fn push_van_pair(&mut self, a: GateId, b: GateId) {
        self.gates.g_mut(a).van_twins.push(b);
        self.gates.g_mut(b).van_twins.push(a);
        self.stats.van_mon_prop_count += 1;
    }

    fn push_dual_twin(&mut self, a: GateId, b: GateId) {
        if !self.gates.g(a).is_dual_twin(b) {
            self.gates.g_mut(a).dual_twins.push(b);
        }
    }

    // ----- proof-mode derivations ----------------------------------------

    /// Derives `l*r` as a combination axiom for the two fan-ins of an XOR
    /// root (they exclude each other).
    fn gen_xor_child_van_constraint(&mut self, l: GateId, r: GateId) {
        let l_aig = self.copy_aig_poly(l);
        let r_aig = self.copy_aig_poly(r);
        let l_unfl = self.unflip_poly(&l_aig);
        let r_unfl = self.unflip_poly(&r_aig);
        let mut result = self.alg.multiply_poly(&l_unfl, &r_unfl);
        if let Some(proof) = self.proof.as_mut() {
            proof.mul_rule(&self.alg.pool, l_unfl.idx(), &r_unfl, &mut result);
        }
        if let Some(lt) = result.lt() {
            self.alg.pool.retain(lt);
            if let Some(old) = self.van_poly.insert(lt, result) {
                self.alg.free_poly(old);
                self.alg.pool.release(lt);
            }
        } else {
            self.alg.free_poly(result);
        }
        self.alg.free_poly(l_aig);
        self.alg.free_poly(r_aig);
        self.alg.free_poly(l_unfl);
        self.alg.free_poly(r_unfl);
    }

    /// The residual linear form of an XOR root after reducing by its two
    /// internal ANDs.
    fn xor_reduced(&mut self, xor_gate: GateId) -> Polynomial {
        let l = self.gates.g(xor_gate).children[0];
        let r = *self.gates.g(xor_gate).children.last().unwrap();
        let l_aig = self.copy_aig_poly(l);
        let r_aig = self.copy_aig_poly(r);
        let x_aig = self.copy_aig_poly(xor_gate);
        let l_unfl = self.unflip_poly(&l_aig);
        let r_unfl = self.unflip_poly(&r_aig);
        let xor_unfl = self.unflip_poly(&x_aig);
        let xor_tmp = self.reduce_by_one_poly(&xor_unfl, &l_unfl, false);
        let xor_red = self.reduce_by_one_poly(&xor_tmp, &r_unfl, false);
        for p in [l_aig, r_aig, x_aig, l_unfl, r_unfl, xor_unfl, xor_tmp] {
            self.alg.free_poly(p);
        }
        xor_red
    }

    /// Derives the dual-twin constraint `and*(1-xor) == 0` between an XOR
    /// root and its sibling AND over the same fan-ins.
    fn gen_xor_and_van_constraint(&mut self, xor_gate: GateId, andg: GateId) {
        let xor_red = self.xor_reduced(xor_gate);
        let and_aig = self.copy_aig_poly(andg);
        let and_tmp = self.unflip_poly(&and_aig);
        self.alg.free_poly(and_aig);
        self.emit_dual_van_step(&xor_red, &and_tmp);
        self.alg.free_poly(xor_red);
        self.alg.free_poly(and_tmp);
    }

    /// `result = and*lt(xor_red) + xor_red*tail(and) - and`, recorded in
    /// `dual_van_poly` under its leading term.
    pub(crate) fn emit_dual_van_step(&mut self, xor_red: &Polynomial, and_tmp: &Polynomial) {
        let lt_red = xor_red.lt().expect("reduced xor has a leading term");
        let left0 = self.alg.mul_term(and_tmp, Some(lt_red));
        let tail = self.alg.tail_poly(and_tmp);
        let right0 = self.alg.multiply_poly(xor_red, &tail);
        let result0 = self.alg.add_poly(&left0, &right0);
        let mut result1 = self.alg.sub_poly(&result0, and_tmp);

        let t = self.alg.pool.retain_opt(Some(lt_red));
        let resp0 = self.alg.poly_from_mono(BigInt::one(), t);
        let min_one = self.alg.poly_from_mono(-BigInt::one(), None);
        if let Some(proof) = self.proof.as_mut() {
            proof.vector_combi_rule(
                &self.alg.pool,
                &[and_tmp.idx(), xor_red.idx(), and_tmp.idx()],
                &[&resp0, &tail, &min_one],
                &mut result1,
            );
        }
        for p in [left0, right0, result0, resp0, min_one, tail] {
            self.alg.free_poly(p);
        }

        if let Some(lt) = result1.lt() {
            self.alg.pool.retain(lt);
            if let Some(old) = self.dual_van_poly.insert(lt, result1) {
                self.alg.free_poly(old);
                self.alg.pool.release(lt);
            }
        } else {
            self.alg.free_poly(result1);
        }
    }

    /// Walks positive parent chains of `gp_gate` multiplying the vanishing
    /// product upwards; every derived product becomes a new axiom.
    fn propagate_xor_and_proof(&mut self, gp_gate: GateId, g: GateId, andg: GateId, p: &Polynomial) {
        let gp_parents = self.gates.g(gp_gate).aig_parents.clone();
        let gp_num = self.alg.pool.var(self.gates.g(gp_gate).v).num;
        for gpp_lit in gp_parents {
            if gpp_lit & 1 != 0 {
                continue;
            }
            let Some(gpp) = self.gates.gate(gpp_lit) else {
                continue;
            };
            let gpp_num = self.alg.pool.var(self.gates.g(gpp).v).num;
            let Some(and1) = self.aig.and(gpp_num as u32).copied() else {
                continue;
            };
            let (l, r) = (and1.rhs0, and1.rhs1);
            if crate::aiger::strip(l) as i64 == gp_num && crate::aiger::sign(l) {
                continue;
            }
            if crate::aiger::strip(r) as i64 == gp_num && crate::aiger::sign(r) {
                continue;
            }

            let and_lm = {
                let and_poly = self.gates.g(andg).aig_poly.as_ref().unwrap();
                self.alg.copy_mono(and_poly.lm())
            };
            let f1 = {
                self.alg.push_end(and_lm);
                self.alg.build_poly()
            };
            let gpp_aig = self.copy_aig_poly(gpp);
            let tmp0 = self.unflip_poly(&gpp_aig);
            let left = self.alg.multiply_poly(&tmp0, &f1);
            let tail0 = self.alg.tail_poly(&tmp0);
            let right = self.alg.multiply_poly(p, &tail0);
            let mut res = self.alg.add_poly(&left, &right);
            if let Some(proof) = self.proof.as_mut() {
                proof.vector_combi_rule(
                    &self.alg.pool,
                    &[tmp0.idx(), p.idx()],
                    &[&f1, &tail0],
                    &mut res,
                );
            }
            self.alg.free_poly(gpp_aig);
            self.alg.free_poly(left);
            self.alg.free_poly(right);
            self.alg.free_poly(f1);
            self.alg.free_poly(tail0);
            self.alg.free_poly(tmp0);

            let in_pos = self.gates.g(g).is_in_pos_parents(gpp_num);
            if in_pos {
                if let Some(lt) = res.lt() {
                    let copy = self.alg.copy_poly(&res);
                    self.alg.pool.retain(lt);
                    if let Some(old) = self.van_poly.insert(lt, copy) {
                        self.alg.free_poly(old);
                        self.alg.pool.release(lt);
                    }
                }
                let res_copy = self.alg.copy_poly(&res);
                self.propagate_xor_and_proof(andg, andg, gpp, &res_copy);
                self.alg.free_poly(res_copy);
            }
            self.propagate_xor_and_proof(gpp, g, andg, &res);
            self.alg.free_poly(res);
        }
    }

    fn gen_xor_and_van_constraint_and_propagate(
        &mut self,
        gp_gate: GateId,
        xor_gate: GateId,
        andg: GateId,
    ) {
        let xor_red = self.xor_reduced(xor_gate);
        let gp_aig = self.copy_aig_poly(gp_gate);
        let tmp0 = self.unflip_poly(&gp_aig);
        let res = self.reduce_by_one_poly(&tmp0, &xor_red, false);
        let and_aig = self.copy_aig_poly(andg);
        let and_tmp = self.unflip_poly(&and_aig);

        // Step 1: the dual-twin product.
        self.emit_dual_van_step(&xor_red, &and_tmp);

        // Step 2: and*lm(res) - res*tail(and) vanishes.
        let lm = self.alg.copy_mono(res.lm());
        let left = self.alg.mul_monomial(&and_tmp, &lm);
        let resp = {
            self.alg.push_end(lm);
            self.alg.build_poly()
        };
        let and_tail = self.alg.tail_poly(&and_tmp);
        let tmp = self.alg.mul_const(&and_tail, &-BigInt::one());
        let right = self.alg.multiply_poly(&res, &tmp);
        let mut result = self.alg.add_poly(&left, &right);
        if let Some(proof) = self.proof.as_mut() {
            proof.vector_combi_rule(
                &self.alg.pool,
                &[and_tmp.idx(), res.idx()],
                &[&resp, &tmp],
                &mut result,
            );
        }
        if let Some(lt) = result.lt() {
            let copy = self.alg.copy_poly(&result);
            self.alg.pool.retain(lt);
            if let Some(old) = self.van_poly.insert(lt, copy) {
                self.alg.free_poly(old);
                self.alg.pool.release(lt);
            }
        }

        self.propagate_xor_and_proof(gp_gate, gp_gate, andg, &result);

        for p in [xor_red, gp_aig, tmp0, res, and_aig, and_tmp, left, resp, and_tail, tmp, right, result] {
            self.alg.free_poly(p);
        }
    }

    // ----- discovery -----------------------------------------------------

    fn collect_vanishing_pairs(
        &mut self,
        g1: GateId,
        child: GateId,
        prop: &mut Vec<GateId>,
    ) {
        let parents = self.gates.g(g1).aig_parents.clone();
        for p_lit in parents {
            if p_lit & 1 != 0 {
                continue;
            }
            let Some(g1_p) = self.gates.gate(p_lit) else {
                continue;
            };
            self.push_van_pair(g1_p, child);
            prop.push(g1_p);
            self.collect_vanishing_pairs(g1_p, child, prop);
        }
    }

    fn propagate_vanishing_pairs(&mut self, g1: GateId, child: GateId, prop: &[GateId]) {
        let parents = self.gates.g(g1).aig_parents.clone();
        for p_lit in parents {
            if p_lit & 1 != 0 {
                continue;
            }
            let Some(g1_p) = self.gates.gate(p_lit) else {
                continue;
            };
            self.push_van_pair(g1_p, child);
            for &prop_elem in prop {
                self.push_van_pair(prop_elem, g1_p);
            }
            self.propagate_vanishing_pairs(g1_p, child, prop);
        }
    }

    /// XOR-child and XOR-AND rules for one XOR root, plus the upward
    /// propagation along positive parents.
    fn identify_vanishing_pairs(&mut self, g: GateId) {
        let lg = self.gates.g(g).children[0];
        let rg = *self.gates.g(g).children.last().unwrap();

        log::debug!(
            "found vanishing xor child pair {} and {}",
            self.gate_name(lg),
            self.gate_name(rg)
        );
        self.push_van_pair(lg, rg);
        if self.proof_logging() {
            self.gen_xor_child_van_constraint(lg, rg);
        }

        if self.gates.g(g).aig_output {
            return;
        }
        if self.gates.g(lg).children.len() < 2 {
            return;
        }
        let llg = self.gates.g(lg).children[0];
        let lrg = *self.gates.g(lg).children.last().unwrap();

        let mut ands = Vec::new();
        for &llg_p in &self.gates.g(llg).parents {
            if self.gates.g(g).is_child(llg_p) {
                continue;
            }
            if !self.gates.g(llg_p).is_child(lrg) {
                continue;
            }
            if self.gates.g(llg_p).children.len() > 2 {
                continue;
            }
            ands.push(llg_p);
        }
        if ands.is_empty() {
            return;
        }

        if self.do_vanishing_constraints {
            let neg_parents = self.gates.g(g).neg_parents.clone();
            for gp_lit in neg_parents {
                let Some(gp_gate) = self.gates.gate(gp_lit) else {
                    continue;
                };
                for &andg in &ands {
                    self.push_van_pair(gp_gate, andg);
                    if self.proof_logging() {
                        self.gen_xor_and_van_constraint_and_propagate(gp_gate, g, andg);
                    }

                    let pos_parents = self.gates.g(gp_gate).pos_parents.clone();
                    for gp_pos_lit in pos_parents {
                        let Some(gp_pos) = self.gates.gate(gp_pos_lit) else {
                            continue;
                        };
                        if self.gates.g(gp_pos).is_van_twin(andg) {
                            continue;
                        }
                        self.push_van_pair(gp_pos, andg);

                        let and_pos_parents = self.gates.g(andg).pos_parents.clone();
                        for and_pos_lit in and_pos_parents {
                            let Some(and_pos) = self.gates.gate(and_pos_lit) else {
                                continue;
                            };
                            self.push_van_pair(gp_pos, and_pos);
                        }
                    }
                }
            }
        }

        if ands.len() == 1 {
            let and1 = ands[0];
            self.gates.g_mut(and1).xor_and = Some(g);
            self.gates.g_mut(g).xor_and = Some(and1);
            self.push_dual_twin(and1, g);
            log::debug!(
                "dual twins {} {}",
                self.gate_name(and1),
                self.gate_name(g)
            );
        }
    }

    /// The triangle rule: when both children of `n` are mutual van twins and
    /// share a third twin `t`, then `t*n == 0` and every negation parent of
    /// `n` pairs with `t`.  Runs only without proof logging -- triangle
    /// products have no derivation chain recorded.
    fn find_vanishing_triangles(&mut self) {
        if self.proof_logging() {
            return;
        }
        for i in 0..self.gates.m - 1 {
            let n = GateId(i as u32);
            if self.gates.g(n).input || self.gates.g(n).children.len() != 2 {
                continue;
            }
            let ch1 = self.gates.g(n).children[0];
            let ch2 = self.gates.g(n).children[1];
            if !self.gates.g(ch2).is_van_twin(ch1) {
                continue;
            }

            let candidates: Vec<GateId> = self
                .gates
                .g(ch1)
                .van_twins
                .iter()
                .copied()
                .filter(|&t| self.gates.g(ch2).is_van_twin(t))
                .collect();
            for triangle in candidates {
                if triangle == n {
                    continue;
                }
                self.push_dual_twin(triangle, n);
                let n_parents = self.gates.g(n).aig_parents.clone();
                for p_lit in n_parents {
                    if p_lit & 1 == 0 {
                        continue;
                    }
                    let Some(np) = self.gates.gate(p_lit) else {
                        continue;
                    };
                    self.push_van_pair(np, triangle);
                    let mut prop = Vec::new();
                    self.collect_vanishing_pairs(np, triangle, &mut prop);
                    self.propagate_vanishing_pairs(triangle, np, &prop);
                }
            }
        }
    }

    /// Full discovery: all XOR roots, their child pairs, upward propagation
    /// and triangle closure.
    pub fn find_vanishing_constraints(&mut self) {
        for i in 0..self.gates.m - 1 {
            let n = GateId(i as u32);
            if self.gates.g(n).xor_gate != 1 || self.gates.g(n).children.len() != 2 {
                continue;
            }
            self.identify_vanishing_pairs(n);
        }
        self.find_vanishing_triangles();
    }

    /// Light discovery: only the XOR-AND dual twins found at construction.
    pub fn find_vanishing_constraints_light(&mut self) {
        for i in 0..self.gates.m - 1 {
            let g = GateId(i as u32);
            if self.gates.g(g).xor_gate != 1 {
                continue;
            }
            let Some(and1) = self.gates.g(g).xor_and else {
                continue;
            };
            if !self.cfg.force_vanishing_off {
                self.push_dual_twin(and1, g);
                if self.proof_logging() {
                    self.gen_xor_and_van_constraint(g, and1);
                }
                self.stats.van_mon_poly_count += 1;
                log::debug!(
                    "dual twins {} {}",
                    self.gate_name(and1),
                    self.gate_name(g)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::aiger::parse_aiger;
    use crate::config::Config;
    use crate::engine::Engine;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    #[test]
    fn test_light_discovery_pairs_xor_with_and() {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 1;
        let mut e = Engine::new(aig, cfg);
        e.find_vanishing_constraints_light();
        let l10 = e.gates.gate(10).unwrap();
        let l6 = e.gates.gate(6).unwrap();
        assert!(e.gates.g(l6).is_dual_twin(l10));
    }

    #[test]
    fn test_full_discovery_xor_children() {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 1;
        let mut e = Engine::new(aig, cfg);
        e.do_vanishing_constraints = true;
        e.find_vanishing_constraints();
        // The two fan-ins of the XOR root exclude each other.
        let l6 = e.gates.gate(6).unwrap();
        let l8 = e.gates.gate(8).unwrap();
        assert!(e.gates.g(l6).is_van_twin(l8));
        assert!(e.gates.g(l8).is_van_twin(l6));
    }
}
