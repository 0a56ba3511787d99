// SPDX-License-Identifier: Apache-2.0

//! Circuit preprocessing: eliminating gates that only occur positively,
//! cascading unit-gate elimination, backward substitution of shared tails,
//! and the carry-lookahead probe that switches full vanishing-constraint
//! discovery on.

use num_bigint::BigInt;
use num_traits::One;

use crate::engine::Engine;
use crate::gate::{xor_left_child, xor_right_child, GateId};
use crate::poly::Monomial;

impl Engine {
    fn is_unit(&self, g: GateId) -> bool {
        let gate = self.gates.g(g);
        if gate.elim {
            return false;
        }
        let Some(gc) = gate.gate_constraint.as_ref() else {
            return false;
        };
        if gc.len() > 2 {
            return false;
        }
        if gc.len() == 1 {
            return true;
        }
        match gc.tail_term() {
            None => true,
            Some(t) => self.alg.pool.degree(t) == 1,
        }
    }

    /// Rewrites gates whose every parent has a two-monomial constraint
    /// mentioning them positively: the gate's constraint is substituted into
    /// all parents and the gate is detached.
    fn remove_only_positives(&mut self, parent_limit: usize) {
        log::info!("remove only positives");
        let mut counter = 0usize;

        for i in (self.gates.num_inputs..self.gates.m - 1).rev() {
            let n = GateId(i as u32);
            {
                let gate = self.gates.g(n);
                if parent_limit > 0 && gate.parents.len() > parent_limit {
                    continue;
                }
                if parent_limit == 0 && gate.parents.len() == 1 {
                    continue;
                }
                if gate.partial_product
                    || gate.input
                    || gate.elim
                    || gate.output
                    || gate.aig_output
                {
                    continue;
                }
                let Some(gc) = gate.gate_constraint.as_ref() else {
                    continue;
                };
                if gc.len() > 2 {
                    continue;
                }
            }

            let n_var = self.gates.g(n).v;
            let mut blocked = false;
            for &parent in &self.gates.g(n).parents {
                let Some(p_gc) = self.gates.g(parent).gate_constraint.as_ref() else {
                    blocked = true;
                    break;
                };
                if p_gc.len() > 2 {
                    blocked = true;
                    break;
                }
                let Some(t) = p_gc.mon(1).term else {
                    blocked = true;
                    break;
                };
                if !self.alg.pool.contains(t, n_var) {
                    blocked = true;
                    break;
                }
            }
            if blocked {
                continue;
            }

            let children = self.gates.g(n).children.clone();
            for &c in &children {
                self.gates.g_mut(c).parents_remove(n);
            }

            let parents = self.gates.g(n).parents.clone();
            let n_gc = {
                let gc = self.gates.g(n).gate_constraint.as_ref().unwrap();
                self.alg.copy_poly(gc)
            };
            for parent in parents {
                let p_gc = {
                    let gc = self.gates.g(parent).gate_constraint.as_ref().unwrap();
                    self.alg.copy_poly(gc)
                };
                let rem = self.reduce_by_one_poly(&p_gc, &n_gc, false);
                self.alg.free_poly(p_gc);
                if let Some(old) = self.gates.g_mut(parent).gate_constraint.take() {
                    self.alg.free_poly(old);
                }
                self.gates.g_mut(parent).gate_constraint = Some(rem);

                for &c in &children {
                    self.gates.g_mut(c).parents.push(parent);
                    self.gates.g_mut(parent).children.push(c);
                }
                self.gates.g_mut(parent).children_remove(n);
            }
            self.alg.free_poly(n_gc);
            counter += 1;
        }
        log::info!("removed {} positive gates", counter);
    }

    /// Substitutes the unit `n2` into `n1`, first flipping `n2`'s dual out
    /// of `n1`'s constraint.
    fn eliminate_by_one_gate(&mut self, n1: GateId, n2: GateId) {
        if self.gates.g(n1).gate_constraint.is_none()
            || self.gates.g(n2).gate_constraint.is_none()
        {
            return;
        }
        let flip = self.copy_dual_constraint(n2);
        let n1_gc = {
            let gc = self.gates.g(n1).gate_constraint.as_ref().unwrap();
            self.alg.copy_poly(gc)
        };
        let p1 = self.reduce_by_one_poly(&n1_gc, &flip, false);
        self.alg.free_poly(n1_gc);
        self.alg.free_poly(flip);

        let p2 = {
            let gc = self.gates.g(n2).gate_constraint.as_ref().unwrap();
            self.alg.copy_poly(gc)
        };
        let lt2 = p2.lt().unwrap();
        let negfactor = self.alg.divide_poly_by_term(&p1, lt2);
        if negfactor.is_constant_zero() {
            self.alg.free_poly(negfactor);
            self.alg.free_poly(p1);
            self.alg.free_poly(p2);
            return;
        }
        let mult = self.alg.multiply_poly(&negfactor, &p2);
        let rem = self.alg.add_poly(&p1, &mult);
        self.gates.update_gate_poly(&mut self.alg, n1, rem);
        self.alg.free_poly(mult);
        self.alg.free_poly(negfactor);
        self.alg.free_poly(p1);
        self.alg.free_poly(p2);
    }

    /// Removes a unit gate by substituting it into every parent, cascading
    /// into parents that become units themselves.
    fn eliminate_unit_gate(&mut self, n: GateId) {
        let children = self.gates.g(n).children.clone();
        for &c in &children {
            self.gates.g_mut(c).parents_remove(n);
        }

        let parents = self.gates.g(n).parents.clone();
        for parent in parents {
            self.eliminate_by_one_gate(parent, n);
            self.gates.g_mut(parent).children_remove(n);

            for &c in &children {
                if !self.gates.g(parent).is_child(c) {
                    self.gates.g_mut(parent).children.push(c);
                }
                if !self.gates.g(c).is_in_parents(parent) {
                    self.gates.g_mut(c).parents.push(parent);
                }
            }

            if self.is_unit(parent) {
                self.eliminate_unit_gate(parent);
            } else if self.gates.g(parent).children.len() == 1
                && self
                    .gates
                    .g(parent)
                    .gate_constraint
                    .as_ref()
                    .map_or(false, |gc| gc.len() == 3)
            {
                let tmp = self.gates.g(parent).children[0];
                let flip = self.copy_dual_constraint(tmp);
                let p_gc = {
                    let gc = self.gates.g(parent).gate_constraint.as_ref().unwrap();
                    self.alg.copy_poly(gc)
                };
                let mut rem1 = self.reduce_by_one_poly(&p_gc, &flip, false);
                self.alg.free_poly(flip);
                if rem1.len() != 2 {
                    // Retry against the primary variable's constraint; the
                    // cached dual is phrased over the dual variable.
                    self.alg.free_poly(rem1);
                    let v = self.gates.g(tmp).v;
                    let flip = self.alg.gen_dual_constraint(v);
                    rem1 = self.reduce_by_one_poly(&p_gc, &flip, false);
                    self.alg.free_poly(flip);
                }
                self.alg.free_poly(p_gc);
                self.gates.update_gate_poly(&mut self.alg, parent, rem1);
                self.eliminate_unit_gate(parent);
            }
        }

        log::debug!("removed unit {}", self.gate_name(n));
    }

    fn eliminate_units(&mut self) {
        let mut ids: Vec<GateId> = self
            .gates
            .and_ids()
            .filter(|&g| {
                let gate = self.gates.g(g);
                !gate.output && !gate.aig_output && !gate.partial_product
            })
            .collect();
        self.gates.sort_by_level_dec(&self.alg.pool, &mut ids);
        for g in ids {
            if self.is_unit(g) && !self.gates.g(g).parents.is_empty() {
                self.eliminate_unit_gate(g);
            }
        }
    }

    // ----- backward substitution ------------------------------------------

    fn check_for_new_vanishing_combinations(&mut self, repl: GateId, g: GateId) {
        if self.gates.g(g).children.len() != 2 {
            return;
        }
        let mut ch1 = self.gates.g(g).children[0];
        let mut ch2 = self.gates.g(g).children[1];
        if ch2 == repl {
            std::mem::swap(&mut ch1, &mut ch2);
        }
        if ch1 != repl {
            return;
        }

        let ch1_parents = self.gates.g(ch1).aig_parents.clone();
        for lit in ch1_parents {
            if lit & 1 == 0 {
                continue;
            }
            let Some(candidate) = self.gates.gate(lit) else {
                continue;
            };
            let cand_parents = self.gates.g(candidate).parents.clone();
            for cand_p in cand_parents {
                let Some(cp_gc) = self.gates.g(cand_p).gate_constraint.as_ref() else {
                    continue;
                };
                if cp_gc.len() != 2 {
                    continue;
                }
                if !self.gates.g(cand_p).is_child(ch2) {
                    continue;
                }
                let Some(cp_tail) = cp_gc.tail_term() else {
                    continue;
                };
                let Some(g_tail) = self
                    .gates
                    .g(g)
                    .gate_constraint
                    .as_ref()
                    .and_then(|gc| gc.tail_term())
                else {
                    continue;
                };
                let cand_dual = self.alg.pool.dual(self.gates.g(candidate).v);
                let repl_v = self.gates.g(repl).v;
                let t = self.alg.pool.divide_by_var(cp_tail, cand_dual);
                let t1 = self.alg.pool.divide_by_var(g_tail, repl_v);
                let deg_ok = |p: Option<crate::term::TermId>, pool: &crate::term::TermPool| {
                    p.map_or(true, |t| pool.degree(t) <= 1)
                };
                let equal = t == t1
                    && deg_ok(t, &self.alg.pool)
                    && deg_ok(t1, &self.alg.pool);
                self.alg.pool.release_opt(t);
                self.alg.pool.release_opt(t1);
                if equal {
                    log::debug!(
                        "dual twins {} {}",
                        self.gate_name(g),
                        self.gate_name(cand_p)
                    );
                    if self.proof_logging() {
                        self.gen_backward_van_constraint(g, cand_p);
                    }
                    if !self.gates.g(g).is_dual_twin(cand_p) {
                        self.gates.g_mut(g).dual_twins.push(cand_p);
                    }
                }
            }
        }
    }

    fn gen_backward_van_constraint(&mut self, g: GateId, andg: GateId) {
        let g_gc = {
            let gc = self.gates.g(g).gate_constraint.as_ref().unwrap();
            self.alg.copy_poly(gc)
        };
        let and_gc = {
            let gc = self.gates.g(andg).gate_constraint.as_ref().unwrap();
            self.alg.copy_poly(gc)
        };
        let g_tmp = self.unflip_poly(&g_gc);
        let and_tmp = self.unflip_poly(&and_gc);
        self.emit_dual_van_step(&g_tmp, &and_tmp);
        self.alg.free_poly(g_gc);
        self.alg.free_poly(and_gc);
        self.alg.free_poly(g_tmp);
        self.alg.free_poly(and_tmp);
    }

    fn do_backward_substitution(&mut self, outer: GateId) -> bool {
        let (outer_gc_len, outer_t) = {
            let Some(gc) = self.gates.g(outer).gate_constraint.as_ref() else {
                return false;
            };
            (gc.len(), gc.tail_term())
        };
        if outer_gc_len != 2 {
            return false;
        }
        let Some(outer_t) = outer_t else {
            return false;
        };

        let mut res = outer_t;
        let mut res_deg = self.alg.pool.degree(outer_t);
        let mut repl: Option<GateId> = None;
        let mut owned_res: Option<crate::term::TermId> = None;

        'outer_scan: for v in self.alg.pool.iter_vars(outer_t).collect::<Vec<_>>() {
            let Some(vg) = self.gates.gate(self.alg.pool.var(v).num) else {
                continue;
            };
            for par in self.gates.g(vg).parents.clone() {
                if par == outer || self.gates.g(par).output {
                    continue;
                }
                let Some(p_par) = self.gates.g(par).gate_constraint.as_ref() else {
                    continue;
                };
                if p_par.len() != 2 {
                    continue;
                }
                let Some(par_tail) = p_par.tail_term() else {
                    continue;
                };
                if !self.alg.pool.contains(par_tail, v) {
                    continue;
                }

                let t = self.alg.pool.divide_by_term(outer_t, par_tail);
                if t == Some(outer_t) {
                    self.alg.pool.release_opt(t);
                    continue;
                }
                let t_deg = t.map_or(0, |t| self.alg.pool.degree(t));
                if t_deg < res_deg {
                    if let Some(prev) = owned_res.take() {
                        self.alg.pool.release(prev);
                    }
                    match t {
                        Some(t) => {
                            res = t;
                            owned_res = Some(t);
                        }
                        None => {
                            // Tail fully covered; keep only the parent var.
                            owned_res = None;
                        }
                    }
                    res_deg = t_deg;
                    repl = Some(par);
                    if res_deg <= 1 {
                        break 'outer_scan;
                    }
                } else {
                    self.alg.pool.release_opt(t);
                }
            }
            if res_deg <= 1 && repl.is_some() {
                break;
            }
        }

        let Some(repl) = repl else {
            return false;
        };

        let t0 = if res_deg == 0 { None } else { Some(res) };
        let repl_v = self.gates.g(repl).v;
        let t1 = self.alg.pool.make_term(repl_v, None);
        let t2 = match t0 {
            Some(t0) => {
                let t2 = self.alg.pool.multiply_term(t0, t1);
                self.alg.pool.release(t1);
                t2
            }
            None => t1,
        };

        let lead = {
            let gc = self.gates.g(outer).gate_constraint.as_ref().unwrap();
            self.alg.copy_mono(gc.lm())
        };
        self.alg.push_end(lead);
        self.alg.push_end(Monomial {
            coeff: BigInt::one(),
            term: Some(t2),
        });
        let mut rewr = self.alg.build_poly();

        if self.proof_logging() {
            let co = Monomial {
                coeff: -BigInt::one(),
                term: self.alg.pool.retain_opt(t0),
            };
            let repl_idx = self
                .gates
                .g(repl)
                .gate_constraint
                .as_ref()
                .unwrap()
                .idx();
            let outer_idx = self
                .gates
                .g(outer)
                .gate_constraint
                .as_ref()
                .unwrap()
                .idx();
            let proof = self.proof.as_mut().unwrap();
            proof.combi_monomial_rule(&self.alg.pool, repl_idx, &co, outer_idx, &mut rewr);
            self.alg.free_mono(co);
        }

        self.gates.update_gate_poly(&mut self.alg, outer, rewr);
        if let Some(t) = owned_res {
            self.alg.pool.release(t);
        }

        log::debug!(
            "substituted {} in {}",
            self.gate_name(repl),
            self.gate_name(outer)
        );

        if self.do_vanishing_constraints {
            self.check_for_new_vanishing_combinations(repl, outer);
        }

        true
    }

    fn backward_substitution(&mut self) {
        log::info!("backward substitution");
        let mut counter = 0usize;

        for i in (self.gates.num_inputs..self.gates.m - 1).rev() {
            let outer = GateId(i as u32);
            {
                let gate = self.gates.g(outer);
                if gate.elim || gate.partial_product {
                    continue;
                }
                let Some(gc) = gate.gate_constraint.as_ref() else {
                    continue;
                };
                if gc.len() != 2 {
                    continue;
                }
                let Some(t) = gc.tail_term() else {
                    continue;
                };
                if self.alg.pool.degree(t) < 3 {
                    continue;
                }
            }
            self.do_backward_substitution(outer);
            counter += 1;
        }
        log::info!("backwards substitution done ({} gates)", counter);
    }

    // ----- CLA probe ------------------------------------------------------

    /// If the top output before the final XOR carries a constraint deeper
    /// than N/4, suspect a carry-lookahead adder: drop the final-stage-adder
    /// marking and enable full vanishing-constraint discovery.
    fn cla_probe(&mut self) {
        if self.cfg.force_guessing() {
            return;
        }
        let nn = self.gates.num_inputs;
        if nn == 0 || nn - 1 >= self.gates.num_outputs {
            return;
        }
        let top_lit = self.aig.slit(nn - 1);
        if top_lit < 2 {
            return;
        }
        let Some(mut g) = self.gates.gate(top_lit as i64) else {
            return;
        };
        if self.gates.g(g).xor_gate == 1 {
            let l = xor_left_child(&self.gates, &self.alg, &self.aig, g);
            let r = xor_right_child(&self.gates, &self.alg, &self.aig, g);
            if let (Some(l), Some(r)) = (l, r) {
                g = if self.gates.g(l).xor_gate == 1 { r } else { l };
            }
        }
        if self.ensure_gate_constraint(g).is_err() {
            return;
        }
        let deg = self.gates.g(g).gate_constraint.as_ref().unwrap().degree();
        if deg as usize > nn / 4 {
            log::info!("potential CLA of degree {}, better solved with FGLM", deg);
            self.unmark_fsa();
            self.do_vanishing_constraints = true;
            if !self.cfg.force_vanishing_off {
                self.find_vanishing_constraints();
            }
        }
    }

    /// Runs all preprocessing passes in decreasing-level order.
    pub fn preprocessing(&mut self) {
        log::info!("starting preprocessing");
        self.remove_only_positives(1);
        self.remove_only_positives(0);
        self.eliminate_units();
        self.cla_probe();
        self.backward_substitution();
        log::info!("finished preprocessing");
    }
}
