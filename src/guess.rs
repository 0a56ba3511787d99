// SPDX-License-Identifier: Apache-2.0

//! Guess-and-prove linearization: sample the sub-circuit with semi-random
//! Boolean assignments, read candidate affine relations off the kernel of
//! the sample matrix, and confirm each candidate with two SAT calls on the
//! CNF-encoded AIG plus the (negated) candidate as a pseudo-Boolean
//! constraint.  Counter-examples from SAT are queued and replayed as extra
//! sample rows in the next iteration, pruning infeasible candidates.

use std::collections::HashMap;
use std::time::Instant;

use num_bigint::BigInt;
use num_traits::Zero;
use rand::Rng;
use varisat::{ExtendFormula, Lit, Solver};

use crate::engine::Engine;
use crate::gate::GateId;
use crate::matrix::QMat;
use crate::poly::{Monomial, Polynomial};
use crate::term::TermId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SatOutcome {
    Sat,
    Unsat,
}

impl Engine {
    fn sc_vars_sorted(&self) -> Vec<GateId> {
        let mut vars: Vec<GateId> = self.sc.inputs.iter().copied().collect();
        vars.extend(self.sc.gate_poly.iter().copied());
        self.gates.sort_by_level_dec(&self.alg.pool, &mut vars);
        vars
    }

    // ----- CNF translation -----------------------------------------------

    /// Assigns a DIMACS id to every sampled gate; `inverse[id-1]` maps back.
    fn var_cnf_mapping(&self, vars_sorted: &[GateId]) -> (HashMap<GateId, i32>, Vec<GateId>) {
        let mut lit_id = HashMap::new();
        let mut inverse = Vec::new();
        for &g in vars_sorted {
            assert!(
                !lit_id.contains_key(&g),
                "gate {} already has a CNF id",
                self.gate_name(g)
            );
            inverse.push(g);
            lit_id.insert(g, inverse.len() as i32);
        }
        (lit_id, inverse)
    }

    fn cnf_id(
        &self,
        lit_id: &mut HashMap<GateId, i32>,
        inverse: &mut Vec<GateId>,
        g: GateId,
    ) -> i32 {
        if let Some(&id) = lit_id.get(&g) {
            return id;
        }
        inverse.push(g);
        let id = inverse.len() as i32;
        lit_id.insert(g, id);
        id
    }

    /// Structural clauses for the interior: `g => a`, `g => b`,
    /// `a & b => g` for each AND (extension gates use their stored
    /// fan-ins).
    fn translate_aig_part_to_cnf(
        &self,
        lit_id: &mut HashMap<GateId, i32>,
        inverse: &mut Vec<GateId>,
    ) -> Vec<Vec<i32>> {
        let mut clauses = Vec::new();
        let mut interior: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut interior);

        for g in interior {
            let g_id = self.cnf_id(lit_id, inverse, g);
            if !self.gates.g(g).extension {
                let num = self.alg.pool.var(self.gates.g(g).v).num as u32;
                let Some(and1) = self.aig.and(num) else {
                    continue;
                };
                let (rhs0, rhs1) = (and1.rhs0, and1.rhs1);
                let (Some(child0), Some(child1)) = (
                    self.gates.gate(rhs0 as i64),
                    self.gates.gate(rhs1 as i64),
                ) else {
                    continue;
                };
                let id0 = self.cnf_id(lit_id, inverse, child0);
                let id1 = self.cnf_id(lit_id, inverse, child1);
                let r0 = if crate::aiger::sign(rhs0) { -id0 } else { id0 };
                let r1 = if crate::aiger::sign(rhs1) { -id1 } else { id1 };
                clauses.push(vec![-g_id, r0]);
                clauses.push(vec![-g_id, r1]);
                clauses.push(vec![g_id, -r0, -r1]);
            } else {
                let children = self.gates.g(g).children.clone();
                let mut all = vec![g_id];
                for c in children {
                    let c_id = self.cnf_id(lit_id, inverse, c);
                    clauses.push(vec![-g_id, c_id]);
                    all.push(-c_id);
                }
                clauses.push(all);
            }
        }
        clauses
    }

    /// Appends `p >= 1` (or `-p >= 1` with `negate`) to the clause set.
    fn translate_poly_to_cnf(
        &mut self,
        p: &Polynomial,
        lit_id: &HashMap<GateId, i32>,
        mut clauses: Vec<Vec<i32>>,
        negate: bool,
    ) -> Vec<Vec<i32>> {
        let p_print = if negate {
            let minus_one = -BigInt::from(1);
            self.alg.mul_const(p, &minus_one)
        } else {
            self.alg.copy_poly(p)
        };

        let mut weights = Vec::new();
        let mut ids = Vec::new();
        for m in p_print.mons() {
            if let Some(t) = m.term {
                let g = self
                    .gates
                    .gate(self.alg.pool.head_num(t))
                    .expect("candidate variable belongs to a gate");
                weights.push(i64::try_from(&m.coeff).expect("candidate coefficient fits i64"));
                ids.push(lit_id[&g]);
            }
        }

        let last = p_print.mon(p_print.len() - 1);
        let rhs = if last.term.is_some() {
            1
        } else {
            -i64::try_from(&last.coeff).expect("candidate constant fits i64") + 1
        };

        let first_fresh = lit_id.len() as i32 + 1;
        crate::pb::encode_geq(&weights, &ids, rhs, &mut clauses, first_fresh);
        self.alg.free_poly(p_print);
        clauses
    }

    /// Runs the SAT oracle; a model is recorded into the counter-example
    /// queue.
    fn call_sat(&mut self, clauses: &[Vec<i32>], inverse: &[GateId]) -> SatOutcome {
        self.stats.sat_calls += 1;
        let mut solver = Solver::new();
        for clause in clauses {
            let lits: Vec<Lit> = clause
                .iter()
                .map(|&l| Lit::from_dimacs(l as isize))
                .collect();
            solver.add_clause(&lits);
        }
        match solver.solve() {
            Ok(true) => {
                let model = solver.model().expect("model available when SAT");
                let model_set: std::collections::HashSet<Lit> = model.into_iter().collect();
                let mut assignment = HashMap::new();
                for (i, &g) in inverse.iter().enumerate() {
                    let lit = Lit::from_dimacs((i + 1) as isize);
                    assignment.insert(g, model_set.contains(&lit));
                }
                self.collected.push_back(assignment);
                SatOutcome::Sat
            }
            Ok(false) => SatOutcome::Unsat,
            Err(e) => panic!("SAT solver error: {:?}", e),
        }
    }

    /// Confirms one candidate invariant, either by two SAT refutations or by
    /// algebraic reduction to zero; on success the leading gate adopts the
    /// candidate as normal form and constraint.
    fn verify_guess(
        &mut self,
        p: Polynomial,
        aig_clauses: &[Vec<i32>],
        lit_id: &HashMap<GateId, i32>,
        inverse: &[GateId],
        eval_count: &mut u64,
        sat_count: &mut u64,
    ) -> Option<Polynomial> {
        self.stats.evaluated_guesses += 1;
        *eval_count += 1;

        if self.cfg.use_algebra_reduction {
            if self.reduce_to_zero(&p, &[]) {
                log::debug!("===== CORRECT =====");
                let p_lt = self.gate_of_lt(&p);
                let nf = self.alg.copy_poly(&p);
                if let Some(old) = self.gates.g_mut(p_lt).normal_form.replace(nf) {
                    self.alg.free_poly(old);
                }
                return Some(p);
            }
            *sat_count += 1;
            log::debug!("===== WRONG =====");
            self.alg.free_poly(p);
            return None;
        }

        let clauses = self.translate_poly_to_cnf(&p, lit_id, aig_clauses.to_vec(), false);
        let run1 = self.call_sat(&clauses, inverse) == SatOutcome::Unsat;

        let run2 = if run1 {
            let clauses = self.translate_poly_to_cnf(&p, lit_id, aig_clauses.to_vec(), true);
            self.call_sat(&clauses, inverse) == SatOutcome::Unsat
        } else {
            false
        };

        if run1 && run2 {
            self.stats.correct_guesses += 1;
            let mut p = p;
            if self.proof.is_some() {
                let proof = self.proof.as_mut().unwrap();
                proof.add_circuit_poly(&self.alg.pool, &mut p);
            }
            let p_lt = self.gate_of_lt(&p);
            let nf = self.alg.copy_poly(&p);
            if let Some(old) = self.gates.g_mut(p_lt).normal_form.replace(nf) {
                self.alg.free_poly(old);
            }
            let gc = self.alg.copy_poly(&p);
            self.gates.update_gate_poly(&mut self.alg, p_lt, gc);
            log::debug!("===== CORRECT =====");
            Some(p)
        } else {
            *sat_count += 1;
            log::debug!("===== WRONG =====");
            self.alg.free_poly(p);
            None
        }
    }

    // ----- sampling -------------------------------------------------------

    fn set_gate_value(&mut self, g: GateId, val: i64) {
        let v = self.gates.g(g).v;
        let d = self.alg.pool.dual(v);
        self.alg.pool.var_mut(v).value = val as i8;
        self.alg.pool.var_mut(d).value = (1 - val) as i8;
    }

    fn eval_interior_gate(&self, g: GateId) -> i64 {
        let gate = self.gates.g(g);
        let p = gate
            .aig_poly
            .as_ref()
            .or(gate.gate_constraint.as_ref())
            .expect("interior gate has an evaluable polynomial");
        p.evaluate_tail(&self.alg.pool)
    }

    /// The all-zero and all-one assignments in rows 0 and 1.
    fn sample_trivial(
        &mut self,
        mat: &mut QMat,
        frontier: &[GateId],
        interior: &[GateId],
        var_col: &HashMap<GateId, usize>,
    ) {
        for val in 0..2i64 {
            let row = val as usize;
            mat.set_int(row, mat.ncols() - 1, 1);
            for &g in frontier {
                self.set_gate_value(g, val);
                mat.set_int(row, var_col[&g], val);
            }
            for &g in interior {
                let v = self.eval_interior_gate(g);
                self.set_gate_value(g, v);
                mat.set_int(row, var_col[&g], v);
            }
        }
    }

    /// A uniformly random frontier assignment, evaluated bottom-up.
    fn sample_subcircuit(
        &mut self,
        mat: &mut QMat,
        row: usize,
        frontier: &[GateId],
        interior: &[GateId],
        var_col: &HashMap<GateId, usize>,
    ) {
        mat.set_int(row, mat.ncols() - 1, 1);
        let mut bits: u32 = 0;
        for (i, &g) in frontier.iter().enumerate() {
            if i % 32 == 0 {
                bits = self.rng.gen();
            }
            let val = (bits & 1) as i64;
            bits >>= 1;
            self.set_gate_value(g, val);
            mat.set_int(row, var_col[&g], val);
        }
        for &g in interior {
            let v = self.eval_interior_gate(g);
            self.set_gate_value(g, v);
            mat.set_int(row, var_col[&g], v);
        }
    }

    /// The companion row re-reading the currently-set values, so the matrix
    /// sees both the primary and the dual side of every assignment.
    fn sample_dual(
        &mut self,
        mat: &mut QMat,
        row: usize,
        frontier: &[GateId],
        interior: &[GateId],
        var_col: &HashMap<GateId, usize>,
    ) {
        mat.set_int(row, mat.ncols() - 1, 1);
        for &g in frontier {
            let v = self.gates.g(g).v;
            let val = self.alg.pool.var(v).value as i64;
            self.set_gate_value(g, val);
            mat.set_int(row, var_col[&g], val);
        }
        for &g in interior {
            let v = self.eval_interior_gate(g);
            self.set_gate_value(g, v);
            mat.set_int(row, var_col[&g], v);
        }
    }

    /// Replays queued counter-examples as leading rows of a rebuilt matrix.
    fn append_collected_assignments(
        &mut self,
        mat: &mut QMat,
        frontier: &[GateId],
        interior: &[GateId],
        var_col: &HashMap<GateId, usize>,
    ) {
        if self.collected.is_empty() {
            return;
        }

        let mut n = 0;
        while n < mat.nrows() && !mat.row_is_zero(n) {
            n += 1;
        }

        let mut extended = QMat::zero(n + self.collected.len(), mat.ncols());
        for i in 0..n {
            for j in 0..mat.ncols() {
                extended.set(i, j, mat.get(i, j).clone());
            }
        }

        let mut i = n;
        while let Some(sample) = self.collected.pop_front() {
            extended.set_int(i, mat.ncols() - 1, 1);
            for &g in frontier.iter().chain(interior.iter()) {
                let val = i64::from(*sample.get(&g).unwrap_or(&false));
                extended.set_int(i, var_col[&g], val);
            }
            i += 1;
        }

        *mat = extended;
    }

    // ----- the guess-and-prove loop ---------------------------------------

    /// Extracts candidate affine relations over the sub-circuit variables
    /// and keeps the SAT-confirmed ones.  Returns the accepted linear
    /// polynomials; the counter-example queue is cleared on every exit path.
    pub fn guess_linear(&mut self) -> Vec<Polynomial> {
        self.stats.guess_calls += 1;
        let mut result: Vec<Polynomial> = Vec::new();

        let vars_sorted = self.sc_vars_sorted();
        let mut frontier: Vec<GateId> = self.sc.inputs.iter().copied().collect();
        self.gates.sort_by_level_dec(&self.alg.pool, &mut frontier);
        let mut interior: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut interior);

        let mut var_col: HashMap<GateId, usize> = HashMap::new();
        for (j, &g) in vars_sorted.iter().enumerate() {
            var_col.insert(g, j);
        }

        let guess_start = Instant::now();

        let n = vars_sorted.len() + 1;
        let rows = std::cmp::min(10 * n, 10_000) + 2;
        let mut mat = QMat::zero(rows, n);

        self.sample_trivial(&mut mat, &frontier, &interior, &var_col);
        let mut i = 2;
        while i + 1 < rows {
            self.sample_subcircuit(&mut mat, i, &frontier, &interior, &var_col);
            self.sample_dual(&mut mat, i + 1, &frontier, &interior, &var_col);
            i += 2;
        }

        // Candidate construction terms, one per column plus the constant.
        let mut terms: Vec<Option<TermId>> = Vec::new();
        for &g in &vars_sorted {
            let v = self.gates.g(g).v;
            terms.push(Some(self.alg.pool.make_term(v, None)));
        }
        terms.push(None);

        for &g in &interior {
            if self.gates.g(g).normal_form.is_none() {
                let Some(gc) = self.gates.g(g).gate_constraint.as_ref() else {
                    continue;
                };
                let copy = self.alg.copy_poly(gc);
                self.gates.g_mut(g).normal_form = Some(copy);
            }
        }

        self.stats.guess_time += guess_start.elapsed();

        let (mut lit_id, mut inverse) = self.var_cnf_mapping(&vars_sorted);
        let aig_clauses = self.translate_aig_part_to_cnf(&mut lit_id, &mut inverse);

        let mut found_root = false;
        let mut iteration_count = 0usize;

        while !found_root {
            let mut eval_count = 0u64;
            let mut sat_count = 0u64;
            iteration_count += 1;
            self.stats.total_iterations += 1;

            let iter_start = Instant::now();
            self.append_collected_assignments(&mut mat, &frontier, &interior, &var_col);

            for p in result.drain(..) {
                self.alg.free_poly(p);
            }

            let kernel = mat.kernel();
            if kernel.nrows() == 0 {
                self.stats.guess_time += iter_start.elapsed();
                break;
            }
            if kernel.get(0, 0).is_zero() {
                self.stats.guess_time += iter_start.elapsed();
                break;
            }

            let nr_lin_polies = kernel.nrows();
            self.stats.guess_time += iter_start.elapsed();
            self.stats.total_guesses += nr_lin_polies as u64;
            self.stats.max_guesses = self.stats.max_guesses.max(nr_lin_polies as u64);

            let mut kernel = kernel;
            let mut all_already_linear = true;
            for i in 0..nr_lin_polies {
                kernel.normalize_row(i);

                for j in 0..n {
                    let entry = kernel.get(i, j);
                    if entry.is_zero() {
                        continue;
                    }
                    let coeff = entry.numer().clone();
                    let term = self.alg.pool.retain_opt(terms[j]);
                    self.alg.push(Monomial { coeff, term });
                }
                let p = self.alg.build_poly();
                if p.is_constant_zero() {
                    self.alg.free_poly(p);
                    continue;
                }

                // Skip gates that already obtained a linear normal form.
                let lt_gate = self.gate_of_lt(&p);
                let already = self
                    .gates
                    .g(lt_gate)
                    .normal_form
                    .as_ref()
                    .map_or(false, |nf| nf.degree() <= 1);
                if already {
                    self.alg.free_poly(p);
                    continue;
                }

                all_already_linear = false;
                let proof_start = Instant::now();
                let accepted = self.verify_guess(
                    p,
                    &aig_clauses,
                    &lit_id,
                    &inverse,
                    &mut eval_count,
                    &mut sat_count,
                );
                self.stats.proof_time += proof_start.elapsed();
                if let Some(p) = accepted {
                    found_root = found_root || i == 0;
                    result.push(p);
                }
            }

            if iteration_count <= self.stats.accuracy.len() {
                if eval_count > 0 {
                    self.stats.accuracy[iteration_count - 1] +=
                        (eval_count - sat_count) as f64 / eval_count as f64 * 100.0;
                }
                self.stats.iterations_on_level[iteration_count - 1] += 1;
            }

            if all_already_linear {
                break;
            }
        }
        self.stats.max_iterations = self.stats.max_iterations.max(iteration_count as u64);

        self.collected.clear();
        for t in terms.into_iter().flatten() {
            self.alg.pool.release(t);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiger::parse_aiger;
    use crate::config::{Config, LinMethod};
    use crate::subcircuit::VarMap;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn evaluate_full(e: &crate::engine::Engine, p: &Polynomial) -> i64 {
        let mut res = 0i64;
        for m in p.mons() {
            let c = i64::try_from(&m.coeff).unwrap();
            let t = m.term.map_or(1, |t| e.alg.pool.evaluate(t));
            res += c * t;
        }
        res
    }

    #[test]
    fn test_guess_and_prove_soundness() {
        let _ = env_logger::builder().is_test(true).try_init();
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 7;
        cfg.lin_method = LinMethod::ForceGuess;
        cfg.sc_depth = 4;
        let mut e = crate::engine::Engine::new(aig, cfg);

        let l10 = e.gates.gate(10).unwrap();
        let mut var_map = VarMap::default();
        e.get_and_compress_subcircuit(l10, 4, 4, true, false, &mut var_map)
            .unwrap();

        let accepted = e.guess_linear();
        assert!(!accepted.is_empty(), "the XOR relation should be found");
        assert!(e.stats.sat_calls > 0);

        // Every SAT-confirmed candidate vanishes on every satisfying
        // assignment of the circuit.
        let gate_ids = [
            e.gates.gate(2).unwrap(),
            e.gates.gate(4).unwrap(),
            e.gates.gate(6).unwrap(),
            e.gates.gate(8).unwrap(),
            e.gates.gate(10).unwrap(),
        ];
        for i0 in 0..2i64 {
            for i1 in 0..2i64 {
                let l6 = i0 & i1;
                let l8 = (1 - i0) & (1 - i1);
                let l10v = (1 - l6) & (1 - l8);
                for (g, val) in gate_ids.iter().zip([i0, i1, l6, l8, l10v]) {
                    let v = e.gates.g(*g).v;
                    let d = e.alg.pool.dual(v);
                    e.alg.pool.var_mut(v).value = val as i8;
                    e.alg.pool.var_mut(d).value = (1 - val) as i8;
                }
                for p in &accepted {
                    assert_eq!(evaluate_full(&e, p), 0);
                }
            }
        }

        for p in accepted {
            e.alg.free_poly(p);
        }
    }
}
